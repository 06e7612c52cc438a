//! Push strategy: serve the materialized timeline.
//!
//! Reads reflect only what the fan-out consumer has applied so far and may
//! lag the pull-path view while a post is still fanning out.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{Post, TimelinePage, UserId};
use crate::error::Result;
use crate::metrics::{record_timeline_read, TIMELINE_READ_SECONDS};
use crate::timeline::store::TimelineStore;
use crate::timeline::{FanoutReceipt, TimelineStrategy};
use crate::workers::outbox::{FanoutJob, FanoutOutbox};

pub struct PushTimeline {
    store: Arc<dyn TimelineStore>,
    outbox: Arc<dyn FanoutOutbox>,
}

impl PushTimeline {
    pub fn new(store: Arc<dyn TimelineStore>, outbox: Arc<dyn FanoutOutbox>) -> Self {
        Self { store, outbox }
    }
}

#[async_trait]
impl TimelineStrategy for PushTimeline {
    async fn fanout_post(&self, post: &Post) -> Result<FanoutReceipt> {
        // Durably enqueue before returning so a crash after post creation
        // cannot silently drop the fan-out. The caller is never blocked on
        // (or failed by) the fan-out itself.
        self.outbox
            .enqueue(&FanoutJob::new(post.clone(), None))
            .await?;
        Ok(FanoutReceipt::Enqueued)
    }

    async fn get_timeline(&self, user_id: UserId, limit: usize) -> Result<TimelinePage> {
        let timer = TIMELINE_READ_SECONDS
            .with_label_values(&["push"])
            .start_timer();
        let result = self.store.read(user_id, limit).await;
        timer.observe_duration();

        record_timeline_read("push", if result.is_ok() { "ok" } else { "error" });
        result
    }
}
