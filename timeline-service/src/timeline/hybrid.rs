//! Hybrid strategy: materialized reads merged with a live pull.
//!
//! Both read paths run concurrently with no ordering dependency. One
//! failing path degrades to the other's result unmodified; both failing
//! fails the read.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::warn;

use crate::domain::{Post, PostId, TimelineEntry, TimelinePage, UserId};
use crate::error::{Result, ServiceError};
use crate::metrics::{record_timeline_read, TIMELINE_READ_SECONDS};
use crate::timeline::top_k::top_k_by_recency;
use crate::timeline::{FanoutReceipt, PullTimeline, PushTimeline, TimelineStrategy};

pub struct HybridTimeline {
    push: PushTimeline,
    pull: PullTimeline,
}

impl HybridTimeline {
    pub fn new(push: PushTimeline, pull: PullTimeline) -> Self {
        Self { push, pull }
    }

    async fn assemble(&self, user_id: UserId, limit: usize) -> Result<TimelinePage> {
        let (push_result, pull_result) = tokio::join!(
            self.push.get_timeline(user_id, limit),
            self.pull.get_timeline(user_id, limit)
        );

        match (push_result, pull_result) {
            (Err(push_err), Err(pull_err)) => Err(ServiceError::Upstream(format!(
                "both timeline paths failed: push: {push_err}; pull: {pull_err}"
            ))),
            (Ok(page), Err(e)) => {
                warn!(user_id, error = %e, "pull path failed, serving push-only timeline");
                Ok(page)
            }
            (Err(e), Ok(page)) => {
                warn!(user_id, error = %e, "push path failed, serving pull-only timeline");
                Ok(page)
            }
            (Ok(push_page), Ok(pull_page)) => Ok(merge(push_page, pull_page, limit)),
        }
    }
}

/// Merge the two pages: dedup by post id with the pull copy winning (it
/// reflects the freshest state), then re-run the bounded top-K over the
/// union. The reported total is the max of the two paths' totals, an
/// approximation of the union size rather than an exact count.
fn merge(push_page: TimelinePage, pull_page: TimelinePage, limit: usize) -> TimelinePage {
    let total = push_page.total.max(pull_page.total);

    let mut by_post: HashMap<PostId, TimelineEntry> = HashMap::new();
    for entry in push_page.entries {
        by_post.insert(entry.post_id, entry);
    }
    for entry in pull_page.entries {
        by_post.insert(entry.post_id, entry);
    }

    TimelinePage {
        entries: top_k_by_recency(by_post.into_values(), limit),
        total,
    }
}

#[async_trait]
impl TimelineStrategy for HybridTimeline {
    async fn fanout_post(&self, post: &Post) -> Result<FanoutReceipt> {
        // Hybrid always materializes; the outbox worker's celebrity check
        // is what bounds write amplification for very large audiences.
        self.push.fanout_post(post).await
    }

    async fn get_timeline(&self, user_id: UserId, limit: usize) -> Result<TimelinePage> {
        let timer = TIMELINE_READ_SECONDS
            .with_label_values(&["hybrid"])
            .start_timer();
        let result = self.assemble(user_id, limit).await;
        timer.observe_duration();

        record_timeline_read("hybrid", if result.is_ok() { "ok" } else { "error" });
        result
    }
}
