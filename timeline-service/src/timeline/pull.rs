//! Pull strategy: scatter-gather assembly at read time.
//!
//! Fetches every followed author's recent posts in one batched round trip
//! and keeps only the top `limit` via the bounded heap merge, so the cost
//! is O(candidates · log(limit)) regardless of how many authors are
//! followed.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use crate::clients::{PostStore, UserDirectory};
use crate::domain::{Post, TimelineEntry, TimelinePage, UserId};
use crate::error::Result;
use crate::metrics::{record_timeline_read, TIMELINE_READ_SECONDS};
use crate::relationship::RelationshipStore;
use crate::timeline::top_k::top_k_by_recency;
use crate::timeline::{FanoutReceipt, TimelineStrategy};

/// Floor on the per-author fetch depth, so small limits still see enough
/// of each author's history to merge fairly.
const MIN_PER_AUTHOR_FETCH: usize = 10;

pub struct PullTimeline {
    relationships: Arc<dyn RelationshipStore>,
    posts: Arc<dyn PostStore>,
    directory: Arc<dyn UserDirectory>,
}

impl PullTimeline {
    pub fn new(
        relationships: Arc<dyn RelationshipStore>,
        posts: Arc<dyn PostStore>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            relationships,
            posts,
            directory,
        }
    }

    async fn assemble(&self, user_id: UserId, limit: usize) -> Result<TimelinePage> {
        let following = self.relationships.get_all_following(user_id).await?;
        if following.is_empty() {
            return Ok(TimelinePage::empty());
        }

        let per_author_limit = limit.max(MIN_PER_AUTHOR_FETCH);
        let by_author = self
            .posts
            .batch_get_recent_posts(&following, per_author_limit)
            .await?;

        let candidates: Vec<TimelineEntry> = by_author
            .into_values()
            .flatten()
            .map(|post| entry_from_post(user_id, post))
            .collect();
        let total = candidates.len() as u64;

        let mut entries = top_k_by_recency(candidates, limit);
        self.resolve_display_names(&mut entries).await;

        Ok(TimelinePage { entries, total })
    }

    /// Best-effort display-name enrichment: a directory outage degrades the
    /// page to empty display names instead of failing the read.
    async fn resolve_display_names(&self, entries: &mut [TimelineEntry]) {
        let author_ids: Vec<UserId> = entries
            .iter()
            .map(|e| e.author_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if author_ids.is_empty() {
            return;
        }

        match self.directory.batch_get_user_info(&author_ids).await {
            Ok(lookup) => {
                for entry in entries.iter_mut() {
                    if let Some(user) = lookup.users.get(&entry.author_id) {
                        entry.author_display_name = user.display_name.clone();
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "skipping display-name enrichment on pull path");
            }
        }
    }
}

fn entry_from_post(owner_id: UserId, post: Post) -> TimelineEntry {
    TimelineEntry {
        owner_id,
        post_id: post.id,
        author_id: post.author_id,
        author_display_name: String::new(),
        content: post.content,
        created_at: post.created_at,
    }
}

#[async_trait]
impl TimelineStrategy for PullTimeline {
    async fn fanout_post(&self, _post: &Post) -> Result<FanoutReceipt> {
        // Nothing to materialize: the post store write (done by the caller)
        // is all the pull model needs.
        Ok(FanoutReceipt::PullOnly)
    }

    async fn get_timeline(&self, user_id: UserId, limit: usize) -> Result<TimelinePage> {
        let timer = TIMELINE_READ_SECONDS
            .with_label_values(&["pull"])
            .start_timer();
        let result = self.assemble(user_id, limit).await;
        timer.observe_duration();

        record_timeline_read("pull", if result.is_ok() { "ok" } else { "error" });
        result
    }
}
