//! Core domain types shared across the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use event_schema::{PostId, UserId};

/// An immutable post, owned by the external post store. Post IDs are
/// snowflake-style and therefore time-sortable, but ordering within the
/// pipeline always uses `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One materialized feed row: what the owner sees for a single post.
/// Written once by the fan-out consumer, never updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineEntry {
    pub owner_id: UserId,
    pub post_id: PostId,
    pub author_id: UserId,
    pub author_display_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A timeline read result: entries newest-first plus the strategy's notion
/// of the total candidate count (see the hybrid merge for the caveat on
/// what "total" means there).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelinePage {
    pub entries: Vec<TimelineEntry>,
    pub total: u64,
}

impl TimelinePage {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            total: 0,
        }
    }
}
