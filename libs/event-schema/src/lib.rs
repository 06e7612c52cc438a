//! Wire schemas for the fan-out pipeline.
//!
//! Every component that produces or consumes a fan-out message depends on
//! this crate instead of maintaining its own copy of the payload shape.
//! Producer and consumer drifting apart is how feeds silently stop being
//! written, so the contract lives in exactly one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User identifiers are int64 on the wire.
pub type UserId = i64;

/// Post identifiers are snowflake-style int64: time-sortable, minted by the
/// post store.
pub type PostId = i64;

/// The only event type the fan-out consumer materializes today.
pub const EVENT_TYPE_FEED_WRITE: &str = "FeedWrite";

/// Upper bound on `target_user_ids` per event. A post with N followers is
/// split into ceil(N / MAX_TARGETS_PER_EVENT) events by the publisher.
pub const MAX_TARGETS_PER_EVENT: usize = 1000;

/// One batch of a post's fan-out audience.
///
/// Delivery is at-least-once: the same batch may arrive more than once and
/// consumers must apply it idempotently, keyed by `(owner, post_id)`.
///
/// `post_id` rides along even though only the author/content fields are
/// user-visible: without it the consumer has no idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FanoutEvent {
    /// Discriminator, `"FeedWrite"` for timeline materialization.
    pub event_type: String,
    pub post_id: PostId,
    pub author_id: UserId,
    /// Filled by the producer when it already knows the display name;
    /// otherwise the consumer resolves it from the user directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_display_name: Option<String>,
    /// Follower IDs covered by this batch, at most [`MAX_TARGETS_PER_EVENT`].
    pub target_user_ids: Vec<UserId>,
    pub content: String,
    /// RFC 3339 / ISO-8601 on the wire via chrono's serde impl.
    pub created_at: DateTime<Utc>,
}

impl FanoutEvent {
    pub fn feed_write(
        post_id: PostId,
        author_id: UserId,
        author_display_name: Option<String>,
        target_user_ids: Vec<UserId>,
        content: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type: EVENT_TYPE_FEED_WRITE.to_string(),
            post_id,
            author_id,
            author_display_name,
            target_user_ids,
            content,
            created_at,
        }
    }

    /// Whether this event is one the consumer knows how to apply.
    pub fn is_feed_write(&self) -> bool {
        self.event_type == EVENT_TYPE_FEED_WRITE
    }

    /// Validate structural invariants that serde alone does not enforce.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if !self.is_feed_write() {
            return Err(SchemaError::UnsupportedEventType(self.event_type.clone()));
        }
        if self.target_user_ids.is_empty() {
            return Err(SchemaError::EmptyTargets);
        }
        if self.target_user_ids.len() > MAX_TARGETS_PER_EVENT {
            return Err(SchemaError::TooManyTargets(self.target_user_ids.len()));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("unsupported event_type: {0}")]
    UnsupportedEventType(String),

    #[error("target_user_ids must not be empty")]
    EmptyTargets,

    #[error("target_user_ids has {0} entries, max is {MAX_TARGETS_PER_EVENT}")]
    TooManyTargets(usize),
}
