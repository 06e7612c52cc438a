//! The follower/following graph.
//!
//! Edges are stored redundantly in two ordered lists (followers-of-target
//! and following-of-follower). The two writes are independent, so readers
//! must tolerate temporary divergence between the indices; only the
//! materialized timeline ever reconciles with this store's view at read
//! time.

pub mod cursor;
pub mod redis_store;

use crate::domain::UserId;
use crate::error::Result;
use async_trait::async_trait;

pub use redis_store::RedisRelationshipStore;

/// Default page size for follower/following reads.
pub const DEFAULT_PAGE_LIMIT: usize = 50;
/// Hard cap on caller-requested page sizes.
pub const MAX_PAGE_LIMIT: usize = 100;

/// A cursor-paginated slice of a relationship list.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipPage {
    pub user_ids: Vec<UserId>,
    /// Token resuming after this page; `None` when the list is exhausted.
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// An offset-paginated slice, used only by the fan-out publisher, which
/// needs deterministic resumption across a full scan rather than a stable
/// user-facing token.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowersPage {
    pub user_ids: Vec<UserId>,
    pub total_count: u64,
    pub has_more: bool,
}

/// Clamp a caller-provided limit into `[1, MAX_PAGE_LIMIT]`.
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
}

#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Create a follow edge. Fails with `SelfFollow` or `AlreadyFollowing`.
    ///
    /// The two index appends are not transactional: a failure after the
    /// first append leaves a partially-applied edge, which readers treat
    /// as a recoverable inconsistency.
    async fn follow(&self, follower_id: UserId, target_id: UserId) -> Result<()>;

    /// Remove a follow edge atomically by value. Fails with `NotFollowing`
    /// when no edge exists.
    async fn unfollow(&self, follower_id: UserId, target_id: UserId) -> Result<()>;

    /// Cursor-paginated followers of `user_id`. An empty cursor starts at
    /// the head. A cursor is only meaningful against the list it was
    /// derived from: if the list mutates between pages, entries may be
    /// skipped or repeated.
    async fn get_followers(
        &self,
        user_id: UserId,
        limit: Option<usize>,
        cursor: &str,
    ) -> Result<RelationshipPage>;

    /// Cursor-paginated following list, symmetric to `get_followers`.
    async fn get_following(
        &self,
        user_id: UserId,
        limit: Option<usize>,
        cursor: &str,
    ) -> Result<RelationshipPage>;

    /// The full following list, for the pull-path read.
    async fn get_all_following(&self, user_id: UserId) -> Result<Vec<UserId>>;

    /// O(1) follower count.
    async fn follower_count(&self, user_id: UserId) -> Result<u64>;

    /// O(1) following count.
    async fn following_count(&self, user_id: UserId) -> Result<u64>;

    /// Whether `follower_id` follows `target_id`.
    async fn check_edge(&self, follower_id: UserId, target_id: UserId) -> Result<bool>;

    /// Offset-paginated follower scan for the fan-out publisher.
    async fn get_followers_page(
        &self,
        user_id: UserId,
        limit: usize,
        offset: u64,
    ) -> Result<FollowersPage>;
}
