//! Redis-backed relationship store.
//!
//! Each index is an ordered Redis list:
//! - `relationship:followers:{target}`: users following the target
//! - `relationship:following:{follower}`: users the follower follows
//!
//! Unfollow removes by value (`LREM`), not by recomputed position, so
//! concurrent unfollows against the same list cannot remove the wrong
//! element. The two indices are written independently and without a
//! transaction: a partial edge is possible and tolerated.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use crate::domain::UserId;
use crate::error::{Result, ServiceError};
use crate::metrics::record_relationship_op;

use super::{clamp_limit, cursor, FollowersPage, RelationshipPage, RelationshipStore};

fn followers_key(user_id: UserId) -> String {
    format!("relationship:followers:{user_id}")
}

fn following_key(user_id: UserId) -> String {
    format!("relationship:following:{user_id}")
}

#[derive(Clone)]
pub struct RedisRelationshipStore {
    conn: ConnectionManager,
}

impl RedisRelationshipStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    async fn list_len(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = redis::cmd("LLEN")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(ServiceError::Storage)?;
        Ok(len)
    }

    async fn list_range(&self, key: &str, offset: u64, limit: usize) -> Result<Vec<UserId>> {
        let mut conn = self.conn.clone();
        let stop = offset as i64 + limit as i64 - 1;
        let ids: Vec<UserId> = redis::cmd("LRANGE")
            .arg(key)
            .arg(offset as i64)
            .arg(stop)
            .query_async(&mut conn)
            .await
            .map_err(ServiceError::Storage)?;
        Ok(ids)
    }

    async fn page_list(
        &self,
        key: &str,
        limit: Option<usize>,
        cursor_token: &str,
    ) -> Result<RelationshipPage> {
        let limit = clamp_limit(limit);
        let offset = cursor::decode(cursor_token)?;

        let total = self.list_len(key).await?;
        if offset >= total {
            return Ok(RelationshipPage {
                user_ids: Vec::new(),
                next_cursor: None,
                has_more: false,
            });
        }

        let user_ids = self.list_range(key, offset, limit).await?;
        let consumed = offset + user_ids.len() as u64;
        let has_more = consumed < total;

        Ok(RelationshipPage {
            user_ids,
            next_cursor: has_more.then(|| cursor::encode(consumed)),
            has_more,
        })
    }
}

#[async_trait]
impl RelationshipStore for RedisRelationshipStore {
    async fn follow(&self, follower_id: UserId, target_id: UserId) -> Result<()> {
        if follower_id == target_id {
            record_relationship_op("follow", "rejected");
            return Err(ServiceError::SelfFollow);
        }
        if self.check_edge(follower_id, target_id).await? {
            record_relationship_op("follow", "conflict");
            return Err(ServiceError::AlreadyFollowing {
                follower_id,
                target_id,
            });
        }

        let mut conn = self.conn.clone();
        redis::cmd("RPUSH")
            .arg(followers_key(target_id))
            .arg(follower_id)
            .query_async::<_, i64>(&mut conn)
            .await
            .map_err(ServiceError::Storage)?;

        // The reverse index is a separate write. If it fails the edge is
        // partially applied; the error is surfaced and a later follow or
        // unfollow reconciles the indices.
        if let Err(e) = redis::cmd("RPUSH")
            .arg(following_key(follower_id))
            .arg(target_id)
            .query_async::<_, i64>(&mut conn)
            .await
        {
            warn!(
                follower_id,
                target_id,
                error = %e,
                "follow partially applied: followers index written, following index failed"
            );
            record_relationship_op("follow", "partial");
            return Err(ServiceError::Storage(e));
        }

        debug!(follower_id, target_id, "follow edge created");
        record_relationship_op("follow", "ok");
        Ok(())
    }

    async fn unfollow(&self, follower_id: UserId, target_id: UserId) -> Result<()> {
        let mut conn = self.conn.clone();

        // LREM is atomic remove-by-value: no read-then-remove-by-position
        // race under concurrent unfollows.
        let removed: i64 = redis::cmd("LREM")
            .arg(followers_key(target_id))
            .arg(1)
            .arg(follower_id)
            .query_async(&mut conn)
            .await
            .map_err(ServiceError::Storage)?;

        if removed == 0 {
            record_relationship_op("unfollow", "conflict");
            return Err(ServiceError::NotFollowing {
                follower_id,
                target_id,
            });
        }

        let removed_reverse: i64 = redis::cmd("LREM")
            .arg(following_key(follower_id))
            .arg(1)
            .arg(target_id)
            .query_async(&mut conn)
            .await
            .map_err(ServiceError::Storage)?;

        if removed_reverse == 0 {
            // The indices had already diverged; the forward removal just
            // reconciled them.
            warn!(
                follower_id,
                target_id, "unfollow found no reverse-index entry to remove"
            );
        }

        debug!(follower_id, target_id, "follow edge removed");
        record_relationship_op("unfollow", "ok");
        Ok(())
    }

    async fn get_followers(
        &self,
        user_id: UserId,
        limit: Option<usize>,
        cursor: &str,
    ) -> Result<RelationshipPage> {
        self.page_list(&followers_key(user_id), limit, cursor).await
    }

    async fn get_following(
        &self,
        user_id: UserId,
        limit: Option<usize>,
        cursor: &str,
    ) -> Result<RelationshipPage> {
        self.page_list(&following_key(user_id), limit, cursor).await
    }

    async fn get_all_following(&self, user_id: UserId) -> Result<Vec<UserId>> {
        let mut conn = self.conn.clone();
        let ids: Vec<UserId> = redis::cmd("LRANGE")
            .arg(following_key(user_id))
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(ServiceError::Storage)?;
        Ok(ids)
    }

    async fn follower_count(&self, user_id: UserId) -> Result<u64> {
        self.list_len(&followers_key(user_id)).await
    }

    async fn following_count(&self, user_id: UserId) -> Result<u64> {
        self.list_len(&following_key(user_id)).await
    }

    async fn check_edge(&self, follower_id: UserId, target_id: UserId) -> Result<bool> {
        let mut conn = self.conn.clone();
        let position: Option<i64> = redis::cmd("LPOS")
            .arg(followers_key(target_id))
            .arg(follower_id)
            .query_async(&mut conn)
            .await
            .map_err(ServiceError::Storage)?;
        Ok(position.is_some())
    }

    async fn get_followers_page(
        &self,
        user_id: UserId,
        limit: usize,
        offset: u64,
    ) -> Result<FollowersPage> {
        let key = followers_key(user_id);
        let total_count = self.list_len(&key).await?;

        if offset >= total_count {
            return Ok(FollowersPage {
                user_ids: Vec::new(),
                total_count,
                has_more: false,
            });
        }

        let user_ids = self.list_range(&key, offset, limit).await?;
        let has_more = offset + (user_ids.len() as u64) < total_count;

        Ok(FollowersPage {
            user_ids,
            total_count,
            has_more,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format() {
        assert_eq!(followers_key(42), "relationship:followers:42");
        assert_eq!(following_key(42), "relationship:following:42");
        assert_eq!(followers_key(-7), "relationship:followers:-7");
    }
}
