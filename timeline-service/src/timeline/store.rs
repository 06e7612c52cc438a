//! Materialized timeline storage.
//!
//! The push model keeps one row per (owner, post). In Redis that is:
//! - `timeline:{owner}`: sorted set, member = post id, score = created_at
//!   in epoch millis. ZADD of an existing member is a no-op on membership,
//!   which makes duplicate application of a fan-out batch observably
//!   idempotent without any locking.
//! - `timeline:post:{post_id}`: hash holding the immutable post payload,
//!   shared by every owner the post was fanned out to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use tracing::warn;

use crate::domain::{PostId, TimelineEntry, TimelinePage, UserId};
use crate::error::{Result, ServiceError};

fn timeline_key(owner_id: UserId) -> String {
    format!("timeline:{owner_id}")
}

fn post_payload_key(post_id: PostId) -> String {
    format!("timeline:post:{post_id}")
}

/// The owner-independent part of a materialized row, written once per
/// fan-out event and stamped onto every target's timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineWrite {
    pub post_id: PostId,
    pub author_id: UserId,
    pub author_display_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl TimelineWrite {
    pub fn entry_for(&self, owner_id: UserId) -> TimelineEntry {
        TimelineEntry {
            owner_id,
            post_id: self.post_id,
            author_id: self.author_id,
            author_display_name: self.author_display_name.clone(),
            content: self.content.clone(),
            created_at: self.created_at,
        }
    }
}

#[async_trait]
pub trait TimelineStore: Send + Sync {
    /// Materialize one entry per owner. MUST be idempotent under
    /// redelivery: applying the same write to the same owners twice leaves
    /// the store in the same state as applying it once.
    async fn upsert_batch(&self, owner_ids: &[UserId], write: &TimelineWrite) -> Result<()>;

    /// Read an owner's materialized timeline, newest first, bounded by
    /// `limit`. `total` is the owner's full materialized row count.
    async fn read(&self, owner_id: UserId, limit: usize) -> Result<TimelinePage>;
}

#[derive(Clone)]
pub struct RedisTimelineStore {
    conn: ConnectionManager,
    /// Write-side bound on rows kept per owner; oldest rows beyond the cap
    /// are evicted at upsert time.
    max_entries_per_user: usize,
}

impl RedisTimelineStore {
    pub fn new(conn: ConnectionManager, max_entries_per_user: usize) -> Self {
        Self {
            conn,
            max_entries_per_user,
        }
    }
}

#[async_trait]
impl TimelineStore for RedisTimelineStore {
    async fn upsert_batch(&self, owner_ids: &[UserId], write: &TimelineWrite) -> Result<()> {
        if owner_ids.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let score = write.created_at.timestamp_millis();

        let mut pipe = redis::pipe();
        pipe.cmd("HSET")
            .arg(post_payload_key(write.post_id))
            .arg("author_id")
            .arg(write.author_id)
            .arg("author_display_name")
            .arg(&write.author_display_name)
            .arg("content")
            .arg(&write.content)
            .arg("created_at")
            .arg(write.created_at.to_rfc3339())
            .ignore();

        for owner_id in owner_ids {
            let key = timeline_key(*owner_id);
            pipe.cmd("ZADD")
                .arg(&key)
                .arg(score)
                .arg(write.post_id)
                .ignore();
            // Keep only the newest max_entries_per_user rows.
            pipe.cmd("ZREMRANGEBYRANK")
                .arg(&key)
                .arg(0)
                .arg(-(self.max_entries_per_user as i64) - 1)
                .ignore();
        }

        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(ServiceError::Storage)?;
        Ok(())
    }

    async fn read(&self, owner_id: UserId, limit: usize) -> Result<TimelinePage> {
        let mut conn = self.conn.clone();
        let key = timeline_key(owner_id);

        let total: u64 = redis::cmd("ZCARD")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(ServiceError::Storage)?;

        if total == 0 || limit == 0 {
            return Ok(TimelinePage {
                entries: Vec::new(),
                total,
            });
        }

        let post_ids: Vec<PostId> = redis::cmd("ZREVRANGE")
            .arg(&key)
            .arg(0)
            .arg(limit as i64 - 1)
            .query_async(&mut conn)
            .await
            .map_err(ServiceError::Storage)?;

        if post_ids.is_empty() {
            return Ok(TimelinePage {
                entries: Vec::new(),
                total,
            });
        }

        let mut pipe = redis::pipe();
        for post_id in &post_ids {
            pipe.cmd("HGETALL").arg(post_payload_key(*post_id));
        }
        let payloads: Vec<HashMap<String, String>> = pipe
            .query_async(&mut conn)
            .await
            .map_err(ServiceError::Storage)?;

        let mut entries = Vec::with_capacity(post_ids.len());
        for (post_id, fields) in post_ids.into_iter().zip(payloads) {
            match hydrate_entry(owner_id, post_id, &fields) {
                Some(entry) => entries.push(entry),
                None => {
                    // Dangling sorted-set member: payload hash missing or
                    // corrupt. Serve the rest of the page.
                    warn!(owner_id, post_id, "skipping timeline row without payload");
                }
            }
        }

        Ok(TimelinePage { entries, total })
    }
}

fn hydrate_entry(
    owner_id: UserId,
    post_id: PostId,
    fields: &HashMap<String, String>,
) -> Option<TimelineEntry> {
    let author_id = fields.get("author_id")?.parse().ok()?;
    let created_at = fields
        .get("created_at")
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())?
        .with_timezone(&Utc);

    Some(TimelineEntry {
        owner_id,
        post_id,
        author_id,
        author_display_name: fields.get("author_display_name").cloned().unwrap_or_default(),
        content: fields.get("content").cloned().unwrap_or_default(),
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn key_format() {
        assert_eq!(timeline_key(9), "timeline:9");
        assert_eq!(post_payload_key(1234), "timeline:post:1234");
    }

    #[test]
    fn hydrate_round_trip() {
        let created = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();
        let mut fields = HashMap::new();
        fields.insert("author_id".to_string(), "42".to_string());
        fields.insert("author_display_name".to_string(), "Ada".to_string());
        fields.insert("content".to_string(), "hello".to_string());
        fields.insert("created_at".to_string(), created.to_rfc3339());

        let entry = hydrate_entry(7, 100, &fields).unwrap();
        assert_eq!(entry.owner_id, 7);
        assert_eq!(entry.post_id, 100);
        assert_eq!(entry.author_id, 42);
        assert_eq!(entry.author_display_name, "Ada");
        assert_eq!(entry.created_at, created);
    }

    #[test]
    fn hydrate_rejects_missing_fields() {
        let fields = HashMap::new();
        assert!(hydrate_entry(7, 100, &fields).is_none());
    }

    #[test]
    fn write_template_stamps_owner() {
        let write = TimelineWrite {
            post_id: 5,
            author_id: 2,
            author_display_name: "Ada".into(),
            content: "hi".into(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        let entry = write.entry_for(11);
        assert_eq!(entry.owner_id, 11);
        assert_eq!(entry.post_id, 5);
    }
}
