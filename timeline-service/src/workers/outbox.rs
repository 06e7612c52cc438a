//! Durable fan-out outbox.
//!
//! Post creation enqueues the post itself, not a detached task, onto a
//! Redis list before returning to the caller, so a process crash after
//! "create post" cannot silently drop the fan-out. A background worker
//! drains jobs through the decision engine and publisher with at-least-once
//! semantics: a job is moved to a processing list while in flight and is
//! pushed back for redelivery on transient failure.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::Post;
use crate::error::{Result, ServiceError};
use crate::fanout::{FanoutDecision, FanoutDecisionEngine, FanoutPublisher, FanoutStats};
use crate::metrics::{FANOUT_SKIPPED_CELEBRITY, OUTBOX_DEPTH};
use crate::relationship::RelationshipStore;

const OUTBOX_KEY: &str = "fanout:outbox";
const PROCESSING_KEY: &str = "fanout:outbox:processing";

/// How long a drain poll blocks waiting for a job before looping.
const POLL_TIMEOUT_SECS: u64 = 5;

/// One unit of deferred fan-out work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FanoutJob {
    /// Unique per enqueue, for tracing a job across redeliveries.
    pub job_id: Uuid,
    pub post: Post,
    /// Embedded when the enqueuer already knows it; otherwise the consumer
    /// resolves it downstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_display_name: Option<String>,
}

impl FanoutJob {
    pub fn new(post: Post, author_display_name: Option<String>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            post,
            author_display_name,
        }
    }
}

#[async_trait]
pub trait FanoutOutbox: Send + Sync {
    /// Durably enqueue a fan-out job. Must succeed before post creation is
    /// acknowledged to the caller.
    async fn enqueue(&self, job: &FanoutJob) -> Result<()>;
}

#[derive(Clone)]
pub struct RedisFanoutOutbox {
    conn: ConnectionManager,
}

impl RedisFanoutOutbox {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl FanoutOutbox for RedisFanoutOutbox {
    async fn enqueue(&self, job: &FanoutJob) -> Result<()> {
        let payload = serde_json::to_string(job)?;
        let mut conn = self.conn.clone();
        let depth: i64 = redis::cmd("RPUSH")
            .arg(OUTBOX_KEY)
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(ServiceError::Storage)?;
        OUTBOX_DEPTH.set(depth);
        Ok(())
    }
}

/// What the worker did with one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutOutcome {
    Published(FanoutStats),
    SkippedCelebrity { follower_count: u64 },
}

/// The decision + publish step, separated from the queue plumbing so it is
/// testable without Redis.
pub struct FanoutProcessor {
    relationships: Arc<dyn RelationshipStore>,
    publisher: FanoutPublisher,
    engine: FanoutDecisionEngine,
}

impl FanoutProcessor {
    pub fn new(
        relationships: Arc<dyn RelationshipStore>,
        publisher: FanoutPublisher,
        engine: FanoutDecisionEngine,
    ) -> Self {
        Self {
            relationships,
            publisher,
            engine,
        }
    }

    pub async fn process(&self, job: &FanoutJob) -> Result<FanoutOutcome> {
        let follower_count = self
            .relationships
            .follower_count(job.post.author_id)
            .await?;

        match self.engine.decide(follower_count) {
            FanoutDecision::Pull => {
                FANOUT_SKIPPED_CELEBRITY.inc();
                info!(
                    author_id = job.post.author_id,
                    post_id = job.post.id,
                    follower_count,
                    "skipping push fan-out for celebrity audience"
                );
                Ok(FanoutOutcome::SkippedCelebrity { follower_count })
            }
            FanoutDecision::Push => {
                let stats = self
                    .publisher
                    .execute_push_fanout(&job.post, job.author_display_name.clone())
                    .await?;
                Ok(FanoutOutcome::Published(stats))
            }
        }
    }
}

/// Drains the outbox forever.
pub struct OutboxWorker {
    conn: ConnectionManager,
    processor: FanoutProcessor,
}

impl OutboxWorker {
    pub fn new(conn: ConnectionManager, processor: FanoutProcessor) -> Self {
        Self { conn, processor }
    }

    pub async fn run(self) {
        info!("starting fan-out outbox worker");
        loop {
            match self.step().await {
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "outbox drain step failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Claim one job, process it, then acknowledge or redeliver it.
    async fn step(&self) -> Result<Option<FanoutOutcome>> {
        let mut conn = self.conn.clone();

        let payload: Option<String> = redis::cmd("BLMOVE")
            .arg(OUTBOX_KEY)
            .arg(PROCESSING_KEY)
            .arg("LEFT")
            .arg("RIGHT")
            .arg(POLL_TIMEOUT_SECS)
            .query_async(&mut conn)
            .await
            .map_err(ServiceError::Storage)?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        let job: FanoutJob = match serde_json::from_str(&payload) {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "dropping corrupt fan-out job");
                self.ack(&payload).await?;
                return Ok(None);
            }
        };

        match self.processor.process(&job).await {
            Ok(outcome) => {
                self.ack(&payload).await?;
                Ok(Some(outcome))
            }
            Err(e) if e.is_transient() => {
                warn!(
                    job_id = %job.job_id,
                    post_id = job.post.id,
                    error = %e,
                    "fan-out job failed, re-enqueueing for redelivery"
                );
                self.redeliver(&payload).await?;
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(None)
            }
            Err(e) => {
                error!(
                    job_id = %job.job_id,
                    post_id = job.post.id,
                    error = %e,
                    "dropping unprocessable fan-out job"
                );
                self.ack(&payload).await?;
                Ok(None)
            }
        }
    }

    async fn ack(&self, payload: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let (depth,): (i64,) = redis::pipe()
            .cmd("LREM")
            .arg(PROCESSING_KEY)
            .arg(1)
            .arg(payload)
            .ignore()
            .cmd("LLEN")
            .arg(OUTBOX_KEY)
            .query_async(&mut conn)
            .await
            .map_err(ServiceError::Storage)?;
        OUTBOX_DEPTH.set(depth);
        Ok(())
    }

    async fn redeliver(&self, payload: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .cmd("LREM")
            .arg(PROCESSING_KEY)
            .arg(1)
            .arg(payload)
            .ignore()
            .cmd("RPUSH")
            .arg(OUTBOX_KEY)
            .arg(payload)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(ServiceError::Storage)?;
        Ok(())
    }
}
