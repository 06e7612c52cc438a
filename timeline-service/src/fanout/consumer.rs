//! Fan-out consumer.
//!
//! Drains fan-out events from the durable queue and materializes one
//! timeline row per target. Delivery is at-least-once, so `apply_event`
//! must be idempotent; the offset is committed only after a batch is fully
//! applied, and transient failures leave the message uncommitted for
//! redelivery.

use event_schema::FanoutEvent;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::clients::UserDirectory;
use crate::error::{Result, ServiceError};
use crate::metrics::record_consumed;
use crate::timeline::store::{TimelineStore, TimelineWrite};

/// Configuration for the fan-out Kafka consumer
#[derive(Debug, Clone)]
pub struct FanoutConsumerConfig {
    pub brokers: String,
    pub group_id: String,
    pub topic: String,
}

pub struct FanoutConsumer {
    config: FanoutConsumerConfig,
    directory: Arc<dyn UserDirectory>,
    timelines: Arc<dyn TimelineStore>,
}

impl FanoutConsumer {
    pub fn new(
        config: FanoutConsumerConfig,
        directory: Arc<dyn UserDirectory>,
        timelines: Arc<dyn TimelineStore>,
    ) -> Self {
        Self {
            config,
            directory,
            timelines,
        }
    }

    /// Run the consumer loop
    pub async fn run(self) {
        if let Err(err) = self.run_inner().await {
            error!("fan-out consumer terminated with error: {err}");
        }
    }

    async fn run_inner(&self) -> std::result::Result<(), KafkaError> {
        info!(
            "starting fan-out consumer (topic: {}, group: {})",
            self.config.topic, self.config.group_id
        );

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .set("group.id", &self.config.group_id)
            // Offsets are committed manually, only after a batch has been
            // fully materialized.
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "45000")
            .set("max.poll.interval.ms", "300000")
            .create()?;

        consumer.subscribe(&[&self.config.topic])?;

        loop {
            match consumer.recv().await {
                Ok(record) => {
                    let Some(payload) = record.payload() else {
                        debug!("ignoring fan-out message with empty payload");
                        continue;
                    };

                    let event = match parse_event(payload) {
                        Ok(event) => event,
                        Err(e) => {
                            // Schema mismatch or unsupported event type:
                            // log and skip without committing. Redelivery
                            // after a restart re-skips it.
                            warn!(error = %e, "rejecting malformed fan-out message");
                            record_consumed("rejected");
                            continue;
                        }
                    };

                    match self.apply_event(&event).await {
                        Ok(applied) => {
                            debug!(
                                post_id = event.post_id,
                                targets = applied,
                                "fan-out batch materialized"
                            );
                            record_consumed("applied");
                            if let Err(commit_err) =
                                consumer.commit_message(&record, CommitMode::Async)
                            {
                                warn!("failed to commit fan-out offset: {commit_err}");
                            }
                        }
                        Err(e) if e.is_transient() => {
                            // Leave the message uncommitted; the queue's
                            // redelivery mechanism retries it.
                            warn!(
                                post_id = event.post_id,
                                error = %e,
                                "transient failure, leaving fan-out message for redelivery"
                            );
                            record_consumed("retried");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                        Err(e) => {
                            error!(
                                post_id = event.post_id,
                                error = %e,
                                "dropping unprocessable fan-out message"
                            );
                            record_consumed("rejected");
                            if let Err(commit_err) =
                                consumer.commit_message(&record, CommitMode::Async)
                            {
                                warn!("failed to commit fan-out offset: {commit_err}");
                            }
                        }
                    }
                }
                Err(err) => {
                    error!("kafka error: {err}");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Apply one fan-out event: resolve the author's display name if it is
    /// not embedded, then upsert one row per target.
    ///
    /// Idempotent under redelivery: the timeline store keys rows by
    /// (owner, post), so re-applying the same event is a no-op.
    pub async fn apply_event(&self, event: &FanoutEvent) -> Result<usize> {
        let author_display_name = match &event.author_display_name {
            Some(name) => name.clone(),
            None => {
                let lookup = self
                    .directory
                    .batch_get_user_info(&[event.author_id])
                    .await?;
                match lookup.users.get(&event.author_id) {
                    Some(user) => user.display_name.clone(),
                    // Unresolvable author is treated as transient: the
                    // directory may simply be lagging the identity write.
                    None => {
                        return Err(ServiceError::Upstream(format!(
                            "author {} not resolvable in user directory",
                            event.author_id
                        )))
                    }
                }
            }
        };

        let write = TimelineWrite {
            post_id: event.post_id,
            author_id: event.author_id,
            author_display_name,
            content: event.content.clone(),
            created_at: event.created_at,
        };

        self.timelines
            .upsert_batch(&event.target_user_ids, &write)
            .await?;
        Ok(event.target_user_ids.len())
    }
}

/// Parse and validate a fan-out message body.
pub fn parse_event(payload: &[u8]) -> Result<FanoutEvent> {
    let event: FanoutEvent = serde_json::from_slice(payload)?;
    event
        .validate()
        .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;
    Ok(event)
}
