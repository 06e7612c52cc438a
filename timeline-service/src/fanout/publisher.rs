//! Fan-out event publishing.
//!
//! Pages the author's full audience out of the relationship store and emits
//! one `FanoutEvent` per page. A publish failure aborts the remaining
//! pages; pages already on the bus are NOT rolled back, so a failed fan-out
//! may have partially succeeded. Consumers and operators must treat
//! "failed" as "possibly partial".

use async_trait::async_trait;
use event_schema::FanoutEvent;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::domain::Post;
use crate::error::{Result, ServiceError};
use crate::metrics::FANOUT_EVENTS_PUBLISHED;
use crate::relationship::RelationshipStore;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &FanoutEvent) -> Result<()>;
}

/// Kafka-backed event publisher.
#[derive(Clone)]
pub struct KafkaEventPublisher {
    producer: FutureProducer,
    topic: String,
}

impl KafkaEventPublisher {
    pub fn new(brokers: &str, topic: impl Into<String>) -> Result<Self> {
        let producer = rdkafka::config::ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("client.id", "timeline-service")
            // Idempotency and reliability settings
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("max.in.flight.requests.per.connection", "5")
            .set("retries", "3")
            .set("linger.ms", "5")
            .create::<FutureProducer>()?;

        let topic = topic.into();
        info!(topic = %topic, "fan-out Kafka producer initialized");
        Ok(Self { producer, topic })
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, event: &FanoutEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        // Keying by author keeps one post's batches on one partition.
        let partition_key = event.author_id.to_string();

        let headers = OwnedHeaders::new().insert(Header {
            key: "event_type",
            value: Some(event.event_type.as_str()),
        });

        let record = FutureRecord::to(&self.topic)
            .key(&partition_key)
            .payload(&payload)
            .headers(headers);

        match self.producer.send(record, Duration::from_secs(5)).await {
            Ok(_) => Ok(()),
            Err((err, _)) => {
                warn!(
                    error = %err,
                    author_id = event.author_id,
                    post_id = event.post_id,
                    "failed to publish fan-out event"
                );
                Err(ServiceError::Bus(err.to_string()))
            }
        }
    }
}

/// Outcome of a completed push fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutStats {
    pub events_published: usize,
    pub targets_covered: usize,
}

pub struct FanoutPublisher {
    relationships: Arc<dyn RelationshipStore>,
    events: Arc<dyn EventPublisher>,
    batch_size: usize,
}

impl FanoutPublisher {
    pub fn new(
        relationships: Arc<dyn RelationshipStore>,
        events: Arc<dyn EventPublisher>,
        batch_size: usize,
    ) -> Self {
        Self {
            relationships,
            events,
            batch_size: batch_size.clamp(1, event_schema::MAX_TARGETS_PER_EVENT),
        }
    }

    /// Page through the author's followers and publish one event per page.
    /// No state is retained between pages other than the offset.
    pub async fn execute_push_fanout(
        &self,
        post: &Post,
        author_display_name: Option<String>,
    ) -> Result<FanoutStats> {
        let mut stats = FanoutStats::default();
        let mut offset = 0u64;

        loop {
            let page = self
                .relationships
                .get_followers_page(post.author_id, self.batch_size, offset)
                .await?;

            if page.user_ids.is_empty() {
                break;
            }

            let batch_len = page.user_ids.len();
            let event = FanoutEvent::feed_write(
                post.id,
                post.author_id,
                author_display_name.clone(),
                page.user_ids,
                post.content.clone(),
                post.created_at,
            );

            if let Err(e) = self.events.publish(&event).await {
                error!(
                    post_id = post.id,
                    author_id = post.author_id,
                    pages_published = stats.events_published,
                    error = %e,
                    "aborting push fan-out; already-published pages are not rolled back"
                );
                return Err(e);
            }

            FANOUT_EVENTS_PUBLISHED.inc();
            stats.events_published += 1;
            stats.targets_covered += batch_len;
            offset += batch_len as u64;

            if !page.has_more {
                break;
            }
        }

        info!(
            post_id = post.id,
            author_id = post.author_id,
            events = stats.events_published,
            targets = stats.targets_covered,
            "push fan-out published"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;
    use crate::error::Result;
    use crate::relationship::{FollowersPage, RelationshipPage};
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StaticFollowers {
        followers: Vec<UserId>,
    }

    #[async_trait]
    impl RelationshipStore for StaticFollowers {
        async fn follow(&self, _: UserId, _: UserId) -> Result<()> {
            unimplemented!()
        }
        async fn unfollow(&self, _: UserId, _: UserId) -> Result<()> {
            unimplemented!()
        }
        async fn get_followers(
            &self,
            _: UserId,
            _: Option<usize>,
            _: &str,
        ) -> Result<RelationshipPage> {
            unimplemented!()
        }
        async fn get_following(
            &self,
            _: UserId,
            _: Option<usize>,
            _: &str,
        ) -> Result<RelationshipPage> {
            unimplemented!()
        }
        async fn get_all_following(&self, _: UserId) -> Result<Vec<UserId>> {
            unimplemented!()
        }
        async fn follower_count(&self, _: UserId) -> Result<u64> {
            Ok(self.followers.len() as u64)
        }
        async fn following_count(&self, _: UserId) -> Result<u64> {
            unimplemented!()
        }
        async fn check_edge(&self, _: UserId, _: UserId) -> Result<bool> {
            unimplemented!()
        }
        async fn get_followers_page(
            &self,
            _: UserId,
            limit: usize,
            offset: u64,
        ) -> Result<FollowersPage> {
            let total = self.followers.len();
            let start = (offset as usize).min(total);
            let end = (start + limit).min(total);
            Ok(FollowersPage {
                user_ids: self.followers[start..end].to_vec(),
                total_count: total as u64,
                has_more: end < total,
            })
        }
    }

    #[derive(Default)]
    struct CollectingPublisher {
        events: Mutex<Vec<FanoutEvent>>,
        fail_after: Option<usize>,
        published: AtomicUsize,
    }

    #[async_trait]
    impl EventPublisher for CollectingPublisher {
        async fn publish(&self, event: &FanoutEvent) -> Result<()> {
            if let Some(limit) = self.fail_after {
                if self.published.load(Ordering::SeqCst) >= limit {
                    return Err(ServiceError::Bus("broker unavailable".into()));
                }
            }
            self.published.fetch_add(1, Ordering::SeqCst);
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn post(author_id: UserId) -> Post {
        Post {
            id: 500,
            author_id,
            content: "hello".into(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn small_audience_fits_one_event() {
        let store = Arc::new(StaticFollowers {
            followers: vec![1, 2, 3],
        });
        let sink = Arc::new(CollectingPublisher::default());
        let publisher = FanoutPublisher::new(store, sink.clone(), 1000);

        let stats = publisher
            .execute_push_fanout(&post(9), Some("Ada".into()))
            .await
            .unwrap();

        assert_eq!(stats.events_published, 1);
        assert_eq!(stats.targets_covered, 3);
        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target_user_ids, vec![1, 2, 3]);
        assert_eq!(events[0].author_display_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn large_audience_is_batched_in_order() {
        let store = Arc::new(StaticFollowers {
            followers: (0..2500).collect(),
        });
        let sink = Arc::new(CollectingPublisher::default());
        let publisher = FanoutPublisher::new(store, sink.clone(), 1000);

        let stats = publisher.execute_push_fanout(&post(9), None).await.unwrap();

        assert_eq!(stats.events_published, 3);
        assert_eq!(stats.targets_covered, 2500);

        let events = sink.events.lock().unwrap();
        assert_eq!(events[0].target_user_ids.len(), 1000);
        assert_eq!(events[1].target_user_ids.len(), 1000);
        assert_eq!(events[2].target_user_ids.len(), 500);

        // Paging from offset 0 covers the audience exactly once, in order.
        let all: Vec<UserId> = events
            .iter()
            .flat_map(|e| e.target_user_ids.clone())
            .collect();
        assert_eq!(all, (0..2500).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn no_followers_publishes_nothing() {
        let store = Arc::new(StaticFollowers { followers: vec![] });
        let sink = Arc::new(CollectingPublisher::default());
        let publisher = FanoutPublisher::new(store, sink.clone(), 1000);

        let stats = publisher.execute_push_fanout(&post(9), None).await.unwrap();
        assert_eq!(stats, FanoutStats::default());
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_aborts_remaining_pages() {
        let store = Arc::new(StaticFollowers {
            followers: (0..2500).collect(),
        });
        let sink = Arc::new(CollectingPublisher {
            fail_after: Some(1),
            ..Default::default()
        });
        let publisher = FanoutPublisher::new(store, sink.clone(), 1000);

        let err = publisher
            .execute_push_fanout(&post(9), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Bus(_)));

        // The first page stays published: partial fan-out is an accepted
        // outcome, not rolled back.
        assert_eq!(sink.events.lock().unwrap().len(), 1);
    }
}
