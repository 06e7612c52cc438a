//! Write-time fan-out: deciding whether a post is pushed to followers'
//! materialized timelines, batching the audience into events, and draining
//! those events into timeline rows.

pub mod consumer;
pub mod decision;
pub mod publisher;

pub use consumer::{FanoutConsumer, FanoutConsumerConfig};
pub use decision::{FanoutDecision, FanoutDecisionEngine};
pub use publisher::{EventPublisher, FanoutPublisher, FanoutStats, KafkaEventPublisher};
