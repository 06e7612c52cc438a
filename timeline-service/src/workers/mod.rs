//! Background workers owned by this process.

pub mod outbox;
pub mod redis_health;

pub use outbox::{
    FanoutJob, FanoutOutbox, FanoutOutcome, FanoutProcessor, OutboxWorker, RedisFanoutOutbox,
};
