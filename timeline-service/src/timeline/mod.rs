//! Timeline assembly.
//!
//! Three interchangeable read/write strategies behind one small interface,
//! chosen once at startup and held by reference; handlers never branch on
//! a strategy string.

pub mod hybrid;
pub mod pull;
pub mod push;
pub mod store;
pub mod top_k;

pub use hybrid::HybridTimeline;
pub use pull::PullTimeline;
pub use push::PushTimeline;
pub use store::{RedisTimelineStore, TimelineStore, TimelineWrite};
pub use top_k::top_k_by_recency;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::{Post, TimelinePage, UserId};
use crate::error::Result;

/// The read strategy this process serves, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Push,
    Pull,
    Hybrid,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Push => "push",
            Strategy::Pull => "pull",
            Strategy::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "push" => Ok(Strategy::Push),
            "pull" => Ok(Strategy::Pull),
            "hybrid" => Ok(Strategy::Hybrid),
            other => Err(format!("unknown timeline strategy: {other}")),
        }
    }
}

/// What `fanout_post` did with the post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutReceipt {
    /// A fan-out job was durably enqueued; the outbox worker publishes it
    /// (or skips it at the celebrity threshold) asynchronously.
    Enqueued,
    /// This strategy never pushes; readers assemble at read time.
    PullOnly,
}

/// The strategy interface: how a freshly created post enters the pipeline,
/// and how a reader's feed is assembled.
#[async_trait]
pub trait TimelineStrategy: Send + Sync {
    /// Called after the post store accepted the post. Never blocks on the
    /// fan-out itself: push work is handed to the durable outbox.
    async fn fanout_post(&self, post: &Post) -> Result<FanoutReceipt>;

    /// Assemble the reader's feed, newest first, bounded by `limit`.
    async fn get_timeline(&self, user_id: UserId, limit: usize) -> Result<TimelinePage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parses_case_insensitively() {
        assert_eq!("push".parse::<Strategy>().unwrap(), Strategy::Push);
        assert_eq!("PULL".parse::<Strategy>().unwrap(), Strategy::Pull);
        assert_eq!("Hybrid".parse::<Strategy>().unwrap(), Strategy::Hybrid);
        assert!("fanout".parse::<Strategy>().is_err());
    }

    #[test]
    fn strategy_round_trips_display() {
        for s in [Strategy::Push, Strategy::Pull, Strategy::Hybrid] {
            assert_eq!(s.to_string().parse::<Strategy>().unwrap(), s);
        }
    }
}
