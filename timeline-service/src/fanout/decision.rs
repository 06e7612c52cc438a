//! Per-post fan-out decision.
//!
//! A pure function of the author's follower count: small audiences are
//! pushed, audiences at or above the celebrity threshold fall back to
//! pull-time assembly to bound write amplification.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutDecision {
    /// Materialize the post into every follower's timeline.
    Push,
    /// Skip push fan-out; readers pick the post up on the pull path.
    Pull,
}

#[derive(Debug, Clone)]
pub struct FanoutDecisionEngine {
    celebrity_threshold: u64,
}

impl FanoutDecisionEngine {
    pub fn new(celebrity_threshold: u64) -> Self {
        Self {
            celebrity_threshold,
        }
    }

    pub fn decide(&self, follower_count: u64) -> FanoutDecision {
        if follower_count >= self.celebrity_threshold {
            FanoutDecision::Pull
        } else {
            FanoutDecision::Push
        }
    }
}
