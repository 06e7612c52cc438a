//! Prometheus metrics for the fan-out pipeline.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

lazy_static! {
    /// Follow/unfollow mutations, labeled by operation and outcome.
    pub static ref RELATIONSHIP_MUTATIONS: IntCounterVec = register_int_counter_vec!(
        "timeline_relationship_mutations_total",
        "Follow/unfollow mutations by operation and outcome",
        &["op", "outcome"]
    )
    .unwrap();

    /// Fan-out events published to the topic.
    pub static ref FANOUT_EVENTS_PUBLISHED: IntCounter = register_int_counter!(
        "timeline_fanout_events_published_total",
        "Fan-out events published to the message bus"
    )
    .unwrap();

    /// Posts whose push fan-out was skipped because the author crossed the
    /// celebrity threshold.
    pub static ref FANOUT_SKIPPED_CELEBRITY: IntCounter = register_int_counter!(
        "timeline_fanout_skipped_celebrity_total",
        "Posts served pull-only because the author audience was too large"
    )
    .unwrap();

    /// Fan-out events drained from the queue, labeled by outcome
    /// (applied, rejected, retried).
    pub static ref FANOUT_EVENTS_CONSUMED: IntCounterVec = register_int_counter_vec!(
        "timeline_fanout_events_consumed_total",
        "Fan-out events consumed from the queue by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Timeline reads, labeled by strategy and outcome.
    pub static ref TIMELINE_READS: IntCounterVec = register_int_counter_vec!(
        "timeline_reads_total",
        "Timeline reads by strategy and outcome",
        &["strategy", "outcome"]
    )
    .unwrap();

    /// Timeline read latency per strategy.
    pub static ref TIMELINE_READ_SECONDS: HistogramVec = register_histogram_vec!(
        "timeline_read_duration_seconds",
        "Timeline read latency by strategy",
        &["strategy"]
    )
    .unwrap();

    /// Pending jobs in the durable fan-out outbox.
    pub static ref OUTBOX_DEPTH: IntGauge = register_int_gauge!(
        "timeline_fanout_outbox_depth",
        "Jobs waiting in the fan-out outbox"
    )
    .unwrap();
}

pub fn record_relationship_op(op: &str, outcome: &str) {
    RELATIONSHIP_MUTATIONS.with_label_values(&[op, outcome]).inc();
}

pub fn record_consumed(outcome: &str) {
    FANOUT_EVENTS_CONSUMED.with_label_values(&[outcome]).inc();
}

pub fn record_timeline_read(strategy: &str, outcome: &str) {
    TIMELINE_READS.with_label_values(&[strategy, outcome]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_register_once_and_increment() {
        record_relationship_op("follow", "ok");
        record_relationship_op("follow", "ok");
        assert!(RELATIONSHIP_MUTATIONS
            .with_label_values(&["follow", "ok"])
            .get() >= 2);

        record_consumed("applied");
        record_timeline_read("push", "ok");
        OUTBOX_DEPTH.set(3);
        assert_eq!(OUTBOX_DEPTH.get(), 3);
    }
}
