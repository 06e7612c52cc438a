//! Bounded top-K merge.
//!
//! Selecting the K most recent posts out of a large candidate multiset with
//! a fixed-size min-heap costs O(n log K) instead of the O(n log n) of
//! sort-then-truncate, and never holds more than K entries at once.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::domain::{PostId, TimelineEntry};

/// Heap ordering: newest first, post id as the tie-breaker so ordering is
/// total even for equal timestamps.
struct Ranked(TimelineEntry);

impl Ranked {
    fn key(&self) -> (i64, PostId) {
        (self.0.created_at.timestamp_millis(), self.0.post_id)
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Return the `limit` most recent entries, sorted newest first.
///
/// The heap holds at most `limit` entries: candidates are pushed while the
/// heap is underfull, and once full the minimum is replaced only by newer
/// candidates.
pub fn top_k_by_recency(
    candidates: impl IntoIterator<Item = TimelineEntry>,
    limit: usize,
) -> Vec<TimelineEntry> {
    if limit == 0 {
        return Vec::new();
    }

    let mut heap: BinaryHeap<Reverse<Ranked>> = BinaryHeap::with_capacity(limit + 1);
    for entry in candidates {
        let candidate = Ranked(entry);
        if heap.len() < limit {
            heap.push(Reverse(candidate));
        } else if let Some(Reverse(oldest)) = heap.peek() {
            if candidate > *oldest {
                heap.pop();
                heap.push(Reverse(candidate));
            }
        }
    }

    let mut entries: Vec<TimelineEntry> = heap.into_iter().map(|Reverse(r)| r.0).collect();
    entries.sort_by(|a, b| {
        (b.created_at, b.post_id).cmp(&(a.created_at, a.post_id))
    });
    entries
}
