use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationBucket {
    pub label: String,
    pub count: usize,
}

/// Results folded out of the tracked set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtherCount {
    pub result_count: usize,
    pub group_count: usize,
}

/// Presentation order, also used for eviction: higher count first, ties
/// broken by ascending label.
fn rank(a_label: &str, a_count: usize, b_label: &str, b_count: usize) -> Ordering {
    b_count.cmp(&a_count).then_with(|| a_label.cmp(b_label))
}

/// Tracks at most `capacity` labels with the highest counts seen so far.
///
/// A new label enters a full set only if it ranks before the current
/// smallest entry, which is then evicted. Evicted and rejected counts are
/// kept in [`OtherCount`], so `sum(tracked) + other.result_count` always
/// equals the sum of every `add`.
#[derive(Debug, Clone)]
pub struct BoundedTopK {
    capacity: usize,
    counts: HashMap<String, usize>,
    smallest: Option<String>,
    other: OtherCount,
}

impl BoundedTopK {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            counts: HashMap::with_capacity(capacity),
            smallest: None,
            other: OtherCount::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn other(&self) -> OtherCount {
        self.other
    }

    pub fn add(&mut self, label: &str, count: usize) {
        if let Some(tracked) = self.counts.get_mut(label) {
            *tracked += count;
            self.refresh_smallest();
            return;
        }

        if self.counts.len() < self.capacity {
            self.counts.insert(label.to_string(), count);
            self.refresh_smallest();
            return;
        }

        let Some(smallest) = self.smallest.clone() else {
            // Zero capacity: nothing is ever tracked.
            self.fold(count);
            return;
        };
        let smallest_count = self.counts.get(&smallest).copied().unwrap_or(0);
        if rank(label, count, &smallest, smallest_count) == Ordering::Less {
            self.counts.remove(&smallest);
            self.fold(smallest_count);
            self.counts.insert(label.to_string(), count);
            self.refresh_smallest();
        } else {
            self.fold(count);
        }
    }

    fn fold(&mut self, count: usize) {
        self.other.result_count += count;
        self.other.group_count += 1;
    }

    fn refresh_smallest(&mut self) {
        self.smallest = self
            .counts
            .iter()
            .max_by(|(a, ac), (b, bc)| rank(a, **ac, b, **bc))
            .map(|(label, _)| label.clone());
    }

    /// Tracked buckets, highest count first.
    pub fn sort_aggregate(&self) -> Vec<AggregationBucket> {
        let mut buckets: Vec<AggregationBucket> = self
            .counts
            .iter()
            .map(|(label, count)| AggregationBucket {
                label: label.clone(),
                count: *count,
            })
            .collect();
        buckets.sort_by(|a, b| rank(&a.label, a.count, &b.label, b.count));
        buckets
    }
}
