//! Process-wide stream metrics.
//!
//! The registry is created on first use and lives for the rest of the
//! process. Encoders record into it through [`observer`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use dashmap::DashMap;

use super::{EmitObservation, EmitObserver};

/// Upper bounds (inclusive, milliseconds) of the latency histogram buckets.
/// A final overflow bucket catches everything slower.
pub const LATENCY_BUCKETS_MS: [u64; 8] = [1, 5, 10, 25, 50, 100, 500, 1000];
const HISTOGRAM_SLOTS: usize = 9;

static STREAM_METRICS: OnceLock<StreamMetrics> = OnceLock::new();

pub fn global() -> &'static StreamMetrics {
    STREAM_METRICS.get_or_init(StreamMetrics::new)
}

/// Observer that records every emitted frame into [`global`].
pub fn observer() -> EmitObserver {
    Arc::new(|observation: &EmitObservation| global().record_emit(observation))
}

#[derive(Debug, Default)]
pub struct LatencyHistogram {
    buckets: [AtomicU64; HISTOGRAM_SLOTS],
    sum_us: AtomicU64,
}

impl LatencyHistogram {
    pub fn observe(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        let index = LATENCY_BUCKETS_MS
            .iter()
            .position(|bound| ms <= *bound)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        self.buckets[index].fetch_add(1, Ordering::Relaxed);
        self.sum_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn counts(&self) -> Vec<u64> {
        self.buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect()
    }

    pub fn total(&self) -> u64 {
        self.counts().iter().sum()
    }
}

#[derive(Debug, Default)]
pub struct EventStats {
    pub count: AtomicU64,
    pub errors: AtomicU64,
    pub bytes: AtomicU64,
    pub latency: LatencyHistogram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventStatsSnapshot {
    pub count: u64,
    pub errors: u64,
    pub bytes: u64,
}

#[derive(Debug, Default)]
pub struct StreamMetrics {
    events: DashMap<String, EventStats>,
    first_result: LatencyHistogram,
}

impl StreamMetrics {
    fn new() -> Self {
        Self::default()
    }

    pub fn record_emit(&self, observation: &EmitObservation) {
        let stats = self.events.entry(observation.event.clone()).or_default();
        stats.count.fetch_add(1, Ordering::Relaxed);
        stats
            .bytes
            .fetch_add(observation.bytes_written as u64, Ordering::Relaxed);
        if observation.error.is_some() {
            stats.errors.fetch_add(1, Ordering::Relaxed);
        }
        stats.latency.observe(observation.duration);
    }

    /// Time from request start to the first flushed match.
    pub fn record_first_result(&self, latency: Duration) {
        self.first_result.observe(latency);
    }

    pub fn first_result_latency(&self) -> &LatencyHistogram {
        &self.first_result
    }

    pub fn event(&self, name: &str) -> Option<EventStatsSnapshot> {
        self.events.get(name).map(|stats| EventStatsSnapshot {
            count: stats.count.load(Ordering::Relaxed),
            errors: stats.errors.load(Ordering::Relaxed),
            bytes: stats.bytes.load(Ordering::Relaxed),
        })
    }
}
