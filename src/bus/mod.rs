//! Consumer-side event pacing.
//!
//! Decoded stream events can arrive far faster than an interactive consumer
//! wants to redraw. The batcher forwards the first event at once and then
//! coalesces bursts into one event per delay window:
//! - `Mergeable`: how two events of one type combine
//! - `ResultsUpdate`: the merged view of decoded `StreamEvent`s
//! - `EventBatcher`: the debounce task between two channels

mod batcher;

pub use batcher::{EventBatcher, Mergeable, ResultsUpdate};
