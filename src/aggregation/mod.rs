//! Bounded-cardinality grouping of streamed results for analytics.

mod analytics;
mod topk;

pub use analytics::{aggregate_search, AggregationMode, AggregationResult, SearchAggregator};
pub use topk::{AggregationBucket, BoundedTopK, OtherCount};
