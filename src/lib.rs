//! Streaming delivery of search results.
//!
//! A search engine produces result batches; this crate frames them as
//! `event:`/`data:` pairs on one long-lived HTTP response while bounding
//! write rate and frame size, reporting progress with "results may be
//! incomplete" diagnostics, and always ending with a single `done` event.
//! The consumer side decodes the stream, debounces it for interactive use
//! and groups it into bounded top-K aggregates for analytics.
//!
//! # Architecture
//!
//! Producer: engine → `HandlerSender` → `StreamEventHandler` → `WireEncoder` → client
//! - `wire`: frame encoder/decoder and process-wide emit metrics
//! - `api`: event payloads (`Progress`, `EventMatch`, filters, alerts)
//! - `buffer`: size-bounded JSON array of pending matches
//! - `hunks`: grouping of line matches into decorated hunks
//! - `progress`: running statistics and ordered skip diagnostics
//! - `filters`: query refinement suggestions
//! - `handler`: per-request control loop (flush and progress ticks)
//! - `endpoint`: request parameters and the engine run
//!
//! Consumer: `SearchClient` → `WireDecoder` → `EventBatcher` / `SearchAggregator`
//! - `client`: HTTP client for a remote stream
//! - `bus`: debounce/merge batching of decoded events
//! - `aggregation`: bounded top-K grouping under a deadline

pub mod aggregation;
pub mod api;
pub mod buffer;
pub mod bus;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod filters;
pub mod handler;
pub mod hunks;
pub mod progress;
pub mod search;
pub mod wire;

#[cfg(test)]
mod testing;

pub use api::StreamEvent;
pub use client::SearchClient;
pub use config::StreamConfig;
pub use endpoint::{SearchParams, SearchStream, StreamOutcome, RESPONSE_HEADERS};
pub use error::{ClientError, StreamError, WireError};
pub use handler::{HandlerConfig, HandlerSender, StreamEventHandler};
pub use search::{RepoStore, SearchEngine, SearchEvent, Stats};
pub use wire::{WireDecoder, WireEncoder};

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

const DEFAULT_LOG_FILTER: &str = "search_stream=debug,info";

/// Install a `tracing` subscriber on stderr. `RUST_LOG` overrides the
/// default filter. Calling it again is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .try_init();
}
