//! Common test utilities for stream integration tests.

pub mod mock_engine;
pub mod mock_store;

pub use mock_engine::{MockEngine, Step};
pub use mock_store::MockRepoStore;

use search_stream::api::{EventMatch, EventPathMatch, StreamEvent};
use search_stream::wire::decode_frames;

pub fn path_match(id: i32, repo: &str, path: &str) -> EventMatch {
    EventMatch::Path(EventPathMatch {
        path: path.to_string(),
        repository_id: id,
        repository: repo.to_string(),
        ..Default::default()
    })
}

/// Decode a complete response body into events.
pub fn decode(body: &[u8]) -> Vec<StreamEvent> {
    decode_frames(body)
        .expect("response should decode")
        .iter()
        .map(|frame| StreamEvent::from_frame(frame).expect("known event"))
        .collect()
}
