//! Event payloads exchanged over the search stream.
//!
//! A stream is a sequence of frames, each naming one of the events below:
//! - `progress`: running statistics and skipped diagnostics
//! - `matches`: a JSON array of [`EventMatch`]
//! - `filters`: suggested query refinements
//! - `alert`: a recoverable notice (the stream still completes)
//! - `error`: a fatal execution error
//! - `done`: terminates the stream, always last

mod matches;
mod progress;

use serde::{Deserialize, Serialize};

use crate::error::WireError;
use crate::wire::Frame;

pub use matches::{
    ChunkMatch, EventCommitMatch, EventContentMatch, EventLineMatch, EventMatch, EventPathMatch,
    EventRepoMatch, EventSymbolMatch, Hunk, Location, Range, RepoId, Symbol,
};
pub use progress::{Progress, Severity, Skipped, SkippedReason, SkippedSuggested};

pub const EVENT_DONE: &str = "done";
pub const EVENT_PROGRESS: &str = "progress";
pub const EVENT_MATCHES: &str = "matches";
pub const EVENT_FILTERS: &str = "filters";
pub const EVENT_ALERT: &str = "alert";
pub const EVENT_ERROR: &str = "error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    pub value: String,
    pub label: String,
    pub count: usize,
    pub limit_hit: bool,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedQuery {
    pub description: String,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAlert {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub proposed_queries: Vec<ProposedQuery>,
}

impl EventAlert {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: Some(description.into()),
            kind: None,
            proposed_queries: Vec::new(),
        }
    }

    /// Alert raised when a deadline cut the stream short.
    pub fn incomplete_data(description: impl Into<String>) -> Self {
        Self {
            kind: Some("incomplete-data".to_string()),
            ..Self::new("Incomplete data", description)
        }
    }

    pub fn is_incomplete_data(&self) -> bool {
        self.kind.as_deref() == Some("incomplete-data")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventError {
    pub message: String,
}

/// One decoded stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Progress(Progress),
    Matches(Vec<EventMatch>),
    Filters(Vec<EventFilter>),
    Alert(EventAlert),
    Error(EventError),
    Done,
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Progress(_) => EVENT_PROGRESS,
            StreamEvent::Matches(_) => EVENT_MATCHES,
            StreamEvent::Filters(_) => EVENT_FILTERS,
            StreamEvent::Alert(_) => EVENT_ALERT,
            StreamEvent::Error(_) => EVENT_ERROR,
            StreamEvent::Done => EVENT_DONE,
        }
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, WireError> {
        let data = frame.data.as_slice();
        let event = match frame.event.as_str() {
            EVENT_DONE => StreamEvent::Done,
            EVENT_PROGRESS => StreamEvent::Progress(serde_json::from_slice(data)?),
            EVENT_MATCHES => StreamEvent::Matches(serde_json::from_slice(data)?),
            EVENT_FILTERS => StreamEvent::Filters(serde_json::from_slice(data)?),
            EVENT_ALERT => StreamEvent::Alert(serde_json::from_slice(data)?),
            EVENT_ERROR => StreamEvent::Error(serde_json::from_slice(data)?),
            other => {
                return Err(WireError::malformed(format!("unknown event name '{other}'")));
            }
        };
        Ok(event)
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StreamEvent::Done)
    }
}
