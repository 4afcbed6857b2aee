use serde::{Deserialize, Serialize};

/// Machine-readable reason a result set may be incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkippedReason {
    RepositoryMissing,
    RepositoryCloning,
    ShardMatchLimit,
    #[serde(rename = "shard-timedout")]
    ShardTimedOut,
    BackendMissing,
    ExcludedFork,
    ExcludedArchive,
    Display,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedSuggested {
    pub title: String,
    pub query_expression: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skipped {
    pub reason: SkippedReason,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested: Option<SkippedSuggested>,
}

/// Payload of a `progress` event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub done: bool,
    /// Only reported on the final progress event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repositories_count: Option<usize>,
    pub match_count: usize,
    pub duration_ms: u64,
    #[serde(default)]
    pub skipped: Vec<Skipped>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}
