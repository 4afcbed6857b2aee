//! Error types shared across the stream pipeline.

/// Errors raised while framing or parsing the event stream.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("payload too large: frame of {size} bytes exceeds the {limit} byte cap")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("malformed event: {0}")]
    MalformedEvent(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedEvent(message.into())
    }
}

/// Errors surfaced by the stream handler and the search endpoint.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("stream handler is closed")]
    Closed,
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("config error: {0}")]
    Config(String),
}

/// Failure reported by a repository metadata store.
#[derive(Debug, Clone, thiserror::Error)]
#[error("repository store error: {0}")]
pub struct StoreError(pub String);

/// Failures reported by the result-producing engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// The query could not be parsed or planned. Surfaced as an alert.
    #[error("{0}")]
    QueryParse(String),
    #[error("{0}")]
    Execution(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamsError {
    #[error("missing required query parameter 'q'")]
    MissingQuery,
    #[error("invalid value '{value}' for query parameter '{param}'")]
    InvalidValue { param: &'static str, value: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("config error: {0}")]
    Config(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timeout: {0}")]
    Timeout(String),
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("stream ended before the done event")]
    UnexpectedEof,
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            return Self::Timeout(value.to_string());
        }
        Self::Request(value.to_string())
    }
}
