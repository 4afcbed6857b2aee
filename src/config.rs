use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// Hard cap on a single framed event (event name + payload + framing).
pub const MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;
/// Buffered match payload size that forces a `matches` flush.
pub const MATCH_BUFFER_THRESHOLD: usize = 32 * 1024;

const ENV_PREFIX: &str = "SEARCH_STREAM_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamConfig {
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    #[serde(default = "default_match_buffer_threshold")]
    pub match_buffer_threshold: usize,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    /// Result limit applied by the engine when the query names none.
    #[serde(default = "default_match_limit")]
    pub match_limit: usize,
    /// Request deadline; `0` disables it.
    #[serde(default)]
    pub request_timeout_ms: u64,
    #[serde(default = "default_aggregation_timeout_ms")]
    pub aggregation_timeout_ms: u64,
    #[serde(default = "default_aggregation_capacity")]
    pub aggregation_capacity: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

fn default_flush_interval_ms() -> u64 {
    100
}

fn default_progress_interval_ms() -> u64 {
    500
}

fn default_match_buffer_threshold() -> usize {
    MATCH_BUFFER_THRESHOLD
}

fn default_max_payload_bytes() -> usize {
    MAX_PAYLOAD_BYTES
}

fn default_match_limit() -> usize {
    500
}

fn default_aggregation_timeout_ms() -> u64 {
    60_000
}

fn default_aggregation_capacity() -> usize {
    30
}

fn default_batch_delay_ms() -> u64 {
    50
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            progress_interval_ms: default_progress_interval_ms(),
            match_buffer_threshold: default_match_buffer_threshold(),
            max_payload_bytes: default_max_payload_bytes(),
            match_limit: default_match_limit(),
            request_timeout_ms: 0,
            aggregation_timeout_ms: default_aggregation_timeout_ms(),
            aggregation_capacity: default_aggregation_capacity(),
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

impl StreamConfig {
    /// Defaults overridden by any `SEARCH_STREAM_*` environment variables.
    pub fn from_env() -> Result<Self, StreamError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_json(raw: &str) -> Result<Self, StreamError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| StreamError::Config(format!("invalid stream config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StreamError> {
        let mut config = Self::default();
        let read = |name: &str| -> Result<Option<u64>, StreamError> {
            let key = format!("{ENV_PREFIX}{name}");
            match lookup(&key) {
                Some(raw) if !raw.trim().is_empty() => raw
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|e| StreamError::Config(format!("invalid {key}: {e}"))),
                _ => Ok(None),
            }
        };

        if let Some(v) = read("FLUSH_INTERVAL_MS")? {
            config.flush_interval_ms = v;
        }
        if let Some(v) = read("PROGRESS_INTERVAL_MS")? {
            config.progress_interval_ms = v;
        }
        if let Some(v) = read("MATCH_BUFFER_THRESHOLD")? {
            config.match_buffer_threshold = v as usize;
        }
        if let Some(v) = read("MAX_PAYLOAD_BYTES")? {
            config.max_payload_bytes = v as usize;
        }
        if let Some(v) = read("MATCH_LIMIT")? {
            config.match_limit = v as usize;
        }
        if let Some(v) = read("REQUEST_TIMEOUT_MS")? {
            config.request_timeout_ms = v;
        }
        if let Some(v) = read("AGGREGATION_TIMEOUT_MS")? {
            config.aggregation_timeout_ms = v;
        }
        if let Some(v) = read("AGGREGATION_CAPACITY")? {
            config.aggregation_capacity = v as usize;
        }
        if let Some(v) = read("BATCH_DELAY_MS")? {
            config.batch_delay_ms = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.flush_interval_ms == 0 {
            return Err(StreamError::Config(
                "flush interval must be greater than 0".to_string(),
            ));
        }
        if self.progress_interval_ms == 0 {
            return Err(StreamError::Config(
                "progress interval must be greater than 0".to_string(),
            ));
        }
        if self.match_buffer_threshold == 0 {
            return Err(StreamError::Config(
                "match buffer threshold must be greater than 0".to_string(),
            ));
        }
        if self.max_payload_bytes < self.match_buffer_threshold {
            return Err(StreamError::Config(format!(
                "max payload ({}) must not be smaller than the match buffer threshold ({})",
                self.max_payload_bytes, self.match_buffer_threshold
            )));
        }
        if self.aggregation_capacity == 0 {
            return Err(StreamError::Config(
                "aggregation capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    pub fn aggregation_timeout(&self) -> Duration {
        Duration::from_millis(self.aggregation_timeout_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}
