//! The producing side of the stream: request parameters, response headers
//! and the engine run that feeds a [`StreamEventHandler`].

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::EventAlert;
use crate::config::StreamConfig;
use crate::error::{EngineError, ParamsError, StreamError};
use crate::handler::{Decoration, HandlerConfig, StreamEventHandler};
use crate::hunks::{HunkDecorator, PlaintextDecorator};
use crate::search::{RepoStore, SearchEngine};
use crate::wire::{metrics, WireEncoder};

/// Headers sent with every stream response. Chunked transfer is left to
/// the HTTP layer; `X-Accel-Buffering` keeps proxies from holding events.
pub const RESPONSE_HEADERS: [(&str, &str); 4] = [
    ("Content-Type", "text/event-stream"),
    ("Cache-Control", "no-cache"),
    ("Connection", "keep-alive"),
    ("X-Accel-Buffering", "no"),
];

const DEFAULT_DECORATION_LIMIT: usize = 1;
const DEFAULT_DECORATION_CONTEXT: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecorationKind {
    Plaintext,
    Html,
}

impl DecorationKind {
    fn as_str(self) -> &'static str {
        match self {
            DecorationKind::Plaintext => "plaintext",
            DecorationKind::Html => "html",
        }
    }
}

/// Query parameters accepted by the stream endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    /// `q`
    pub query: String,
    /// `v`
    pub version: Option<String>,
    /// `t`
    pub pattern_type: Option<String>,
    /// `display`; `None` is unbounded.
    pub display_limit: Option<usize>,
    /// `cm`
    pub chunk_matches: bool,
    /// `dk`
    pub decoration_kind: Option<DecorationKind>,
    /// `dl`
    pub decoration_limit: usize,
    /// `dc`
    pub decoration_context_lines: usize,
}

impl SearchParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            version: None,
            pattern_type: None,
            display_limit: None,
            chunk_matches: false,
            decoration_kind: None,
            decoration_limit: DEFAULT_DECORATION_LIMIT,
            decoration_context_lines: DEFAULT_DECORATION_CONTEXT,
        }
    }

    /// Parse a raw (URL-encoded) query string. Unknown keys are ignored.
    pub fn parse(raw: &str) -> Result<Self, ParamsError> {
        let mut query = None;
        let mut params = Self::new("");

        for pair in raw.trim_start_matches('?').split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = decode(value);
            match key {
                "q" => query = Some(value),
                "v" => params.version = Some(value),
                "t" => params.pattern_type = Some(value),
                "display" => {
                    let n: i64 = value.parse().map_err(|_| invalid("display", &value))?;
                    params.display_limit = usize::try_from(n).ok();
                }
                "cm" => params.chunk_matches = parse_bool("cm", &value)?,
                "dk" => {
                    params.decoration_kind = match value.as_str() {
                        "" => None,
                        "plaintext" => Some(DecorationKind::Plaintext),
                        "html" => Some(DecorationKind::Html),
                        _ => return Err(invalid("dk", &value)),
                    }
                }
                "dl" => params.decoration_limit = value.parse().map_err(|_| invalid("dl", &value))?,
                "dc" => {
                    params.decoration_context_lines =
                        value.parse().map_err(|_| invalid("dc", &value))?
                }
                other => debug!(param = other, "ignoring unknown search parameter"),
            }
        }

        params.query = query
            .filter(|q| !q.trim().is_empty())
            .ok_or(ParamsError::MissingQuery)?;
        Ok(params)
    }

    pub fn to_query_string(&self) -> String {
        let mut pairs = vec![format!("q={}", urlencoding::encode(&self.query))];
        if let Some(v) = &self.version {
            pairs.push(format!("v={}", urlencoding::encode(v)));
        }
        if let Some(t) = &self.pattern_type {
            pairs.push(format!("t={}", urlencoding::encode(t)));
        }
        if let Some(display) = self.display_limit {
            pairs.push(format!("display={display}"));
        }
        if self.chunk_matches {
            pairs.push("cm=t".to_string());
        }
        if let Some(kind) = self.decoration_kind {
            pairs.push(format!("dk={}", kind.as_str()));
            pairs.push(format!("dl={}", self.decoration_limit));
            pairs.push(format!("dc={}", self.decoration_context_lines));
        }
        pairs.join("&")
    }
}

fn decode(value: &str) -> String {
    let spaced = value.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

fn invalid(param: &'static str, value: &str) -> ParamsError {
    ParamsError::InvalidValue {
        param,
        value: value.to_string(),
    }
}

fn parse_bool(param: &'static str, value: &str) -> Result<bool, ParamsError> {
    match value.to_ascii_lowercase().as_str() {
        "" | "1" | "t" | "true" | "yes" => Ok(true),
        "0" | "f" | "false" | "no" => Ok(false),
        _ => Err(invalid(param, value)),
    }
}

/// How a stream ended. Every outcome still ends with `done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    /// The request deadline expired; an "incomplete data" alert was sent.
    Incomplete,
    /// The engine failed; an `error` event was sent.
    Failed,
}

impl StreamOutcome {
    pub fn is_success(self) -> bool {
        !matches!(self, StreamOutcome::Failed)
    }
}

/// Runs searches and streams their results.
pub struct SearchStream {
    engine: Arc<dyn SearchEngine>,
    store: Arc<dyn RepoStore>,
    config: StreamConfig,
    decorator: Arc<dyn HunkDecorator>,
}

impl SearchStream {
    pub fn new(
        engine: Arc<dyn SearchEngine>,
        store: Arc<dyn RepoStore>,
        config: StreamConfig,
    ) -> Self {
        Self {
            engine,
            store,
            config,
            decorator: Arc::new(PlaintextDecorator),
        }
    }

    pub fn with_decorator(mut self, decorator: Arc<dyn HunkDecorator>) -> Self {
        self.decorator = decorator;
        self
    }

    fn handler_config(&self, params: &SearchParams, trace: String) -> HandlerConfig {
        let decoration = params
            .decoration_kind
            .filter(|_| params.decoration_limit > 0)
            .map(|_| Decoration {
                limit: params.decoration_limit,
                decorator: self.decorator.clone(),
            });
        HandlerConfig {
            display_limit: params.display_limit,
            chunk_matches: params.chunk_matches,
            decoration,
            trace: Some(trace),
            ..HandlerConfig::from_config(&self.config)
        }
    }

    /// Stream the results of `params` into `writer`, ending with `done`.
    /// Returns how the search ended together with the writer.
    pub async fn run<W>(
        &self,
        params: &SearchParams,
        writer: W,
    ) -> Result<(StreamOutcome, W), StreamError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let trace = Uuid::new_v4().simple().to_string();
        info!(query = %params.query, %trace, "starting search stream");

        let encoder = WireEncoder::new(writer)
            .with_max_payload(self.config.max_payload_bytes)
            .with_observer(metrics::observer());
        let handler = StreamEventHandler::start(
            encoder,
            self.store.clone(),
            self.handler_config(params, trace),
        );

        let execution = self.engine.execute(&params.query, handler.sender());
        let result = match self.config.request_timeout() {
            Some(deadline) => time::timeout(deadline, execution)
                .await
                .map_err(|_| deadline),
            None => Ok(execution.await),
        };

        let outcome = match result {
            Ok(Ok(alert)) => {
                if let Some(alert) = alert {
                    forward(handler.alert(alert).await);
                }
                StreamOutcome::Completed
            }
            Ok(Err(EngineError::QueryParse(message))) => {
                debug!("query rejected: {message}");
                forward(
                    handler
                        .alert(EventAlert::new("Unable to parse query", message))
                        .await,
                );
                StreamOutcome::Completed
            }
            Ok(Err(EngineError::Execution(message))) => {
                error!("search failed: {message}");
                forward(handler.error(message).await);
                StreamOutcome::Failed
            }
            Err(deadline) => {
                warn!(?deadline, "search deadline exceeded");
                forward(handler.alert(deadline_alert(deadline)).await);
                StreamOutcome::Incomplete
            }
        };

        let mut encoder = handler.done().await?;
        encoder.done().await?;
        info!(?outcome, "search stream finished");
        Ok((outcome, encoder.into_inner()))
    }
}

fn deadline_alert(deadline: Duration) -> EventAlert {
    EventAlert::incomplete_data(format!(
        "The search did not complete within {deadline:?}; \
         the results shown may be incomplete."
    ))
}

/// A closed handler reports its own error from `done()`.
fn forward(result: Result<(), StreamError>) {
    if let Err(e) = result {
        debug!("handler closed before final event: {e}");
    }
}
