//! HTTP client for a remote search stream.

use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::{EventError, StreamEvent};
use crate::bus::{EventBatcher, ResultsUpdate};
use crate::endpoint::SearchParams;
use crate::error::ClientError;
use crate::wire::WireDecoder;

const STREAM_PATH: &str = "/search/stream";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const UPDATE_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct SearchClient {
    base_url: String,
    token: Option<String>,
    /// Whole-request limit; `None` leaves long-lived streams open.
    timeout: Option<Duration>,
    client: reqwest::Client,
}

impl SearchClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, ClientError> {
        let base_url = base_url.into();
        if base_url.trim().is_empty() {
            return Err(ClientError::Config("base URL cannot be empty".to_string()));
        }

        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            timeout: None,
            client: reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .map_err(|error| ClientError::Config(error.to_string()))?,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn endpoint(&self, params: &SearchParams) -> String {
        format!("{}{STREAM_PATH}?{}", self.base_url, params.to_query_string())
    }

    /// Run a search, passing each decoded event to `on_event` (the final
    /// `Done` included). Fails with `UnexpectedEof` if the body ends first.
    pub async fn stream<F>(&self, params: &SearchParams, mut on_event: F) -> Result<(), ClientError>
    where
        F: FnMut(StreamEvent),
    {
        let endpoint = self.endpoint(params);
        debug!(%endpoint, "opening search stream");

        let mut request = self
            .client
            .get(&endpoint)
            .header(ACCEPT, "text/event-stream");
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("token {token}"));
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let mut decoder = WireDecoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            decoder.push(&chunk?);
            while let Some(frame) = decoder.scan()? {
                let event = StreamEvent::from_frame(&frame)?;
                let done = event.is_done();
                on_event(event);
                if done {
                    return Ok(());
                }
            }
        }

        if let Some(frame) = decoder.finish()? {
            on_event(StreamEvent::from_frame(&frame)?);
        }
        if decoder.is_done() {
            Ok(())
        } else {
            Err(ClientError::UnexpectedEof)
        }
    }

    /// Run a search in the background and receive its events debounced
    /// through an [`EventBatcher`]. A transport failure arrives as an
    /// update carrying `error`.
    pub fn stream_batched(
        &self,
        params: SearchParams,
        delay: Duration,
    ) -> mpsc::Receiver<ResultsUpdate> {
        let (raw_tx, raw_rx) = mpsc::channel(UPDATE_BUFFER);
        let (out_tx, out_rx) = mpsc::channel(UPDATE_BUFFER);
        EventBatcher::start(raw_rx, out_tx, delay);

        let client = self.clone();
        tokio::spawn(async move {
            let (event_tx, mut event_rx) = mpsc::unbounded_channel();
            let forward = async {
                while let Some(event) = event_rx.recv().await {
                    if raw_tx.send(ResultsUpdate::from_event(event)).await.is_err() {
                        break;
                    }
                }
            };
            let read = async {
                let result = client
                    .stream(&params, |event| {
                        let _ = event_tx.send(event);
                    })
                    .await;
                drop(event_tx);
                result
            };

            let (result, ()) = tokio::join!(read, forward);
            if let Err(error) = result {
                warn!("search stream failed: {error}");
                let _ = raw_tx
                    .send(ResultsUpdate {
                        error: Some(EventError {
                            message: error.to_string(),
                        }),
                        ..Default::default()
                    })
                    .await;
            }
        });

        out_rx
    }
}
