use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use super::{framed_len, DATA_PREFIX, EVENT_PREFIX, MAX_PAYLOAD_BYTES};
use crate::api::EVENT_DONE;
use crate::error::WireError;

/// Outcome of a single [`WireEncoder`] call, reported whether or not the
/// write succeeded.
#[derive(Debug, Clone)]
pub struct EmitObservation {
    pub event: String,
    pub bytes_written: usize,
    pub duration: Duration,
    pub error: Option<String>,
}

pub type EmitObserver = Arc<dyn Fn(&EmitObservation) + Send + Sync>;

/// Writes framed events to a byte sink, flushing after every frame.
pub struct WireEncoder<W> {
    writer: W,
    max_payload: usize,
    observer: Option<EmitObserver>,
}

impl<W> std::fmt::Debug for WireEncoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireEncoder")
            .field("max_payload", &self.max_payload)
            .field("observer", &self.observer.as_ref().map(|_| "<function>"))
            .finish()
    }
}

impl<W: AsyncWrite + Unpin> WireEncoder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            max_payload: MAX_PAYLOAD_BYTES,
            observer: None,
        }
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn with_observer(mut self, observer: EmitObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Serialize `payload` and write it as one `event`/`data` frame.
    pub async fn emit<T: Serialize + ?Sized>(
        &mut self,
        event: &str,
        payload: &T,
    ) -> Result<usize, WireError> {
        let started = Instant::now();
        let result = match serde_json::to_vec(payload) {
            Ok(data) => self.write_frame(event, &data).await,
            Err(e) => Err(WireError::from(e)),
        };
        self.observe(event, started, &result);
        result
    }

    /// Write an already-serialized JSON payload as one frame.
    pub async fn emit_raw(&mut self, event: &str, data: &[u8]) -> Result<usize, WireError> {
        let started = Instant::now();
        let result = self.write_frame(event, data).await;
        self.observe(event, started, &result);
        result
    }

    /// Write the terminal `done` frame.
    pub async fn done(&mut self) -> Result<usize, WireError> {
        self.emit_raw(EVENT_DONE, b"{}").await
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    async fn write_frame(&mut self, event: &str, data: &[u8]) -> Result<usize, WireError> {
        if event.is_empty() || event.contains('\n') {
            return Err(WireError::malformed(format!(
                "invalid event name {event:?}"
            )));
        }
        if data.contains(&b'\n') {
            return Err(WireError::malformed(format!(
                "payload for '{event}' contains a newline"
            )));
        }

        let size = framed_len(event, data);
        if size > self.max_payload {
            return Err(WireError::PayloadTooLarge {
                size,
                limit: self.max_payload,
            });
        }

        let mut frame = Vec::with_capacity(size);
        frame.extend_from_slice(EVENT_PREFIX.as_bytes());
        frame.extend_from_slice(event.as_bytes());
        frame.push(b'\n');
        frame.extend_from_slice(DATA_PREFIX.as_bytes());
        frame.extend_from_slice(data);
        frame.extend_from_slice(b"\n\n");

        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        Ok(frame.len())
    }

    fn observe(&self, event: &str, started: Instant, result: &Result<usize, WireError>) {
        let observation = EmitObservation {
            event: event.to_string(),
            bytes_written: *result.as_ref().unwrap_or(&0),
            duration: started.elapsed(),
            error: result.as_ref().err().map(|e| e.to_string()),
        };
        trace!(
            event = %observation.event,
            bytes = observation.bytes_written,
            duration_us = observation.duration.as_micros() as u64,
            error = observation.error.as_deref().unwrap_or(""),
            "emitted stream event"
        );
        if let Some(observer) = &self.observer {
            observer(&observation);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn recording_observer() -> (EmitObserver, Arc<Mutex<Vec<EmitObservation>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer: EmitObserver = Arc::new(move |o: &EmitObservation| {
            sink.lock().unwrap().push(o.clone());
        });
        (observer, seen)
    }

    #[tokio::test]
    async fn writes_exact_framing_and_flushes() {
        let mock = tokio_test::io::Builder::new()
            .write(b"event: alert\ndata: {\"title\":\"hi\"}\n\n")
            .build();
        let mut encoder = WireEncoder::new(mock);

        let written = encoder.emit("alert", &json!({"title": "hi"})).await.unwrap();
        assert_eq!(written, "event: alert\ndata: {\"title\":\"hi\"}\n\n".len());
    }

    #[tokio::test]
    async fn rejects_frames_over_the_cap() {
        let (observer, seen) = recording_observer();
        let mut encoder = WireEncoder::new(Vec::new())
            .with_max_payload(64)
            .with_observer(observer);

        let big = "x".repeat(64);
        let err = encoder.emit("matches", &big).await.unwrap_err();
        assert!(matches!(err, WireError::PayloadTooLarge { limit: 64, .. }));
        assert!(encoder.get_ref().is_empty(), "nothing written on failure");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].event, "matches");
        assert_eq!(seen[0].bytes_written, 0);
        assert!(seen[0].error.as_deref().unwrap().contains("payload too large"));
    }

    #[tokio::test]
    async fn frame_exactly_at_cap_is_accepted() {
        let data = b"[1,2,3]";
        let limit = framed_len("matches", data);
        let mut encoder = WireEncoder::new(Vec::new()).with_max_payload(limit);
        assert_eq!(encoder.emit_raw("matches", data).await.unwrap(), limit);
    }

    #[tokio::test]
    async fn observes_successful_writes() {
        let (observer, seen) = recording_observer();
        let mut encoder = WireEncoder::new(Vec::new()).with_observer(observer);

        encoder.emit("progress", &json!({"done": false})).await.unwrap();
        encoder.done().await.unwrap();

        let seen = seen.lock().unwrap();
        let names: Vec<&str> = seen.iter().map(|o| o.event.as_str()).collect();
        assert_eq!(names, vec!["progress", "done"]);
        assert!(seen.iter().all(|o| o.error.is_none() && o.bytes_written > 0));
        assert!(encoder.get_ref().ends_with(b"event: done\ndata: {}\n\n"));
    }

    #[tokio::test]
    async fn rejects_newlines_in_event_name() {
        let mut encoder = WireEncoder::new(Vec::new());
        let err = encoder.emit_raw("bad\nname", b"{}").await.unwrap_err();
        assert!(matches!(err, WireError::MalformedEvent(_)));
    }
}
