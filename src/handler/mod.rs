//! Per-request stream coordinator.
//!
//! One task owns the encoder and all aggregation state. Engine batches,
//! alerts and errors arrive over a command channel; two intervals drive
//! the periodic match flush and progress emission. `done()` stops both
//! intervals, flushes what is left, writes the final progress event and
//! hands the encoder back to the caller.
//!
//! ```text
//! HandlerSender ──┐
//!                 ├─ Command ─▶ control loop ─▶ WireEncoder
//! flush tick ─────┤              (buffer, progress, filters)
//! progress tick ──┘
//! ```


use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info_span, trace, warn, Instrument};
use uuid::Uuid;

use crate::api::{
    EventAlert, EventContentMatch, EventError, EventMatch, RepoId, EVENT_ALERT, EVENT_ERROR,
    EVENT_FILTERS, EVENT_MATCHES, EVENT_PROGRESS,
};
use crate::buffer::MatchEventBuffer;
use crate::config::StreamConfig;
use crate::error::{StreamError, WireError};
use crate::filters::FilterAggregator;
use crate::hunks::{decorate, HunkDecorator};
use crate::progress::ProgressAggregator;
use crate::search::{RepoMetadata, RepoStore, SearchEvent};
use crate::wire::{metrics, WireEncoder};

const COMMAND_BUFFER: usize = 64;

/// Hunk decoration applied to the first `limit` content matches.
#[derive(Clone)]
pub struct Decoration {
    pub limit: usize,
    pub decorator: Arc<dyn HunkDecorator>,
}

impl std::fmt::Debug for Decoration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoration")
            .field("limit", &self.limit)
            .field("decorator", &"<function>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub flush_interval: Duration,
    pub progress_interval: Duration,
    pub match_buffer_threshold: usize,
    pub match_limit: usize,
    /// Matches beyond this many are counted but never sent.
    pub display_limit: Option<usize>,
    /// Send chunk matches instead of line matches.
    pub chunk_matches: bool,
    pub decoration: Option<Decoration>,
    pub trace: Option<String>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self::from_config(&StreamConfig::default())
    }
}

impl HandlerConfig {
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            flush_interval: config.flush_interval(),
            progress_interval: config.progress_interval(),
            match_buffer_threshold: config.match_buffer_threshold,
            match_limit: config.match_limit,
            display_limit: None,
            chunk_matches: false,
            decoration: None,
            trace: None,
        }
    }
}

#[derive(Debug)]
enum Command {
    Send(SearchEvent),
    Alert(EventAlert),
    Error(EventError),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerState {
    Active,
    Finalizing,
    Closed,
}

/// Cloneable handle used by the engine to feed the stream.
#[derive(Debug, Clone)]
pub struct HandlerSender {
    tx: mpsc::Sender<Command>,
}

impl HandlerSender {
    pub async fn send(&self, event: SearchEvent) -> Result<(), StreamError> {
        self.command(Command::Send(event)).await
    }

    pub async fn alert(&self, alert: EventAlert) -> Result<(), StreamError> {
        self.command(Command::Alert(alert)).await
    }

    pub async fn error(&self, message: impl Into<String>) -> Result<(), StreamError> {
        self.command(Command::Error(EventError {
            message: message.into(),
        }))
        .await
    }

    async fn command(&self, command: Command) -> Result<(), StreamError> {
        self.tx.send(command).await.map_err(|_| StreamError::Closed)
    }
}

pub struct StreamEventHandler<W> {
    sender: HandlerSender,
    task: JoinHandle<Result<WireEncoder<W>, StreamError>>,
}

impl<W> StreamEventHandler<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Spawn the control loop for one stream.
    pub fn start(
        encoder: WireEncoder<W>,
        store: Arc<dyn RepoStore>,
        config: HandlerConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let stream_id = Uuid::new_v4();
        let span = info_span!("search_stream", %stream_id);
        let state = HandlerLoop::new(encoder, store, config);
        let task = tokio::spawn(state.run(rx).instrument(span));
        Self {
            sender: HandlerSender { tx },
            task,
        }
    }

    pub fn sender(&self) -> HandlerSender {
        self.sender.clone()
    }

    pub async fn send(&self, event: SearchEvent) -> Result<(), StreamError> {
        self.sender.send(event).await
    }

    pub async fn alert(&self, alert: EventAlert) -> Result<(), StreamError> {
        self.sender.alert(alert).await
    }

    pub async fn error(&self, message: impl Into<String>) -> Result<(), StreamError> {
        self.sender.error(message).await
    }

    /// Finish the stream: flush, emit the final progress and return the
    /// encoder so the caller can write the terminal `done` frame.
    pub async fn done(self) -> Result<WireEncoder<W>, StreamError> {
        // A closed loop has already stopped; its result is in the task.
        let _ = self.sender.command(Command::Done).await;
        drop(self.sender);
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                error!("stream handler task failed: {e}");
                Err(StreamError::Closed)
            }
        }
    }
}

struct HandlerLoop<W> {
    encoder: WireEncoder<W>,
    store: Arc<dyn RepoStore>,
    config: HandlerConfig,
    matches: MatchEventBuffer,
    progress: ProgressAggregator,
    filters: FilterAggregator,
    display_remaining: Option<usize>,
    decorated: usize,
    first_result_sent: bool,
    started: Instant,
    state: HandlerState,
}

impl<W> HandlerLoop<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn new(encoder: WireEncoder<W>, store: Arc<dyn RepoStore>, config: HandlerConfig) -> Self {
        Self {
            encoder,
            store,
            matches: MatchEventBuffer::new(config.match_buffer_threshold),
            progress: ProgressAggregator::new(
                config.match_limit,
                config.display_limit,
                config.trace.clone(),
            ),
            filters: FilterAggregator::new(),
            display_remaining: config.display_limit,
            decorated: 0,
            first_result_sent: false,
            started: Instant::now(),
            state: HandlerState::Active,
            config,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
    ) -> Result<WireEncoder<W>, StreamError> {
        let mut flush_tick = ticker(self.config.flush_interval);
        let mut progress_tick = ticker(self.config.progress_interval);

        let result = loop {
            let step = tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Send(event)) => self.on_send(event).await,
                    Some(Command::Alert(alert)) => self.on_event(EVENT_ALERT, &alert).await,
                    Some(Command::Error(err)) => self.on_event(EVENT_ERROR, &err).await,
                    Some(Command::Done) | None => break Ok(()),
                },
                _ = flush_tick.tick() => self.on_flush_tick().await,
                _ = progress_tick.tick() => self.emit_progress().await,
            };
            if let Err(e) = step {
                break Err(e);
            }
        };

        // Neither tick can fire once its interval is gone.
        drop(flush_tick);
        drop(progress_tick);
        commands.close();

        if let Err(e) = result {
            warn!("closing stream after write failure: {e}");
            self.state = HandlerState::Closed;
            return Err(e);
        }

        self.state = HandlerState::Finalizing;
        self.flush_filters().await?;
        self.flush_matches().await?;
        self.resolve_names().await;
        let progress = self.progress.final_progress();
        debug!(
            match_count = progress.match_count,
            skipped = progress.skipped.len(),
            "stream finished"
        );
        self.emit(EVENT_PROGRESS, &progress).await?;
        self.state = HandlerState::Closed;
        Ok(self.encoder)
    }

    async fn on_send(&mut self, event: SearchEvent) -> Result<(), StreamError> {
        self.progress.update(&event);
        self.filters.update(&event);

        let mut results = event.results;
        if let Some(remaining) = self.display_remaining.as_mut() {
            results.truncate(*remaining);
            *remaining -= results.len();
        }
        if results.is_empty() {
            return Ok(());
        }

        let results = self.resolve_metadata(results).await;
        let mut flushed = Vec::new();
        let mut appended = 0;
        for mut m in results {
            self.prepare(&mut m);
            match self.matches.append(&m, |bytes| flushed.push(bytes.to_vec())) {
                Ok(()) => appended += 1,
                Err(e) => warn!(repo = m.repository(), "dropping unserializable match: {e}"),
            }
        }
        for payload in flushed {
            self.emit_matches(&payload).await?;
        }

        if appended > 0 && !self.first_result_sent {
            self.first_result_sent = true;
            self.flush_filters().await?;
            self.flush_matches().await?;
            let latency = self.started.elapsed();
            metrics::global().record_first_result(latency);
            debug!(latency_ms = latency.as_millis() as u64, "first result sent");
        }
        Ok(())
    }

    /// Drops matches whose repository cannot be resolved or resolves to a
    /// different name, and copies repository metadata onto the rest.
    async fn resolve_metadata(&mut self, results: Vec<EventMatch>) -> Vec<EventMatch> {
        let mut ids: Vec<RepoId> = results.iter().map(|m| m.repository_id()).collect();
        ids.sort_unstable();
        ids.dedup();

        let metadata = lookup(self.store.as_ref(), &ids).await;
        self.progress
            .record_names(metadata.values().map(|r| (r.id, r.name.clone())));

        results
            .into_iter()
            .filter_map(|mut m| {
                let repo = metadata.get(&m.repository_id())?;
                if repo.name != m.repository() {
                    debug!(
                        id = repo.id,
                        claimed = m.repository(),
                        resolved = %repo.name,
                        "dropping match with mismatched repository"
                    );
                    return None;
                }
                m.set_repo_metadata(repo.stars, repo.last_fetched);
                Some(m)
            })
            .collect()
    }

    fn prepare(&mut self, m: &mut EventMatch) {
        let EventMatch::Content(content) = m else {
            return;
        };
        select_match_form(content, self.config.chunk_matches);
        if let Some(decoration) = &self.config.decoration {
            if self.decorated < decoration.limit {
                content.hunks = Some(decorate(content, decoration.decorator.as_ref()));
                self.decorated += 1;
            }
        }
    }

    async fn resolve_names(&mut self) {
        let ids = self.progress.unnamed_repos();
        if ids.is_empty() {
            return;
        }
        let found = lookup(self.store.as_ref(), &ids).await;
        self.progress
            .record_names(found.into_values().map(|r| (r.id, r.name)));
    }

    async fn on_flush_tick(&mut self) -> Result<(), StreamError> {
        self.flush_filters().await?;
        self.flush_matches().await?;
        if self.progress.is_dirty() {
            self.emit_progress().await?;
        }
        Ok(())
    }

    async fn emit_progress(&mut self) -> Result<(), StreamError> {
        self.resolve_names().await;
        let progress = self.progress.snapshot();
        self.emit(EVENT_PROGRESS, &progress).await
    }

    async fn on_event<T: serde::Serialize>(
        &mut self,
        name: &str,
        payload: &T,
    ) -> Result<(), StreamError> {
        self.flush_matches().await?;
        self.emit(name, payload).await
    }

    async fn flush_filters(&mut self) -> Result<(), StreamError> {
        if !self.filters.is_dirty() {
            return Ok(());
        }
        let filters = self.filters.compute();
        self.emit(EVENT_FILTERS, &filters).await
    }

    async fn flush_matches(&mut self) -> Result<(), StreamError> {
        let mut payload = None;
        self.matches.flush(|bytes| payload = Some(bytes.to_vec()));
        match payload {
            Some(bytes) => self.emit_matches(&bytes).await,
            None => Ok(()),
        }
    }

    async fn emit_matches(&mut self, payload: &[u8]) -> Result<(), StreamError> {
        self.ensure_open()?;
        match self.encoder.emit_raw(EVENT_MATCHES, payload).await {
            Ok(_) => Ok(()),
            Err(WireError::PayloadTooLarge { size, limit }) => {
                warn!(size, limit, "dropping oversized matches frame");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn emit<T: serde::Serialize + ?Sized>(
        &mut self,
        name: &str,
        payload: &T,
    ) -> Result<(), StreamError> {
        self.ensure_open()?;
        match self.encoder.emit(name, payload).await {
            Ok(bytes) => {
                trace!(event = name, bytes, "event written");
                Ok(())
            }
            Err(WireError::PayloadTooLarge { size, limit }) => {
                warn!(event = name, size, limit, "dropping oversized frame");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn ensure_open(&self) -> Result<(), StreamError> {
        match self.state {
            HandlerState::Active | HandlerState::Finalizing => Ok(()),
            HandlerState::Closed => Err(StreamError::Closed),
        }
    }
}

/// Store lookup that degrades to an empty map on failure. Takes the store
/// alone: a `&HandlerLoop` held across the await would require `W: Sync`.
async fn lookup(store: &dyn RepoStore, ids: &[RepoId]) -> HashMap<RepoId, RepoMetadata> {
    match store.get_by_ids(ids).await {
        Ok(found) => found,
        Err(e) => {
            warn!(count = ids.len(), "repository lookup failed: {e}");
            HashMap::new()
        }
    }
}

/// Interval whose first tick is one period from now.
fn ticker(period: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Keeps only the representation the client asked for.
fn select_match_form(content: &mut EventContentMatch, chunk_matches: bool) {
    if chunk_matches {
        if content.chunk_matches.is_some() {
            content.line_matches = None;
        }
        return;
    }
    if content.chunk_matches.is_some() {
        if content.line_matches.is_none() {
            content.line_matches = Some(content.resolved_line_matches());
        }
        content.chunk_matches = None;
    }
}
