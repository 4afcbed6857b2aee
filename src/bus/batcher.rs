use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::trace;

use crate::api::{EventAlert, EventError, EventFilter, EventMatch, Progress, StreamEvent};

/// An event that can absorb a later event of the same type.
pub trait Mergeable {
    /// Fold `later` into `self`, keeping arrival order.
    fn merge(&mut self, later: Self);
}

impl<T> Mergeable for Vec<T> {
    fn merge(&mut self, later: Self) {
        self.extend(later);
    }
}

/// Accumulated view of one or more decoded stream events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsUpdate {
    pub matches: Vec<EventMatch>,
    /// Latest filters; each `filters` event replaces the previous set.
    pub filters: Vec<EventFilter>,
    pub progress: Option<Progress>,
    pub alerts: Vec<EventAlert>,
    pub error: Option<EventError>,
    pub done: bool,
}

impl ResultsUpdate {
    pub fn from_event(event: StreamEvent) -> Self {
        let mut update = Self::default();
        match event {
            StreamEvent::Matches(matches) => update.matches = matches,
            StreamEvent::Filters(filters) => update.filters = filters,
            StreamEvent::Progress(progress) => update.progress = Some(progress),
            StreamEvent::Alert(alert) => update.alerts.push(alert),
            StreamEvent::Error(error) => update.error = Some(error),
            StreamEvent::Done => update.done = true,
        }
        update
    }
}

impl Mergeable for ResultsUpdate {
    fn merge(&mut self, later: Self) {
        self.matches.extend(later.matches);
        if !later.filters.is_empty() {
            self.filters = later.filters;
        }
        if later.progress.is_some() {
            self.progress = later.progress;
        }
        self.alerts.extend(later.alerts);
        if later.error.is_some() {
            self.error = later.error;
        }
        self.done |= later.done;
    }
}

pub struct EventBatcher;

impl EventBatcher {
    /// Spawn a task that forwards events from `rx` to `tx`, coalescing bursts.
    ///
    /// - The first event is forwarded immediately.
    /// - Every later event opens a window of `delay`; events arriving inside
    ///   the window are merged into it, and the merged event is forwarded
    ///   when the window ends.
    /// - When `rx` closes, a held event is forwarded once and the task ends.
    pub fn start<T>(
        mut rx: mpsc::Receiver<T>,
        tx: mpsc::Sender<T>,
        delay: Duration,
    ) -> JoinHandle<()>
    where
        T: Mergeable + Send + 'static,
    {
        tokio::spawn(async move {
            let Some(first) = rx.recv().await else {
                return;
            };
            if tx.send(first).await.is_err() {
                return;
            }

            'source: loop {
                let Some(mut held) = rx.recv().await else {
                    break;
                };
                let mut merged = 0usize;
                let window = time::sleep(delay);
                tokio::pin!(window);

                loop {
                    tokio::select! {
                        _ = &mut window => break,
                        next = rx.recv() => match next {
                            Some(event) => {
                                held.merge(event);
                                merged += 1;
                            }
                            None => {
                                // Source closed mid-window: flush once and stop.
                                let _ = tx.send(held).await;
                                break 'source;
                            }
                        }
                    }
                }

                trace!(merged, "event batcher window closed");
                if tx.send(held).await.is_err() {
                    break;
                }
            }
        })
    }
}
