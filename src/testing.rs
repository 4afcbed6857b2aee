//! Shared fixtures for unit tests.

use std::cell::Cell;
use std::collections::HashMap;
use std::io;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::api::{
    EventContentMatch, EventLineMatch, EventMatch, EventPathMatch, RepoId, StreamEvent,
};
use crate::error::StoreError;
use crate::search::{RepoMetadata, RepoStore};
use crate::wire::decode_frames;

pub fn path_match(id: RepoId, repo: &str, path: &str) -> EventMatch {
    EventMatch::Path(EventPathMatch {
        path: path.to_string(),
        repository_id: id,
        repository: repo.to_string(),
        ..Default::default()
    })
}

/// Content match with one single-segment line match per line number.
pub fn content_match(id: RepoId, repo: &str, path: &str, lines: &[i32]) -> EventMatch {
    EventMatch::Content(EventContentMatch {
        path: path.to_string(),
        repository_id: id,
        repository: repo.to_string(),
        line_matches: Some(
            lines
                .iter()
                .map(|n| EventLineMatch {
                    line: format!("match on line {n}"),
                    line_number: *n,
                    offset_and_lengths: vec![[0, 5]],
                })
                .collect(),
        ),
        ..Default::default()
    })
}

pub fn decode_events(bytes: &[u8]) -> Vec<StreamEvent> {
    decode_frames(bytes)
        .expect("stream decodes")
        .iter()
        .map(|f| StreamEvent::from_frame(f).expect("known event"))
        .collect()
}

/// In-memory repository store. Optionally fails every lookup.
#[derive(Debug, Default)]
pub struct MemoryRepoStore {
    repos: HashMap<RepoId, RepoMetadata>,
    fail: bool,
    calls: AtomicUsize,
}

impl MemoryRepoStore {
    pub fn with_repos(repos: &[(RepoId, &str)]) -> Self {
        Self {
            repos: repos
                .iter()
                .map(|(id, name)| {
                    (
                        *id,
                        RepoMetadata {
                            id: *id,
                            name: name.to_string(),
                            stars: Some(10 * *id),
                            last_fetched: None,
                        },
                    )
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepoStore for MemoryRepoStore {
    async fn get_by_ids(
        &self,
        ids: &[RepoId],
    ) -> Result<HashMap<RepoId, RepoMetadata>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StoreError("database unavailable".to_string()));
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.repos.get(id).map(|r| (*id, r.clone())))
            .collect())
    }
}

/// Writer whose bytes stay readable after it is moved into an encoder.
#[derive(Debug, Clone, Default)]
pub struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl SharedWriter {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        decode_events(&self.contents())
    }
}

impl AsyncWrite for SharedWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// A [`SharedWriter`] that is `Send` but not `Sync`.
#[derive(Debug, Default)]
pub struct UnsyncWriter {
    inner: SharedWriter,
    _not_sync: PhantomData<Cell<()>>,
}

impl UnsyncWriter {
    pub fn new(inner: SharedWriter) -> Self {
        Self {
            inner,
            _not_sync: PhantomData,
        }
    }
}

impl AsyncWrite for UnsyncWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Writer that fails every write.
#[derive(Debug, Default)]
pub struct BrokenWriter;

impl AsyncWrite for BrokenWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "client went away",
        )))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
