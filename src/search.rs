//! Engine-facing types: result batches, shard statistics and the
//! collaborators the stream depends on.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::{BitOr, BitOrAssign};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::api::{EventAlert, EventMatch, RepoId};
use crate::error::{EngineError, StoreError};
use crate::handler::HandlerSender;

/// Per-repository search status flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RepoStatus(u8);

impl RepoStatus {
    pub const SEARCHED: RepoStatus = RepoStatus(1);
    pub const INDEXED: RepoStatus = RepoStatus(1 << 1);
    pub const CLONING: RepoStatus = RepoStatus(1 << 2);
    pub const MISSING: RepoStatus = RepoStatus(1 << 3);
    pub const LIMIT_HIT: RepoStatus = RepoStatus(1 << 4);
    pub const TIMEDOUT: RepoStatus = RepoStatus(1 << 5);

    pub fn contains(self, other: RepoStatus) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for RepoStatus {
    type Output = RepoStatus;

    fn bitor(self, rhs: RepoStatus) -> RepoStatus {
        RepoStatus(self.0 | rhs.0)
    }
}

impl BitOrAssign for RepoStatus {
    fn bitor_assign(&mut self, rhs: RepoStatus) {
        self.0 |= rhs.0;
    }
}

/// Statistics reported alongside a batch of results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    /// A shard or backend stopped early because it hit its match limit.
    pub is_limit_hit: bool,
    /// Repositories that took part in the search.
    pub repos: BTreeSet<RepoId>,
    pub status: BTreeMap<RepoId, RepoStatus>,
    pub excluded_forks: usize,
    pub excluded_archived: usize,
    pub backends_missing: usize,
}

impl Stats {
    pub fn is_zero(&self) -> bool {
        !self.is_limit_hit
            && self.repos.is_empty()
            && self.status.values().all(|s| s.is_empty())
            && self.excluded_forks == 0
            && self.excluded_archived == 0
            && self.backends_missing == 0
    }

    pub fn update(&mut self, other: &Stats) {
        self.is_limit_hit |= other.is_limit_hit;
        self.repos.extend(other.repos.iter().copied());
        for (id, status) in &other.status {
            *self.status.entry(*id).or_default() |= *status;
        }
        self.excluded_forks += other.excluded_forks;
        self.excluded_archived += other.excluded_archived;
        self.backends_missing += other.backends_missing;
    }

    pub fn repos_with(&self, flag: RepoStatus) -> BTreeSet<RepoId> {
        self.status
            .iter()
            .filter(|(_, status)| status.contains(flag))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn with_status(mut self, id: RepoId, status: RepoStatus) -> Self {
        *self.status.entry(id).or_default() |= status;
        self
    }
}

/// A batch of results produced by the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchEvent {
    pub results: Vec<EventMatch>,
    pub stats: Stats,
}

impl SearchEvent {
    pub fn from_results(results: Vec<EventMatch>) -> Self {
        Self {
            results,
            stats: Stats::default(),
        }
    }

    pub fn from_stats(stats: Stats) -> Self {
        Self {
            results: Vec::new(),
            stats,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoMetadata {
    pub id: RepoId,
    pub name: String,
    pub stars: Option<i32>,
    pub last_fetched: Option<DateTime<Utc>>,
}

/// Repository metadata lookup.
#[async_trait]
pub trait RepoStore: Send + Sync {
    /// Metadata for the given ids. Ids that are unknown, or that the caller
    /// may not see, are absent from the map.
    async fn get_by_ids(&self, ids: &[RepoId]) -> Result<HashMap<RepoId, RepoMetadata>, StoreError>;
}

/// The result-producing engine behind the stream endpoint.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Run `query`, sending result batches to `stream`. A returned alert is
    /// forwarded to the client before the stream completes.
    async fn execute(
        &self,
        query: &str,
        stream: HandlerSender,
    ) -> Result<Option<EventAlert>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_flags_combine() {
        let status = RepoStatus::SEARCHED | RepoStatus::TIMEDOUT;
        assert!(status.contains(RepoStatus::TIMEDOUT));
        assert!(!status.contains(RepoStatus::CLONING));
        assert!(!status.contains(RepoStatus::default()));
    }

    #[test]
    fn stats_update_unions_and_sums() {
        let mut total = Stats::default().with_status(1, RepoStatus::CLONING);
        let delta = Stats {
            is_limit_hit: true,
            repos: BTreeSet::from([1, 2]),
            excluded_forks: 2,
            backends_missing: 1,
            ..Default::default()
        }
        .with_status(1, RepoStatus::MISSING)
        .with_status(3, RepoStatus::TIMEDOUT);

        total.update(&delta);
        total.update(&Stats {
            excluded_forks: 1,
            ..Default::default()
        });

        assert!(total.is_limit_hit);
        assert_eq!(total.excluded_forks, 3);
        assert_eq!(total.backends_missing, 1);
        assert_eq!(total.repos_with(RepoStatus::CLONING), BTreeSet::from([1]));
        assert_eq!(total.repos_with(RepoStatus::MISSING), BTreeSet::from([1]));
        assert_eq!(total.repos_with(RepoStatus::TIMEDOUT), BTreeSet::from([3]));
    }

    #[test]
    fn zero_stats() {
        assert!(Stats::default().is_zero());
        assert!(!Stats::default().with_status(9, RepoStatus::SEARCHED).is_zero());
    }
}
