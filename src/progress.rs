//! Running progress statistics and the "results may be incomplete"
//! diagnostics attached to every `progress` event.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use tokio::time::Instant;

use crate::api::{Progress, RepoId, Severity, Skipped, SkippedReason, SkippedSuggested};
use crate::search::{RepoStatus, SearchEvent, Stats};

/// Repositories listed by name in a single diagnostic message.
const MAX_LISTED_REPOS: usize = 10;

/// Point-in-time view the skip rules are evaluated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressStats {
    pub match_count: usize,
    pub elapsed: Duration,
    /// Withheld until the final snapshot.
    pub repositories_count: Option<usize>,
    pub missing: BTreeSet<RepoId>,
    pub cloning: BTreeSet<RepoId>,
    pub timed_out: BTreeSet<RepoId>,
    pub excluded_forks: usize,
    pub excluded_archived: usize,
    pub backends_missing: usize,
    pub limit_hit: bool,
    pub match_limit: usize,
    pub display_limit: Option<usize>,
    pub trace: Option<String>,
    pub done: bool,
}

impl ProgressStats {
    /// Retry limit offered when a match limit cut the search short.
    pub fn suggested_limit(&self) -> usize {
        ((self.match_limit + 1500) / 1000) * 1000
    }
}

/// Best-effort id to name lookup for diagnostic messages.
#[derive(Debug, Clone, Copy)]
pub struct RepoNames<'a>(pub &'a HashMap<RepoId, String>);

impl RepoNames<'_> {
    pub fn name(&self, id: RepoId) -> String {
        self.0
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("UNKNOWN{{ID={id}}}"))
    }
}

type SkipRule = fn(&ProgressStats, RepoNames<'_>) -> Option<Skipped>;

/// Evaluated in this order; the output order is part of the protocol.
const SKIP_RULES: [SkipRule; 8] = [
    repositories_missing,
    repositories_cloning,
    shard_match_limit,
    shards_timed_out,
    backends_missing,
    excluded_forks,
    excluded_archived,
    display_limit,
];

/// Runs every skip rule against `stats`.
pub fn skipped_diagnostics(stats: &ProgressStats, names: RepoNames<'_>) -> Vec<Skipped> {
    SKIP_RULES.iter().filter_map(|rule| rule(stats, names)).collect()
}

fn plural<'a>(n: usize, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 {
        one
    } else {
        many
    }
}

/// "`a`" for one repo, otherwise "N repositories ...: a, b, …".
fn repo_list(ids: &BTreeSet<RepoId>, names: RepoNames<'_>) -> String {
    let mut listed: Vec<String> = ids
        .iter()
        .take(MAX_LISTED_REPOS)
        .map(|id| format!("`{}`", names.name(*id)))
        .collect();
    if ids.len() > MAX_LISTED_REPOS {
        listed.push("…".to_string());
    }
    listed.join(", ")
}

fn repo_rule(
    ids: &BTreeSet<RepoId>,
    names: RepoNames<'_>,
    reason: SkippedReason,
    title_suffix: &str,
    cause: &str,
    severity: Severity,
) -> Option<Skipped> {
    let first = *ids.iter().next()?;
    let message = if ids.len() == 1 {
        format!("`{}` could not be searched since {cause}.", names.name(first))
    } else {
        format!(
            "{} repositories could not be searched since {cause}: {}",
            ids.len(),
            repo_list(ids, names)
        )
    };
    Some(Skipped {
        reason,
        title: format!("{} {title_suffix}", ids.len()),
        message,
        severity,
        suggested: None,
    })
}

fn repositories_missing(stats: &ProgressStats, names: RepoNames<'_>) -> Option<Skipped> {
    repo_rule(
        &stats.missing,
        names,
        SkippedReason::RepositoryMissing,
        "missing",
        "it is missing",
        Severity::Info,
    )
}

fn repositories_cloning(stats: &ProgressStats, names: RepoNames<'_>) -> Option<Skipped> {
    repo_rule(
        &stats.cloning,
        names,
        SkippedReason::RepositoryCloning,
        "cloning",
        "it is still cloning",
        Severity::Info,
    )
}

fn shard_match_limit(stats: &ProgressStats, _names: RepoNames<'_>) -> Option<Skipped> {
    if !stats.limit_hit {
        return None;
    }
    let limit = stats.suggested_limit();
    Some(Skipped {
        reason: SkippedReason::ShardMatchLimit,
        title: "result limit hit".to_string(),
        message: "Not all results have been returned due to hitting a match limit. \
                  Limits apply to the number of results returned from a line, document and repository."
            .to_string(),
        severity: Severity::Info,
        suggested: Some(SkippedSuggested {
            title: "increase limit".to_string(),
            query_expression: format!("count:{limit}"),
        }),
    })
}

fn shards_timed_out(stats: &ProgressStats, names: RepoNames<'_>) -> Option<Skipped> {
    let mut skipped = repo_rule(
        &stats.timed_out,
        names,
        SkippedReason::ShardTimedOut,
        "timed out",
        "the search timed out",
        Severity::Warn,
    )?;
    skipped.suggested = Some(SkippedSuggested {
        title: "increase timeout".to_string(),
        query_expression: "timeout:2m".to_string(),
    });
    Some(skipped)
}

fn backends_missing(stats: &ProgressStats, _names: RepoNames<'_>) -> Option<Skipped> {
    let n = stats.backends_missing;
    if n == 0 {
        return None;
    }
    Some(Skipped {
        reason: SkippedReason::BackendMissing,
        title: format!("{n} {} down", plural(n, "backend", "backends")),
        message: format!(
            "{n} search {} unavailable; results from the repositories they serve are missing.",
            plural(n, "backend is", "backends are")
        ),
        severity: Severity::Warn,
        suggested: None,
    })
}

fn excluded_forks(stats: &ProgressStats, _names: RepoNames<'_>) -> Option<Skipped> {
    let n = stats.excluded_forks;
    if n == 0 {
        return None;
    }
    Some(Skipped {
        reason: SkippedReason::ExcludedFork,
        title: format!("{n} forked"),
        message: format!(
            "{n} forked {} excluded from the search.",
            plural(n, "repository was", "repositories were")
        ),
        severity: Severity::Info,
        suggested: Some(SkippedSuggested {
            title: "include forked".to_string(),
            query_expression: "fork:yes".to_string(),
        }),
    })
}

fn excluded_archived(stats: &ProgressStats, _names: RepoNames<'_>) -> Option<Skipped> {
    let n = stats.excluded_archived;
    if n == 0 {
        return None;
    }
    Some(Skipped {
        reason: SkippedReason::ExcludedArchive,
        title: format!("{n} archived"),
        message: format!(
            "{n} archived {} excluded from the search.",
            plural(n, "repository was", "repositories were")
        ),
        severity: Severity::Info,
        suggested: Some(SkippedSuggested {
            title: "include archived".to_string(),
            query_expression: "archived:yes".to_string(),
        }),
    })
}

fn display_limit(stats: &ProgressStats, _names: RepoNames<'_>) -> Option<Skipped> {
    let limit = stats.display_limit?;
    if stats.match_count <= limit {
        return None;
    }
    Some(Skipped {
        reason: SkippedReason::Display,
        title: "display limit hit".to_string(),
        message: format!(
            "We only display {limit} {} even if your search returned more results.",
            plural(limit, "result", "results")
        ),
        severity: Severity::Info,
        suggested: None,
    })
}

/// Accumulates engine events into progress snapshots.
#[derive(Debug)]
pub struct ProgressAggregator {
    started: Instant,
    limit: usize,
    display_limit: Option<usize>,
    trace: Option<String>,
    match_count: usize,
    limit_hit: bool,
    stats: Stats,
    names: HashMap<RepoId, String>,
    dirty: bool,
}

impl ProgressAggregator {
    pub fn new(limit: usize, display_limit: Option<usize>, trace: Option<String>) -> Self {
        Self {
            started: Instant::now(),
            limit,
            display_limit,
            trace,
            match_count: 0,
            limit_hit: false,
            stats: Stats::default(),
            names: HashMap::new(),
            dirty: false,
        }
    }

    pub fn update(&mut self, event: &SearchEvent) {
        if event.results.is_empty() && event.stats.is_zero() {
            return;
        }
        self.dirty = true;
        self.stats.update(&event.stats);
        if event.stats.is_limit_hit {
            self.limit_hit = true;
        }

        for m in &event.results {
            self.match_count += m.result_count();
            self.names
                .entry(m.repository_id())
                .or_insert_with(|| m.repository().to_string());
        }
        if self.match_count > self.limit {
            self.match_count = self.limit;
            self.limit_hit = true;
        }
    }

    pub fn match_count(&self) -> usize {
        self.match_count
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn record_names(&mut self, names: impl IntoIterator<Item = (RepoId, String)>) {
        for (id, name) in names {
            self.names.entry(id).or_insert(name);
        }
    }

    /// Ids the diagnostics would list but whose names are still unknown.
    pub fn unnamed_repos(&self) -> Vec<RepoId> {
        let mut ids = BTreeSet::new();
        for flag in [RepoStatus::MISSING, RepoStatus::CLONING, RepoStatus::TIMEDOUT] {
            ids.extend(
                self.stats
                    .repos_with(flag)
                    .into_iter()
                    .take(MAX_LISTED_REPOS)
                    .filter(|id| !self.names.contains_key(id)),
            );
        }
        ids.into_iter().collect()
    }

    pub fn progress_stats(&self, done: bool) -> ProgressStats {
        ProgressStats {
            match_count: self.match_count,
            elapsed: self.started.elapsed(),
            repositories_count: done.then(|| self.stats.repos.len()),
            missing: self.stats.repos_with(RepoStatus::MISSING),
            cloning: self.stats.repos_with(RepoStatus::CLONING),
            timed_out: self.stats.repos_with(RepoStatus::TIMEDOUT),
            excluded_forks: self.stats.excluded_forks,
            excluded_archived: self.stats.excluded_archived,
            backends_missing: self.stats.backends_missing,
            limit_hit: self.limit_hit,
            match_limit: self.limit,
            display_limit: self.display_limit,
            trace: self.trace.clone(),
            done,
        }
    }

    /// Mid-stream progress. Clears the dirty flag.
    pub fn snapshot(&mut self) -> Progress {
        self.dirty = false;
        self.build(false)
    }

    /// The last progress of a stream: reveals the repository count.
    pub fn final_progress(&mut self) -> Progress {
        self.dirty = false;
        self.build(true)
    }

    fn build(&self, done: bool) -> Progress {
        let stats = self.progress_stats(done);
        Progress {
            done,
            repositories_count: stats.repositories_count,
            match_count: stats.match_count,
            duration_ms: stats.elapsed.as_millis() as u64,
            skipped: skipped_diagnostics(&stats, RepoNames(&self.names)),
            trace: stats.trace,
        }
    }
}
