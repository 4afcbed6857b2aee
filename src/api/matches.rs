//! Match payloads carried by `matches` events.
//!
//! Every variant is serialized with its `type` discriminant first so that
//! consumers can peek the tag before decoding the rest of the object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type RepoId = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Absolute byte offset, `-1` when only line/column are known.
    pub offset: i32,
    pub line: i32,
    pub column: i32,
}

impl Location {
    pub fn line_column(line: i32, column: i32) -> Self {
        Self {
            offset: -1,
            line,
            column,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Location,
    pub end: Location,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hunk {
    pub line_start: i32,
    pub line_count: i32,
    pub content: String,
    pub matches: Vec<Range>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLineMatch {
    pub line: String,
    /// Zero-based line number.
    pub line_number: i32,
    /// `[offset, length]` pairs within `line`.
    pub offset_and_lengths: Vec<[i32; 2]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMatch {
    pub content: String,
    pub content_start: Location,
    pub ranges: Vec<Range>,
}

impl ChunkMatch {
    /// Splits the chunk into per-line matches. Ranges spanning several
    /// lines contribute one segment to each line they touch.
    pub fn as_line_matches(&self) -> Vec<EventLineMatch> {
        let mut out = Vec::new();
        for (index, line) in self.content.split('\n').enumerate() {
            let line_number = self.content_start.line + index as i32;
            let line_len = line.len() as i32;
            let mut segments = Vec::new();
            for range in &self.ranges {
                if line_number < range.start.line || line_number > range.end.line {
                    continue;
                }
                let start = if line_number == range.start.line {
                    range.start.column
                } else {
                    0
                };
                let end = if line_number == range.end.line {
                    range.end.column
                } else {
                    line_len
                };
                if end > start {
                    segments.push([start, end - start]);
                }
            }
            if !segments.is_empty() {
                out.push(EventLineMatch {
                    line: line.to_string(),
                    line_number,
                    offset_and_lengths: segments,
                });
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContentMatch {
    pub path: String,
    #[serde(rename = "repositoryID")]
    pub repository_id: RepoId,
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_stars: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_last_fetched: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hunks: Option<Vec<Hunk>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_matches: Option<Vec<EventLineMatch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_matches: Option<Vec<ChunkMatch>>,
}

impl EventContentMatch {
    fn range_count(&self) -> usize {
        if let Some(chunks) = &self.chunk_matches {
            return chunks.iter().map(|c| c.ranges.len()).sum();
        }
        self.line_matches
            .as_ref()
            .map(|lines| lines.iter().map(|l| l.offset_and_lengths.len()).sum())
            .unwrap_or(0)
    }

    /// Line matches, derived from chunk matches when only those are present.
    pub fn resolved_line_matches(&self) -> Vec<EventLineMatch> {
        if let Some(lines) = &self.line_matches {
            return lines.clone();
        }
        self.chunk_matches
            .as_ref()
            .map(|chunks| chunks.iter().flat_map(|c| c.as_line_matches()).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPathMatch {
    pub path: String,
    #[serde(rename = "repositoryID")]
    pub repository_id: RepoId,
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_stars: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_last_fetched: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRepoMatch {
    #[serde(rename = "repositoryID")]
    pub repository_id: RepoId,
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_stars: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_last_fetched: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub private: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub container_name: String,
    pub kind: String,
    #[serde(default)]
    pub line: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSymbolMatch {
    pub path: String,
    #[serde(rename = "repositoryID")]
    pub repository_id: RepoId,
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_stars: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_last_fetched: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    pub symbols: Vec<Symbol>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCommitMatch {
    pub url: String,
    #[serde(rename = "repositoryID")]
    pub repository_id: RepoId,
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_stars: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_last_fetched: Option<DateTime<Utc>>,
    pub oid: String,
    pub message: String,
    pub author_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committer_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content: String,
    /// `[line, column, length]` triples within `content`.
    #[serde(default)]
    pub ranges: Vec<[i32; 3]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventMatch {
    Content(EventContentMatch),
    Path(EventPathMatch),
    Repo(EventRepoMatch),
    Symbol(EventSymbolMatch),
    Commit(EventCommitMatch),
}

impl EventMatch {
    pub fn kind(&self) -> &'static str {
        match self {
            EventMatch::Content(_) => "content",
            EventMatch::Path(_) => "path",
            EventMatch::Repo(_) => "repo",
            EventMatch::Symbol(_) => "symbol",
            EventMatch::Commit(_) => "commit",
        }
    }

    pub fn repository_id(&self) -> RepoId {
        match self {
            EventMatch::Content(m) => m.repository_id,
            EventMatch::Path(m) => m.repository_id,
            EventMatch::Repo(m) => m.repository_id,
            EventMatch::Symbol(m) => m.repository_id,
            EventMatch::Commit(m) => m.repository_id,
        }
    }

    pub fn repository(&self) -> &str {
        match self {
            EventMatch::Content(m) => &m.repository,
            EventMatch::Path(m) => &m.repository,
            EventMatch::Repo(m) => &m.repository,
            EventMatch::Symbol(m) => &m.repository,
            EventMatch::Commit(m) => &m.repository,
        }
    }

    /// File path for file-bearing matches.
    pub fn path(&self) -> Option<&str> {
        match self {
            EventMatch::Content(m) => Some(&m.path),
            EventMatch::Path(m) => Some(&m.path),
            EventMatch::Symbol(m) => Some(&m.path),
            EventMatch::Repo(_) | EventMatch::Commit(_) => None,
        }
    }

    /// Contribution of this match to the running match count.
    pub fn result_count(&self) -> usize {
        match self {
            EventMatch::Content(m) => m.range_count().max(1),
            EventMatch::Symbol(m) => m.symbols.len().max(1),
            EventMatch::Path(_) | EventMatch::Repo(_) | EventMatch::Commit(_) => 1,
        }
    }

    pub fn set_repo_metadata(&mut self, stars: Option<i32>, last_fetched: Option<DateTime<Utc>>) {
        let (repo_stars, repo_last_fetched) = match self {
            EventMatch::Content(m) => (&mut m.repo_stars, &mut m.repo_last_fetched),
            EventMatch::Path(m) => (&mut m.repo_stars, &mut m.repo_last_fetched),
            EventMatch::Repo(m) => (&mut m.repo_stars, &mut m.repo_last_fetched),
            EventMatch::Symbol(m) => (&mut m.repo_stars, &mut m.repo_last_fetched),
            EventMatch::Commit(m) => (&mut m.repo_stars, &mut m.repo_last_fetched),
        };
        *repo_stars = stars;
        *repo_last_fetched = last_fetched;
    }
}
