use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use tokio::time;
use tracing::{debug, warn};

use super::topk::{AggregationBucket, BoundedTopK, OtherCount};
use crate::api::{EventAlert, EventMatch, Progress, StreamEvent};
use crate::client::SearchClient;
use crate::endpoint::SearchParams;
use crate::error::ClientError;

/// What a match is grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    Repo,
    Path,
    Author,
}

impl AggregationMode {
    /// Group label for `m`, if the match carries one for this mode.
    pub fn label(self, m: &EventMatch) -> Option<String> {
        match (self, m) {
            (AggregationMode::Repo, m) => Some(m.repository().to_string()),
            (AggregationMode::Path, m) => m.path().map(str::to_string),
            (AggregationMode::Author, EventMatch::Commit(commit)) => {
                Some(commit.author_name.clone())
            }
            (AggregationMode::Author, _) => None,
        }
    }
}

impl FromStr for AggregationMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "repo" => Ok(Self::Repo),
            "path" => Ok(Self::Path),
            "author" => Ok(Self::Author),
            other => Err(format!("unknown aggregation mode '{other}'")),
        }
    }
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregationMode::Repo => "repo",
            AggregationMode::Path => "path",
            AggregationMode::Author => "author",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResult {
    pub mode: AggregationMode,
    pub buckets: Vec<AggregationBucket>,
    pub other: OtherCount,
    pub progress: Option<Progress>,
    /// The deadline expired before the stream completed.
    pub incomplete: bool,
    pub alerts: Vec<EventAlert>,
}

/// Folds decoded events into a bounded top-K grouping.
#[derive(Debug)]
pub struct SearchAggregator {
    mode: AggregationMode,
    topk: BoundedTopK,
    progress: Option<Progress>,
    alerts: Vec<EventAlert>,
}

impl SearchAggregator {
    pub fn new(mode: AggregationMode, capacity: usize) -> Self {
        Self {
            mode,
            topk: BoundedTopK::new(capacity),
            progress: None,
            alerts: Vec::new(),
        }
    }

    pub fn handle(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Matches(matches) => {
                for m in &matches {
                    if let Some(label) = self.mode.label(m) {
                        self.topk.add(&label, m.result_count());
                    }
                }
            }
            StreamEvent::Progress(progress) => self.progress = Some(progress),
            StreamEvent::Alert(alert) => self.alerts.push(alert),
            StreamEvent::Error(error) => warn!("search reported an error: {}", error.message),
            StreamEvent::Filters(_) | StreamEvent::Done => {}
        }
    }

    pub fn finish(mut self, deadline_alert: Option<EventAlert>) -> AggregationResult {
        let incomplete = deadline_alert.is_some();
        self.alerts.extend(deadline_alert);
        AggregationResult {
            mode: self.mode,
            buckets: self.topk.sort_aggregate(),
            other: self.topk.other(),
            progress: self.progress,
            incomplete,
            alerts: self.alerts,
        }
    }
}

/// Stream `params` from `client` and group the results. Running past
/// `deadline` is not an error: the partial grouping is returned flagged
/// incomplete with an "incomplete data" alert.
pub async fn aggregate_search(
    client: &SearchClient,
    params: &SearchParams,
    mode: AggregationMode,
    capacity: usize,
    deadline: Duration,
) -> Result<AggregationResult, ClientError> {
    let mut aggregator = SearchAggregator::new(mode, capacity);
    let run = client.stream(params, |event| aggregator.handle(event));

    let deadline_alert = match time::timeout(deadline, run).await {
        Ok(result) => {
            result?;
            None
        }
        Err(_) => {
            debug!(?deadline, "aggregation deadline exceeded");
            Some(EventAlert::incomplete_data(format!(
                "Aggregation did not complete within {}s; counts cover a partial result set.",
                deadline.as_secs()
            )))
        }
    };
    Ok(aggregator.finish(deadline_alert))
}

#[cfg(test)]
mod tests {
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::api::EventCommitMatch;
    use crate::testing::{content_match, path_match};

    fn commit(author: &str) -> EventMatch {
        EventMatch::Commit(EventCommitMatch {
            repository_id: 1,
            repository: "r".to_string(),
            author_name: author.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn modes_parse_and_label() {
        assert_eq!("Repo".parse::<AggregationMode>(), Ok(AggregationMode::Repo));
        assert!("lang".parse::<AggregationMode>().is_err());

        let file = path_match(1, "github.com/acme/api", "main.go");
        assert_eq!(AggregationMode::Path.label(&file).as_deref(), Some("main.go"));
        assert_eq!(AggregationMode::Author.label(&file), None);
        assert_eq!(AggregationMode::Author.label(&commit("ada")).as_deref(), Some("ada"));
    }

    #[test]
    fn groups_by_result_count() {
        let mut aggregator = SearchAggregator::new(AggregationMode::Repo, 2);
        aggregator.handle(StreamEvent::Matches(vec![
            content_match(1, "a", "x.go", &[1, 2, 3]),
            path_match(3, "c", "z.go"),
            path_match(3, "c", "w.go"),
            path_match(2, "b", "y.go"),
        ]));
        aggregator.handle(StreamEvent::Done);

        let result = aggregator.finish(None);
        assert!(!result.incomplete);
        let labels: Vec<(&str, usize)> = result
            .buckets
            .iter()
            .map(|b| (b.label.as_str(), b.count))
            .collect();
        assert_eq!(labels, vec![("a", 3), ("c", 2)]);
        assert_eq!(result.other.result_count, 1);
    }

    #[tokio::test]
    async fn deadline_yields_incomplete_result() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/search/stream");
            then.status(200)
                .delay(Duration::from_millis(500))
                .body("event: done\ndata: {}\n\n");
        });

        let client = SearchClient::new(server.base_url(), None).unwrap();
        let result = aggregate_search(
            &client,
            &SearchParams::new("type:commit"),
            AggregationMode::Author,
            10,
            Duration::from_millis(50),
        )
        .await
        .expect("deadline is not an error");

        assert!(result.incomplete);
        assert!(result.buckets.is_empty());
        assert!(result.alerts[0].is_incomplete_data());
    }

    #[tokio::test]
    async fn completed_stream_is_aggregated() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/search/stream");
            then.status(200).body(concat!(
                "event: matches\ndata: [",
                "{\"type\":\"commit\",\"url\":\"/c/1\",\"repositoryID\":1,\"repository\":\"r\",",
                "\"oid\":\"a1\",\"message\":\"fix\",\"authorName\":\"ada\"},",
                "{\"type\":\"commit\",\"url\":\"/c/2\",\"repositoryID\":1,\"repository\":\"r\",",
                "\"oid\":\"b2\",\"message\":\"feat\",\"authorName\":\"ada\"}",
                "]\n\n",
                "event: done\ndata: {}\n\n"
            ));
        });

        let client = SearchClient::new(server.base_url(), None).unwrap();
        let result = aggregate_search(
            &client,
            &SearchParams::new("type:commit"),
            AggregationMode::Author,
            10,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert!(!result.incomplete);
        assert_eq!(
            result.buckets,
            vec![AggregationBucket {
                label: "ada".to_string(),
                count: 2
            }]
        );
    }
}
