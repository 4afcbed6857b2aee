//! Scripted search engine for driving the stream endpoint.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use search_stream::api::EventAlert;
use search_stream::error::EngineError;
use search_stream::{HandlerSender, SearchEngine, SearchEvent};

/// One scripted engine action.
#[derive(Debug, Clone)]
pub enum Step {
    Send(SearchEvent),
    Sleep(Duration),
}

/// Replays its steps for every query, then returns `outcome`.
pub struct MockEngine {
    steps: Vec<Step>,
    outcome: Result<Option<EventAlert>, EngineError>,
    queries: Mutex<Vec<String>>,
}

impl MockEngine {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            outcome: Ok(None),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Finish with the given result instead of a clean completion.
    pub fn with_outcome(mut self, outcome: Result<Option<EventAlert>, EngineError>) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchEngine for MockEngine {
    async fn execute(
        &self,
        query: &str,
        stream: HandlerSender,
    ) -> Result<Option<EventAlert>, EngineError> {
        self.queries.lock().unwrap().push(query.to_string());
        for step in &self.steps {
            match step {
                Step::Send(event) => stream
                    .send(event.clone())
                    .await
                    .map_err(|e| EngineError::Execution(e.to_string()))?,
                Step::Sleep(duration) => tokio::time::sleep(*duration).await,
            }
        }
        self.outcome.clone()
    }
}
