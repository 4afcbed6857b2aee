//! In-memory repository metadata store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use search_stream::api::RepoId;
use search_stream::error::StoreError;
use search_stream::search::RepoMetadata;
use search_stream::RepoStore;

pub struct MockRepoStore {
    repos: HashMap<RepoId, RepoMetadata>,
}

impl MockRepoStore {
    pub fn new(repos: &[(RepoId, &str)]) -> Self {
        let fetched = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single();
        Self {
            repos: repos
                .iter()
                .map(|(id, name)| {
                    (
                        *id,
                        RepoMetadata {
                            id: *id,
                            name: name.to_string(),
                            stars: Some(100),
                            last_fetched: fetched,
                        },
                    )
                })
                .collect(),
        }
    }
}

#[async_trait]
impl RepoStore for MockRepoStore {
    async fn get_by_ids(
        &self,
        ids: &[RepoId],
    ) -> Result<HashMap<RepoId, RepoMetadata>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.repos.get(id).map(|r| (*id, r.clone())))
            .collect())
    }
}
