//! Per-index usage statistics from the `$indexStats` aggregation stage.

pub mod decode;

use std::collections::BTreeMap;

use mongodb::bson::doc;
use tracing::{info, warn};

use crate::core::deadline::Deadline;
use crate::core::indexer::IndexManager;
use crate::error::{IndexerError, IndexerResult};
use crate::types::report::IndexStatsEntry;

impl IndexManager {
    /// Usage statistics for every index of `collection`.
    pub async fn stats(&self, deadline: Option<Deadline>, collection: &str) -> IndexerResult<Vec<IndexStatsEntry>> {
        let deadline = self.deadline(deadline);
        let pipeline = vec![doc! { "$indexStats": {} }];
        let documents = deadline
            .run("aggregate", self.db.aggregate(collection, pipeline))
            .await
            .map_err(|source| IndexerError::Stats { collection: collection.to_string(), source })?;

        Ok(documents.iter().map(decode::decode_index_stats).collect())
    }

    /// Usage statistics for every collection in the registry, keyed by
    /// collection name. The database's own collection list is not consulted.
    pub async fn stats_all(
        &self,
        deadline: Option<Deadline>,
    ) -> IndexerResult<BTreeMap<String, Vec<IndexStatsEntry>>> {
        let deadline = self.deadline(deadline);
        let mut report = BTreeMap::new();

        for collection in self.collections() {
            match self.stats(Some(deadline), &collection).await {
                Ok(entries) => {
                    if !self.options.silent {
                        info!(collection = %collection, indexes = entries.len(), "Collected index stats");
                    }
                    report.insert(collection, entries);
                }
                Err(err) if self.options.continue_on_error => {
                    warn!(collection = %collection, error = %err, "Failed to collect index stats, recording none");
                    report.insert(collection, Vec::new());
                }
                Err(err) => return Err(err),
            }
        }

        Ok(report)
    }
}
