use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

/// Why an index could not be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexFailureKind {
    /// Existing documents violate the uniqueness the index asks for.
    DuplicateData,
    /// Any other build error, including an exceeded deadline.
    Build,
}

impl std::fmt::Display for IndexFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexFailureKind::DuplicateData => write!(f, "duplicate data"),
            IndexFailureKind::Build => write!(f, "build error"),
        }
    }
}

/// One failed index of a create batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFailure {
    pub collection: String,
    /// Empty when the definition carried no name.
    pub index_name: String,
    pub kind: IndexFailureKind,
    pub error: String,
}

/// Outcome of [`IndexManager::create`](crate::IndexManager::create).
///
/// `failures` is ordered like the registry and always has `failed_count`
/// entries, also when the batch stopped early.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIndexesResult {
    pub success_count: usize,
    pub failed_count: usize,
    pub failures: Vec<IndexFailure>,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "duration_ms")]
    pub duration: Duration,
}

impl CreateIndexesResult {
    pub(crate) fn record_failure(&mut self, failure: IndexFailure) {
        self.failed_count += 1;
        self.failures.push(failure);
    }
}

/// Usage of a single index as reported by `$indexStats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatsEntry {
    pub name: String,
    /// Total operations that used the index since `since`.
    pub accesses: i64,
    /// Start of the counting window. Unix epoch when the server did not report one.
    pub since: DateTime<Utc>,
    pub host: String,
    pub building: bool,
}

/// Persisted outcome of one migration attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub version: String,
    pub applied_at: DateTime<Utc>,
    pub success: bool,
}

/// Outcome of [`Migrator::run`](crate::Migrator::run).
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRunReport {
    /// Versions whose `up` ran and was recorded, in the order they ran.
    pub applied: Vec<String>,
    /// Versions already recorded as successful before this run.
    pub skipped: Vec<String>,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "duration_ms")]
    pub duration: Duration,
}
