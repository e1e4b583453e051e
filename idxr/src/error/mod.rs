use std::path::PathBuf;

use thiserror::Error;

use crate::core::client::database::DatabaseError;
use crate::types::report::CreateIndexesResult;

pub type IndexerResult<T> = Result<T, IndexerError>;

/// Errors raised by the index manager and the stats collector.
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to create index {index_name:?} on {collection}: {source}")]
    CreateIndex {
        collection: String,
        index_name: String,
        #[source]
        source: DatabaseError,
    },

    #[error("{0} indexes failed")]
    IndexesFailed(usize),

    #[error("Failed to drop indexes on {collection}: {source}")]
    DropIndexes {
        collection: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Failed to collect index stats for {collection}: {source}")]
    Stats {
        collection: String,
        #[source]
        source: DatabaseError,
    },
}

/// A create batch that finished with failures, or stopped at the first one.
/// The partial result is kept alongside the cause.
#[derive(Error, Debug)]
#[error("{source}")]
pub struct CreateIndexesError {
    pub result: CreateIndexesResult,
    #[source]
    pub source: IndexerError,
}

pub type MigrationResult<T> = Result<T, MigrationError>;

/// Errors raised by the migration engine.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Migration {version} failed: {source}")]
    Apply {
        version: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Rollback of migration {version} failed: {source}")]
    Revert {
        version: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Migration {0} does not support rollback")]
    RollbackUnsupported(String),

    #[error("Failed to record status of migration {version}: {source}")]
    Record {
        version: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Invalid migration status document: {0}")]
    InvalidStatus(String),
}

/// Errors surfaced by the command line driver. All of them end the process
/// with exit code 1.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Unknown action: {0} (expected create, drop, list, stats, migrate, rollback or migration-status)")]
    UnknownAction(String),

    #[error("Database name is required (use --db or DB_NAME)")]
    MissingDatabaseName,

    #[error("--collection is required for the {0} action")]
    MissingCollection(&'static str),

    #[error("--target is required for the rollback action")]
    MissingTarget,

    #[error("Failed to connect to MongoDB: {0}")]
    Connection(#[source] DatabaseError),

    #[error("Failed to load index definitions from {path}: {reason}")]
    Definitions { path: PathBuf, reason: String },

    #[error(transparent)]
    Indexer(#[from] IndexerError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("Failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}
