//! Versioned migrations with persisted status and rollback.
//!
//! Status lives in `_index_migrations`, one document per version:
//! `{ version, applied_at, success }`. A version counts as applied only while
//! a document with `success: true` exists for it. The unique index on
//! `version` is the only coordination point between runners; a runner that
//! loses the race fails when recording its status.
//!
//! Migration bodies are not wrapped in a transaction since index builds are
//! commonly disallowed inside one. Write them to be idempotent or crash-safe.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{self, doc, Document};
use mongodb::options::IndexOptions;
use mongodb::IndexModel;
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::core::client::database::{DatabaseClient, DatabaseError};
use crate::core::deadline::Deadline;
use crate::error::{MigrationError, MigrationResult};
use crate::types::constant::{
    DEFAULT_MIGRATION_STATUS_TIMEOUT, DEFAULT_MIGRATION_TIMEOUT, MIGRATIONS_COLLECTION, MIGRATION_VERSION_INDEX,
};
use crate::types::report::{MigrationRunReport, MigrationStatus};
use crate::utils::metrics::IDXR_METRICS;

/// One direction of a migration. Implementations may perform any database
/// work through the client they are handed.
#[async_trait]
pub trait MigrationStep: Send + Sync {
    async fn execute(&self, db: &dyn DatabaseClient) -> anyhow::Result<()>;
}

/// A versioned pair of apply and undo steps. Versions are opaque strings
/// ordered lexically, so zero-pad them (`"001"`, `"002"`, ...).
#[derive(Clone)]
pub struct Migration {
    pub version: String,
    pub description: String,
    up: Arc<dyn MigrationStep>,
    down: Option<Arc<dyn MigrationStep>>,
}

impl Migration {
    pub fn new(version: impl Into<String>, description: impl Into<String>, up: impl MigrationStep + 'static) -> Self {
        Self { version: version.into(), description: description.into(), up: Arc::new(up), down: None }
    }

    pub fn with_down(mut self, down: impl MigrationStep + 'static) -> Self {
        self.down = Some(Arc::new(down));
        self
    }

    /// Migrations without a `down` step cannot be rolled back.
    pub fn is_reversible(&self) -> bool {
        self.down.is_some()
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("description", &self.description)
            .field("reversible", &self.is_reversible())
            .finish()
    }
}

/// Stored shape of a status document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatusDocument {
    version: String,
    applied_at: bson::DateTime,
    success: bool,
}

impl From<StatusDocument> for MigrationStatus {
    fn from(document: StatusDocument) -> Self {
        Self { version: document.version, applied_at: document.applied_at.to_chrono(), success: document.success }
    }
}

/// Runs registered migrations against a database.
pub struct Migrator {
    db: Arc<dyn DatabaseClient>,
    migrations: Vec<Migration>,
    collection: String,
}

impl Migrator {
    pub fn new(db: Arc<dyn DatabaseClient>) -> Self {
        Self { db, migrations: Vec::new(), collection: MIGRATIONS_COLLECTION.to_string() }
    }

    /// Keep status documents in `collection` instead of `_index_migrations`.
    pub fn with_status_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Register a migration. Order does not matter; `run` sorts by version.
    pub fn add_migration(mut self, migration: Migration) -> Self {
        self.migrations.push(migration);
        self
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    pub fn status_collection(&self) -> &str {
        &self.collection
    }

    fn sorted(&self, descending: bool) -> Vec<&Migration> {
        let mut migrations: Vec<&Migration> = self.migrations.iter().collect();
        migrations.sort_by(|a, b| a.version.cmp(&b.version));
        if descending {
            migrations.reverse();
        }
        migrations
    }

    /// Apply every migration not yet recorded as successful, in ascending
    /// version order. The first failure is recorded and stops the batch.
    pub async fn run(&self, deadline: Option<Deadline>) -> MigrationResult<MigrationRunReport> {
        let deadline = Deadline::or_timeout(deadline, DEFAULT_MIGRATION_TIMEOUT);
        let started = Instant::now();
        let mut report = MigrationRunReport::default();

        self.ensure_status_index(deadline).await?;

        for migration in self.sorted(false) {
            let version = migration.version.as_str();
            if self.is_applied(Some(deadline), version).await? {
                info!(version = %version, "Migration already applied, skipping");
                report.skipped.push(version.to_string());
                continue;
            }

            info!(version = %version, description = %migration.description, "Applying migration");
            let step_started = Instant::now();
            let outcome = self.execute(deadline, migration.up.as_ref()).await;
            let duration_ms = step_started.elapsed().as_millis() as u64;

            match outcome {
                Ok(()) => {
                    self.record(deadline, version, true).await?;
                    IDXR_METRICS.migrations_applied.add(1, &[KeyValue::new("version", version.to_string())]);
                    info!(version = %version, duration_ms, "Migration applied");
                    report.applied.push(version.to_string());
                }
                Err(source) => {
                    error!(version = %version, duration_ms, error = %source, "Migration failed");
                    IDXR_METRICS.migrations_failed.add(1, &[KeyValue::new("version", version.to_string())]);
                    if let Err(record_err) = self.record(deadline, version, false).await {
                        warn!(version = %version, error = %record_err, "Failed to record migration failure");
                    }
                    return Err(MigrationError::Apply { version: version.to_string(), source });
                }
            }
        }

        report.duration = started.elapsed();
        info!(applied = report.applied.len(), skipped = report.skipped.len(), "Migrations completed");
        Ok(report)
    }

    /// Undo every applied migration with a version strictly greater than
    /// `target_version`, newest first. Returns the versions undone.
    ///
    /// Stops at the first applied migration without a `down` step; newer
    /// versions undone before it stay undone.
    pub async fn rollback(&self, deadline: Option<Deadline>, target_version: &str) -> MigrationResult<Vec<String>> {
        let deadline = Deadline::or_timeout(deadline, DEFAULT_MIGRATION_TIMEOUT);
        let mut rolled_back = Vec::new();

        for migration in self.sorted(true).into_iter().filter(|m| m.version.as_str() > target_version) {
            let version = migration.version.as_str();
            if !self.is_applied(Some(deadline), version).await? {
                continue;
            }

            let Some(down) = migration.down.as_ref() else {
                error!(version = %version, "Migration does not support rollback");
                return Err(MigrationError::RollbackUnsupported(version.to_string()));
            };

            info!(version = %version, description = %migration.description, "Rolling back migration");
            if let Err(source) = self.execute(deadline, down.as_ref()).await {
                error!(version = %version, error = %source, "Rollback failed");
                IDXR_METRICS.migrations_failed.add(1, &[KeyValue::new("version", version.to_string())]);
                return Err(MigrationError::Revert { version: version.to_string(), source });
            }

            deadline.run("delete_one", self.db.delete_one(&self.collection, doc! { "version": version })).await?;
            IDXR_METRICS.migrations_rolled_back.add(1, &[KeyValue::new("version", version.to_string())]);
            info!(version = %version, "Migration rolled back");
            rolled_back.push(version.to_string());
        }

        Ok(rolled_back)
    }

    /// Every status document, ascending by version.
    pub async fn status(&self, deadline: Option<Deadline>) -> MigrationResult<Vec<MigrationStatus>> {
        let deadline = Deadline::or_timeout(deadline, DEFAULT_MIGRATION_STATUS_TIMEOUT);
        let documents = deadline
            .run(
                "find",
                self.db.find(&self.collection, Document::new(), Some(doc! { "version": 1 }), Some(doc! { "_id": 0 })),
            )
            .await?;

        documents
            .into_iter()
            .map(|document| {
                bson::from_document::<StatusDocument>(document)
                    .map(MigrationStatus::from)
                    .map_err(|e| MigrationError::InvalidStatus(e.to_string()))
            })
            .collect()
    }

    pub async fn is_applied(&self, deadline: Option<Deadline>, version: &str) -> MigrationResult<bool> {
        let deadline = Deadline::or_timeout(deadline, DEFAULT_MIGRATION_STATUS_TIMEOUT);
        let filter = doc! { "version": version, "success": true };
        let count = deadline.run("count_documents", self.db.count_documents(&self.collection, filter)).await?;
        Ok(count > 0)
    }

    async fn ensure_status_index(&self, deadline: Deadline) -> MigrationResult<()> {
        let options = IndexOptions::builder().name(MIGRATION_VERSION_INDEX.to_string()).unique(true).build();
        let index = IndexModel::builder().keys(doc! { "version": 1 }).options(options).build();
        deadline.run("create_index", self.db.create_index(&self.collection, index)).await?;
        Ok(())
    }

    /// The deadline bounds the step as a whole; calls the step makes are not
    /// cut individually.
    async fn execute(&self, deadline: Deadline, step: &dyn MigrationStep) -> anyhow::Result<()> {
        if deadline.is_expired() {
            anyhow::bail!("deadline exceeded before the migration started");
        }
        match tokio::time::timeout_at(deadline.instant(), step.execute(self.db.as_ref())).await {
            Ok(outcome) => outcome,
            Err(_) => anyhow::bail!("deadline exceeded while the migration was running"),
        }
    }

    /// Replace any earlier failed attempt with the outcome of this one.
    /// A successful record of the same version by another runner makes the
    /// insert fail on the unique index.
    async fn record(&self, deadline: Deadline, version: &str, success: bool) -> MigrationResult<()> {
        let record_err = |source: DatabaseError| MigrationError::Record { version: version.to_string(), source };

        deadline
            .run("delete_one", self.db.delete_one(&self.collection, doc! { "version": version, "success": false }))
            .await
            .map_err(record_err)?;

        let status = StatusDocument { version: version.to_string(), applied_at: bson::DateTime::now(), success };
        let document = bson::to_document(&status).map_err(|e| record_err(e.into()))?;
        deadline.run("insert_one", self.db.insert_one(&self.collection, document)).await.map_err(record_err)?;
        Ok(())
    }
}

/// Applied-at of the newest successful migration, if any.
pub fn last_applied(statuses: &[MigrationStatus]) -> Option<DateTime<Utc>> {
    statuses.iter().filter(|status| status.success).map(|status| status.applied_at).max()
}
