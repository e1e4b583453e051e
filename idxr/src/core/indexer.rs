use std::sync::Arc;
use std::time::Instant;

use itertools::Itertools;
use mongodb::bson::Document;
use opentelemetry::KeyValue;
use tracing::{debug, error, info, warn};

use crate::core::client::database::{DatabaseClient, DatabaseError};
use crate::core::deadline::Deadline;
use crate::error::{CreateIndexesError, IndexerError, IndexerResult};
use crate::types::index::{IndexDefinition, IndexSpec, IndexSpecOptions};
use crate::types::options::IndexerOptions;
use crate::types::report::{CreateIndexesResult, IndexFailure, IndexFailureKind};
use crate::utils::metrics::IDXR_METRICS;

/// Applies a registry of index definitions to a database.
///
/// The registry is built with chained calls and keeps insertion order:
///
/// ```no_run
/// # use std::sync::Arc;
/// # use idxr::{DatabaseClient, IndexManager, IndexSpec, IndexerOptions};
/// # async fn example(db: Arc<dyn DatabaseClient>) {
/// let manager = IndexManager::new(db, IndexerOptions::default())
///     .add("User", IndexSpec::new().ascending("primary_email").name("user_email_unique").unique())
///     .add_text("Listing", ["title", "description"])
///     .add_compound("Cart", ["user_id", "listing_id"], None);
/// let result = manager.create(None).await;
/// # }
/// ```
pub struct IndexManager {
    pub(crate) db: Arc<dyn DatabaseClient>,
    pub(crate) options: IndexerOptions,
    pub(crate) definitions: Vec<IndexDefinition>,
}

impl IndexManager {
    pub fn new(db: Arc<dyn DatabaseClient>, options: IndexerOptions) -> Self {
        Self { db, options, definitions: Vec::new() }
    }

    // =========================================================================
    // Registry
    // =========================================================================

    pub fn add(mut self, collection: impl Into<String>, index: IndexSpec) -> Self {
        self.definitions.push(IndexDefinition::new(collection, index));
        self
    }

    /// Register a text index over `fields`, named `<collection>_text_search`.
    pub fn add_text<I, S>(self, collection: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let collection = collection.into();
        let index = fields.into_iter().fold(IndexSpec::new(), |index, field| index.text(field));
        let index = index.name(format!("{collection}_text_search"));
        self.add(collection, index)
    }

    /// Register an ascending compound index over `fields`.
    pub fn add_compound<I, S>(self, collection: impl Into<String>, fields: I, options: Option<IndexSpecOptions>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let index = fields.into_iter().fold(IndexSpec::new(), |index, field| index.ascending(field));
        self.add(collection, index.with_options(options.unwrap_or_default()))
    }

    pub fn load_from_definitions(mut self, definitions: impl IntoIterator<Item = IndexDefinition>) -> Self {
        self.definitions.extend(definitions);
        self
    }

    pub fn clear(mut self) -> Self {
        self.definitions.clear();
        self
    }

    pub fn definitions(&self) -> &[IndexDefinition] {
        &self.definitions
    }

    /// Distinct collection names of the registry, in order of first appearance.
    pub fn collections(&self) -> Vec<String> {
        self.definitions.iter().map(|definition| definition.collection.clone()).unique().collect()
    }

    pub(crate) fn deadline(&self, deadline: Option<Deadline>) -> Deadline {
        Deadline::or_timeout(deadline, self.options.timeout)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Create every registered index, in registry order.
    ///
    /// With `skip_if_exists`, a named index already present on its collection
    /// counts as a success without a create call. Failures are accumulated
    /// when `continue_on_error` is set; otherwise the first one stops the
    /// batch. An exceeded deadline always stops it. Either way the error
    /// carries the partial result.
    pub async fn create(&self, deadline: Option<Deadline>) -> Result<CreateIndexesResult, CreateIndexesError> {
        let deadline = self.deadline(deadline);
        let started = Instant::now();
        let mut result = CreateIndexesResult::default();

        for definition in &self.definitions {
            let collection = definition.collection.as_str();
            let index_name = definition.index.index_name();

            if self.options.skip_if_exists && self.already_exists(deadline, collection, index_name).await {
                result.success_count += 1;
                IDXR_METRICS.indexes_skipped.add(1, &[KeyValue::new("collection", collection.to_string())]);
                if !self.options.silent {
                    info!(
                        collection = %collection,
                        index = index_name.unwrap_or_default(),
                        "Index already exists, skipping"
                    );
                }
                continue;
            }

            match deadline.run("create_index", self.db.create_index(collection, definition.index.to_model())).await {
                Ok(assigned_name) => {
                    result.success_count += 1;
                    IDXR_METRICS.indexes_created.add(1, &[KeyValue::new("collection", collection.to_string())]);
                    if !self.options.silent {
                        info!(collection = %collection, index = %assigned_name, "Created index");
                    }
                }
                Err(err) => {
                    let failure = self.failure(definition, &err);
                    IDXR_METRICS.indexes_failed.add(1, &[KeyValue::new("collection", collection.to_string())]);
                    result.record_failure(failure);

                    if !self.options.continue_on_error || err.is_deadline_exceeded() {
                        result.duration = started.elapsed();
                        let source = IndexerError::CreateIndex {
                            collection: collection.to_string(),
                            index_name: index_name.unwrap_or_default().to_string(),
                            source: err,
                        };
                        return Err(CreateIndexesError { result, source });
                    }
                }
            }
        }

        result.duration = started.elapsed();
        if result.failed_count > 0 {
            let failed = result.failed_count;
            return Err(CreateIndexesError { result, source: IndexerError::IndexesFailed(failed) });
        }

        if !self.options.silent {
            info!(
                environment = %self.options.environment,
                created = result.success_count,
                duration_ms = result.duration.as_millis() as u64,
                "Index creation completed"
            );
        }
        Ok(result)
    }

    async fn already_exists(&self, deadline: Deadline, collection: &str, index_name: Option<&str>) -> bool {
        if index_name.is_none() {
            return false;
        }
        match self.index_exists(Some(deadline), collection, index_name).await {
            Ok(exists) => exists,
            Err(err) => {
                warn!(collection = %collection, error = %err, "Could not list indexes, attempting creation");
                false
            }
        }
    }

    fn failure(&self, definition: &IndexDefinition, err: &DatabaseError) -> IndexFailure {
        let collection = definition.collection.clone();
        let index_name = definition.index.index_name().unwrap_or_default().to_string();

        let kind = if err.is_duplicate_key() {
            error!(
                collection = %collection,
                index = %index_name,
                error = %err,
                "Duplicate data prevents unique index"
            );
            IndexFailureKind::DuplicateData
        } else {
            error!(collection = %collection, index = %index_name, error = %err, "Failed to create index");
            IndexFailureKind::Build
        };

        IndexFailure { collection, index_name, kind, error: err.to_string() }
    }

    /// Drop every index except `_id_` on `collections`, or on every registry
    /// collection when `collections` is empty. Returns the collections whose
    /// indexes were dropped.
    pub async fn drop(&self, deadline: Option<Deadline>, collections: &[String]) -> IndexerResult<Vec<String>> {
        let deadline = self.deadline(deadline);
        let targets = if collections.is_empty() { self.collections() } else { collections.to_vec() };
        let mut dropped = Vec::with_capacity(targets.len());

        for collection in targets {
            match deadline.run("drop_indexes", self.db.drop_indexes(&collection)).await {
                Ok(()) => {
                    if !self.options.silent {
                        info!(collection = %collection, "Dropped indexes");
                    }
                    dropped.push(collection);
                }
                Err(err) => {
                    error!(collection = %collection, error = %err, "Failed to drop indexes");
                    if !self.options.continue_on_error || err.is_deadline_exceeded() {
                        return Err(IndexerError::DropIndexes { collection, source: err });
                    }
                }
            }
        }

        Ok(dropped)
    }

    /// The index documents the server reports for `collection`, unmodified.
    pub async fn list(&self, deadline: Option<Deadline>, collection: &str) -> IndexerResult<Vec<Document>> {
        let deadline = self.deadline(deadline);
        let indexes = deadline.run("list_indexes", self.db.list_indexes(collection)).await?;
        debug!(collection = %collection, count = indexes.len(), "Listed indexes");
        Ok(indexes)
    }

    /// Whether `collection` has an index called `name`. Always false for an
    /// unnamed index.
    pub async fn index_exists(
        &self,
        deadline: Option<Deadline>,
        collection: &str,
        name: Option<&str>,
    ) -> IndexerResult<bool> {
        let Some(name) = name else { return Ok(false) };
        let indexes = self.list(deadline, collection).await?;
        Ok(indexes.iter().any(|index| index.get_str("name").is_ok_and(|existing| existing == name)))
    }
}
