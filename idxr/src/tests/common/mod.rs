//! In-memory stand-in for MongoDB and shared fixtures.
//!
//! The fake keeps indexes and documents per collection, enforces unique
//! indexes on insert and on index builds, and records every call so tests
//! can assert on driver traffic.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Bson, DateTime, Document};
use mongodb::IndexModel;

use crate::core::client::database::{DatabaseClient, DatabaseError};
use crate::core::indexer::IndexManager;
use crate::core::migration::MigrationStep;
use crate::types::constant::PRIMARY_KEY_INDEX;
use crate::types::options::IndexerOptions;

/// Collection key used for database level calls (`ping`, `run_command`).
pub const DATABASE_SCOPE: &str = "$cmd";

pub const FAKE_HOST: &str = "in-memory:27017";

/// A failure to inject into a driver call.
#[derive(Debug, Clone)]
pub enum Failure {
    DuplicateKey,
    Error(String),
    /// The call never completes; pair it with a deadline.
    Hang,
}

#[derive(Default)]
struct Collection {
    indexes: Vec<Document>,
    documents: Vec<Document>,
}

impl Collection {
    fn with_primary_key() -> Self {
        Self { indexes: vec![doc! { "v": 2, "key": { "_id": 1 }, "name": PRIMARY_KEY_INDEX }], documents: Vec::new() }
    }

    /// First unique index the document would violate, if any.
    fn violated_unique_index(&self, document: &Document) -> Option<String> {
        self.indexes.iter().filter(|index| index.get_bool("unique").unwrap_or(false)).find_map(|index| {
            let keys = index.get_document("key").ok()?;
            let candidate = key_values(keys, document);
            let taken = self.documents.iter().any(|existing| key_values(keys, existing) == candidate);
            taken.then(|| index.get_str("name").unwrap_or_default().to_string())
        })
    }

    fn has_duplicates(&self, keys: &Document) -> bool {
        let mut seen = Vec::new();
        for document in &self.documents {
            let values = key_values(keys, document);
            if seen.contains(&values) {
                return true;
            }
            seen.push(values);
        }
        false
    }
}

#[derive(Default)]
struct State {
    collections: BTreeMap<String, Collection>,
    calls: Vec<(&'static str, String)>,
    failures: HashMap<(&'static str, String), Failure>,
    index_stats: HashMap<String, Vec<Document>>,
    commands: Vec<Document>,
    command_response: Option<Document>,
}

#[derive(Default)]
pub struct InMemoryDatabase {
    state: Mutex<State>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed documents without unique checks, the way data predating an index
    /// would look.
    pub fn with_documents(self, collection: &str, documents: Vec<Document>) -> Self {
        {
            let mut state = self.state();
            let entry = state.collections.entry(collection.to_string()).or_insert_with(Collection::with_primary_key);
            entry.documents.extend(documents.into_iter().map(with_object_id));
        }
        self
    }

    pub fn fail(&self, operation: &'static str, collection: &str, failure: Failure) {
        self.state().failures.insert((operation, collection.to_string()), failure);
    }

    /// Replace the generated `$indexStats` output of `collection`.
    pub fn set_index_stats(&self, collection: &str, stats: Vec<Document>) {
        self.state().index_stats.insert(collection.to_string(), stats);
    }

    pub fn set_command_response(&self, response: Document) {
        self.state().command_response = Some(response);
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.state().calls.iter().filter(|(op, _)| *op == operation).count()
    }

    pub fn calls_on(&self, operation: &str, collection: &str) -> usize {
        self.state().calls.iter().filter(|(op, c)| *op == operation && c == collection).count()
    }

    pub fn total_calls(&self) -> usize {
        self.state().calls.len()
    }

    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }

    pub fn index_names(&self, collection: &str) -> Vec<String> {
        self.state()
            .collections
            .get(collection)
            .map(|c| c.indexes.iter().map(|index| index.get_str("name").unwrap_or_default().to_string()).collect())
            .unwrap_or_default()
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.state().collections.get(collection).map(|c| c.documents.clone()).unwrap_or_default()
    }

    pub fn commands(&self) -> Vec<Document> {
        self.state().commands.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Record the call and apply an injected failure, if one matches.
    async fn enter(&self, operation: &'static str, collection: &str) -> Result<(), DatabaseError> {
        let failure = {
            let mut state = self.state();
            state.calls.push((operation, collection.to_string()));
            state.failures.get(&(operation, collection.to_string())).cloned()
        };

        match failure {
            None => Ok(()),
            Some(Failure::Hang) => std::future::pending().await,
            Some(Failure::DuplicateKey) => {
                Err(DatabaseError::DuplicateKey(format!("E11000 duplicate key error collection: {collection}")))
            }
            Some(Failure::Error(message)) => Err(DatabaseError::UnexpectedResponse(message)),
        }
    }
}

#[async_trait]
impl DatabaseClient for InMemoryDatabase {
    async fn ping(&self) -> Result<(), DatabaseError> {
        self.enter("ping", DATABASE_SCOPE).await
    }

    async fn create_index(&self, collection: &str, index: IndexModel) -> Result<String, DatabaseError> {
        self.enter("create_index", collection).await?;

        let options = index.options.clone().unwrap_or_default();
        let name = options.name.clone().unwrap_or_else(|| generated_name(&index.keys));

        let mut state = self.state();
        let entry = state.collections.entry(collection.to_string()).or_insert_with(Collection::with_primary_key);

        if let Some(existing) = entry.indexes.iter().find(|i| i.get_str("name").is_ok_and(|n| n == name)) {
            return match existing.get_document("key") {
                Ok(keys) if *keys == index.keys => Ok(name),
                _ => Err(DatabaseError::UnexpectedResponse(format!(
                    "IndexKeySpecsConflict: an index named {name} already exists with different keys"
                ))),
            };
        }

        let unique = options.unique.unwrap_or(false);
        if unique && entry.has_duplicates(&index.keys) {
            return Err(DatabaseError::DuplicateKey(format!(
                "E11000 duplicate key error collection: {collection} index: {name}"
            )));
        }

        let mut document = doc! { "v": 2, "key": index.keys.clone(), "name": name.clone() };
        if unique {
            document.insert("unique", true);
        }
        if let Some(ttl) = options.expire_after {
            document.insert("expireAfterSeconds", ttl.as_secs() as i64);
        }
        entry.indexes.push(document);
        Ok(name)
    }

    async fn drop_indexes(&self, collection: &str) -> Result<(), DatabaseError> {
        self.enter("drop_indexes", collection).await?;
        if let Some(entry) = self.state().collections.get_mut(collection) {
            entry.indexes.retain(|index| index.get_str("name").is_ok_and(|name| name == PRIMARY_KEY_INDEX));
        }
        Ok(())
    }

    async fn drop_index(&self, collection: &str, name: &str) -> Result<(), DatabaseError> {
        self.enter("drop_index", collection).await?;
        let mut state = self.state();
        let entry = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| DatabaseError::UnexpectedResponse(format!("ns not found: {collection}")))?;
        let before = entry.indexes.len();
        entry.indexes.retain(|index| index.get_str("name").map_or(true, |existing| existing != name));
        if entry.indexes.len() == before {
            return Err(DatabaseError::UnexpectedResponse(format!("index not found with name [{name}]")));
        }
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<Document>, DatabaseError> {
        self.enter("list_indexes", collection).await?;
        Ok(self.state().collections.get(collection).map(|c| c.indexes.clone()).unwrap_or_default())
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>, DatabaseError> {
        self.enter("aggregate", collection).await?;
        let is_index_stats = pipeline.first().is_some_and(|stage| stage.contains_key("$indexStats"));
        if !is_index_stats {
            return Err(DatabaseError::UnexpectedResponse("only $indexStats pipelines are supported".to_string()));
        }

        let state = self.state();
        if let Some(stats) = state.index_stats.get(collection) {
            return Ok(stats.clone());
        }
        let indexes = state.collections.get(collection).map(|c| c.indexes.as_slice()).unwrap_or_default();
        Ok(indexes
            .iter()
            .map(|index| {
                doc! {
                    "name": index.get_str("name").unwrap_or_default(),
                    "key": index.get_document("key").cloned().unwrap_or_default(),
                    "host": FAKE_HOST,
                    "accesses": { "ops": 0_i64, "since": DateTime::now() },
                }
            })
            .collect())
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), DatabaseError> {
        self.enter("insert_one", collection).await?;
        let document = with_object_id(document);

        let mut state = self.state();
        let entry = state.collections.entry(collection.to_string()).or_insert_with(Collection::with_primary_key);
        if let Some(index) = entry.violated_unique_index(&document) {
            return Err(DatabaseError::DuplicateKey(format!(
                "E11000 duplicate key error collection: {collection} index: {index}"
            )));
        }
        entry.documents.push(document);
        Ok(())
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64, DatabaseError> {
        self.enter("delete_one", collection).await?;
        let mut state = self.state();
        let Some(entry) = state.collections.get_mut(collection) else { return Ok(0) };
        match entry.documents.iter().position(|document| matches_filter(document, &filter)) {
            Some(position) => {
                entry.documents.remove(position);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn count_documents(&self, collection: &str, filter: Document) -> Result<u64, DatabaseError> {
        self.enter("count_documents", collection).await?;
        let state = self.state();
        let documents = state.collections.get(collection).map(|c| c.documents.as_slice()).unwrap_or_default();
        Ok(documents.iter().filter(|document| matches_filter(document, &filter)).count() as u64)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
        projection: Option<Document>,
    ) -> Result<Vec<Document>, DatabaseError> {
        self.enter("find", collection).await?;
        let mut found: Vec<Document> = self
            .documents(collection)
            .into_iter()
            .filter(|document| matches_filter(document, &filter))
            .collect();

        if let Some(sort) = sort {
            found.sort_by(|a, b| compare_by(&sort, a, b));
        }
        if let Some(projection) = projection {
            found = found.into_iter().map(|document| project(document, &projection)).collect();
        }
        Ok(found)
    }

    async fn run_command(&self, command: Document) -> Result<Document, DatabaseError> {
        self.enter("run_command", DATABASE_SCOPE).await?;
        let mut state = self.state();
        state.commands.push(command);
        Ok(state.command_response.clone().unwrap_or_else(|| doc! { "ok": 1 }))
    }
}

fn with_object_id(mut document: Document) -> Document {
    if !document.contains_key("_id") {
        document.insert("_id", ObjectId::new());
    }
    document
}

fn key_values(keys: &Document, document: &Document) -> Vec<Bson> {
    keys.keys().map(|field| document.get(field).cloned().unwrap_or(Bson::Null)).collect()
}

/// MongoDB's default name: `<field>_<direction>` joined with underscores.
fn generated_name(keys: &Document) -> String {
    keys.iter()
        .map(|(field, direction)| match direction {
            Bson::String(kind) => format!("{field}_{kind}"),
            other => format!("{field}_{other}"),
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// Top-level equality only.
fn matches_filter(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(field, expected)| document.get(field) == Some(expected))
}

fn compare_by(sort: &Document, a: &Document, b: &Document) -> Ordering {
    for (field, direction) in sort {
        let ordering = compare_values(a.get(field), b.get(field));
        let descending = matches!(direction, Bson::Int32(d) if *d < 0) || matches!(direction, Bson::Int64(d) if *d < 0);
        let ordering = if descending { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_values(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (a, b) {
        (Some(Bson::String(a)), Some(Bson::String(b))) => a.cmp(b),
        (Some(Bson::DateTime(a)), Some(Bson::DateTime(b))) => a.cmp(b),
        (Some(a), Some(b)) => as_f64(a).partial_cmp(&as_f64(b)).unwrap_or(Ordering::Equal),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn project(document: Document, projection: &Document) -> Document {
    let included = |value: &Bson| matches!(value, Bson::Int32(1) | Bson::Int64(1) | Bson::Boolean(true));
    let inclusive = projection.iter().any(|(field, value)| field != "_id" && included(value));

    document
        .into_iter()
        .filter(|(field, _)| match projection.get(field) {
            Some(value) => included(value),
            None => !inclusive || field == "_id",
        })
        .collect()
}

/// Manager over `db` with default options and informational logs silenced.
pub fn manager(db: Arc<InMemoryDatabase>, options: IndexerOptions) -> IndexManager {
    IndexManager::new(db, IndexerOptions { silent: true, ..options })
}

/// Migration step that appends `label` to a shared journal, or fails.
pub struct RecordingStep {
    label: String,
    journal: Arc<Mutex<Vec<String>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingStep {
    pub fn new(label: &str, journal: &Arc<Mutex<Vec<String>>>) -> Self {
        Self { label: label.to_string(), journal: journal.clone(), fail: Arc::new(Mutex::new(false)) }
    }

    /// Fails while the returned switch holds `true`.
    pub fn failing(label: &str, journal: &Arc<Mutex<Vec<String>>>) -> (Self, Arc<Mutex<bool>>) {
        let step = Self::new(label, journal);
        *step.fail.lock().unwrap() = true;
        let switch = step.fail.clone();
        (step, switch)
    }
}

#[async_trait]
impl MigrationStep for RecordingStep {
    async fn execute(&self, _db: &dyn DatabaseClient) -> anyhow::Result<()> {
        if *self.fail.lock().unwrap() {
            anyhow::bail!("{} failed", self.label);
        }
        self.journal.lock().unwrap().push(self.label.clone());
        Ok(())
    }
}

pub fn journal() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    journal.lock().unwrap().clone()
}
