pub mod error;
pub mod mongodb;

use ::mongodb::bson::Document;
use ::mongodb::IndexModel;
use async_trait::async_trait;

pub use self::mongodb::MongoDbClient;
pub use error::{is_duplicate_key, DatabaseError};

/// The slice of database functionality the index manager and the migration
/// engine depend on. Every call is one round-trip to the server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// ping - Check that the server is reachable
    async fn ping(&self) -> Result<(), DatabaseError>;

    // =========================================================================
    // Index Management
    // =========================================================================

    /// create_index - Create a single index, returning the name the server assigned
    async fn create_index(&self, collection: &str, index: IndexModel) -> Result<String, DatabaseError>;

    /// drop_indexes - Drop every index of a collection except `_id_`
    async fn drop_indexes(&self, collection: &str) -> Result<(), DatabaseError>;

    /// drop_index - Drop one index by name
    async fn drop_index(&self, collection: &str, name: &str) -> Result<(), DatabaseError>;

    /// list_indexes - Raw index documents (`name`, `key`, optional `unique`, ...)
    ///
    /// A collection that does not exist has no indexes.
    async fn list_indexes(&self, collection: &str) -> Result<Vec<Document>, DatabaseError>;

    /// aggregate - Run an aggregation pipeline and collect every output document
    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>, DatabaseError>;

    // =========================================================================
    // Generic CRUD Operations
    // =========================================================================

    /// insert_one - Insert a single document
    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), DatabaseError>;

    /// delete_one - Delete the first document matching `filter`, returning the deleted count
    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64, DatabaseError>;

    /// count_documents - Count documents matching `filter`
    async fn count_documents(&self, collection: &str, filter: Document) -> Result<u64, DatabaseError>;

    /// find - Find documents matching `filter` with optional sort and projection
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
        projection: Option<Document>,
    ) -> Result<Vec<Document>, DatabaseError>;

    /// run_command - Run an arbitrary database command (used by migration bodies)
    async fn run_command(&self, command: Document) -> Result<Document, DatabaseError>;
}
