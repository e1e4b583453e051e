use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use tracing::debug;

use super::error::{is_duplicate_key, server_code, DatabaseError, NAMESPACE_NOT_FOUND_CODE};
use super::DatabaseClient;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// [`DatabaseClient`] backed by the official MongoDB driver.
pub struct MongoDbClient {
    client: Client,
    database: Database,
}

impl MongoDbClient {
    /// Parse `connection_uri` and bind to `database_name`. No round-trip is
    /// made; call [`DatabaseClient::ping`] to verify the connection.
    pub async fn new(connection_uri: &str, database_name: &str) -> Result<Self, DatabaseError> {
        let mut options = ClientOptions::parse(connection_uri).await?;
        options.app_name = Some("idxr".to_string());
        options.connect_timeout.get_or_insert(CONNECT_TIMEOUT);
        options.server_selection_timeout.get_or_insert(SERVER_SELECTION_TIMEOUT);

        let client = Client::with_options(options)?;
        let database = client.database(database_name);
        Ok(Self { client, database })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection(name)
    }
}

/// Unique-constraint violations get their own variant so callers can match
/// on them without inspecting driver internals.
fn classify(err: mongodb::error::Error) -> DatabaseError {
    if is_duplicate_key(&err) {
        DatabaseError::DuplicateKey(err.to_string())
    } else {
        DatabaseError::MongoError(err)
    }
}

#[async_trait]
impl DatabaseClient for MongoDbClient {
    async fn ping(&self) -> Result<(), DatabaseError> {
        self.client.database("admin").run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn create_index(&self, collection: &str, index: IndexModel) -> Result<String, DatabaseError> {
        let result = self.collection(collection).create_index(index).await.map_err(classify)?;
        Ok(result.index_name)
    }

    async fn drop_indexes(&self, collection: &str) -> Result<(), DatabaseError> {
        match self.collection(collection).drop_indexes().await {
            Ok(_) => Ok(()),
            Err(err) if server_code(&err) == Some(NAMESPACE_NOT_FOUND_CODE) => {
                debug!(collection = %collection, "Collection does not exist, nothing to drop");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn drop_index(&self, collection: &str, name: &str) -> Result<(), DatabaseError> {
        self.collection(collection).drop_index(name).await?;
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<Document>, DatabaseError> {
        // `Collection::list_indexes` yields typed models; the raw command keeps
        // every field the server reports.
        let response = match self.database.run_command(doc! { "listIndexes": collection }).await {
            Ok(response) => response,
            Err(err) if server_code(&err) == Some(NAMESPACE_NOT_FOUND_CODE) => {
                debug!(collection = %collection, "Collection does not exist, reporting no indexes");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        let first_batch = response
            .get_document("cursor")
            .and_then(|cursor| cursor.get_array("firstBatch"))
            .map_err(|e| DatabaseError::UnexpectedResponse(format!("listIndexes on {collection}: {e}")))?;

        first_batch
            .iter()
            .map(|index| match index {
                Bson::Document(document) => Ok(document.clone()),
                other => {
                    Err(DatabaseError::UnexpectedResponse(format!("listIndexes returned a non-document: {other}")))
                }
            })
            .collect()
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>, DatabaseError> {
        let cursor = self.collection(collection).aggregate(pipeline).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), DatabaseError> {
        self.collection(collection).insert_one(document).await.map_err(classify)?;
        Ok(())
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64, DatabaseError> {
        let result = self.collection(collection).delete_one(filter).await?;
        Ok(result.deleted_count)
    }

    async fn count_documents(&self, collection: &str, filter: Document) -> Result<u64, DatabaseError> {
        Ok(self.collection(collection).count_documents(filter).await?)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
        projection: Option<Document>,
    ) -> Result<Vec<Document>, DatabaseError> {
        let collection = self.collection(collection);
        let mut find = collection.find(filter);
        if let Some(sort) = sort {
            find = find.sort(sort);
        }
        if let Some(projection) = projection {
            find = find.projection(projection);
        }
        let cursor = find.await?;
        Ok(cursor.try_collect().await?)
    }

    async fn run_command(&self, command: Document) -> Result<Document, DatabaseError> {
        Ok(self.database.run_command(command).await?)
    }
}
