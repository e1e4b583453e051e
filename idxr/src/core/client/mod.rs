pub mod database;

pub use database::{DatabaseClient, DatabaseError, MongoDbClient};
