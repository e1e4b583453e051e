//! MongoDB index and migration manager for the Khoomi marketplace backend.
//!
//! `idxr` applies a declarative set of collection indexes to a live database,
//! tracks versioned schema changes with forward and backward migrations, and
//! reports index usage statistics.
//!
//! ## Overview
//!
//! - [`IndexManager`] holds an ordered registry of [`IndexDefinition`]s and
//!   creates, drops, lists and inspects them against a [`DatabaseClient`].
//! - [`Migrator`] applies [`Migration`]s in ascending version order and rolls
//!   them back in descending order, persisting their status in
//!   `_index_migrations`.
//! - [`cli`] is the thin command line driver used by the `idxr` binary.
//!
//! Every public operation takes an `Option<Deadline>` as its first argument.
//! `None` means "use the configured timeout".

pub mod catalog;
pub mod cli;
pub mod core;
pub mod error;
pub mod types;
pub mod utils;

#[cfg(test)]
pub mod tests;

pub use crate::core::client::database::{DatabaseClient, DatabaseError, MongoDbClient};
pub use crate::core::deadline::Deadline;
pub use crate::core::indexer::IndexManager;
pub use crate::core::migration::{Migration, MigrationStep, Migrator};
pub use error::{CreateIndexesError, IndexerError, MigrationError};
pub use types::index::{IndexDefinition, IndexDirection, IndexKey, IndexSpec, IndexSpecOptions};
pub use types::options::IndexerOptions;
