pub mod client;
pub mod deadline;
pub mod indexer;
pub mod migration;
pub mod stats;
