//! The marketplace's built-in index and migration catalogs, registered by the
//! `idxr` binary before it dispatches an action.

pub mod indexes;
pub mod migrations;

pub use indexes::register_indexes;
pub use migrations::register_migrations;
