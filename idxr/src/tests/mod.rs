pub mod common;
pub mod migration;
