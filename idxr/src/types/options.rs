use std::time::Duration;

use crate::types::constant::{DEFAULT_ENVIRONMENT, DEFAULT_OPERATION_TIMEOUT};

/// Behaviour switches for an [`IndexManager`](crate::IndexManager).
///
/// The defaults mirror the command line defaults: a 60 second budget,
/// failures accumulated rather than fatal, and existing indexes skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerOptions {
    /// Wall-clock budget used when an operation is called without a deadline.
    pub timeout: Duration,
    /// Keep going after a failing index or collection.
    pub continue_on_error: bool,
    /// Check the live index list by name before creating.
    pub skip_if_exists: bool,
    /// Free-form label attached to log lines.
    pub environment: String,
    /// Suppress informational logs.
    pub silent: bool,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_OPERATION_TIMEOUT,
            continue_on_error: true,
            skip_if_exists: true,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            silent: false,
        }
    }
}
