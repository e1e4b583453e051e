use std::future::Future;
use std::time::Duration;

use opentelemetry::KeyValue;
use tokio::time::Instant;

use crate::core::client::database::DatabaseError;
use crate::utils::metrics::IDXR_METRICS;

/// Stand-in for "never" when a timeout does not fit in an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Absolute point in time after which no further driver call is started.
///
/// Every public operation accepts an `Option<Deadline>`; `None` is replaced
/// by "now plus the configured timeout" once, at the start of the operation,
/// and the same deadline then bounds every driver call it makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    /// Timeouts too large to represent are clamped to a deadline decades away.
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        Self(now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE))
    }

    pub fn or_timeout(deadline: Option<Deadline>, timeout: Duration) -> Self {
        deadline.unwrap_or_else(|| Self::after(timeout))
    }

    pub fn instant(&self) -> Instant {
        self.0
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }

    /// Run one driver call under this deadline and record its latency.
    ///
    /// An already expired deadline fails without starting the call.
    pub async fn run<T, F>(self, operation: &'static str, call: F) -> Result<T, DatabaseError>
    where
        F: Future<Output = Result<T, DatabaseError>>,
    {
        if self.is_expired() {
            return Err(DatabaseError::DeadlineExceeded { operation });
        }

        let start = Instant::now();
        let outcome = tokio::time::timeout_at(self.0, call).await;
        let attributes = [KeyValue::new("db_operation_name", operation)];
        IDXR_METRICS.db_calls_response_time.record(start.elapsed().as_secs_f64(), &attributes);

        outcome.unwrap_or(Err(DatabaseError::DeadlineExceeded { operation }))
    }
}
