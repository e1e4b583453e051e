use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};

pub static IDXR_METRICS: Lazy<IdxrMetrics> = Lazy::new(IdxrMetrics::register);

pub struct IdxrMetrics {
    pub db_calls_response_time: Histogram<f64>,
    pub indexes_created: Counter<u64>,
    pub indexes_skipped: Counter<u64>,
    pub indexes_failed: Counter<u64>,
    pub migrations_applied: Counter<u64>,
    pub migrations_failed: Counter<u64>,
    pub migrations_rolled_back: Counter<u64>,
}

impl IdxrMetrics {
    pub fn register() -> Self {
        let meter: Meter = global::meter("crates.idxr.opentelemetry");

        let db_calls_response_time = meter
            .f64_histogram("idxr_db_calls_response_time")
            .with_description("Response time of DB calls over time")
            .with_unit("s")
            .build();

        let indexes_created = meter
            .u64_counter("idxr_indexes_created")
            .with_description("Indexes created by create batches")
            .with_unit("indexes")
            .build();

        let indexes_skipped = meter
            .u64_counter("idxr_indexes_skipped")
            .with_description("Indexes skipped because they already existed")
            .with_unit("indexes")
            .build();

        let indexes_failed = meter
            .u64_counter("idxr_indexes_failed")
            .with_description("Indexes that failed to build")
            .with_unit("indexes")
            .build();

        let migrations_applied = meter
            .u64_counter("idxr_migrations_applied")
            .with_description("Migrations applied and recorded as successful")
            .with_unit("migrations")
            .build();

        let migrations_failed = meter
            .u64_counter("idxr_migrations_failed")
            .with_description("Migrations whose up or down step failed")
            .with_unit("migrations")
            .build();

        let migrations_rolled_back = meter
            .u64_counter("idxr_migrations_rolled_back")
            .with_description("Migrations undone by rollback")
            .with_unit("migrations")
            .build();

        Self {
            db_calls_response_time,
            indexes_created,
            indexes_skipped,
            indexes_failed,
            migrations_applied,
            migrations_failed,
            migrations_rolled_back,
        }
    }
}
