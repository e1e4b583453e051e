use std::time::Duration;

/// Budget applied to index operations when the caller supplies no deadline.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Budget applied to a whole `run` or `rollback` batch of migrations.
pub const DEFAULT_MIGRATION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Budget applied to migration status queries (`status`, `is_applied`).
pub const DEFAULT_MIGRATION_STATUS_TIMEOUT: Duration = Duration::from_secs(30);

/// Collection holding one status document per attempted migration.
pub const MIGRATIONS_COLLECTION: &str = "_index_migrations";

/// Name of the unique index on `version` in [`MIGRATIONS_COLLECTION`].
pub const MIGRATION_VERSION_INDEX: &str = "version_unique";

/// Name MongoDB gives the implicit primary key index.
pub const PRIMARY_KEY_INDEX: &str = "_id_";

pub const DEFAULT_ENVIRONMENT: &str = "development";

pub const DEFAULT_CONNECTION_URI: &str = "mongodb://localhost:27017";
