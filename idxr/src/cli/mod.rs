//! Command line driver: parses an action and its flags, builds the index
//! manager and the migrator, runs the action and renders its result.

pub mod output;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, CommandFactory, Parser};
use tracing::{error, info, info_span, Instrument};

use crate::cli::output::Printer;
use crate::core::client::database::{DatabaseClient, MongoDbClient};
use crate::core::indexer::IndexManager;
use crate::core::migration::Migrator;
use crate::error::CliError;
use crate::types::constant::{DEFAULT_CONNECTION_URI, DEFAULT_ENVIRONMENT};
use crate::types::index::IndexDefinition;
use crate::types::options::IndexerOptions;
use crate::utils::parsers::parse_duration;

/// What the invocation should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Drop,
    List,
    Stats,
    Migrate,
    Rollback,
    MigrationStatus,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Drop => "drop",
            Action::List => "list",
            Action::Stats => "stats",
            Action::Migrate => "migrate",
            Action::Rollback => "rollback",
            Action::MigrationStatus => "migration-status",
        }
    }
}

impl FromStr for Action {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Action::Create),
            "drop" => Ok(Action::Drop),
            "list" => Ok(Action::List),
            "stats" => Ok(Action::Stats),
            "migrate" => Ok(Action::Migrate),
            "rollback" => Ok(Action::Rollback),
            "migration-status" => Ok(Action::MigrationStatus),
            other => Err(CliError::UnknownAction(other.to_string())),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "idxr", version, about = "Manage MongoDB indexes and migrations for the Khoomi marketplace")]
pub struct Cli {
    /// create, drop, list, stats, migrate, rollback or migration-status.
    #[arg(long, default_value = "create")]
    pub action: String,

    /// MongoDB connection URI.
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_CONNECTION_URI)]
    pub uri: String,

    /// Database name.
    #[arg(long = "db", env = "DB_NAME")]
    pub database: Option<String>,

    /// Collection to list, or to restrict stats to.
    #[arg(long)]
    pub collection: Option<String>,

    /// Budget for index actions, e.g. `60s`, `5m` or `1m30s`.
    #[arg(long, value_parser = parse_duration, default_value = "60s")]
    pub timeout: Duration,

    /// Keep going after a failing index or collection.
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value_t = true,
        default_missing_value = "true",
        value_name = "BOOL"
    )]
    pub continue_on_error: bool,

    /// Skip named indexes that already exist.
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value_t = true,
        default_missing_value = "true",
        value_name = "BOOL"
    )]
    pub skip_if_exists: bool,

    /// Print results as a JSON envelope.
    #[arg(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value_t = false,
        default_missing_value = "true",
        value_name = "BOOL"
    )]
    pub json: bool,

    /// Label attached to log lines.
    #[arg(long, env = "APP_ENV", default_value = DEFAULT_ENVIRONMENT)]
    pub environment: String,

    /// Suppress informational logs of the index manager.
    #[arg(long)]
    pub silent: bool,

    /// YAML or JSON file of extra index definitions.
    #[arg(long, value_name = "PATH")]
    pub definitions: Option<PathBuf>,

    /// Version to roll back to; newer migrations are undone.
    #[arg(long, value_name = "VERSION")]
    pub target: Option<String>,

    /// Collections to drop indexes from. Defaults to every registered collection.
    #[arg(value_name = "COLLECTION")]
    pub collections: Vec<String>,
}

impl Cli {
    pub fn indexer_options(&self) -> IndexerOptions {
        IndexerOptions {
            timeout: self.timeout,
            continue_on_error: self.continue_on_error,
            skip_if_exists: self.skip_if_exists,
            environment: self.environment.clone(),
            silent: self.silent,
        }
    }

    pub(crate) fn database_name(&self) -> Result<&str, CliError> {
        self.database.as_deref().filter(|name| !name.is_empty()).ok_or(CliError::MissingDatabaseName)
    }

    pub(crate) fn load_definitions(&self) -> Result<Vec<IndexDefinition>, CliError> {
        let Some(path) = &self.definitions else { return Ok(Vec::new()) };
        let definitions_err = |reason: String| CliError::Definitions { path: path.clone(), reason };

        let source = std::fs::read_to_string(path).map_err(|e| definitions_err(e.to_string()))?;
        IndexDefinition::parse_list(&source).map_err(|e| definitions_err(e.to_string()))
    }
}

/// Rewrite single-dash long flags (`-db khoomi`, `-json=false`) into their
/// `--` form so both spellings parse. Short and unknown arguments, and
/// everything after a bare `--`, pass through untouched.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let command = Cli::command();
    let long_flags: Vec<&str> = command.get_arguments().filter_map(|arg| arg.get_long()).collect();
    let mut positional_only = false;

    args.into_iter()
        .map(Into::into)
        .map(|arg: OsString| {
            if positional_only {
                return arg;
            }
            if arg == "--" {
                positional_only = true;
                return arg;
            }
            let rewritten = arg.to_str().and_then(|text| {
                let flag = text.strip_prefix('-').filter(|flag| !flag.starts_with('-'))?;
                let name = flag.split_once('=').map_or(flag, |(name, _)| name);
                (name.len() > 1 && long_flags.contains(&name)).then(|| OsString::from(format!("-{text}")))
            });
            rewritten.unwrap_or(arg)
        })
        .collect()
}

/// Connect to the database named on the command line and run the action,
/// writing its result to stdout.
///
/// Flags are validated before any connection is attempted.
pub async fn run_with<I, M>(cli: Cli, register_indexes: I, register_migrations: M) -> Result<(), CliError>
where
    I: FnOnce(IndexManager) -> IndexManager,
    M: FnOnce(Migrator) -> Migrator,
{
    let action: Action = cli.action.parse()?;
    let database_name = cli.database_name()?;
    let definitions = cli.load_definitions()?;

    let client = MongoDbClient::new(&cli.uri, database_name).await.map_err(CliError::Connection)?;
    client.ping().await.map_err(CliError::Connection)?;
    info!(database = %database_name, environment = %cli.environment, "Connected to MongoDB");

    let db: Arc<dyn DatabaseClient> = Arc::new(client);
    let manager = register_indexes(IndexManager::new(db.clone(), cli.indexer_options()))
        .load_from_definitions(definitions);
    let migrator = register_migrations(Migrator::new(db));

    let mut out = std::io::stdout();
    let span = info_span!("idxr", action = %action);
    dispatch(&cli, action, &manager, &migrator, &mut out).instrument(span).await
}

/// Run `action` against an already connected manager and migrator.
pub async fn dispatch(
    cli: &Cli,
    action: Action,
    manager: &IndexManager,
    migrator: &Migrator,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let mut printer = Printer::new(out, cli.json);

    match action {
        Action::Create => match manager.create(None).await {
            Ok(result) => printer.create(&result, None),
            // Failures are reported, not fatal; the caller inspects the result.
            Err(err) => {
                let message = err.to_string();
                error!(error = %message, "Index creation finished with failures");
                printer.create(&err.result, Some(message.as_str()))
            }
        },
        Action::Drop => {
            let dropped = manager.drop(None, &cli.collections).await?;
            printer.drop(&dropped)
        }
        Action::List => {
            let collection = cli.collection.as_deref().ok_or(CliError::MissingCollection("list"))?;
            let indexes = manager.list(None, collection).await?;
            printer.list(collection, &indexes)
        }
        Action::Stats => {
            let stats = match cli.collection.as_deref() {
                Some(collection) => {
                    let entries = manager.stats(None, collection).await?;
                    BTreeMap::from([(collection.to_string(), entries)])
                }
                None => manager.stats_all(None).await?,
            };
            printer.stats(&stats)
        }
        Action::Migrate => {
            let report = migrator.run(None).await?;
            printer.migrate(&report)
        }
        Action::Rollback => {
            let target = cli.target.as_deref().ok_or(CliError::MissingTarget)?;
            let rolled_back = migrator.rollback(None, target).await?;
            printer.rollback(target, &rolled_back)
        }
        Action::MigrationStatus => {
            let statuses = migrator.status(None).await?;
            printer.migration_status(&statuses)
        }
    }
}
