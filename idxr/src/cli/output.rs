//! Text and JSON renderings of action results.
//!
//! JSON output is always one indented envelope per invocation:
//! `{ "success": bool, "result": ..., "error": "..." }`, where `result` is
//! omitted when there is nothing to report and `error` when the action
//! succeeded.

use std::collections::BTreeMap;
use std::io::Write;

use mongodb::bson::{Bson, Document};
use serde::Serialize;
use serde_json::{json, Value};

use crate::core::migration::last_applied;
use crate::error::CliError;
use crate::types::report::{CreateIndexesResult, IndexStatsEntry, MigrationRunReport, MigrationStatus};

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(result: T) -> Self {
        Self { success: true, result: Some(result), error: None }
    }
}

impl Envelope<()> {
    pub fn failed(error: impl ToString) -> Self {
        Self { success: false, result: None, error: Some(error.to_string()) }
    }
}

/// Writes action results to `out`, as text or as a JSON envelope.
pub struct Printer<'a> {
    out: &'a mut dyn Write,
    json: bool,
}

impl<'a> Printer<'a> {
    pub fn new(out: &'a mut dyn Write, json: bool) -> Self {
        Self { out, json }
    }

    fn envelope<T: Serialize>(&mut self, envelope: &Envelope<T>) -> Result<(), CliError> {
        serde_json::to_writer_pretty(&mut *self.out, envelope)?;
        writeln!(self.out)?;
        Ok(())
    }

    /// `error` is set when the batch finished with failures or stopped early.
    pub fn create(&mut self, result: &CreateIndexesResult, error: Option<&str>) -> Result<(), CliError> {
        if self.json {
            return self.envelope(&Envelope {
                success: error.is_none(),
                result: Some(result),
                error: error.map(str::to_string),
            });
        }

        writeln!(self.out, "Index creation finished in {:.2?}", result.duration)?;
        writeln!(self.out, "  Succeeded: {}", result.success_count)?;
        writeln!(self.out, "  Failed:    {}", result.failed_count)?;
        for failure in &result.failures {
            let index_name = if failure.index_name.is_empty() { "<unnamed>" } else { failure.index_name.as_str() };
            writeln!(self.out, "  - {}.{} ({}): {}", failure.collection, index_name, failure.kind, failure.error)?;
        }
        if let Some(error) = error {
            writeln!(self.out, "Error: {error}")?;
        }
        Ok(())
    }

    pub fn drop(&mut self, collections: &[String]) -> Result<(), CliError> {
        if self.json {
            return self.envelope(&Envelope::ok(json!({ "dropped": collections })));
        }
        if collections.is_empty() {
            writeln!(self.out, "No collections to drop indexes from")?;
        } else {
            writeln!(self.out, "Dropped indexes on: {}", collections.join(", "))?;
        }
        Ok(())
    }

    /// Index documents are rendered as relaxed extended JSON, as the server
    /// reported them.
    pub fn list(&mut self, collection: &str, indexes: &[Document]) -> Result<(), CliError> {
        let indexes: Vec<Value> =
            indexes.iter().map(|index| Bson::Document(index.clone()).into_relaxed_extjson()).collect();
        if self.json {
            return self.envelope(&Envelope::ok(indexes));
        }

        writeln!(self.out, "Indexes on {collection} ({}):", indexes.len())?;
        for index in &indexes {
            writeln!(self.out, "{}", serde_json::to_string_pretty(index)?)?;
        }
        Ok(())
    }

    pub fn stats(&mut self, stats: &BTreeMap<String, Vec<IndexStatsEntry>>) -> Result<(), CliError> {
        if self.json {
            return self.envelope(&Envelope::ok(stats));
        }

        for (collection, entries) in stats {
            writeln!(self.out, "Collection: {collection}")?;
            if entries.is_empty() {
                writeln!(self.out, "  (no index stats)")?;
            }
            for entry in entries {
                writeln!(self.out, "  {}", entry.name)?;
                writeln!(self.out, "    Accesses: {} since {}", entry.accesses, entry.since.to_rfc3339())?;
                writeln!(self.out, "    Host:     {}", entry.host)?;
                if entry.building {
                    writeln!(self.out, "    BUILDING")?;
                }
            }
        }
        Ok(())
    }

    pub fn migrate(&mut self, report: &MigrationRunReport) -> Result<(), CliError> {
        if self.json {
            return self.envelope(&Envelope::ok(report));
        }

        writeln!(self.out, "Migrations finished in {:.2?}", report.duration)?;
        writeln!(self.out, "  Applied: {}", list_or_none(&report.applied))?;
        writeln!(self.out, "  Skipped: {}", list_or_none(&report.skipped))?;
        Ok(())
    }

    pub fn rollback(&mut self, target: &str, versions: &[String]) -> Result<(), CliError> {
        if self.json {
            return self.envelope(&Envelope::ok(json!({ "target": target, "rolled_back": versions })));
        }
        writeln!(self.out, "Rolled back to {target}: {}", list_or_none(versions))?;
        Ok(())
    }

    pub fn migration_status(&mut self, statuses: &[MigrationStatus]) -> Result<(), CliError> {
        if self.json {
            return self.envelope(&Envelope::ok(statuses));
        }

        if statuses.is_empty() {
            writeln!(self.out, "No migrations recorded")?;
            return Ok(());
        }
        writeln!(self.out, "{:<12} {:<26} STATUS", "VERSION", "APPLIED AT")?;
        for status in statuses {
            let outcome = if status.success { "applied" } else { "failed" };
            writeln!(self.out, "{:<12} {:<26} {}", status.version, status.applied_at.to_rfc3339(), outcome)?;
        }
        if let Some(applied_at) = last_applied(statuses) {
            writeln!(self.out, "Last applied at {}", applied_at.to_rfc3339())?;
        }
        Ok(())
    }

    /// JSON mode only; text mode errors go through the logger.
    pub fn error(&mut self, error: &CliError) -> Result<(), CliError> {
        if self.json {
            self.envelope(&Envelope::<()>::failed(error))?;
        }
        Ok(())
    }
}

fn list_or_none(versions: &[String]) -> String {
    if versions.is_empty() {
        "none".to_string()
    } else {
        versions.join(", ")
    }
}
