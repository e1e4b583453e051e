use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use mongodb::bson::doc;
use rstest::*;

use crate::core::client::database::{DatabaseClient, DatabaseError};
use crate::core::migration::{Migration, MigrationStep, Migrator};
use crate::error::MigrationError;
use crate::tests::common::{entries, journal, Failure, InMemoryDatabase, RecordingStep};
use crate::types::constant::{MIGRATIONS_COLLECTION, MIGRATION_VERSION_INDEX};

fn statuses(db: &InMemoryDatabase) -> Vec<(String, bool)> {
    let mut statuses: Vec<(String, bool)> = db
        .documents(MIGRATIONS_COLLECTION)
        .iter()
        .map(|document| {
            (document.get_str("version").unwrap().to_string(), document.get_bool("success").unwrap())
        })
        .collect();
    statuses.sort();
    statuses
}

fn status(version: &str, success: bool) -> (String, bool) {
    (version.to_string(), success)
}

/// `001` and `002`, both reversible, journaling `A`, `A'`, `B`, `B'`.
fn reversible_pair(db: &Arc<InMemoryDatabase>) -> (Migrator, Arc<std::sync::Mutex<Vec<String>>>) {
    let journal = journal();
    let migrator = Migrator::new(db.clone())
        .add_migration(
            Migration::new("002", "B", RecordingStep::new("B", &journal)).with_down(RecordingStep::new("B'", &journal)),
        )
        .add_migration(
            Migration::new("001", "A", RecordingStep::new("A", &journal)).with_down(RecordingStep::new("A'", &journal)),
        );
    (migrator, journal)
}

#[rstest]
#[tokio::test]
async fn run_applies_in_version_order_then_skips() {
    let db = Arc::new(InMemoryDatabase::new());
    let (migrator, journal) = reversible_pair(&db);

    let report = migrator.run(None).await.unwrap();
    assert_eq!(entries(&journal), vec!["A", "B"]);
    assert_eq!(report.applied, vec!["001", "002"]);
    assert!(report.skipped.is_empty());
    assert_eq!(statuses(&db), vec![status("001", true), status("002", true)]);
    assert!(db.index_names(MIGRATIONS_COLLECTION).contains(&MIGRATION_VERSION_INDEX.to_string()));

    let report = migrator.run(None).await.unwrap();
    assert!(report.applied.is_empty());
    assert_eq!(report.skipped, vec!["001", "002"]);
    assert_eq!(entries(&journal), vec!["A", "B"]);
}

#[rstest]
#[tokio::test]
async fn rollback_undoes_versions_above_target() {
    let db = Arc::new(InMemoryDatabase::new());
    let (migrator, journal) = reversible_pair(&db);
    migrator.run(None).await.unwrap();

    let rolled_back = migrator.rollback(None, "001").await.unwrap();
    assert_eq!(rolled_back, vec!["002"]);
    assert_eq!(entries(&journal), vec!["A", "B", "B'"]);
    assert_eq!(statuses(&db), vec![status("001", true)]);

    let rolled_back = migrator.rollback(None, "001").await.unwrap();
    assert!(rolled_back.is_empty());
    assert_eq!(entries(&journal), vec!["A", "B", "B'"]);
}

#[rstest]
#[case::to_first("001", vec!["B'"])]
#[case::to_nothing("000", vec!["B'", "A'"])]
#[case::past_newest("003", vec![])]
#[tokio::test]
async fn rollback_leaves_nothing_applied_above_target(#[case] target: &str, #[case] undone: Vec<&str>) {
    let db = Arc::new(InMemoryDatabase::new());
    let (migrator, journal) = reversible_pair(&db);
    migrator.run(None).await.unwrap();

    migrator.rollback(None, target).await.unwrap();

    let undone_now: Vec<String> = entries(&journal).into_iter().skip(2).collect();
    assert_eq!(undone_now, undone);
    let remaining = migrator.status(None).await.unwrap();
    assert!(remaining.iter().all(|status| !status.success || status.version.as_str() <= target));
}

#[rstest]
#[tokio::test]
async fn rollback_of_irreversible_migration_fails_before_running_anything() {
    let db = Arc::new(InMemoryDatabase::new());
    let journal = journal();
    let migrator = Migrator::new(db.clone())
        .add_migration(
            Migration::new("001", "A", RecordingStep::new("A", &journal)).with_down(RecordingStep::new("A'", &journal)),
        )
        .add_migration(Migration::new("002", "backfill", RecordingStep::new("backfill", &journal)));
    migrator.run(None).await.unwrap();

    let err = migrator.rollback(None, "000").await.unwrap_err();

    assert_matches!(err, MigrationError::RollbackUnsupported(ref version) if version == "002");
    assert_eq!(err.to_string(), "Migration 002 does not support rollback");
    assert_eq!(entries(&journal), vec!["A", "backfill"]);
    assert_eq!(statuses(&db), vec![status("001", true), status("002", true)]);
}

#[rstest]
#[tokio::test]
async fn failed_migration_is_recorded_and_stops_the_batch() {
    let db = Arc::new(InMemoryDatabase::new());
    let journal = journal();
    let (failing, switch) = RecordingStep::failing("B", &journal);
    let migrator = Migrator::new(db.clone())
        .add_migration(Migration::new("001", "A", RecordingStep::new("A", &journal)))
        .add_migration(Migration::new("002", "B", failing))
        .add_migration(Migration::new("003", "C", RecordingStep::new("C", &journal)));

    let err = migrator.run(None).await.unwrap_err();
    assert_matches!(err, MigrationError::Apply { ref version, .. } if version == "002");
    assert_eq!(err.to_string(), "Migration 002 failed: B failed");
    assert_eq!(entries(&journal), vec!["A"]);
    assert_eq!(statuses(&db), vec![status("001", true), status("002", false)]);
    assert!(!migrator.is_applied(None, "002").await.unwrap());

    // A fixed body re-runs; its failed record is replaced by the successful one.
    *switch.lock().unwrap() = false;
    let report = migrator.run(None).await.unwrap();
    assert_eq!(report.skipped, vec!["001"]);
    assert_eq!(report.applied, vec!["002", "003"]);
    assert_eq!(statuses(&db), vec![status("001", true), status("002", true), status("003", true)]);
}

#[rstest]
#[tokio::test]
async fn is_applied_holds_once_recorded() {
    let db = Arc::new(InMemoryDatabase::new());
    let (migrator, _journal) = reversible_pair(&db);

    assert!(!migrator.is_applied(None, "001").await.unwrap());
    migrator.run(None).await.unwrap();
    assert!(migrator.is_applied(None, "001").await.unwrap());
    assert!(migrator.is_applied(None, "002").await.unwrap());
    assert!(!migrator.is_applied(None, "003").await.unwrap());
}

#[rstest]
#[tokio::test]
async fn status_is_sorted_by_version() {
    let db = Arc::new(InMemoryDatabase::new());
    let (migrator, _journal) = reversible_pair(&db);
    migrator.run(None).await.unwrap();

    let statuses = migrator.status(None).await.unwrap();
    let versions: Vec<&str> = statuses.iter().map(|status| status.version.as_str()).collect();
    assert_eq!(versions, vec!["001", "002"]);
    assert!(statuses.iter().all(|status| status.success));
    assert!(statuses[0].applied_at <= statuses[1].applied_at);
}

#[rstest]
#[tokio::test]
async fn record_failure_does_not_mask_the_migration_error() {
    let db = Arc::new(InMemoryDatabase::new());
    db.fail("insert_one", MIGRATIONS_COLLECTION, Failure::Error("disk full".to_string()));
    let journal = journal();
    let (failing, _switch) = RecordingStep::failing("A", &journal);
    let migrator = Migrator::new(db.clone()).add_migration(Migration::new("001", "A", failing));

    let err = migrator.run(None).await.unwrap_err();
    assert_matches!(err, MigrationError::Apply { ref version, .. } if version == "001");
}

#[rstest]
#[tokio::test]
async fn record_failure_after_success_is_reported() {
    let db = Arc::new(InMemoryDatabase::new());
    db.fail("insert_one", MIGRATIONS_COLLECTION, Failure::Error("disk full".to_string()));
    let journal = journal();
    let migrator =
        Migrator::new(db.clone()).add_migration(Migration::new("001", "A", RecordingStep::new("A", &journal)));

    let err = migrator.run(None).await.unwrap_err();
    assert_matches!(err, MigrationError::Record { ref version, .. } if version == "001");
    assert_eq!(entries(&journal), vec!["A"]);
}

/// Stands in for a second runner that records the same version while this
/// runner's body is still executing.
struct ConcurrentRunner;

#[async_trait]
impl MigrationStep for ConcurrentRunner {
    async fn execute(&self, db: &dyn DatabaseClient) -> anyhow::Result<()> {
        let status = doc! { "version": "001", "applied_at": mongodb::bson::DateTime::now(), "success": true };
        db.insert_one(MIGRATIONS_COLLECTION, status).await?;
        Ok(())
    }
}

#[rstest]
#[tokio::test]
async fn losing_the_race_fails_on_the_unique_version_index() {
    let db = Arc::new(InMemoryDatabase::new());
    let migrator = Migrator::new(db.clone()).add_migration(Migration::new("001", "A", ConcurrentRunner));

    let err = migrator.run(None).await.unwrap_err();

    assert_matches!(err, MigrationError::Record { source: DatabaseError::DuplicateKey(_), .. });
    assert_eq!(statuses(&db), vec![status("001", true)]);
}

struct SlowStep;

#[async_trait]
impl MigrationStep for SlowStep {
    async fn execute(&self, _db: &dyn DatabaseClient) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_secs(60 * 60)).await;
        Ok(())
    }
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn migration_batch_is_bounded_by_default_timeout() {
    let db = Arc::new(InMemoryDatabase::new());
    let migrator = Migrator::new(db.clone()).add_migration(Migration::new("001", "slow", SlowStep));

    let err = migrator.run(None).await.unwrap_err();

    assert_matches!(err, MigrationError::Apply { ref version, .. } if version == "001");
    assert!(err.to_string().contains("deadline exceeded"));
    assert!(!migrator.is_applied(None, "001").await.unwrap());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn status_query_is_bounded_by_its_own_timeout() {
    let db = Arc::new(InMemoryDatabase::new());
    db.fail("find", MIGRATIONS_COLLECTION, Failure::Hang);
    let migrator = Migrator::new(db);

    let started = tokio::time::Instant::now();
    let err = migrator.status(None).await.unwrap_err();

    assert_matches!(err, MigrationError::Database(DatabaseError::DeadlineExceeded { operation: "find" }));
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert!(started.elapsed() < Duration::from_secs(31));
}

#[rstest]
#[tokio::test]
async fn custom_status_collection_is_used() {
    let db = Arc::new(InMemoryDatabase::new());
    let journal = journal();
    let migrator = Migrator::new(db.clone())
        .with_status_collection("_schema_versions")
        .add_migration(Migration::new("001", "A", RecordingStep::new("A", &journal)));

    migrator.run(None).await.unwrap();

    assert_eq!(migrator.status_collection(), "_schema_versions");
    assert_eq!(db.documents("_schema_versions").len(), 1);
    assert!(db.documents(MIGRATIONS_COLLECTION).is_empty());
}
