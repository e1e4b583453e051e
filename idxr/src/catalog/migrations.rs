use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use mongodb::bson::doc;
use tracing::info;

use crate::core::client::database::DatabaseClient;
use crate::core::migration::{Migration, MigrationStep, Migrator};
use crate::types::index::IndexSpec;

pub const SESSION_COLLECTION: &str = "Session";
pub const SESSION_EXPIRY_INDEX: &str = "session_expiry_ttl";
pub const USER_COLLECTION: &str = "User";

/// Register every migration of the marketplace schema.
pub fn register_migrations(migrator: Migrator) -> Migrator {
    migrator
        .add_migration(
            Migration::new("0001", "Expire sessions at their expires_at timestamp", CreateSessionExpiryIndex)
                .with_down(DropSessionExpiryIndex),
        )
        .add_migration(Migration::new("0002", "Lowercase user primary emails", LowercasePrimaryEmails))
}

/// Documents are removed once `expires_at` is in the past.
struct CreateSessionExpiryIndex;

#[async_trait]
impl MigrationStep for CreateSessionExpiryIndex {
    async fn execute(&self, db: &dyn DatabaseClient) -> anyhow::Result<()> {
        let index = IndexSpec::new().ascending("expires_at").name(SESSION_EXPIRY_INDEX).expire_after(Duration::ZERO);
        db.create_index(SESSION_COLLECTION, index.to_model())
            .await
            .with_context(|| format!("Failed to create {SESSION_EXPIRY_INDEX} on {SESSION_COLLECTION}"))?;
        Ok(())
    }
}

struct DropSessionExpiryIndex;

#[async_trait]
impl MigrationStep for DropSessionExpiryIndex {
    async fn execute(&self, db: &dyn DatabaseClient) -> anyhow::Result<()> {
        db.drop_index(SESSION_COLLECTION, SESSION_EXPIRY_INDEX)
            .await
            .with_context(|| format!("Failed to drop {SESSION_EXPIRY_INDEX} on {SESSION_COLLECTION}"))?;
        Ok(())
    }
}

/// The original casing is not kept, so this one cannot be undone.
struct LowercasePrimaryEmails;

#[async_trait]
impl MigrationStep for LowercasePrimaryEmails {
    async fn execute(&self, db: &dyn DatabaseClient) -> anyhow::Result<()> {
        let command = doc! {
            "update": USER_COLLECTION,
            "updates": [{
                "q": { "primary_email": { "$type": "string" } },
                "u": [{ "$set": { "primary_email": { "$toLower": "$primary_email" } } }],
                "multi": true,
            }],
        };
        let response = db.run_command(command).await.context("Failed to lowercase primary emails")?;

        if let Ok(errors) = response.get_array("writeErrors") {
            if !errors.is_empty() {
                bail!("Lowercasing primary emails reported {} write errors: {:?}", errors.len(), errors);
            }
        }

        let modified = response.get_i32("nModified").unwrap_or_default();
        info!(modified, "Lowercased user primary emails");
        Ok(())
    }
}
