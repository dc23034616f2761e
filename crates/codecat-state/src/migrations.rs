//! SurrealDB schema migrations and initialization
//!
//! Sets up the `generations` table with its uniqueness constraint and the
//! indexes used by listing and resumption.

use crate::error::StateError;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all codecat tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing codecat SurrealDB schema");

    init_generations_table(db).await?;

    info!("codecat schema initialization complete");
    Ok(())
}

/// Initialize `generations` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE generations {
///   generation_id:     STRING (unique)
///   status:            STRING (pending | fetching | ... | completed | failed | cancelled)
///   revision:          INT    (optimistic concurrency counter)
///   cancel_requested:  BOOL
///   terminal:          BOOL   (indexed)
///   created_at:        DATETIME (indexed)
///   updated_at:        DATETIME
///   record:            OBJECT (full generation document)
/// }
/// ```
///
/// Constraints:
/// - `generation_id` is unique (a second `create` for the same id fails)
/// - status transitions and revision checks are enforced by the store
/// - records are never deleted by the pipeline
async fn init_generations_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing generations table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS generations AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_generation_id ON TABLE generations COLUMNS generation_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_generation_terminal ON TABLE generations COLUMNS terminal;
        DEFINE INDEX IF NOT EXISTS idx_generation_created_at ON TABLE generations COLUMNS created_at;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?
        .check()
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;

    debug!("generations table initialized");
    Ok(())
}
