//! SurrealDB-backed GenerationStore implementation
//!
//! Uses `schema::GenerationRow` for persistence, converting to/from
//! [`Generation`] at the boundary. Stage updates are a single conditional
//! `UPDATE ... WHERE revision = $rev`, so two writers racing on the same
//! record cannot both succeed.

use async_trait::async_trait;
use chrono::Utc;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, instrument};

use crate::error::StorageError;
use crate::handle;
use crate::model::{Generation, GenerationId};
use crate::schema::GenerationRow;
use crate::storage_traits::{check_update, GenerationStore, StorageResult};

fn backend(e: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// SurrealDB-backed implementation of [`GenerationStore`].
#[derive(Clone)]
pub struct SurrealGenerationStore {
    db: Surreal<Any>,
}

impl SurrealGenerationStore {
    /// Wrap an already-initialized connection.
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Ok(Self::new(handle::connect_memory().await?))
    }

    /// Create from environment variables (cloud, `SURREALDB_URL`, then local).
    pub async fn from_env() -> crate::Result<Self> {
        Ok(Self::new(handle::connect_from_env().await?))
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_row(&self, id: &GenerationId) -> StorageResult<GenerationRow> {
        let gid = id.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM generations WHERE generation_id = $gid")
            .bind(("gid", gid))
            .await
            .map_err(backend)?;

        let rows: Vec<GenerationRow> = res.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })
    }

    /// Conditional replace. Returns `None` when the revision moved.
    async fn swap_row(
        &self,
        current: &GenerationRow,
        replacement: GenerationRow,
    ) -> StorageResult<Option<GenerationRow>> {
        let gid = current.generation_id.clone();
        let mut res = self
            .db
            .query(
                "UPDATE generations CONTENT $row \
                 WHERE generation_id = $gid AND revision = $rev RETURN AFTER",
            )
            .bind(("row", replacement))
            .bind(("gid", gid))
            .bind(("rev", current.revision))
            .await
            .map_err(backend)?;

        let rows: Vec<GenerationRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next())
    }

    fn decode(row: GenerationRow) -> StorageResult<Generation> {
        row.into_generation().map_err(StorageError::from)
    }

    fn decode_all(rows: Vec<GenerationRow>) -> StorageResult<Vec<Generation>> {
        rows.into_iter().map(Self::decode).collect()
    }
}

#[async_trait]
impl GenerationStore for SurrealGenerationStore {
    #[instrument(skip(self, generation), fields(generation_id = %generation.id))]
    async fn create(&self, generation: &Generation) -> StorageResult<()> {
        match self.fetch_row(&generation.id).await {
            Ok(_) => {
                return Err(StorageError::AlreadyExists {
                    id: generation.id.to_string(),
                })
            }
            Err(StorageError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let row = GenerationRow::from_generation(generation).map_err(StorageError::from)?;
        debug!("creating generation");

        // The unique index turns a racing duplicate into an error here.
        let _created: Option<GenerationRow> = self
            .db
            .create("generations")
            .content(row)
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("already contains") {
                    StorageError::AlreadyExists {
                        id: generation.id.to_string(),
                    }
                } else {
                    StorageError::Backend(msg)
                }
            })?;

        Ok(())
    }

    async fn get(&self, id: &GenerationId) -> StorageResult<Generation> {
        Self::decode(self.fetch_row(id).await?)
    }

    #[instrument(skip(self, next), fields(generation_id = %next.id, status = %next.status))]
    async fn update_stage(
        &self,
        expected_revision: u64,
        next: &Generation,
    ) -> StorageResult<Generation> {
        let current = self.fetch_row(&next.id).await?;
        let stored = Self::decode(current.clone())?;
        check_update(&stored, expected_revision, next)?;

        let mut written = next.clone();
        written.revision = stored.revision + 1;
        written.created_at = stored.created_at;
        written.updated_at = Utc::now();
        let replacement = current.replaced_by(&written).map_err(StorageError::from)?;

        match self.swap_row(&current, replacement).await? {
            Some(row) => Self::decode(row),
            None => {
                let actual = self.fetch_row(&next.id).await?.revision;
                Err(StorageError::ConcurrentModification {
                    id: next.id.to_string(),
                    expected: expected_revision,
                    actual,
                })
            }
        }
    }

    #[instrument(skip(self), fields(generation_id = %id))]
    async fn request_cancel(&self, id: &GenerationId) -> StorageResult<Generation> {
        // Retry the conditional write if a stage lands in between.
        loop {
            let current = self.fetch_row(id).await?;
            let mut stored = Self::decode(current.clone())?;
            if stored.status.is_terminal() {
                return Err(StorageError::Terminal {
                    id: id.to_string(),
                    status: stored.status.to_string(),
                });
            }
            stored.cancel_requested = true;
            stored.revision += 1;
            stored.updated_at = Utc::now();
            let replacement = current.replaced_by(&stored).map_err(StorageError::from)?;

            if let Some(row) = self.swap_row(&current, replacement).await? {
                return Self::decode(row);
            }
        }
    }

    async fn list(&self, limit: usize) -> StorageResult<Vec<Generation>> {
        let mut res = self
            .db
            .query("SELECT * FROM generations ORDER BY created_at DESC LIMIT $limit")
            .bind(("limit", limit as i64))
            .await
            .map_err(backend)?;
        let rows: Vec<GenerationRow> = res.take(0).map_err(backend)?;
        Self::decode_all(rows)
    }

    async fn list_unfinished(&self) -> StorageResult<Vec<Generation>> {
        let mut res = self
            .db
            .query("SELECT * FROM generations WHERE terminal = false ORDER BY created_at ASC")
            .await
            .map_err(backend)?;
        let rows: Vec<GenerationRow> = res.take(0).map_err(backend)?;
        Self::decode_all(rows)
    }
}
