//! In-memory fakes for storage traits
//!
//! `MemoryGenerationStore` satisfies the [`GenerationStore`] contract without
//! any external dependencies. Used by tests and by the CLI's `--ephemeral`
//! mode.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::model::{Generation, GenerationId};
use crate::storage_traits::{check_update, GenerationStore, StorageResult};

/// In-memory generation store backed by a `HashMap<GenerationId, Generation>`.
///
/// Every write happens under a single lock, so `update_stage` is atomic with
/// respect to concurrent readers and writers.
#[derive(Debug, Default)]
pub struct MemoryGenerationStore {
    records: Mutex<HashMap<GenerationId, Generation>>,
}

impl MemoryGenerationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, HashMap<GenerationId, Generation>>> {
        self.records
            .lock()
            .map_err(|_| StorageError::Backend("generation store lock poisoned".to_string()))
    }
}

#[async_trait]
impl GenerationStore for MemoryGenerationStore {
    async fn create(&self, generation: &Generation) -> StorageResult<()> {
        let mut records = self.lock()?;
        if records.contains_key(&generation.id) {
            return Err(StorageError::AlreadyExists {
                id: generation.id.to_string(),
            });
        }
        records.insert(generation.id, generation.clone());
        Ok(())
    }

    async fn get(&self, id: &GenerationId) -> StorageResult<Generation> {
        let records = self.lock()?;
        records
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })
    }

    async fn update_stage(
        &self,
        expected_revision: u64,
        next: &Generation,
    ) -> StorageResult<Generation> {
        let mut records = self.lock()?;
        let stored = records
            .get_mut(&next.id)
            .ok_or_else(|| StorageError::NotFound {
                id: next.id.to_string(),
            })?;
        check_update(stored, expected_revision, next)?;

        let mut written = next.clone();
        written.revision = stored.revision + 1;
        written.created_at = stored.created_at;
        written.updated_at = Utc::now();
        *stored = written.clone();
        Ok(written)
    }

    async fn request_cancel(&self, id: &GenerationId) -> StorageResult<Generation> {
        let mut records = self.lock()?;
        let stored = records
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })?;
        if stored.status.is_terminal() {
            return Err(StorageError::Terminal {
                id: id.to_string(),
                status: stored.status.to_string(),
            });
        }
        stored.cancel_requested = true;
        stored.revision += 1;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn list(&self, limit: usize) -> StorageResult<Vec<Generation>> {
        let records = self.lock()?;
        let mut all: Vec<Generation> = records.values().cloned().collect();
        all.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        all.truncate(limit);
        Ok(all)
    }

    async fn list_unfinished(&self) -> StorageResult<Vec<Generation>> {
        let records = self.lock()?;
        let mut open: Vec<Generation> = records
            .values()
            .filter(|g| !g.status.is_terminal())
            .cloned()
            .collect();
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(open)
    }
}
