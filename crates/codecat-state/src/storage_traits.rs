//! Storage trait definitions for codecat
//!
//! - `GenerationStore`: persistence of [`Generation`] records with
//!   optimistic concurrency and state-machine enforcement.
//! - `ContentDigest`: SHA-256 identity of fetched file text.
//!
//! The trait is async and backend-agnostic. An in-memory fake lives in the
//! `fakes` module; the SurrealDB backend lives in `surreal_store`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;
use crate::model::{Generation, GenerationId};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private so the string is always lowercase hex produced
/// by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl From<ContentDigest> for String {
    fn from(digest: ContentDigest) -> Self {
        digest.0
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// GenerationStore
// ---------------------------------------------------------------------------

/// Persistence for generation records.
///
/// Guarantees:
/// - `create` rejects a duplicate id with `AlreadyExists`.
/// - `update_stage` is atomic: it succeeds only when the stored revision
///   equals `expected_revision`, and stores `next` with the revision bumped
///   by one. Readers see either the old record or the new one.
/// - `update_stage` never moves a record backwards, skips a stage, or
///   modifies a terminal record.
#[async_trait]
pub trait GenerationStore: Send + Sync {
    /// Persist a freshly created record.
    async fn create(&self, generation: &Generation) -> StorageResult<()>;

    /// Fetch a record. Returns `StorageError::NotFound` if absent.
    async fn get(&self, id: &GenerationId) -> StorageResult<Generation>;

    /// Replace the stored record with `next` if nobody else wrote since
    /// `expected_revision`. Returns the stored record.
    ///
    /// `next.status` must equal the stored status or be a legal single-step
    /// transition from it.
    async fn update_stage(
        &self,
        expected_revision: u64,
        next: &Generation,
    ) -> StorageResult<Generation>;

    /// Flag a non-terminal record for cancellation. The driver observes the
    /// flag before its next stage. Returns the stored record.
    async fn request_cancel(&self, id: &GenerationId) -> StorageResult<Generation>;

    /// Newest-first listing, at most `limit` records.
    async fn list(&self, limit: usize) -> StorageResult<Vec<Generation>>;

    /// Every record not yet in a terminal status, oldest first.
    async fn list_unfinished(&self) -> StorageResult<Vec<Generation>>;
}

/// Shared write-side validation for [`GenerationStore::update_stage`].
///
/// Backends call this with the currently stored record before writing.
pub fn check_update(
    stored: &Generation,
    expected_revision: u64,
    next: &Generation,
) -> StorageResult<()> {
    let id = stored.id.to_string();
    if stored.revision != expected_revision {
        return Err(StorageError::ConcurrentModification {
            id,
            expected: expected_revision,
            actual: stored.revision,
        });
    }
    if stored.status.is_terminal() {
        return Err(StorageError::Terminal {
            id,
            status: stored.status.to_string(),
        });
    }
    if next.status != stored.status && !stored.status.can_transition_to(next.status) {
        return Err(StorageError::InvalidTransition {
            id,
            from: stored.status.to_string(),
            to: next.status.to_string(),
        });
    }
    if next.id != stored.id {
        return Err(StorageError::Backend(format!(
            "record id mismatch: stored {}, update for {}",
            stored.id, next.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GenerationStatus, RepoRef};

    #[test]
    fn digest_is_stable_hex() {
        let a = ContentDigest::from_bytes(b"fn main() {}");
        let b = ContentDigest::from_bytes(b"fn main() {}");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn digest_rejects_non_hex() {
        let err = ContentDigest::try_from("nothex".to_string()).unwrap_err();
        assert!(matches!(err, StorageError::InvalidDigest { .. }));
    }

    #[test]
    fn digest_serde_validates() {
        let digest = ContentDigest::from_bytes(b"x");
        let json = serde_json::to_string(&digest).expect("serialize");
        let back: ContentDigest = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, digest);
        assert!(serde_json::from_str::<ContentDigest>("\"zz\"").is_err());
    }

    #[test]
    fn check_update_rejects_stale_revision() {
        let mut stored = Generation::new(RepoRef::new("o", "r"));
        stored.revision = 2;
        let mut next = stored.clone();
        next.record_transition(GenerationStatus::Fetching);

        let err = check_update(&stored, 1, &next).unwrap_err();
        assert!(matches!(
            err,
            StorageError::ConcurrentModification {
                expected: 1,
                actual: 2,
                ..
            }
        ));
        assert!(check_update(&stored, 2, &next).is_ok());
    }

    #[test]
    fn check_update_rejects_skipped_stage() {
        let stored = Generation::new(RepoRef::new("o", "r"));
        let mut next = stored.clone();
        next.status = GenerationStatus::Analyzing;

        let err = check_update(&stored, 0, &next).unwrap_err();
        assert!(matches!(err, StorageError::InvalidTransition { .. }));
    }

    #[test]
    fn check_update_rejects_terminal_record() {
        let mut stored = Generation::new(RepoRef::new("o", "r"));
        stored.status = GenerationStatus::Completed;
        let mut next = stored.clone();
        next.status = GenerationStatus::Analyzing;

        let err = check_update(&stored, 0, &next).unwrap_err();
        assert!(matches!(err, StorageError::Terminal { .. }));
    }
}
