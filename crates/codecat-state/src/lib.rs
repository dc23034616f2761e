//! codecat-state: persistence for codecat generations
//!
//! Holds the [`Generation`] record model and its status machine, the
//! [`GenerationStore`] abstraction, an in-memory fake and a SurrealDB
//! backend.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: atomic per-stage writes, optimistic concurrency, and refusing any
//! write that would move a record backwards or out of a terminal state.

mod error;
pub mod fakes;
mod handle;
pub mod migrations;
pub mod model;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use handle::{connect_cloud, connect_from_env, connect_memory, connect_url, CloudConfig};
pub use model::{
    AgeClass, AnalysisReport, AttributeRecord, Breed, CoatClass, CriterionScore, Expression,
    FailureKind, FileEntry, FileMetricsSummary, Generation, GenerationFailure, GenerationId,
    GenerationStatus, ImagePrompt, ImageRef, PollState, PriorityClass, QualityBand,
    QualityBreakdown, RepoRef, RepositoryInfo, RepositoryListing, SelectedFile, SizeClass,
    SourceExcerpt, StageTransition,
};
pub use storage_traits::{ContentDigest, GenerationStore, StorageResult};
pub use surreal_store::SurrealGenerationStore;

/// Result type for codecat-state operations
pub type Result<T> = std::result::Result<T, StateError>;
