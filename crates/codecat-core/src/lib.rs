//! codecat-core: the repository analysis pipeline
//!
//! Pure components (selection, per-file heuristics, rubric scoring, score
//! aggregation, attribute mapping) plus the [`Orchestrator`] that drives a
//! generation through them and through the external collaborators.
//!
//! ## Layer 1 - Pipeline
//!
//! Focus: deterministic outputs for identical inputs, graceful degradation
//! when the qualitative scorer is unavailable, and resumable per-stage
//! progress on top of `codecat-state`.

pub mod analyzer;
pub mod attributes;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod fakes;
pub mod language;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod retry;
pub mod rubric;
pub mod scoring;
pub mod selection;
pub mod telemetry;

pub use analyzer::{analyze, FileMetrics};
pub use attributes::{map_attributes, quality_band, size_class, MappingInput};
pub use collaborators::{parse_repo_url, ContentProvider, ImageSynthesizer, QualitativeScorer};
pub use config::{PipelineConfig, Settings};
pub use error::{
    CodecatError, CollaboratorError, ConfigError, MappingError, Result, SelectionError,
};
pub use language::{Language, LanguageFamily};
pub use orchestrator::Orchestrator;
pub use retry::{CallKind, RetryFailure, RetryPolicy};
pub use rubric::{Criterion, QualityMetrics, Rubric, RubricConfig};
pub use scoring::{aggregate, AggregatedScore, QualitativeScore, QualitativeSignal, ScoreWeights};
pub use selection::{select_files, Selection, SelectionConfig};

pub use codecat_state::{
    Generation, GenerationId, GenerationStatus, GenerationStore, PollState, RepoRef,
};
