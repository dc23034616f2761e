//! Error taxonomy for the codecat pipeline.

use codecat_state::{GenerationId, StorageError};

/// Configuration rejected at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("rubric maxima sum to {sum}, but the ceiling is {ceiling}")]
    RubricCeilingMismatch { sum: f64, ceiling: f64 },

    #[error("rubric ceiling must be positive, got {0}")]
    NonPositiveCeiling(f64),

    #[error("rubric criterion missing: {0}")]
    MissingCriterion(String),

    #[error("unknown rubric criterion: {0}")]
    UnknownCriterion(String),

    #[error("rubric criterion {name} has invalid maximum {max}")]
    InvalidMaximum { name: String, max: f64 },

    #[error("score weights must lie in [0, 1] and sum to 1 (heuristic={heuristic}, qualitative={qualitative})")]
    InvalidWeights { heuristic: f64, qualitative: f64 },

    #[error("qualitative maximum must be positive, got {0}")]
    InvalidQualitativeMax(f64),

    #[error("invalid selection config: {0}")]
    InvalidSelection(String),

    #[error("invalid retry policy: {0}")]
    InvalidRetry(String),

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: String, value: String },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("repository not found: {0}")]
    RepoNotFound(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Network, timeout, rate limit or 5xx; eligible for retry.
    #[error("transient collaborator error: {0}")]
    Transient(String),

    /// Definitive rejection; never retried.
    #[error("permanent collaborator error: {0}")]
    Permanent(String),
}

impl CollaboratorError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CollaboratorError::Transient(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("no analyzable files: {0}")]
    NoAnalyzableFiles(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MappingError {
    #[error("score {0} is outside [0, 10]")]
    ScoreOutOfRange(f64),
}

/// Top-level codecat errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecatError {
    #[error("invalid repository reference: {0}")]
    InvalidRepoRef(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("generation not found: {0}")]
    NotFound(GenerationId),

    #[error("generation {id} not terminal after {waited_ms} ms")]
    WaitTimeout { id: GenerationId, waited_ms: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for codecat operations.
pub type Result<T> = std::result::Result<T, CodecatError>;
