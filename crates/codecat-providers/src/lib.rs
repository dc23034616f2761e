//! codecat-providers: collaborator implementations for codecat
//!
//! HTTP clients for the hosted collaborators the pipeline drives, plus a
//! filesystem provider for offline runs:
//!
//! - [`GitHubContentProvider`]: repository metadata, file tree and raw content
//! - [`OpenRouterScorer`]: LLM qualitative review of the selected excerpts
//! - [`TogetherImageSynthesizer`]: image generation from the structured prompt
//! - [`LocalContentProvider`]: a local directory served as a repository
//!
//! ## Layer 2 - Collaborators
//!
//! Focus: mapping every failure onto the transient/permanent split the
//! orchestrator's retry policy relies on. Retrying itself happens upstream.

pub mod error;
pub mod github;
pub mod local;
pub mod openrouter;
pub mod together;

pub use error::ProviderError;
pub use github::{GitHubConfig, GitHubContentProvider};
pub use local::LocalContentProvider;
pub use openrouter::{OpenRouterConfig, OpenRouterScorer};
pub use together::{TogetherConfig, TogetherImageSynthesizer};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("codecat/", env!("CARGO_PKG_VERSION"));

/// Result type for codecat-providers operations
pub type Result<T> = std::result::Result<T, ProviderError>;
