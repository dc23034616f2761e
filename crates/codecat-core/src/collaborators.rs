//! Interfaces to the external collaborators the pipeline drives.
//!
//! Implementations live in `codecat-providers` (HTTP and local filesystem)
//! and in [`crate::fakes`] (scripted, for tests). Every method reports
//! failures as [`CollaboratorError`] so the orchestrator can tell transient
//! conditions from definitive ones.

use async_trait::async_trait;
use codecat_state::{ImagePrompt, ImageRef, RepoRef, RepositoryListing, SourceExcerpt};

use crate::error::{CodecatError, CollaboratorError};
use crate::scoring::QualitativeScore;

/// Raw repository content.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Repository metadata and the flat `(path, size)` listing.
    ///
    /// Fails with [`CollaboratorError::RepoNotFound`] when the repository
    /// does not exist or is not visible.
    async fn list_files(&self, repo: &RepoRef) -> Result<RepositoryListing, CollaboratorError>;

    /// Text of one file. Fails with [`CollaboratorError::FileNotFound`] when
    /// the path is gone.
    async fn fetch_file(&self, repo: &RepoRef, path: &str) -> Result<String, CollaboratorError>;
}

/// LLM-backed qualitative review of code excerpts.
#[async_trait]
pub trait QualitativeScorer: Send + Sync {
    async fn score(
        &self,
        excerpts: &[SourceExcerpt],
        language: Option<&str>,
    ) -> Result<QualitativeScore, CollaboratorError>;
}

/// Image generation from a structured prompt.
#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    async fn synthesize(&self, prompt: &ImagePrompt) -> Result<ImageRef, CollaboratorError>;
}

const GITHUB_HOSTS: &[&str] = &["github.com", "www.github.com"];

/// Parse `https://github.com/<owner>/<name>[/...]` into a [`RepoRef`].
///
/// The scheme may be omitted; a trailing slash, extra path segments and a
/// `.git` suffix are tolerated.
pub fn parse_repo_url(url: &str) -> Result<RepoRef, CodecatError> {
    let invalid = |why: &str| CodecatError::InvalidRepoRef(format!("{url:?}: {why}"));

    let trimmed = url.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let without_query = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or(without_scheme);

    let mut segments = without_query.split('/');
    let host = segments.next().unwrap_or_default().to_ascii_lowercase();
    if !GITHUB_HOSTS.contains(&host.as_str()) {
        return Err(invalid("not a github.com URL"));
    }

    let owner = segments.next().unwrap_or_default();
    let name = segments.next().unwrap_or_default();
    let name = name.strip_suffix(".git").unwrap_or(name);
    if owner.is_empty() || name.is_empty() {
        return Err(invalid("expected https://github.com/<owner>/<name>"));
    }
    let valid = |s: &str| {
        s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    if !valid(owner) || !valid(name) {
        return Err(invalid("owner and name may only contain letters, digits, '-', '_' and '.'"));
    }

    Ok(RepoRef::new(owner, name))
}
