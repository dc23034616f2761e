//! Local filesystem content provider
//!
//! Serves a checked-out directory as if it were a hosted repository, for
//! offline analysis. The [`RepoRef`] passed to each call is ignored beyond
//! naming the listing.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use codecat_core::{CollaboratorError, ContentProvider};
use codecat_state::{FileEntry, RepoRef, RepositoryInfo, RepositoryListing};
use tracing::{debug, instrument};

/// Directories never worth walking.
const SKIPPED_DIRS: &[&str] = &[".git", ".hg", ".svn"];

/// [`ContentProvider`] over a directory tree.
#[derive(Debug, Clone)]
pub struct LocalContentProvider {
    root: PathBuf,
    language: Option<String>,
}

impl LocalContentProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalContentProvider {
            root: root.into(),
            language: None,
        }
    }

    /// Report `language` as the declared primary language.
    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A [`RepoRef`] naming the root directory, for callers without one.
    pub fn repo_ref(&self) -> RepoRef {
        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "local".to_string());
        RepoRef::new("local", name)
    }

    /// Resolve `path` under the root, refusing anything that escapes it.
    fn resolve(&self, path: &str) -> Result<PathBuf, CollaboratorError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes {
            return Err(CollaboratorError::Permanent(format!(
                "path {path:?} is outside the repository"
            )));
        }
        Ok(self.root.join(relative))
    }
}

/// Recursive walk returning `/`-separated paths relative to `root`.
fn walk(root: &Path) -> std::io::Result<Vec<FileEntry>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                let skipped = entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| SKIPPED_DIRS.contains(&name));
                if !skipped {
                    pending.push(path);
                }
            } else if file_type.is_file() {
                let Ok(relative) = path.strip_prefix(root) else {
                    continue;
                };
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push(FileEntry::new(relative, entry.metadata()?.len()));
            }
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

#[async_trait]
impl ContentProvider for LocalContentProvider {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn list_files(&self, repo: &RepoRef) -> Result<RepositoryListing, CollaboratorError> {
        if !self.root.is_dir() {
            return Err(CollaboratorError::RepoNotFound(self.root.display().to_string()));
        }
        let root = self.root.clone();
        let files = tokio::task::spawn_blocking(move || walk(&root))
            .await
            .map_err(|e| CollaboratorError::Permanent(format!("directory walk aborted: {e}")))?
            .map_err(|e| CollaboratorError::Permanent(format!("cannot list directory: {e}")))?;
        debug!(files = files.len(), "listed local directory");

        Ok(RepositoryListing {
            info: RepositoryInfo {
                name: repo.name.clone(),
                owner: repo.owner.clone(),
                size_kb: None,
                stars: None,
                primary_language: self.language.clone(),
                description: None,
            },
            files,
        })
    }

    async fn fetch_file(&self, _repo: &RepoRef, path: &str) -> Result<String, CollaboratorError> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CollaboratorError::FileNotFound(path.to_string()))
            }
            Err(e) => Err(CollaboratorError::Permanent(format!("cannot read {path}: {e}"))),
        }
    }
}
