//! GitHub content provider
//!
//! Reads repository metadata and the recursive file tree from the REST API,
//! and file contents from `raw.githubusercontent.com`. Works without a token
//! at the unauthenticated rate limit.

use std::time::Duration;

use async_trait::async_trait;
use codecat_core::{CallKind, CollaboratorError, ContentProvider, RetryPolicy};
use codecat_state::{FileEntry, RepoRef, RepositoryInfo, RepositoryListing};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::error::{ensure_success, ProviderError};
use crate::USER_AGENT;

pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_RAW_URL: &str = "https://raw.githubusercontent.com";

/// GitHub configuration
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_url: String,
    pub raw_url: String,
    /// Personal access token (optional for public repositories)
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        GitHubConfig {
            api_url: DEFAULT_API_URL.to_string(),
            raw_url: DEFAULT_RAW_URL.to_string(),
            token: None,
            timeout: RetryPolicy::default().timeout_for(CallKind::Content),
        }
    }
}

impl GitHubConfig {
    /// Defaults plus `GITHUB_TOKEN` when set.
    pub fn from_env() -> Self {
        let token = std::env::var(ENV_GITHUB_TOKEN)
            .ok()
            .filter(|t| !t.trim().is_empty());
        GitHubConfig {
            token,
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_api_url(mut self, url: &str) -> Self {
        self.api_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_raw_url(mut self, url: &str) -> Self {
        self.raw_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct RepoOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    name: String,
    owner: RepoOwner,
    /// Kilobytes.
    size: Option<u64>,
    stargazers_count: Option<u64>,
    language: Option<String>,
    description: Option<String>,
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

impl From<RepoResponse> for RepositoryInfo {
    fn from(repo: RepoResponse) -> Self {
        RepositoryInfo {
            name: repo.name,
            owner: repo.owner.login,
            size_kb: repo.size,
            stars: repo.stargazers_count,
            primary_language: repo.language,
            description: repo.description,
        }
    }
}

/// Regular files only; submodules, symlinks and directories are dropped.
fn files_from_tree(tree: TreeResponse) -> Vec<FileEntry> {
    tree.tree
        .into_iter()
        .filter(|entry| entry.kind == "blob")
        .map(|entry| FileEntry::new(entry.path, entry.size.unwrap_or(0)))
        .collect()
}

/// [`ContentProvider`] backed by the GitHub REST API.
pub struct GitHubContentProvider {
    config: GitHubConfig,
    http_client: reqwest::Client,
}

impl GitHubContentProvider {
    pub fn new(config: GitHubConfig) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;
        Ok(GitHubContentProvider {
            config,
            http_client,
        })
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        Self::new(GitHubConfig::from_env())
    }

    fn api_get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self
            .http_client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn repository(&self, repo: &RepoRef) -> Result<RepoResponse, ProviderError> {
        let url = format!("{}/repos/{}/{}", self.config.api_url, repo.owner, repo.name);
        let response = self.api_get(&url).send().await?;
        let response = ensure_success(response, "repos").await?;
        Ok(response.json().await?)
    }

    async fn tree(&self, repo: &RepoRef, branch: &str) -> Result<TreeResponse, ProviderError> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.config.api_url, repo.owner, repo.name, branch
        );
        let response = self.api_get(&url).send().await?;
        let response = ensure_success(response, "git/trees").await?;
        Ok(response.json().await?)
    }
}

/// Percent-encode one URL path segment, keeping RFC 3986 unreserved bytes.
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Raw content URL for `path` on the default branch. Each `/`-separated
/// segment is encoded so `#`, `?` and `%` in file names reach GitHub intact.
fn raw_file_url(base: &str, repo: &RepoRef, path: &str) -> String {
    let encoded: Vec<String> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(encode_segment)
        .collect();
    format!(
        "{}/{}/{}/HEAD/{}",
        base.trim_end_matches('/'),
        encode_segment(&repo.owner),
        encode_segment(&repo.name),
        encoded.join("/")
    )
}

#[async_trait]
impl ContentProvider for GitHubContentProvider {
    #[instrument(skip(self), fields(repo = %repo.slug()))]
    async fn list_files(&self, repo: &RepoRef) -> Result<RepositoryListing, CollaboratorError> {
        let not_found = |err: ProviderError| {
            if err.is_not_found() {
                CollaboratorError::RepoNotFound(repo.slug())
            } else {
                err.into()
            }
        };

        let metadata = self.repository(repo).await.map_err(not_found)?;
        let branch = metadata
            .default_branch
            .clone()
            .unwrap_or_else(|| "HEAD".to_string());
        let tree = self.tree(repo, &branch).await.map_err(not_found)?;
        if tree.truncated {
            warn!(repo = %repo.slug(), "tree listing truncated; selecting from a partial listing");
        }

        let files = files_from_tree(tree);
        debug!(files = files.len(), branch = %branch, "listed repository");
        Ok(RepositoryListing {
            info: metadata.into(),
            files,
        })
    }

    #[instrument(skip(self), fields(repo = %repo.slug()))]
    async fn fetch_file(&self, repo: &RepoRef, path: &str) -> Result<String, CollaboratorError> {
        let url = raw_file_url(&self.config.raw_url, repo, path);
        let mut request = self.http_client.get(&url);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }
        let fetched = async {
            let response = request.send().await?;
            let response = ensure_success(response, "raw").await?;
            Ok::<_, ProviderError>(response.bytes().await?)
        }
        .await;

        match fetched {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(err) if err.is_not_found() => {
                Err(CollaboratorError::FileNotFound(path.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}
