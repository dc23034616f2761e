//! Scripted collaborators for tests and offline runs.
//!
//! Each fake counts its calls and can be told to fail with a queue of
//! errors before behaving normally, which is enough to exercise retry,
//! degradation and resumption paths without a network.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use codecat_state::{
    FileEntry, ImagePrompt, ImageRef, RepoRef, RepositoryInfo, RepositoryListing, SourceExcerpt,
};

use crate::collaborators::{ContentProvider, ImageSynthesizer, QualitativeScorer};
use crate::error::CollaboratorError;
use crate::scoring::QualitativeScore;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory repository.
#[derive(Debug, Default)]
pub struct ScriptedContentProvider {
    info: RepositoryInfo,
    files: BTreeMap<String, String>,
    /// Listed with a size but not fetchable.
    phantom: BTreeMap<String, u64>,
    list_failures: Mutex<VecDeque<CollaboratorError>>,
    fetch_failures: Mutex<HashMap<String, VecDeque<CollaboratorError>>>,
    list_calls: AtomicU32,
    fetch_calls: AtomicU32,
}

impl ScriptedContentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_info(mut self, info: RepositoryInfo) -> Self {
        self.info = info;
        self
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    /// List `path` with `size` but answer `FileNotFound` when fetched.
    pub fn with_missing_file(mut self, path: impl Into<String>, size: u64) -> Self {
        self.phantom.insert(path.into(), size);
        self
    }

    /// Queue an error for the next `list_files` call.
    pub fn fail_listing_with(self, error: CollaboratorError) -> Self {
        lock(&self.list_failures).push_back(error);
        self
    }

    /// Queue an error for the next fetch of `path`.
    pub fn fail_fetch_with(self, path: impl Into<String>, error: CollaboratorError) -> Self {
        lock(&self.fetch_failures)
            .entry(path.into())
            .or_default()
            .push_back(error);
        self
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentProvider for ScriptedContentProvider {
    async fn list_files(&self, repo: &RepoRef) -> Result<RepositoryListing, CollaboratorError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = lock(&self.list_failures).pop_front() {
            return Err(error);
        }

        let mut info = self.info.clone();
        if info.owner.is_empty() {
            info.owner = repo.owner.clone();
        }
        if info.name.is_empty() {
            info.name = repo.name.clone();
        }
        let files = self
            .files
            .iter()
            .map(|(path, text)| FileEntry::new(path.clone(), text.len() as u64))
            .chain(
                self.phantom
                    .iter()
                    .map(|(path, size)| FileEntry::new(path.clone(), *size)),
            )
            .collect();
        Ok(RepositoryListing { info, files })
    }

    async fn fetch_file(&self, _repo: &RepoRef, path: &str) -> Result<String, CollaboratorError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = lock(&self.fetch_failures)
            .get_mut(path)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| CollaboratorError::FileNotFound(path.to_string()))
    }
}

/// Qualitative scorer that replays queued answers, then a fixed score.
#[derive(Debug)]
pub struct ScriptedScorer {
    fallback: QualitativeScore,
    script: Mutex<VecDeque<Result<QualitativeScore, CollaboratorError>>>,
    delay: Option<Duration>,
    calls: AtomicU32,
}

impl ScriptedScorer {
    pub fn returning(score: f64) -> Self {
        Self {
            fallback: QualitativeScore {
                score,
                commentary: Some(format!("scripted review: {score}/10")),
            },
            script: Mutex::new(VecDeque::new()),
            delay: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Queue an error for the next call.
    pub fn then_fail(self, error: CollaboratorError) -> Self {
        lock(&self.script).push_back(Err(error));
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QualitativeScorer for ScriptedScorer {
    async fn score(
        &self,
        _excerpts: &[SourceExcerpt],
        _language: Option<&str>,
    ) -> Result<QualitativeScore, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = lock(&self.script).pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// Image synthesizer that hands out `memory://` references.
#[derive(Debug, Default)]
pub struct ScriptedImageSynthesizer {
    failures: Mutex<VecDeque<CollaboratorError>>,
    prompts: Mutex<Vec<ImagePrompt>>,
    calls: AtomicU32,
}

impl ScriptedImageSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_fail(self, error: CollaboratorError) -> Self {
        lock(&self.failures).push_back(error);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received, in order.
    pub fn prompts(&self) -> Vec<ImagePrompt> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl ImageSynthesizer for ScriptedImageSynthesizer {
    async fn synthesize(&self, prompt: &ImagePrompt) -> Result<ImageRef, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.prompts).push(prompt.clone());
        if let Some(error) = lock(&self.failures).pop_front() {
            return Err(error);
        }
        Ok(ImageRef {
            url: format!("memory://images/{:016x}.png", prompt.seed),
            provider: "scripted".to_string(),
            model: None,
        })
    }
}
