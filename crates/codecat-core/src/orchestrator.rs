//! Generation orchestrator.
//!
//! Drives each [`Generation`] through
//! `pending → fetching → selecting → analyzing → scoring → mapping → imaging → completed`.
//!
//! One loop iteration runs exactly one stage:
//!
//! 1. reload the record; stop if it is terminal, finish as `cancelled` if a
//!    cancel was requested;
//! 2. compute the next stage's output (one collaborator call sequence or one
//!    pure component);
//! 3. persist output and status together with a revision-checked write.
//!
//! A stage that loses the revision race discards its result. Because the
//! status names the last persisted stage, a restarted driver resumes at the
//! first stage whose output is missing and never repeats an external call
//! for a stage already persisted.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use codecat_state::{
    AnalysisReport, AttributeRecord, ContentDigest, FailureKind, Generation, GenerationId,
    GenerationStatus, GenerationStore, ImageRef, QualityBreakdown, RepoRef, RepositoryListing,
    SelectedFile, SourceExcerpt, StorageError,
};

use crate::analyzer::analyze;
use crate::attributes::{map_attributes, MappingInput};
use crate::collaborators::{parse_repo_url, ContentProvider, ImageSynthesizer, QualitativeScorer};
use crate::config::Settings;
use crate::error::{CodecatError, CollaboratorError, Result};
use crate::language::Language;
use crate::metrics::METRICS;
use crate::obs::{self, GenerationSpan};
use crate::retry::{CallKind, RetryFailure};
use crate::scoring::{aggregate, QualitativeSignal};
use crate::selection::{select_files, truncate_to_boundary};

/// Why a stage could not produce output.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StageFailure {
    kind: FailureKind,
    message: String,
}

impl StageFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn missing(what: &str) -> Self {
        Self::new(
            FailureKind::Internal,
            format!("{what} missing from persisted record"),
        )
    }

    /// Classify a collaborator call that gave up.
    fn from_retry(failure: RetryFailure, during: &str) -> Self {
        let kind = match (&failure.error, failure.exhausted) {
            (CollaboratorError::RepoNotFound(_), _) => FailureKind::RepoNotFound,
            (_, true) => FailureKind::RetriesExhausted,
            _ => FailureKind::PermanentCollaborator,
        };
        let message = match kind {
            FailureKind::RetriesExhausted => format!(
                "{during} failed after {} attempts: {}",
                failure.attempts, failure.error
            ),
            _ => format!("{during} failed: {}", failure.error),
        };
        Self::new(kind, message)
    }
}

/// Output of one stage, applied to the record before it is persisted.
#[derive(Debug)]
enum StageOutput {
    Listing(RepositoryListing),
    Selection {
        files: Vec<SelectedFile>,
        dominant_language: Option<String>,
        has_tests: bool,
        has_readme: bool,
    },
    Analysis(AnalysisReport),
    Score {
        score: f64,
        breakdown: QualityBreakdown,
    },
    Attributes(AttributeRecord),
    Image(ImageRef),
    Done,
}

impl StageOutput {
    fn apply(self, generation: &mut Generation) {
        match self {
            StageOutput::Listing(listing) => generation.listing = Some(listing),
            StageOutput::Selection {
                files,
                dominant_language,
                has_tests,
                has_readme,
            } => {
                generation.selected_files = files;
                generation.dominant_language = dominant_language;
                generation.listing_has_tests = has_tests;
                generation.listing_has_readme = has_readme;
            }
            StageOutput::Analysis(report) => generation.analysis = Some(report),
            StageOutput::Score { score, breakdown } => {
                generation.quality_score = Some(score);
                generation.quality_breakdown = Some(breakdown);
            }
            StageOutput::Attributes(record) => generation.attributes = Some(record),
            StageOutput::Image(image) => generation.image = Some(image),
            StageOutput::Done => {}
        }
    }
}

/// Ids currently driven by this process. Dropping the claim releases it.
struct Claim {
    active: Arc<Mutex<HashSet<GenerationId>>>,
    id: GenerationId,
}

impl Drop for Claim {
    fn drop(&mut self) {
        lock_active(&self.active).remove(&self.id);
    }
}

fn lock_active(active: &Mutex<HashSet<GenerationId>>) -> MutexGuard<'_, HashSet<GenerationId>> {
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owns every write to generation records.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn GenerationStore>,
    content: Arc<dyn ContentProvider>,
    scorer: Arc<dyn QualitativeScorer>,
    images: Arc<dyn ImageSynthesizer>,
    settings: Arc<Settings>,
    active: Arc<Mutex<HashSet<GenerationId>>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn GenerationStore>,
        content: Arc<dyn ContentProvider>,
        scorer: Arc<dyn QualitativeScorer>,
        images: Arc<dyn ImageSynthesizer>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            store,
            content,
            scorer,
            images,
            settings,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Create a `pending` record for `url` and start driving it in the
    /// background. Returns as soon as the record is persisted.
    pub async fn start_generation(&self, url: &str) -> Result<GenerationId> {
        let repo = parse_repo_url(url)?;
        let id = self.create_generation(repo).await?;
        self.spawn_driver(id);
        Ok(id)
    }

    /// Persist a new `pending` record without driving it.
    pub async fn create_generation(&self, repo: RepoRef) -> Result<GenerationId> {
        let generation = Generation::new(repo);
        self.store.create(&generation).await?;
        METRICS.inc_started();
        obs::emit_generation_started(&generation.id, &generation.repo.slug());
        Ok(generation.id)
    }

    /// Snapshot of the record as last persisted. Never triggers work.
    pub async fn get_generation(&self, id: &GenerationId) -> Result<Generation> {
        self.store.get(id).await.map_err(|err| match err {
            StorageError::NotFound { .. } => CodecatError::NotFound(*id),
            other => other.into(),
        })
    }

    /// Most recent generations first.
    pub async fn list_generations(&self, limit: usize) -> Result<Vec<Generation>> {
        Ok(self.store.list(limit).await?)
    }

    /// Request cancellation. A running driver stops before its next stage;
    /// a record nobody is driving is closed immediately. Cancelling a
    /// terminal record returns it unchanged.
    pub async fn cancel_generation(&self, id: &GenerationId) -> Result<Generation> {
        let flagged = match self.store.request_cancel(id).await {
            Ok(flagged) => flagged,
            Err(StorageError::NotFound { .. }) => return Err(CodecatError::NotFound(*id)),
            Err(StorageError::Terminal { .. }) => return self.get_generation(id).await,
            Err(err) => return Err(err.into()),
        };
        if self.is_active(id) {
            return Ok(flagged);
        }
        self.finish_cancelled(flagged).await
    }

    /// Drive `id` in the foreground until it is terminal or another driver
    /// owns it, returning the last observed record.
    pub async fn run_to_completion(&self, id: GenerationId) -> Result<Generation> {
        let Some(_claim) = self.try_claim(id) else {
            tracing::debug!(generation_id = %id, "already driven by this process");
            return self.get_generation(&id).await;
        };
        GenerationSpan::new(&id).instrument(self.drive(id)).await
    }

    /// Re-drive every non-terminal record, e.g. after a restart.
    pub async fn resume_unfinished(&self) -> Result<Vec<GenerationId>> {
        let unfinished = self.store.list_unfinished().await?;
        let ids: Vec<GenerationId> = unfinished.iter().map(|g| g.id).collect();
        for id in &ids {
            tracing::info!(generation_id = %id, "resuming generation");
            self.spawn_driver(*id);
        }
        Ok(ids)
    }

    /// Poll until the record is terminal or `deadline` elapses.
    pub async fn wait_for_terminal(
        &self,
        id: &GenerationId,
        poll_interval: Duration,
        deadline: Duration,
    ) -> Result<Generation> {
        let started = tokio::time::Instant::now();
        loop {
            let generation = self.get_generation(id).await?;
            if generation.is_terminal() {
                return Ok(generation);
            }
            if started.elapsed() >= deadline {
                return Err(CodecatError::WaitTimeout {
                    id: *id,
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    fn spawn_driver(&self, id: GenerationId) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = this.run_to_completion(id).await {
                obs::emit_driver_error(&id, &err);
            }
        });
    }

    fn is_active(&self, id: &GenerationId) -> bool {
        lock_active(&self.active).contains(id)
    }

    fn try_claim(&self, id: GenerationId) -> Option<Claim> {
        if !lock_active(&self.active).insert(id) {
            return None;
        }
        Some(Claim {
            active: self.active.clone(),
            id,
        })
    }

    async fn drive(&self, id: GenerationId) -> Result<Generation> {
        loop {
            let current = self.get_generation(&id).await?;
            if current.is_terminal() {
                return Ok(current);
            }
            if current.cancel_requested {
                return self.finish_cancelled(current).await;
            }
            let Some(stage) = current.status.next() else {
                return Ok(current);
            };

            let started = Instant::now();
            let mut next = current.clone();
            match self.run_stage(&current, stage).await {
                Ok(output) => {
                    output.apply(&mut next);
                    next.record_transition(stage);
                }
                Err(failure) => next.record_failure(failure.kind, failure.message),
            }

            match self.store.update_stage(current.revision, &next).await {
                Ok(written) => {
                    self.after_write(&written, started.elapsed());
                    if written.is_terminal() {
                        return Ok(written);
                    }
                }
                Err(StorageError::ConcurrentModification { .. } | StorageError::Terminal { .. }) => {
                    let latest = self.get_generation(&id).await?;
                    if !latest.is_terminal() && latest.cancel_requested {
                        return self.finish_cancelled(latest).await;
                    }
                    tracing::debug!(
                        generation_id = %id,
                        stage = %stage,
                        "record changed underneath this driver; yielding"
                    );
                    return Ok(latest);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn after_write(&self, written: &Generation, elapsed: Duration) {
        match written.status {
            GenerationStatus::Failed => {
                METRICS.inc_failed();
                obs::emit_generation_finished(
                    &written.id,
                    written.status,
                    written.quality_score,
                    written.failure.as_ref().map(|f| f.message.as_str()),
                );
            }
            status => {
                METRICS.inc_stages();
                obs::emit_stage_completed(
                    &written.id,
                    status,
                    written.revision,
                    elapsed.as_millis() as u64,
                );
                if status == GenerationStatus::Completed {
                    METRICS.inc_completed();
                    obs::emit_generation_finished(
                        &written.id,
                        status,
                        written.quality_score,
                        None,
                    );
                }
            }
        }
    }

    /// Move a flagged record to `cancelled`, retrying on revision races until
    /// someone (possibly another driver) closes it.
    async fn finish_cancelled(&self, mut current: Generation) -> Result<Generation> {
        loop {
            if current.is_terminal() {
                return Ok(current);
            }
            let at_stage = current.status;
            let mut next = current.clone();
            next.record_transition(GenerationStatus::Cancelled);
            match self.store.update_stage(current.revision, &next).await {
                Ok(written) => {
                    METRICS.inc_cancelled();
                    obs::emit_generation_cancelled(&written.id, at_stage);
                    return Ok(written);
                }
                Err(StorageError::ConcurrentModification { .. } | StorageError::Terminal { .. }) => {
                    current = self.get_generation(&current.id).await?;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn run_stage(
        &self,
        current: &Generation,
        stage: GenerationStatus,
    ) -> std::result::Result<StageOutput, StageFailure> {
        match stage {
            GenerationStatus::Fetching => self.fetch_listing(current).await,
            GenerationStatus::Selecting => self.select(current),
            GenerationStatus::Analyzing => self.analyze_files(current).await,
            GenerationStatus::Scoring => self.score(current).await,
            GenerationStatus::Mapping => self.map(current),
            GenerationStatus::Imaging => self.synthesize(current).await,
            GenerationStatus::Completed => Ok(StageOutput::Done),
            other => Err(StageFailure::new(
                FailureKind::Internal,
                format!("{other} is not a runnable stage"),
            )),
        }
    }

    fn retry_hook(
        &self,
        id: GenerationId,
        stage: GenerationStatus,
    ) -> impl FnMut(u32, Duration, &CollaboratorError) {
        move |attempt, delay, error| {
            METRICS.inc_retries();
            obs::emit_retry_scheduled(&id, stage, attempt, delay, error);
        }
    }

    async fn fetch_listing(
        &self,
        current: &Generation,
    ) -> std::result::Result<StageOutput, StageFailure> {
        let repo = &current.repo;
        let listing = self
            .settings
            .retry
            .for_call(CallKind::Content)
            .run(
                |_| self.content.list_files(repo),
                self.retry_hook(current.id, GenerationStatus::Fetching),
            )
            .await
            .map_err(|f| StageFailure::from_retry(f, "listing repository files"))?;
        Ok(StageOutput::Listing(listing))
    }

    fn select(&self, current: &Generation) -> std::result::Result<StageOutput, StageFailure> {
        let listing = current
            .listing
            .as_ref()
            .ok_or_else(|| StageFailure::missing("repository listing"))?;
        let selection = select_files(
            &listing.files,
            listing.info.primary_language.as_deref(),
            &self.settings.selection,
        )
        .map_err(|err| StageFailure::new(FailureKind::NoAnalyzableFiles, err.to_string()))?;

        Ok(StageOutput::Selection {
            files: selection.files,
            dominant_language: selection.dominant_language.map(|l| l.name().to_string()),
            has_tests: selection.has_tests,
            has_readme: selection.has_readme,
        })
    }

    async fn analyze_files(
        &self,
        current: &Generation,
    ) -> std::result::Result<StageOutput, StageFailure> {
        let max_file_bytes =
            usize::try_from(self.settings.selection.max_file_bytes).unwrap_or(usize::MAX);
        let mut excerpts = Vec::with_capacity(current.selected_files.len());
        let mut metrics = Vec::with_capacity(current.selected_files.len());
        let mut skipped = Vec::new();

        for file in &current.selected_files {
            let fetched = self
                .settings
                .retry
                .for_call(CallKind::Content)
                .run(
                    |_| self.content.fetch_file(&current.repo, &file.path),
                    self.retry_hook(current.id, GenerationStatus::Analyzing),
                )
                .await;
            let text = match fetched {
                Ok(text) => text,
                Err(RetryFailure {
                    error: CollaboratorError::FileNotFound(_),
                    ..
                }) => {
                    tracing::warn!(
                        generation_id = %current.id,
                        path = %file.path,
                        "selected file vanished; skipping"
                    );
                    skipped.push(file.path.clone());
                    continue;
                }
                Err(failure) => {
                    return Err(StageFailure::from_retry(
                        failure,
                        &format!("fetching {}", file.path),
                    ))
                }
            };
            if text.trim().is_empty() {
                skipped.push(file.path.clone());
                continue;
            }

            let (content, truncated) = truncate_to_boundary(&text, max_file_bytes);
            let language = Language::from_name(&file.language);
            metrics.push(analyze(&file.path, content, language));
            excerpts.push(SourceExcerpt {
                path: file.path.clone(),
                language: file.language.clone(),
                content: content.to_string(),
                digest: ContentDigest::from_bytes(text.as_bytes()),
                original_bytes: text.len() as u64,
                truncated,
            });
        }

        if excerpts.is_empty() {
            return Err(StageFailure::new(
                FailureKind::NoAnalyzableFiles,
                format!(
                    "none of the {} selected files could be read",
                    current.selected_files.len()
                ),
            ));
        }

        let quality = self.settings.rubric.evaluate(
            &metrics,
            current.listing_has_readme,
            current.listing_has_tests,
        );
        Ok(StageOutput::Analysis(quality.into_report(excerpts, skipped)))
    }

    async fn score(&self, current: &Generation) -> std::result::Result<StageOutput, StageFailure> {
        let report = current
            .analysis
            .as_ref()
            .ok_or_else(|| StageFailure::missing("analysis report"))?;
        let language = current.dominant_language.as_deref();

        let answer = self
            .settings
            .retry
            .for_call(CallKind::Scoring)
            .run(
                |_| self.scorer.score(&report.excerpts, language),
                self.retry_hook(current.id, GenerationStatus::Scoring),
            )
            .await;

        let aggregated = match &answer {
            Ok(qualitative) => aggregate(
                report,
                QualitativeSignal::Available(qualitative),
                &self.settings.weights,
            ),
            Err(failure) => {
                let reason = if failure.exhausted {
                    format!(
                        "qualitative scorer unavailable after {} attempts: {}",
                        failure.attempts, failure.error
                    )
                } else {
                    format!("qualitative scorer unavailable: {}", failure.error)
                };
                METRICS.inc_degraded();
                obs::emit_scoring_degraded(&current.id, &reason);
                aggregate(
                    report,
                    QualitativeSignal::Unavailable(&reason),
                    &self.settings.weights,
                )
            }
        };

        Ok(StageOutput::Score {
            score: aggregated.score,
            breakdown: aggregated.breakdown,
        })
    }

    fn map(&self, current: &Generation) -> std::result::Result<StageOutput, StageFailure> {
        let score = current
            .quality_score
            .ok_or_else(|| StageFailure::missing("quality score"))?;
        let size_kb = current
            .listing
            .as_ref()
            .map_or(0, RepositoryListing::size_kb);
        let record = map_attributes(&MappingInput {
            score,
            language: current.dominant_language.as_deref(),
            size_kb,
            generation_id: current.id,
        })
        .map_err(|err| StageFailure::new(FailureKind::Internal, err.to_string()))?;
        Ok(StageOutput::Attributes(record))
    }

    async fn synthesize(
        &self,
        current: &Generation,
    ) -> std::result::Result<StageOutput, StageFailure> {
        let prompt = &current
            .attributes
            .as_ref()
            .ok_or_else(|| StageFailure::missing("attribute record"))?
            .prompt;
        let image = self
            .settings
            .retry
            .for_call(CallKind::Imaging)
            .run(
                |_| self.images.synthesize(prompt),
                self.retry_hook(current.id, GenerationStatus::Imaging),
            )
            .await
            .map_err(|f| StageFailure::from_retry(f, "image synthesis"))?;
        Ok(StageOutput::Image(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_failures_are_classified() {
        let exhausted = StageFailure::from_retry(
            RetryFailure {
                error: CollaboratorError::Transient("503".into()),
                attempts: 3,
                exhausted: true,
            },
            "listing",
        );
        assert_eq!(exhausted.kind, FailureKind::RetriesExhausted);
        assert!(exhausted.message.contains("3 attempts"));

        let permanent = StageFailure::from_retry(
            RetryFailure {
                error: CollaboratorError::Permanent("401 bad credentials".into()),
                attempts: 1,
                exhausted: false,
            },
            "listing",
        );
        assert_eq!(permanent.kind, FailureKind::PermanentCollaborator);
        assert!(permanent.message.contains("bad credentials"));

        let missing = StageFailure::from_retry(
            RetryFailure {
                error: CollaboratorError::RepoNotFound("octo/ghost".into()),
                attempts: 1,
                exhausted: false,
            },
            "listing",
        );
        assert_eq!(missing.kind, FailureKind::RepoNotFound);
    }

    #[test]
    fn outputs_fill_their_field_group() {
        let mut generation = Generation::new(RepoRef::new("octo", "cat"));
        StageOutput::Selection {
            files: Vec::new(),
            dominant_language: Some("Go".into()),
            has_tests: true,
            has_readme: false,
        }
        .apply(&mut generation);
        assert_eq!(generation.dominant_language.as_deref(), Some("Go"));
        assert!(generation.listing_has_tests);
        assert!(!generation.listing_has_readme);

        StageOutput::Score {
            score: 7.5,
            breakdown: QualityBreakdown::default(),
        }
        .apply(&mut generation);
        assert_eq!(generation.quality_score, Some(7.5));
        assert!(generation.attributes.is_none());
    }
}
