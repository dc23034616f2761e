//! End-to-end generation flows over the in-memory store and scripted
//! collaborators.

use std::sync::Arc;
use std::time::Duration;

use codecat_core::collaborators::{ContentProvider, ImageSynthesizer, QualitativeScorer};
use codecat_core::fakes::{ScriptedContentProvider, ScriptedImageSynthesizer, ScriptedScorer};
use codecat_core::{
    CodecatError, CollaboratorError, Generation, GenerationId, GenerationStatus, GenerationStore,
    Orchestrator, PipelineConfig, RepoRef, RetryPolicy, Settings,
};
use codecat_state::fakes::MemoryGenerationStore;
use codecat_state::{FailureKind, QualityBand, StorageError};

const TIDY_LIB: &str = r#"//! Small, well documented helpers.

/// Add two numbers.
pub fn add(a: i32, b: i32) -> i32 {
    a + b
}

/// Subtract `b` from `a`.
pub fn subtract(a: i32, b: i32) -> i32 {
    a - b
}

/// Double a number.
pub fn double(value: i32) -> i32 {
    add(value, value)
}
"#;

const TIDY_MAIN: &str = r#"//! Entry point.

use tidy::add;

/// Print a sum.
fn main() {
    println!("{}", add(1, 2));
}
"#;

const TIDY_TEST: &str = r#"use tidy::double;

#[test]
fn doubles() {
    assert_eq!(double(2), 4);
}
"#;

fn tangled_main() -> String {
    let mut body = String::from("fn DoEverything(x: i32) -> i32 {\n    let mut total = 0;\n");
    for i in 0..60 {
        body.push_str(&format!(
            "    if x > {i} {{ if x % 2 == 0 {{ while total < {i} {{ if total % 3 == 0 {{ for _k in 0..x {{ if x > 1 && total > 0 || x < 0 {{ total += {i}; }} }} }} total += 1; }} }} }}\n"
        ));
    }
    body.push_str("    total\n}\n");
    body
}

fn tidy_repo() -> ScriptedContentProvider {
    ScriptedContentProvider::new()
        .with_file("README.md", "# tidy\n\nSmall arithmetic helpers.\n")
        .with_file("Cargo.toml", "[package]\nname = \"tidy\"\n")
        .with_file("src/lib.rs", TIDY_LIB)
        .with_file("src/main.rs", TIDY_MAIN)
        .with_file("tests/smoke.rs", TIDY_TEST)
}

fn fast_settings() -> Arc<Settings> {
    let config = PipelineConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            call_timeout_ms: 600_000,
            scoring_timeout_ms: 600_000,
            imaging_timeout_ms: 600_000,
        },
        ..PipelineConfig::default()
    };
    Arc::new(config.validate().expect("valid config"))
}

struct Harness {
    store: Arc<MemoryGenerationStore>,
    content: Arc<ScriptedContentProvider>,
    scorer: Arc<ScriptedScorer>,
    images: Arc<ScriptedImageSynthesizer>,
    orchestrator: Orchestrator,
}

impl Harness {
    fn new(content: ScriptedContentProvider, scorer: ScriptedScorer) -> Self {
        Self::with_store(Arc::new(MemoryGenerationStore::new()), content, scorer)
    }

    fn with_store(
        store: Arc<MemoryGenerationStore>,
        content: ScriptedContentProvider,
        scorer: ScriptedScorer,
    ) -> Self {
        Self::assemble(store, Arc::new(content), scorer)
    }

    fn assemble(
        store: Arc<MemoryGenerationStore>,
        content: Arc<ScriptedContentProvider>,
        scorer: ScriptedScorer,
    ) -> Self {
        let scorer = Arc::new(scorer);
        let images = Arc::new(ScriptedImageSynthesizer::new());
        let orchestrator = Orchestrator::new(
            store.clone() as Arc<dyn GenerationStore>,
            content.clone() as Arc<dyn ContentProvider>,
            scorer.clone() as Arc<dyn QualitativeScorer>,
            images.clone() as Arc<dyn ImageSynthesizer>,
            fast_settings(),
        );
        Self {
            store,
            content,
            scorer,
            images,
            orchestrator,
        }
    }

    async fn run(&self, owner: &str, name: &str) -> Generation {
        let id = self
            .orchestrator
            .create_generation(RepoRef::new(owner, name))
            .await
            .expect("create");
        self.orchestrator
            .run_to_completion(id)
            .await
            .expect("drive")
    }
}

/// Wait until the scorer has been entered, i.e. the analysis is persisted
/// and the scoring call is in flight.
async fn wait_for_scoring_call(scorer: &ScriptedScorer) {
    for _ in 0..1_000 {
        if scorer.calls() > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("scorer was never called");
}

const BARE_LIB: &str = "pub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n";

fn documentation_value(generation: &Generation) -> f64 {
    generation
        .analysis
        .as_ref()
        .expect("analysis")
        .criteria
        .iter()
        .find(|c| c.name == "documentation")
        .expect("documentation criterion")
        .value
}

#[tokio::test(start_paused = true)]
async fn vendored_readme_earns_no_documentation_credit() {
    let vendored = ScriptedContentProvider::new()
        .with_file("src/lib.rs", BARE_LIB)
        .with_file("vendor/github.com/x/y/README.md", "# someone else's crate\n");
    let h = Harness::new(vendored, ScriptedScorer::returning(5.0));
    let generation = h.run("octo", "vendored").await;

    assert_eq!(generation.status, GenerationStatus::Completed);
    assert!(!generation.listing_has_readme);
    assert_eq!(documentation_value(&generation), 0.0);

    let own = ScriptedContentProvider::new()
        .with_file("src/lib.rs", BARE_LIB)
        .with_file("README.md", "# adder\n");
    let h = Harness::new(own, ScriptedScorer::returning(5.0));
    let generation = h.run("octo", "adder").await;

    assert!(generation.listing_has_readme);
    assert_eq!(documentation_value(&generation), 1.0);
}

#[tokio::test(start_paused = true)]
async fn tidy_repository_reaches_the_legit_band() {
    let h = Harness::new(tidy_repo(), ScriptedScorer::returning(9.0));
    let generation = h.run("octo", "tidy").await;

    assert_eq!(generation.status, GenerationStatus::Completed);
    assert_eq!(generation.dominant_language.as_deref(), Some("Rust"));
    assert!(generation.listing_has_tests);
    assert_eq!(generation.selected_files[0].path, "README.md");

    let score = generation.quality_score.expect("score");
    assert!(score >= 8.0, "score {score}");
    let breakdown = generation.quality_breakdown.as_ref().expect("breakdown");
    assert!(!breakdown.degraded);
    assert_eq!(breakdown.qualitative_normalized, Some(9.0));

    let attributes = generation.attributes.as_ref().expect("attributes");
    assert_eq!(attributes.quality_band, QualityBand::Legit);
    assert_eq!(attributes.language.as_deref(), Some("Rust"));

    let image = generation.image.as_ref().expect("image");
    assert_eq!(h.images.prompts(), vec![attributes.prompt.clone()]);
    assert!(image.url.starts_with("memory://images/"));

    let path: Vec<GenerationStatus> = generation.transitions.iter().map(|t| t.to).collect();
    assert_eq!(path, GenerationStatus::PIPELINE[1..].to_vec());
}

#[tokio::test(start_paused = true)]
async fn tangled_repository_lands_in_the_spaghetti_band() {
    let content = ScriptedContentProvider::new().with_file("main.rs", tangled_main());
    let h = Harness::new(content, ScriptedScorer::returning(2.0));
    let generation = h.run("octo", "tangle").await;

    assert_eq!(generation.status, GenerationStatus::Completed);
    let score = generation.quality_score.expect("score");
    assert!(score < 6.0, "score {score}");

    let report = generation.analysis.as_ref().expect("analysis");
    assert!(report.files[0].max_depth >= 5);
    assert_eq!(
        generation.attributes.expect("attributes").quality_band,
        QualityBand::Spaghetti
    );
}

#[tokio::test(start_paused = true)]
async fn unavailable_scorer_degrades_to_heuristics() {
    let scorer = ScriptedScorer::returning(9.0)
        .then_fail(CollaboratorError::Permanent("401 invalid api key".into()));
    let h = Harness::new(tidy_repo(), scorer);
    let generation = h.run("octo", "tidy").await;

    assert_eq!(generation.status, GenerationStatus::Completed);
    assert_eq!(h.scorer.calls(), 1);
    let breakdown = generation.quality_breakdown.expect("breakdown");
    assert!(breakdown.degraded);
    assert!(breakdown
        .degradation_reason
        .as_deref()
        .is_some_and(|r| r.contains("invalid api key")));
    assert_eq!(breakdown.qualitative_normalized, None);
    let expected = (breakdown.heuristic_normalized * 10.0).round() / 10.0;
    assert_eq!(generation.quality_score, Some(expected));
}

#[tokio::test(start_paused = true)]
async fn identical_content_scores_identically() {
    let h = Harness::new(tidy_repo(), ScriptedScorer::returning(7.0));
    let first = h.run("octo", "tidy").await;
    let second = h.run("octo", "tidy").await;

    assert_ne!(first.id, second.id);
    assert_eq!(first.quality_score, second.quality_score);
    assert_eq!(
        first.analysis.as_ref().map(|a| a.total),
        second.analysis.as_ref().map(|a| a.total)
    );
    let (a, b) = (first.attributes.unwrap(), second.attributes.unwrap());
    assert_eq!(a.quality_band, b.quality_band);
    assert_eq!(a.breed, b.breed);
}

#[tokio::test(start_paused = true)]
async fn transient_listing_failures_are_retried_with_backoff() {
    let content = tidy_repo()
        .fail_listing_with(CollaboratorError::Transient("502 bad gateway".into()))
        .fail_listing_with(CollaboratorError::Transient("503 unavailable".into()));
    let h = Harness::new(content, ScriptedScorer::returning(8.0));

    let started = tokio::time::Instant::now();
    let generation = h.run("octo", "tidy").await;

    assert_eq!(generation.status, GenerationStatus::Completed);
    assert_eq!(h.content.list_calls(), 3);
    assert!(started.elapsed() >= Duration::from_millis(1_500));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_the_generation() {
    let content = tidy_repo()
        .fail_listing_with(CollaboratorError::Transient("timeout".into()))
        .fail_listing_with(CollaboratorError::Transient("timeout".into()))
        .fail_listing_with(CollaboratorError::Transient("timeout".into()));
    let h = Harness::new(content, ScriptedScorer::returning(8.0));
    let generation = h.run("octo", "tidy").await;

    assert_eq!(generation.status, GenerationStatus::Failed);
    let failure = generation.failure.expect("failure");
    assert_eq!(failure.kind, FailureKind::RetriesExhausted);
    assert_eq!(failure.stage, GenerationStatus::Fetching);
    assert_eq!(h.content.list_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn missing_repository_fails_without_retry() {
    let content = ScriptedContentProvider::new()
        .fail_listing_with(CollaboratorError::RepoNotFound("octo/ghost".into()));
    let h = Harness::new(content, ScriptedScorer::returning(8.0));
    let generation = h.run("octo", "ghost").await;

    assert_eq!(generation.status, GenerationStatus::Failed);
    assert_eq!(
        generation.failure.map(|f| f.kind),
        Some(FailureKind::RepoNotFound)
    );
    assert_eq!(h.content.list_calls(), 1);
    assert!(generation.listing.is_none());
}

#[tokio::test(start_paused = true)]
async fn binary_only_repository_has_nothing_to_analyze() {
    let content = ScriptedContentProvider::new()
        .with_file("assets/logo.png", "\u{89}PNG")
        .with_file("fonts/mono.woff", "wOFF");
    let h = Harness::new(content, ScriptedScorer::returning(8.0));
    let generation = h.run("octo", "assets").await;

    assert_eq!(generation.status, GenerationStatus::Failed);
    let failure = generation.failure.expect("failure");
    assert_eq!(failure.kind, FailureKind::NoAnalyzableFiles);
    assert_eq!(failure.stage, GenerationStatus::Selecting);
    assert_eq!(h.scorer.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn vanished_files_are_skipped() {
    let content = ScriptedContentProvider::new()
        .with_file("src/lib.rs", TIDY_LIB)
        .with_missing_file("src/util.rs", 300);
    let h = Harness::new(content, ScriptedScorer::returning(8.0));
    let generation = h.run("octo", "partial").await;

    assert_eq!(generation.status, GenerationStatus::Completed);
    let report = generation.analysis.expect("analysis");
    assert_eq!(report.skipped, vec!["src/util.rs".to_string()]);
    assert_eq!(report.excerpts.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn resumed_generation_does_not_repeat_persisted_stages() {
    let store = Arc::new(MemoryGenerationStore::new());
    let content = Arc::new(tidy_repo());

    let first = Harness::assemble(
        store.clone(),
        content.clone(),
        ScriptedScorer::returning(9.0).with_delay(Duration::from_secs(60)),
    );
    let id = first
        .orchestrator
        .create_generation(RepoRef::new("octo", "tidy"))
        .await
        .expect("create");
    let orchestrator = first.orchestrator.clone();
    let driver = tokio::spawn(async move { orchestrator.run_to_completion(id).await });

    wait_for_scoring_call(&first.scorer).await;
    assert_eq!(
        store.get(&id).await.expect("get").status,
        GenerationStatus::Analyzing
    );
    driver.abort();
    assert!(driver.await.is_err());

    let fetched_before = content.fetch_calls();
    assert_eq!(content.list_calls(), 1);

    let second = Harness::assemble(store.clone(), content.clone(), ScriptedScorer::returning(9.0));
    let generation = second
        .orchestrator
        .run_to_completion(id)
        .await
        .expect("resume");

    assert_eq!(generation.status, GenerationStatus::Completed);
    assert_eq!(content.list_calls(), 1);
    assert_eq!(content.fetch_calls(), fetched_before);
    assert_eq!(second.scorer.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn resume_unfinished_picks_up_pending_records() {
    let h = Harness::new(tidy_repo(), ScriptedScorer::returning(8.0));
    let id = h
        .orchestrator
        .create_generation(RepoRef::new("octo", "tidy"))
        .await
        .expect("create");

    let resumed = h.orchestrator.resume_unfinished().await.expect("resume");
    assert_eq!(resumed, vec![id]);

    let generation = h
        .orchestrator
        .wait_for_terminal(&id, Duration::from_millis(50), Duration::from_secs(60))
        .await
        .expect("terminal");
    assert_eq!(generation.status, GenerationStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn cancellation_discards_in_flight_results() {
    let h = Harness::new(
        tidy_repo(),
        ScriptedScorer::returning(9.0).with_delay(Duration::from_secs(10)),
    );
    let id = h
        .orchestrator
        .create_generation(RepoRef::new("octo", "tidy"))
        .await
        .expect("create");
    let orchestrator = h.orchestrator.clone();
    let driver = tokio::spawn(async move { orchestrator.run_to_completion(id).await });

    wait_for_scoring_call(&h.scorer).await;
    let flagged = h.orchestrator.cancel_generation(&id).await.expect("cancel");
    assert!(flagged.cancel_requested);

    let generation = driver.await.expect("join").expect("drive");
    assert_eq!(generation.status, GenerationStatus::Cancelled);
    assert_eq!(h.scorer.calls(), 1);
    assert!(generation.quality_score.is_none());
    assert_eq!(h.images.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelling_an_idle_record_closes_it_immediately() {
    let h = Harness::new(tidy_repo(), ScriptedScorer::returning(8.0));
    let id = h
        .orchestrator
        .create_generation(RepoRef::new("octo", "tidy"))
        .await
        .expect("create");

    let generation = h.orchestrator.cancel_generation(&id).await.expect("cancel");
    assert_eq!(generation.status, GenerationStatus::Cancelled);
    assert_eq!(h.content.list_calls(), 0);

    let again = h.orchestrator.cancel_generation(&id).await.expect("idempotent");
    assert_eq!(again.status, GenerationStatus::Cancelled);
    assert_eq!(again.revision, generation.revision);
}

#[tokio::test(start_paused = true)]
async fn concurrent_generations_are_independent() {
    let h = Harness::new(tidy_repo(), ScriptedScorer::returning(8.0));
    let mut ids = Vec::new();
    for name in ["one", "two", "three"] {
        let url = format!("https://github.com/octo/{name}");
        ids.push(h.orchestrator.start_generation(&url).await.expect("start"));
    }

    for id in &ids {
        let generation = h
            .orchestrator
            .wait_for_terminal(id, Duration::from_millis(20), Duration::from_secs(60))
            .await
            .expect("terminal");
        assert_eq!(generation.status, GenerationStatus::Completed);
    }
    assert_eq!(h.images.calls(), 3);

    let listed = h.orchestrator.list_generations(10).await.expect("list");
    assert_eq!(listed.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn completed_records_cannot_move_backwards() {
    let h = Harness::new(tidy_repo(), ScriptedScorer::returning(8.0));
    let generation = h.run("octo", "tidy").await;
    assert_eq!(generation.status, GenerationStatus::Completed);

    let mut rewind = generation.clone();
    rewind.status = GenerationStatus::Analyzing;
    let err = h
        .store
        .update_stage(generation.revision, &rewind)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Terminal { .. }));

    let again = h
        .orchestrator
        .run_to_completion(generation.id)
        .await
        .expect("rerun");
    assert_eq!(again, generation);
    assert_eq!(h.images.calls(), 1);
}

#[tokio::test]
async fn unknown_ids_and_bad_urls_are_reported() {
    let h = Harness::new(tidy_repo(), ScriptedScorer::returning(8.0));

    let missing = GenerationId::new();
    assert!(matches!(
        h.orchestrator.get_generation(&missing).await,
        Err(CodecatError::NotFound(id)) if id == missing
    ));
    assert!(matches!(
        h.orchestrator.start_generation("https://gitlab.com/octo/cat").await,
        Err(CodecatError::InvalidRepoRef(_))
    ));
    assert!(h.orchestrator.list_generations(10).await.expect("list").is_empty());
}

#[tokio::test(start_paused = true)]
async fn waiting_gives_up_at_the_deadline() {
    let h = Harness::new(tidy_repo(), ScriptedScorer::returning(8.0));
    let id = h
        .orchestrator
        .create_generation(RepoRef::new("octo", "tidy"))
        .await
        .expect("create");

    let err = h
        .orchestrator
        .wait_for_terminal(&id, Duration::from_millis(100), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, CodecatError::WaitTimeout { .. }));
}
