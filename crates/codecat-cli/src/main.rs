//! Codecat CLI
//!
//! The `codecat` command scores a GitHub repository's code quality and turns
//! the result into a generated cat portrait.
//!
//! ## Commands
//!
//! - `generate`: start a generation for a repository URL
//! - `status`: show one generation
//! - `list`: show recent generations
//! - `cancel`: stop a generation before its next stage
//! - `resume`: drive every unfinished generation to a terminal state
//! - `analyze`: offline selection and heuristics over a local directory

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};

use codecat_core::collaborators::{ContentProvider, ImageSynthesizer, QualitativeScorer};
use codecat_core::language::Language;
use codecat_core::metrics::METRICS;
use codecat_core::scoring::QualitativeScore;
use codecat_core::selection::truncate_to_boundary;
use codecat_core::{
    aggregate, analyze, quality_band, select_files, CallKind, CollaboratorError, Generation,
    GenerationId, GenerationStore, Orchestrator, PipelineConfig, QualitativeSignal, Settings,
};
use codecat_providers::{
    GitHubConfig, GitHubContentProvider, LocalContentProvider, OpenRouterConfig, OpenRouterScorer,
    ProviderError, TogetherConfig, TogetherImageSynthesizer,
};
use codecat_state::{
    ImagePrompt, ImageRef, RepoRef, RepositoryListing, SourceExcerpt, SurrealGenerationStore,
};

#[derive(Parser)]
#[command(name = "codecat")]
#[command(author = "Codecat Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Turn a repository's code quality into a cat portrait", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Pipeline configuration file (JSON); CODECAT_* variables still apply
    #[arg(long, global = true, env = "CODECAT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a generation for a GitHub repository
    Generate {
        /// Repository URL, e.g. https://github.com/owner/name
        url: String,

        /// Drive the generation here and wait for a terminal state
        #[arg(short, long)]
        wait: bool,

        /// Poll interval while waiting, in milliseconds
        #[arg(long, default_value = "1000")]
        poll_ms: u64,

        /// Give up waiting after this many seconds
        #[arg(long, default_value = "600")]
        timeout_secs: u64,

        /// Write the final record as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Use an in-memory store (implies --wait)
        #[arg(long)]
        ephemeral: bool,
    },

    /// Show a generation
    Status {
        /// Generation ID
        id: String,
    },

    /// List recent generations, newest first
    List {
        /// Maximum number of generations to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Cancel a generation
    Cancel {
        /// Generation ID
        id: String,
    },

    /// Drive every unfinished generation to a terminal state
    Resume {
        /// Give up waiting after this many seconds
        #[arg(long, default_value = "600")]
        timeout_secs: u64,
    },

    /// Select and score a local directory without any network call
    Analyze {
        /// Directory to analyze
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Declared primary language (otherwise inferred from file sizes)
        #[arg(short, long)]
        language: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    codecat_core::telemetry::init_tracing(cli.json, level);

    let settings = Arc::new(load_settings(cli.config.as_deref())?);

    let outcome = match cli.command {
        Commands::Generate {
            url,
            wait,
            poll_ms,
            timeout_secs,
            output,
            ephemeral,
        } => {
            let store = open_store(ephemeral).await?;
            let orchestrator = online_orchestrator(store, settings)?;
            let wait = WaitOptions {
                enabled: wait || ephemeral,
                poll: Duration::from_millis(poll_ms.max(10)),
                deadline: Duration::from_secs(timeout_secs),
            };
            cmd_generate(&orchestrator, &url, wait, output.as_deref()).await
        }
        Commands::Status { id } => {
            let orchestrator = offline_orchestrator(open_store(false).await?, settings);
            cmd_status(&orchestrator, &id).await
        }
        Commands::List { limit } => {
            let orchestrator = offline_orchestrator(open_store(false).await?, settings);
            cmd_list(&orchestrator, limit).await
        }
        Commands::Cancel { id } => {
            let orchestrator = offline_orchestrator(open_store(false).await?, settings);
            cmd_cancel(&orchestrator, &id).await
        }
        Commands::Resume { timeout_secs } => {
            let orchestrator = online_orchestrator(open_store(false).await?, settings)?;
            cmd_resume(&orchestrator, Duration::from_secs(timeout_secs)).await
        }
        Commands::Analyze { dir, language } => {
            let report = analyze_directory(&settings, &dir, language.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    };

    METRICS.flush();
    outcome
}

/// Defaults or `--config`, then `CODECAT_*` overrides, then validation.
fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let mut config = match path {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.apply_overrides(|var| std::env::var(var).ok())?;
    Ok(config.validate().context("Invalid pipeline configuration")?)
}

async fn open_store(ephemeral: bool) -> Result<Arc<dyn GenerationStore>> {
    let store = if ephemeral {
        SurrealGenerationStore::in_memory().await
    } else {
        SurrealGenerationStore::from_env().await
    }
    .context("Failed to connect to codecat database")?;
    Ok(Arc::new(store))
}

/// Stand-in for a collaborator whose credentials are missing. Every call
/// fails permanently, so scoring degrades and other stages fail cleanly.
struct Unconfigured(String);

impl Unconfigured {
    fn error(&self) -> CollaboratorError {
        CollaboratorError::Permanent(self.0.clone())
    }
}

#[async_trait]
impl ContentProvider for Unconfigured {
    async fn list_files(&self, _repo: &RepoRef) -> Result<RepositoryListing, CollaboratorError> {
        Err(self.error())
    }

    async fn fetch_file(&self, _repo: &RepoRef, _path: &str) -> Result<String, CollaboratorError> {
        Err(self.error())
    }
}

#[async_trait]
impl QualitativeScorer for Unconfigured {
    async fn score(
        &self,
        _excerpts: &[SourceExcerpt],
        _language: Option<&str>,
    ) -> Result<QualitativeScore, CollaboratorError> {
        Err(self.error())
    }
}

#[async_trait]
impl ImageSynthesizer for Unconfigured {
    async fn synthesize(&self, _prompt: &ImagePrompt) -> Result<ImageRef, CollaboratorError> {
        Err(self.error())
    }
}

/// Orchestrator wired to the hosted collaborators.
fn online_orchestrator(
    store: Arc<dyn GenerationStore>,
    settings: Arc<Settings>,
) -> Result<Orchestrator> {
    let retry = settings.retry;
    let content = GitHubContentProvider::new(
        GitHubConfig::from_env().with_timeout(retry.timeout_for(CallKind::Content)),
    )
    .context("Failed to build GitHub client")?;
    let scorer: Arc<dyn QualitativeScorer> = match OpenRouterConfig::from_env() {
        Ok(config) => Arc::new(
            OpenRouterScorer::new(config.with_timeout(retry.timeout_for(CallKind::Scoring)))
                .context("Failed to build OpenRouter client")?,
        ),
        Err(ProviderError::MissingCredential(var)) => {
            warn!("{var} is not set; scores will use heuristics only");
            Arc::new(Unconfigured(format!("{var} is not set")))
        }
        Err(err) => return Err(err).context("Failed to build OpenRouter client"),
    };
    let images = match TogetherConfig::from_env() {
        Ok(config) => {
            TogetherImageSynthesizer::new(config.with_timeout(retry.timeout_for(CallKind::Imaging)))
                .context("Failed to build Together client")?
        }
        Err(ProviderError::MissingCredential(var)) => {
            bail!("{var} is required to synthesize images")
        }
        Err(err) => return Err(err).context("Failed to build Together client"),
    };
    Ok(Orchestrator::new(
        store,
        Arc::new(content),
        scorer,
        Arc::new(images),
        settings,
    ))
}

/// Orchestrator for commands that only read or cancel records.
fn offline_orchestrator(store: Arc<dyn GenerationStore>, settings: Arc<Settings>) -> Orchestrator {
    let unconfigured = Arc::new(Unconfigured("collaborators are not configured".into()));
    Orchestrator::new(
        store,
        unconfigured.clone(),
        unconfigured.clone(),
        unconfigured,
        settings,
    )
}

fn parse_id(id: &str) -> Result<GenerationId> {
    id.trim()
        .parse()
        .with_context(|| format!("Invalid generation id: {id}"))
}

#[derive(Debug, Clone, Copy)]
struct WaitOptions {
    enabled: bool,
    poll: Duration,
    deadline: Duration,
}

async fn cmd_generate(
    orchestrator: &Orchestrator,
    url: &str,
    wait: WaitOptions,
    output: Option<&Path>,
) -> Result<()> {
    if !wait.enabled {
        let repo = codecat_core::parse_repo_url(url)?;
        let id = orchestrator.create_generation(repo).await?;
        println!("Queued generation {id}");
        println!("Run `codecat resume` to process it, or `codecat status {id}` to check on it.");
        return Ok(());
    }

    let id = orchestrator.start_generation(url).await?;
    println!("Started generation {id}");
    let generation = orchestrator
        .wait_for_terminal(&id, wait.poll, wait.deadline)
        .await?;
    print_generation(&generation);

    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&generation)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

async fn cmd_status(orchestrator: &Orchestrator, id: &str) -> Result<()> {
    let generation = orchestrator.get_generation(&parse_id(id)?).await?;
    print_generation(&generation);
    Ok(())
}

async fn cmd_list(orchestrator: &Orchestrator, limit: usize) -> Result<()> {
    let generations = orchestrator.list_generations(limit).await?;
    if generations.is_empty() {
        println!("No generations yet");
        return Ok(());
    }
    for generation in generations {
        println!("{}", summary_line(&generation));
    }
    Ok(())
}

async fn cmd_cancel(orchestrator: &Orchestrator, id: &str) -> Result<()> {
    let generation = orchestrator.cancel_generation(&parse_id(id)?).await?;
    if generation.is_terminal() {
        println!("Generation {} is {}", generation.id, generation.status);
    } else {
        println!(
            "Cancellation requested for {}; it stops before its next stage",
            generation.id
        );
    }
    Ok(())
}

async fn cmd_resume(orchestrator: &Orchestrator, deadline: Duration) -> Result<()> {
    let ids = orchestrator.resume_unfinished().await?;
    if ids.is_empty() {
        println!("Nothing to resume");
        return Ok(());
    }
    info!(count = ids.len(), "resuming unfinished generations");
    let waits = ids
        .iter()
        .map(|id| orchestrator.wait_for_terminal(id, Duration::from_millis(500), deadline));
    let outcomes = futures::future::join_all(waits).await;
    report_resumed(ids.iter().zip(outcomes))
}

/// Print every resumed generation, then fail if any could not be awaited.
fn report_resumed<'a>(
    outcomes: impl IntoIterator<Item = (&'a GenerationId, codecat_core::Result<Generation>)>,
) -> Result<()> {
    let mut unfinished = Vec::new();
    for (id, outcome) in outcomes {
        match outcome {
            Ok(generation) => println!("{}", summary_line(&generation)),
            Err(err) => {
                warn!(generation_id = %id, error = %err, "resumed generation did not finish");
                println!("{id}  {err}");
                unfinished.push(id.to_string());
            }
        }
    }
    if !unfinished.is_empty() {
        bail!(
            "{} resumed generation(s) did not finish: {}",
            unfinished.len(),
            unfinished.join(", ")
        );
    }
    Ok(())
}

fn summary_line(generation: &Generation) -> String {
    let score = generation
        .quality_score
        .map_or_else(|| "-".to_string(), |s| format!("{s:.1}"));
    format!(
        "{}  {:<10} {:>4}  {}",
        generation.id,
        generation.status,
        score,
        generation.repo.slug()
    )
}

fn print_generation(generation: &Generation) {
    println!("generation {}", generation.id);
    println!("Repository: {}", generation.repo.url);
    println!("Status:     {}", generation.status);
    println!(
        "Created:    {}",
        generation.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(score) = generation.quality_score {
        println!("Score:      {score:.1} / 10");
    }
    if let Some(breakdown) = &generation.quality_breakdown {
        for (name, sub) in &breakdown.sub_scores {
            println!("  {name:<16} {:.2} / {:.0}", sub.value, sub.max);
        }
        if let Some(reason) = &breakdown.degradation_reason {
            println!("  (heuristics only: {reason})");
        }
        if let Some(commentary) = &breakdown.commentary {
            println!();
            println!("    {commentary}");
        }
    }
    if let Some(attributes) = &generation.attributes {
        println!(
            "Cat:        {:?} {:?}, {:?}, {:?} coat, wearing {}",
            attributes.quality_band,
            attributes.breed,
            attributes.expression,
            attributes.coat,
            attributes.accessory
        );
    }
    if let Some(image) = &generation.image {
        println!("Image:      {}", image.url);
    }
    if let Some(failure) = &generation.failure {
        println!(
            "Failed:     {} during {}: {}",
            failure.kind.as_str(),
            failure.stage,
            failure.message
        );
    }
}

/// Local selection and heuristic scoring, rendered as JSON.
async fn analyze_directory(
    settings: &Settings,
    dir: &Path,
    language: Option<&str>,
) -> Result<Value> {
    let mut provider = LocalContentProvider::new(dir);
    if let Some(language) = language {
        provider = provider.with_language(language);
    }
    let repo = provider.repo_ref();
    let listing = provider
        .list_files(&repo)
        .await
        .with_context(|| format!("Failed to list {}", dir.display()))?;
    let selection = select_files(
        &listing.files,
        listing.info.primary_language.as_deref(),
        &settings.selection,
    )?;

    let max_bytes = usize::try_from(settings.selection.max_file_bytes).unwrap_or(usize::MAX);
    let mut metrics = Vec::with_capacity(selection.files.len());
    for file in &selection.files {
        let text = match provider.fetch_file(&repo, &file.path).await {
            Ok(text) => text,
            Err(CollaboratorError::FileNotFound(path)) => {
                warn!(%path, "file disappeared during analysis");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        let (content, _) = truncate_to_boundary(&text, max_bytes);
        metrics.push(analyze(&file.path, content, Language::from_name(&file.language)));
    }

    let quality = settings
        .rubric
        .evaluate(&metrics, selection.has_readme, selection.has_tests);
    let report = quality.into_report(Vec::new(), Vec::new());
    let aggregated = aggregate(
        &report,
        QualitativeSignal::Unavailable("offline analysis"),
        &settings.weights,
    );

    Ok(json!({
        "directory": dir.display().to_string(),
        "dominant_language": selection.dominant_language.map(|l| l.name()),
        "eligible_files": selection.eligible_count,
        "selected": selection.files,
        "files": report.files,
        "criteria": report.criteria,
        "heuristic_total": report.total,
        "ceiling": report.ceiling,
        "score": aggregated.score,
        "quality_band": quality_band(aggregated.score),
    }))
}
