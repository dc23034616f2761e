//! Persisted generation model
//!
//! A [`Generation`] is the single externally visible entity of the pipeline.
//! It is created in [`GenerationStatus::Pending`] and advanced one stage at a
//! time by the orchestrator; every stage writes exactly one field group.
//!
//! The status always names the most recent stage whose output has been
//! persisted, so a record in `Analyzing` has its analysis report stored and
//! will resume at `Scoring`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage_traits::ContentDigest;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Opaque, immutable identifier of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationId(pub Uuid);

impl GenerationId {
    /// Generate a new random id.
    pub fn new() -> Self {
        GenerationId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for GenerationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GenerationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(GenerationId(Uuid::parse_str(s)?))
    }
}

/// Source repository a generation analyzes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    pub url: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        let owner = owner.into();
        let name = name.into();
        let url = format!("https://github.com/{owner}/{name}");
        Self { owner, name, url }
    }

    /// `owner/name` slug.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ---------------------------------------------------------------------------
// Status machine
// ---------------------------------------------------------------------------

/// Lifecycle status of a generation.
///
/// ```text
/// pending → fetching → selecting → analyzing → scoring → mapping → imaging → completed
///     \________\___________\___________\__________\_________\_________\──→ failed | cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Pending,
    Fetching,
    Selecting,
    Analyzing,
    Scoring,
    Mapping,
    Imaging,
    Completed,
    Failed,
    Cancelled,
}

impl GenerationStatus {
    /// The forward path, in order.
    pub const PIPELINE: [GenerationStatus; 8] = [
        GenerationStatus::Pending,
        GenerationStatus::Fetching,
        GenerationStatus::Selecting,
        GenerationStatus::Analyzing,
        GenerationStatus::Scoring,
        GenerationStatus::Mapping,
        GenerationStatus::Imaging,
        GenerationStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Pending => "pending",
            GenerationStatus::Fetching => "fetching",
            GenerationStatus::Selecting => "selecting",
            GenerationStatus::Analyzing => "analyzing",
            GenerationStatus::Scoring => "scoring",
            GenerationStatus::Mapping => "mapping",
            GenerationStatus::Imaging => "imaging",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
            GenerationStatus::Cancelled => "cancelled",
        }
    }

    /// The next stage on the forward path, or `None` for terminal states.
    pub fn next(&self) -> Option<GenerationStatus> {
        match self {
            GenerationStatus::Pending => Some(GenerationStatus::Fetching),
            GenerationStatus::Fetching => Some(GenerationStatus::Selecting),
            GenerationStatus::Selecting => Some(GenerationStatus::Analyzing),
            GenerationStatus::Analyzing => Some(GenerationStatus::Scoring),
            GenerationStatus::Scoring => Some(GenerationStatus::Mapping),
            GenerationStatus::Mapping => Some(GenerationStatus::Imaging),
            GenerationStatus::Imaging => Some(GenerationStatus::Completed),
            GenerationStatus::Completed
            | GenerationStatus::Failed
            | GenerationStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GenerationStatus::Completed | GenerationStatus::Failed | GenerationStatus::Cancelled
        )
    }

    /// Whether `to` is reachable from `self` in a single step.
    ///
    /// Only the next sequential stage, `failed` or `cancelled` are reachable
    /// from a non-terminal state. Terminal states reach nothing.
    pub fn can_transition_to(&self, to: GenerationStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            GenerationStatus::Failed | GenerationStatus::Cancelled => true,
            other => self.next() == Some(other),
        }
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s {
            "pending" => GenerationStatus::Pending,
            "fetching" => GenerationStatus::Fetching,
            "selecting" => GenerationStatus::Selecting,
            "analyzing" => GenerationStatus::Analyzing,
            "scoring" => GenerationStatus::Scoring,
            "mapping" => GenerationStatus::Mapping,
            "imaging" => GenerationStatus::Imaging,
            "completed" => GenerationStatus::Completed,
            "failed" => GenerationStatus::Failed,
            "cancelled" => GenerationStatus::Cancelled,
            other => return Err(format!("unknown generation status: {other}")),
        };
        Ok(status)
    }
}

/// Coarse view used by pollers to decide whether to keep polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Processing,
    Completed,
    Failed,
    Cancelled,
}

/// One persisted status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: GenerationStatus,
    pub to: GenerationStatus,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Stage outputs
// ---------------------------------------------------------------------------

/// Repository metadata reported by the content provider.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub name: String,
    pub owner: String,
    /// Repository size in KB, when the provider knows it.
    pub size_kb: Option<u64>,
    pub stars: Option<u64>,
    pub primary_language: Option<String>,
    pub description: Option<String>,
}

/// One `(path, size)` entry of a repository listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

/// Output of the fetching stage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RepositoryListing {
    pub info: RepositoryInfo,
    pub files: Vec<FileEntry>,
}

impl RepositoryListing {
    /// Sum of all listed file sizes, in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.files
            .iter()
            .fold(0u64, |total, f| total.saturating_add(f.size))
    }

    /// Repository size in KB: the provider's figure if known, else derived
    /// from the listing.
    pub fn size_kb(&self) -> u64 {
        self.info
            .size_kb
            .unwrap_or_else(|| self.total_bytes().div_ceil(1024))
    }
}

/// Selection priority classes, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    Documentation,
    EntryPoint,
    CoreSource,
    Test,
    BuildConfig,
    OtherSource,
}

impl PriorityClass {
    pub const ALL: [PriorityClass; 6] = [
        PriorityClass::Documentation,
        PriorityClass::EntryPoint,
        PriorityClass::CoreSource,
        PriorityClass::Test,
        PriorityClass::BuildConfig,
        PriorityClass::OtherSource,
    ];

    /// 1-based rank; lower is more important.
    pub fn rank(&self) -> u8 {
        match self {
            PriorityClass::Documentation => 1,
            PriorityClass::EntryPoint => 2,
            PriorityClass::CoreSource => 3,
            PriorityClass::Test => 4,
            PriorityClass::BuildConfig => 5,
            PriorityClass::OtherSource => 6,
        }
    }
}

/// A file chosen by the selection engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedFile {
    pub path: String,
    pub language: String,
    pub size: u64,
    pub class: PriorityClass,
}

/// Fetched (and possibly truncated) text of a selected file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceExcerpt {
    pub path: String,
    pub language: String,
    pub content: String,
    /// Digest of the full fetched text, before truncation.
    pub digest: ContentDigest,
    pub original_bytes: u64,
    pub truncated: bool,
}

/// Per-file heuristic summary kept on the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetricsSummary {
    pub path: String,
    pub language: String,
    pub line_count: u64,
    pub max_depth: u32,
    pub naming_score: Option<f64>,
    pub unanalyzable: bool,
}

/// One rubric criterion's computed value and declared maximum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub name: String,
    pub value: f64,
    pub max: f64,
}

/// Output of the analyzing stage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub excerpts: Vec<SourceExcerpt>,
    pub files: Vec<FileMetricsSummary>,
    pub criteria: Vec<CriterionScore>,
    /// Sum of criterion values, in `[0, ceiling]`.
    pub total: f64,
    pub ceiling: f64,
    /// Selected paths the provider no longer had, or that were empty.
    pub skipped: Vec<String>,
}

/// Auditable breakdown of the final quality score.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityBreakdown {
    /// Rubric sub-scores keyed by criterion name.
    pub sub_scores: BTreeMap<String, CriterionScore>,
    pub heuristic_total: f64,
    pub heuristic_ceiling: f64,
    /// Heuristic total rescaled to `[0, 10]`.
    pub heuristic_normalized: f64,
    /// Qualitative score rescaled to `[0, 10]`, if the scorer answered.
    pub qualitative_normalized: Option<f64>,
    pub heuristic_weight: f64,
    pub qualitative_weight: f64,
    pub commentary: Option<String>,
    pub degraded: bool,
    pub degradation_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Attribute record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Small,
    Medium,
    Large,
    VeryLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBand {
    Legit,
    Decent,
    Spaghetti,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeClass {
    Senior,
    Adult,
    Kitten,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Happy,
    Neutral,
    Grumpy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoatClass {
    Groomed,
    Tidy,
    Scruffy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Breed {
    Tabby,
    Siamese,
    Persian,
    MaineCoon,
    ScottishFold,
    BritishShorthair,
    Ragdoll,
    DomesticShorthair,
}

/// Structured input for the image synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePrompt {
    pub text: String,
    pub width: u32,
    pub height: u32,
    pub seed: u64,
}

/// Closed set of visual traits derived from the quality score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub size: SizeClass,
    pub quality_band: QualityBand,
    pub age: AgeClass,
    pub expression: Expression,
    pub coat: CoatClass,
    pub breed: Breed,
    pub accessory: String,
    pub pose: String,
    pub background: String,
    pub language: Option<String>,
    pub beauty_score: f64,
    pub narrative_seed: String,
    pub prompt: ImagePrompt,
}

/// Reference to a synthesized image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub provider: String,
    pub model: Option<String>,
}

// ---------------------------------------------------------------------------
// Failure
// ---------------------------------------------------------------------------

/// Classification attached to a failed generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RepoNotFound,
    NoAnalyzableFiles,
    PermanentCollaborator,
    RetriesExhausted,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::RepoNotFound => "repo_not_found",
            FailureKind::NoAnalyzableFiles => "no_analyzable_files",
            FailureKind::PermanentCollaborator => "permanent_collaborator",
            FailureKind::RetriesExhausted => "retries_exhausted",
            FailureKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationFailure {
    pub kind: FailureKind,
    /// Human-readable reason, returned to users verbatim.
    pub message: String,
    /// The stage that was being attempted.
    pub stage: GenerationStatus,
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// The unit of work and the only externally visible entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub id: GenerationId,
    pub repo: RepoRef,
    pub status: GenerationStatus,
    /// Optimistic-concurrency counter, bumped by every store write.
    pub revision: u64,
    pub cancel_requested: bool,

    // fetching
    pub listing: Option<RepositoryListing>,
    // selecting
    pub dominant_language: Option<String>,
    pub selected_files: Vec<SelectedFile>,
    pub listing_has_tests: bool,
    /// A project README survived the selection exclusions.
    #[serde(default)]
    pub listing_has_readme: bool,
    // analyzing
    pub analysis: Option<AnalysisReport>,
    // scoring
    pub quality_score: Option<f64>,
    pub quality_breakdown: Option<QualityBreakdown>,
    // mapping
    pub attributes: Option<AttributeRecord>,
    // imaging
    pub image: Option<ImageRef>,

    pub failure: Option<GenerationFailure>,
    pub transitions: Vec<StageTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Generation {
    /// Create a new record in `pending`.
    pub fn new(repo: RepoRef) -> Self {
        let now = Utc::now();
        Self {
            id: GenerationId::new(),
            repo,
            status: GenerationStatus::Pending,
            revision: 0,
            cancel_requested: false,
            listing: None,
            dominant_language: None,
            selected_files: Vec::new(),
            listing_has_tests: false,
            listing_has_readme: false,
            analysis: None,
            quality_score: None,
            quality_breakdown: None,
            attributes: None,
            image: None,
            failure: None,
            transitions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn poll_state(&self) -> PollState {
        match self.status {
            GenerationStatus::Completed => PollState::Completed,
            GenerationStatus::Failed => PollState::Failed,
            GenerationStatus::Cancelled => PollState::Cancelled,
            _ => PollState::Processing,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `to`, recording the transition.
    ///
    /// Does not check legality; stores reject illegal transitions on write.
    pub fn record_transition(&mut self, to: GenerationStatus) {
        let at = Utc::now();
        self.transitions.push(StageTransition {
            from: self.status,
            to,
            at,
        });
        self.status = to;
        self.updated_at = at;
    }

    /// Move to `failed` with a classification.
    pub fn record_failure(&mut self, kind: FailureKind, message: impl Into<String>) {
        let stage = self.status.next().unwrap_or(self.status);
        self.failure = Some(GenerationFailure {
            kind,
            message: message.into(),
            stage,
        });
        self.record_transition(GenerationStatus::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_path_is_strictly_sequential() {
        for pair in GenerationStatus::PIPELINE.windows(2) {
            assert_eq!(pair[0].next(), Some(pair[1]));
            assert!(pair[0].can_transition_to(pair[1]));
        }
    }

    #[test]
    fn no_stage_can_be_skipped_or_revisited() {
        for (i, from) in GenerationStatus::PIPELINE.iter().enumerate() {
            for (j, to) in GenerationStatus::PIPELINE.iter().enumerate() {
                let allowed = from.can_transition_to(*to);
                assert_eq!(allowed, j == i + 1, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn failure_and_cancel_reachable_from_non_terminal_only() {
        for status in GenerationStatus::PIPELINE {
            let expected = !status.is_terminal();
            assert_eq!(status.can_transition_to(GenerationStatus::Failed), expected);
            assert_eq!(
                status.can_transition_to(GenerationStatus::Cancelled),
                expected
            );
        }
        assert!(!GenerationStatus::Failed.can_transition_to(GenerationStatus::Cancelled));
        assert!(!GenerationStatus::Cancelled.can_transition_to(GenerationStatus::Failed));
    }

    #[test]
    fn completed_cannot_go_back_to_analyzing() {
        assert!(!GenerationStatus::Completed.can_transition_to(GenerationStatus::Analyzing));
    }

    #[test]
    fn status_string_round_trip() {
        for status in GenerationStatus::PIPELINE
            .into_iter()
            .chain([GenerationStatus::Failed, GenerationStatus::Cancelled])
        {
            assert_eq!(status.as_str().parse::<GenerationStatus>(), Ok(status));
        }
        assert!("exploded".parse::<GenerationStatus>().is_err());
    }

    #[test]
    fn record_failure_names_the_attempted_stage() {
        let mut generation = Generation::new(RepoRef::new("octo", "cat"));
        generation.record_transition(GenerationStatus::Fetching);
        generation.record_failure(FailureKind::NoAnalyzableFiles, "nothing to read");

        let failure = generation.failure.as_ref().expect("failure set");
        assert_eq!(failure.stage, GenerationStatus::Selecting);
        assert_eq!(generation.status, GenerationStatus::Failed);
        assert_eq!(generation.poll_state(), PollState::Failed);
        assert_eq!(generation.transitions.len(), 2);
    }

    #[test]
    fn listing_size_falls_back_to_byte_total() {
        let listing = RepositoryListing {
            info: RepositoryInfo::default(),
            files: vec![FileEntry::new("a.rs", 1500), FileEntry::new("b.rs", 600)],
        };
        assert_eq!(listing.size_kb(), 3);

        let declared = RepositoryListing {
            info: RepositoryInfo {
                size_kb: Some(42),
                ..RepositoryInfo::default()
            },
            files: Vec::new(),
        };
        assert_eq!(declared.size_kb(), 42);
    }

    #[test]
    fn listing_total_saturates_on_huge_sizes() {
        let listing = RepositoryListing {
            info: RepositoryInfo::default(),
            files: vec![FileEntry::new("a.rs", u64::MAX), FileEntry::new("b.rs", 2)],
        };
        assert_eq!(listing.total_bytes(), u64::MAX);
        assert_eq!(listing.size_kb(), u64::MAX.div_ceil(1024));
    }
}
