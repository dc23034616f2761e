//! Heuristic scoring rubric.
//!
//! A [`RubricConfig`] is a plain, serde-friendly table of criterion maxima.
//! [`RubricConfig::validate`] turns it into an immutable [`Rubric`], checking
//! once that the maxima sum exactly to the ceiling. After that, evaluation
//! only clamps: each criterion into `[0, max]` and the total into
//! `[0, ceiling]`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use codecat_state::{AnalysisReport, CriterionScore, FileMetricsSummary, SourceExcerpt};
use serde::{Deserialize, Serialize};

use crate::analyzer::FileMetrics;
use crate::error::ConfigError;

const SUM_TOLERANCE: f64 = 1e-9;

/// Comment ratio at which the comment half of documentation is full.
const TARGET_COMMENT_RATIO: f64 = 0.15;

/// Score used when a criterion has nothing to measure.
const NEUTRAL: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Documentation,
    Naming,
    FunctionLength,
    Nesting,
    LineLength,
    Complexity,
    Tests,
}

impl Criterion {
    pub const ALL: [Criterion; 7] = [
        Criterion::Documentation,
        Criterion::Naming,
        Criterion::FunctionLength,
        Criterion::Nesting,
        Criterion::LineLength,
        Criterion::Complexity,
        Criterion::Tests,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::Documentation => "documentation",
            Criterion::Naming => "naming",
            Criterion::FunctionLength => "function_length",
            Criterion::Nesting => "nesting",
            Criterion::LineLength => "line_length",
            Criterion::Complexity => "complexity",
            Criterion::Tests => "tests",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }

    fn default_max(&self) -> f64 {
        match self {
            Criterion::Documentation | Criterion::FunctionLength | Criterion::Nesting => 2.0,
            Criterion::Naming | Criterion::LineLength | Criterion::Complexity | Criterion::Tests => {
                1.0
            }
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Criterion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Criterion::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownCriterion(s.to_string()))
    }
}

/// Unvalidated rubric table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricConfig {
    pub ceiling: f64,
    /// Criterion name to declared maximum.
    pub maxima: BTreeMap<String, f64>,
}

impl Default for RubricConfig {
    fn default() -> Self {
        Self {
            ceiling: 10.0,
            maxima: Criterion::ALL
                .into_iter()
                .map(|c| (c.as_str().to_string(), c.default_max()))
                .collect(),
        }
    }
}

impl RubricConfig {
    /// Check the table and freeze it.
    ///
    /// Rejects a non-positive ceiling, unknown or missing criteria, negative
    /// or non-finite maxima, and maxima that do not sum to the ceiling.
    pub fn validate(&self) -> Result<Rubric, ConfigError> {
        if !self.ceiling.is_finite() || self.ceiling <= 0.0 {
            return Err(ConfigError::NonPositiveCeiling(self.ceiling));
        }

        let mut maxima = [f64::NAN; Criterion::ALL.len()];
        for (name, &max) in &self.maxima {
            let criterion: Criterion = name.parse()?;
            if !max.is_finite() || max < 0.0 {
                return Err(ConfigError::InvalidMaximum {
                    name: name.clone(),
                    max,
                });
            }
            maxima[criterion.index()] = max;
        }
        if let Some(missing) = Criterion::ALL.iter().find(|c| maxima[c.index()].is_nan()) {
            return Err(ConfigError::MissingCriterion(missing.as_str().to_string()));
        }

        let sum: f64 = maxima.iter().sum();
        if (sum - self.ceiling).abs() > SUM_TOLERANCE {
            return Err(ConfigError::RubricCeilingMismatch {
                sum,
                ceiling: self.ceiling,
            });
        }

        Ok(Rubric {
            ceiling: self.ceiling,
            maxima,
        })
    }
}

/// Validated, immutable rubric. Only constructible through
/// [`RubricConfig::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Rubric {
    ceiling: f64,
    maxima: [f64; Criterion::ALL.len()],
}

/// Aggregated heuristic output for one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityMetrics {
    pub files: Vec<FileMetricsSummary>,
    pub sub_scores: Vec<CriterionScore>,
    pub total: f64,
    pub ceiling: f64,
}

impl QualityMetrics {
    pub fn sub_score(&self, criterion: Criterion) -> Option<&CriterionScore> {
        self.sub_scores.iter().find(|s| s.name == criterion.as_str())
    }

    pub fn into_report(self, excerpts: Vec<SourceExcerpt>, skipped: Vec<String>) -> AnalysisReport {
        AnalysisReport {
            excerpts,
            files: self.files,
            criteria: self.sub_scores,
            total: self.total,
            ceiling: self.ceiling,
            skipped,
        }
    }
}

impl Rubric {
    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    pub fn max(&self, criterion: Criterion) -> f64 {
        self.maxima[criterion.index()]
    }

    /// Score a set of analyzed files.
    ///
    /// `has_readme` and `has_tests` describe the whole repository listing,
    /// not only the analyzed subset.
    pub fn evaluate(&self, files: &[FileMetrics], has_readme: bool, has_tests: bool) -> QualityMetrics {
        let code: Vec<&FileMetrics> = files.iter().filter(|f| f.is_code()).collect();
        let has_readme = has_readme || files.iter().any(|f| f.is_documentation && !f.unanalyzable);

        let mut sub_scores = Vec::with_capacity(Criterion::ALL.len());
        let mut total = 0.0;
        for criterion in Criterion::ALL {
            let fraction = match criterion {
                Criterion::Documentation => documentation(&code, has_readme),
                Criterion::Naming => naming(&code),
                Criterion::FunctionLength => function_length(&code),
                Criterion::Nesting => nesting(&code),
                Criterion::LineLength => line_length(&code),
                Criterion::Complexity => complexity(&code),
                Criterion::Tests => {
                    if has_tests || files.iter().any(|f| f.is_test) {
                        1.0
                    } else {
                        0.0
                    }
                }
            };
            let max = self.max(criterion);
            let value = clamp(fraction * max, max);
            total += value;
            sub_scores.push(CriterionScore {
                name: criterion.as_str().to_string(),
                value,
                max,
            });
        }

        QualityMetrics {
            files: files.iter().map(FileMetrics::summary).collect(),
            sub_scores,
            total: clamp(total, self.ceiling),
            ceiling: self.ceiling,
        }
    }
}

fn clamp(value: f64, max: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, max)
    }
}

fn documentation(code: &[&FileMetrics], has_readme: bool) -> f64 {
    let readme = if has_readme { 0.5 } else { 0.0 };
    let non_blank: usize = code.iter().map(|f| f.non_blank_lines).sum();
    if non_blank == 0 {
        return readme;
    }
    let comments: usize = code.iter().map(|f| f.comment_lines).sum();
    let ratio = comments as f64 / non_blank as f64;
    readme + 0.5 * (ratio / TARGET_COMMENT_RATIO).min(1.0)
}

fn naming(code: &[&FileMetrics]) -> f64 {
    let scores: Vec<f64> = code.iter().filter_map(|f| f.naming_score).collect();
    if scores.is_empty() {
        NEUTRAL
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

fn function_length(code: &[&FileMetrics]) -> f64 {
    let lengths: Vec<usize> = code
        .iter()
        .flat_map(|f| f.function_lengths.iter().copied())
        .collect();
    if lengths.is_empty() {
        return NEUTRAL;
    }
    let avg = lengths.iter().sum::<usize>() as f64 / lengths.len() as f64;
    if avg <= 30.0 {
        1.0
    } else if avg <= 50.0 {
        0.5
    } else {
        0.0
    }
}

/// Full marks at mean max-depth 4 or less, nothing at 6 or more.
fn nesting(code: &[&FileMetrics]) -> f64 {
    if code.is_empty() {
        return NEUTRAL;
    }
    let mean = code.iter().map(|f| f64::from(f.max_depth)).sum::<f64>() / code.len() as f64;
    ((6.0 - mean) / 2.0).clamp(0.0, 1.0)
}

fn line_length(code: &[&FileMetrics]) -> f64 {
    let non_blank: usize = code.iter().map(|f| f.non_blank_lines).sum();
    if non_blank == 0 {
        return NEUTRAL;
    }
    let weighted = |value: fn(&FileMetrics) -> f64| {
        code.iter()
            .map(|f| value(f) * f.non_blank_lines as f64)
            .sum::<f64>()
            / non_blank as f64
    };
    let avg = weighted(|f| f.avg_line_length);
    let long_ratio = weighted(|f| f.long_line_ratio);
    if avg < 100.0 && long_ratio <= 0.05 {
        1.0
    } else if avg < 120.0 {
        0.5
    } else {
        0.0
    }
}

fn complexity(code: &[&FileMetrics]) -> f64 {
    let values: Vec<f64> = code.iter().filter_map(|f| f.complexity()).collect();
    if values.is_empty() {
        return NEUTRAL;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean < 5.0 {
        1.0
    } else if mean < 8.0 {
        0.5
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::language::Language;

    fn rubric() -> Rubric {
        RubricConfig::default().validate().unwrap()
    }

    #[test]
    fn default_maxima_sum_to_ceiling() {
        let config = RubricConfig::default();
        let sum: f64 = config.maxima.values().sum();
        assert_eq!(sum, config.ceiling);
        assert_eq!(rubric().ceiling(), 10.0);
    }

    #[test]
    fn maxima_exceeding_ceiling_are_rejected_at_validation() {
        let mut config = RubricConfig::default();
        config.maxima.insert("tests".into(), 2.0);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::RubricCeilingMismatch { sum, .. } if sum == 11.0));
    }

    #[test]
    fn maxima_below_ceiling_are_rejected_too() {
        let mut config = RubricConfig::default();
        config.maxima.insert("naming".into(), 0.5);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RubricCeilingMismatch { .. })
        ));
    }

    #[test]
    fn missing_unknown_and_negative_criteria_are_rejected() {
        let mut missing = RubricConfig::default();
        missing.maxima.remove("nesting");
        assert!(matches!(
            missing.validate(),
            Err(ConfigError::MissingCriterion(name)) if name == "nesting"
        ));

        let mut unknown = RubricConfig::default();
        unknown.maxima.insert("vibes".into(), 0.0);
        assert!(matches!(
            unknown.validate(),
            Err(ConfigError::UnknownCriterion(_))
        ));

        let mut negative = RubricConfig::default();
        negative.maxima.insert("tests".into(), -1.0);
        negative.maxima.insert("naming".into(), 3.0);
        assert!(matches!(
            negative.validate(),
            Err(ConfigError::InvalidMaximum { .. })
        ));

        let zero = RubricConfig {
            ceiling: 0.0,
            ..RubricConfig::default()
        };
        assert!(matches!(
            zero.validate(),
            Err(ConfigError::NonPositiveCeiling(_))
        ));
    }

    #[test]
    fn custom_scale_validates_when_consistent() {
        let config = RubricConfig {
            ceiling: 20.0,
            maxima: Criterion::ALL
                .into_iter()
                .map(|c| (c.as_str().to_string(), c.default_max() * 2.0))
                .collect(),
        };
        let rubric = config.validate().unwrap();
        assert_eq!(rubric.max(Criterion::Nesting), 4.0);
    }

    const CLEAN: &str = r#"
// Adds two numbers.
fn add(a: u32, b: u32) -> u32 {
    a + b
}

// Returns the larger value.
fn larger(a: u32, b: u32) -> u32 {
    if a > b {
        a
    } else {
        b
    }
}
"#;

    #[test]
    fn clean_documented_code_scores_high() {
        let files = vec![
            analyze("README.md", "# Demo\n\nDocs.\n", None),
            analyze("src/lib.rs", CLEAN, Some(Language::Rust)),
        ];
        let metrics = rubric().evaluate(&files, false, true);
        assert_eq!(metrics.total, 10.0);
        assert_eq!(metrics.files.len(), 2);
        assert_eq!(
            metrics.sub_score(Criterion::Documentation).map(|s| s.value),
            Some(2.0)
        );
    }

    #[test]
    fn deep_undocumented_code_loses_nesting_and_documentation() {
        let deep = "fn f() {\n if a {\n  if b {\n   if c {\n    if d {\n     if e {\n      g();\n     }\n    }\n   }\n  }\n }\n}\n";
        let files = vec![analyze("src/deep.rs", deep, Some(Language::Rust))];
        let metrics = rubric().evaluate(&files, false, false);

        assert_eq!(metrics.sub_score(Criterion::Nesting).map(|s| s.value), Some(0.0));
        assert_eq!(
            metrics.sub_score(Criterion::Documentation).map(|s| s.value),
            Some(0.0)
        );
        assert_eq!(metrics.sub_score(Criterion::Tests).map(|s| s.value), Some(0.0));
        assert!(metrics.total < 6.0);
    }

    #[test]
    fn totals_stay_within_bounds_for_degenerate_input() {
        let rubric = rubric();
        let cases = vec![
            Vec::new(),
            vec![analyze("blob.rs", "\0\0\0", Some(Language::Rust))],
            vec![analyze("empty.py", "", Some(Language::Python))],
            vec![analyze("huge.js", &"x();\n".repeat(20_000), Some(Language::JavaScript))],
        ];
        for files in cases {
            let metrics = rubric.evaluate(&files, false, false);
            assert!((0.0..=10.0).contains(&metrics.total), "{}", metrics.total);
            for score in &metrics.sub_scores {
                assert!(score.value >= 0.0 && score.value <= score.max, "{score:?}");
            }
        }
    }

    #[test]
    fn report_carries_criteria_and_skips() {
        let files = vec![analyze("src/a.rs", CLEAN, Some(Language::Rust))];
        let report = rubric()
            .evaluate(&files, true, false)
            .into_report(Vec::new(), vec!["gone.rs".into()]);
        assert_eq!(report.criteria.len(), Criterion::ALL.len());
        assert_eq!(report.ceiling, 10.0);
        assert_eq!(report.skipped, vec!["gone.rs".to_string()]);
    }
}
