//! File selection engine.
//!
//! Turns an unordered `(path, size)` listing into a short, deterministic list
//! of files worth reading. Every eligible file lands in exactly one
//! [`PriorityClass`]; classes are then drained round-robin in precedence
//! order under a file-count limit and an aggregate byte budget.

use std::collections::BTreeMap;

use codecat_state::{FileEntry, PriorityClass, SelectedFile};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SelectionError};
use crate::language::{
    classify_path, file_name, is_documentation_path, is_test_path, path_depth, FileKind, Language,
};

/// Tunables for selection. Pattern tables are matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub max_files: usize,
    /// Budget for the sum of accounted file sizes.
    pub max_total_bytes: u64,
    /// Content beyond this many bytes is truncated; sizes count at most this.
    pub max_file_bytes: u64,
    /// A pattern ending in `/` excludes a directory at any depth; anything
    /// else excludes paths ending with it.
    pub exclude_patterns: Vec<String>,
    pub core_directories: Vec<String>,
    /// Language name to entry-point path suffixes.
    pub entry_points: BTreeMap<String, Vec<String>>,
    /// Build and manifest file names.
    pub build_files: Vec<String>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        let entry = |name: &str, files: &[&str]| {
            (
                name.to_string(),
                files.iter().map(|f| f.to_string()).collect::<Vec<_>>(),
            )
        };
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            max_files: 5,
            max_total_bytes: 50_000,
            max_file_bytes: 10_000,
            exclude_patterns: strings(&[
                "node_modules/",
                "vendor/",
                "dist/",
                "build/",
                "target/",
                ".git/",
                ".min.js",
                ".bundle.js",
            ]),
            core_directories: strings(&["src/", "lib/", "app/", "core/", "pkg/", "internal/"]),
            entry_points: [
                entry(
                    "Python",
                    &["main.py", "app.py", "__main__.py", "run.py", "manage.py", "wsgi.py"],
                ),
                entry("JavaScript", &["index.js", "app.js", "main.js", "server.js"]),
                entry(
                    "TypeScript",
                    &["index.ts", "index.tsx", "app.ts", "main.ts", "server.ts"],
                ),
                entry("Go", &["main.go"]),
                entry("Rust", &["src/main.rs", "src/lib.rs", "main.rs"]),
                entry("Java", &["Main.java", "Application.java"]),
                entry("Kotlin", &["Main.kt", "Application.kt"]),
                entry("Scala", &["Main.scala"]),
                entry("C", &["main.c"]),
                entry("C++", &["main.cpp", "main.cc"]),
                entry("C#", &["Program.cs"]),
                entry("Ruby", &["main.rb", "app.rb", "config.ru"]),
                entry("PHP", &["index.php", "app.php"]),
                entry("Swift", &["main.swift", "App.swift"]),
                entry("Shell", &["main.sh", "install.sh"]),
            ]
            .into_iter()
            .collect(),
            build_files: strings(&[
                "Cargo.toml",
                "pyproject.toml",
                "setup.py",
                "setup.cfg",
                "requirements.txt",
                "Pipfile",
                "package.json",
                "tsconfig.json",
                "go.mod",
                "pom.xml",
                "build.gradle",
                "build.gradle.kts",
                "build.sbt",
                "Gemfile",
                "composer.json",
                "Package.swift",
                "CMakeLists.txt",
                "Makefile",
                "Dockerfile",
            ]),
        }
    }
}

impl SelectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_files == 0 {
            return Err(ConfigError::InvalidSelection("max_files must be at least 1".into()));
        }
        if self.max_total_bytes == 0 || self.max_file_bytes == 0 {
            return Err(ConfigError::InvalidSelection(
                "byte caps must be positive".into(),
            ));
        }
        Ok(())
    }

    fn is_excluded(&self, lower_path: &str) -> bool {
        self.exclude_patterns.iter().any(|pattern| {
            let pattern = pattern.to_ascii_lowercase();
            if pattern.ends_with('/') {
                lower_path.starts_with(&pattern) || lower_path.contains(&format!("/{pattern}"))
            } else {
                lower_path.ends_with(&pattern)
            }
        })
    }

    fn is_entry_point(&self, lower_path: &str, language: Language) -> bool {
        self.entry_points
            .get(language.name())
            .is_some_and(|patterns| patterns.iter().any(|p| path_matches(lower_path, p)))
    }

    fn is_core(&self, lower_path: &str) -> bool {
        if path_depth(lower_path) == 0 {
            return true;
        }
        let dir = lower_path.rsplit_once('/').map_or("", |(dir, _)| dir);
        let dir = format!("{dir}/");
        self.core_directories.iter().any(|core| {
            let core = core.to_ascii_lowercase();
            dir.starts_with(&core) || dir.contains(&format!("/{core}"))
        })
    }

    fn is_build_file(&self, lower_path: &str) -> bool {
        let name = file_name(lower_path);
        self.build_files.iter().any(|b| b.eq_ignore_ascii_case(name))
    }
}

/// `path` equals `pattern` or ends with `/pattern`.
fn path_matches(lower_path: &str, pattern: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    lower_path == pattern || lower_path.ends_with(&format!("/{pattern}"))
}

/// An eligible file with its assigned priority class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub path: String,
    pub language: Option<Language>,
    pub size: u64,
    pub class: PriorityClass,
    depth: usize,
}

impl FileCandidate {
    fn sort_key(&self) -> (usize, u64, &str) {
        (self.depth, self.size, self.path.as_str())
    }

    fn into_selected(self) -> SelectedFile {
        SelectedFile {
            language: self
                .language
                .map_or_else(|| "text".to_string(), |l| l.name().to_string()),
            path: self.path,
            size: self.size,
            class: self.class,
        }
    }
}

/// Outcome of a selection run.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub files: Vec<SelectedFile>,
    pub dominant_language: Option<Language>,
    /// Whether the listing holds any test file, selected or not.
    pub has_tests: bool,
    pub has_readme: bool,
    pub eligible_count: usize,
}

fn normalize(path: &str) -> String {
    path.trim()
        .replace('\\', "/")
        .trim_start_matches("./")
        .trim_start_matches('/')
        .to_string()
}

/// Choose the files to analyze.
///
/// Deterministic in its input: ordering of `listing` does not matter.
pub fn select_files(
    listing: &[FileEntry],
    declared_language: Option<&str>,
    config: &SelectionConfig,
) -> Result<Selection, SelectionError> {
    let mut entries: Vec<(String, u64)> = listing
        .iter()
        .map(|e| (normalize(&e.path), e.size))
        .filter(|(path, _)| !path.is_empty() && !path.ends_with('/'))
        .collect();
    entries.sort();
    entries.dedup_by(|a, b| a.0 == b.0);

    let mut eligible = Vec::new();
    for (path, size) in entries {
        let lower = path.to_ascii_lowercase();
        if size == 0 || config.is_excluded(&lower) {
            continue;
        }
        let kind = classify_path(&path);
        if !kind.is_text() {
            continue;
        }
        eligible.push((path, size, kind));
    }
    if eligible.is_empty() {
        return Err(SelectionError::NoAnalyzableFiles(format!(
            "none of the {} listed files is a non-empty text file",
            listing.len()
        )));
    }

    let dominant_language = declared_language
        .and_then(Language::from_name)
        .or_else(|| dominant_by_bytes(&eligible));
    let has_tests = eligible.iter().any(|(path, _, _)| is_test_path(path));
    let has_readme = eligible
        .iter()
        .any(|(path, _, _)| file_name(path).to_ascii_lowercase().starts_with("readme"));
    let eligible_count = eligible.len();

    let mut buckets: BTreeMap<PriorityClass, Vec<FileCandidate>> = BTreeMap::new();
    for (path, size, kind) in eligible {
        let language = match kind {
            FileKind::Code(lang) => Some(lang),
            _ => None,
        };
        let class = classify(&path, kind, dominant_language, config);
        buckets.entry(class).or_default().push(FileCandidate {
            depth: path_depth(&path),
            path,
            language,
            size,
            class,
        });
    }
    for bucket in buckets.values_mut() {
        bucket.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    }

    let files = fill_round_robin(buckets, config);
    Ok(Selection {
        files,
        dominant_language,
        has_tests,
        has_readme,
        eligible_count,
    })
}

fn classify(
    path: &str,
    kind: FileKind,
    dominant: Option<Language>,
    config: &SelectionConfig,
) -> PriorityClass {
    let lower = path.to_ascii_lowercase();
    if is_documentation_path(path) {
        return PriorityClass::Documentation;
    }
    let test = is_test_path(path);
    if let FileKind::Code(lang) = kind {
        let dominant_matches = dominant.is_none_or(|d| d == lang);
        if !test && dominant_matches && config.is_entry_point(&lower, lang) {
            return PriorityClass::EntryPoint;
        }
        if !test && config.is_core(&lower) {
            return PriorityClass::CoreSource;
        }
    }
    if test {
        return PriorityClass::Test;
    }
    if config.is_build_file(&lower) {
        return PriorityClass::BuildConfig;
    }
    PriorityClass::OtherSource
}

fn dominant_by_bytes(eligible: &[(String, u64, FileKind)]) -> Option<Language> {
    let mut bytes: BTreeMap<Language, u64> = BTreeMap::new();
    for (_, size, kind) in eligible {
        if let FileKind::Code(lang) = kind {
            let total = bytes.entry(*lang).or_default();
            *total = total.saturating_add(*size);
        }
    }
    bytes
        .into_iter()
        .max_by(|(la, a), (lb, b)| a.cmp(b).then_with(|| lb.name().cmp(la.name())))
        .map(|(lang, _)| lang)
}

/// Take the best of each class, then the second best of each class, and so
/// on, skipping any file that would overrun the byte budget.
fn fill_round_robin(
    buckets: BTreeMap<PriorityClass, Vec<FileCandidate>>,
    config: &SelectionConfig,
) -> Vec<SelectedFile> {
    let mut queues: Vec<std::vec::IntoIter<FileCandidate>> =
        buckets.into_values().map(Vec::into_iter).collect();
    let mut selected = Vec::new();
    let mut spent = 0u64;

    while selected.len() < config.max_files {
        let mut progressed = false;
        for queue in queues.iter_mut() {
            if selected.len() >= config.max_files {
                break;
            }
            for candidate in queue.by_ref() {
                progressed = true;
                let accounted = candidate.size.min(config.max_file_bytes);
                if spent.saturating_add(accounted) <= config.max_total_bytes {
                    spent = spent.saturating_add(accounted);
                    selected.push(candidate.into_selected());
                    break;
                }
            }
        }
        if !progressed {
            break;
        }
    }
    selected
}

/// Cut `text` to at most `max_bytes` bytes on a char boundary.
pub fn truncate_to_boundary(text: &str, max_bytes: usize) -> (&str, bool) {
    if text.len() <= max_bytes {
        return (text, false);
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    (&text[..end], true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(entries: &[(&str, u64)]) -> Vec<FileEntry> {
        entries.iter().map(|(p, s)| FileEntry::new(*p, *s)).collect()
    }

    fn paths(selection: &Selection) -> Vec<&str> {
        selection.files.iter().map(|f| f.path.as_str()).collect()
    }

    fn typical() -> Vec<FileEntry> {
        listing(&[
            ("tests/test_app.py", 900),
            ("app/models.py", 4_000),
            ("README.md", 1_200),
            ("main.py", 700),
            ("requirements.txt", 80),
            ("docs/logo.png", 30_000),
            ("app/views.py", 2_500),
            ("scripts/deploy.sh", 300),
        ])
    }

    #[test]
    fn one_file_per_class_in_precedence_order() {
        let selection = select_files(&typical(), None, &SelectionConfig::default()).unwrap();
        assert_eq!(
            paths(&selection),
            vec![
                "README.md",
                "main.py",
                "app/views.py",
                "tests/test_app.py",
                "requirements.txt",
            ]
        );
        let classes: Vec<u8> = selection.files.iter().map(|f| f.class.rank()).collect();
        assert_eq!(classes, vec![1, 2, 3, 4, 5]);
        assert_eq!(selection.dominant_language, Some(Language::Python));
        assert!(selection.has_tests);
        assert!(selection.has_readme);
        assert_eq!(selection.eligible_count, 7);
    }

    #[test]
    fn selection_ignores_input_order() {
        let config = SelectionConfig::default();
        let forward = select_files(&typical(), None, &config).unwrap();
        let mut reversed = typical();
        reversed.reverse();
        let backward = select_files(&reversed, None, &config).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward, select_files(&typical(), None, &config).unwrap());
    }

    #[test]
    fn never_exceeds_max_files() {
        let many: Vec<FileEntry> = (0..40)
            .map(|i| FileEntry::new(format!("src/mod_{i:02}.rs"), 100))
            .collect();
        let config = SelectionConfig {
            max_files: 3,
            ..SelectionConfig::default()
        };
        let selection = select_files(&many, Some("Rust"), &config).unwrap();
        assert_eq!(selection.files.len(), 3);
        assert_eq!(
            paths(&selection),
            vec!["src/mod_00.rs", "src/mod_01.rs", "src/mod_02.rs"]
        );
    }

    #[test]
    fn zero_byte_and_empty_paths_are_never_selected() {
        let entries = listing(&[
            ("README.md", 0),
            ("", 50),
            ("   ", 50),
            ("src/empty.rs", 0),
            ("src/real.rs", 10),
            ("docs/guide.md", 20),
        ]);
        let selection = select_files(&entries, None, &SelectionConfig::default()).unwrap();
        assert_eq!(paths(&selection), vec!["src/real.rs", "docs/guide.md"]);
        assert!(selection.files.iter().all(|f| f.size > 0 && !f.path.is_empty()));
    }

    #[test]
    fn binary_only_repository_has_nothing_to_analyze() {
        let entries = listing(&[("logo.png", 100), ("font.woff2", 900), ("app.exe", 4096)]);
        let err = select_files(&entries, None, &SelectionConfig::default()).unwrap_err();
        assert!(matches!(err, SelectionError::NoAnalyzableFiles(_)));

        let err = select_files(&[], None, &SelectionConfig::default()).unwrap_err();
        assert!(matches!(err, SelectionError::NoAnalyzableFiles(_)));
    }

    #[test]
    fn excluded_directories_are_skipped() {
        let entries = listing(&[
            ("node_modules/lodash/index.js", 10),
            ("web/node_modules/x/index.js", 10),
            ("target/debug/build.rs", 10),
            ("dist/app.min.js", 10),
            ("src/index.js", 10),
        ]);
        let selection = select_files(&entries, None, &SelectionConfig::default()).unwrap();
        assert_eq!(paths(&selection), vec!["src/index.js"]);
        assert_eq!(selection.eligible_count, 1);
    }

    #[test]
    fn duplicates_collapse_after_normalization() {
        let entries = listing(&[("./src/lib.rs", 10), ("src/lib.rs", 10), ("/src/lib.rs", 10)]);
        let selection = select_files(&entries, None, &SelectionConfig::default()).unwrap();
        assert_eq!(paths(&selection), vec!["src/lib.rs"]);
    }

    #[test]
    fn shallower_then_smaller_then_lexicographic() {
        let entries = listing(&[
            ("src/deep/nested/a.rs", 10),
            ("src/b.rs", 500),
            ("src/c.rs", 100),
            ("src/a.rs", 100),
        ]);
        let config = SelectionConfig {
            max_files: 4,
            ..SelectionConfig::default()
        };
        let selection = select_files(&entries, Some("Rust"), &config).unwrap();
        assert_eq!(
            paths(&selection),
            vec!["src/a.rs", "src/c.rs", "src/b.rs", "src/deep/nested/a.rs"]
        );
    }

    #[test]
    fn byte_budget_skips_files_that_do_not_fit() {
        let entries = listing(&[("src/a.rs", 600), ("src/b.rs", 700), ("src/c.rs", 300)]);
        let config = SelectionConfig {
            max_total_bytes: 1_000,
            max_file_bytes: 1_000,
            ..SelectionConfig::default()
        };
        let selection = select_files(&entries, None, &config).unwrap();
        assert_eq!(paths(&selection), vec!["src/c.rs", "src/a.rs"]);
    }

    #[test]
    fn oversized_files_count_only_up_to_the_per_file_cap() {
        let entries: Vec<FileEntry> = (0..6)
            .map(|i| FileEntry::new(format!("src/big_{i}.rs"), 1_000_000))
            .collect();
        let selection = select_files(&entries, None, &SelectionConfig::default()).unwrap();
        assert_eq!(selection.files.len(), 5);
    }

    #[test]
    fn dominant_language_prefers_declared_then_bytes() {
        let entries = listing(&[("src/a.go", 100), ("web/app.ts", 5_000), ("web/b.ts", 10)]);
        let config = SelectionConfig::default();
        let by_bytes = select_files(&entries, None, &config).unwrap();
        assert_eq!(by_bytes.dominant_language, Some(Language::TypeScript));

        let declared = select_files(&entries, Some("Go"), &config).unwrap();
        assert_eq!(declared.dominant_language, Some(Language::Go));

        let unknown = select_files(&entries, Some("COBOL"), &config).unwrap();
        assert_eq!(unknown.dominant_language, Some(Language::TypeScript));
    }

    #[test]
    fn entry_points_follow_dominant_language() {
        let entries = listing(&[("cmd/server/main.go", 400), ("tools/main.py", 100)]);
        let selection = select_files(&entries, Some("Go"), &SelectionConfig::default()).unwrap();
        assert_eq!(selection.files[0].path, "cmd/server/main.go");
        assert_eq!(selection.files[0].class, PriorityClass::EntryPoint);
        assert_eq!(selection.files[1].class, PriorityClass::OtherSource);
    }

    #[test]
    fn unconventional_layout_still_selects_code() {
        let entries = listing(&[("weird/place/thing.rb", 50)]);
        let selection = select_files(&entries, None, &SelectionConfig::default()).unwrap();
        assert_eq!(selection.files[0].class, PriorityClass::OtherSource);
        assert_eq!(selection.files[0].language, "Ruby");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let zero_files = SelectionConfig {
            max_files: 0,
            ..SelectionConfig::default()
        };
        assert!(zero_files.validate().is_err());
        let zero_bytes = SelectionConfig {
            max_file_bytes: 0,
            ..SelectionConfig::default()
        };
        assert!(zero_bytes.validate().is_err());
        assert!(SelectionConfig::default().validate().is_ok());
    }

    #[test]
    fn oversized_listing_sizes_do_not_overflow() {
        let entries = listing(&[("src/a.rs", u64::MAX), ("src/b.rs", u64::MAX), ("lib/c.py", 10)]);
        let selection = select_files(&entries, None, &SelectionConfig::default()).unwrap();
        assert_eq!(selection.dominant_language, Some(Language::Rust));
        assert!(selection.files.len() <= SelectionConfig::default().max_files);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "héllo";
        assert_eq!(truncate_to_boundary(text, 2), ("h", true));
        assert_eq!(truncate_to_boundary(text, 3), ("hé", true));
        assert_eq!(truncate_to_boundary(text, 64), ("héllo", false));
    }
}
