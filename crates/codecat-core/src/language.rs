//! Language detection by file extension and path conventions.
//!
//! Every analyzable source language belongs to one [`LanguageFamily`], which
//! selects the nesting-depth strategy in the analyzer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How block structure is expressed in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageFamily {
    /// Blocks delimited by `{` / `}`.
    Brace,
    /// Blocks delimited by indentation (or `end` keywords where indentation
    /// is the reliable signal).
    Indentation,
    Unknown,
}

/// Naming convention expected for function names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingConvention {
    SnakeCase,
    /// camelCase, with PascalCase accepted.
    CamelCase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    C,
    Cpp,
    CSharp,
    Ruby,
    Php,
    Swift,
    Kotlin,
    Scala,
    Shell,
}

impl Language {
    pub const ALL: [Language; 15] = [
        Language::Rust,
        Language::Python,
        Language::JavaScript,
        Language::TypeScript,
        Language::Go,
        Language::Java,
        Language::C,
        Language::Cpp,
        Language::CSharp,
        Language::Ruby,
        Language::Php,
        Language::Swift,
        Language::Kotlin,
        Language::Scala,
        Language::Shell,
    ];

    /// Display name, matching the names hosting providers report.
    pub fn name(&self) -> &'static str {
        match self {
            Language::Rust => "Rust",
            Language::Python => "Python",
            Language::JavaScript => "JavaScript",
            Language::TypeScript => "TypeScript",
            Language::Go => "Go",
            Language::Java => "Java",
            Language::C => "C",
            Language::Cpp => "C++",
            Language::CSharp => "C#",
            Language::Ruby => "Ruby",
            Language::Php => "PHP",
            Language::Swift => "Swift",
            Language::Kotlin => "Kotlin",
            Language::Scala => "Scala",
            Language::Shell => "Shell",
        }
    }

    pub fn family(&self) -> LanguageFamily {
        match self {
            Language::Python | Language::Ruby => LanguageFamily::Indentation,
            Language::Shell => LanguageFamily::Unknown,
            _ => LanguageFamily::Brace,
        }
    }

    pub fn naming_convention(&self) -> NamingConvention {
        match self {
            Language::Rust
            | Language::Python
            | Language::Ruby
            | Language::C
            | Language::Cpp
            | Language::Shell => NamingConvention::SnakeCase,
            _ => NamingConvention::CamelCase,
        }
    }

    /// Whether `'` opens an arbitrary-length string (as opposed to a char
    /// literal or a lifetime).
    pub fn single_quote_strings(&self) -> bool {
        matches!(
            self,
            Language::JavaScript
                | Language::TypeScript
                | Language::Php
                | Language::Python
                | Language::Ruby
                | Language::Shell
        )
    }

    pub fn from_extension(ext: &str) -> Option<Language> {
        let lang = match ext.to_ascii_lowercase().as_str() {
            "rs" => Language::Rust,
            "py" | "pyi" => Language::Python,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Language::TypeScript,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => Language::Cpp,
            "cs" => Language::CSharp,
            "rb" | "rake" => Language::Ruby,
            "php" => Language::Php,
            "swift" => Language::Swift,
            "kt" | "kts" => Language::Kotlin,
            "scala" | "sc" => Language::Scala,
            "sh" | "bash" | "zsh" => Language::Shell,
            _ => return None,
        };
        Some(lang)
    }

    /// Detect the language of a path from its extension.
    pub fn from_path(path: &str) -> Option<Language> {
        let name = file_name(path);
        // Minified bundles are generated output, not source.
        if name.ends_with(".min.js") {
            return None;
        }
        extension(name).and_then(Language::from_extension)
    }

    /// Parse a provider-reported language name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Language> {
        let wanted = name.trim();
        Language::ALL
            .into_iter()
            .find(|l| l.name().eq_ignore_ascii_case(wanted))
            .or_else(|| match wanted.to_ascii_lowercase().as_str() {
                "cpp" | "c plus plus" => Some(Language::Cpp),
                "csharp" => Some(Language::CSharp),
                "bash" | "sh" | "zsh" => Some(Language::Shell),
                "golang" => Some(Language::Go),
                _ => None,
            })
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Family of an optional language; `None` is treated as unknown.
pub fn family_of(language: Option<Language>) -> LanguageFamily {
    language.map_or(LanguageFamily::Unknown, |l| l.family())
}

/// What a path holds, as far as selection is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Code(Language),
    Documentation,
    Config,
    /// Binary or otherwise not worth reading.
    Other,
}

impl FileKind {
    pub fn is_text(&self) -> bool {
        !matches!(self, FileKind::Other)
    }
}

const DOC_EXTENSIONS: &[&str] = &["md", "markdown", "rst", "txt", "adoc"];

const CONFIG_EXTENSIONS: &[&str] = &[
    "toml", "json", "yaml", "yml", "ini", "cfg", "xml", "gradle", "sbt", "csproj", "mod",
];

const CONFIG_FILE_NAMES: &[&str] = &[
    "makefile",
    "dockerfile",
    "cmakelists.txt",
    "gemfile",
    "rakefile",
    "requirements.txt",
    "setup.py",
    "package.swift",
];

/// Classify a path by name alone.
pub fn classify_path(path: &str) -> FileKind {
    let name = file_name(path);
    let lower = name.to_ascii_lowercase();
    if CONFIG_FILE_NAMES.contains(&lower.as_str()) {
        return FileKind::Config;
    }
    if let Some(lang) = Language::from_path(path) {
        return FileKind::Code(lang);
    }
    if lower.starts_with("readme") || lower == "license" || lower == "changelog" {
        return FileKind::Documentation;
    }
    match extension(&lower) {
        Some(ext) if DOC_EXTENSIONS.contains(&ext) => FileKind::Documentation,
        Some(ext) if CONFIG_EXTENSIONS.contains(&ext) => FileKind::Config,
        _ => FileKind::Other,
    }
}

/// Whether a path looks like a test file or lives under a test directory.
pub fn is_test_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    let in_test_dir = lower.split('/').rev().skip(1).any(|segment| {
        matches!(
            segment,
            "test" | "tests" | "spec" | "specs" | "__tests__" | "testing"
        )
    });
    if in_test_dir {
        return true;
    }
    let name = file_name(path);
    let stem = name.split('.').next().unwrap_or(name);
    let lower_stem = stem.to_ascii_lowercase();
    lower_stem.starts_with("test_")
        || lower_stem.ends_with("_test")
        || lower_stem.ends_with("_spec")
        || stem.len() > 4 && (stem.ends_with("Test") || stem.ends_with("Tests"))
        || name.contains(".test.")
        || name.contains(".spec.")
}

/// Whether a path is a README or a top-level documentation file.
pub fn is_documentation_path(path: &str) -> bool {
    let name = file_name(path).to_ascii_lowercase();
    if name.starts_with("readme") {
        return true;
    }
    path_depth(path) == 0 && matches!(classify_path(path), FileKind::Documentation)
}

/// Final path component.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Number of directories above the file (`a.rs` is 0, `src/a.rs` is 1).
pub fn path_depth(path: &str) -> usize {
    path.trim_matches('/').matches('/').count()
}

fn extension(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() {
        None
    } else {
        Some(ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_map_to_languages() {
        assert_eq!(Language::from_path("src/main.rs"), Some(Language::Rust));
        assert_eq!(Language::from_path("app/models.py"), Some(Language::Python));
        assert_eq!(Language::from_path("web/App.TSX"), Some(Language::TypeScript));
        assert_eq!(Language::from_path("include/vec.hpp"), Some(Language::Cpp));
        assert_eq!(Language::from_path("dist/app.min.js"), None);
        assert_eq!(Language::from_path("logo.png"), None);
        assert_eq!(Language::from_path(".bashrc"), None);
    }

    #[test]
    fn families_dispatch_by_language() {
        assert_eq!(Language::Rust.family(), LanguageFamily::Brace);
        assert_eq!(Language::Python.family(), LanguageFamily::Indentation);
        assert_eq!(Language::Ruby.family(), LanguageFamily::Indentation);
        assert_eq!(family_of(None), LanguageFamily::Unknown);
    }

    #[test]
    fn provider_names_parse_case_insensitively() {
        assert_eq!(Language::from_name("rust"), Some(Language::Rust));
        assert_eq!(Language::from_name("C++"), Some(Language::Cpp));
        assert_eq!(Language::from_name(" c# "), Some(Language::CSharp));
        assert_eq!(Language::from_name("golang"), Some(Language::Go));
        assert_eq!(Language::from_name("Brainfuck"), None);
    }

    #[test]
    fn classify_distinguishes_text_kinds() {
        assert_eq!(classify_path("README.md"), FileKind::Documentation);
        assert_eq!(classify_path("docs/guide.rst"), FileKind::Documentation);
        assert_eq!(classify_path("Cargo.toml"), FileKind::Config);
        assert_eq!(classify_path("Makefile"), FileKind::Config);
        assert_eq!(classify_path("setup.py"), FileKind::Config);
        assert_eq!(classify_path("lib/a.go"), FileKind::Code(Language::Go));
        assert_eq!(classify_path("assets/font.woff2"), FileKind::Other);
        assert!(!classify_path("bin/tool.exe").is_text());
    }

    #[test]
    fn test_paths_are_recognized() {
        assert!(is_test_path("tests/integration.rs"));
        assert!(is_test_path("pkg/server_test.go"));
        assert!(is_test_path("app/test_models.py"));
        assert!(is_test_path("src/__tests__/App.js"));
        assert!(is_test_path("src/button.spec.ts"));
        assert!(is_test_path("src/FooTest.java"));
        assert!(!is_test_path("src/contest.rs"));
        assert!(!is_test_path("src/attestation.rs"));
    }

    #[test]
    fn documentation_is_readme_or_top_level() {
        assert!(is_documentation_path("README.md"));
        assert!(is_documentation_path("crates/core/README.md"));
        assert!(is_documentation_path("CONTRIBUTING.md"));
        assert!(!is_documentation_path("docs/guide.md"));
    }

    #[test]
    fn depth_counts_directories() {
        assert_eq!(path_depth("a.rs"), 0);
        assert_eq!(path_depth("src/a.rs"), 1);
        assert_eq!(path_depth("/src/bin/a.rs"), 2);
    }
}
