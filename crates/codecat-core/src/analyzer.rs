//! Heuristic code-quality analyzer.
//!
//! Computes bounded, non-executing metrics for one file: line statistics,
//! nesting depth, function lengths, naming conformance, comment ratio and
//! branch-keyword complexity. Nothing here parses the language fully; a
//! small lexer skips string literals and comments so braces inside them do
//! not count.
//!
//! Nesting depth is tracked across the whole file, never per line:
//!
//! - brace family: a running `{`/`}` counter, with the maximum reached
//!   anywhere in the file;
//! - indentation family: an indent stack driven by indentation-level
//!   transitions, ignoring continuation lines inside open brackets.
//!
//! Undecodable input yields a zeroed [`FileMetrics`] flagged `unanalyzable`.

use std::sync::OnceLock;

use codecat_state::FileMetricsSummary;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::language::{
    is_documentation_path, is_test_path, Language, LanguageFamily, NamingConvention,
};

/// Lines longer than this many characters count as long.
pub const LONG_LINE_THRESHOLD: usize = 120;

/// Lines per block used for complexity when no functions are detected.
const COMPLEXITY_BLOCK_LINES: usize = 50;

const TAB_WIDTH: usize = 4;

/// Per-file heuristic metrics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FileMetrics {
    pub path: String,
    pub language: Option<Language>,
    pub line_count: usize,
    pub non_blank_lines: usize,
    /// Deepest block nesting reached anywhere in the file.
    pub max_depth: u32,
    /// Mean nesting depth over lines containing code.
    pub avg_depth: f64,
    pub avg_line_length: f64,
    pub max_line_length: usize,
    /// Share of non-blank lines longer than [`LONG_LINE_THRESHOLD`].
    pub long_line_ratio: f64,
    pub comment_lines: usize,
    /// Comment-only lines over non-blank lines.
    pub comment_ratio: f64,
    /// Length in lines of every detected function.
    pub function_lengths: Vec<usize>,
    /// Share of function names following the language's convention.
    pub naming_score: Option<f64>,
    /// Branch keywords and short-circuit operators on code lines.
    pub decision_points: usize,
    pub is_test: bool,
    pub is_documentation: bool,
    pub unanalyzable: bool,
}

impl FileMetrics {
    fn empty(path: &str, language: Option<Language>) -> Self {
        Self {
            path: path.to_string(),
            language,
            is_test: is_test_path(path),
            is_documentation: is_documentation_path(path),
            ..Self::default()
        }
    }

    /// Whether this file contributes to code-level criteria.
    pub fn is_code(&self) -> bool {
        self.language.is_some() && !self.unanalyzable && self.non_blank_lines > 0
    }

    pub fn function_count(&self) -> usize {
        self.function_lengths.len()
    }

    pub fn avg_function_length(&self) -> Option<f64> {
        if self.function_lengths.is_empty() {
            return None;
        }
        let total: usize = self.function_lengths.iter().sum();
        Some(total as f64 / self.function_lengths.len() as f64)
    }

    pub fn max_function_length(&self) -> usize {
        self.function_lengths.iter().copied().max().unwrap_or(0)
    }

    /// Decision points per function, or per 50-line block when the file has
    /// no detectable functions.
    pub fn complexity(&self) -> Option<f64> {
        if !self.is_code() {
            return None;
        }
        let units = if self.function_lengths.is_empty() {
            self.non_blank_lines.div_ceil(COMPLEXITY_BLOCK_LINES).max(1)
        } else {
            self.function_lengths.len()
        };
        Some(self.decision_points as f64 / units as f64)
    }

    pub fn summary(&self) -> FileMetricsSummary {
        FileMetricsSummary {
            path: self.path.clone(),
            language: self
                .language
                .map_or_else(|| "text".to_string(), |l| l.name().to_string()),
            line_count: self.line_count as u64,
            max_depth: self.max_depth,
            naming_score: self.naming_score,
            unanalyzable: self.unanalyzable,
        }
    }
}

/// Analyze one file.
///
/// Never fails: undecodable text produces zeroed metrics with
/// `unanalyzable = true`.
pub fn analyze(path: &str, text: &str, language: Option<Language>) -> FileMetrics {
    let mut metrics = FileMetrics::empty(path, language);
    if is_undecodable(text) {
        metrics.unanalyzable = true;
        return metrics;
    }

    let lines: Vec<&str> = text.lines().map(|l| l.trim_end_matches('\r')).collect();
    metrics.line_count = lines.len();

    let mut total_len = 0usize;
    let mut long_lines = 0usize;
    for line in lines.iter().filter(|l| !l.trim().is_empty()) {
        let len = line.chars().count();
        metrics.non_blank_lines += 1;
        total_len += len;
        metrics.max_line_length = metrics.max_line_length.max(len);
        if len > LONG_LINE_THRESHOLD {
            long_lines += 1;
        }
    }
    if metrics.non_blank_lines == 0 {
        return metrics;
    }
    let non_blank = metrics.non_blank_lines as f64;
    metrics.avg_line_length = total_len as f64 / non_blank;
    metrics.long_line_ratio = long_lines as f64 / non_blank;

    let Some(lang) = language else {
        return metrics;
    };

    let infos = scan(&lines, &Syntax::for_language(lang));
    metrics.comment_lines = infos.iter().filter(|i| i.has_comment && !i.has_code).count();
    metrics.comment_ratio = metrics.comment_lines as f64 / non_blank;

    let depths = match lang.family() {
        LanguageFamily::Brace => brace_depths(&infos),
        LanguageFamily::Indentation | LanguageFamily::Unknown => indentation_depths(&infos),
    };
    metrics.max_depth = depths.max;
    metrics.avg_depth = depths.avg;

    let functions = function_spans(lang, &lines, &infos);
    if !functions.is_empty() {
        let conforming = functions
            .iter()
            .filter(|(name, _)| follows_convention(name, lang.naming_convention()))
            .count();
        metrics.naming_score = Some(conforming as f64 / functions.len() as f64);
    }
    metrics.function_lengths = functions.into_iter().map(|(_, len)| len).collect();

    metrics.decision_points = lines
        .iter()
        .zip(&infos)
        .filter(|(_, info)| info.has_code)
        .map(|(line, _)| count_decision_points(line))
        .sum();

    metrics
}

/// NUL bytes or more than 1% replacement characters.
fn is_undecodable(text: &str) -> bool {
    if text.contains('\0') {
        return true;
    }
    let mut total = 0usize;
    let mut replaced = 0usize;
    for c in text.chars() {
        total += 1;
        if c == char::REPLACEMENT_CHARACTER {
            replaced += 1;
        }
    }
    total > 0 && replaced * 100 > total
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Syntax {
    line_comments: &'static [&'static str],
    block_comment: Option<(&'static str, &'static str)>,
    single_quote_strings: bool,
    /// String delimiters whose literals may span lines.
    multiline_delims: &'static [char],
    triple_quotes: bool,
    /// `r"..."`, `r#"..."#` and `br"..."` literals.
    raw_strings: bool,
    /// `/.../flags` literals where an operand is expected.
    regex_literals: bool,
}

impl Syntax {
    fn for_language(lang: Language) -> Self {
        const C_BLOCK: Option<(&str, &str)> = Some(("/*", "*/"));
        let single_quote_strings = lang.single_quote_strings();
        match lang {
            Language::Python => Syntax {
                line_comments: &["#"],
                block_comment: None,
                single_quote_strings,
                multiline_delims: &[],
                triple_quotes: true,
                raw_strings: false,
                regex_literals: false,
            },
            Language::Ruby | Language::Shell => Syntax {
                line_comments: &["#"],
                block_comment: None,
                single_quote_strings,
                multiline_delims: &[],
                triple_quotes: false,
                raw_strings: false,
                regex_literals: false,
            },
            Language::Php => Syntax {
                line_comments: &["//", "#"],
                block_comment: C_BLOCK,
                single_quote_strings,
                multiline_delims: &[],
                triple_quotes: false,
                raw_strings: false,
                regex_literals: false,
            },
            Language::JavaScript | Language::TypeScript | Language::Go => Syntax {
                line_comments: &["//"],
                block_comment: C_BLOCK,
                single_quote_strings,
                multiline_delims: &['`'],
                triple_quotes: false,
                raw_strings: false,
                regex_literals: matches!(lang, Language::JavaScript | Language::TypeScript),
            },
            Language::Rust => Syntax {
                line_comments: &["//"],
                block_comment: C_BLOCK,
                single_quote_strings,
                multiline_delims: &['"'],
                triple_quotes: false,
                raw_strings: true,
                regex_literals: false,
            },
            _ => Syntax {
                line_comments: &["//"],
                block_comment: C_BLOCK,
                single_quote_strings,
                multiline_delims: &[],
                triple_quotes: false,
                raw_strings: false,
                regex_literals: false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LexState {
    Code,
    BlockComment,
    Str(char),
    Triple { quote: char, doc: bool },
    RawStr { hashes: usize },
}

/// What the lexer learned about one line.
#[derive(Debug, Clone, Copy, Default)]
struct LineInfo {
    depth_start: u32,
    depth_peak: u32,
    depth_end: u32,
    /// Open `(`, `[` and `{` carried in from previous lines.
    brackets_start: u32,
    starts_in_string: bool,
    has_code: bool,
    has_comment: bool,
    indent: usize,
}

fn at(chars: &[char], i: usize, pattern: &str) -> bool {
    pattern
        .chars()
        .enumerate()
        .all(|(k, p)| chars.get(i + k) == Some(&p))
}

fn triple(quote: char) -> &'static str {
    if quote == '"' {
        "\"\"\""
    } else {
        "'''"
    }
}

/// Skip a char literal (`'a'`, `'\n'`, `'\u{1F600}'`); a lone `'` such as a
/// Rust lifetime is skipped by itself.
fn skip_char_literal(chars: &[char], i: usize) -> usize {
    if chars.get(i + 1) == Some(&'\\') {
        let limit = (i + 12).min(chars.len());
        for j in (i + 2)..limit {
            if chars[j] == '\'' {
                return j + 1;
            }
        }
        return i + 1;
    }
    if chars.get(i + 2) == Some(&'\'') {
        return i + 3;
    }
    i + 1
}

/// Start of a raw string literal at `i`: the number of `#`s and the index
/// just past the opening quote.
fn raw_string_open(chars: &[char], i: usize) -> Option<(usize, usize)> {
    if i > 0 && (chars[i - 1].is_alphanumeric() || chars[i - 1] == '_') {
        return None;
    }
    let mut j = i;
    if chars.get(j) == Some(&'b') {
        j += 1;
    }
    if chars.get(j) != Some(&'r') {
        return None;
    }
    j += 1;
    let mut hashes = 0;
    while chars.get(j) == Some(&'#') {
        hashes += 1;
        j += 1;
    }
    (chars.get(j) == Some(&'"')).then_some((hashes, j + 1))
}

/// Whether a `/` at `i` begins a regex literal rather than a division.
fn regex_allowed(chars: &[char], i: usize) -> bool {
    let before: String = chars[..i].iter().collect();
    let before = before.trim_end();
    match before.chars().last() {
        None => true,
        Some(c) if "(,=:[!&|?{};+-*%<>~^".contains(c) => true,
        Some(_) => ["return", "typeof", "case", "yield", "in", "of"].iter().any(|kw| {
            before.strip_suffix(kw).is_some_and(|rest| {
                !rest
                    .chars()
                    .last()
                    .is_some_and(|p| p.is_alphanumeric() || p == '_' || p == '$')
            })
        }),
    }
}

/// End of a regex literal opened at `i` (index past the closing `/` and
/// any flags), or `None` when the line ends first.
fn skip_regex_literal(chars: &[char], i: usize) -> Option<usize> {
    let mut j = i + 1;
    let mut in_class = false;
    while j < chars.len() {
        match chars[j] {
            '\\' => {
                j += 2;
                continue;
            }
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => {
                j += 1;
                while j < chars.len() && chars[j].is_ascii_alphabetic() {
                    j += 1;
                }
                return Some(j);
            }
            _ => {}
        }
        j += 1;
    }
    None
}

fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width += TAB_WIDTH,
            _ => break,
        }
    }
    width
}

fn scan(lines: &[&str], syntax: &Syntax) -> Vec<LineInfo> {
    let mut out = Vec::with_capacity(lines.len());
    let mut state = LexState::Code;
    let mut depth: u32 = 0;
    let mut brackets: u32 = 0;

    for line in lines {
        let chars: Vec<char> = line.chars().collect();
        let mut info = LineInfo {
            depth_start: depth,
            depth_peak: depth,
            brackets_start: brackets,
            starts_in_string: matches!(
                state,
                LexState::Str(_) | LexState::Triple { .. } | LexState::RawStr { .. }
            ),
            indent: indent_width(line),
            ..LineInfo::default()
        };

        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            match state {
                LexState::BlockComment => {
                    info.has_comment = true;
                    if let Some((_, end)) = syntax.block_comment {
                        if at(&chars, i, end) {
                            state = LexState::Code;
                            i += end.len();
                            continue;
                        }
                    }
                    i += 1;
                }
                LexState::Str(quote) => {
                    info.has_code = true;
                    if c == '\\' {
                        i += 2;
                        continue;
                    }
                    if c == quote {
                        state = LexState::Code;
                    }
                    i += 1;
                }
                LexState::RawStr { hashes } => {
                    info.has_code = true;
                    if c == '"' && (1..=hashes).all(|k| chars.get(i + k) == Some(&'#')) {
                        state = LexState::Code;
                        i += 1 + hashes;
                        continue;
                    }
                    i += 1;
                }
                LexState::Triple { quote, doc } => {
                    if doc {
                        info.has_comment = true;
                    } else {
                        info.has_code = true;
                    }
                    if c == '\\' {
                        i += 2;
                        continue;
                    }
                    if at(&chars, i, triple(quote)) {
                        state = LexState::Code;
                        i += 3;
                        continue;
                    }
                    i += 1;
                }
                LexState::Code => {
                    if c.is_whitespace() {
                        i += 1;
                        continue;
                    }
                    if syntax.line_comments.iter().any(|p| at(&chars, i, p)) {
                        info.has_comment = true;
                        break;
                    }
                    if let Some((start, _)) = syntax.block_comment {
                        if at(&chars, i, start) {
                            state = LexState::BlockComment;
                            info.has_comment = true;
                            i += start.len();
                            continue;
                        }
                    }
                    if syntax.triple_quotes && (c == '"' || c == '\'') && at(&chars, i, triple(c)) {
                        // A statement that is only a string literal is a docstring.
                        let doc = !info.has_code;
                        if doc {
                            info.has_comment = true;
                        } else {
                            info.has_code = true;
                        }
                        state = LexState::Triple { quote: c, doc };
                        i += 3;
                        continue;
                    }

                    info.has_code = true;
                    if syntax.raw_strings && (c == 'r' || c == 'b') {
                        if let Some((hashes, body)) = raw_string_open(&chars, i) {
                            state = LexState::RawStr { hashes };
                            i = body;
                            continue;
                        }
                    }
                    if syntax.regex_literals && c == '/' && regex_allowed(&chars, i) {
                        if let Some(end) = skip_regex_literal(&chars, i) {
                            i = end;
                            continue;
                        }
                    }
                    match c {
                        '"' => state = LexState::Str('"'),
                        '`' if syntax.multiline_delims.contains(&'`') => {
                            state = LexState::Str('`')
                        }
                        '\'' if syntax.single_quote_strings => state = LexState::Str('\''),
                        '\'' => {
                            i = skip_char_literal(&chars, i);
                            continue;
                        }
                        '{' => {
                            depth += 1;
                            info.depth_peak = info.depth_peak.max(depth);
                            brackets += 1;
                        }
                        '}' => {
                            depth = depth.saturating_sub(1);
                            brackets = brackets.saturating_sub(1);
                        }
                        '(' | '[' => brackets += 1,
                        ')' | ']' => brackets = brackets.saturating_sub(1),
                        _ => {}
                    }
                    i += 1;
                }
            }
        }

        if let LexState::Str(quote) = state {
            if !syntax.multiline_delims.contains(&quote) {
                state = LexState::Code;
            }
        }
        info.depth_end = depth;
        out.push(info);
    }
    out
}

// ---------------------------------------------------------------------------
// Nesting depth
// ---------------------------------------------------------------------------

struct Depths {
    max: u32,
    avg: f64,
}

fn brace_depths(infos: &[LineInfo]) -> Depths {
    let max = infos.iter().map(|i| i.depth_peak).max().unwrap_or(0);
    let code: Vec<u32> = infos
        .iter()
        .filter(|i| i.has_code)
        .map(|i| i.depth_start)
        .collect();
    Depths {
        max,
        avg: mean(&code),
    }
}

fn indentation_depths(infos: &[LineInfo]) -> Depths {
    let mut stack: Vec<usize> = vec![0];
    let mut max = 0u32;
    let mut code = Vec::new();

    for info in infos {
        let is_statement_start =
            info.has_code && !info.starts_in_string && info.brackets_start == 0;
        if !is_statement_start {
            continue;
        }
        while stack.len() > 1 && info.indent < stack[stack.len() - 1] {
            stack.pop();
        }
        let top = stack[stack.len() - 1];
        if info.indent > top {
            stack.push(info.indent);
        }
        let depth = (stack.len() - 1) as u32;
        max = max.max(depth);
        code.push(depth);
    }

    Depths {
        max,
        avg: mean(&code),
    }
}

fn mean(values: &[u32]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().map(|&v| f64::from(v)).sum::<f64>() / values.len() as f64
    }
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn declaration_patterns(lang: Language) -> Vec<&'static Regex> {
    static RUST: OnceLock<Option<Regex>> = OnceLock::new();
    static PYTHON: OnceLock<Option<Regex>> = OnceLock::new();
    static RUBY: OnceLock<Option<Regex>> = OnceLock::new();
    static GO: OnceLock<Option<Regex>> = OnceLock::new();
    static JS_FUNCTION: OnceLock<Option<Regex>> = OnceLock::new();
    static JS_ARROW: OnceLock<Option<Regex>> = OnceLock::new();
    static JS_METHOD: OnceLock<Option<Regex>> = OnceLock::new();
    static C_FAMILY: OnceLock<Option<Regex>> = OnceLock::new();
    static KOTLIN: OnceLock<Option<Regex>> = OnceLock::new();
    static SCALA: OnceLock<Option<Regex>> = OnceLock::new();
    static SWIFT: OnceLock<Option<Regex>> = OnceLock::new();
    static PHP: OnceLock<Option<Regex>> = OnceLock::new();
    static SHELL: OnceLock<Option<Regex>> = OnceLock::new();

    let patterns = match lang {
        Language::Rust => vec![cached(
            &RUST,
            r#"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:default\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"#,
        )],
        Language::Python => vec![cached(
            &PYTHON,
            r"^\s*(?:async\s+)?def\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*\(",
        )],
        Language::Ruby => vec![cached(
            &RUBY,
            r"^\s*def\s+(?:self\.)?(?P<name>[A-Za-z_][A-Za-z0-9_]*[?!=]?)",
        )],
        Language::Go => vec![cached(
            &GO,
            r"^\s*func\s+(?:\([^)]*\)\s*)?(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*[\[(]",
        )],
        Language::JavaScript | Language::TypeScript => vec![
            cached(
                &JS_FUNCTION,
                r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>[A-Za-z_$][A-Za-z0-9_$]*)\s*[<(]",
            ),
            cached(
                &JS_ARROW,
                r"^\s*(?:export\s+)?(?:const|let|var)\s+(?P<name>[A-Za-z_$][A-Za-z0-9_$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][A-Za-z0-9_$]*)\s*(?::\s*[^=]+)?=>",
            ),
            cached(
                &JS_METHOD,
                r"^\s*(?:(?:public|private|protected|static|async|readonly|override|get|set)\s+)*(?P<name>[A-Za-z_$][A-Za-z0-9_$]*)\s*\([^)]*\)\s*(?::\s*[^{]+)?\{\s*$",
            ),
        ],
        Language::Java | Language::CSharp | Language::C | Language::Cpp => vec![cached(
            &C_FAMILY,
            r"^\s*(?:(?:public|private|protected|internal|static|final|abstract|virtual|override|async|inline|extern|unsafe|synchronized|sealed|constexpr)\s+)*[A-Za-z_][\w<>\[\],:]*(?:\s*[*&]+\s*|\s+)(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*\([^;]*\)\s*(?:const\s*)?(?:throws\s+[\w.,\s]+)?\{?\s*$",
        )],
        Language::Kotlin => vec![cached(
            &KOTLIN,
            r"^\s*(?:(?:public|private|protected|internal|override|open|suspend|inline|operator)\s+)*fun\s+(?:<[^>]*>\s*)?(?:[A-Za-z_][\w.]*\.)?(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*\(",
        )],
        Language::Scala => vec![cached(
            &SCALA,
            r"^\s*(?:(?:override|private|protected|final|implicit)\s+)*def\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)",
        )],
        Language::Swift => vec![cached(
            &SWIFT,
            r"^\s*(?:(?:public|private|internal|fileprivate|open|static|class|override|mutating|@\w+)\s+)*func\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)",
        )],
        Language::Php => vec![cached(
            &PHP,
            r"^\s*(?:(?:public|private|protected|static|abstract|final)\s+)*function\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*\(",
        )],
        Language::Shell => vec![cached(
            &SHELL,
            r"^\s*(?:function\s+(?P<kw>[A-Za-z_][A-Za-z0-9_-]*)|(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*\(\s*\))",
        )],
    };
    patterns.into_iter().flatten().collect()
}

/// Words that look like calls in declaration position but are not.
const CONTROL_WORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "else", "new", "sizeof", "do", "case",
    "using", "lock", "foreach", "throw", "await", "function",
];

fn declared_name(patterns: &[&Regex], line: &str) -> Option<String> {
    for pattern in patterns {
        let Some(caps) = pattern.captures(line) else {
            continue;
        };
        let name = caps.name("name").or_else(|| caps.name("kw"))?.as_str();
        if CONTROL_WORDS.contains(&name) {
            continue;
        }
        return Some(name.to_string());
    }
    None
}

/// Detected functions as `(name, length in lines)`.
fn function_spans(lang: Language, lines: &[&str], infos: &[LineInfo]) -> Vec<(String, usize)> {
    let patterns = declaration_patterns(lang);
    let mut out = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let info = infos[i];
        if !info.has_code || info.starts_in_string {
            continue;
        }
        let Some(name) = declared_name(&patterns, line) else {
            continue;
        };
        let length = match lang.family() {
            LanguageFamily::Indentation => Some(indentation_span(infos, i)),
            LanguageFamily::Brace | LanguageFamily::Unknown => brace_span(lines, infos, i),
        };
        if let Some(length) = length {
            out.push((name, length));
        }
    }
    out
}

/// Lines from a declaration to the brace that closes its body. `None` for
/// prototypes and declarations whose body never opens.
fn brace_span(lines: &[&str], infos: &[LineInfo], start: usize) -> Option<usize> {
    const SIGNATURE_LOOKAHEAD: usize = 5;
    let base = infos[start].depth_start;
    let limit = (start + SIGNATURE_LOOKAHEAD).min(infos.len());

    let mut opened_at = None;
    for k in start..limit {
        if infos[k].depth_peak > base {
            opened_at = Some(k);
            break;
        }
        if lines[k].trim_end().ends_with(';') {
            return None;
        }
    }
    let opened_at = opened_at?;

    let end = (opened_at..infos.len())
        .find(|&j| infos[j].depth_end <= base)
        .unwrap_or(infos.len() - 1);
    Some(end - start + 1)
}

/// Lines from a declaration to the last line indented deeper than it.
fn indentation_span(infos: &[LineInfo], start: usize) -> usize {
    let header_indent = infos[start].indent;
    let mut last = start;
    for (k, info) in infos.iter().enumerate().skip(start + 1) {
        if !info.has_code {
            continue;
        }
        if info.starts_in_string || info.brackets_start > 0 || info.indent > header_indent {
            last = k;
        } else {
            break;
        }
    }
    last - start + 1
}

fn follows_convention(name: &str, convention: NamingConvention) -> bool {
    let core = name
        .trim_start_matches(['_', '$'])
        .trim_end_matches(['_', '?', '!', '=']);
    let Some(first) = core.chars().next() else {
        // Pure underscores (e.g. `__`) carry no signal either way.
        return true;
    };
    match convention {
        NamingConvention::SnakeCase => {
            first.is_ascii_lowercase()
                && core
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        }
        NamingConvention::CamelCase => {
            first.is_ascii_alphabetic() && core.chars().all(|c| c.is_ascii_alphanumeric())
        }
    }
}

fn count_decision_points(line: &str) -> usize {
    static DECISIONS: OnceLock<Option<Regex>> = OnceLock::new();
    cached(
        &DECISIONS,
        r"\b(?:if|elif|elsif|for|foreach|while|until|unless|case|when|catch|except|rescue|guard|match)\b|&&|\|\|",
    )
    .map_or(0, |re| re.find_iter(line).count())
}
