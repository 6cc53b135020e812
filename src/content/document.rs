//! Document gate: rejects constrained-authoring documents that carry
//! executable-adjacent syntax.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

use crate::observability::metrics;
use crate::policy::{Violation, ViolationKind};

/// Upper bound on document length, in characters, checked before any scan.
pub const MAX_DOCUMENT_CHARS: usize = 200_000;

/// Why a document was refused. The first failing check wins.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentViolation {
    #[error("document has {chars} characters, limit is {limit}")]
    TooLarge { chars: usize, limit: usize },

    #[error("module directive '{0}' is not allowed")]
    ModuleDirective(String),

    #[error("URL scheme '{0}' is not allowed")]
    UrlScheme(String),

    #[error("tag '{0}' is not allowed")]
    Tag(String),

    #[error("expression '{0}' is not allowed")]
    Expression(String),

    #[error("event handler attribute '{0}' is not allowed")]
    EventAttribute(String),

    /// A pattern failed to compile; the check refuses rather than passing.
    #[error("check '{0}' is unavailable")]
    CheckUnavailable(&'static str, ViolationKind),
}

impl DocumentViolation {
    pub fn kind(&self) -> ViolationKind {
        match self {
            Self::TooLarge { .. } => ViolationKind::DocumentTooLarge,
            Self::ModuleDirective(_) => ViolationKind::ModuleDirectiveBlocked,
            Self::UrlScheme(_) => ViolationKind::DisallowedUrlScheme,
            Self::Tag(_) => ViolationKind::DisallowedTag,
            Self::Expression(_) => ViolationKind::DisallowedExpression,
            Self::EventAttribute(_) => ViolationKind::DisallowedEventAttribute,
            Self::CheckUnavailable(_, kind) => *kind,
        }
    }
}

impl From<DocumentViolation> for Violation {
    fn from(v: DocumentViolation) -> Self {
        Violation::with_detail(v.kind(), v.to_string())
    }
}

/// One named predicate over the scanning view.
#[derive(Debug, Clone, Copy)]
pub struct DocumentCheck {
    pub name: &'static str,
    pub run: fn(&str) -> Result<(), DocumentViolation>,
}

/// Checks in evaluation order. Scheme runs before tag and tag before
/// expression so the most specific violation is reported.
pub const DOCUMENT_CHECKS: &[DocumentCheck] = &[
    DocumentCheck {
        name: "module_directive",
        run: check_module_directive,
    },
    DocumentCheck {
        name: "url_scheme",
        run: check_url_scheme,
    },
    DocumentCheck {
        name: "dangerous_tag",
        run: check_dangerous_tag,
    },
    DocumentCheck {
        name: "expression",
        run: check_expression,
    },
    DocumentCheck {
        name: "event_attribute",
        run: check_event_attribute,
    },
];

static MODULE_DIRECTIVE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(?:import|export)\b").ok());

static URL_SCHEME: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:javascript|vbscript)\s*:|data\s*:\s*(?:text/html|image/svg\+xml|application/xhtml\+xml|text/javascript|application/javascript)",
    )
    .ok()
});

/// Numeric references may omit the semicolon; named ones may not.
static CHARACTER_REFERENCE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"&#(?:0*([0-9]{1,7})|[xX]0*([0-9a-fA-F]{1,6}));?|&([A-Za-z]+);").ok()
});

static DANGEROUS_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)<\s*/?\s*(script|iframe|svg|math|object|embed|form|input|button|select|textarea|style|link|meta)\b",
    )
    .ok()
});

static EXPRESSION: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\{[^{}]*\}").ok());

static EVENT_ATTRIBUTE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\bon[a-z]+\s*=").ok());

/// Gate a document before it is stored or compiled.
///
/// The size ceiling applies to the raw input. Everything after that scans a
/// view with fenced and inline code replaced by a space, so code samples do
/// not trip the checks.
///
/// # Errors
/// The first [`DocumentViolation`] in [`DOCUMENT_CHECKS`] order.
pub fn assert_safe_document(source: &str) -> Result<(), DocumentViolation> {
    let result = run_checks(source);
    if let Err(violation) = &result {
        metrics::record_content_violation(violation.kind());
        tracing::warn!(kind = %violation.kind(), error = %violation, "Document rejected");
    }
    result
}

fn run_checks(source: &str) -> Result<(), DocumentViolation> {
    // Byte length bounds char count from above, so only count when needed.
    if source.len() > MAX_DOCUMENT_CHARS {
        let chars = source.chars().count();
        if chars > MAX_DOCUMENT_CHARS {
            return Err(DocumentViolation::TooLarge {
                chars,
                limit: MAX_DOCUMENT_CHARS,
            });
        }
    }

    let view = scanning_view(source);
    for check in DOCUMENT_CHECKS {
        (check.run)(&view)?;
    }
    Ok(())
}

fn find<'t>(
    pattern: &LazyLock<Option<Regex>>,
    text: &'t str,
    name: &'static str,
    kind: ViolationKind,
) -> Result<Option<regex::Captures<'t>>, DocumentViolation> {
    match pattern.as_ref() {
        Some(regex) => Ok(regex.captures(text)),
        None => {
            tracing::error!(check = name, "Document check pattern failed to compile");
            Err(DocumentViolation::CheckUnavailable(name, kind))
        }
    }
}

pub fn check_module_directive(text: &str) -> Result<(), DocumentViolation> {
    match find(&MODULE_DIRECTIVE, text, "module_directive", ViolationKind::ModuleDirectiveBlocked)? {
        Some(m) => Err(DocumentViolation::ModuleDirective(m[0].trim().to_string())),
        None => Ok(()),
    }
}

/// Runs over the text as a browser would read an attribute value:
/// character references decoded, tabs and line breaks removed.
pub fn check_url_scheme(text: &str) -> Result<(), DocumentViolation> {
    let decoded = decode_for_scheme(text)?;
    match find(&URL_SCHEME, &decoded, "url_scheme", ViolationKind::DisallowedUrlScheme)? {
        Some(m) => Err(DocumentViolation::UrlScheme(m[0].to_ascii_lowercase())),
        None => Ok(()),
    }
}

/// Decode numeric and common named character references once, then drop
/// ASCII control characters. `&amp;#58;` decodes to the literal `&#58;`.
fn decode_for_scheme(text: &str) -> Result<String, DocumentViolation> {
    let Some(pattern) = CHARACTER_REFERENCE.as_ref() else {
        tracing::error!(check = "url_scheme", "Document check pattern failed to compile");
        return Err(DocumentViolation::CheckUnavailable(
            "url_scheme",
            ViolationKind::DisallowedUrlScheme,
        ));
    };

    let decoded = pattern.replace_all(text, |caps: &regex::Captures<'_>| {
        let code = if let Some(dec) = caps.get(1) {
            dec.as_str().parse::<u32>().ok()
        } else if let Some(hex) = caps.get(2) {
            u32::from_str_radix(hex.as_str(), 16).ok()
        } else {
            return caps
                .get(3)
                .and_then(|name| named_reference(name.as_str()))
                .map_or_else(|| caps[0].to_string(), |c| c.to_string());
        };
        code.and_then(char::from_u32)
            .unwrap_or(char::REPLACEMENT_CHARACTER)
            .to_string()
    });

    Ok(decoded.chars().filter(|c| !c.is_ascii_control()).collect())
}

fn named_reference(name: &str) -> Option<char> {
    Some(match name {
        "colon" => ':',
        "Tab" => '\t',
        "NewLine" => '\n',
        "sol" => '/',
        "plus" => '+',
        "period" => '.',
        "comma" => ',',
        "lpar" => '(',
        "rpar" => ')',
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        _ => return None,
    })
}

pub fn check_dangerous_tag(text: &str) -> Result<(), DocumentViolation> {
    match find(&DANGEROUS_TAG, text, "dangerous_tag", ViolationKind::DisallowedTag)? {
        Some(m) => Err(DocumentViolation::Tag(m[1].to_ascii_lowercase())),
        None => Ok(()),
    }
}

pub fn check_expression(text: &str) -> Result<(), DocumentViolation> {
    match find(&EXPRESSION, text, "expression", ViolationKind::DisallowedExpression)? {
        Some(m) => Err(DocumentViolation::Expression(truncate(&m[0], 40))),
        None => Ok(()),
    }
}

pub fn check_event_attribute(text: &str) -> Result<(), DocumentViolation> {
    match find(&EVENT_ATTRIBUTE, text, "event_attribute", ViolationKind::DisallowedEventAttribute)? {
        Some(m) => Err(DocumentViolation::EventAttribute(
            m[0].trim_end_matches(|c: char| c == '=' || c.is_whitespace())
                .to_ascii_lowercase(),
        )),
        None => Ok(()),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Replace fenced code blocks and inline code spans with a single space.
pub fn scanning_view(source: &str) -> String {
    strip_inline_code_per_paragraph(&strip_fences(source))
}

/// Code spans never cross a blank line, so pairing restarts at each one.
fn strip_inline_code_per_paragraph(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut paragraph_start = 0;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        if line.trim().is_empty() {
            out.push_str(&strip_inline_code(&text[paragraph_start..offset]));
            out.push_str(line);
            paragraph_start = offset + line.len();
        }
        offset += line.len();
    }
    out.push_str(&strip_inline_code(&text[paragraph_start..]));
    out
}

/// Opening fence on `line`: the fence char and run length.
fn opening_fence(line: &str) -> Option<(char, usize)> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let fence_char = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let run = rest.len() - rest.trim_start_matches(fence_char).len();
    if run < 3 {
        return None;
    }
    // Backtick fences cannot carry a backtick in their info string.
    if fence_char == '`' && rest[run..].contains('`') {
        return None;
    }
    Some((fence_char, run))
}

fn closes_fence(line: &str, fence_char: char, open_run: usize) -> bool {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return false;
    }
    let rest = &line[indent..];
    let run = rest.len() - rest.trim_start_matches(fence_char).len();
    run >= open_run && rest[run..].trim().is_empty()
}

/// An unclosed fence runs to the end of input.
fn strip_fences(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut open: Option<(char, usize)> = None;

    for line in source.split_inclusive('\n') {
        let ends_with_newline = line.ends_with('\n');
        let content = line.trim_end_matches(['\n', '\r']);

        match open {
            None => match opening_fence(content) {
                Some(fence) => {
                    open = Some(fence);
                    out.push(' ');
                }
                None => out.push_str(line),
            },
            Some((fence_char, run)) => {
                if closes_fence(content, fence_char, run) {
                    open = None;
                    if ends_with_newline {
                        out.push('\n');
                    }
                }
            }
        }
    }
    out
}

/// Inline spans open and close on backtick runs of equal length. An
/// opening run with no matching closer is literal text.
fn strip_inline_code(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut runs: Vec<(usize, usize)> = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'`' {
            let start = i;
            while i < bytes.len() && bytes[i] == b'`' {
                i += 1;
            }
            runs.push((start, i));
        } else {
            i += 1;
        }
    }
    if runs.len() < 2 {
        return text.to_string();
    }

    // For each run length, the ascending indices of runs with that length,
    // plus a cursor that only moves forward.
    let mut by_len: HashMap<usize, (Vec<usize>, usize)> = HashMap::new();
    for (idx, (start, end)) in runs.iter().enumerate() {
        by_len.entry(end - start).or_default().0.push(idx);
    }

    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut idx = 0;
    while idx < runs.len() {
        let (start, end) = runs[idx];
        let closer = by_len.get_mut(&(end - start)).and_then(|(indices, cursor)| {
            while *cursor < indices.len() && indices[*cursor] <= idx {
                *cursor += 1;
            }
            indices.get(*cursor).copied()
        });

        match closer {
            Some(close_idx) => {
                out.push_str(&text[copied..start]);
                out.push(' ');
                copied = runs[close_idx].1;
                idx = close_idx + 1;
            }
            None => idx += 1,
        }
    }
    out.push_str(&text[copied..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(source: &str) -> Option<ViolationKind> {
        assert_safe_document(source).err().map(|v| v.kind())
    }

    #[test]
    fn test_plain_markdown_passes() {
        assert_eq!(kind_of("# Title\n\nHello **world**"), None);
        assert_eq!(kind_of("An important note about exports and imports."), None);
    }

    #[test]
    fn test_each_check_reports_its_kind() {
        assert_eq!(kind_of("import x from 'y'"), Some(ViolationKind::ModuleDirectiveBlocked));
        assert_eq!(kind_of("  export const a = 1"), Some(ViolationKind::ModuleDirectiveBlocked));
        assert_eq!(kind_of("text {1+1} text"), Some(ViolationKind::DisallowedExpression));
        assert_eq!(kind_of("<script>alert(1)</script>"), Some(ViolationKind::DisallowedTag));
        assert_eq!(
            kind_of("<a href='javascript:alert(1)'>x</a>"),
            Some(ViolationKind::DisallowedUrlScheme)
        );
        assert_eq!(kind_of("<p onclick='x()'>"), Some(ViolationKind::DisallowedEventAttribute));
    }

    #[test]
    fn test_size_cap_counts_characters() {
        let big = "a".repeat(MAX_DOCUMENT_CHARS + 1);
        assert_eq!(kind_of(&big), Some(ViolationKind::DocumentTooLarge));

        let at_limit = "a".repeat(MAX_DOCUMENT_CHARS);
        assert_eq!(kind_of(&at_limit), None);

        // Multi-byte characters over the byte limit but under the char limit.
        let wide = "é".repeat(MAX_DOCUMENT_CHARS);
        assert_eq!(kind_of(&wide), None);
    }

    #[test]
    fn test_size_runs_before_stripping() {
        let fenced = format!("```\n{}\n```", "a".repeat(MAX_DOCUMENT_CHARS));
        assert_eq!(kind_of(&fenced), Some(ViolationKind::DocumentTooLarge));
    }

    #[test]
    fn test_fenced_code_is_ignored() {
        assert_eq!(kind_of("Example:\n\n```js\nimport x from 'y'\n```\n\nDone."), None);
        assert_eq!(kind_of("~~~~\n<script>x</script>\n~~~~\n"), None);
    }

    #[test]
    fn test_unclosed_fence_runs_to_end() {
        assert_eq!(kind_of("Intro\n```\nimport x from 'y'\n{a}"), None);
    }

    #[test]
    fn test_shorter_closing_fence_does_not_close() {
        let source = "````\n```\nimport x from 'y'\n````\nimport z from 'w'";
        assert_eq!(kind_of(source), Some(ViolationKind::ModuleDirectiveBlocked));
    }

    #[test]
    fn test_inline_code_is_ignored() {
        assert_eq!(kind_of("Use `{value}` in templates."), None);
        assert_eq!(kind_of("Nested ``a `<script>` b`` span."), None);
    }

    #[test]
    fn test_unmatched_backticks_are_literal() {
        assert_eq!(kind_of("odd ` tick {x}"), Some(ViolationKind::DisallowedExpression));
    }

    #[test]
    fn test_code_spans_do_not_cross_blank_lines() {
        let source = "intro `x\n\n<script>alert(1)</script>\n\nimport x from 'y'\n\n` end";
        assert_eq!(kind_of(source), Some(ViolationKind::ModuleDirectiveBlocked));

        let source = "a `b\n  \t\n<iframe src=x>` c";
        assert_eq!(kind_of(source), Some(ViolationKind::DisallowedTag));

        // A span may still wrap a single line break.
        assert_eq!(kind_of("a `{x}\ny` b"), None);
    }

    #[test]
    fn test_encoded_schemes_are_decoded() {
        for source in [
            "<a href=\"javascript&#58;alert(1)\">x</a>",
            "<a href=\"javascript&#x3A;alert(1)\">x</a>",
            "<a href=\"javascript&#0000058alert(1)\">x</a>",
            "<a href=\"javascript&colon;alert(1)\">x</a>",
            "<a href=\"&#106;avascript:alert(1)\">x</a>",
            "<a href=\"java\tscript:alert(1)\">x</a>",
            "<a href=\"java\r\nscript:alert(1)\">x</a>",
            "<a href=\"java&Tab;script:alert(1)\">x</a>",
            "[x](vbscript&#58;msgbox)",
            "<a href=\"data&colon;text&sol;html,x\">x</a>",
        ] {
            assert_eq!(
                kind_of(source),
                Some(ViolationKind::DisallowedUrlScheme),
                "{source:?}"
            );
        }
    }

    #[test]
    fn test_escaped_references_stay_literal() {
        assert!(check_url_scheme("javascript&amp;#58;alert(1)").is_ok());
        assert!(check_url_scheme("Fish &amp; chips &copy; 2024").is_ok());
        assert!(check_url_scheme("unknown &bogus; ref").is_ok());
    }

    #[test]
    fn test_scheme_reported_before_tag() {
        let source = "<iframe src=\"javascript:alert(1)\"></iframe>";
        assert_eq!(kind_of(source), Some(ViolationKind::DisallowedUrlScheme));
    }

    #[test]
    fn test_tag_reported_before_expression() {
        let err = assert_safe_document("<style>{color:red}</style>").unwrap_err();
        assert_eq!(err, DocumentViolation::Tag("style".into()));
    }

    #[test]
    fn test_scheme_variants() {
        assert!(check_url_scheme("JavaScript :alert(1)").is_err());
        assert!(check_url_scheme("vbscript:msgbox").is_err());
        assert!(check_url_scheme("data:text/html;base64,PHNjcmlwdD4=").is_err());
        assert!(check_url_scheme("data:image/svg+xml,<svg/>").is_err());
        assert!(check_url_scheme("data:image/png;base64,iVBOR").is_ok());
        assert!(check_url_scheme("see https://example.com").is_ok());
    }

    #[test]
    fn test_tag_variants() {
        assert_eq!(check_dangerous_tag("< SVG>"), Err(DocumentViolation::Tag("svg".into())));
        assert_eq!(check_dangerous_tag("</form >"), Err(DocumentViolation::Tag("form".into())));
        assert!(check_dangerous_tag("<scripture>").is_ok());
        assert!(check_dangerous_tag("a < b and c > d").is_ok());
    }

    #[test]
    fn test_event_attribute_variants() {
        assert_eq!(
            check_event_attribute("<img ONERROR = x>"),
            Err(DocumentViolation::EventAttribute("onerror".into()))
        );
        assert!(check_event_attribute("common = ground").is_ok());
        assert!(check_event_attribute("turn on = off").is_ok());
    }

    #[test]
    fn test_check_order_is_stable() {
        let names: Vec<_> = DOCUMENT_CHECKS.iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            ["module_directive", "url_scheme", "dangerous_tag", "expression", "event_attribute"]
        );
    }

    #[test]
    fn test_scanning_view_keeps_surrounding_text() {
        assert_eq!(scanning_view("a `b` c"), "a   c");
        assert_eq!(scanning_view("x\n```\ncode\n```\ny"), "x\n \ny");
    }

    #[test]
    fn test_adversarial_backticks_stay_fast() {
        let source: String = (1..400).map(|n| "`".repeat(n % 37 + 1) + "x").collect();
        let started = std::time::Instant::now();
        let _ = assert_safe_document(&source);
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }
}
