//! Deterministic cleanup of the extractor's findings text.
//!
//! The findings are fed back into the resolver prompt, so model quirks from
//! the first call (wrapping the answer in code fences, CRLF line endings,
//! zero-width characters copied from the document, long runs of blank
//! lines) are removed first. Content is never rewritten.
//!
//! The resolver's own response is *not* cleaned here: the line parser works
//! on it directly and only trims surrounding whitespace.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules in order.
///
/// 1. Strip outer code fences (```` ``` ````, ```` ```text ````, ...)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Remove invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive blank lines down to 1
/// 6. Trim the whole text
pub fn clean_findings(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ──────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse blank-line runs ─────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}
