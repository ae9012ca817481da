//! Response normalisation: deterministic cleanup of raw oracle replies.
//!
//! Even when told "no code fences, no commentary", models regularly wrap
//! their answer in ` ```tsv … ``` ` or ` ```json … ``` `, prepend a sentence
//! of prose, or emit Windows line endings. This module strips that
//! incidental formatting before parsing and rejects replies that are empty
//! once cleaned.
//!
//! ## Rule Order
//!
//! 1. Normalise line endings (CRLF → LF)
//! 2. Strip invisible Unicode (BOM, zero-width spaces, …)
//! 3. Keep only the inside of the first fenced block, if there is one
//!    (this also drops prose before or after the block)
//! 4. Drop any stray fence-only lines left behind by truncated replies
//! 5. Trim surrounding blank lines and spaces (tabs are kept: a trailing tab
//!    is an empty last column in delimited mode)

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("the model returned an empty response")]
    EmptyResponse,
}

/// Apply all normalisation rules to a raw oracle reply.
pub fn normalize_response(raw: &str) -> Result<String, NormalizeError> {
    let s = normalise_line_endings(raw);
    let s = remove_invisible_chars(&s);
    let s = extract_fenced_body(&s);
    let s = drop_fence_lines(&s);
    let s = trim_outer(&s);

    if s.trim().is_empty() {
        return Err(NormalizeError::EmptyResponse);
    }
    Ok(s.to_string())
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Keep the body of the first fenced block ─────────────────────────
//
// Two fence styles occur in practice:
//
//   ```json\n{...}\n```      language tag on the opening line
//   ```REF1\tName\t...```    inline fence with no newline at all
//
// A word right after the opening backticks only counts as a language tag
// when the line ends there; otherwise it is data (as in the inline case).

static RE_BLOCK_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[ ]*[A-Za-z0-9_+.\-]*[ ]*\n(.*?)```").unwrap());

static RE_INLINE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```(.*?)```").unwrap());

fn extract_fenced_body(input: &str) -> String {
    if let Some(caps) = RE_BLOCK_FENCE.captures(input) {
        return caps[1].to_string();
    }
    if let Some(caps) = RE_INLINE_FENCE.captures(input) {
        return caps[1].to_string();
    }
    input.to_string()
}

// ── Rule 4: Drop stray fence lines ───────────────────────────────────────────

static RE_FENCE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[ ]*```[ ]*[A-Za-z0-9_+.\-]*[ ]*$").unwrap());

fn drop_fence_lines(input: &str) -> String {
    input
        .split('\n')
        .filter(|line| !RE_FENCE_LINE.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Trim surrounding blank lines and spaces ──────────────────────────

fn trim_outer(input: &str) -> &str {
    input.trim_matches(|c: char| c == '\n' || c == ' ')
}

// ── Tests ────────────────────────────────────────────────────────────────────
