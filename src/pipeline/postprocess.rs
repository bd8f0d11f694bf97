//! Deterministic cleanup of LLM replies.
//!
//! Even when told not to, models regularly:
//! - wrap the answer in ` ```markdown ... ``` ` fences
//! - answer with Windows-style `\r\n` line endings
//! - sprinkle zero-width spaces and BOMs copied from their training data
//! - leave trailing spaces and long runs of blank lines
//!
//! [`clean_reply`] undoes those quirks without touching content. It runs on
//! every refinement reply before the fallback checks in
//! [`crate::pipeline::refine`], so an answer that is only fences and
//! whitespace is recognised as empty.
//!
//! ## Rule Order
//!
//! Fences are stripped first (they are anchored to the start and end of the
//! raw reply), line endings are normalised before per-line trimming, and the
//! final outer trim runs last.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw model reply.
///
/// Rules (applied in order):
/// 1. Strip outer markdown fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive blank lines down to 2
/// 6. Trim the whole reply
pub fn clean_reply(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(caps) = RE_OUTER_FENCES.captures(trimmed) {
        return caps[1].to_string();
    }
    // A lone opening or closing fence; any other fence line belongs to a
    // code block in the answer and must stay.
    let fence_lines = trimmed
        .lines()
        .filter(|l| l.trim_start().starts_with("```"))
        .count();
    if fence_lines != 1 {
        return trimmed.to_string();
    }
    let s = trimmed
        .strip_prefix("```markdown\n")
        .or_else(|| trimmed.strip_prefix("```md\n"))
        .or_else(|| trimmed.strip_prefix("```\n"))
        .unwrap_or(trimmed);
    s.strip_suffix("\n```").unwrap_or(s).to_string()
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

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

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fences() {
        let input = "```markdown\n# Hello\nWorld\n```";
        assert_eq!(clean_reply(input), "# Hello\nWorld");
    }

    #[test]
    fn strips_bare_fences() {
        let input = "\n```\n# Hello\nWorld\n```\n";
        assert_eq!(clean_reply(input), "# Hello\nWorld");
    }

    #[test]
    fn strips_unbalanced_fence() {
        assert_eq!(clean_reply("```markdown\n# Hello"), "# Hello");
        assert_eq!(clean_reply("# Hello\n```"), "# Hello");
    }

    #[test]
    fn keeps_trailing_code_block() {
        let input = "Intro text\n\n```python\nprint(1)\n```";
        assert_eq!(clean_reply(input), input);
    }

    #[test]
    fn keeps_leading_code_block() {
        let input = "```\ncode\n```\n\nMore text";
        assert_eq!(clean_reply(input), input);
    }

    #[test]
    fn keeps_lone_language_fence() {
        // Not a wrapper: an opening fence with a language tag and no close.
        let input = "```python\nprint(1)";
        assert_eq!(clean_reply(input), input);
    }

    #[test]
    fn keeps_inner_code_blocks() {
        let input = "Text\n\n```rust\nfn main() {}\n```\n\nMore";
        assert_eq!(clean_reply(input), input);
    }

    #[test]
    fn fence_only_reply_is_empty() {
        assert_eq!(clean_reply("```markdown\n\n```"), "");
        assert_eq!(clean_reply("   \n  "), "");
    }

    #[test]
    fn normalises_crlf_and_invisible_chars() {
        let input = "\u{FEFF}Line one  \r\nLine\u{200B} two\r\n";
        assert_eq!(clean_reply(input), "Line one\nLine two");
    }

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(clean_reply("a\n\n\n\n\n\nb"), "a\n\n\nb");
    }
}
