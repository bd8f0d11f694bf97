//! Table reconstruction: rebuild malformed GFM pipe-tables from OCR output.
//!
//! OCR markdown tables are usually *almost* right: ragged column counts, a
//! missing or misplaced separator row, tokenizer noise such as `[PAD]`
//! inside cells. A markdown AST parser rejects such input outright, so this
//! module works line-by-line with fixed heuristics instead.
//!
//! ## Shapes that define behaviour
//!
//! - **Candidate row**: the trimmed line contains at least two `|` and both
//!   starts and ends with `|`.
//! - **Block**: a maximal run of consecutive candidate rows. Runs of one
//!   row are not tables and pass through untouched.
//! - **Noise tokens**: `[UNK]:`, `[PAD]`, `<unk>`, `<pad>` are deleted and
//!   `→ T →` collapses to `→`.
//! - **Separator row**: the second surviving row when every cell is made
//!   of `-` and `:` only. It is always regenerated, never copied.
//!
//! The output of [`reconstruct`] is a fixed point:
//! `reconstruct(&reconstruct(x)) == reconstruct(x)`.

use once_cell::sync::Lazy;
use regex::Regex;

const NOISE_TOKENS: [&str; 4] = ["[UNK]:", "[PAD]", "<unk>", "<pad>"];

static RE_ARROW_T: Lazy<Regex> = Lazy::new(|| Regex::new(r"→\s*T\s*→").unwrap());
static RE_PIPE_TRAILING_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\|\s*").unwrap());
static RE_PIPE_LEADING_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\|").unwrap());

/// Column alignment, as written in a separator row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

impl Alignment {
    /// Read the alignment from one separator cell.
    pub fn from_marker(cell: &str) -> Self {
        let cell = cell.trim();
        if cell.starts_with(':') && cell.ends_with(':') {
            Alignment::Center
        } else if cell.ends_with(':') {
            Alignment::Right
        } else {
            Alignment::Left
        }
    }

    /// Canonical separator cell for this alignment.
    pub fn marker(self) -> &'static str {
        match self {
            Alignment::Left => "---",
            Alignment::Center => ":---:",
            Alignment::Right => "---:",
        }
    }
}

/// One table, after row cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBlock {
    pub header: Vec<String>,
    /// Data rows in source order, separator excluded.
    pub rows: Vec<Vec<String>>,
    pub column_count: usize,
    pub alignments: Vec<Alignment>,
}

impl TableBlock {
    /// Build a table from the raw lines of one block.
    ///
    /// Returns `None` when every row is dropped during cleanup.
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Option<Self> {
        let cleaned: Vec<Vec<String>> = lines
            .iter()
            .filter_map(|l| clean_row(l.as_ref()))
            .map(|row| extract_cells(&row))
            .collect();

        let (header, rest) = cleaned.split_first()?;
        let column_count = header.len().max(1);

        let separator = rest.first().filter(|cells| is_separator_cells(cells));
        let alignments = determine_alignments(separator.map(Vec::as_slice), column_count);
        let data = if separator.is_some() { &rest[1..] } else { rest };

        Some(Self {
            header: pad_or_truncate(header.clone(), column_count),
            rows: data
                .iter()
                .map(|cells| touch_up_cells(pad_or_truncate(cells.clone(), column_count)))
                .collect(),
            column_count,
            alignments,
        })
    }

    /// Canonical lines: header, separator, data rows.
    pub fn render(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.rows.len() + 2);
        out.push(format_row(&self.header));
        out.push(format_separator(&self.alignments));
        out.extend(self.rows.iter().map(|r| format_row(r)));
        out
    }
}

/// Rebuild every table block in `markdown`.
pub fn reconstruct(markdown: &str) -> String {
    reconstruct_counting(markdown).0
}

/// [`reconstruct`], also returning how many tables were rebuilt.
pub fn reconstruct_counting(markdown: &str) -> (String, usize) {
    if markdown.is_empty() {
        return (String::new(), 0);
    }

    let lines: Vec<&str> = markdown.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 8);
    let mut tables = 0usize;
    let mut i = 0;

    while i < lines.len() {
        if !is_candidate_row(lines[i]) {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        }

        let start = i;
        while i < lines.len() && is_candidate_row(lines[i]) {
            i += 1;
        }
        let block = &lines[start..i];

        if block.len() < 2 {
            out.extend(block.iter().map(|l| l.to_string()));
            continue;
        }

        let Some(table) = TableBlock::parse(block) else {
            continue;
        };

        if out.last().is_some_and(|l| !l.trim().is_empty()) {
            out.push(String::new());
        }
        out.extend(table.render());
        out.push(String::new());
        // The trailing blank line replaces one blank source line.
        if lines.get(i).is_some_and(|l| l.trim().is_empty()) {
            i += 1;
        }
        tables += 1;
    }

    (out.join("\n"), tables)
}

/// Whether a line may belong to a table block.
pub fn is_candidate_row(line: &str) -> bool {
    let t = line.trim();
    t.matches('|').count() >= 2 && t.starts_with('|') && t.ends_with('|')
}

/// Scrub noise, restore outer pipes, normalise pipe spacing.
///
/// Returns `None` for rows holding nothing but pipes and whitespace.
fn clean_row(raw: &str) -> Option<String> {
    let scrubbed = scrub_noise(raw.trim());
    let mut row = scrubbed.trim().to_string();
    if !row.starts_with('|') {
        row.insert_str(0, "| ");
    }
    if !row.ends_with('|') {
        row.push_str(" |");
    }
    let row = RE_PIPE_TRAILING_WS.replace_all(&row, "| ");
    let row = RE_PIPE_LEADING_WS.replace_all(&row, " |");

    if row.chars().all(|c| c == '|' || c.is_whitespace()) {
        return None;
    }
    Some(row.into_owned())
}

/// Remove noise tokens until none is left (removal can splice a new one).
fn scrub_noise(row: &str) -> String {
    let mut current = row.to_string();
    loop {
        let mut next = current.clone();
        for token in NOISE_TOKENS {
            next = next.replace(token, "");
        }
        let next = RE_ARROW_T.replace_all(&next, "→").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Cells between the outer pipes, trimmed.
fn extract_cells(row: &str) -> Vec<String> {
    let parts: Vec<&str> = row.split('|').collect();
    if parts.len() < 2 {
        return Vec::new();
    }
    parts[1..parts.len() - 1]
        .iter()
        .map(|p| p.trim().to_string())
        .collect()
}

fn is_separator_cells(cells: &[String]) -> bool {
    cells
        .iter()
        .all(|c| c.trim().chars().all(|ch| ch == '-' || ch == ':'))
}

fn determine_alignments(separator: Option<&[String]>, column_count: usize) -> Vec<Alignment> {
    let mut alignments = vec![Alignment::Left; column_count];
    if let Some(cells) = separator {
        for (slot, cell) in alignments.iter_mut().zip(cells) {
            *slot = Alignment::from_marker(cell);
        }
    }
    alignments
}

fn pad_or_truncate(mut cells: Vec<String>, len: usize) -> Vec<String> {
    cells.resize(len, String::new());
    cells
}

/// Data-cell cleanup: a leading `-` becomes a `•` bullet.
fn touch_up_cells(cells: Vec<String>) -> Vec<String> {
    cells
        .into_iter()
        .map(|cell| match cell.trim().strip_prefix('-') {
            Some(rest) => format!("• {}", rest.trim()).trim_end().to_string(),
            None => cell,
        })
        .collect()
}

fn format_row<S: AsRef<str>>(cells: &[S]) -> String {
    let joined: Vec<&str> = cells.iter().map(AsRef::as_ref).collect();
    format!("| {} |", joined.join(" | "))
}

fn format_separator(alignments: &[Alignment]) -> String {
    let markers: Vec<&str> = alignments.iter().map(|a| a.marker()).collect();
    format_row(&markers)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn cell_count(row: &str) -> usize {
        extract_cells(row).len()
    }

    #[test]
    fn pads_short_data_row() {
        let out = reconstruct("| A | B |\n|---|---|\n| 1 |\n");
        assert_eq!(out, "| A | B |\n| --- | --- |\n| 1 |  |\n");
    }

    #[test]
    fn center_alignment_is_preserved() {
        let out = reconstruct("| A | B |\n| --- | :---: |\n| 1 | 2 |");
        let sep = out.lines().nth(1).unwrap();
        assert_eq!(sep, "| --- | :---: |");
        assert_eq!(extract_cells(sep)[1], ":---:");
    }

    #[test]
    fn right_alignment_and_default_left() {
        let out = reconstruct("| A | B | C |\n|--:|:-|\n| 1 | 2 | 3 |");
        assert_eq!(out.lines().nth(1).unwrap(), "| ---: | --- | --- |");
    }

    #[test]
    fn single_row_is_not_a_table() {
        let input = "| just one row |";
        assert_eq!(reconstruct(input), input);
        let input = "text\n  | just one row |  \nmore";
        assert_eq!(reconstruct(input), input);
    }

    #[test]
    fn missing_separator_is_synthesised() {
        let out = reconstruct("| A | B |\n| 1 | 2 |");
        assert_eq!(out, "| A | B |\n| --- | --- |\n| 1 | 2 |\n");
    }

    #[test]
    fn extra_cells_are_truncated() {
        let out = reconstruct("| A | B |\n| 1 | 2 | 3 | 4 |");
        assert!(out.contains("| 1 | 2 |\n"));
        assert!(!out.contains('3'));
    }

    #[test]
    fn every_row_has_column_count_cells() {
        let input = "| H1 | H2 | H3 |\n|:-:|\n| a |\n| a | b | c | d |\n| - x | y |";
        let out = reconstruct(input);
        for line in out.lines().filter(|l| !l.is_empty()) {
            assert_eq!(cell_count(line), 3, "row {line:?}");
        }
    }

    #[test]
    fn noise_tokens_and_arrow_artifacts_are_removed() {
        let out = reconstruct("| [UNK]:Name | <pad>Value[PAD] |\n| a → T → b | <unk>c |");
        assert!(out.contains("| Name | Value |"));
        assert!(out.contains("| a → b | c |"));
        assert!(!out.contains("[PAD]") && !out.contains("<unk>"));
    }

    #[test]
    fn spliced_noise_is_removed_too() {
        let out = reconstruct("| A | B |\n| [UN[PAD]K]: x | y |");
        assert!(out.contains("| x | y |"), "got {out:?}");
    }

    #[test]
    fn empty_rows_are_dropped() {
        let out = reconstruct("| A | B |\n|   |   |\n| 1 | 2 |");
        assert_eq!(out, "| A | B |\n| --- | --- |\n| 1 | 2 |\n");
    }

    #[test]
    fn all_empty_block_emits_nothing() {
        assert_eq!(reconstruct("before\n| | |\n||\nafter"), "before\nafter");
    }

    #[test]
    fn dash_cells_become_bullets_in_data_rows_only() {
        let out = reconstruct("| -Header | B |\n| --- | --- |\n| - item | -  |");
        assert!(out.starts_with("| -Header | B |\n"));
        assert!(out.contains("| • item | • |"), "got {out:?}");
    }

    #[test]
    fn blank_lines_around_table() {
        let out = reconstruct("Intro\n| A | B |\n| 1 | 2 |\nOutro");
        assert_eq!(out, "Intro\n\n| A | B |\n| --- | --- |\n| 1 | 2 |\n\nOutro");

        let out = reconstruct("Intro\n\n| A | B |\n| 1 | 2 |\n\nOutro");
        assert_eq!(out, "Intro\n\n| A | B |\n| --- | --- |\n| 1 | 2 |\n\nOutro");
    }

    #[test]
    fn non_table_lines_pass_through_verbatim() {
        let input = "  - indented list\n    code block\n| not | closed\n";
        assert_eq!(reconstruct(input), input);
    }

    #[test]
    fn tight_pipes_are_spaced() {
        let out = reconstruct("|a|b|\n|-|-|\n|1|2|");
        assert_eq!(out, "| a | b |\n| --- | --- |\n| 1 | 2 |\n");
    }

    #[test]
    fn counts_tables() {
        let input = "| A | B |\n| 1 | 2 |\n\ntext\n\n| C |\n| 3 |\n";
        let (_, n) = reconstruct_counting(input);
        assert_eq!(n, 2);
    }

    #[test]
    fn idempotent_on_assorted_inputs() {
        let inputs = [
            "| A | B |\n|---|---|\n| 1 |\n",
            "text\n| A |B|\n| --- | :-: |\n|1|2|3|\n\n\n\nrest",
            "| [PAD] | x |\n| - a | → T → |\n| | |\n| c |",
            "|---|---|\n|---|---|\n| a | b |",
            "| H |\n| - |\n| -- |\n| - |",
            "no tables at all\n\nstill none",
            "| A | B |\n| 1 | 2 |",
            "\n\n| A | B |\n| 1 | 2 |\n\n",
            "| one |\n",
            "| : |\n| : |\n| x |",
        ];
        for input in inputs {
            let once = reconstruct(input);
            let twice = reconstruct(&once);
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn empty_input() {
        assert_eq!(reconstruct(""), "");
        assert_eq!(reconstruct_counting(""), (String::new(), 0));
    }

    #[test]
    fn table_block_parse_exposes_structure() {
        let t = TableBlock::parse(&["| A | B |", "| :-: | -: |", "| 1 | 2 |"]).unwrap();
        assert_eq!(t.column_count, 2);
        assert_eq!(t.alignments, vec![Alignment::Center, Alignment::Right]);
        assert_eq!(t.header, vec!["A", "B"]);
        assert_eq!(t.rows, vec![vec!["1".to_string(), "2".to_string()]]);
    }
}
