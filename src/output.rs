//! Result types returned by the processing entry points.
//!
//! Everything here is plain data and serialises to JSON. The CLI's `--json`
//! flag prints a [`ProcessingOutput`] directly; the per-page
//! `page_number` / `markdown_content` field names are what downstream
//! readers of the job result already expect.

use crate::config::PageSeparator;
use crate::error::PageError;
use serde::{Deserialize, Serialize};

/// One processed page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessedPage {
    /// 1-based page number.
    pub page_number: usize,
    /// Final markdown: resolved, reconstructed and (maybe) refined.
    pub markdown_content: String,
    pub images_saved: usize,
    /// Images dropped for a missing id, bad payload or storage failure.
    pub images_skipped: usize,
    /// Image tags left pointing at an OCR id.
    pub images_unresolved: usize,
    pub tables_rebuilt: usize,
    /// Whether `markdown_content` came from the refiner.
    pub refined: bool,
    /// Why a refinement result was rejected, if one was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refine_fallback: Option<String>,
    /// Set when the page could not be processed; `markdown_content` then
    /// holds a placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PageError>,
}

impl ProcessedPage {
    /// Placeholder page shown in place of one that failed.
    pub fn failed(page_number: usize, error: PageError) -> Self {
        Self {
            page_number,
            markdown_content: placeholder(page_number),
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Body of a page that failed.
pub fn placeholder(page_number: usize) -> String {
    format!(
        "*Error processing page {}: There was a problem extracting content from this page.*",
        page_number
    )
}

/// Aggregate numbers for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub total_pages: usize,
    pub processed_pages: usize,
    pub failed_pages: usize,
    pub images_saved: usize,
    /// Images dropped before or during storage.
    pub images_skipped: usize,
    pub tables_rebuilt: usize,
    pub refined_pages: usize,
    /// Pages where refinement ran but the unrefined markdown was kept.
    pub refine_fallbacks: usize,
    pub total_duration_ms: u64,
}

/// Everything produced for one OCR response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingOutput {
    pub file_name: String,
    pub total_pages: usize,
    /// Sorted by `page_number`.
    pub pages: Vec<ProcessedPage>,
    pub stats: ProcessingStats,
}

impl ProcessingOutput {
    /// All pages joined with `separator`, placeholders included.
    pub fn markdown_with(&self, separator: &PageSeparator) -> String {
        let mut out = String::new();
        for (i, page) in self.pages.iter().enumerate() {
            if i > 0 {
                out.push_str(&separator.render(page.page_number));
            }
            out.push_str(page.markdown_content.trim_end_matches('\n'));
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    /// All pages joined with blank lines.
    pub fn markdown(&self) -> String {
        self.markdown_with(&PageSeparator::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: usize, md: &str) -> ProcessedPage {
        ProcessedPage {
            page_number: n,
            markdown_content: md.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn markdown_joins_pages() {
        let out = ProcessingOutput {
            pages: vec![page(1, "# One\n"), page(2, "Two")],
            ..Default::default()
        };
        assert_eq!(out.markdown(), "# One\n\nTwo\n");
        assert_eq!(
            out.markdown_with(&PageSeparator::Comment),
            "# One\n\n<!-- page 2 -->\n\nTwo\n"
        );
    }

    #[test]
    fn empty_output_is_empty_markdown() {
        assert_eq!(ProcessingOutput::default().markdown(), "");
    }

    #[test]
    fn failed_page_carries_placeholder() {
        let p = ProcessedPage::failed(
            4,
            PageError::ProcessingFailed {
                page: 4,
                detail: "boom".into(),
            },
        );
        assert!(!p.is_ok());
        assert_eq!(
            p.markdown_content,
            "*Error processing page 4: There was a problem extracting content from this page.*"
        );
    }

    #[test]
    fn json_uses_result_field_names() {
        let json = serde_json::to_value(page(1, "x")).unwrap();
        assert_eq!(json["page_number"], 1);
        assert_eq!(json["markdown_content"], "x");
        assert!(json.get("error").is_none());
    }
}
