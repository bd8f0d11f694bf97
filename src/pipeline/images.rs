//! Image reference resolution: persist OCR images, rewrite their tags.
//!
//! The OCR engine emits markdown such as `![img-0.jpeg](img-0.jpeg)` next
//! to a list of images keyed by the same id. Those ids mean nothing to a
//! reader of the final document, so for each page we:
//!
//! 1. validate every image payload and persist it under a fresh unique
//!    name via the [`ImageStore`],
//! 2. build a page-scoped map `ocr id → unique name`,
//! 3. rewrite every `![alt](<id>.<jpeg|jpg|png|gif>)` tag whose id is in the
//!    map into `![alt](<base_url><prefix>/<unique name>)`,
//! 4. hand the text to [`crate::pipeline::tables`].
//!
//! A tag whose image was invalid or failed to save is left exactly as the
//! OCR engine wrote it. A visibly dangling reference is preferable to a
//! placeholder that hides what the source document pointed at.

use crate::config::ProcessingConfig;
use crate::ocr::PageImage;
use crate::pipeline::payload::{normalize_payload, sniff_kind};
use crate::pipeline::tables;
use crate::storage::ImageStore;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// `![alt](ref.ext)` where ext is one of the four OCR image extensions.
static RE_OCR_IMAGE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[(.*?)\]\((.*?\.(?:jpeg|jpg|png|gif))\)").unwrap());

/// Builds public URLs for stored images: `{base_url}{path_prefix}/{name}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUrlTemplate {
    base_url: String,
    path_prefix: String,
}

impl ImageUrlTemplate {
    pub fn new(base_url: impl Into<String>, path_prefix: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path_prefix: path_prefix.into(),
        }
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::new(config.base_url.clone(), config.image_path_prefix.clone())
    }

    pub fn url_for(&self, unique_name: &str) -> String {
        format!("{}{}/{}", self.base_url, self.path_prefix, unique_name)
    }
}

/// What happened to a page's images.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Images persisted and present in the reference map.
    pub saved: usize,
    /// Images without an id or payload.
    pub skipped_missing: usize,
    /// Images whose payload is not base64.
    pub skipped_invalid: usize,
    /// Images the store refused.
    pub storage_failures: usize,
    /// Image tags left pointing at an OCR id.
    pub unresolved_tags: usize,
    pub tables_rebuilt: usize,
}

impl ResolveReport {
    pub fn images_skipped(&self) -> usize {
        self.skipped_missing + self.skipped_invalid + self.storage_failures
    }
}

/// Resolver output for one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPage {
    pub markdown: String,
    pub report: ResolveReport,
}

/// Resolves OCR image references for one page at a time.
///
/// Stateless apart from its collaborators; share one instance across
/// concurrent page tasks.
#[derive(Clone)]
pub struct ImageResolver {
    store: Arc<dyn ImageStore>,
    urls: ImageUrlTemplate,
}

impl std::fmt::Debug for ImageResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageResolver")
            .field("store", &"<dyn ImageStore>")
            .field("urls", &self.urls)
            .finish()
    }
}

impl ImageResolver {
    pub fn new(store: Arc<dyn ImageStore>, urls: ImageUrlTemplate) -> Self {
        Self { store, urls }
    }

    /// Resolve image references, then rebuild tables.
    pub fn resolve(&self, markdown: &str, images: &[PageImage], page_index: usize) -> String {
        self.resolve_page(markdown, images, page_index).markdown
    }

    /// [`Self::resolve`] plus a per-page report.
    pub fn resolve_page(
        &self,
        markdown: &str,
        images: &[PageImage],
        page_index: usize,
    ) -> ResolvedPage {
        if markdown.is_empty() {
            return ResolvedPage::default();
        }
        let page_num = page_index.saturating_add(1);

        let mut report = ResolveReport::default();
        let map = self.persist_images(images, page_num, &mut report);

        let (rewritten, unresolved) = self.rewrite_references(markdown, &map, page_num);
        report.unresolved_tags = unresolved;

        let (markdown, tables_rebuilt) = tables::reconstruct_counting(&rewritten);
        report.tables_rebuilt = tables_rebuilt;

        info!(
            "Page {}: images mapped {}, skipped {}, tables rebuilt {}",
            page_num,
            report.saved,
            report.images_skipped(),
            tables_rebuilt
        );
        ResolvedPage { markdown, report }
    }

    /// Validate and store every image; return `ocr id → unique name`.
    fn persist_images(
        &self,
        images: &[PageImage],
        page_num: usize,
        report: &mut ResolveReport,
    ) -> HashMap<String, String> {
        let mut map = HashMap::with_capacity(images.len());

        for image in images {
            if image.source_id.is_empty() || image.payload_base64.is_empty() {
                warn!(
                    "Page {}: skipping image with missing id or payload (id: {:?})",
                    page_num, image.source_id
                );
                report.skipped_missing += 1;
                continue;
            }

            let Some(payload) = normalize_payload(&image.payload_base64) else {
                warn!(
                    "Page {}: invalid base64 for image {}, skipping",
                    page_num, image.source_id
                );
                report.skipped_invalid += 1;
                continue;
            };

            let kind = sniff_kind(&payload);
            let hint = name_hint(&image.source_id);

            match self.store.save(&payload, kind.mime(), hint) {
                Ok(unique_name) => {
                    info!(
                        "Page {}: saved image {} as {}",
                        page_num, image.source_id, unique_name
                    );
                    if map.insert(image.source_id.clone(), unique_name).is_some() {
                        debug!(
                            "Page {}: duplicate image id {}, last one wins",
                            page_num, image.source_id
                        );
                    } else {
                        report.saved += 1;
                    }
                }
                Err(e) => {
                    error!(
                        "Page {}: failed to save image {}: {}",
                        page_num, image.source_id, e
                    );
                    report.storage_failures += 1;
                }
            }
        }

        map
    }

    /// Rewrite mapped tags; returns the text and the number left unresolved.
    fn rewrite_references(
        &self,
        markdown: &str,
        map: &HashMap<String, String>,
        page_num: usize,
    ) -> (String, usize) {
        let mut unresolved = 0usize;
        let rewritten = RE_OCR_IMAGE_TAG.replace_all(markdown, |caps: &Captures<'_>| {
            let alt = &caps[1];
            let reference = &caps[2];
            match map.get(reference) {
                Some(unique_name) => {
                    let url = self.urls.url_for(unique_name);
                    debug!("Page {}: replaced '{}' with '{}'", page_num, reference, url);
                    format!("![{alt}]({url})")
                }
                None => {
                    warn!(
                        "Page {}: image ref '{}' has no saved image, tag kept",
                        page_num, reference
                    );
                    unresolved += 1;
                    caps[0].to_string()
                }
            }
        });
        (rewritten.into_owned(), unresolved)
    }
}

/// OCR id without its trailing `.extension`.
pub fn name_hint(source_id: &str) -> &str {
    match source_id.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => source_id,
    }
}
