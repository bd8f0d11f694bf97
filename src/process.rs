//! Eager (full-document) processing entry points.
//!
//! ## Why eager vs. streaming?
//!
//! This module provides the simpler API: wait for all pages, then return.
//! It collects every [`ProcessedPage`] into memory, sorted by page number,
//! with aggregate [`ProcessingStats`]. Use [`crate::stream::process_stream`]
//! instead when you want pages as soon as they are done.
//!
//! ## Per-page flow
//!
//! ```text
//! OcrPage ──▶ resolve images ──▶ rebuild tables ──▶ refine? ──▶ ProcessedPage
//!             (spawn_blocking: disk writes)          (best-effort, falls back)
//! ```
//!
//! A page that cannot be processed becomes a placeholder with a
//! [`PageError`]; the only document-level failures are unreadable input,
//! an OCR response without pages and an unusable image store.

use crate::config::ProcessingConfig;
use crate::error::{Ocr2MdError, PageError};
use crate::ocr::{OcrPage, OcrResponse};
use crate::output::{ProcessedPage, ProcessingOutput, ProcessingStats};
use crate::pipeline::images::ImageResolver;
use crate::pipeline::input;
use crate::pipeline::llm::resolve_provider;
use crate::pipeline::refine::{refine_or_fallback, LlmRefiner, MarkdownRefiner, RefineMode};
use crate::progress::ProgressCallback;
use crate::storage::{FsImageStore, ImageStore};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Process an already-parsed OCR response.
///
/// # Returns
/// `Ok(ProcessingOutput)` even if some pages failed
/// (check `output.stats.failed_pages`).
///
/// # Errors
/// - [`Ocr2MdError::NoPages`] when the response has no pages
/// - [`Ocr2MdError::StorageUnavailable`] when the storage directory
///   cannot be created
pub async fn process_document(
    response: OcrResponse,
    file_name: &str,
    config: &ProcessingConfig,
) -> Result<ProcessingOutput, Ocr2MdError> {
    let start = Instant::now();
    let total_pages = response.pages.len();
    if total_pages == 0 {
        return Err(Ocr2MdError::NoPages);
    }
    info!("Processing '{}': {} pages", file_name, total_pages);

    let ctx = Arc::new(PageContext::from_config(config, total_pages)?);

    if let Some(ref cb) = config.progress_callback {
        cb.on_processing_start(total_pages);
    }

    let mut pages: Vec<ProcessedPage> = stream::iter(
        response
            .pages
            .into_iter()
            .map(|page| process_page(Arc::clone(&ctx), page)),
    )
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    pages.sort_by_key(|p| p.page_number);

    let mut stats = aggregate_stats(&pages);
    stats.total_duration_ms = start.elapsed().as_millis() as u64;

    info!(
        "Processing complete: {}/{} pages, {} images, {} tables, {}ms",
        stats.processed_pages,
        total_pages,
        stats.images_saved,
        stats.tables_rebuilt,
        stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_processing_complete(total_pages, stats.processed_pages);
    }

    Ok(ProcessingOutput {
        file_name: file_name.to_string(),
        total_pages,
        pages,
        stats,
    })
}

/// Load an OCR response from a local path or URL and process it.
pub async fn process_file(
    input_str: impl AsRef<str>,
    config: &ProcessingConfig,
) -> Result<ProcessingOutput, Ocr2MdError> {
    let input_str = input_str.as_ref();
    info!("Starting processing: {}", input_str);

    let loaded = input::load_input(input_str, config.download_timeout_secs).await?;
    let response = loaded.parse()?;
    process_document(response, &loaded.name, config).await
}

/// Process an input and write the assembled markdown to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn process_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ProcessingConfig,
) -> Result<ProcessingStats, Ocr2MdError> {
    let output = process_file(input_str, config).await?;
    let path = output_path.as_ref();
    let markdown = output.markdown_with(&config.page_separator);
    write_atomic(path, &markdown).await?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`process_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_file_sync(
    input_str: impl AsRef<str>,
    config: &ProcessingConfig,
) -> Result<ProcessingOutput, Ocr2MdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Ocr2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_file(input_str, config))
}

/// Rewrite `text` with an LLM: summarize, simplify, de-jargon or refine.
///
/// Unlike page refinement this is strict: the caller asked for the rewrite,
/// so provider failures are returned instead of silently echoing `text`.
///
/// # Errors
/// - [`Ocr2MdError::InvalidInput`] for empty text
/// - [`Ocr2MdError::ProviderNotConfigured`] when no provider is available
/// - [`Ocr2MdError::LlmApiError`] when the provider call fails
pub async fn rephrase(
    text: &str,
    mode: RefineMode,
    context: &str,
    config: &ProcessingConfig,
) -> Result<String, Ocr2MdError> {
    ensure_text(text)?;
    let provider = resolve_provider(config)?;
    let refiner = LlmRefiner::new(provider, mode, config);
    rephrase_with(&refiner, text, context).await
}

/// [`rephrase`] with a caller-supplied refiner.
pub async fn rephrase_with(
    refiner: &dyn MarkdownRefiner,
    text: &str,
    context: &str,
) -> Result<String, Ocr2MdError> {
    ensure_text(text)?;
    let rewritten = refiner
        .refine(text, context)
        .await
        .map_err(|e| Ocr2MdError::LlmApiError {
            message: e.to_string(),
        })?;
    if rewritten.trim().is_empty() {
        return Err(Ocr2MdError::LlmApiError {
            message: "provider returned an empty response".into(),
        });
    }
    Ok(rewritten)
}

fn ensure_text(text: &str) -> Result<(), Ocr2MdError> {
    if text.trim().is_empty() {
        return Err(Ocr2MdError::InvalidInput {
            reason: "text to rephrase is empty".into(),
        });
    }
    Ok(())
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Shared, read-only state for every page task of one document.
pub(crate) struct PageContext {
    resolver: ImageResolver,
    refiner: Option<Arc<dyn MarkdownRefiner>>,
    document_type: String,
    callback: Option<ProgressCallback>,
    total_pages: usize,
}

impl PageContext {
    pub(crate) fn from_config(
        config: &ProcessingConfig,
        total_pages: usize,
    ) -> Result<Self, Ocr2MdError> {
        Ok(Self {
            resolver: ImageResolver::new(image_store(config)?, config.image_urls()),
            refiner: page_refiner(config),
            document_type: config.document_type.clone(),
            callback: config.progress_callback.clone(),
            total_pages,
        })
    }
}

/// The configured store, or a directory store at `storage_dir`.
fn image_store(config: &ProcessingConfig) -> Result<Arc<dyn ImageStore>, Ocr2MdError> {
    if let Some(ref store) = config.image_store {
        return Ok(Arc::clone(store));
    }
    let store = FsImageStore::new(&config.storage_dir).map_err(|e| {
        Ocr2MdError::StorageUnavailable {
            path: config.storage_dir.clone(),
            source: e,
        }
    })?;
    debug!("Storing images in {}", store.root().display());
    Ok(Arc::new(store))
}

/// Refiner for page refinement, or `None` when refinement is off or no
/// provider can be resolved.
fn page_refiner(config: &ProcessingConfig) -> Option<Arc<dyn MarkdownRefiner>> {
    if !config.refine {
        return None;
    }
    if let Some(ref refiner) = config.refiner {
        return Some(Arc::clone(refiner));
    }
    match resolve_provider(config) {
        Ok(provider) => Some(Arc::new(LlmRefiner::for_pages(provider, config))),
        Err(e) => {
            warn!("Refinement requested but no LLM provider is available, skipping: {}", e);
            None
        }
    }
}

/// Resolve, reconstruct and (optionally) refine one page. Never fails.
pub(crate) async fn process_page(ctx: Arc<PageContext>, page: OcrPage) -> ProcessedPage {
    let page_num = page.page_number();
    if let Some(ref cb) = ctx.callback {
        cb.on_page_start(page_num, ctx.total_pages);
    }

    let resolver = ctx.resolver.clone();
    let images = page.page_images();
    let index = page.index;
    let markdown = page.markdown;
    let joined =
        tokio::task::spawn_blocking(move || resolver.resolve_page(&markdown, &images, index)).await;

    let resolved = match joined {
        Ok(resolved) => resolved,
        Err(e) => {
            error!("Page {}: processing task failed: {}", page_num, e);
            let err = PageError::ProcessingFailed {
                page: page_num,
                detail: e.to_string(),
            };
            if let Some(ref cb) = ctx.callback {
                cb.on_page_error(page_num, ctx.total_pages, &err.to_string());
            }
            return ProcessedPage::failed(page_num, err);
        }
    };

    let report = resolved.report;
    let mut result = ProcessedPage {
        page_number: page_num,
        images_saved: report.saved,
        images_skipped: report.images_skipped(),
        images_unresolved: report.unresolved_tags,
        tables_rebuilt: report.tables_rebuilt,
        ..Default::default()
    };

    match ctx.refiner {
        Some(ref refiner) => {
            let label = format!("Page {}", page_num);
            let outcome =
                refine_or_fallback(refiner.as_ref(), &resolved.markdown, &ctx.document_type, &label)
                    .await;
            if let Some(ref reason) = outcome.fallback {
                if let Some(ref cb) = ctx.callback {
                    cb.on_refine_fallback(page_num, &reason.to_string());
                }
                result.refine_fallback = Some(reason.to_string());
            }
            result.refined = outcome.refined;
            result.markdown_content = outcome.markdown;
        }
        None => result.markdown_content = resolved.markdown,
    }

    if let Some(ref cb) = ctx.callback {
        cb.on_page_complete(page_num, ctx.total_pages, result.markdown_content.len());
    }
    result
}

fn aggregate_stats(pages: &[ProcessedPage]) -> ProcessingStats {
    ProcessingStats {
        total_pages: pages.len(),
        processed_pages: pages.iter().filter(|p| p.is_ok()).count(),
        failed_pages: pages.iter().filter(|p| !p.is_ok()).count(),
        images_saved: pages.iter().map(|p| p.images_saved).sum(),
        images_skipped: pages.iter().map(|p| p.images_skipped).sum(),
        tables_rebuilt: pages.iter().map(|p| p.tables_rebuilt).sum(),
        refined_pages: pages.iter().filter(|p| p.refined).count(),
        refine_fallbacks: pages.iter().filter(|p| p.refine_fallback.is_some()).count(),
        total_duration_ms: 0,
    }
}

/// Write `contents` to `path` via a sibling temp file and rename.
async fn write_atomic(path: &Path, contents: &str) -> Result<(), Ocr2MdError> {
    let write_err = |e| Ocr2MdError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, contents).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}
