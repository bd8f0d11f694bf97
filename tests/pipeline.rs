//! Integration tests for edgequake-ocr2md.
//!
//! Everything here runs offline: images go to a temp directory and LLM
//! refinement is driven by in-process `MarkdownRefiner` doubles.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use async_trait::async_trait;
use edgequake_ocr2md::pipeline::tables::reconstruct;
use edgequake_ocr2md::{
    process_document, process_file, process_stream, FsImageStore, ImageResolver, ImageStore,
    ImageUrlTemplate, MarkdownRefiner, OcrResponse, PageImage, PageSeparator,
    ProcessingConfig, ProcessingProgressCallback, RefineError,
};
use futures::StreamExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

// ── Fixtures ─────────────────────────────────────────────────────────────────

/// Route library logs to the test harness (shown with `--nocapture`).
/// `RUST_LOG` overrides the default `warn` level.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

const PNG_1X1: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

/// A two-page OCR response: an image plus a broken table on page 1,
/// an undecodable image on page 2.
fn fixture_json() -> String {
    format!(
        r#"{{
  "pages": [
    {{
      "index": 0,
      "markdown": "Intro\n\n![img-0.png](img-0.png)\n\n| Name | Score |\n| Ann | 10 |\n| Bob | 7 | extra |",
      "images": [{{ "id": "img-0.png", "image_base64": "data:image/png;base64,{PNG_1X1}" }}]
    }},
    {{
      "index": 1,
      "markdown": "See ![fig](img-1.jpeg) below.",
      "images": [{{ "id": "img-1.jpeg", "image_base64": "!!not base64!!" }}]
    }}
  ]
}}"#
    )
}

fn fixture() -> OcrResponse {
    init_tracing();
    OcrResponse::from_json(fixture_json().as_bytes()).expect("fixture parses")
}

fn config(storage: &Path) -> ProcessingConfig {
    ProcessingConfig::builder()
        .storage_dir(storage)
        .base_url("https://reader.example.org/")
        .build()
        .unwrap()
}

struct Uppercase;

#[async_trait]
impl MarkdownRefiner for Uppercase {
    async fn refine(&self, markdown: &str, _context: &str) -> Result<String, RefineError> {
        Ok(markdown.to_uppercase())
    }
}

/// Returns a fixed reply, losing every image tag.
struct DropsImages;

#[async_trait]
impl MarkdownRefiner for DropsImages {
    async fn refine(&self, _markdown: &str, _context: &str) -> Result<String, RefineError> {
        Ok("A tidy page without pictures.".to_string())
    }
}

/// Records the context string it is called with.
#[derive(Default)]
struct ContextSpy {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl MarkdownRefiner for ContextSpy {
    async fn refine(&self, markdown: &str, context: &str) -> Result<String, RefineError> {
        self.seen.lock().unwrap().push(context.to_string());
        Ok(markdown.to_string())
    }
}

#[derive(Default)]
struct CountingProgress {
    started: AtomicUsize,
    completed: AtomicUsize,
    fallbacks: AtomicUsize,
    finished: AtomicUsize,
}

impl ProcessingProgressCallback for CountingProgress {
    fn on_processing_start(&self, _total_pages: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_page_complete(&self, _page_num: usize, _total: usize, _markdown_len: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_refine_fallback(&self, _page_num: usize, _reason: &str) {
        self.fallbacks.fetch_add(1, Ordering::SeqCst);
    }
    fn on_processing_complete(&self, _total_pages: usize, _success_count: usize) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Deterministic pipeline ───────────────────────────────────────────────────

#[tokio::test]
async fn resolves_images_and_rebuilds_tables() {
    let dir = tempfile::tempdir().unwrap();
    let out = process_document(fixture(), "scan.json", &config(dir.path()))
        .await
        .unwrap();

    assert_eq!(out.total_pages, 2);
    assert_eq!(out.stats.processed_pages, 2);
    assert_eq!(out.stats.images_saved, 1);
    assert_eq!(out.stats.images_skipped, 1);
    assert_eq!(out.stats.tables_rebuilt, 1);

    let first = &out.pages[0].markdown_content;
    assert!(first.contains("![img-0.png](https://reader.example.org/api/v1/images/img-0-"));
    assert!(!first.contains("(img-0.png)"));
    assert!(first.contains("| Name | Score |\n| --- | --- |\n| Ann | 10 |\n| Bob | 7 |"));

    // The undecodable image keeps its original tag.
    assert_eq!(out.pages[1].markdown_content, "See ![fig](img-1.jpeg) below.");
    assert_eq!(out.pages[1].images_unresolved, 1);
}

#[tokio::test]
async fn stored_image_matches_its_url() {
    let dir = tempfile::tempdir().unwrap();
    let out = process_document(fixture(), "scan.json", &config(dir.path()))
        .await
        .unwrap();

    let stored: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(stored.len(), 1);
    let name = &stored[0];
    assert!(name.starts_with("img-0-") && name.ends_with(".png"), "{name}");
    assert!(out.pages[0]
        .markdown_content
        .contains(&format!("https://reader.example.org/api/v1/images/{name})")));

    let store = FsImageStore::new(dir.path()).unwrap();
    assert!(store.exists(name));
}

#[tokio::test]
async fn every_run_stores_fresh_names() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let a = process_document(fixture(), "scan.json", &cfg).await.unwrap();
    let b = process_document(fixture(), "scan.json", &cfg).await.unwrap();

    assert_ne!(a.pages[0].markdown_content, b.pages[0].markdown_content);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[tokio::test]
async fn assembled_markdown_uses_separator() {
    let dir = tempfile::tempdir().unwrap();
    let out = process_document(fixture(), "scan.json", &config(dir.path()))
        .await
        .unwrap();

    let md = out.markdown_with(&PageSeparator::Comment);
    assert!(md.contains("\n\n<!-- page 2 -->\n\nSee ![fig]"));
    assert!(md.ends_with('\n'));
}

#[tokio::test]
async fn process_file_reads_local_json() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.json");
    std::fs::write(&input, fixture_json()).unwrap();

    let out = process_file(input.to_str().unwrap(), &config(&dir.path().join("img")))
        .await
        .unwrap();
    assert_eq!(out.file_name, "scan.json");
    assert_eq!(out.stats.images_saved, 1);
}

#[tokio::test]
async fn process_file_rejects_malformed_json() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.json");
    std::fs::write(&input, b"{ not json").unwrap();

    let err = process_file(input.to_str().unwrap(), &config(dir.path()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        edgequake_ocr2md::Ocr2MdError::InvalidOcrResponse { .. }
    ));
}

#[tokio::test]
async fn out_of_range_page_index_stays_one_page() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let json = format!(
        r#"{{"pages":[{{"index":{},"markdown":"| a | b |\n| 1 | 2 |"}},{{"index":0,"markdown":"ok"}}]}}"#,
        usize::MAX
    );
    let response = OcrResponse::from_json(json.as_bytes()).unwrap();

    let out = process_document(response, "scan.json", &config(dir.path()))
        .await
        .unwrap();
    assert_eq!(out.stats.processed_pages, 2);
    assert_eq!(out.pages[1].page_number, usize::MAX);
    assert!(out.pages[1].markdown_content.contains("| --- | --- |"));
}

// ── Refinement ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn refinement_keeps_image_urls() {
    let dir = tempfile::tempdir().unwrap();
    let progress = Arc::new(CountingProgress::default());
    let cfg = ProcessingConfig::builder()
        .storage_dir(dir.path())
        .refiner(Arc::new(Uppercase))
        .progress_callback(progress.clone())
        .build()
        .unwrap();

    let out = process_document(fixture(), "scan.json", &cfg).await.unwrap();

    assert_eq!(out.stats.refined_pages, 2);
    assert!(out.pages[1].markdown_content.starts_with("SEE ![FIG]"));
    assert_eq!(progress.started.load(Ordering::SeqCst), 1);
    assert_eq!(progress.completed.load(Ordering::SeqCst), 2);
    assert_eq!(progress.fallbacks.load(Ordering::SeqCst), 0);
    assert_eq!(progress.finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn refinement_that_drops_images_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let progress = Arc::new(CountingProgress::default());
    let cfg = ProcessingConfig::builder()
        .storage_dir(dir.path())
        .refiner(Arc::new(DropsImages))
        .progress_callback(progress.clone())
        .build()
        .unwrap();

    let out = process_document(fixture(), "scan.json", &cfg).await.unwrap();

    // Both pages carry an image tag, so both keep the deterministic text.
    for page in &out.pages {
        assert!(!page.refined);
        assert!(page.markdown_content.contains("!["));
        assert!(page
            .refine_fallback
            .as_deref()
            .is_some_and(|r| r.contains("image")));
    }
    assert_eq!(out.stats.refine_fallbacks, 2);
    assert_eq!(progress.fallbacks.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn refiner_receives_document_type() {
    let dir = tempfile::tempdir().unwrap();
    let spy = Arc::new(ContextSpy::default());
    let cfg = ProcessingConfig::builder()
        .storage_dir(dir.path())
        .document_type("lab report")
        .refiner(spy.clone())
        .build()
        .unwrap();

    process_document(fixture(), "scan.json", &cfg).await.unwrap();

    let seen = spy.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|c| c == "lab report"));
}

// ── Streaming ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_yields_all_pages() {
    let dir = tempfile::tempdir().unwrap();
    let stream = process_stream(fixture(), &config(dir.path())).unwrap();
    let mut numbers: Vec<usize> = stream
        .map(|r| r.expect("page succeeds").page_number)
        .collect()
        .await;
    numbers.sort_unstable();
    assert_eq!(numbers, vec![1, 2]);
}

// ── Stage properties ─────────────────────────────────────────────────────────

#[test]
fn resolver_ignores_foreign_references() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn ImageStore> = Arc::new(FsImageStore::new(dir.path()).unwrap());
    let resolver = ImageResolver::new(store, ImageUrlTemplate::new("http://h", "/i"));

    let md = "![a](https://example.org/a.png) and ![b](img-9.png)";
    let images = vec![PageImage::new("img-0.png", PNG_1X1)];
    let out = resolver.resolve_page(md, &images, 0);

    assert_eq!(out.markdown, md);
    assert_eq!(out.report.saved, 1);
    assert_eq!(out.report.unresolved_tags, 2);
}

#[test]
fn reconstruction_is_idempotent() {
    let inputs = [
        "| a | b |\n| 1 | 2 | 3 |\n\nafter",
        "text\n| [UNK]: x | <pad> y |\n|---|:-:|\n| 1 |",
        "| only | header |",
        "no tables here\n\njust prose",
    ];
    for input in inputs {
        let once = reconstruct(input);
        assert_eq!(reconstruct(&once), once, "input: {input:?}");
    }
}

#[test]
fn reconstructed_rows_share_header_width() {
    let out = reconstruct("| a | b | c |\n| 1 |\n| 1 | 2 | 3 | 4 |");
    let widths: Vec<usize> = out
        .lines()
        .filter(|l| l.starts_with('|'))
        .map(|l| l.matches('|').count())
        .collect();
    assert!(widths.iter().all(|&w| w == 4), "{out}");
}
