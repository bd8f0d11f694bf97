//! # edgequake-ocr2md
//!
//! Turn raw OCR page output into clean, self-contained Markdown.
//!
//! ## Why this crate?
//!
//! OCR engines return per-page markdown whose image tags point at ids that
//! only exist inside the OCR response (`![img-0.jpeg](img-0.jpeg)`), next to
//! the images as base64 blobs. Their tables are frequently broken: missing
//! separator rows, ragged column counts, tokenizer debris like `[UNK]:` and
//! `<pad>`. This crate stores the images, points the markdown at stable
//! URLs, rebuilds the tables and can optionally hand each page to an LLM for
//! a final proof-reading pass that never makes things worse.
//!
//! ## Pipeline Overview
//!
//! ```text
//! OCR JSON
//!  │
//!  ├─ 1. Input    read a local file or download from URL
//!  ├─ 2. Images   validate base64, store under unique names, rewrite tags
//!  ├─ 3. Tables   rebuild pipe tables (header, separator, padded rows)
//!  ├─ 4. Refine   optional LLM pass, falls back to step 3 on any failure
//!  └─ 5. Output   per-page markdown + stats, assembled document
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocr2md::{process_file, ProcessingConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProcessingConfig::builder()
//!         .storage_dir("static/temp_images")
//!         .base_url("http://localhost:8001")
//!         .build()?;
//!     let output = process_file("scan.json", &config).await?;
//!     println!("{}", output.markdown());
//!     eprintln!("{} images, {} tables",
//!         output.stats.images_saved,
//!         output.stats.tables_rebuilt);
//!     Ok(())
//! }
//! ```
//!
//! The two deterministic stages are also usable on their own:
//!
//! ```rust
//! use edgequake_ocr2md::pipeline::tables::reconstruct;
//!
//! let fixed = reconstruct("| A | B |\n| 1 | 2 |");
//! assert_eq!(fixed, "| A | B |\n| --- | --- |\n| 1 | 2 |\n");
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-ocr2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod ocr;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod storage;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PageSeparator, ProcessingConfig, ProcessingConfigBuilder};
pub use error::{Ocr2MdError, PageError, RefineError, StorageError};
pub use ocr::{OcrImage, OcrPage, OcrResponse, PageImage};
pub use output::{ProcessedPage, ProcessingOutput, ProcessingStats};
pub use pipeline::images::{ImageResolver, ImageUrlTemplate, ResolveReport, ResolvedPage};
pub use pipeline::refine::{refine_or_fallback, LlmRefiner, MarkdownRefiner, RefineMode, RefineOutcome};
pub use process::{
    process_document, process_file, process_file_sync, process_to_file, rephrase, rephrase_with,
};
pub use progress::{NoopProgressCallback, ProcessingProgressCallback, ProgressCallback};
pub use storage::{FsImageStore, ImageStore};
pub use stream::{process_stream, process_stream_file, PageStream};
