//! Error types for the edgequake-ocr2md library.
//!
//! Four error types, one per failure boundary:
//!
//! * [`Ocr2MdError`]: **Fatal**: the document cannot be processed at all
//!   (unreadable input, OCR response without pages, storage directory not
//!   writable). Returned as `Err(Ocr2MdError)` from the top-level
//!   `process*` functions.
//!
//! * [`PageError`]: **Non-fatal**: a single page failed, every other page
//!   is fine. Stored inside [`crate::output::ProcessedPage`].
//!
//! * [`StorageError`]: returned by an [`crate::storage::ImageStore`] when
//!   an image cannot be persisted. The resolver logs it and leaves the
//!   markdown reference untouched.
//!
//! * [`RefineError`]: returned by a [`crate::pipeline::refine::MarkdownRefiner`].
//!   Page processing always falls back to the unrefined markdown.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-ocr2md library.
#[derive(Debug, Error)]
pub enum Ocr2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("OCR response file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The caller supplied input that cannot be processed.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The input was read but is not a well-formed OCR response.
    #[error("'{source_name}' is not a valid OCR response: {detail}")]
    InvalidOcrResponse { source_name: String, detail: String },

    /// The OCR engine returned a response with zero pages.
    #[error("OCR response did not contain any pages")]
    NoPages,

    // ── Storage errors ────────────────────────────────────────────────────
    /// The image storage directory could not be created.
    #[error("Image storage directory '{path}' is unavailable: {source}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error for a strict (non-fallback) request.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The page still appears in the output with a placeholder body so readers
/// can see which page is missing.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Image resolution / table reconstruction did not complete.
    #[error("Page {page}: processing failed: {detail}")]
    ProcessingFailed { page: usize, detail: String },
}

/// Failure to persist one image.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Nothing to save.
    #[error("image payload is empty")]
    EmptyPayload,

    /// The payload is not decodable base64.
    #[error("image payload is not valid base64: {0}")]
    Decode(String),

    /// A name that would escape the storage directory.
    #[error("invalid image name '{0}'")]
    InvalidName(String),

    /// Writing the image file failed.
    #[error("failed to write image '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a refinement call.
#[derive(Debug, Clone, Error)]
pub enum RefineError {
    /// The provider returned an error after all retries.
    #[error("provider call failed after {attempts} attempt(s): {detail}")]
    Provider { attempts: u32, detail: String },

    /// The provider did not answer within the configured timeout.
    #[error("provider call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The provider answered with nothing usable.
    #[error("provider returned an empty response")]
    EmptyResponse,

    /// The refined text has fewer image tags than the input.
    #[error("refined markdown dropped image tags ({before} before, {after} after)")]
    ImagesDropped { before: usize, after: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_pages_display() {
        assert_eq!(
            Ocr2MdError::NoPages.to_string(),
            "OCR response did not contain any pages"
        );
    }

    #[test]
    fn invalid_ocr_response_display() {
        let e = Ocr2MdError::InvalidOcrResponse {
            source_name: "scan.json".into(),
            detail: "missing field `pages`".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("scan.json"), "got: {msg}");
        assert!(msg.contains("pages"), "got: {msg}");
    }

    #[test]
    fn page_error_display() {
        let e = PageError::ProcessingFailed {
            page: 3,
            detail: "task panicked".into(),
        };
        assert_eq!(e.to_string(), "Page 3: processing failed: task panicked");
    }

    #[test]
    fn storage_write_keeps_source() {
        use std::error::Error as _;
        let e = StorageError::Write {
            path: PathBuf::from("/tmp/x.jpg"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        assert!(e.to_string().contains("/tmp/x.jpg"));
        assert!(e.source().is_some());
    }

    #[test]
    fn images_dropped_display() {
        let e = RefineError::ImagesDropped {
            before: 3,
            after: 1,
        };
        assert!(e.to_string().contains("3 before, 1 after"));
    }
}
