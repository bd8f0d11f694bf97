//! Streaming processing API: emit pages as they complete.
//!
//! ## Why stream?
//!
//! Refinement makes a page take seconds. A stream lets callers show partial
//! results immediately, drive progress reporting, or write pages out
//! incrementally instead of waiting for the whole document.
//!
//! Unlike the eager [`crate::process::process_document`], which returns
//! only after all pages finish, [`process_stream`] yields each page as soon
//! as it is done. Pages may arrive out of order (sort by `page_number` if
//! order matters). A page that could not be processed arrives as its
//! [`PageError`]; build a placeholder with
//! [`crate::output::ProcessedPage::failed`] if you need one.

use crate::config::ProcessingConfig;
use crate::error::{Ocr2MdError, PageError};
use crate::ocr::OcrResponse;
use crate::output::ProcessedPage;
use crate::pipeline::input;
use crate::process::{process_page, PageContext};
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of page results.
pub type PageStream = Pin<Box<dyn Stream<Item = Result<ProcessedPage, PageError>> + Send>>;

/// Process an OCR response, streaming pages as they are ready.
///
/// # Returns
/// - `Ok(PageStream)`: a stream of `Result<ProcessedPage, PageError>`
/// - `Err(Ocr2MdError)`: fatal error (no pages, storage unavailable)
pub fn process_stream(
    response: OcrResponse,
    config: &ProcessingConfig,
) -> Result<PageStream, Ocr2MdError> {
    let total_pages = response.pages.len();
    if total_pages == 0 {
        return Err(Ocr2MdError::NoPages);
    }
    info!("Starting streaming processing: {} pages", total_pages);

    let ctx = Arc::new(PageContext::from_config(config, total_pages)?);

    let s = stream::iter(response.pages.into_iter().map(move |page| {
        let ctx = Arc::clone(&ctx);
        async move {
            let mut result = process_page(ctx, page).await;
            match result.error.take() {
                None => Ok(result),
                Some(err) => Err(err),
            }
        }
    }))
    .buffer_unordered(config.concurrency);

    Ok(Box::pin(s))
}

/// Load an OCR response from a path or URL and stream its pages.
pub async fn process_stream_file(
    input_str: impl AsRef<str>,
    config: &ProcessingConfig,
) -> Result<PageStream, Ocr2MdError> {
    let loaded = input::load_input(input_str.as_ref(), config.download_timeout_secs).await?;
    process_stream(loaded.parse()?, config)
}
