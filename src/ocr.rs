//! OCR engine output as consumed by the pipeline.
//!
//! The OCR engine returns one JSON document for the whole PDF: a list of
//! pages, each carrying the page markdown and the images it extracted.
//! Image tags in that markdown reference the images by their OCR id
//! (`![img-0.jpeg](img-0.jpeg)`), which is what [`crate::pipeline::images`]
//! rewrites.
//!
//! The payload is treated as a partially trusted source: every field that
//! the pipeline can live without is optional or defaulted, and unknown
//! fields (dimensions, bounding boxes, usage info) are ignored.

use serde::{Deserialize, Serialize};

/// Full OCR response for one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrResponse {
    #[serde(default)]
    pub pages: Vec<OcrPage>,
}

/// One OCR page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrPage {
    /// 0-based page index assigned by the OCR engine.
    pub index: usize,
    #[serde(default)]
    pub markdown: String,
    #[serde(default)]
    pub images: Vec<OcrImage>,
}

/// One image record as emitted by the OCR engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrImage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "base64")]
    pub image_base64: Option<String>,
}

/// An image candidate handed to the resolver.
///
/// Missing OCR fields become empty strings; the resolver skips those.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageImage {
    pub source_id: String,
    pub payload_base64: String,
}

impl PageImage {
    pub fn new(source_id: impl Into<String>, payload_base64: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            payload_base64: payload_base64.into(),
        }
    }
}

impl From<&OcrImage> for PageImage {
    fn from(img: &OcrImage) -> Self {
        Self {
            source_id: img.id.clone().unwrap_or_default(),
            payload_base64: img.image_base64.clone().unwrap_or_default(),
        }
    }
}

impl OcrPage {
    /// 1-based page number used in logs and output.
    pub fn page_number(&self) -> usize {
        self.index.saturating_add(1)
    }

    pub fn page_images(&self) -> Vec<PageImage> {
        self.images.iter().map(PageImage::from).collect()
    }
}

impl OcrResponse {
    /// Parse an OCR response from raw JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
