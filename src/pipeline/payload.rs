//! Image payloads: base64 normalisation, validation and MIME sniffing.
//!
//! OCR engines hand back images as base64 strings that are frequently
//! wrapped in a data-URI, broken across lines, or simply truncated. The
//! helpers here turn such a string into a clean base64 payload (or reject
//! it) and guess the image type from its first characters.
//!
//! ## Why sniff on base64 text instead of decoded bytes?
//!
//! The leading bytes of every common image format map to a fixed base64
//! prefix (`\xFF\xD8\xFF` → `/9j/`, `\x89PNG` → `iVBOR`, …). Matching the
//! text is enough to name the file extension and costs nothing. It is a
//! heuristic: unknown prefixes fall back to JPEG rather than failing.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use tracing::debug;

/// Characters of the payload decoded to decide whether it is base64.
const VALIDATION_PREFIX_CHARS: usize = 20;

/// Data-URI marker; everything up to and including the last one is dropped.
const DATA_URI_MARKER: &str = "base64,";

/// Standard alphabet, tolerant of missing padding and non-zero trailing bits.
pub(crate) const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Image type inferred from a base64 payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Pdf,
    Svg,
    Webp,
}

/// Ordered prefix table. First match wins.
const SIGNATURES: &[(&str, ImageKind)] = &[
    ("/9j/", ImageKind::Jpeg),
    ("iVBOR", ImageKind::Png),
    ("R0lGOD", ImageKind::Gif),
    ("Qk0", ImageKind::Bmp),
    ("JVBERi0", ImageKind::Pdf),
    ("UEs", ImageKind::Svg),
    ("PHN2", ImageKind::Svg),
    ("UklGR", ImageKind::Webp),
];

impl ImageKind {
    pub fn mime(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::Gif => "image/gif",
            ImageKind::Bmp => "image/bmp",
            ImageKind::Pdf => "application/pdf",
            ImageKind::Svg => "image/svg+xml",
            ImageKind::Webp => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
            ImageKind::Gif => "gif",
            ImageKind::Bmp => "bmp",
            ImageKind::Pdf => "pdf",
            ImageKind::Svg => "svg",
            ImageKind::Webp => "webp",
        }
    }

    /// Reverse lookup used by storage backends that only receive a MIME string.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        [
            ImageKind::Jpeg,
            ImageKind::Png,
            ImageKind::Gif,
            ImageKind::Bmp,
            ImageKind::Pdf,
            ImageKind::Svg,
            ImageKind::Webp,
        ]
        .into_iter()
        .find(|k| k.mime() == mime)
    }
}

/// Guess the image type from the leading characters of a base64 payload.
///
/// Never fails: anything unrecognised (including garbage) is JPEG.
pub fn sniff_kind(payload: &str) -> ImageKind {
    let payload = payload.trim_start();
    SIGNATURES
        .iter()
        .find(|(prefix, _)| payload.starts_with(prefix))
        .map(|(_, kind)| *kind)
        .unwrap_or(ImageKind::Jpeg)
}

/// Strip everything up to and including the last `base64,` marker.
pub fn strip_data_uri(payload: &str) -> &str {
    match payload.rfind(DATA_URI_MARKER) {
        Some(pos) => &payload[pos + DATA_URI_MARKER.len()..],
        None => payload,
    }
}

/// Normalise and validate an OCR base64 payload.
///
/// 1. remove all whitespace
/// 2. drop a data-URI prefix
/// 3. decode the first 20 characters (padded with `=` to a multiple of 4)
///
/// Returns `None` when the result is empty or the prefix does not decode.
pub fn normalize_payload(raw: &str) -> Option<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let cleaned = strip_data_uri(&compact);
    if cleaned.is_empty() {
        return None;
    }

    let mut probe: String = cleaned.chars().take(VALIDATION_PREFIX_CHARS).collect();
    while probe.len() % 4 != 0 {
        probe.push('=');
    }

    match LENIENT.decode(probe.as_bytes()) {
        Ok(_) => Some(cleaned.to_string()),
        Err(e) => {
            debug!("Rejected base64 payload prefix {:?}: {}", probe, e);
            None
        }
    }
}
