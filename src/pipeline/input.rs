//! Input loading: read an OCR response from a local path or URL.
//!
//! OCR responses are plain JSON, so unlike a rasteriser we never need a
//! file-system path: both sources are read fully into memory and parsed
//! with [`OcrResponse::from_json`]. Parse failures are reported with the
//! input's display name so the user knows which file was malformed.

use crate::error::Ocr2MdError;
use crate::ocr::OcrResponse;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Raw input bytes plus the name used in output and error messages.
#[derive(Debug, Clone)]
pub struct LoadedInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl LoadedInput {
    /// Parse the bytes as an OCR response.
    pub fn parse(&self) -> Result<OcrResponse, Ocr2MdError> {
        OcrResponse::from_json(&self.bytes).map_err(|e| Ocr2MdError::InvalidOcrResponse {
            source_name: self.name.clone(),
            detail: e.to_string(),
        })
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load the input, downloading it when it is a URL.
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<LoadedInput, Ocr2MdError> {
    if input.trim().is_empty() {
        return Err(Ocr2MdError::InvalidInput {
            reason: "no input path or URL given".into(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

async fn read_local(path: &Path) -> Result<LoadedInput, Ocr2MdError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => Ocr2MdError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Ocr2MdError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(LoadedInput {
        name: display_name(path),
        bytes,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<LoadedInput, Ocr2MdError> {
    info!("Downloading OCR response from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Ocr2MdError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            Ocr2MdError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Ocr2MdError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(Ocr2MdError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_send_err)?;
    info!("Downloaded {} bytes", bytes.len());

    Ok(LoadedInput {
        name: filename_from_url(url),
        bytes: bytes.to_vec(),
    })
}

/// File name of a local path, falling back to the full path.
fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Last non-empty URL path segment, or `ocr_response.json`.
pub fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty())
        .unwrap_or_else(|| "ocr_response.json".to_string())
}

/// Output path next to the input: `scan.json` → `scan.md`.
pub fn default_output_path(input: &str) -> PathBuf {
    let name = if is_url(input) {
        filename_from_url(input)
    } else {
        display_name(Path::new(input))
    };
    PathBuf::from(name).with_extension("md")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/scan.json"));
        assert!(is_url("http://example.com/scan.json"));
        assert!(!is_url("/tmp/scan.json"));
        assert!(!is_url("scan.json"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_rules() {
        assert_eq!(filename_from_url("https://h/a/b/scan.json"), "scan.json");
        assert_eq!(filename_from_url("https://h/a/b/"), "ocr_response.json");
        assert_eq!(filename_from_url("not a url"), "ocr_response.json");
    }

    #[test]
    fn default_output_path_swaps_extension() {
        assert_eq!(default_output_path("/data/scan.json"), PathBuf::from("scan.md"));
        assert_eq!(
            default_output_path("https://h/x/notes.json"),
            PathBuf::from("notes.md")
        );
    }

    #[tokio::test]
    async fn missing_file_is_file_not_found() {
        let err = load_input("/definitely/not/here.json", 5).await.unwrap_err();
        assert!(matches!(err, Ocr2MdError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn empty_input_is_invalid() {
        let err = load_input("  ", 5).await.unwrap_err();
        assert!(matches!(err, Ocr2MdError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn reads_and_parses_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.json");
        std::fs::write(&path, br#"{"pages":[{"index":0,"markdown":"hi"}]}"#).unwrap();

        let loaded = load_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(loaded.name, "scan.json");
        let resp = loaded.parse().unwrap();
        assert_eq!(resp.pages[0].markdown, "hi");
    }

    #[test]
    fn malformed_json_names_the_source() {
        let loaded = LoadedInput {
            name: "broken.json".into(),
            bytes: b"{ not json".to_vec(),
        };
        match loaded.parse() {
            Err(Ocr2MdError::InvalidOcrResponse { source_name, .. }) => {
                assert_eq!(source_name, "broken.json")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
