//! Image persistence: the storage collaborator behind the resolver.
//!
//! The resolver only needs three things from storage: save a payload under
//! a fresh unique name, check that a name exists, and map a name to where
//! it lives. [`ImageStore`] is that contract; [`FsImageStore`] is the
//! directory-backed implementation used by the CLI and by default in
//! [`crate::process`].
//!
//! Unique names are `<hint>-<12 hex chars>.<ext>`, the suffix drawn from a
//! v4 UUID. Files are opened with `create_new`, so a name is never written
//! twice even if two saves race on the same suffix.

use crate::error::StorageError;
use crate::pipeline::payload::{strip_data_uri, ImageKind, LENIENT};
use base64::Engine as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Length of the random suffix appended to every stored name.
const SUFFIX_LEN: usize = 12;

/// Attempts before giving up on a name collision.
const MAX_NAME_ATTEMPTS: usize = 4;

/// Storage collaborator used by [`crate::pipeline::images::ImageResolver`].
///
/// Implementations must be safe to call from concurrent page tasks.
pub trait ImageStore: Send + Sync {
    /// Persist `base64_data` and return its new unique name.
    ///
    /// Empty or undecodable data is an `Err`, never a panic.
    fn save(&self, base64_data: &str, mime_type: &str, name_hint: &str)
        -> Result<String, StorageError>;

    /// Whether `unique_name` was stored.
    fn exists(&self, unique_name: &str) -> bool;

    /// Location of `unique_name` (it need not exist).
    fn path_for(&self, unique_name: &str) -> PathBuf;
}

/// Directory-backed [`ImageStore`].
#[derive(Debug, Clone)]
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    /// Open (and create if needed) the storage directory.
    pub fn new<P: AsRef<Path>>(root: P) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ImageStore for FsImageStore {
    fn save(
        &self,
        base64_data: &str,
        mime_type: &str,
        name_hint: &str,
    ) -> Result<String, StorageError> {
        let payload = strip_data_uri(base64_data.trim());
        if payload.is_empty() {
            return Err(StorageError::EmptyPayload);
        }
        let bytes = LENIENT
            .decode(payload.as_bytes())
            .map_err(|e| StorageError::Decode(e.to_string()))?;

        let base = sanitize_hint(name_hint);
        let ext = extension_for_mime(mime_type);

        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = format!("{}-{}.{}", base, random_suffix(), ext);
            let path = self.root.join(&name);
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(file) => {
                    write_or_remove(file, &path, &bytes)?;
                    debug!("Stored image {} ({} bytes)", name, bytes.len());
                    return Ok(name);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StorageError::Write { path, source: e }),
            }
        }

        Err(StorageError::InvalidName(format!("{base}-*.{ext}")))
    }

    fn exists(&self, unique_name: &str) -> bool {
        is_plain_name(unique_name) && self.root.join(unique_name).is_file()
    }

    fn path_for(&self, unique_name: &str) -> PathBuf {
        let file_name = Path::new(unique_name)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_default();
        self.root.join(file_name)
    }
}

/// Write `bytes` to the freshly created file at `path`, deleting the file
/// if the write fails so no partial image is left behind.
fn write_or_remove<W: Write>(mut file: W, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let result = file.write_all(bytes).and_then(|_| file.flush());
    drop(file);
    result.map_err(|e| {
        let _ = std::fs::remove_file(path);
        StorageError::Write {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

/// Reduce a name hint to `[A-Za-z0-9_-]`; empty hints become `image`.
pub fn sanitize_hint(hint: &str) -> String {
    let cleaned: String = hint
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}

/// File extension for a MIME type. Unknown types fall back to their subtype.
pub fn extension_for_mime(mime: &str) -> String {
    if let Some(kind) = ImageKind::from_mime(mime) {
        return kind.extension().to_string();
    }
    let subtype = mime.rsplit('/').next().unwrap_or("");
    let subtype = sanitize_hint(subtype.split('+').next().unwrap_or(""));
    if subtype == "image" {
        "jpg".to_string()
    } else {
        subtype
    }
}

fn random_suffix() -> String {
    let mut hex = uuid::Uuid::new_v4().simple().to_string();
    hex.truncate(SUFFIX_LEN);
    hex
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}
