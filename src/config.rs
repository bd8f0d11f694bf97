//! Configuration types for OCR markdown post-processing.
//!
//! All processing behaviour is controlled through [`ProcessingConfig`],
//! built via its [`ProcessingConfigBuilder`]. Every knob, including where
//! images go and how their URLs look, lives in this one struct and is passed
//! explicitly down the pipeline. Nothing is read from process-wide globals
//! once the config is built.
//!
//! # Design choice: builder over constructor
//! A twenty-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::error::Ocr2MdError;
use crate::pipeline::images::ImageUrlTemplate;
use crate::pipeline::refine::MarkdownRefiner;
use crate::progress::ProcessingProgressCallback;
use crate::storage::ImageStore;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for processing one OCR response.
///
/// Built via [`ProcessingConfig::builder()`] or using
/// [`ProcessingConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_ocr2md::ProcessingConfig;
///
/// let config = ProcessingConfig::builder()
///     .base_url("https://reader.example.org")
///     .storage_dir("/var/lib/ocr2md/images")
///     .concurrency(8)
///     .build()
///     .unwrap();
/// assert_eq!(config.image_path_prefix, "/api/v1/images");
/// ```
#[derive(Clone)]
pub struct ProcessingConfig {
    /// Public origin that serves stored images. Default: `http://localhost:8001`.
    pub base_url: String,

    /// Path under `base_url` where images are served. Default: `/api/v1/images`.
    ///
    /// Always starts with `/` and never ends with one after `build()`.
    pub image_path_prefix: String,

    /// Directory used by the default [`crate::storage::FsImageStore`].
    /// Default: `static/temp_images`. Ignored when `image_store` is set.
    pub storage_dir: PathBuf,

    /// Pre-built image store. Takes precedence over `storage_dir`.
    pub image_store: Option<Arc<dyn ImageStore>>,

    /// Pages processed at once. Default: 4.
    ///
    /// Resolution is disk-bound and refinement network-bound; a handful of
    /// pages in flight keeps both busy without flooding the LLM API.
    pub concurrency: usize,

    /// Run the LLM refinement pass on every page. Default: false.
    pub refine: bool,

    /// Document type given to the refiner as context. Default: `cheatsheet`.
    pub document_type: String,

    /// Pre-built refiner. Takes precedence over every provider setting.
    pub refiner: Option<Arc<dyn MarkdownRefiner>>,

    /// LLM model identifier, e.g. "gemini-2.5-flash". If None, uses the
    /// provider's default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "ollama").
    /// If None along with `provider`, the provider is detected from the
    /// environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for page refinement. Default: 0.1.
    ///
    /// Refinement is correction, not creative writing: a low temperature
    /// keeps the model close to the OCR text.
    pub temperature: f32,

    /// Maximum tokens the refiner may generate per page. Default: 8192.
    pub max_tokens: usize,

    /// Retries after a failed LLM call. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-LLM-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Page separator in assembled output. Default: None.
    pub page_separator: PageSeparator,

    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProcessingProgressCallback>>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            image_path_prefix: "/api/v1/images".to_string(),
            storage_dir: PathBuf::from("static/temp_images"),
            image_store: None,
            concurrency: 4,
            refine: false,
            document_type: "cheatsheet".to_string(),
            refiner: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 8192,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            page_separator: PageSeparator::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ProcessingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingConfig")
            .field("base_url", &self.base_url)
            .field("image_path_prefix", &self.image_path_prefix)
            .field("storage_dir", &self.storage_dir)
            .field("image_store", &self.image_store.as_ref().map(|_| "<dyn ImageStore>"))
            .field("concurrency", &self.concurrency)
            .field("refine", &self.refine)
            .field("document_type", &self.document_type)
            .field("refiner", &self.refiner.as_ref().map(|_| "<dyn MarkdownRefiner>"))
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("page_separator", &self.page_separator)
            .finish()
    }
}

impl ProcessingConfig {
    /// Create a new builder for `ProcessingConfig`.
    pub fn builder() -> ProcessingConfigBuilder {
        ProcessingConfigBuilder {
            config: Self::default(),
        }
    }

    /// URL template for stored images.
    pub fn image_urls(&self) -> ImageUrlTemplate {
        ImageUrlTemplate::from_config(self)
    }
}

/// Builder for [`ProcessingConfig`].
#[derive(Debug)]
pub struct ProcessingConfigBuilder {
    config: ProcessingConfig,
}

impl ProcessingConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn image_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.image_path_prefix = prefix.into();
        self
    }

    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.storage_dir = dir.into();
        self
    }

    pub fn image_store(mut self, store: Arc<dyn ImageStore>) -> Self {
        self.config.image_store = Some(store);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn refine(mut self, v: bool) -> Self {
        self.config.refine = v;
        self
    }

    pub fn document_type(mut self, kind: impl Into<String>) -> Self {
        self.config.document_type = kind.into();
        self
    }

    /// Use `refiner` for page refinement. Implies `refine(true)`.
    pub fn refiner(mut self, refiner: Arc<dyn MarkdownRefiner>) -> Self {
        self.config.refiner = Some(refiner);
        self.config.refine = true;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn ProcessingProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating and normalising URL parts.
    pub fn build(mut self) -> Result<ProcessingConfig, Ocr2MdError> {
        let c = &mut self.config;

        c.base_url = c.base_url.trim().trim_end_matches('/').to_string();
        if c.base_url.is_empty() {
            return Err(Ocr2MdError::InvalidConfig("base_url must not be empty".into()));
        }

        let prefix = c.image_path_prefix.trim().trim_matches('/');
        c.image_path_prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("/{prefix}")
        };

        if c.concurrency == 0 {
            return Err(Ocr2MdError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.max_tokens == 0 {
            return Err(Ocr2MdError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(Ocr2MdError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.document_type.trim().is_empty() {
            c.document_type = ProcessingConfig::default().document_type;
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How to separate pages in the assembled Markdown output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// No separator; pages joined with "\n\n". (default)
    #[default]
    None,
    /// Horizontal rule: "\n\n---\n\n"
    HorizontalRule,
    /// HTML comment with page number: "<!-- page N -->"
    Comment,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator string for the given page number (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}
