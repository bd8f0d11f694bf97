//! Optional LLM refinement with mandatory fallback.
//!
//! Refinement is best-effort. The pipeline's output must never be worse
//! than its deterministic result because a model misbehaved, so callers go
//! through [`refine_or_fallback`], which only substitutes the refined text
//! when it is non-empty and keeps every image tag. Anything else (provider
//! error, timeout, empty answer, dropped images) returns the input.
//!
//! [`MarkdownRefiner`] is the capability seam: [`LlmRefiner`] implements it
//! over an `edgequake_llm` provider, tests implement it with mocks, and
//! library users can plug in anything else through
//! [`crate::config::ProcessingConfigBuilder::refiner`].

use crate::config::ProcessingConfig;
use crate::error::RefineError;
use crate::pipeline::llm::{build_options, chat_with_retry, RetryPolicy};
use crate::pipeline::postprocess::clean_reply;
use crate::prompts;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, LLMProvider};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Something that rewrites markdown.
///
/// `context` is the document type, e.g. `"cheatsheet"`.
#[async_trait]
pub trait MarkdownRefiner: Send + Sync {
    async fn refine(&self, markdown: &str, context: &str) -> Result<String, RefineError>;
}

/// What a refinement pass is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefineMode {
    /// Fix OCR errors and markdown structure, keep content. (default)
    #[default]
    Refine,
    /// Shorten to the key points.
    Summarize,
    /// Explain in very simple terms.
    Eli5,
    /// Rewrite for a general audience.
    RemoveJargon,
}

impl RefineMode {
    pub fn system_prompt(self) -> &'static str {
        match self {
            RefineMode::Refine => prompts::REFINE_SYSTEM_PROMPT,
            RefineMode::Summarize => prompts::SUMMARIZE_SYSTEM_PROMPT,
            RefineMode::Eli5 => prompts::ELI5_SYSTEM_PROMPT,
            RefineMode::RemoveJargon => prompts::REMOVE_JARGON_SYSTEM_PROMPT,
        }
    }

    fn answer_label(self) -> &'static str {
        match self {
            RefineMode::Refine => "Corrected Markdown",
            RefineMode::Summarize => "Summarized Content",
            RefineMode::Eli5 => "Explanation for a 5-year-old",
            RefineMode::RemoveJargon => "Jargon-Free Content",
        }
    }

    /// Sampling temperature tuned per mode.
    pub fn default_temperature(self) -> f32 {
        match self {
            RefineMode::Refine => 0.1,
            RefineMode::Summarize => 0.3,
            RefineMode::Eli5 => 0.4,
            RefineMode::RemoveJargon => 0.2,
        }
    }

    pub fn default_max_tokens(self) -> usize {
        match self {
            RefineMode::Refine => 8192,
            RefineMode::Summarize | RefineMode::Eli5 => 3072,
            RefineMode::RemoveJargon => 4096,
        }
    }
}

impl fmt::Display for RefineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RefineMode::Refine => "refine",
            RefineMode::Summarize => "summarize",
            RefineMode::Eli5 => "eli5",
            RefineMode::RemoveJargon => "remove_jargon",
        };
        f.write_str(s)
    }
}

impl FromStr for RefineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "refine" => Ok(RefineMode::Refine),
            "summarize" | "summarise" | "summary" => Ok(RefineMode::Summarize),
            "eli5" => Ok(RefineMode::Eli5),
            "remove_jargon" | "jargon" => Ok(RefineMode::RemoveJargon),
            other => Err(format!(
                "unknown mode '{other}' (expected refine, summarize, eli5 or remove_jargon)"
            )),
        }
    }
}

/// [`MarkdownRefiner`] backed by an LLM provider.
#[derive(Clone)]
pub struct LlmRefiner {
    provider: Arc<dyn LLMProvider>,
    mode: RefineMode,
    temperature: f32,
    max_tokens: usize,
    policy: RetryPolicy,
}

impl fmt::Debug for LlmRefiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmRefiner")
            .field("provider", &"<dyn LLMProvider>")
            .field("mode", &self.mode)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("policy", &self.policy)
            .finish()
    }
}

impl LlmRefiner {
    /// Refiner with the mode's own sampling settings and the config's retry policy.
    pub fn new(provider: Arc<dyn LLMProvider>, mode: RefineMode, config: &ProcessingConfig) -> Self {
        Self {
            provider,
            mode,
            temperature: mode.default_temperature(),
            max_tokens: mode.default_max_tokens(),
            policy: RetryPolicy::from_config(config),
        }
    }

    /// Page refinement: sampling comes from the config.
    pub fn for_pages(provider: Arc<dyn LLMProvider>, config: &ProcessingConfig) -> Self {
        Self::new(provider, RefineMode::Refine, config)
            .with_sampling(config.temperature, config.max_tokens)
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn mode(&self) -> RefineMode {
        self.mode
    }

    fn messages(&self, markdown: &str, context: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(prompts::with_context(self.mode.system_prompt(), context)),
            ChatMessage::user(prompts::content_message(markdown, self.mode.answer_label())),
        ]
    }
}

#[async_trait]
impl MarkdownRefiner for LlmRefiner {
    async fn refine(&self, markdown: &str, context: &str) -> Result<String, RefineError> {
        if markdown.trim().is_empty() {
            return Ok(String::new());
        }
        info!(
            "Running {} pass (content length: {})",
            self.mode,
            markdown.len()
        );

        let messages = self.messages(markdown, context);
        let options = build_options(self.temperature, self.max_tokens);
        let label = format!("{} pass", self.mode);
        let reply = chat_with_retry(&self.provider, &messages, &options, self.policy, &label).await?;

        let cleaned = clean_reply(&reply.content);
        if cleaned.is_empty() {
            return Err(RefineError::EmptyResponse);
        }
        debug!(
            "{} pass: {} chars in, {} chars out, {} retries",
            self.mode,
            markdown.len(),
            cleaned.len(),
            reply.retries
        );
        Ok(cleaned)
    }
}

/// Result of [`refine_or_fallback`].
#[derive(Debug, Clone)]
pub struct RefineOutcome {
    pub markdown: String,
    /// `true` when `markdown` is the refiner's output.
    pub refined: bool,
    /// Why the input was kept, when the refiner was called and rejected.
    pub fallback: Option<RefineError>,
}

impl RefineOutcome {
    fn unchanged(markdown: &str) -> Self {
        Self {
            markdown: markdown.to_string(),
            refined: false,
            fallback: None,
        }
    }

    pub fn fell_back(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Number of `![` image openers in `markdown`.
pub fn count_image_tags(markdown: &str) -> usize {
    markdown.matches("![").count()
}

/// Run `refiner`, keeping `markdown` whenever the result is unusable.
///
/// Empty input short-circuits without calling the refiner.
pub async fn refine_or_fallback(
    refiner: &dyn MarkdownRefiner,
    markdown: &str,
    context: &str,
    label: &str,
) -> RefineOutcome {
    if markdown.trim().is_empty() {
        return RefineOutcome::unchanged(markdown);
    }

    let rejected = match refiner.refine(markdown, context).await {
        Ok(refined) if refined.trim().is_empty() => RefineError::EmptyResponse,
        Ok(refined) => {
            let before = count_image_tags(markdown);
            let after = count_image_tags(&refined);
            if after < before {
                RefineError::ImagesDropped { before, after }
            } else {
                info!("{}: refinement applied ({} image tags kept)", label, after);
                return RefineOutcome {
                    markdown: refined,
                    refined: true,
                    fallback: None,
                };
            }
        }
        Err(e) => e,
    };

    warn!("{}: keeping unrefined markdown: {}", label, rejected);
    RefineOutcome {
        markdown: markdown.to_string(),
        refined: false,
        fallback: Some(rejected),
    }
}
