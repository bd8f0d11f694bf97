//! LLM plumbing: provider resolution and chat calls with retry.
//!
//! This module is intentionally thin. Prompt text lives in
//! [`crate::prompts`] and the refinement rules (fence stripping, fallback)
//! live in [`crate::pipeline::refine`], so neither has to touch retry or
//! timeout handling here.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent when
//! several pages are refined at once. Exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`) spreads the retries out: with a
//! 500 ms base and 2 retries the waits are 500 ms then 1 s. Every call is
//! also bounded by `api_timeout_secs`; a timed-out call counts as a failed
//! attempt.

use crate::config::ProcessingConfig;
use crate::error::{Ocr2MdError, RefineError};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Model used with a named provider when none is configured.
const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1-nano";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Retry and timeout knobs for one chat call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub timeout_secs: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_ms: config.retry_backoff_ms,
            timeout_secs: config.api_timeout_secs,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u64.saturating_pow(attempt - 1);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

/// A successful provider reply.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    /// 0 when the first attempt succeeded.
    pub retries: u32,
}

/// Send `messages` to `provider`, retrying transient failures.
///
/// `label` only appears in logs (e.g. `"Page 3"`).
pub async fn chat_with_retry(
    provider: &Arc<dyn LLMProvider>,
    messages: &[ChatMessage],
    options: &CompletionOptions,
    policy: RetryPolicy,
    label: &str,
) -> Result<ChatReply, RefineError> {
    let start = Instant::now();
    let mut last_err: Option<RefineError> = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let backoff = policy.backoff(attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                label,
                attempt,
                policy.max_retries,
                backoff.as_millis()
            );
            sleep(backoff).await;
        }

        let call = provider.chat(messages, Some(options));
        match timeout(Duration::from_secs(policy.timeout_secs), call).await {
            Ok(Ok(response)) => {
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    label,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                return Ok(ChatReply {
                    content: response.content,
                    prompt_tokens: response.prompt_tokens,
                    completion_tokens: response.completion_tokens,
                    retries: attempt,
                });
            }
            Ok(Err(e)) => {
                warn!("{}: attempt {} failed: {}", label, attempt + 1, e);
                last_err = Some(RefineError::Provider {
                    attempts: attempt + 1,
                    detail: e.to_string(),
                });
            }
            Err(_) => {
                warn!(
                    "{}: attempt {} timed out after {}s",
                    label,
                    attempt + 1,
                    policy.timeout_secs
                );
                last_err = Some(RefineError::Timeout {
                    secs: policy.timeout_secs,
                });
            }
        }
    }

    Err(last_err.unwrap_or(RefineError::EmptyResponse))
}

/// `CompletionOptions` for one call.
pub fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

/// Default model for a named provider.
pub fn default_model(provider_name: &str) -> &'static str {
    match provider_name.to_ascii_lowercase().as_str() {
        "gemini" | "google" | "vertex" | "vertexai" => DEFAULT_GEMINI_MODEL,
        _ => DEFAULT_OPENAI_MODEL,
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Ocr2MdError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Ocr2MdError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **Gemini key** (`GEMINI_API_KEY` or `GOOGLE_API_KEY`). Refinement was
///    tuned against Gemini, so a Google key wins over auto-detection.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &ProcessingConfig) -> Result<Arc<dyn LLMProvider>, Ocr2MdError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or_else(|| default_model(name));
        return create_provider(name, model);
    }

    if let (Some(prov), Some(model)) = (
        non_empty_env("EDGEQUAKE_LLM_PROVIDER"),
        non_empty_env("EDGEQUAKE_MODEL"),
    ) {
        return create_provider(&prov, &model);
    }

    if non_empty_env("GEMINI_API_KEY").is_some() || non_empty_env("GOOGLE_API_KEY").is_some() {
        let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
        info!("Using Gemini provider ({}) for refinement", model);
        return create_provider("gemini", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Ocr2MdError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_sets_sampling() {
        let opts = build_options(0.1, 8192);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(8192));
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy {
            max_retries: 3,
            backoff_ms: 500,
            timeout_secs: 10,
        };
        assert_eq!(p.backoff(0), Duration::ZERO);
        assert_eq!(p.backoff(1), Duration::from_millis(500));
        assert_eq!(p.backoff(2), Duration::from_millis(1000));
        assert_eq!(p.backoff(3), Duration::from_millis(2000));
    }

    #[test]
    fn backoff_saturates() {
        let p = RetryPolicy {
            max_retries: 100,
            backoff_ms: u64::MAX / 2,
            timeout_secs: 1,
        };
        assert_eq!(p.backoff(80), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn policy_from_default_config() {
        let p = RetryPolicy::from_config(&ProcessingConfig::default());
        assert_eq!(p.max_retries, 2);
        assert_eq!(p.backoff_ms, 500);
        assert_eq!(p.timeout_secs, 120);
    }

    #[test]
    fn default_model_per_provider() {
        assert_eq!(default_model("gemini"), DEFAULT_GEMINI_MODEL);
        assert_eq!(default_model("Google"), DEFAULT_GEMINI_MODEL);
        assert_eq!(default_model("openai"), DEFAULT_OPENAI_MODEL);
    }
}
