use crate::agent::context::{ConversationContext, Reply};
use crate::errors::GatewayError;
use async_trait::async_trait;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProviderMetrics {
    pub request_count: u64,
    pub token_count: u64,
    pub error_count: u64,
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Response format constraint for model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// OpenAI-compatible `{"type": "json_object"}`.
    JsonObject,
}

/// Parameters for one chat completion call.
#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    pub messages: Vec<Message>,
    pub model: Option<&'a str>,
    /// Overrides the provider's configured key for this call.
    pub api_key: Option<&'a str>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub response_format: Option<ResponseFormat>,
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn chat(&self, req: ChatRequest<'_>) -> anyhow::Result<LLMResponse>;

    fn default_model(&self) -> &str;

    fn metrics(&self) -> ProviderMetrics {
        ProviderMetrics::default()
    }

    /// Chat with automatic retry on transient errors.
    async fn chat_with_retry(
        &self,
        req: ChatRequest<'_>,
        retry_config: Option<RetryConfig>,
    ) -> anyhow::Result<LLMResponse> {
        let config = retry_config.unwrap_or_default();
        let mut last_error = None;

        for attempt in 0..=config.max_retries {
            if attempt > 0 {
                warn!(
                    "provider retry attempt {}/{} after error: {}",
                    attempt,
                    config.max_retries,
                    last_error
                        .as_ref()
                        .map(|e: &anyhow::Error| e.to_string())
                        .unwrap_or_default()
                );
            }
            debug!("sending chat request (attempt {})", attempt);
            match self.chat(req.clone()).await {
                Ok(response) => {
                    debug!("chat request succeeded on attempt {}", attempt);
                    return Ok(response);
                }
                Err(e) => {
                    let rate_limit_delay =
                        e.downcast_ref::<GatewayError>().and_then(|ge| match ge {
                            GatewayError::RateLimit { retry_after } => *retry_after,
                            _ => None,
                        });

                    // untyped errors (transport failures) count as transient
                    let is_transient = e
                        .downcast_ref::<GatewayError>()
                        .is_none_or(GatewayError::is_retryable);
                    warn!("chat request failed on attempt {}: {}", attempt, e);
                    if !is_transient {
                        return Err(e);
                    }
                    last_error = Some(e);
                    if attempt < config.max_retries {
                        let delay = if let Some(retry_secs) = rate_limit_delay {
                            debug!("using retry-after hint: {}s", retry_secs);
                            retry_secs * 1000
                        } else {
                            let base = (config.initial_delay_ms as f64
                                * config.backoff_multiplier.powi(attempt as i32))
                            .min(config.max_delay_ms as f64)
                                as u64;
                            // up to 25% jitter
                            let jitter = (base as f64 * 0.25 * fastrand::f64()) as u64;
                            let total = base + jitter;
                            debug!(
                                "waiting {}ms before retry ({}ms base + {}ms jitter)",
                                total, base, jitter
                            );
                            total
                        };
                        tokio::time::sleep(tokio::time::Duration::from_millis(delay)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("All retry attempts failed")))
    }
}

/// Creates images for a prompt, returning URLs or data URIs.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn create_images(
        &self,
        prompt: &str,
        n: u32,
        api_key: Option<&str>,
    ) -> anyhow::Result<Vec<String>>;
}

/// Audio clip produced by a speech provider.
#[derive(Debug, Clone)]
pub struct SpeechClip {
    pub data: Vec<u8>,
    pub mime: String,
}

#[async_trait]
pub trait SpeechProvider: Send + Sync {
    async fn synthesize(&self, text: &str) -> anyhow::Result<SpeechClip>;
}

/// Produces the reply for one conversation context.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate_reply(&self, ctx: &ConversationContext) -> anyhow::Result<Reply>;

    /// Drop any history kept for `session_id`. No-op for stateless generators.
    fn clear_session(&self, _session_id: &str) {}
}

#[cfg(test)]
mod tests;
