//! OpenAI-compatible chat completions, image generation and the NSFW
//! prompt classifier built on top of them.

use crate::config::OpenAiConfig;
use crate::providers::base::{
    ChatRequest, ImageProvider, LLMProvider, LLMResponse, Message, ProviderMetrics,
    ResponseFormat,
};
use crate::providers::errors::ProviderErrorHandler;
use crate::providers::provider_http_client;
use crate::safety::moderation::{ModerationScope, NSFW_SYSTEM_PROMPT, SafetyClassifier};
use crate::utils::media::extract_image_sources;
use crate::utils::truncate_for_log;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const PROVIDER_NAME: &str = "OpenAI";

const CHAT_IMAGE_INSTRUCTION: &str = "请不要输出任何解释或额外文本，只返回图片结果。\
你可以返回一张或多张图片。\
图片结果格式可为 Markdown 图片、HTML img、直接 URL，或 data:image/...;base64 数据。";

/// Short answers only; the classifier is asked for a one-key JSON object.
const CLASSIFIER_MAX_TOKENS: u32 = 32;

fn record_usage(metrics: &Mutex<ProviderMetrics>, json: &Value) {
    if let Ok(mut m) = metrics.lock() {
        m.request_count += 1;
        if let Some(tokens) = json
            .get("usage")
            .and_then(|u| u.get("total_tokens"))
            .and_then(Value::as_u64)
        {
            m.token_count += tokens;
        }
    }
}

pub struct OpenAiProvider {
    api_key: String,
    default_model: String,
    base_url: String,
    client: Client,
    metrics: Arc<Mutex<ProviderMetrics>>,
}

impl OpenAiProvider {
    pub fn new(config: &OpenAiConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            default_model: config.model.clone(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
            client: provider_http_client(config.request_timeout_secs),
            metrics: Arc::new(Mutex::new(ProviderMetrics::default())),
        }
    }

    fn parse_response(json: &Value) -> Result<LLMResponse> {
        let choice = json["choices"]
            .as_array()
            .and_then(|arr| arr.first())
            .context("No choices in OpenAI response")?;

        let content = choice["message"]["content"]
            .as_str()
            .map(std::string::ToString::to_string);

        Ok(LLMResponse {
            content,
            input_tokens: json["usage"]["prompt_tokens"].as_u64(),
            output_tokens: json["usage"]["completion_tokens"].as_u64(),
        })
    }
}

#[async_trait]
impl LLMProvider for OpenAiProvider {
    async fn chat(&self, req: ChatRequest<'_>) -> Result<LLMResponse> {
        let messages: Vec<Value> = req
            .messages
            .iter()
            .map(|msg| json!({ "role": msg.role, "content": msg.content }))
            .collect();

        let mut payload = json!({
            "model": req.model.unwrap_or(&self.default_model),
            "messages": messages,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
        });
        if req.response_format == Some(ResponseFormat::JsonObject) {
            payload["response_format"] = json!({ "type": "json_object" });
        }

        let api_key = req.api_key.unwrap_or(&self.api_key);
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .context("Failed to send request to OpenAI API")?;

        let json =
            ProviderErrorHandler::check_response(resp, PROVIDER_NAME, "chat", &self.metrics)
                .await?;
        record_usage(&self.metrics, &json);

        Self::parse_response(&json)
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn metrics(&self) -> ProviderMetrics {
        self.metrics
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

/// Image sources in an `images/generations` response: `url` entries as-is,
/// `b64_json` and `base64` payloads as PNG data URIs. First occurrence wins.
pub fn image_sources_from_response(json: &Value) -> Vec<String> {
    let Some(items) = json.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut sources = Vec::new();
    for item in items {
        if let Some(url) = item.get("url").and_then(Value::as_str) {
            let url = url.trim();
            if !url.is_empty() {
                sources.push(url.to_string());
            }
        }
        for key in ["b64_json", "base64"] {
            if let Some(b64) = item.get(key).and_then(Value::as_str) {
                let payload: String = b64.split_whitespace().collect();
                if !payload.is_empty() {
                    sources.push(format!("data:image/png;base64,{}", payload));
                }
            }
        }
    }

    let mut seen = HashSet::new();
    sources.retain(|s| seen.insert(s.clone()));
    sources
}

pub struct OpenAiImageProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
    metrics: Arc<Mutex<ProviderMetrics>>,
    /// When set, images are requested from this chat model instead of the
    /// images endpoint.
    chat_model: Option<Arc<dyn LLMProvider>>,
    max_tokens: u32,
}

impl OpenAiImageProvider {
    pub fn new(config: &OpenAiConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            model: config.image_model.clone(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
            client: provider_http_client(config.request_timeout_secs),
            metrics: Arc::new(Mutex::new(ProviderMetrics::default())),
            chat_model: None,
            max_tokens: config.max_tokens,
        }
    }

    #[must_use]
    pub fn with_chat_model(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.chat_model = Some(provider);
        self
    }

    async fn create_via_chat(
        &self,
        chat: &dyn LLMProvider,
        prompt: &str,
        api_key: Option<&str>,
    ) -> Result<Vec<String>> {
        let request = ChatRequest {
            messages: vec![Message::user(format!(
                "{}\n\n{}",
                CHAT_IMAGE_INSTRUCTION,
                prompt.trim()
            ))],
            model: None,
            api_key,
            max_tokens: self.max_tokens,
            temperature: 0.7,
            response_format: None,
        };
        let response = chat.chat_with_retry(request, None).await?;
        let sources = extract_image_sources(response.content.as_deref().unwrap_or_default());
        info!("image_count(chat model)={}", sources.len());
        Ok(sources)
    }
}

#[async_trait]
impl ImageProvider for OpenAiImageProvider {
    async fn create_images(
        &self,
        prompt: &str,
        n: u32,
        api_key: Option<&str>,
    ) -> Result<Vec<String>> {
        if let Some(chat) = &self.chat_model {
            return self.create_via_chat(chat.as_ref(), prompt, api_key).await;
        }

        info!("image_query={}", truncate_for_log(prompt, 200));
        let resp = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(api_key.unwrap_or(&self.api_key))
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "n": n,
            }))
            .send()
            .await
            .context("Failed to send request to OpenAI images API")?;

        let json =
            ProviderErrorHandler::check_response(resp, PROVIDER_NAME, "image", &self.metrics)
                .await?;
        record_usage(&self.metrics, &json);

        let sources = image_sources_from_response(&json);
        info!("image_count={}", sources.len());
        if let Some(first) = sources.first() {
            debug!("image_source={}", truncate_for_log(first, 200));
        }
        Ok(sources)
    }
}

/// Primary NSFW classifier: one JSON-mode chat completion per attempt.
pub struct OpenAiClassifier {
    provider: Arc<dyn LLMProvider>,
    model: Option<String>,
}

impl OpenAiClassifier {
    pub fn new(provider: Arc<dyn LLMProvider>, model: Option<String>) -> Self {
        Self { provider, model }
    }
}

#[async_trait]
impl SafetyClassifier for OpenAiClassifier {
    async fn classify(&self, prompt: &str, scope: &ModerationScope) -> Result<String> {
        let request = ChatRequest {
            messages: vec![Message::system(NSFW_SYSTEM_PROMPT), Message::user(prompt)],
            model: scope.model().or(self.model.as_deref()),
            api_key: scope.api_key(),
            max_tokens: CLASSIFIER_MAX_TOKENS,
            temperature: 0.0,
            response_format: Some(ResponseFormat::JsonObject),
        };
        // single shot: the moderation schedule owns retries
        let response = self.provider.chat(request).await?;
        response
            .content
            .filter(|c| !c.trim().is_empty())
            .context("classifier returned no content")
    }
}
