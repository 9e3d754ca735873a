//! DashScope text-to-speech.

use crate::config::DashScopeConfig;
use crate::errors::GatewayError;
use crate::providers::base::{ProviderMetrics, SpeechClip, SpeechProvider};
use crate::providers::errors::ProviderErrorHandler;
use crate::providers::provider_http_client;
use crate::utils::http::{DEFAULT_MAX_BODY_BYTES, download};
use crate::utils::media::{audio_mime, guess_audio_extension};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tracing::info;

const PROVIDER_NAME: &str = "DashScope";
const TTS_PATH: &str = "/api/v1/services/aigc/multimodal-generation/generation";
const TTS_TIMEOUT_SECS: u64 = 180;

pub struct DashScopeSpeech {
    config: DashScopeConfig,
    client: Client,
    metrics: Arc<Mutex<ProviderMetrics>>,
}

impl DashScopeSpeech {
    pub fn new(config: DashScopeConfig) -> Self {
        Self {
            config,
            client: provider_http_client(TTS_TIMEOUT_SECS),
            metrics: Arc::new(Mutex::new(ProviderMetrics::default())),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), TTS_PATH)
    }

    pub fn metrics(&self) -> ProviderMetrics {
        self.metrics
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

fn audio_url(json: &Value) -> Option<&str> {
    json.pointer("/output/audio/url")
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
}

#[async_trait]
impl SpeechProvider for DashScopeSpeech {
    async fn synthesize(&self, text: &str) -> Result<SpeechClip> {
        if self.config.api_key.is_empty() {
            return Err(GatewayError::Config("providers.dashscope.apiKey is not set".into()).into());
        }

        let payload = json!({
            "model": self.config.tts_model,
            "input": {
                "text": text,
                "voice": self.config.voice,
                "language_type": self.config.language_type,
            },
        });
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .context("Failed to send request to DashScope API")?;
        let json = ProviderErrorHandler::check_response(resp, PROVIDER_NAME, "tts", &self.metrics)
            .await?;
        if let Ok(mut m) = self.metrics.lock() {
            m.request_count += 1;
        }

        let url = audio_url(&json).ok_or_else(|| GatewayError::Provider {
            message: format!("DashScope TTS response has no audio url: {}", json),
            retryable: false,
        })?;
        let audio = download(&self.client, url, DEFAULT_MAX_BODY_BYTES)
            .await
            .context("download synthesized audio")?;

        let ext = guess_audio_extension(audio.content_type.as_deref(), &audio.bytes);
        info!(
            "tts success, model={}, voice={}, format={}, bytes={}",
            self.config.tts_model,
            self.config.voice,
            ext,
            audio.bytes.len()
        );
        Ok(SpeechClip {
            data: audio.bytes,
            mime: audio_mime(ext).to_string(),
        })
    }
}

#[cfg(test)]
mod tests;
