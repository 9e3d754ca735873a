use serde::{Deserialize, Serialize};

/// OpenAI-compatible endpoint used for chat, image generation and moderation.
#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default, rename = "apiKey")]
    pub api_key: String,
    #[serde(default = "default_openai_base", rename = "apiBase")]
    pub api_base: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_image_model", rename = "imageModel")]
    pub image_model: String,
    /// Ask the chat model for images instead of calling the images endpoint.
    #[serde(default, rename = "imageCreateUseChatModel")]
    pub image_create_use_chat_model: bool,
    #[serde(default = "default_request_timeout", rename = "requestTimeoutSecs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens", rename = "maxTokens")]
    pub max_tokens: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_openai_base(),
            model: default_chat_model(),
            image_model: default_image_model(),
            image_create_use_chat_model: false,
            request_timeout_secs: default_request_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

redact_debug!(
    OpenAiConfig,
    redact(api_key),
    api_base,
    model,
    image_model,
    image_create_use_chat_model,
    request_timeout_secs,
    temperature,
    max_tokens,
);

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_image_model() -> String {
    "dall-e-2".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

/// DashScope text-to-speech.
#[derive(Clone, Serialize, Deserialize)]
pub struct DashScopeConfig {
    #[serde(default, rename = "apiKey")]
    pub api_key: String,
    #[serde(default = "default_dashscope_base", rename = "apiBase")]
    pub api_base: String,
    #[serde(default = "default_tts_model", rename = "ttsModel")]
    pub tts_model: String,
    #[serde(default = "default_tts_voice")]
    pub voice: String,
    #[serde(default = "default_language_type", rename = "languageType")]
    pub language_type: String,
}

impl Default for DashScopeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_dashscope_base(),
            tts_model: default_tts_model(),
            voice: default_tts_voice(),
            language_type: default_language_type(),
        }
    }
}

redact_debug!(
    DashScopeConfig,
    redact(api_key),
    api_base,
    tts_model,
    voice,
    language_type,
);

fn default_dashscope_base() -> String {
    "https://dashscope.aliyuncs.com".to_string()
}

fn default_tts_model() -> String {
    "qwen3-tts-flash".to_string()
}

fn default_tts_voice() -> String {
    "Cherry".to_string()
}

fn default_language_type() -> String {
    "Auto".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub dashscope: DashScopeConfig,
}
