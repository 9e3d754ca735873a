//! Routes a conversation context to the provider that answers it: chat for
//! text, the image provider for image creation, speech synthesis for voice.

use crate::agent::context::{ContextKind, ConversationContext, Reply, ReplyKind};
use crate::config::{AgentConfig, OpenAiConfig};
use crate::errors::GatewayError;
use crate::providers::base::{
    ChatRequest, ImageProvider, LLMProvider, Message, ReplyGenerator, RetryConfig, SpeechProvider,
};
use crate::utils::prompt::{DEFAULT_IMAGE_COUNT, IMAGE_COUNT_RANGE, parse_image_count};
use crate::utils::truncate_for_log;
use anyhow::Result;
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const IMAGE_FAILURE_TEXT: &str = "画图出现问题，请休息一下再问我吧";
pub const NO_IMAGE_TEXT: &str = "画图返回内容中未识别到图片数据";
pub const CHAT_FAILURE_TEXT: &str = "遇到了一点小问题，请稍后再试";

const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(5);

pub struct Bridge {
    chat: Arc<dyn LLMProvider>,
    images: Option<Arc<dyn ImageProvider>>,
    speech: Option<Arc<dyn SpeechProvider>>,
    sessions: Mutex<LruCache<String, Vec<Message>>>,
    system_prompt: Option<String>,
    max_history: usize,
    max_tokens: u32,
    temperature: f32,
    retry: RetryConfig,
}

impl Bridge {
    pub fn new(chat: Arc<dyn LLMProvider>, agent: &AgentConfig, openai: &OpenAiConfig) -> Self {
        let capacity = NonZeroUsize::new(agent.max_sessions).unwrap_or(NonZeroUsize::MIN);
        Self {
            chat,
            images: None,
            speech: None,
            sessions: Mutex::new(LruCache::new(capacity)),
            system_prompt: agent
                .character_desc
                .clone()
                .filter(|desc| !desc.trim().is_empty()),
            max_history: agent.max_history,
            max_tokens: openai.max_tokens,
            temperature: openai.temperature,
            retry: RetryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_images(mut self, images: Arc<dyn ImageProvider>) -> Self {
        self.images = Some(images);
        self
    }

    #[must_use]
    pub fn with_speech(mut self, speech: Arc<dyn SpeechProvider>) -> Self {
        self.speech = Some(speech);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Messages currently kept for `session_id`.
    pub fn history_len(&self, session_id: &str) -> usize {
        self.sessions
            .lock()
            .map(|mut s| s.get(session_id).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn history(&self, session_id: &str) -> Vec<Message> {
        self.sessions
            .lock()
            .ok()
            .and_then(|mut s| s.get(session_id).cloned())
            .unwrap_or_default()
    }

    fn remember(&self, session_id: &str, user: Message, assistant: Message) {
        let Ok(mut sessions) = self.sessions.lock() else {
            return;
        };
        let history = sessions.get_or_insert_mut(session_id.to_string(), Vec::new);
        history.push(user);
        history.push(assistant);
        if history.len() > self.max_history {
            let excess = history.len() - self.max_history;
            history.drain(..excess);
        }
    }

    async fn reply_text(&self, ctx: &ConversationContext) -> Reply {
        let user = Message::user(ctx.content.clone());
        let mut messages = Vec::new();
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt.clone()));
        }
        messages.extend(self.history(&ctx.session_id));
        messages.push(user.clone());

        let request = ChatRequest {
            messages,
            model: ctx.model_hint.as_deref(),
            api_key: ctx.upstream_api_key.as_deref(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            response_format: None,
        };
        match self
            .chat
            .chat_with_retry(request, Some(self.retry.clone()))
            .await
        {
            Ok(response) => {
                let answer = response.content.unwrap_or_default();
                debug!(
                    "chat answer for session {}: {}",
                    ctx.session_id,
                    truncate_for_log(&answer, 200)
                );
                self.remember(&ctx.session_id, user, Message::assistant(answer.clone()));
                Reply::text(answer)
            }
            Err(e) => {
                warn!("chat failed for session {}: {:#}", ctx.session_id, e);
                Reply::error(CHAT_FAILURE_TEXT)
            }
        }
    }

    async fn reply_image(&self, ctx: &ConversationContext) -> Reply {
        let Some(images) = &self.images else {
            warn!("image creation requested but no image provider is configured");
            return Reply::error(IMAGE_FAILURE_TEXT);
        };
        let (n, prompt) = parse_image_count(&ctx.content, DEFAULT_IMAGE_COUNT, IMAGE_COUNT_RANGE);
        let api_key = ctx.upstream_api_key.as_deref();

        let mut result = images.create_images(&prompt, n, api_key).await;
        // one retry on rate limiting, honoring the server hint
        if let Err(e) = &result
            && let Some(GatewayError::RateLimit { retry_after }) = e.downcast_ref::<GatewayError>()
        {
            let wait = retry_after.map_or(DEFAULT_RATE_LIMIT_WAIT, Duration::from_secs);
            warn!("image creation rate limited, retrying in {}s", wait.as_secs());
            tokio::time::sleep(wait).await;
            result = images.create_images(&prompt, n, api_key).await;
        }

        match result {
            Ok(sources) if sources.is_empty() => {
                warn!("image response contained no image data");
                Reply::error(NO_IMAGE_TEXT)
            }
            Ok(sources) => {
                info!("image creation produced {} image(s)", sources.len());
                Reply::images(sources)
            }
            Err(e) => {
                warn!("image creation failed: {:#}", e);
                Reply::error(IMAGE_FAILURE_TEXT)
            }
        }
    }

    /// Synthesize a text reply when voice was asked for. Falls back to the
    /// text itself if synthesis is unavailable or fails.
    async fn voice_or_text(&self, reply: Reply) -> Reply {
        let (Some(speech), Some(text)) = (&self.speech, reply.as_text()) else {
            return reply;
        };
        if reply.kind != ReplyKind::Text || text.trim().is_empty() {
            return reply;
        }
        match speech.synthesize(text).await {
            Ok(clip) => Reply::voice(clip.data, clip.mime),
            Err(e) => {
                warn!("speech synthesis failed, replying with text: {:#}", e);
                reply
            }
        }
    }
}

#[async_trait]
impl ReplyGenerator for Bridge {
    async fn generate_reply(&self, ctx: &ConversationContext) -> Result<Reply> {
        let reply = match ctx.kind {
            ContextKind::ImageCreate => self.reply_image(ctx).await,
            ContextKind::Text => {
                let reply = self.reply_text(ctx).await;
                if ctx.desired_reply_kind == Some(ReplyKind::Voice) {
                    self.voice_or_text(reply).await
                } else {
                    reply
                }
            }
        };
        Ok(reply)
    }

    fn clear_session(&self, session_id: &str) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.pop(session_id);
        }
    }
}
