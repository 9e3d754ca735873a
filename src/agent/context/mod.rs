use crate::bus::InboundMessage;
use crate::config::AgentConfig;
use serde::{Deserialize, Serialize};

/// What the inbound message asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Text,
    ImageCreate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Text,
    ImageUrl,
    ImageBytes,
    Voice,
    File,
    Video,
    Error,
    Info,
}

impl ReplyKind {
    pub fn is_image(self) -> bool {
        matches!(self, Self::ImageUrl | Self::ImageBytes)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::ImageUrl => "image_url",
            Self::ImageBytes => "image_bytes",
            Self::Voice => "voice",
            Self::File => "file",
            Self::Video => "video",
            Self::Error => "error",
            Self::Info => "info",
        }
    }
}

impl std::fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyContent {
    Text(String),
    /// Image URLs or `data:image/...;base64,` URIs, in send order.
    Sources(Vec<String>),
    Bytes { data: Vec<u8>, mime: String },
}

/// A generated reply. Decoration may rewrite it before it is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub content: ReplyContent,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Text,
            content: ReplyContent::Text(text.into()),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Error,
            content: ReplyContent::Text(text.into()),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Info,
            content: ReplyContent::Text(text.into()),
        }
    }

    pub fn images(sources: Vec<String>) -> Self {
        Self {
            kind: ReplyKind::ImageUrl,
            content: ReplyContent::Sources(sources),
        }
    }

    pub fn image_bytes(data: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::ImageBytes,
            content: ReplyContent::Bytes {
                data,
                mime: mime.into(),
            },
        }
    }

    pub fn voice(data: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Voice,
            content: ReplyContent::Bytes {
                data,
                mime: mime.into(),
            },
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            ReplyContent::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.content {
            ReplyContent::Text(t) => t.trim().is_empty(),
            ReplyContent::Sources(s) => s.iter().all(|u| u.trim().is_empty()),
            ReplyContent::Bytes { data, .. } => data.is_empty(),
        }
    }
}

/// One message a channel confirmed as delivered, with the id needed to retract it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessageRecord {
    pub platform_message_id: String,
    pub recipient: String,
    pub reply_kind: ReplyKind,
}

/// Per-message scratch state, owned by the single flow handling that message.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    pub kind: ContextKind,
    /// Message text with any image-create prefix removed.
    pub content: String,
    pub session_id: String,
    pub channel: String,
    /// Chat the reply is delivered to.
    pub receiver: String,
    pub is_group: bool,
    pub desired_reply_kind: Option<ReplyKind>,
    pub upstream_api_key: Option<String>,
    pub model_hint: Option<String>,
    pub sender_name: String,
    /// Platform id of the triggering message, used for threaded replies.
    pub message_id: String,
    sent: Vec<SentMessageRecord>,
}

impl ConversationContext {
    pub fn new(kind: ContextKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            session_id: String::new(),
            channel: String::new(),
            receiver: String::new(),
            is_group: false,
            desired_reply_kind: None,
            upstream_api_key: None,
            model_hint: None,
            sender_name: String::new(),
            message_id: String::new(),
            sent: Vec::new(),
        }
    }

    /// A text context that shares this one's routing and credentials but
    /// lives in its own session and delivery list.
    pub fn isolated(&self, session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: ContextKind::Text,
            content: content.into(),
            session_id: session_id.into(),
            channel: self.channel.clone(),
            receiver: self.receiver.clone(),
            is_group: self.is_group,
            desired_reply_kind: Some(ReplyKind::Text),
            upstream_api_key: self.upstream_api_key.clone(),
            model_hint: self.model_hint.clone(),
            sender_name: self.sender_name.clone(),
            message_id: String::new(),
            sent: Vec::new(),
        }
    }

    pub fn sent_records(&self) -> &[SentMessageRecord] {
        &self.sent
    }

    pub(crate) fn record_sent(&mut self, record: SentMessageRecord) {
        self.sent.push(record);
    }
}

/// Build the handling context for an inbound message. Returns `None` for
/// messages with no text to act on.
pub fn compose_context(msg: &InboundMessage, config: &AgentConfig) -> Option<ConversationContext> {
    let text = msg.content.trim();
    if text.is_empty() {
        return None;
    }

    let image_prefix = config
        .image_create_prefix
        .iter()
        .find(|p| !p.is_empty() && text.starts_with(p.as_str()));

    let mut ctx = match image_prefix {
        Some(prefix) => ConversationContext::new(
            ContextKind::ImageCreate,
            text[prefix.len()..].trim().to_string(),
        ),
        None => ConversationContext::new(ContextKind::Text, text),
    };

    ctx.session_id = msg.session_key();
    ctx.channel.clone_from(&msg.channel);
    ctx.receiver.clone_from(&msg.chat_id);
    ctx.is_group = msg.is_group();
    ctx.sender_name.clone_from(&msg.sender_name);
    ctx.message_id.clone_from(&msg.id);
    ctx.upstream_api_key = metadata_str(msg, "openai_api_key");
    ctx.model_hint = metadata_str(msg, "model");
    if ctx.kind == ContextKind::Text && config.voice_reply {
        ctx.desired_reply_kind = Some(ReplyKind::Voice);
    }
    Some(ctx)
}

fn metadata_str(msg: &InboundMessage, key: &str) -> Option<String> {
    msg.metadata
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
