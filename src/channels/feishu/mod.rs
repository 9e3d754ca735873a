//! Feishu (Lark) open platform channel.
//!
//! Events arrive on the gateway webhook and are turned into inbound messages
//! by [`FeishuChannel::handle_event`]. Replies go out through the IM v1 API
//! with a cached tenant access token.

use crate::agent::context::{ConversationContext, Reply, ReplyContent, ReplyKind};
use crate::bus::{ChatType, InboundMessage};
use crate::channels::base::{BaseChannel, SendReceipt};
use crate::config::FeishuConfig;
use crate::errors::GatewayError;
use crate::safety::dedup::DedupLedger;
use crate::utils::http::{DEFAULT_MAX_BODY_BYTES, default_http_client, download};
use crate::utils::media::{decode_image_data, image_extension, is_http_url};
use crate::utils::regex::RegexPatterns;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const CHANNEL_NAME: &str = "feishu";
const URL_VERIFICATION: &str = "url_verification";
const MESSAGE_RECEIVE_TYPE: &str = "im.message.receive_v1";
/// Refresh the tenant token this long before Feishu expires it.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);
const DEFAULT_TOKEN_TTL_SECS: u64 = 7200;

/// What the webhook should do with one callback body.
#[derive(Debug)]
pub enum FeishuEvent {
    /// Subscription handshake; answer with the challenge.
    Challenge(String),
    /// `header.token` did not match the verification token.
    Forbidden,
    Message(Box<InboundMessage>),
    Ignored(&'static str),
}

struct TokenState {
    token: String,
    expires_at: Instant,
}

pub struct FeishuChannel {
    config: FeishuConfig,
    client: reqwest::Client,
    token: RwLock<TokenState>,
    received: DedupLedger,
}

impl FeishuChannel {
    pub fn new(config: FeishuConfig) -> Self {
        let received = DedupLedger::new(Duration::from_secs(config.dedup_horizon_secs));
        Self {
            config,
            client: default_http_client(),
            token: RwLock::new(TokenState {
                token: String::new(),
                expires_at: Instant::now(),
            }),
            received,
        }
    }

    fn api(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /// Validate and parse one event callback. Repeated message ids, group
    /// messages not addressed to the bot and non-text messages are ignored.
    pub fn handle_event(&self, body: &Value) -> FeishuEvent {
        if body.get("type").and_then(Value::as_str) == Some(URL_VERIFICATION) {
            let challenge = body
                .get("challenge")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return FeishuEvent::Challenge(challenge.to_string());
        }

        let Some(header) = body.get("header") else {
            return FeishuEvent::Forbidden;
        };
        if header.get("token").and_then(Value::as_str) != Some(self.config.verification_token.as_str())
        {
            warn!("feishu event rejected: verification token mismatch");
            return FeishuEvent::Forbidden;
        }
        if header.get("event_type").and_then(Value::as_str) != Some(MESSAGE_RECEIVE_TYPE) {
            return FeishuEvent::Ignored("unsupported event type");
        }

        let Some(event) = body.get("event") else {
            return FeishuEvent::Ignored("event body missing");
        };
        let (Some(message), Some(sender)) = (event.get("message"), event.get("sender")) else {
            warn!("feishu invalid message event: {}", body);
            return FeishuEvent::Ignored("message or sender missing");
        };

        let message_id = str_field(message, "message_id");
        if message_id.is_empty() {
            return FeishuEvent::Ignored("message id missing");
        }
        if !self.received.seen_or_record(message_id) {
            warn!(
                "feishu repeat msg filtered, event_id={}",
                str_field(header, "event_id")
            );
            return FeishuEvent::Ignored("duplicate message");
        }

        if str_field(message, "message_type") != "text" {
            return FeishuEvent::Ignored("non-text message");
        }

        let sender_open_id = sender
            .pointer("/sender_id/open_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let chat_type = match str_field(message, "chat_type") {
            "group" => {
                let first_mention = message
                    .get("mentions")
                    .and_then(Value::as_array)
                    .and_then(|m| m.first())
                    .and_then(|m| m.get("name"))
                    .and_then(Value::as_str);
                if first_mention != Some(self.config.bot_name.as_str()) {
                    return FeishuEvent::Ignored("group message not addressed to the bot");
                }
                ChatType::Group
            }
            "p2p" => ChatType::Direct,
            _ => return FeishuEvent::Ignored("unsupported chat type"),
        };

        let text = serde_json::from_str::<Value>(str_field(message, "content"))
            .ok()
            .and_then(|c| c.get("text").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_default();
        let text = RegexPatterns::feishu_mention()
            .replace_all(&text, "")
            .trim()
            .to_string();

        let chat_id = match chat_type {
            ChatType::Group => str_field(message, "chat_id").to_string(),
            ChatType::Direct => sender_open_id.clone(),
        };
        let timestamp = str_field(message, "create_time")
            .parse::<i64>()
            .ok()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        info!(
            "feishu message received: chat_type={:?}, chat_id={}, len={}",
            chat_type,
            chat_id,
            text.len()
        );
        FeishuEvent::Message(Box::new(InboundMessage {
            id: message_id.to_string(),
            channel: CHANNEL_NAME.to_string(),
            chat_type,
            sender_id: sender_open_id.clone(),
            sender_name: sender_open_id,
            chat_id,
            content: text,
            timestamp,
            metadata: HashMap::new(),
        }))
    }

    async fn tenant_token(&self) -> Result<String> {
        {
            let state = self.token.read().await;
            if !state.token.is_empty() && Instant::now() < state.expires_at {
                return Ok(state.token.clone());
            }
        }

        let mut state = self.token.write().await;
        // another task may have refreshed while we waited for the lock
        if !state.token.is_empty() && Instant::now() < state.expires_at {
            return Ok(state.token.clone());
        }

        let resp: Value = self
            .client
            .post(self.api("/auth/v3/tenant_access_token/internal"))
            .json(&json!({
                "app_id": self.config.app_id,
                "app_secret": self.config.app_secret,
            }))
            .send()
            .await
            .context("Failed to get tenant_access_token")?
            .json()
            .await
            .context("Failed to parse token response")?;
        check_code(&resp, "tenant_access_token")?;

        let token = resp
            .get("tenant_access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GatewayError::channel(CHANNEL_NAME, "missing tenant_access_token"))?
            .to_string();
        let expire_secs = resp
            .get("expire")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        let ttl = Duration::from_secs(expire_secs).saturating_sub(TOKEN_REFRESH_MARGIN);

        state.token.clone_from(&token);
        state.expires_at = Instant::now() + ttl;
        debug!("feishu tenant token refreshed, valid for {}s", ttl.as_secs());
        Ok(token)
    }

    async fn upload_image(&self, token: &str, bytes: Vec<u8>, mime: &str) -> Result<String> {
        let filename = format!("{}.{}", uuid::Uuid::new_v4(), image_extension(mime));
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename)
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new()
            .text("image_type", "message")
            .part("image", part);

        let resp: Value = self
            .client
            .post(self.api("/im/v1/images"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .context("Failed to upload Feishu image")?
            .json()
            .await
            .context("Failed to parse Feishu image upload response")?;
        check_code(&resp, "image upload")?;

        resp.pointer("/data/image_key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GatewayError::channel(CHANNEL_NAME, "missing image_key").into())
    }

    /// Resolve one image source (URL or data URI) to uploaded bytes.
    async fn upload_source(&self, token: &str, source: &str) -> Result<String> {
        let (mime, bytes) = if is_http_url(source) {
            let got = download(&self.client, source, DEFAULT_MAX_BODY_BYTES).await?;
            let mime = got
                .content_type
                .filter(|ct| ct.starts_with("image/"))
                .unwrap_or_else(|| "image/png".to_string());
            (mime, got.bytes)
        } else {
            decode_image_data(source)
                .ok_or_else(|| GatewayError::channel(CHANNEL_NAME, "invalid image data"))?
        };
        self.upload_image(token, bytes, &mime).await
    }

    /// Post one message. Group chats reply in-thread to the triggering
    /// message; direct chats post to the sender's open id.
    async fn post_message(
        &self,
        token: &str,
        ctx: &ConversationContext,
        msg_type: &str,
        content: &Value,
    ) -> Result<String> {
        let request = if ctx.is_group && !ctx.message_id.is_empty() {
            self.client
                .post(self.api(&format!("/im/v1/messages/{}/reply", ctx.message_id)))
                .json(&json!({
                    "msg_type": msg_type,
                    "content": content.to_string(),
                }))
        } else {
            self.client
                .post(self.api("/im/v1/messages"))
                .query(&[("receive_id_type", receive_id_type(ctx))])
                .json(&json!({
                    "receive_id": ctx.receiver,
                    "msg_type": msg_type,
                    "content": content.to_string(),
                }))
        };

        let resp: Value = request
            .bearer_auth(token)
            .send()
            .await
            .context("Failed to send Feishu message")?
            .json()
            .await
            .context("Failed to parse Feishu send response")?;
        check_code(&resp, "send message")?;
        let id = resp
            .pointer("/data/message_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        info!("feishu send message success, msg_type={}", msg_type);
        Ok(id)
    }
}

fn receive_id_type(ctx: &ConversationContext) -> &'static str {
    if ctx.is_group { "chat_id" } else { "open_id" }
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Feishu reports failures as a non-zero `code` with an HTTP 200.
fn check_code(resp: &Value, what: &str) -> Result<(), GatewayError> {
    let code = resp.get("code").and_then(Value::as_i64).unwrap_or(-1);
    if code == 0 {
        return Ok(());
    }
    let msg = resp.get("msg").and_then(Value::as_str).unwrap_or("unknown");
    Err(GatewayError::channel(
        CHANNEL_NAME,
        format!("{} error: code={} msg={}", what, code, msg),
    ))
}

#[async_trait]
impl BaseChannel for FeishuChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<()> {
        if self.config.verification_token.is_empty() {
            warn!("feishu verification token is empty, every event callback will be rejected");
        }
        info!(
            "feishu channel ready, app_id={}, bot_name={}",
            self.config.app_id, self.config.bot_name
        );
        Ok(())
    }

    fn supports(&self, kind: ReplyKind) -> bool {
        matches!(
            kind,
            ReplyKind::Text
                | ReplyKind::Error
                | ReplyKind::Info
                | ReplyKind::ImageUrl
                | ReplyKind::ImageBytes
        )
    }

    async fn send(&self, reply: &Reply, ctx: &ConversationContext) -> Result<SendReceipt> {
        let token = self.tenant_token().await?;
        debug!(
            "feishu start send reply message, type={}, receiver={}",
            reply.kind, ctx.receiver
        );

        let mut receipt = SendReceipt::none();
        match &reply.content {
            ReplyContent::Text(text) => {
                let id = self
                    .post_message(&token, ctx, "text", &json!({ "text": text }))
                    .await?;
                receipt.message_ids.push(id);
            }
            ReplyContent::Sources(sources) => {
                for source in sources.iter().filter(|s| !s.trim().is_empty()) {
                    let image_key = match self.upload_source(&token, source).await {
                        Ok(key) => key,
                        Err(e) => {
                            warn!("feishu upload file failed: {:#}", e);
                            continue;
                        }
                    };
                    match self
                        .post_message(&token, ctx, "image", &json!({ "image_key": image_key }))
                        .await
                    {
                        Ok(id) => receipt.message_ids.push(id),
                        Err(e) => warn!("feishu send image failed: {:#}", e),
                    }
                }
                if receipt.message_ids.is_empty() {
                    return Err(GatewayError::channel(CHANNEL_NAME, "no image could be delivered").into());
                }
            }
            ReplyContent::Bytes { data, mime } => {
                let image_key = self.upload_image(&token, data.clone(), mime).await?;
                let id = self
                    .post_message(&token, ctx, "image", &json!({ "image_key": image_key }))
                    .await?;
                receipt.message_ids.push(id);
            }
        }
        Ok(receipt)
    }

    async fn retract(&self, message_id: &str, _recipient: &str) -> Result<bool> {
        let token = self.tenant_token().await?;
        let resp: Value = self
            .client
            .delete(self.api(&format!("/im/v1/messages/{}", message_id)))
            .bearer_auth(&token)
            .send()
            .await
            .context("Failed to delete Feishu message")?
            .json()
            .await
            .context("Failed to parse Feishu delete response")?;
        if let Err(e) = check_code(&resp, "delete message") {
            warn!("feishu retract {} refused: {}", message_id, e);
            return Ok(false);
        }
        Ok(true)
    }
}
