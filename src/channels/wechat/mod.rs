//! WeChat personal-account channel over an HTTP bridge.
//!
//! The bridge process owns the web session. It posts received messages to the
//! gateway webhook and exposes `/send` and `/revoke` for replies.

use crate::agent::context::{ConversationContext, Reply, ReplyContent, ReplyKind};
use crate::bus::{ChatType, InboundMessage};
use crate::channels::base::{BaseChannel, SendReceipt};
use crate::channels::utils::{extract_message_id, remove_markdown_symbol};
use crate::config::WechatConfig;
use crate::errors::GatewayError;
use crate::safety::dedup::DedupLedger;
use crate::utils::http::default_http_client;
use crate::utils::media::{decode_image_data, is_data_image_url};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

const CHANNEL_NAME: &str = "wechat";
pub const BRIDGE_TOKEN_HEADER: &str = "X-Bridge-Token";
const SYSTEM_ACCOUNTS: &[&str] = &["weixin"];
/// With hot reload on, events older than this are history replayed by the bridge.
const HISTORY_REPLAY_SECS: i64 = 60;
const INVALID_IMAGE_TEXT: &str = "图片数据无效，发送失败";

#[derive(Debug)]
pub enum WechatEvent {
    Message(Box<InboundMessage>),
    Ignored(&'static str),
}

pub struct WechatChannel {
    config: WechatConfig,
    client: reqwest::Client,
    /// Drops bridge re-deliveries before the event is parsed.
    raw_received: DedupLedger,
    /// Guards composed messages for the platform's redelivery window.
    received: DedupLedger,
}

impl WechatChannel {
    pub fn new(config: WechatConfig) -> Self {
        let raw_received = DedupLedger::new(Duration::from_secs(config.raw_dedup_secs));
        let received = DedupLedger::new(Duration::from_secs(config.expires_in_seconds));
        Self {
            config,
            client: default_http_client(),
            raw_received,
            received,
        }
    }

    fn bridge(&self, path: &str) -> String {
        format!("{}{}", self.config.bridge_url.trim_end_matches('/'), path)
    }

    /// Whether a webhook call carries the configured bridge token. With no
    /// token configured every call is accepted.
    pub fn authorize(&self, provided: Option<&str>) -> bool {
        self.config.bridge_token.is_empty() || provided == Some(self.config.bridge_token.as_str())
    }

    pub fn handle_event(&self, body: &Value) -> WechatEvent {
        let msg_id = id_field(body, "MsgId");
        if msg_id.is_empty() {
            return WechatEvent::Ignored("message id missing");
        }
        if !self.raw_received.seen_or_record(&msg_id) {
            return WechatEvent::Ignored("raw duplicate");
        }

        let create_time = body.get("CreateTime").and_then(Value::as_i64).unwrap_or(0);
        if self.config.hot_reload && create_time < Utc::now().timestamp() - HISTORY_REPLAY_SECS {
            debug!("wechat history message {} skipped", msg_id);
            return WechatEvent::Ignored("history replay");
        }

        if !self.received.seen_or_record(&msg_id) {
            debug!("wechat message {} already received, ignore", msg_id);
            return WechatEvent::Ignored("duplicate message");
        }

        if let Some(kind) = body.get("Type").and_then(Value::as_str)
            && !kind.eq_ignore_ascii_case("text")
        {
            return WechatEvent::Ignored("non-text message");
        }

        let is_group = body.get("IsGroup").and_then(Value::as_bool).unwrap_or(false);
        let my_msg = body.get("MyMsg").and_then(Value::as_bool).unwrap_or(false);
        let from = str_field(body, "FromUserName");
        let to = str_field(body, "ToUserName");
        let other_user = if my_msg { to } else { from };

        if my_msg && !is_group {
            debug!("wechat my message {} skipped", msg_id);
            return WechatEvent::Ignored("own message");
        }
        if !is_group && SYSTEM_ACCOUNTS.contains(&other_user) {
            return WechatEvent::Ignored("system account");
        }

        let mut content = str_field(body, "Content").to_string();
        let (chat_type, sender_id, sender_name) = if is_group {
            let at_bot = body.get("IsAt").and_then(Value::as_bool).unwrap_or(false);
            if !at_bot && !self.config.no_need_at {
                return WechatEvent::Ignored("group message without @");
            }
            if at_bot {
                content = strip_leading_mention(&content).to_string();
            }
            let actual_id = str_field(body, "ActualUserName");
            (
                ChatType::Group,
                if actual_id.is_empty() { from } else { actual_id }.to_string(),
                str_field(body, "ActualNickName").to_string(),
            )
        } else {
            let nickname = str_field(body, "ActualNickName");
            (
                ChatType::Direct,
                from.to_string(),
                if nickname.is_empty() { from } else { nickname }.to_string(),
            )
        };

        let timestamp = Utc
            .timestamp_opt(create_time, 0)
            .single()
            .unwrap_or_else(Utc::now);

        debug!(
            "wechat receive text msg {}: group={}, chat={}, len={}",
            msg_id,
            is_group,
            other_user,
            content.len()
        );
        WechatEvent::Message(Box::new(InboundMessage {
            id: msg_id,
            channel: CHANNEL_NAME.to_string(),
            chat_type,
            sender_id,
            sender_name,
            chat_id: other_user.to_string(),
            content: content.trim().to_string(),
            timestamp,
            metadata: HashMap::new(),
        }))
    }

    async fn post_bridge(&self, path: &str, body: &Value) -> Result<Value> {
        let mut request = self.client.post(self.bridge(path)).json(body);
        if !self.config.bridge_token.is_empty() {
            request = request.header(BRIDGE_TOKEN_HEADER, &self.config.bridge_token);
        }
        let resp = request
            .send()
            .await
            .with_context(|| format!("wechat bridge {} request failed", path))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GatewayError::channel(
                CHANNEL_NAME,
                format!("bridge {} returned HTTP {}: {}", path, status, text),
            )
            .into());
        }
        Ok(resp.json().await.unwrap_or(Value::Null))
    }

    async fn send_payload(&self, receiver: &str, payload: Value) -> Result<Option<String>> {
        let mut body = payload;
        body["to"] = json!(receiver);
        let resp = self.post_bridge("/send", &body).await?;
        Ok(extract_message_id(&resp))
    }

    /// Payload for one image source. Data URIs are decoded first so the
    /// bridge only ever sees a plain base64 image; an undecodable one yields
    /// `None`.
    fn image_payload(source: &str) -> Option<Value> {
        if is_data_image_url(source) {
            let (mime, bytes) = decode_image_data(source)?;
            return Some(json!({
                "type": "image",
                "base64": STANDARD.encode(bytes),
                "mime": mime,
            }));
        }
        Some(json!({ "type": "image", "url": source }))
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Message ids arrive as strings or numbers depending on the bridge.
fn id_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Group messages addressed to the bot start with `@nickname` followed by a
/// four-per-em space or a plain space.
fn strip_leading_mention(content: &str) -> &str {
    let Some(rest) = content.strip_prefix('@') else {
        return content;
    };
    match rest.find(['\u{2005}', ' ']) {
        Some(idx) => rest[idx..].trim_start(),
        None => content,
    }
}

#[async_trait]
impl BaseChannel for WechatChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<()> {
        info!(
            "wechat channel ready, bridge={}, hot_reload={}",
            self.config.bridge_url, self.config.hot_reload
        );
        Ok(())
    }

    fn supports(&self, _kind: ReplyKind) -> bool {
        true
    }

    async fn send(&self, reply: &Reply, ctx: &ConversationContext) -> Result<SendReceipt> {
        let receiver = ctx.receiver.as_str();
        let mut receipt = SendReceipt::none();
        match (&reply.content, reply.kind) {
            (ReplyContent::Text(text), _) => {
                let text = remove_markdown_symbol(text);
                let id = self
                    .send_payload(receiver, json!({ "type": "text", "content": text }))
                    .await?;
                info!("wechat sendMsg kind={}, receiver={}", reply.kind, receiver);
                receipt.message_ids.extend(id);
            }
            (ReplyContent::Sources(sources), _) => {
                // Ids of images already on screen must reach the caller even
                // when a later image fails, otherwise they cannot be retracted.
                let mut delivered = 0usize;
                let mut last_err = None;
                for source in sources.iter().filter(|s| !s.trim().is_empty()) {
                    let payload = match Self::image_payload(source) {
                        Some(payload) => payload,
                        None => {
                            warn!("wechat invalid data-uri image, skip send");
                            json!({ "type": "text", "content": INVALID_IMAGE_TEXT })
                        }
                    };
                    match self.send_payload(receiver, payload).await {
                        Ok(id) => {
                            info!("wechat sendImage, receiver={}", receiver);
                            delivered += 1;
                            receipt.message_ids.extend(id);
                        }
                        Err(e) => {
                            warn!("wechat sendImage failed, receiver={}: {:#}", receiver, e);
                            last_err = Some(e);
                        }
                    }
                }
                if delivered == 0
                    && let Some(e) = last_err
                {
                    return Err(e);
                }
            }
            (ReplyContent::Bytes { data, mime }, kind) => {
                let kind = match kind {
                    ReplyKind::Voice => "voice",
                    ReplyKind::Video => "video",
                    ReplyKind::ImageBytes => "image",
                    _ => "file",
                };
                let id = self
                    .send_payload(
                        receiver,
                        json!({ "type": kind, "base64": STANDARD.encode(data), "mime": mime }),
                    )
                    .await?;
                info!("wechat sendFile type={}, receiver={}", kind, receiver);
                receipt.message_ids.extend(id);
            }
        }
        Ok(receipt)
    }

    async fn retract(&self, message_id: &str, recipient: &str) -> Result<bool> {
        let resp = self
            .post_bridge(
                "/revoke",
                &json!({ "msg_id": message_id, "to_user": recipient }),
            )
            .await?;
        Ok(resp.get("ok").and_then(Value::as_bool).unwrap_or(false))
    }
}
