use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::default_true;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Size of the worker pool processing inbound messages.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Prefixes marking a text message as an image-creation request.
    #[serde(default = "default_image_create_prefix", rename = "imageCreatePrefix")]
    pub image_create_prefix: Vec<String>,
    #[serde(default, rename = "groupChatReplyPrefix")]
    pub group_chat_reply_prefix: String,
    #[serde(default, rename = "groupChatReplySuffix")]
    pub group_chat_reply_suffix: String,
    #[serde(default, rename = "singleChatReplyPrefix")]
    pub single_chat_reply_prefix: String,
    #[serde(default, rename = "singleChatReplySuffix")]
    pub single_chat_reply_suffix: String,
    /// Synthesize text replies to voice when the channel supports it.
    #[serde(default, rename = "voiceReply")]
    pub voice_reply: bool,
    /// System prompt for text conversations.
    #[serde(default, rename = "characterDesc")]
    pub character_desc: Option<String>,
    /// Messages kept per session history.
    #[serde(default = "default_max_history", rename = "maxHistory")]
    pub max_history: usize,
    /// Sessions kept in memory before the least recently used is dropped.
    #[serde(default = "default_max_sessions", rename = "maxSessions")]
    pub max_sessions: usize,
    /// Inbound messages allowed per sender per minute.
    #[serde(default = "default_rate_limit", rename = "rateLimit")]
    pub rate_limit: usize,
    #[serde(default = "default_inbound_capacity", rename = "inboundCapacity")]
    pub inbound_capacity: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            image_create_prefix: default_image_create_prefix(),
            group_chat_reply_prefix: String::new(),
            group_chat_reply_suffix: String::new(),
            single_chat_reply_prefix: String::new(),
            single_chat_reply_suffix: String::new(),
            voice_reply: false,
            character_desc: None,
            max_history: default_max_history(),
            max_sessions: default_max_sessions(),
            rate_limit: default_rate_limit(),
            inbound_capacity: default_inbound_capacity(),
        }
    }
}

fn default_workers() -> usize {
    8
}

fn default_image_create_prefix() -> Vec<String> {
    vec!["画".to_string()]
}

fn default_max_history() -> usize {
    20
}

fn default_max_sessions() -> usize {
    1000
}

fn default_rate_limit() -> usize {
    30
}

fn default_inbound_capacity() -> usize {
    1000
}

/// Settings for the image moderation workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Attempt offsets in seconds from the start of a check.
    #[serde(default = "default_retry_offsets", rename = "retryOffsetsSecs")]
    pub retry_offsets_secs: Vec<u64>,
    #[serde(default = "default_attempt_timeout", rename = "attemptTimeoutSecs")]
    pub attempt_timeout_secs: u64,
    /// How long the orchestrator waits for a verdict before revoking.
    #[serde(default = "default_await_timeout", rename = "awaitTimeoutSecs")]
    pub await_timeout_secs: u64,
    #[serde(default = "default_warning_text", rename = "warningText")]
    pub warning_text: String,
    #[serde(default = "default_warning_delay", rename = "warningRevokeDelaySecs")]
    pub warning_revoke_delay_secs: u64,
    #[serde(
        default = "default_conservative_delay",
        rename = "conservativeRevokeDelaySecs"
    )]
    pub conservative_revoke_delay_secs: u64,
    /// Send a notice before revoking on inconclusive verdicts.
    #[serde(default, rename = "notifyOnInconclusive")]
    pub notify_on_inconclusive: bool,
    #[serde(default = "default_inconclusive_text", rename = "inconclusiveNoticeText")]
    pub inconclusive_notice_text: String,
    /// Upper bound on moderation checks running at once.
    #[serde(default = "default_max_pending", rename = "maxPendingChecks")]
    pub max_pending_checks: usize,
    #[serde(default, rename = "classifierModel")]
    pub classifier_model: Option<String>,
    /// Retry an empty classifier answer through the chat generator.
    #[serde(default = "default_true", rename = "generatorFallback")]
    pub generator_fallback: bool,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retry_offsets_secs: default_retry_offsets(),
            attempt_timeout_secs: default_attempt_timeout(),
            await_timeout_secs: default_await_timeout(),
            warning_text: default_warning_text(),
            warning_revoke_delay_secs: default_warning_delay(),
            conservative_revoke_delay_secs: default_conservative_delay(),
            notify_on_inconclusive: false,
            inconclusive_notice_text: default_inconclusive_text(),
            max_pending_checks: default_max_pending(),
            classifier_model: None,
            generator_fallback: true,
        }
    }
}

impl ModerationConfig {
    pub fn retry_offsets(&self) -> Vec<Duration> {
        self.retry_offsets_secs
            .iter()
            .map(|s| Duration::from_secs(*s))
            .collect()
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn await_timeout(&self) -> Duration {
        Duration::from_secs(self.await_timeout_secs)
    }

    pub fn warning_revoke_delay(&self) -> Duration {
        Duration::from_secs(self.warning_revoke_delay_secs)
    }

    pub fn conservative_revoke_delay(&self) -> Duration {
        Duration::from_secs(self.conservative_revoke_delay_secs)
    }
}

fn default_retry_offsets() -> Vec<u64> {
    vec![0, 5, 10, 20, 25, 30, 40, 45, 50, 55, 60]
}

fn default_attempt_timeout() -> u64 {
    5
}

fn default_await_timeout() -> u64 {
    70
}

fn default_warning_text() -> String {
    "侦测到NSFW内容，将会在一分钟后撤回消息".to_string()
}

fn default_warning_delay() -> u64 {
    60
}

fn default_conservative_delay() -> u64 {
    1
}

fn default_inconclusive_text() -> String {
    "图片未能通过内容审核，已撤回".to_string()
}

fn default_max_pending() -> usize {
    64
}
