//! Prompt moderation for image-creation requests.
//!
//! A [`ModerationChecker`] asks a classifier whether a prompt is NSFW on a
//! fixed schedule of offsets from the start of the check, stopping at the
//! first definitive answer. Classifier output is parsed by an ordered chain
//! of strategies that ends in a fail-closed default.

use crate::agent::context::{ContextKind, ConversationContext, ReplyKind};
use crate::config::ModerationConfig;
use crate::errors::GatewayError;
use crate::providers::base::ReplyGenerator;
use crate::utils::prompt::normalize_image_prompt;
use crate::utils::regex::RegexPatterns;
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_RETRY_OFFSETS_SECS: [u64; 11] = [0, 5, 10, 20, 25, 30, 40, 45, 50, 55, 60];
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_PENDING_CHECKS: usize = 64;

pub const NSFW_SYSTEM_PROMPT: &str = "你是图像生成内容审核器。\
请判断用户给出的图像提示词是否包含NSFW内容。\
NSFW包括但不限于：露骨性行为、裸露生殖器/乳头、色情描写、未成年人性相关内容。\
只输出严格JSON，不要输出其它字符：{\"nsfw\": true} 或 {\"nsfw\": false}。";

const LOG_PREVIEW_CHARS: usize = 200;

fn fallback_query(prompt: &str) -> String {
    format!(
        "请只输出严格JSON，不要输出任何其它字符：{{\"nsfw\": true}} 或 {{\"nsfw\": false}}。\n\
         判断下述图像提示词是否属于NSFW（色情、裸露、露骨性行为、未成年人性相关）：\n{prompt}"
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Ok,
    Failed,
}

/// Outcome of one moderation check. `nsfw` is `None` only when every
/// attempt came back without a definitive answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModerationVerdict {
    pub status: VerdictStatus,
    pub nsfw: Option<bool>,
    pub attempts: usize,
}

impl ModerationVerdict {
    pub fn definitive(nsfw: bool, attempts: usize) -> Self {
        Self {
            status: VerdictStatus::Ok,
            nsfw: Some(nsfw),
            attempts,
        }
    }

    pub fn exhausted(attempts: usize) -> Self {
        Self {
            status: VerdictStatus::Failed,
            nsfw: None,
            attempts,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.status == VerdictStatus::Ok && self.nsfw == Some(false)
    }

    pub fn is_unsafe(&self) -> bool {
        self.status == VerdictStatus::Ok && self.nsfw == Some(true)
    }
}

/// Attempt offsets measured from the start of a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySchedule {
    offsets: Vec<Duration>,
}

impl RetrySchedule {
    pub fn new(offsets: Vec<Duration>) -> Result<Self, GatewayError> {
        if offsets.is_empty() {
            return Err(GatewayError::Config(
                "retry schedule must contain at least one offset".into(),
            ));
        }
        if offsets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(GatewayError::Config(
                "retry schedule offsets must be strictly increasing".into(),
            ));
        }
        Ok(Self { offsets })
    }

    pub fn from_secs(offsets: &[u64]) -> Result<Self, GatewayError> {
        Self::new(offsets.iter().map(|s| Duration::from_secs(*s)).collect())
    }

    pub fn offsets(&self) -> &[Duration] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn last_offset(&self) -> Duration {
        self.offsets.last().copied().unwrap_or_default()
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self {
            offsets: DEFAULT_RETRY_OFFSETS_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        }
    }
}

/// Routing and credentials a check runs under, detached from the
/// requesting conversation's history and delivery list.
#[derive(Debug, Clone)]
pub struct ModerationScope {
    template: ConversationContext,
}

impl ModerationScope {
    pub fn from_context(ctx: &ConversationContext) -> Self {
        Self {
            template: ctx.isolated(ctx.session_id.clone(), String::new()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.template.session_id
    }

    pub fn api_key(&self) -> Option<&str> {
        self.template.upstream_api_key.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.template.model_hint.as_deref()
    }

    fn isolated_context(&self, query: String) -> ConversationContext {
        let session_id = format!(
            "nsfw-check-{}-{}",
            self.template.session_id,
            chrono::Utc::now().timestamp_millis()
        );
        self.template.isolated(session_id, query)
    }
}

impl Default for ModerationScope {
    fn default() -> Self {
        Self::from_context(&ConversationContext::new(ContextKind::Text, ""))
    }
}

/// Primary safety classifier. Returns the model's raw answer text.
#[async_trait]
pub trait SafetyClassifier: Send + Sync {
    async fn classify(&self, prompt: &str, scope: &ModerationScope) -> anyhow::Result<String>;
}

pub struct ModerationChecker {
    classifier: Option<Arc<dyn SafetyClassifier>>,
    fallback: Option<Arc<dyn ReplyGenerator>>,
    schedule: RetrySchedule,
    attempt_timeout: Duration,
    permits: Arc<Semaphore>,
    max_pending: usize,
}

impl ModerationChecker {
    pub fn new(classifier: Option<Arc<dyn SafetyClassifier>>, schedule: RetrySchedule) -> Self {
        Self {
            classifier,
            fallback: None,
            schedule,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            permits: Arc::new(Semaphore::new(DEFAULT_MAX_PENDING_CHECKS)),
            max_pending: DEFAULT_MAX_PENDING_CHECKS,
        }
    }

    pub fn from_config(
        config: &ModerationConfig,
        classifier: Option<Arc<dyn SafetyClassifier>>,
        fallback: Option<Arc<dyn ReplyGenerator>>,
    ) -> Result<Self, GatewayError> {
        let schedule = RetrySchedule::from_secs(&config.retry_offsets_secs)?;
        let mut checker = Self::new(classifier, schedule)
            .with_attempt_timeout(config.attempt_timeout())
            .with_max_pending(config.max_pending_checks);
        if config.generator_fallback
            && let Some(fallback) = fallback
        {
            checker = checker.with_fallback(fallback);
        }
        Ok(checker)
    }

    #[must_use]
    pub fn with_fallback(mut self, generator: Arc<dyn ReplyGenerator>) -> Self {
        self.fallback = Some(generator);
        self
    }

    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_pending(mut self, max: usize) -> Self {
        self.max_pending = max.max(1);
        self.permits = Arc::new(Semaphore::new(self.max_pending));
        self
    }

    pub fn schedule(&self) -> &RetrySchedule {
        &self.schedule
    }

    /// Checks currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.max_pending
            .saturating_sub(self.permits.available_permits())
    }

    /// Decide whether `prompt` is unsafe, retrying on the schedule until a
    /// definitive answer or exhaustion. Never returns an error.
    pub async fn check(&self, prompt: &str, scope: &ModerationScope) -> ModerationVerdict {
        let normalized = normalize_image_prompt(prompt);
        if normalized.is_empty() {
            return ModerationVerdict::definitive(false, 0);
        }

        let Ok(_permit) = self.permits.acquire().await else {
            warn!("moderation permits closed, treating check as exhausted");
            return ModerationVerdict::exhausted(0);
        };

        let start = Instant::now();
        for (idx, offset) in self.schedule.offsets().iter().enumerate() {
            let attempt = idx + 1;
            tokio::time::sleep_until(start + *offset).await;

            let raw = self.request_verdict(&normalized, scope).await;
            let preview = raw
                .as_deref()
                .map(|t| truncate_for_log(t, LOG_PREVIEW_CHARS))
                .unwrap_or_default();
            if let Some(nsfw) = raw.as_deref().and_then(parse_verdict) {
                info!(
                    "nsfw check success, nsfw={}, attempts={}, result={}",
                    nsfw, attempt, preview
                );
                return ModerationVerdict::definitive(nsfw, attempt);
            }
            warn!(
                "nsfw check attempt {} failed, raw_result={}",
                attempt, preview
            );
        }

        ModerationVerdict::exhausted(self.schedule.len())
    }

    /// One attempt: the primary classifier, then the generator fallback when
    /// the classifier fails or answers with nothing.
    async fn request_verdict(&self, prompt: &str, scope: &ModerationScope) -> Option<String> {
        if let Some(classifier) = &self.classifier {
            match tokio::time::timeout(self.attempt_timeout, classifier.classify(prompt, scope))
                .await
            {
                Ok(Ok(text)) if !text.trim().is_empty() => return Some(text.trim().to_string()),
                Ok(Ok(_)) => debug!("nsfw classifier returned empty text"),
                Ok(Err(e)) => warn!("nsfw classifier failed, falling back: {:#}", e),
                Err(_) => warn!(
                    "nsfw classifier timed out after {}s, falling back",
                    self.attempt_timeout.as_secs()
                ),
            }
        }
        self.request_via_fallback(prompt, scope).await
    }

    async fn request_via_fallback(&self, prompt: &str, scope: &ModerationScope) -> Option<String> {
        let generator = self.fallback.as_ref()?;
        let ctx = scope.isolated_context(fallback_query(prompt));

        let result = tokio::time::timeout(self.attempt_timeout, generator.generate_reply(&ctx)).await;
        generator.clear_session(&ctx.session_id);

        match result {
            Ok(Ok(reply)) if reply.kind != ReplyKind::Text => {
                debug!("nsfw fallback answered with a {} reply, ignored", reply.kind);
                None
            }
            Ok(Ok(reply)) => reply
                .as_text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            Ok(Err(e)) => {
                warn!("nsfw fallback check failed: {:#}", e);
                None
            }
            Err(_) => {
                warn!("nsfw fallback check timed out");
                None
            }
        }
    }
}

type ParseStrategy = fn(&str) -> Option<bool>;

/// Parsers tried in order; the first to produce a value wins.
const PARSE_CHAIN: &[(&str, ParseStrategy)] = &[
    ("strict_json", parse_strict_json),
    ("embedded_json", parse_embedded_json),
    ("assignment", parse_assignment),
    ("bare_boolean", parse_bare_boolean),
    ("fail_closed", fail_closed),
];

/// Parse classifier output into a verdict.
///
/// Returns `None` only for empty text. Non-empty text that no strategy
/// understands is treated as unsafe.
pub fn parse_verdict(text: &str) -> Option<bool> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    PARSE_CHAIN.iter().find_map(|(name, strategy)| {
        let verdict = strategy(text);
        if let Some(v) = verdict {
            debug!("nsfw verdict {} from {} parser", v, name);
        }
        verdict
    })
}

fn nsfw_field(candidate: &str) -> Option<bool> {
    let obj: Value = serde_json::from_str(candidate).ok()?;
    match obj.as_object()?.get("nsfw")? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn parse_strict_json(text: &str) -> Option<bool> {
    nsfw_field(text)
}

fn parse_embedded_json(text: &str) -> Option<bool> {
    let span = RegexPatterns::json_object_span().find(text)?;
    nsfw_field(span.as_str())
}

fn parse_assignment(text: &str) -> Option<bool> {
    let lowered = text.to_lowercase();
    if RegexPatterns::nsfw_true().is_match(&lowered) {
        return Some(true);
    }
    if RegexPatterns::nsfw_false().is_match(&lowered) {
        return Some(false);
    }
    None
}

fn parse_bare_boolean(text: &str) -> Option<bool> {
    match text.to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn fail_closed(_text: &str) -> Option<bool> {
    Some(true)
}
