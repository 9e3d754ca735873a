use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::GatewayError;

/// Generates a `Debug` impl that redacts secret fields.
///
/// Field specifiers:
/// - `field_name`            prints normally via `&self.field_name`
/// - `redact(field_name)`    `String` field, shows `[empty]` or `[REDACTED]`
/// - `redact_option(field_name)` `Option<String>` field, shows `None` or `Some("[REDACTED]")`
macro_rules! redact_debug {
    (@field $builder:ident, $self:ident, redact($field:ident)) => {
        $builder.field(
            stringify!($field),
            &if $self.$field.is_empty() {
                "[empty]"
            } else {
                "[REDACTED]"
            },
        );
    };
    (@field $builder:ident, $self:ident, redact_option($field:ident)) => {
        $builder.field(
            stringify!($field),
            &$self.$field.as_ref().map(|_| "[REDACTED]"),
        );
    };
    (@field $builder:ident, $self:ident, $field:ident) => {
        $builder.field(stringify!($field), &$self.$field);
    };

    (@fields $builder:ident, $self:ident,) => {};
    (@fields $builder:ident, $self:ident, redact($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, redact_option($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact_option($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, $field:ident, $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, $field);
        redact_debug!(@fields $builder, $self, $($rest)*);
    };

    ($struct_name:ident, $($fields:tt)*) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut builder = f.debug_struct(stringify!($struct_name));
                redact_debug!(@fields builder, self, $($fields)*);
                builder.finish()
            }
        }
    };
}

// Declared after the macro so they can use `redact_debug!`
mod agent;
mod channels;
mod providers;

pub use agent::*;
pub use channels::*;
pub use providers::*;

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9891
}

/// HTTP listener receiving platform callbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), GatewayError> {
        self.validate_agent()?;
        self.validate_moderation()?;
        self.validate_gateway()?;
        self.validate_channels()?;
        Ok(())
    }

    fn validate_agent(&self) -> Result<(), GatewayError> {
        let a = &self.agent;
        if a.workers == 0 {
            return Err(GatewayError::Config("agent.workers must be > 0".into()));
        }
        if a.inbound_capacity == 0 {
            return Err(GatewayError::Config(
                "agent.inboundCapacity must be > 0".into(),
            ));
        }
        if a.max_sessions == 0 {
            return Err(GatewayError::Config("agent.maxSessions must be > 0".into()));
        }
        if a.image_create_prefix.iter().any(String::is_empty) {
            return Err(GatewayError::Config(
                "agent.imageCreatePrefix entries must not be empty".into(),
            ));
        }
        if a.image_create_prefix.is_empty() {
            warn!("agent.imageCreatePrefix is empty, image creation is disabled");
        }
        Ok(())
    }

    fn validate_moderation(&self) -> Result<(), GatewayError> {
        let m = &self.moderation;
        if m.retry_offsets_secs.is_empty() {
            return Err(GatewayError::Config(
                "moderation.retryOffsetsSecs must contain at least one offset".into(),
            ));
        }
        if m.retry_offsets_secs.windows(2).any(|w| w[0] >= w[1]) {
            return Err(GatewayError::Config(
                "moderation.retryOffsetsSecs must be strictly increasing".into(),
            ));
        }
        if m.attempt_timeout_secs == 0 {
            return Err(GatewayError::Config(
                "moderation.attemptTimeoutSecs must be > 0".into(),
            ));
        }
        if m.max_pending_checks == 0 {
            return Err(GatewayError::Config(
                "moderation.maxPendingChecks must be > 0".into(),
            ));
        }
        let last = m.retry_offsets_secs.last().copied().unwrap_or(0);
        if m.await_timeout_secs <= last {
            return Err(GatewayError::Config(format!(
                "moderation.awaitTimeoutSecs ({}) must exceed the last retry offset ({last})",
                m.await_timeout_secs
            )));
        }
        if m.await_timeout_secs < last + m.attempt_timeout_secs {
            warn!(
                "moderation.awaitTimeoutSecs ({}) is shorter than the last attempt can take ({}s), late verdicts will be discarded",
                m.await_timeout_secs,
                last + m.attempt_timeout_secs
            );
        }
        if !m.enabled {
            warn!("moderation is disabled, generated images are delivered without review");
        }
        Ok(())
    }

    fn validate_gateway(&self) -> Result<(), GatewayError> {
        if self.gateway.port == 0 {
            return Err(GatewayError::Config("gateway.port must be > 0".into()));
        }
        Ok(())
    }

    fn validate_channels(&self) -> Result<(), GatewayError> {
        let feishu = &self.channels.feishu;
        if feishu.enabled {
            if feishu.app_id.is_empty() || feishu.app_secret.is_empty() {
                return Err(GatewayError::Config(
                    "channels.feishu.appId and appSecret are required when enabled".into(),
                ));
            }
            if feishu.verification_token.is_empty() {
                warn!("channels.feishu.verificationToken is empty, event callbacks are not authenticated");
            }
            if feishu.bot_name.is_empty() {
                warn!("channels.feishu.botName is empty, group messages will be ignored");
            }
        }
        let wechat = &self.channels.wechat;
        if wechat.enabled {
            if wechat.bridge_url.is_empty() {
                return Err(GatewayError::Config(
                    "channels.wechat.bridgeUrl is required when enabled".into(),
                ));
            }
            if url::Url::parse(&wechat.bridge_url).is_err() {
                return Err(GatewayError::Config(format!(
                    "channels.wechat.bridgeUrl is not a valid URL: {}",
                    wechat.bridge_url
                )));
            }
        }
        Ok(())
    }
}
