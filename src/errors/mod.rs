use thiserror::Error;

/// Typed error hierarchy for chatgate.
///
/// Use at module boundaries (provider calls, channel API calls, config validation).
/// Internal/leaf functions can continue using `anyhow::Result`; the `Internal` variant
/// allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {message}")]
    Provider { message: String, retryable: bool },

    #[error("Rate limit exceeded")]
    RateLimit { retry_after: Option<u64> },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Channel error ({channel}): {message}")]
    Channel { channel: String, message: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Whether this error is transient and the operation should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::RateLimit { .. } | Self::Internal(_) => true,
            Self::Auth(_) | Self::Config(_) | Self::Channel { .. } => false,
        }
    }

    pub fn channel(channel: &str, message: impl Into<String>) -> Self {
        Self::Channel {
            channel: channel.to_string(),
            message: message.into(),
        }
    }
}
