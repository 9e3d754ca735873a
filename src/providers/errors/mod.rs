use crate::errors::GatewayError;
use crate::providers::base::ProviderMetrics;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tracing::{error, warn};

/// Maps HTTP failures of OpenAI-compatible APIs to [`GatewayError`].
pub struct ProviderErrorHandler;

impl ProviderErrorHandler {
    /// Parse an API error body into a typed error. 5xx statuses are retryable.
    pub fn parse_api_error(status: u16, error_text: &str) -> GatewayError {
        let retryable = matches!(status, 500 | 502 | 503 | 504);

        if let Ok(error_json) = serde_json::from_str::<Value>(error_text)
            && let Some(err) = error_json.get("error")
        {
            // OpenAI nests {type, message}; DashScope puts {code, message} at the top level
            let error_type = err
                .get("type")
                .or_else(|| err.get("code"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            let error_msg = err
                .get("message")
                .and_then(|v| v.as_str())
                .or_else(|| err.as_str())
                .unwrap_or("Unknown error");

            if error_type == "model_not_found" {
                return GatewayError::Provider {
                    message: format!(
                        "{}\nCheck providers.openai.model in ~/.chatgate/config.json.",
                        error_msg
                    ),
                    retryable: false,
                };
            }

            return GatewayError::Provider {
                message: format!("API error ({}): {}", error_type, error_msg),
                retryable,
            };
        }

        GatewayError::Provider {
            message: format!("API error ({}): {}", status, error_text),
            retryable,
        }
    }

    pub fn log_and_handle_error(e: &anyhow::Error, provider_name: &str, operation: &str) {
        error!(
            "{} provider error during {}: {}",
            provider_name, operation, e
        );
    }

    pub fn handle_rate_limit(status: u16, retry_after: Option<u64>) -> GatewayError {
        if let Some(seconds) = retry_after {
            warn!("Rate limit hit. Retry after {} seconds", seconds);
        } else {
            warn!("Rate limit hit (status: {})", status);
        }
        GatewayError::RateLimit { retry_after }
    }

    pub fn handle_auth_error(status: u16, error_text: &str) -> GatewayError {
        warn!("Authentication error (status: {}): {}", status, error_text);
        GatewayError::Auth(format!(
            "Authentication failed. Please check your API key. Error: {}",
            error_text
        ))
    }

    /// Check HTTP status and return a typed error if the response is not successful.
    /// On error, consumes the response body to extract error details.
    pub async fn check_http_status(
        resp: reqwest::Response,
        provider: &str,
        operation: &str,
    ) -> Result<reqwest::Response, GatewayError> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        let error_text = resp
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());

        if status == 429 {
            Self::log_and_handle_error(&anyhow::anyhow!("Rate limit exceeded"), provider, operation);
            return Err(Self::handle_rate_limit(status.as_u16(), retry_after));
        }

        if status == 401 || status == 403 {
            Self::log_and_handle_error(
                &anyhow::anyhow!("Authentication failed"),
                provider,
                operation,
            );
            return Err(Self::handle_auth_error(status.as_u16(), &error_text));
        }

        Self::log_and_handle_error(&anyhow::anyhow!("API error {}", status), provider, operation);
        Err(Self::parse_api_error(status.as_u16(), &error_text))
    }

    /// Check an HTTP response for errors (rate limit, auth, generic API errors).
    /// Returns the response body as JSON on success, or a typed error on failure.
    pub async fn check_response(
        resp: reqwest::Response,
        provider: &str,
        operation: &str,
        metrics: &Arc<Mutex<ProviderMetrics>>,
    ) -> Result<Value, GatewayError> {
        let resp = match Self::check_http_status(resp, provider, operation).await {
            Ok(resp) => resp,
            Err(e) => {
                if let Ok(mut m) = metrics.lock() {
                    m.error_count += 1;
                }
                return Err(e);
            }
        };

        let json: Value = resp.json().await.map_err(|e| {
            GatewayError::Internal(anyhow::anyhow!(
                "Failed to parse {} API response: {}",
                provider,
                e
            ))
        })?;

        // Some compatible gateways answer 200 with an error object
        if let Some(error_val) = json.get("error").filter(|v| !v.is_null()) {
            if let Ok(mut m) = metrics.lock() {
                m.error_count += 1;
            }
            let error_text = serde_json::to_string(&json!({ "error": error_val }))
                .unwrap_or_else(|_| "Unknown error".to_string());
            Self::log_and_handle_error(
                &anyhow::anyhow!("API error in response"),
                provider,
                operation,
            );
            return Err(Self::parse_api_error(200, &error_text));
        }

        Ok(json)
    }
}

#[cfg(test)]
mod tests;
