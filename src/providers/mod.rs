pub mod base;
pub mod bridge;
pub mod dashscope;
pub mod errors;
pub mod openai;

use reqwest::Client;
use std::time::Duration;

/// Connect timeout for provider HTTP clients (seconds).
pub(crate) const PROVIDER_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Build a `reqwest::Client` with the standard provider connect timeout and
/// the given overall request timeout.
pub(crate) fn provider_http_client(request_timeout_secs: u64) -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(PROVIDER_CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(request_timeout_secs.max(1)))
        .build()
        .unwrap_or_else(|_| Client::new())
}
