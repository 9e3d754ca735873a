use anyhow::{Context, Result, bail};
use reqwest::{Client, Response};
use std::time::Duration;

/// Default maximum body size for media downloads (10 MB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Build a `reqwest::Client` with standard timeouts (10 s connect, 30 s overall).
///
/// Falls back to the default client if the builder fails.
pub fn default_http_client() -> Client {
    http_client_with_timeout(Duration::from_secs(30))
}

pub fn http_client_with_timeout(timeout: Duration) -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Downloaded media with the server-reported content type, if any.
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// GET `url` and read at most `max_bytes` of the body. Non-success statuses
/// and oversized bodies are errors; media is never delivered truncated.
pub async fn download(client: &Client, url: &str, max_bytes: usize) -> Result<Download> {
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("download failed: {}", url))?;
    let status = resp.status();
    if !status.is_success() {
        bail!("download of {} returned HTTP {}", url, status);
    }
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let (bytes, truncated) = limited_body(resp, max_bytes).await?;
    if truncated {
        bail!("download of {} exceeds {} bytes", url, max_bytes);
    }
    Ok(Download {
        bytes,
        content_type,
    })
}

/// Read a response body as bytes with a size limit.
///
/// - Checks the `Content-Length` header first; rejects immediately if over limit.
/// - Streams via `chunk()` with a running counter; truncates at the limit.
/// - Returns `(bytes, was_truncated)`.
pub async fn limited_body(resp: Response, max_bytes: usize) -> Result<(Vec<u8>, bool)> {
    if let Some(cl) = resp.content_length()
        && cl as usize > max_bytes
    {
        bail!(
            "response body too large: Content-Length {} exceeds limit {}",
            cl,
            max_bytes
        );
    }

    let mut buf = Vec::new();
    let mut stream = resp;
    while let Some(chunk) = stream.chunk().await? {
        if buf.len() + chunk.len() > max_bytes {
            let remaining = max_bytes.saturating_sub(buf.len());
            buf.extend_from_slice(&chunk[..remaining]);
            return Ok((buf, true));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((buf, false))
}
