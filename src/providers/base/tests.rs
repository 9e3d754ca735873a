use super::*;
use crate::agent::context::ContextKind;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

struct FlakyProvider {
    calls: AtomicUsize,
    failures: Mutex<Vec<anyhow::Error>>,
}

impl FlakyProvider {
    fn new(failures: Vec<anyhow::Error>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failures: Mutex::new(failures),
        }
    }
}

#[async_trait]
impl LLMProvider for FlakyProvider {
    async fn chat(&self, _req: ChatRequest<'_>) -> anyhow::Result<LLMResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.failures.lock().unwrap().pop();
        match next {
            Some(e) => Err(e),
            None => Ok(LLMResponse {
                content: Some("ok".into()),
                input_tokens: None,
                output_tokens: None,
            }),
        }
    }

    fn default_model(&self) -> &'static str {
        "flaky"
    }
}

fn request() -> ChatRequest<'static> {
    ChatRequest {
        messages: vec![Message::user("hi")],
        model: None,
        api_key: None,
        max_tokens: 16,
        temperature: 0.0,
        response_format: None,
    }
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 2,
        initial_delay_ms: 1,
        max_delay_ms: 2,
        backoff_multiplier: 1.0,
    }
}

#[test]
fn message_constructors_set_roles() {
    assert_eq!(Message::system("s").role, "system");
    assert_eq!(Message::user("u").role, "user");
    assert_eq!(Message::assistant("a").role, "assistant");
}

#[tokio::test]
async fn retry_recovers_from_transient_error() {
    let provider = FlakyProvider::new(vec![
        GatewayError::Provider {
            message: "502".into(),
            retryable: true,
        }
        .into(),
    ]);
    let resp = provider
        .chat_with_retry(request(), Some(fast_retry()))
        .await
        .unwrap();
    assert_eq!(resp.content.as_deref(), Some("ok"));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn retry_stops_on_auth_error() {
    let provider = FlakyProvider::new(vec![GatewayError::Auth("bad key".into()).into()]);
    let err = provider
        .chat_with_retry(request(), Some(fast_retry()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Authentication failed"));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retry_gives_up_after_max_retries() {
    let provider = FlakyProvider::new(vec![
        anyhow::anyhow!("connection reset"),
        anyhow::anyhow!("connection reset"),
        anyhow::anyhow!("connection reset"),
    ]);
    assert!(
        provider
            .chat_with_retry(request(), Some(fast_retry()))
            .await
            .is_err()
    );
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
}

struct Echo;

#[async_trait]
impl ReplyGenerator for Echo {
    async fn generate_reply(&self, ctx: &ConversationContext) -> anyhow::Result<Reply> {
        Ok(Reply::text(ctx.content.clone()))
    }
}

#[tokio::test]
async fn default_clear_session_is_noop() {
    let echo = Echo;
    echo.clear_session("anything");
    let reply = echo
        .generate_reply(&ConversationContext::new(ContextKind::Text, "ping"))
        .await
        .unwrap();
    assert_eq!(reply.as_text(), Some("ping"));
}
