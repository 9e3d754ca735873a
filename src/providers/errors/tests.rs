use super::*;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn test_parse_api_error_with_json_body() {
    let error_json = r#"{"error": {"type": "invalid_request_error", "message": "bad request"}}"#;
    match ProviderErrorHandler::parse_api_error(400, error_json) {
        GatewayError::Provider { message, retryable } => {
            assert!(message.contains("invalid_request_error"));
            assert!(message.contains("bad request"));
            assert!(!retryable);
        }
        other => panic!("expected Provider error, got {:?}", other),
    }
}

#[test]
fn test_parse_api_error_server_errors_are_retryable() {
    let error_json = r#"{"error": {"type": "server_error", "message": "internal"}}"#;
    for status in [500, 502, 503, 504] {
        let err = ProviderErrorHandler::parse_api_error(status, error_json);
        assert!(err.is_retryable(), "status {} should be retryable", status);
    }
    assert!(!ProviderErrorHandler::parse_api_error(400, error_json).is_retryable());
}

#[test]
fn test_parse_api_error_non_json_body() {
    match ProviderErrorHandler::parse_api_error(500, "plain text error") {
        GatewayError::Provider { message, retryable } => {
            assert!(message.contains("500"));
            assert!(message.contains("plain text error"));
            assert!(retryable);
        }
        other => panic!("expected Provider error, got {:?}", other),
    }
}

#[test]
fn test_parse_api_error_model_not_found() {
    let error_json =
        r#"{"error": {"code": "model_not_found", "message": "The model `gpt-9` does not exist"}}"#;
    match ProviderErrorHandler::parse_api_error(404, error_json) {
        GatewayError::Provider { message, retryable } => {
            assert!(message.contains("gpt-9"));
            assert!(message.contains("providers.openai.model"));
            assert!(!retryable);
        }
        other => panic!("expected Provider error, got {:?}", other),
    }
}

#[test]
fn test_handle_rate_limit_keeps_hint() {
    assert!(matches!(
        ProviderErrorHandler::handle_rate_limit(429, Some(30)),
        GatewayError::RateLimit {
            retry_after: Some(30)
        }
    ));
    assert!(matches!(
        ProviderErrorHandler::handle_rate_limit(429, None),
        GatewayError::RateLimit { retry_after: None }
    ));
}

#[test]
fn test_handle_auth_error() {
    match ProviderErrorHandler::handle_auth_error(401, "invalid token") {
        GatewayError::Auth(msg) => {
            assert!(msg.contains("invalid token"));
            assert!(msg.contains("Authentication failed"));
        }
        other => panic!("expected Auth error, got {:?}", other),
    }
}

async fn respond(template: ResponseTemplate) -> reqwest::Response {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(template)
        .mount(&server)
        .await;
    reqwest::Client::new()
        .post(server.uri())
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_check_response_maps_statuses() {
    let metrics = Arc::new(Mutex::new(ProviderMetrics::default()));

    let resp = respond(ResponseTemplate::new(429).insert_header("retry-after", "7")).await;
    let err = ProviderErrorHandler::check_response(resp, "openai", "chat", &metrics)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::RateLimit {
            retry_after: Some(7)
        }
    ));

    let resp = respond(ResponseTemplate::new(401).set_body_string("bad key")).await;
    let err = ProviderErrorHandler::check_response(resp, "openai", "chat", &metrics)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Auth(_)));

    assert_eq!(metrics.lock().unwrap().error_count, 2);
}

#[tokio::test]
async fn test_check_response_detects_error_in_ok_body() {
    let metrics = Arc::new(Mutex::new(ProviderMetrics::default()));
    let resp = respond(ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "error": {"type": "insufficient_quota", "message": "quota exceeded"}
    })))
    .await;

    let err = ProviderErrorHandler::check_response(resp, "openai", "chat", &metrics)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("insufficient_quota"));
    assert_eq!(metrics.lock().unwrap().error_count, 1);
}

#[tokio::test]
async fn test_check_response_passes_json_through() {
    let metrics = Arc::new(Mutex::new(ProviderMetrics::default()));
    let resp = respond(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": 1}))).await;

    let json = ProviderErrorHandler::check_response(resp, "openai", "chat", &metrics)
        .await
        .unwrap();
    assert_eq!(json["ok"], 1);
}
