use super::*;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(api_base: &str) -> DashScopeConfig {
    DashScopeConfig {
        api_key: "ds_key".into(),
        api_base: api_base.into(),
        ..DashScopeConfig::default()
    }
}

#[tokio::test]
async fn test_synthesize_downloads_audio() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TTS_PATH))
        .and(header("Authorization", "Bearer ds_key"))
        .and(body_json(json!({
            "model": "qwen3-tts-flash",
            "input": {"text": "你好", "voice": "Cherry", "language_type": "Auto"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {"audio": {"url": format!("{}/audio/1.wav", server.uri())}}
        })))
        .expect(1)
        .mount(&server)
        .await;
    let mut wav = b"RIFF\0\0\0\0WAVEfmt ".to_vec();
    wav.extend_from_slice(&[0u8; 16]);
    Mock::given(method("GET"))
        .and(path("/audio/1.wav"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(wav.clone()))
        .mount(&server)
        .await;

    let speech = DashScopeSpeech::new(config(&server.uri()));
    let clip = speech.synthesize("你好").await.unwrap();
    assert_eq!(clip.mime, "audio/wav");
    assert_eq!(clip.data, wav);
    assert_eq!(speech.metrics().request_count, 1);
}

#[tokio::test]
async fn test_content_type_decides_format() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {"audio": {"url": format!("{}/audio/2", server.uri())}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/audio/2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/mpeg")
                .set_body_bytes(vec![1, 2, 3, 4]),
        )
        .mount(&server)
        .await;

    let clip = DashScopeSpeech::new(config(&server.uri()))
        .synthesize("hi")
        .await
        .unwrap();
    assert_eq!(clip.mime, "audio/mpeg");
}

#[tokio::test]
async fn test_missing_audio_url_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {"finish_reason": "stop"},
            "request_id": "r1"
        })))
        .mount(&server)
        .await;

    let err = DashScopeSpeech::new(config(&server.uri()))
        .synthesize("hi")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no audio url"));
}

#[tokio::test]
async fn test_failed_download_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {"audio": {"url": format!("{}/gone", server.uri())}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(
        DashScopeSpeech::new(config(&server.uri()))
            .synthesize("hi")
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_missing_api_key_fails_without_request() {
    let speech = DashScopeSpeech::new(DashScopeConfig::default());
    let err = speech.synthesize("hi").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<GatewayError>(),
        Some(GatewayError::Config(_))
    ));
}
