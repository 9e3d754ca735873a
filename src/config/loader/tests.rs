use super::*;

#[test]
fn test_load_config_missing_file_returns_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.gateway.port, 9891);
    assert_eq!(config.agent.image_create_prefix, vec!["画"]);
}

#[test]
fn test_load_config_minimal_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"gateway": {"port": 8080}}"#).unwrap();
    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.gateway.port, 8080);
    assert_eq!(config.moderation.await_timeout_secs, 70);
}

#[test]
fn test_load_config_invalid_json_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{not json").unwrap();
    assert!(load_config(Some(&path)).is_err());
}

#[test]
fn test_load_config_rejects_invalid_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"moderation": {"retryOffsetsSecs": [5, 1]}}"#).unwrap();
    let err = load_config(Some(&path)).unwrap_err();
    assert!(format!("{err:#}").contains("strictly increasing"));
}

#[test]
fn test_save_then_load_preserves_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");
    let mut config = Config::default();
    config.agent.voice_reply = true;
    config.channels.feishu.bot_name = "helper".into();
    save_config(&config, Some(&path)).unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("\"voiceReply\": true"));

    let loaded = load_config(Some(&path)).unwrap();
    assert!(loaded.agent.voice_reply);
    assert_eq!(loaded.channels.feishu.bot_name, "helper");
}

#[cfg(unix)]
#[test]
fn test_save_config_restricts_permissions() {
    use std::os::unix::fs::PermissionsExt;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    save_config(&Config::default(), Some(&path)).unwrap();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
