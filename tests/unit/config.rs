use inbox_relay::config::{
    apply_env_overrides, expand_tilde, load_config, resolve_config_path, resolve_database_url,
    webhook_url, Config,
};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_config() {
    let cfg = Config::default();
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 8080);
    assert_eq!(cfg.server.public_url, "http://localhost:8080");
    assert!(cfg.auth.api_key.is_none());
    assert!(cfg.gateway.global_token.is_none());
    assert_eq!(cfg.http.timeout_seconds, 30);
    assert_eq!(cfg.media.ffmpeg_path, "ffmpeg");
}

#[test]
fn test_default_database_config() {
    let cfg = Config::default();
    assert!(cfg.database.url.is_none());
    assert_eq!(cfg.database.sqlite_path, "~/.inbox-relay/sessions.sqlite");
}

#[test]
fn test_expand_tilde() {
    let path = expand_tilde("~/.inbox-relay/x.json");
    assert!(!path.to_string_lossy().starts_with('~'));
    assert!(path.to_string_lossy().ends_with(".inbox-relay/x.json"));
}

#[test]
fn test_resolve_database_url_postgres() {
    let mut cfg = Config::default();
    cfg.database.url = Some("postgres://localhost/relay".to_string());
    assert_eq!(resolve_database_url(&cfg), "postgres://localhost/relay");
}

#[test]
fn test_resolve_database_url_creates_parent() {
    let dir = TempDir::new().unwrap();
    let mut cfg = Config::default();
    let path = dir.path().join("nested").join("sessions.sqlite");
    cfg.database.sqlite_path = path.to_string_lossy().to_string();
    let url = resolve_database_url(&cfg);
    assert_eq!(url, format!("sqlite://{}?mode=rwc", path.to_string_lossy()));
    assert!(dir.path().join("nested").is_dir());
}

#[test]
fn test_webhook_urls() {
    assert_eq!(
        webhook_url("https://relay.example.com", "gateway", "s1"),
        "https://relay.example.com/gateway/webhook/s1"
    );
    assert_eq!(
        webhook_url("https://relay.example.com/", "support", "s1"),
        "https://relay.example.com/support/webhook/s1"
    );
}

#[test]
fn test_unknown_fields_are_ignored() {
    let cfg: Config = serde_json::from_str(r#"{"gateway": {"base_url": "http://gw", "extra": 1}}"#).unwrap();
    assert_eq!(cfg.gateway.base_url, "http://gw");
}

// Environment variables are process-wide, so everything touching them lives
// in this one test.
#[test]
fn test_file_and_env_layering() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("inbox-relay.json");
    fs::write(
        &file,
        r#"{"server": {"port": 9100, "public_url": "https://file.example"},
            "gateway": {"base_url": "http://gw.file", "global_token": "file-token"}}"#,
    )
    .unwrap();

    std::env::remove_var("INBOX_RELAY_CONFIG");
    assert!(resolve_config_path()
        .to_string_lossy()
        .ends_with(".inbox-relay/inbox-relay.json"));

    std::env::set_var("INBOX_RELAY_CONFIG", &file);
    std::env::set_var("INBOX_RELAY_PORT", "9200");
    std::env::set_var("INBOX_RELAY_API_KEY", "secret");
    std::env::set_var("INBOX_RELAY_GATEWAY_TOKEN", "  ");
    assert_eq!(resolve_config_path(), file);

    let cfg = load_config();
    assert_eq!(cfg.server.port, 9200);
    assert_eq!(cfg.server.public_url, "https://file.example");
    assert_eq!(cfg.auth.api_key.as_deref(), Some("secret"));
    assert_eq!(cfg.gateway.base_url, "http://gw.file");
    assert_eq!(cfg.gateway.global_token.as_deref(), Some("file-token"));

    std::env::set_var("INBOX_RELAY_PORT", "not-a-port");
    let mut cfg = Config::default();
    apply_env_overrides(&mut cfg);
    assert_eq!(cfg.server.port, 8080);

    fs::write(&file, "{ broken").unwrap();
    let cfg = load_config();
    assert_eq!(cfg.gateway.base_url, Config::default().gateway.base_url);

    for key in [
        "INBOX_RELAY_CONFIG",
        "INBOX_RELAY_PORT",
        "INBOX_RELAY_API_KEY",
        "INBOX_RELAY_GATEWAY_TOKEN",
    ] {
        std::env::remove_var(key);
    }
}
