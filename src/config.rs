use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    pub support: SupportConfig,
    pub gateway: GatewayConfig,
    pub http: HttpConfig,
    pub media: MediaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL, used to build webhook URLs.
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_url: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub sqlite_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            sqlite_path: "~/.inbox-relay/sessions.sqlite".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportConfig {
    pub base_url: String,
}

impl Default for SupportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Provisioning key, sent as `apikey` on every gateway call.
    pub global_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8083".to_string(),
            global_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_seconds: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub ffmpeg_path: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn resolve_config_path() -> PathBuf {
    env::var("INBOX_RELAY_CONFIG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| expand_tilde("~/.inbox-relay/inbox-relay.json"))
}

fn env_override(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn load_config() -> Config {
    let config_path = resolve_config_path();
    let mut cfg = Config::default();

    if config_path.exists() {
        match fs::read_to_string(&config_path) {
            Ok(raw) => match serde_json::from_str::<Config>(&raw) {
                Ok(file_cfg) => cfg = file_cfg,
                Err(err) => tracing::warn!(
                    "ignoring unparsable config {}: {err}",
                    config_path.display()
                ),
            },
            Err(err) => tracing::warn!("cannot read config {}: {err}", config_path.display()),
        }
    }

    apply_env_overrides(&mut cfg);
    cfg
}

pub fn apply_env_overrides(cfg: &mut Config) {
    if let Some(host) = env_override("INBOX_RELAY_HOST") {
        cfg.server.host = host;
    }
    if let Some(port) = env_override("INBOX_RELAY_PORT") {
        match port.trim().parse() {
            Ok(port) => cfg.server.port = port,
            Err(_) => tracing::warn!("ignoring invalid INBOX_RELAY_PORT={port}"),
        }
    }
    if let Some(url) = env_override("INBOX_RELAY_PUBLIC_URL") {
        cfg.server.public_url = url;
    }
    if let Some(key) = env_override("INBOX_RELAY_API_KEY") {
        cfg.auth.api_key = Some(key);
    }
    if let Some(url) = env_override("INBOX_RELAY_DATABASE_URL") {
        cfg.database.url = Some(url);
    }
    if let Some(path) = env_override("INBOX_RELAY_SQLITE_PATH") {
        cfg.database.sqlite_path = path;
    }
    if let Some(url) = env_override("INBOX_RELAY_SUPPORT_URL") {
        cfg.support.base_url = url;
    }
    if let Some(url) = env_override("INBOX_RELAY_GATEWAY_URL") {
        cfg.gateway.base_url = url;
    }
    if let Some(token) = env_override("INBOX_RELAY_GATEWAY_TOKEN") {
        cfg.gateway.global_token = Some(token);
    }
    if let Some(path) = env_override("INBOX_RELAY_FFMPEG") {
        cfg.media.ffmpeg_path = path;
    }
}

pub fn resolve_database_url(cfg: &Config) -> String {
    if let Some(url) = cfg.database.url.as_ref() {
        return url.to_string();
    }

    let path = expand_tilde(&cfg.database.sqlite_path);
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    format!("sqlite://{}?mode=rwc", path.to_string_lossy())
}

/// `<public_url>/<prefix>/webhook/<session_id>`.
pub fn webhook_url(public_url: &str, prefix: &str, session_id: &str) -> String {
    format!(
        "{}/{}/webhook/{}",
        public_url.trim_end_matches('/'),
        prefix.trim_matches('/'),
        session_id
    )
}
