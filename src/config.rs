use base64::Engine;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;

/// Process-wide configuration, resolved once on first access.
pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    Config::load().unwrap_or_else(|e| {
        eprintln!("invalid configuration, falling back to defaults: {e}");
        Config::default()
    })
});

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub mail: MailConfig,
    pub upload: UploadConfig,
    pub logging: LoggingConfig,
    pub fetch: FetchConfig,
}

impl Config {
    /// Defaults, then `config.toml`, then `TOLLGATE_*` env vars, then the
    /// legacy `DATABASE_URL` / `DB_NAME` variables.
    pub fn load() -> Result<Self, figment::Error> {
        let mut cfg: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("TOLLGATE_").split("__"))
            .extract()?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            cfg.database.url = url;
        } else if let Ok(name) = std::env::var("DB_NAME") {
            cfg.database.url = format!("sqlite://{name}.db");
        }
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Base used when building links sent by email.
    pub public_base_url: String,
    /// Base64 master key for private cookies. Random per process when unset.
    pub cookie_key: Option<String>,
    pub insecure_cookie: bool,
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            public_base_url: "http://localhost:8000".to_string(),
            cookie_key: None,
            insecure_cookie: false,
            body_limit_bytes: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Decoded cookie master key, if one is configured and long enough.
    pub fn cookie_key_bytes(&self) -> Option<Vec<u8>> {
        let raw = self.cookie_key.as_deref()?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(raw.trim())
            .ok()?;
        (bytes.len() >= 64).then_some(bytes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://tollgate.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub max_failed_attempts: i64,
    pub lockout_minutes: i64,
    pub session_ttl_hours: i64,
    pub min_password_len: usize,
    pub reset_token_ttl_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_minutes: 15,
            session_ttl_hours: 24,
            min_password_len: 8,
            reset_token_ttl_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub smtp_host: Option<String>,
    pub smtp_user: Option<String>,
    pub smtp_pass: Option<String>,
    pub from_address: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_user: None,
            smtp_pass: None,
            from_address: "no-reply@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub thumb_dir: PathBuf,
    pub max_bytes: usize,
    pub thumb_max_width: u32,
    pub thumb_max_height: u32,
    pub max_pixels: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("uploads"),
            thumb_dir: PathBuf::from("uploads/thumbs"),
            max_bytes: 5 * 1024 * 1024,
            thumb_max_width: 200,
            thumb_max_height: 200,
            max_pixels: 40_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
    pub max_file_bytes: u64,
    pub json: bool,
    pub redact_keys: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some(PathBuf::from("logs/app.log")),
            max_file_bytes: 10 * 1024 * 1024,
            json: false,
            redact_keys: [
                "password",
                "passwd",
                "secret",
                "token",
                "api_key",
                "apikey",
                "authorization",
                "cookie",
                "credit_card",
                "card_number",
                "cvv",
                "ssn",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub allowed_schemes: Vec<String>,
    pub allowed_ports: Vec<u16>,
    pub blocked_hosts: Vec<String>,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    pub max_redirects: usize,
    pub max_body_bytes: usize,
    pub strip_active_content: bool,
    pub requests_per_minute: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            allowed_schemes: vec!["http".to_string(), "https".to_string()],
            allowed_ports: vec![80, 443],
            blocked_hosts: [
                "localhost",
                "metadata",
                "metadata.google.internal",
                "metadata.azure.com",
                "instance-data",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            connect_timeout_secs: 5,
            timeout_secs: 15,
            max_redirects: 3,
            max_body_bytes: 2 * 1024 * 1024,
            strip_active_content: true,
            requests_per_minute: 30,
        }
    }
}
