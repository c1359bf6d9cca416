//! Configuration management
//!
//! Configuration is read from `config.yml` and can be overridden with
//! `COURSEHUB_*` environment variables. Missing values fall back to defaults
//! suitable for local development.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server
    #[serde(default)]
    pub server: ServerConfig,
    /// Relational store
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Read cache
    #[serde(default)]
    pub cache: CacheConfig,
    /// Identity provider session tokens
    #[serde(default)]
    pub auth: AuthConfig,
    /// Video provider
    #[serde(default)]
    pub video: VideoConfig,
    /// Payment provider
    #[serde(default)]
    pub payments: PaymentsConfig,
    /// Catalogue seeding
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (the storefront)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/coursehub.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    #[default]
    Sqlite,
    Mysql,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache driver (memory or redis)
    #[serde(default)]
    pub driver: CacheDriver,
    /// Redis connection URL
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Upper bound on how long a catalogue read stays cached
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: CacheDriver::default(),
            redis_url: None,
            ttl_seconds: default_ttl(),
        }
    }
}

fn default_ttl() -> u64 {
    600
}

/// Cache driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriver {
    #[default]
    Memory,
    Redis,
}

/// Session token verification settings
///
/// The identity provider signs session tokens with a shared secret (HS256).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared signing secret
    #[serde(default)]
    pub session_secret: String,
    /// Expected `iss` claim; not checked when unset
    #[serde(default)]
    pub issuer: Option<String>,
    /// Clock skew tolerated on `exp` / `nbf`
    #[serde(default = "default_leeway")]
    pub leeway_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: String::new(),
            issuer: None,
            leeway_seconds: default_leeway(),
        }
    }
}

fn default_leeway() -> u64 {
    5
}

/// Video provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    #[serde(default = "default_video_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub token_id: String,
    #[serde(default)]
    pub token_secret: String,
    /// Secret used to sign webhook deliveries
    #[serde(default)]
    pub webhook_secret: String,
    /// Origin allowed to PUT the file to a direct-upload URL
    #[serde(default = "default_upload_cors_origin")]
    pub cors_origin: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            api_url: default_video_api_url(),
            token_id: String::new(),
            token_secret: String::new(),
            webhook_secret: String::new(),
            cors_origin: default_upload_cors_origin(),
        }
    }
}

fn default_video_api_url() -> String {
    "https://api.mux.com".to_string()
}

fn default_upload_cors_origin() -> String {
    "*".to_string()
}

/// Payment provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentsConfig {
    #[serde(default = "default_payments_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub secret_key: String,
    /// Secret used to sign webhook deliveries
    #[serde(default)]
    pub webhook_secret: String,
    /// ISO currency code for course prices
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Expose the development-only refund action
    #[serde(default)]
    pub dev_refunds: bool,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            api_url: default_payments_api_url(),
            secret_key: String::new(),
            webhook_secret: String::new(),
            currency: default_currency(),
            dev_refunds: false,
        }
    }
}

fn default_payments_api_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_currency() -> String {
    "usd".to_string()
}

/// Catalogue seeding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Tags created at startup if missing
    #[serde(default = "default_tags")]
    pub tags: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            tags: default_tags(),
        }
    }
}

fn default_tags() -> Vec<String> {
    ["Development", "Design", "Business", "Marketing", "Photography", "Music"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
}

impl Config {
    /// Load configuration from file
    ///
    /// A missing or empty file yields the default configuration.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })?;

        Ok(config)
    }

    /// Load configuration from file, then apply environment overrides
    ///
    /// Recognised variables:
    /// - COURSEHUB_SERVER_HOST, COURSEHUB_SERVER_PORT, COURSEHUB_SERVER_CORS_ORIGIN
    /// - COURSEHUB_DATABASE_DRIVER, COURSEHUB_DATABASE_URL
    /// - COURSEHUB_CACHE_DRIVER, COURSEHUB_CACHE_REDIS_URL, COURSEHUB_CACHE_TTL_SECONDS
    /// - COURSEHUB_AUTH_SESSION_SECRET, COURSEHUB_AUTH_ISSUER
    /// - COURSEHUB_VIDEO_TOKEN_ID, COURSEHUB_VIDEO_TOKEN_SECRET, COURSEHUB_VIDEO_WEBHOOK_SECRET
    /// - COURSEHUB_PAYMENTS_SECRET_KEY, COURSEHUB_PAYMENTS_WEBHOOK_SECRET, COURSEHUB_PAYMENTS_DEV_REFUNDS
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("COURSEHUB_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("COURSEHUB_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("COURSEHUB_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(driver) = std::env::var("COURSEHUB_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("COURSEHUB_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(driver) = std::env::var("COURSEHUB_CACHE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "memory" => self.cache.driver = CacheDriver::Memory,
                "redis" => self.cache.driver = CacheDriver::Redis,
                _ => {}
            }
        }
        if let Ok(redis_url) = std::env::var("COURSEHUB_CACHE_REDIS_URL") {
            self.cache.redis_url = Some(redis_url);
        }
        if let Ok(ttl) = std::env::var("COURSEHUB_CACHE_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.cache.ttl_seconds = ttl;
            }
        }

        if let Ok(secret) = std::env::var("COURSEHUB_AUTH_SESSION_SECRET") {
            self.auth.session_secret = secret;
        }
        if let Ok(issuer) = std::env::var("COURSEHUB_AUTH_ISSUER") {
            self.auth.issuer = Some(issuer);
        }

        if let Ok(token_id) = std::env::var("COURSEHUB_VIDEO_TOKEN_ID") {
            self.video.token_id = token_id;
        }
        if let Ok(token_secret) = std::env::var("COURSEHUB_VIDEO_TOKEN_SECRET") {
            self.video.token_secret = token_secret;
        }
        if let Ok(secret) = std::env::var("COURSEHUB_VIDEO_WEBHOOK_SECRET") {
            self.video.webhook_secret = secret;
        }

        if let Ok(key) = std::env::var("COURSEHUB_PAYMENTS_SECRET_KEY") {
            self.payments.secret_key = key;
        }
        if let Ok(secret) = std::env::var("COURSEHUB_PAYMENTS_WEBHOOK_SECRET") {
            self.payments.webhook_secret = secret;
        }
        if let Ok(flag) = std::env::var("COURSEHUB_PAYMENTS_DEV_REFUNDS") {
            if let Ok(flag) = flag.parse::<bool>() {
                self.payments.dev_refunds = flag;
            }
        }
    }
}

/// Format YAML parsing error with location
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    match e.location() {
        Some(location) => format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        ),
        None => e.to_string(),
    }
}

// Tests touching process environment share this lock.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
