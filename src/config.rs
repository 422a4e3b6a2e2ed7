//! Configuration loading and constants.
//!
//! Loads application configuration from a TOML file, applies environment
//! overrides on top of it, and validates the result. `AppConfig` is the root
//! configuration struct; it is built once at startup and shared read-only.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use const_format::formatcp;
use serde::{Deserialize, Serialize};

// =============================================================================
// Transport Constants
// =============================================================================

/// Per-request read/write bound applied in every transport mode
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace period given to in-flight connections when the listener stops
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Private key probed in the application directory for static TLS
pub const TLS_KEY_FILE: &str = "server.key";

/// Certificate probed in the application directory for static TLS
pub const TLS_CERT_FILE: &str = "server.crt";

/// HSTS lifetime sent in TLS modes (two years)
pub const HSTS_MAX_AGE: u32 = 63072000;

pub const HSTS_HEADER_VALUE: &str = formatcp!("max-age={}; includeSubDomains", HSTS_MAX_AGE);

/// API responses depend on credentials and must not be cached upstream
pub const CACHE_CONTROL_API: &str = "no-store";

// =============================================================================
// Session Constants
// =============================================================================

/// Cookie carrying the signed session token
pub const SESSION_COOKIE: &str = "statping_auth";

/// Query parameter carrying the API secret
pub const API_QUERY_PARAM: &str = "api";

/// Default session lifetime in hours
pub const DEFAULT_SESSION_LIFETIME_HOURS: u64 = 72;

/// Upper bound on the configured session lifetime (ten years)
pub const MAX_SESSION_LIFETIME_HOURS: u64 = 24 * 365 * 10;

// =============================================================================
// Environment Keys
// =============================================================================

/// Environment variable selecting the runtime environment
pub const ENV_RUNTIME: &str = "STATUSD_ENV";

/// Runtime environment values that disable authentication
pub const SETUP_ENVIRONMENTS: [&str; 2] = ["test", "setup"];

pub const ENV_DISABLE_HTTP: &str = "DISABLE_HTTP";
pub const ENV_SERVER_IP: &str = "SERVER_IP";
pub const ENV_SERVER_PORT: &str = "SERVER_PORT";
pub const ENV_HTTPS_PORT: &str = "HTTPS_PORT";
pub const ENV_LETSENCRYPT_ENABLE: &str = "LETSENCRYPT_ENABLE";
pub const ENV_LETSENCRYPT_HOST: &str = "LETSENCRYPT_HOST";
pub const ENV_LETSENCRYPT_EMAIL: &str = "LETSENCRYPT_EMAIL";
pub const ENV_LETSENCRYPT_LOCAL: &str = "LETSENCRYPT_LOCAL";
pub const ENV_API_SECRET: &str = "API_SECRET";
pub const ENV_DIRECTORY: &str = "STATUSD_DIR";

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "statusd=debug,tower_http=info";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Default directory for cached ACME account and certificate material
pub const DEFAULT_ACME_CACHE_DIR: &str = "acme-cache";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Application directory probed for `server.key` / `server.crt`
    #[serde(default = "AppConfig::default_directory")]
    pub directory: PathBuf,
    /// HTTP listener configuration
    #[serde(default)]
    pub http: HttpServerConfig,
    /// TLS / certificate provisioning
    #[serde(default)]
    pub tls: TlsConfig,
    /// Credentials and session settings
    #[serde(default)]
    pub auth: AuthConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    /// Listen address; empty means all interfaces
    #[serde(default)]
    pub host: String,
    #[serde(default = "HttpServerConfig::default_port")]
    pub port: u16,
    /// Port used by the TLS modes
    #[serde(default = "HttpServerConfig::default_https_port")]
    pub https_port: u16,
    /// Skip the listener entirely (something else serves)
    #[serde(default)]
    pub disable: bool,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: Self::default_port(),
            https_port: Self::default_https_port(),
            disable: false,
        }
    }
}

impl HttpServerConfig {
    fn default_port() -> u16 {
        8080
    }

    fn default_https_port() -> u16 {
        443
    }

    /// Address for the plain HTTP listener.
    pub fn plain_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.socket_addr(self.port)
    }

    /// Address for the TLS listener.
    pub fn tls_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.socket_addr(self.https_port)
    }

    fn socket_addr(&self, port: u16) -> Result<SocketAddr, ConfigError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
        }
        let ip: IpAddr = host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse()
            .map_err(|e| ConfigError::Validation(format!("Invalid http.host '{}': {}", host, e)))?;
        Ok(SocketAddr::new(ip, port))
    }
}

/// TLS and automatic certificate provisioning
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Provision certificates automatically via Let's Encrypt
    #[serde(default)]
    pub letsencrypt_enable: bool,
    /// Domains to request certificates for
    #[serde(default)]
    pub letsencrypt_domains: Vec<String>,
    /// ACME account contact email
    #[serde(default)]
    pub letsencrypt_email: Option<String>,
    /// Use the Let's Encrypt staging directory
    #[serde(default)]
    pub letsencrypt_staging: bool,
    /// Directory for ACME account and certificate cache
    #[serde(default = "TlsConfig::default_acme_cache_dir")]
    pub acme_cache_dir: PathBuf,
    /// Redirect plain HTTP on `http.port` to HTTPS in TLS modes
    #[serde(default)]
    pub redirect_http: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            letsencrypt_enable: false,
            letsencrypt_domains: Vec::new(),
            letsencrypt_email: None,
            letsencrypt_staging: false,
            acme_cache_dir: Self::default_acme_cache_dir(),
            redirect_http: false,
        }
    }
}

impl TlsConfig {
    fn default_acme_cache_dir() -> PathBuf {
        PathBuf::from(DEFAULT_ACME_CACHE_DIR)
    }
}

/// Credentials and session settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Secret accepted via `?api=` or the Authorization header; empty disables both
    #[serde(default)]
    pub api_secret: String,
    #[serde(default = "AuthConfig::default_session_lifetime_hours")]
    pub session_lifetime_hours: u64,
    #[serde(default)]
    pub users: Vec<UserConfig>,
    /// Authentication bypass, only ever set from `STATUSD_ENV`
    #[serde(skip)]
    pub setup_mode: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_secret: String::new(),
            session_lifetime_hours: Self::default_session_lifetime_hours(),
            users: Vec::new(),
            setup_mode: false,
        }
    }
}

impl AuthConfig {
    fn default_session_lifetime_hours() -> u64 {
        DEFAULT_SESSION_LIFETIME_HOURS
    }

    pub fn session_lifetime(&self) -> Duration {
        Duration::from_secs(self.session_lifetime_hours.min(MAX_SESSION_LIFETIME_HOURS) * 60 * 60)
    }

    pub fn find_user(&self, username: &str) -> Option<&UserConfig> {
        self.users.iter().find(|u| u.username == username)
    }
}

/// A dashboard account
#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub username: String,
    /// Argon2 PHC string
    pub password_hash: String,
    #[serde(default)]
    pub admin: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

/// Settings view safe to hand to API clients.
#[derive(Debug, Clone, Serialize)]
pub struct PublicSettings {
    pub host: String,
    pub port: u16,
    pub https_port: u16,
    pub letsencrypt_enable: bool,
    pub letsencrypt_staging: bool,
    pub redirect_http: bool,
    pub api_secret_set: bool,
    pub session_lifetime_hours: u64,
    pub users: usize,
    pub log_format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            directory: Self::default_directory(),
            http: HttpServerConfig::default(),
            tls: TlsConfig::default(),
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    fn default_directory() -> PathBuf {
        PathBuf::from(".")
    }

    /// Load from a TOML file, then apply process environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&contents)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply overrides from an environment lookup.
    ///
    /// Unset keys leave the file value untouched.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_RUNTIME) {
            let value = value.trim().to_ascii_lowercase();
            self.auth.setup_mode = SETUP_ENVIRONMENTS.contains(&value.as_str());
        }
        if let Some(value) = lookup(ENV_DISABLE_HTTP) {
            self.http.disable = parse_bool(&value);
        }
        if let Some(value) = lookup(ENV_SERVER_IP) {
            self.http.host = value.trim().to_string();
        }
        if let Some(value) = lookup(ENV_SERVER_PORT) {
            self.http.port = parse_port(ENV_SERVER_PORT, &value)?;
        }
        if let Some(value) = lookup(ENV_HTTPS_PORT) {
            self.http.https_port = parse_port(ENV_HTTPS_PORT, &value)?;
        }
        if let Some(value) = lookup(ENV_LETSENCRYPT_ENABLE) {
            self.tls.letsencrypt_enable = parse_bool(&value);
        }
        if let Some(value) = lookup(ENV_LETSENCRYPT_HOST) {
            self.tls.letsencrypt_domains = value
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(value) = lookup(ENV_LETSENCRYPT_EMAIL) {
            self.tls.letsencrypt_email = Some(value.trim().to_string()).filter(|e| !e.is_empty());
        }
        if let Some(value) = lookup(ENV_LETSENCRYPT_LOCAL) {
            self.tls.letsencrypt_staging = parse_bool(&value);
        }
        if let Some(value) = lookup(ENV_API_SECRET) {
            self.auth.api_secret = value;
        }
        if let Some(value) = lookup(ENV_DIRECTORY) {
            self.directory = PathBuf::from(value);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tls.letsencrypt_enable {
            if self.tls.letsencrypt_domains.is_empty() {
                return Err(ConfigError::Validation(
                    "Let's Encrypt enabled but no domains configured (tls.letsencrypt_domains or LETSENCRYPT_HOST)".to_string(),
                ));
            }
            if self.tls.letsencrypt_email.is_none() {
                return Err(ConfigError::Validation(
                    "Let's Encrypt enabled but no contact email configured (tls.letsencrypt_email or LETSENCRYPT_EMAIL)".to_string(),
                ));
            }
        }
        if !(1..=MAX_SESSION_LIFETIME_HOURS).contains(&self.auth.session_lifetime_hours) {
            return Err(ConfigError::Validation(format!(
                "auth.session_lifetime_hours must be between 1 and {}, got {}",
                MAX_SESSION_LIFETIME_HOURS, self.auth.session_lifetime_hours
            )));
        }
        Ok(())
    }

    pub fn public_settings(&self) -> PublicSettings {
        PublicSettings {
            host: self.http.host.clone(),
            port: self.http.port,
            https_port: self.http.https_port,
            letsencrypt_enable: self.tls.letsencrypt_enable,
            letsencrypt_staging: self.tls.letsencrypt_staging,
            redirect_http: self.tls.redirect_http,
            api_secret_set: !self.auth.api_secret.is_empty(),
            session_lifetime_hours: self.auth.session_lifetime_hours,
            users: self.auth.users.len(),
            log_format: self.logging.format.clone(),
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn parse_port(key: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::Validation(format!("Invalid {} '{}': {}", key, value, e)))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
