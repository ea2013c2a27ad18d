use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;

use crate::error::{AssetwayError, Result};
use crate::utils::{get_env_list, get_env_with_prefix};

/// Documented default for the bootstrap credential. Must be changed in production.
pub const DEFAULT_AUTH_KEY: &str = "change_me";

/// Documented default for the token-signing secret. Must be changed in production.
pub const DEFAULT_JWT_SECRET: &str = "change_me";

/// Storage sinks this build knows how to construct.
pub const KNOWN_SINKS: &[&str] = &["memory"];

/// Paths owned by built-in routes; the metrics endpoint may not shadow them.
const RESERVED_PATHS: &[&str] = &["/health", "/auth", "/pkg", "/npm", "/map"];

/// Main configuration, built once at startup and shared read-only.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub service: ServiceConfig,
    pub organization: OrganizationConfig,
    pub auth: AuthConfig,
    pub sink: SinkConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum request body size in bytes (default: 10MB)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
}

/// The organization fronted by this instance and the hostnames that select it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrganizationConfig {
    #[serde(default = "default_org_name")]
    pub name: String,
    #[serde(default = "default_hostnames")]
    pub hostnames: Vec<String>,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Bootstrap credential exchanged at `/auth/login` for a token.
    #[serde(default = "default_auth_key")]
    pub key: String,
    /// Secret used to sign issued tokens.
    #[serde(default = "default_jwt_secret")]
    pub secret: String,
}

// Keep secrets out of Debug output (and therefore out of logs).
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("key", &"[redacted]")
            .field("secret", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SinkConfig {
    #[serde(default = "default_sink")]
    pub kind: String,
}

/// Prometheus exposition of the merged handler telemetry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Serve the exposition endpoint (needs the `metrics` feature)
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            service: ServiceConfig::default(),
            organization: OrganizationConfig::default(),
            auth: AuthConfig::default(),
            sink: SinkConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_metrics_path(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
        }
    }
}

impl Default for OrganizationConfig {
    fn default() -> Self {
        Self {
            name: default_org_name(),
            hostnames: default_hostnames(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            key: default_auth_key(),
            secret: default_jwt_secret(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: default_sink(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4001
}

fn default_max_body_size() -> usize {
    10 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "assetway".to_string()
}

fn default_org_name() -> String {
    "local".to_string()
}

fn default_hostnames() -> Vec<String> {
    vec!["localhost".to_string(), "127.0.0.1".to_string()]
}

fn default_auth_key() -> String {
    DEFAULT_AUTH_KEY.to_string()
}

fn default_jwt_secret() -> String {
    DEFAULT_JWT_SECRET.to_string()
}

fn default_sink() -> String {
    "memory".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl ServerConfig {
    pub fn addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.config.server.max_body_size = max_body_size;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service.name = name.into();
        self
    }

    pub fn with_organization(mut self, name: impl Into<String>) -> Self {
        self.config.organization.name = name.into();
        self
    }

    /// Replace the hostnames that front the organization.
    ///
    /// An empty list disables the tenancy check entirely.
    pub fn with_hostnames<I, S>(mut self, hostnames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.organization.hostnames = hostnames.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auth_key(mut self, key: impl Into<String>) -> Self {
        self.config.auth.key = key.into();
        self
    }

    pub fn with_jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.auth.secret = secret.into();
        self
    }

    pub fn with_sink(mut self, kind: impl Into<String>) -> Self {
        self.config.sink.kind = kind.into();
        self
    }

    pub fn with_metrics_enabled(mut self, enabled: bool) -> Self {
        self.config.metrics.enabled = enabled;
        self
    }

    pub fn with_metrics_path(mut self, path: impl Into<String>) -> Self {
        self.config.metrics.path = path.into();
        self
    }

    /// Load configuration from environment variables with ASSETWAY_ prefix
    pub fn from_env(mut self) -> Self {
        if let Some(host) = get_env_with_prefix("HOST") {
            self.config.server.host = host;
        }
        if let Some(port) = get_env_with_prefix("PORT") {
            if let Ok(p) = port.parse() {
                self.config.server.port = p;
            }
        }
        if let Some(max_body_size) = get_env_with_prefix("MAX_BODY_SIZE") {
            if let Ok(size) = max_body_size.parse() {
                self.config.server.max_body_size = size;
            }
        }
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env_with_prefix("LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }
        if let Some(name) = get_env_with_prefix("SERVICE_NAME") {
            self.config.service.name = name;
        }
        if let Some(sink) = get_env_with_prefix("SINK") {
            self.config.sink.kind = sink;
        }
        if let Some(org) = get_env_with_prefix("ORG_NAME") {
            self.config.organization.name = org;
        }
        if let Some(hosts) = get_env_list("ORG_HOSTS") {
            self.config.organization.hostnames = hosts;
        }
        if let Some(key) = get_env_with_prefix("AUTH_KEY") {
            self.config.auth.key = key;
        }
        if let Some(secret) = get_env_with_prefix("JWT_SECRET") {
            self.config.auth.secret = secret;
        }
        if let Some(enabled) = get_env_with_prefix("METRICS_ENABLED") {
            self.config.metrics.enabled = enabled.parse().unwrap_or(false);
        }
        if let Some(path) = get_env_with_prefix("METRICS_PATH") {
            self.config.metrics.path = path;
        }

        self
    }

    /// Build the configuration, validating all settings
    pub fn build(self) -> Result<Config> {
        let config = self.config;

        config.server.addr().map_err(|e| {
            AssetwayError::bad_request(format!(
                "Invalid server address {}:{} - {}",
                config.server.host, config.server.port, e
            ))
        })?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(AssetwayError::bad_request(format!(
                "Invalid log level: {}. Must be one of: {}",
                config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        if config.server.port == 0 {
            return Err(AssetwayError::bad_request("Server port must be greater than 0"));
        }

        if config.server.max_body_size == 0 {
            return Err(AssetwayError::bad_request(
                "Maximum body size must be greater than 0",
            ));
        }

        if config.organization.name.trim().is_empty() {
            return Err(AssetwayError::bad_request("Organization name must not be empty"));
        }

        let mut seen = HashSet::new();
        for host in &config.organization.hostnames {
            if !seen.insert(host.to_lowercase()) {
                return Err(AssetwayError::bad_request(format!(
                    "Hostname {} is configured more than once",
                    host
                )));
            }
        }

        if !KNOWN_SINKS.contains(&config.sink.kind.as_str()) {
            return Err(AssetwayError::bad_request(format!(
                "Unknown sink: {}. Must be one of: {}",
                config.sink.kind,
                KNOWN_SINKS.join(", ")
            )));
        }

        if !config.metrics.path.starts_with('/') {
            return Err(AssetwayError::bad_request(format!(
                "Metrics path must start with '/', got: {}",
                config.metrics.path
            )));
        }

        if RESERVED_PATHS.iter().any(|reserved| {
            config.metrics.path == *reserved
                || config.metrics.path.starts_with(&format!("{}/", reserved))
        }) {
            return Err(AssetwayError::bad_request(format!(
                "Metrics path {} collides with a built-in route",
                config.metrics.path
            )));
        }

        if config.auth.key.is_empty() || config.auth.secret.is_empty() {
            return Err(AssetwayError::bad_request(
                "Authentication key and token secret must not be empty",
            ));
        }

        Ok(config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
