use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::health::service::DEFAULT_HEALTH_EXEMPT_SERVICES;
use crate::logging::LogFormat;
use crate::units;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub agent: AgentConfig,
    pub health: HealthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
    /// Networks (CIDR or bare IP) whose `X-Forwarded-For` headers are trusted
    pub trusted_proxies: Vec<String>,
    /// Inbound requests still running after this long are dropped,
    /// which also cancels any in-flight agent retries
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:8080".to_string(),
            trusted_proxies: Vec::new(),
            request_timeout_seconds: 30,
        }
    }
}

impl ServerConfig {
    /// Parse `trusted_proxies`, accepting bare addresses as host networks.
    pub fn trusted_proxy_networks(&self) -> Result<Vec<IpNet>, String> {
        self.trusted_proxies
            .iter()
            .map(|entry| {
                let entry = entry.trim();
                entry
                    .parse::<IpNet>()
                    .or_else(|_| entry.parse::<IpAddr>().map(IpNet::from))
                    .map_err(|_| format!("invalid trusted proxy '{entry}'"))
            })
            .collect()
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: "ghost".to_string(),
            password: String::new(),
        }
    }
}

impl AuthConfig {
    /// Fill in a random 32 character password when none was configured.
    ///
    /// Returns `true` if a password was generated.
    pub fn ensure_password(&mut self) -> bool {
        if !self.password.is_empty() {
            return false;
        }
        self.password = nanoid::nanoid!(32);
        true
    }
}

/// Node-agent connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Explicit talosconfig path; when unset the standard locations are searched
    pub talosconfig_path: Option<String>,
    /// Context to use instead of the file's current context
    pub context: Option<String>,
    pub endpoint_port: u16,
    pub connect_timeout_ms: u64,
    /// Timeout of the `Version` liveness probe
    pub probe_timeout_ms: u64,
    /// Constant backoff between attempts
    pub retry_interval_ms: u64,
    /// Overall budget of one logical call, measured from its first attempt
    pub retry_deadline_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            talosconfig_path: None,
            context: None,
            endpoint_port: 50000,
            connect_timeout_ms: 10_000,
            probe_timeout_ms: 2_000,
            retry_interval_ms: 100,
            retry_deadline_ms: 10_000,
        }
    }
}

impl AgentConfig {
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    #[must_use]
    pub const fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    #[must_use]
    pub const fn retry_deadline(&self) -> Duration {
        Duration::from_millis(self.retry_deadline_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Services that never report healthy while legitimately running
    pub health_exempt_services: Vec<String>,
    /// Members whose database is smaller than this skip the fragmentation check
    pub min_db_size: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            health_exempt_services: DEFAULT_HEALTH_EXEMPT_SERVICES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            min_db_size: "512MiB".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Legacy flat environment variables (`LISTEN_ADDRESS`, `AUTH_USERNAME`, ...)
    /// 2. Prefixed environment variables (`NODEWARD__SERVER__LISTEN_ADDRESS`, ...)
    /// 3. Config file (if provided)
    /// 4. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("NODEWARD")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: Self = builder.build()?.try_deserialize()?;
        config.apply_legacy_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Apply the unprefixed variables understood by earlier deployments.
    fn apply_legacy_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(listen) = lookup("LISTEN_ADDRESS") {
            self.server.listen_address = listen;
        }
        if let Some(username) = lookup("AUTH_USERNAME") {
            self.auth.username = username;
        }
        if let Some(password) = lookup("AUTH_PASSWORD") {
            self.auth.password = password;
        }
        if let Some(proxies) = lookup("TRUSTED_PROXIES") {
            self.server.trusted_proxies = proxies
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        if self.agent.talosconfig_path.is_none() {
            self.agent.talosconfig_path = lookup("TALOSCONFIG").filter(|p| !p.is_empty());
        }
    }

    /// Check the whole configuration, reporting every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.listen_address.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "server.listen_address '{}' is not a socket address",
                self.server.listen_address
            ));
        }
        if let Err(e) = self.server.trusted_proxy_networks() {
            errors.push(format!("server.trusted_proxies: {e}"));
        }
        if self.server.request_timeout_seconds == 0 {
            errors.push("server.request_timeout_seconds must be positive".to_string());
        }
        if self.auth.username.is_empty() {
            errors.push("auth.username must not be empty".to_string());
        }
        if self.agent.retry_interval_ms == 0 {
            errors.push("agent.retry_interval_ms must be positive".to_string());
        }
        if self.agent.retry_deadline_ms < self.agent.retry_interval_ms {
            errors.push("agent.retry_deadline_ms must not be shorter than the retry interval".to_string());
        }
        if let Err(e) = units::parse_base2_bytes(&self.health.min_db_size) {
            errors.push(format!("health.min_db_size: {e}"));
        }
        if self.logging.format.parse::<LogFormat>().is_err() {
            errors.push(format!(
                "logging.format '{}' must be 'json' or 'pretty'",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Default minimum database size in bytes for the fragmentation check
    pub fn min_db_size_bytes(&self) -> u64 {
        units::parse_base2_bytes(&self.health.min_db_size).unwrap_or(units::DEFAULT_MIN_DB_SIZE)
    }
}
