use std::path::{Path, PathBuf};
use serde::Deserialize;
use anyhow::{Context, Result};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing mandatory setting `{0}`")]
    Missing(&'static str),
    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub namespaces: Vec<NamespaceMapping>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoveryConfig {
    pub region: Option<String>,
    /// Overrides the registry endpoint, e.g. for a local emulator
    pub endpoint: Option<String>,
    pub call_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,
    #[serde(default = "default_reload_command")]
    pub reload_command: Vec<String>,
    pub default_domain: Option<String>,
    pub metrics_password: Option<String>,
    pub stats_password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Write the document to the proxy config path and signal a reload
    Apply,
    /// Print the document to stdout only
    Print,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default = "default_mode")]
    pub mode: Mode,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

/// Requested namespace display name and the domain its services live under.
/// Field names match the `NAMESPACE_MAP` environment JSON.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamespaceMapping {
    pub namespace: String,
    #[serde(alias = "domain")]
    pub domainname: String,
}

fn default_config_path() -> PathBuf {
    PathBuf::from("/usr/local/etc/haproxy/haproxy.cfg")
}

fn default_reload_command() -> Vec<String> {
    ["killall", "-12", "haproxy"].iter().map(|s| s.to_string()).collect()
}

fn default_mode() -> Mode {
    Mode::Apply
}

fn default_refresh_interval() -> u64 {
    60
}

fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            reload_command: default_reload_command(),
            default_domain: None,
            metrics_password: None,
            stats_password: None,
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Fully validated settings; every mandatory value is present.
#[derive(Debug, Clone)]
pub struct Settings {
    pub region: String,
    pub endpoint: Option<String>,
    pub call_timeout_secs: Option<u64>,
    pub mode: Mode,
    pub refresh_interval_secs: u64,
    pub namespaces: Vec<NamespaceMapping>,
    pub default_domain: String,
    pub metrics_password: String,
    pub stats_password: String,
    pub config_path: PathBuf,
    pub reload_command: Vec<String>,
    pub health_listen: String,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Overlay environment variables on top of file values.
    /// `env` is a lookup so tests don't have to touch the process environment.
    pub fn apply_env(mut self, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(region) = env("AWS_REGION") {
            self.discovery.region = Some(region);
        }
        if let Some(endpoint) = env("DISCOVERY_ENDPOINT") {
            self.discovery.endpoint = Some(endpoint);
        }
        if let Some(mode) = env("APPLY_MODE") {
            self.reconcile.mode = if mode == "on" { Mode::Apply } else { Mode::Print };
        }
        if let Some(rate) = env("REFRESH_RATE") {
            self.reconcile.refresh_interval_secs = rate.trim().parse().map_err(|e| {
                ConfigError::Invalid {
                    key: "REFRESH_RATE",
                    reason: format!("{e}"),
                }
            })?;
        }
        if let Some(map) = env("NAMESPACE_MAP") {
            self.namespaces = serde_json::from_str(&map).map_err(|e| ConfigError::Invalid {
                key: "NAMESPACE_MAP",
                reason: e.to_string(),
            })?;
        }
        if let Some(domain) = env("DEFAULT_DOMAIN") {
            self.proxy.default_domain = Some(domain);
        }
        if let Some(password) = env("METRICS_PASSWORD") {
            self.proxy.metrics_password = Some(password);
        }
        if let Some(password) = env("STATS_PASSWORD") {
            self.proxy.stats_password = Some(password);
        }
        if let Some(path) = env("HAPROXY_CONFIG_PATH") {
            self.proxy.config_path = PathBuf::from(path);
        }
        if let Some(listen) = env("HEALTH_LISTEN") {
            self.health.listen = listen;
        }
        Ok(self)
    }

    /// Check mandatory values and produce the settings the daemon runs with
    pub fn validate(self) -> Result<Settings, ConfigError> {
        let region = non_empty(self.discovery.region, "AWS_REGION")?;
        let default_domain = non_empty(self.proxy.default_domain, "DEFAULT_DOMAIN")?;
        let metrics_password = non_empty(self.proxy.metrics_password, "METRICS_PASSWORD")?;
        let stats_password = non_empty(self.proxy.stats_password, "STATS_PASSWORD")?;

        if self.namespaces.is_empty() {
            return Err(ConfigError::Missing("NAMESPACE_MAP"));
        }
        if self.reconcile.refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "REFRESH_RATE",
                reason: "must be at least one second".to_string(),
            });
        }
        if self.reconcile.mode == Mode::Apply && self.proxy.reload_command.is_empty() {
            return Err(ConfigError::Invalid {
                key: "reload_command",
                reason: "must name a program".to_string(),
            });
        }

        Ok(Settings {
            region,
            endpoint: self.discovery.endpoint,
            call_timeout_secs: self.discovery.call_timeout_secs,
            mode: self.reconcile.mode,
            refresh_interval_secs: self.reconcile.refresh_interval_secs,
            namespaces: self.namespaces,
            default_domain,
            metrics_password,
            stats_password,
            config_path: self.proxy.config_path,
            reload_command: self.proxy.reload_command,
            health_listen: self.health.listen,
        })
    }
}

fn non_empty(value: Option<String>, key: &'static str) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}
