//! Configuration types and loading logic.

use std::time::Duration;

use bundler_tracing::TracingConfig;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use reqwest::Url;
use serde::Deserialize;

use crate::backend::BackendVersion;
use crate::error::ProxyError;

/// Environment variables that name the backends directly, kept from the
/// earlier container deployments. They win over file and prefixed values.
pub const LEGACY_V06_URL_ENV: &str = "RUNDLER_V0_6";
pub const LEGACY_V07_URL_ENV: &str = "RUNDLER_V0_7";

/// Top-level proxy configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Server listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Upper bound on an inbound request body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Bundler backend addresses. No defaults: both must be supplied.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub v06_url: Option<String>,

    #[serde(default)]
    pub v07_url: Option<String>,

    /// Per-call timeout for forwarded requests.
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

/// Startup entry point discovery.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_discovery_timeout")]
    pub timeout_secs: u64,
}

fn default_listen_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_backend_timeout() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_discovery_timeout() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            v06_url: None,
            v07_url: None,
            timeout_secs: default_backend_timeout(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_discovery_timeout(),
        }
    }
}

impl DiscoveryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ProxyConfig {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. `RUNDLER_V0_6` / `RUNDLER_V0_7` for the backend URLs
    /// 2. Environment variables (BUNDLER_PROXY_ prefix, __ for nesting)
    /// 3. TOML config file (may be absent)
    /// 4. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("BUNDLER_PROXY_").split("__"));

        let mut config = Self::from_figment(figment)?;
        config.apply_legacy_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        Ok(figment.extract()?)
    }

    fn apply_legacy_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(LEGACY_V06_URL_ENV) {
            self.backends.v06_url = Some(url);
        }
        if let Some(url) = lookup(LEGACY_V07_URL_ENV) {
            self.backends.v07_url = Some(url);
        }
    }

    /// Validated URL for one backend.
    pub fn backend_url(&self, version: BackendVersion) -> Result<Url, ProxyError> {
        let raw = match version {
            BackendVersion::V06 => self.backends.v06_url.as_deref(),
            BackendVersion::V07 => self.backends.v07_url.as_deref(),
        };
        parse_backend_url(version, raw)
    }
}

fn parse_backend_url(version: BackendVersion, raw: Option<&str>) -> Result<Url, ProxyError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProxyError::Config(format!("no URL configured for the {version} bundler")))?;

    let url = Url::parse(raw)
        .map_err(|e| ProxyError::Config(format!("invalid {version} bundler URL {raw:?}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ProxyError::Config(format!(
            "{version} bundler URL {raw:?} must be an absolute http(s) URL"
        )));
    }
    Ok(url)
}
