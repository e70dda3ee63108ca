//! Daemon configuration.
//!
//! Resolution order, highest first:
//! 1. Environment (`LANSCOPE_LISTEN`)
//! 2. Config file (`~/.config/lanscope/config.toml` or an explicit path)
//! 3. Built-in defaults

use crate::classify::{RuleSet, RulesConfig};
use crate::persistence;
use crate::scanner::oui::DEFAULT_VENDOR_URL;
use crate::scanner::{DiscoveryError, SystemSource};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default publication socket address
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8181";

/// Default minutes between discovery cycles
pub const DEFAULT_INTERVAL_MINUTES: u64 = 5;

/// Environment variable name for the listen address override
const ENV_LISTEN: &str = "LANSCOPE_LISTEN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Publication socket address
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub interval_minutes: u64,
    pub sweep_program: String,
    pub browse_program: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            sweep_program: "nmap".to_string(),
            browse_program: "avahi-browse".to_string(),
        }
    }
}

/// File locations; unset paths fall back to the per-user data directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub hosts_file: Option<PathBuf>,
    pub vendor_cache: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorsConfig {
    pub url: String,
}

impl Default for VendorsConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_VENDOR_URL.to_string(),
        }
    }
}

/// Resolved configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub server: ServerConfig,
    pub scan: ScanConfig,
    pub storage: StorageConfig,
    pub vendors: VendorsConfig,
    pub rules: RulesConfig,
    /// Where the configuration came from (for logging)
    #[serde(skip)]
    pub source: ConfigSource,
}

/// Where the configuration came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Using default hardcoded values
    #[default]
    Default,
    /// Overridden by environment variable
    Environment,
    /// Loaded from config file
    ConfigFile,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::ConfigFile => write!(f, "config file"),
        }
    }
}

/// Get the path to the configuration file
fn get_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("lanscope").join("config.toml"))
}

impl AgentConfig {
    /// Parse a config file body. Absent sections and keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: AgentConfig = toml::from_str(content).context("Invalid config file")?;
        config.source = ConfigSource::ConfigFile;
        Ok(config)
    }

    /// Apply the environment override, then an explicit listen address if given.
    pub fn apply_overrides(&mut self, listen: Option<String>) {
        let env_listen = std::env::var(ENV_LISTEN)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        if let Some(listen) = env_listen {
            tracing::info!("Using listen address from environment variable: {}", listen);
            self.server.listen = listen;
            self.source = ConfigSource::Environment;
        }
        if let Some(listen) = listen {
            self.server.listen = listen;
        }
    }

    /// Where the host table is persisted
    pub fn hosts_path(&self) -> Result<PathBuf> {
        match &self.storage.hosts_file {
            Some(path) => Ok(path.clone()),
            None => persistence::default_hosts_path(),
        }
    }

    /// Where the vendor dataset is cached
    pub fn vendor_cache_path(&self) -> Result<PathBuf> {
        match &self.storage.vendor_cache {
            Some(path) => Ok(path.clone()),
            None => persistence::default_vendor_cache_path(),
        }
    }

    /// Discovery source backed by the configured system tools.
    pub fn system_source(&self) -> Result<SystemSource> {
        Ok(SystemSource {
            sweep_program: self.scan.sweep_program.clone(),
            browse_program: self.scan.browse_program.clone(),
            vendor_cache: self.vendor_cache_path()?,
            vendor_url: self.vendors.url.clone(),
        })
    }

    /// Compile the configured classification rules.
    pub fn rule_set(&self) -> Result<RuleSet, DiscoveryError> {
        RuleSet::from_config(&self.rules)
    }
}

/// Load configuration from the default location.
///
/// A missing or unreadable default file is not an error: defaults are used.
pub fn load_config() -> AgentConfig {
    let Some(path) = get_config_file_path() else {
        return AgentConfig::default();
    };

    if !path.exists() {
        tracing::debug!("No config file at {:?}, using defaults", path);
        return AgentConfig::default();
    }

    match load_config_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Ignoring config file {:?}: {:#}", path, e);
            AgentConfig::default()
        }
    }
}

/// Load configuration from an explicit path. Any failure is an error.
pub fn load_config_from(path: &Path) -> Result<AgentConfig> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read config file {:?}", path))?;
    let config = AgentConfig::from_toml_str(&content)
        .with_context(|| format!("Failed to load config file {:?}", path))?;
    tracing::debug!("Loaded config from {:?}", path);
    Ok(config)
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/lanscope/config.toml".to_string())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# lanscope configuration
# Place this file at: ~/.config/lanscope/config.toml

[server]
# Publication WebSocket address (LANSCOPE_LISTEN overrides)
# listen = "0.0.0.0:8181"

[scan]
# interval_minutes = 5
# sweep_program = "nmap"
# browse_program = "avahi-browse"

[storage]
# Default: <data dir>/lanscope/hosts.json and <data dir>/lanscope/oui.txt
# hosts_file = "/var/lib/lanscope/hosts.json"
# vendor_cache = "/var/lib/lanscope/oui.txt"

[vendors]
# url = "https://www.wireshark.org/download/automated/data/manuf"

[rules]
# Keep the built-in rules; the rules below are tried after them
# include_defaults = true

# [[rules.record]]
# pattern = "_ipp._tcp"
# category = "Printer"

# [[rules.attribute]]
# pattern = "md=Chromecast"
# category = "Chromecast"

# [[rules.hostname]]
# pattern = "^iPhone"
# category = "Phone"
"#
    .to_string()
}
