use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::owners::OwnerEntry;

pub const CONFIG_FILE: &str = "nudge.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct NudgeConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_api_host")]
    pub api_host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default)]
    pub public_base_url: Option<String>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub executor: EndpointConfig,
    #[serde(default)]
    pub channel: EndpointConfig,
    #[serde(default)]
    pub owners: Vec<OwnerEntry>,
}

/// Optional remote collaborator. Absent url selects the local fallback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub url: Option<String>,
}

fn default_data_dir() -> String {
    "~/.nudge".into()
}
fn default_api_host() -> String {
    "127.0.0.1".into()
}
fn default_api_port() -> u16 {
    17890
}
fn default_timezone() -> String {
    "UTC".into()
}
fn default_sweep_interval() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for NudgeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            api_host: default_api_host(),
            api_port: default_api_port(),
            public_base_url: None,
            timezone: default_timezone(),
            sweep_interval_secs: default_sweep_interval(),
            log_level: default_log_level(),
            executor: EndpointConfig::default(),
            channel: EndpointConfig::default(),
            owners: Vec::new(),
        }
    }
}

impl NudgeConfig {
    /// Read `path`, or `~/.nudge/nudge.toml` when no path is given. A missing
    /// default file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (expand_home(&default_data_dir()).join(CONFIG_FILE), false),
        };
        if !path.exists() {
            if explicit {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.timezone()?;
        config.max_level()?;
        Ok(config)
    }

    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.data_dir)
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Unknown timezone '{}': {}", self.timezone, e))
    }

    pub fn max_level(&self) -> Result<tracing::Level> {
        self.log_level
            .parse::<tracing::Level>()
            .map_err(|_| anyhow::anyhow!("Unknown log level '{}'", self.log_level))
    }

    /// Base for advertised event URLs; falls back to the bound address.
    pub fn public_base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) if !url.trim().is_empty() => url.trim().to_string(),
            _ => format!("http://{}:{}", self.api_host, self.api_port),
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(path),
    }
}
