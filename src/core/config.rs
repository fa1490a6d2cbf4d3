use crate::core::quote::QuoteKey;
use crate::core::refresh::RefreshSettings;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: String,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub path: String,
    pub branch: Option<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        GitHubConfig {
            api_url: "https://api.github.com".to_string(),
            owner: None,
            repo: None,
            path: "portfolio.md".to_string(),
            branch: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

impl Default for YahooProviderConfig {
    fn default() -> Self {
        YahooProviderConfig {
            base_url: "https://query1.finance.yahoo.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ProvidersConfig {
    pub yahoo: YahooProviderConfig,
    /// Try the provider directly before any relay.
    pub direct: bool,
    /// Relay prefixes; the URL-encoded target is appended to each.
    pub relays: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            yahoo: YahooProviderConfig::default(),
            direct: true,
            relays: vec![
                "https://corsproxy.io/?".to_string(),
                "https://api.allorigins.win/raw?url=".to_string(),
            ],
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheTtlConfig {
    pub search_secs: u64,
    pub price_secs: u64,
    pub historical_secs: u64,
    pub three_month_secs: u64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        CacheTtlConfig {
            search_secs: 600,
            price_secs: 120,
            historical_secs: 86400,
            three_month_secs: 300,
        }
    }
}

impl CacheTtlConfig {
    pub fn ttl_for(&self, key: &QuoteKey) -> Duration {
        let secs = match key {
            QuoteKey::Search(_) => self.search_secs,
            QuoteKey::Price(_) => self.price_secs,
            QuoteKey::Historical(..) => self.historical_secs,
            QuoteKey::ThreeMonth(_) => self.three_month_secs,
        };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RefreshConfig {
    pub batch_size: usize,
    pub pause_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            batch_size: 5,
            pause_ms: 500,
        }
    }
}

impl From<&RefreshConfig> for RefreshSettings {
    fn from(config: &RefreshConfig) -> Self {
        RefreshSettings {
            batch_size: config.batch_size.max(1),
            pause: Duration::from_millis(config.pause_ms),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub github: GitHubConfig,
    pub providers: ProvidersConfig,
    pub cache_ttl: CacheTtlConfig,
    pub refresh: RefreshConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    /// Loads the config from `path`, or the default location. A missing
    /// file yields the defaults.
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path()?,
        };
        if !config_path.exists() {
            debug!(
                "No config at {}; using defaults",
                config_path.to_string_lossy()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("io", "stockwatch", "stockwatch")
            .context("Could not determine project directories")
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        Ok(Self::project_dirs()?.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
