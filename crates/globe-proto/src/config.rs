use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

/// Radio directory replicas and query sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Equivalent read replicas, tried in order.
    #[serde(default = "default_servers")]
    pub servers: Vec<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Result cap for country and search lists.
    #[serde(default = "default_station_limit")]
    pub station_limit: usize,
    /// Result cap for the "Popular Stations" list.
    #[serde(default = "default_top_limit")]
    pub top_limit: usize,
    #[serde(default = "default_tag_limit")]
    pub tag_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_volume")]
    pub default_volume: f32,
    /// How long the mpv backend waits for audio before reporting a failed load.
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            user_agent: default_user_agent(),
            station_limit: default_station_limit(),
            top_limit: default_top_limit(),
            tag_limit: default_tag_limit(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            load_timeout_secs: default_load_timeout_secs(),
        }
    }
}

fn default_servers() -> Vec<String> {
    [
        "https://de1.api.radio-browser.info/json",
        "https://nl1.api.radio-browser.info/json",
        "https://at1.api.radio-browser.info/json",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_user_agent() -> String {
    "GlobalRadioExplorer/1.0".to_string()
}

fn default_station_limit() -> usize {
    50
}

fn default_top_limit() -> usize {
    50
}

fn default_tag_limit() -> usize {
    15
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_volume() -> f32 {
    0.7
}

fn default_load_timeout_secs() -> u64 {
    20
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
