use anyhow::bail;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    pub token: String,
    pub channel_id: u64,
    #[serde(default)]
    pub allow_adduser: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OgsConfig {
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    #[serde(default = "default_site_url")]
    pub site_url: String,
    #[serde(default = "default_realtime_url")]
    pub realtime_url: String,
    #[serde(default)]
    pub token: Option<String>,
    /// Seconds between poll cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Spacing between per-player requests inside one cycle.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_realtime")]
    pub realtime: bool,
    #[serde(default)]
    pub tracked_players: Vec<u64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub discord: DiscordConfig,
    pub ogs: OgsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_rest_url() -> String {
    "https://online-go.com/api/v1".to_string()
}

fn default_site_url() -> String {
    "https://online-go.com".to_string()
}

fn default_realtime_url() -> String {
    "wss://ggs.online-go.com".to_string()
}

fn default_poll_interval() -> u64 {
    1800
}

fn default_request_delay_ms() -> u64 {
    800
}

fn default_realtime() -> bool {
    true
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config_str = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&config_str)?;

        if config.discord.token.trim().is_empty() {
            bail!("discord.token is not set");
        }
        if config.discord.channel_id == 0 {
            bail!("discord.channel_id is not set");
        }

        Ok(config)
    }

    pub fn state_path(&self) -> Option<std::path::PathBuf> {
        self.storage.path.as_ref().map(std::path::PathBuf::from)
    }
}
