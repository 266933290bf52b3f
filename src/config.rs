use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::heartbeat::{HeartbeatPolicy, PolicyError};

const DEFAULT_PORT: u16 = 8300;

#[derive(Deserialize, Default, Debug)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub localhost: Option<bool>,
    pub renew_interval_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
    pub admin_token: Option<String>,
    pub events_file: Option<PathBuf>,
}

#[derive(Debug)]
pub struct Config {
    pub port: u16,
    pub localhost: bool,
    pub catalog: PathBuf,
    pub heartbeat: HeartbeatPolicy,
    /// Admin routes are only mounted when this is set.
    pub admin_token: Option<String>,
    pub events_file: Option<PathBuf>,
}

impl Config {
    pub fn resolve(file: Option<FileConfig>, args: &crate::cli::Args) -> Result<Self, ConfigError> {
        let file = file.unwrap_or_default();
        let defaults = HeartbeatPolicy::default();

        let renew_interval = args
            .renew_interval
            .or(file.renew_interval_secs)
            .map(Duration::from_secs)
            .unwrap_or(defaults.renew_interval);
        let timeout = args
            .timeout
            .or(file.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);
        let sweep_interval = file
            .sweep_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.sweep_interval);

        Ok(Config {
            port: args.port.or(file.port).unwrap_or(DEFAULT_PORT),
            localhost: args.localhost || file.localhost.unwrap_or(false),
            catalog: args.catalog.clone(),
            heartbeat: HeartbeatPolicy::new(renew_interval, timeout, sweep_interval)?,
            admin_token: file.admin_token.filter(|t| !t.is_empty()),
            events_file: args.events.clone().or(file.events_file),
        })
    }
}

pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_owned());
    }
    let cwd_config = PathBuf::from("reelpass.toml");
    if cwd_config.exists() {
        return Some(cwd_config);
    }
    if let Some(config_dir) = dirs::config_dir() {
        let xdg_config = config_dir.join("reelpass").join("config.toml");
        if xdg_config.exists() {
            return Some(xdg_config);
        }
    }
    None
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid heartbeat settings: {0}")]
    Heartbeat(#[from] PolicyError),
}

pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: FileConfig = toml::from_str(&content)?;
    Ok(config)
}
