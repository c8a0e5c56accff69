//! Application configuration with persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mpv::{find_mpv, find_ytdl, LaunchOptions};

const APP_DIR: &str = "invplay";
const CONFIG_FILE: &str = "config.json";
const SOCKET_FILE: &str = "socket";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Could not determine the configuration directory")]
  NoConfigDir,
  #[error("Config I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Invalid config file: {0}")]
  Json(#[from] serde_json::Error),
  #[error("Invalid configuration: {0}")]
  Invalid(String),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
  /// Custom MPV executable path (None = auto-detect).
  #[serde(default)]
  pub mpv_path: Option<String>,

  /// Custom yt-dlp/youtube-dl path (None = auto-detect).
  #[serde(default)]
  pub ytdl_path: Option<String>,

  /// MPV IPC socket path (None = inside the config directory).
  #[serde(default)]
  pub socket_path: Option<String>,

  /// Number of attempts to connect to the MPV socket, one second apart.
  #[serde(default = "default_connection_retries")]
  pub connection_retries: u32,

  /// User agent MPV sends when fetching streams.
  #[serde(default = "default_user_agent")]
  pub user_agent: String,

  /// Additional MPV command-line arguments.
  #[serde(default)]
  pub mpv_args: Vec<String>,

  /// Default log filter when RUST_LOG is not set.
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

fn default_connection_retries() -> u32 {
  10
}

fn default_user_agent() -> String {
  "Mozilla/5.0 (Windows NT 10.0; rv:102.0) Gecko/20100101 Firefox/102.0".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Default for PlayerConfig {
  fn default() -> Self {
    Self {
      mpv_path: None,
      ytdl_path: None,
      socket_path: None,
      connection_retries: default_connection_retries(),
      user_agent: default_user_agent(),
      mpv_args: Vec::new(),
      log_level: default_log_level(),
    }
  }
}

impl PlayerConfig {
  /// Directory holding the config file and the default socket.
  pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
      .map(|dir| dir.join(APP_DIR))
      .ok_or(ConfigError::NoConfigDir)
  }

  /// Default location of the config file.
  pub fn default_path() -> Result<PathBuf, ConfigError> {
    Ok(Self::config_dir()?.join(CONFIG_FILE))
  }

  /// Load the config file, falling back to defaults when it does not exist.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    if !path.exists() {
      log::debug!("No config at {}, using defaults", path.display());
      return Ok(Self::default());
    }

    let contents = std::fs::read_to_string(path)?;
    let config: Self = serde_json::from_str(&contents)?;
    config.validate()?;

    log::info!("Loaded config from {}", path.display());
    Ok(config)
  }

  /// Write the config file, creating its directory if needed.
  pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(self)?)?;
    Ok(())
  }

  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.connection_retries == 0 {
      return Err(ConfigError::Invalid(
        "Connection retries must be at least 1".to_string(),
      ));
    }
    if self.user_agent.trim().is_empty() {
      return Err(ConfigError::Invalid("User agent cannot be empty".to_string()));
    }
    Ok(())
  }

  /// Socket path MPV binds its IPC server to.
  pub fn socket_path(&self) -> Result<PathBuf, ConfigError> {
    if let Some(path) = self.socket_path.as_ref().filter(|s| !s.is_empty()) {
      return Ok(PathBuf::from(path));
    }

    let dir = Self::config_dir()?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join(SOCKET_FILE))
  }

  /// Resolve executables and paths into launch options.
  pub fn launch_options(&self) -> Result<LaunchOptions, ConfigError> {
    self.validate()?;

    let mpv_path = self
      .mpv_path
      .as_ref()
      .filter(|s| !s.is_empty())
      .map(PathBuf::from)
      .or_else(find_mpv)
      .unwrap_or_else(|| PathBuf::from("mpv"));

    let ytdl_path = self
      .ytdl_path
      .as_ref()
      .filter(|s| !s.is_empty())
      .map(PathBuf::from)
      .or_else(find_ytdl);
    if ytdl_path.is_none() {
      log::warn!("yt-dlp/youtube-dl not found, MPV will use its own lookup");
    }

    Ok(LaunchOptions {
      mpv_path,
      ytdl_path,
      socket_path: self.socket_path()?,
      retries: self.connection_retries,
      user_agent: self.user_agent.clone(),
      extra_args: self.mpv_args.clone(),
    })
  }
}
