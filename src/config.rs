// Configuration loading for playerctl-web
//
// The configuration is a single JSON file. Each section can live either at the top
// level or inside a "services" object; missing sections fall back to defaults.
// Without a syncplay section, server and identity come from the Syncplay client's
// own ~/.config/syncplay.ini when it exists.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use ini::{Ini, ParseOption};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::constants::SYNCPLAY_INI_PATH;
use crate::helpers::backoff;
use crate::logging::LoggingConfig;
use crate::syncplay::{HeartbeatMode, SessionSettings};

/// Errors raised while loading the configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Parse(String),
}

/// Helper function to get service configuration with backward compatibility
///
/// This function first tries to find the service in the "services" structure,
/// then falls back to the top-level structure.
///
/// # Example
/// ```rust
/// use serde_json::json;
/// use playerctl_web::config::get_service_config;
///
/// let config = json!({
///   "services": {
///     "syncplay": { "room": "movies" }
///   }
/// });
///
/// let syncplay = get_service_config(&config, "syncplay").unwrap();
/// assert_eq!(syncplay["room"], "movies");
///
/// let flat = json!({ "syncplay": { "room": "series" } });
/// assert_eq!(get_service_config(&flat, "syncplay").unwrap()["room"], "series");
/// ```
pub fn get_service_config<'a>(config: &'a serde_json::Value, service_name: &str) -> Option<&'a serde_json::Value> {
    if let Some(service_config) = config.get("services").and_then(|s| s.get(service_name)) {
        debug!("Found {} configuration in services section", service_name);
        return Some(service_config);
    }

    if let Some(service_config) = config.get(service_name) {
        debug!("Found {} configuration at top level", service_name);
        return Some(service_config);
    }

    debug!("No {} configuration found, using defaults", service_name);
    None
}

/// Connection to the Syncplay server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncplayConfig {
    pub enable: bool,
    pub host: String,
    pub port: u16,
    pub room: String,
    pub name: String,
    pub heartbeat: HeartbeatMode,
    pub heartbeat_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub connect_timeout_ms: u64,
    pub reconnect_intervals_secs: Vec<u64>,
}

impl Default for SyncplayConfig {
    fn default() -> Self {
        Self {
            enable: true,
            host: "syncplay.pl".to_string(),
            port: 8999,
            room: "default".to_string(),
            name: "Anonymous".to_string(),
            heartbeat: HeartbeatMode::Reactive,
            heartbeat_interval_ms: 1000,
            poll_interval_ms: 1000,
            connect_timeout_ms: 5000,
            reconnect_intervals_secs: backoff::default_intervals().iter().map(|d| d.as_secs()).collect(),
        }
    }
}

impl SyncplayConfig {
    /// Session parameters described by this section
    pub fn session_settings(&self) -> SessionSettings {
        let mut settings = SessionSettings::new(&self.host, self.port, &self.room, &self.name);
        settings.heartbeat = self.heartbeat;
        settings.heartbeat_interval = Duration::from_millis(self.heartbeat_interval_ms.max(1));
        settings.poll_interval = Duration::from_millis(self.poll_interval_ms.max(1));
        settings.connect_timeout = Duration::from_millis(self.connect_timeout_ms.max(1));
        settings.reconnect_intervals = self
            .reconnect_intervals_secs
            .iter()
            .map(|s| Duration::from_secs(*s))
            .collect();
        settings
    }

    /// Server and identity from a Syncplay client config file
    ///
    /// Reads `server_data.host`, `server_data.port`, `client_settings.room` and
    /// `client_settings.name`. Missing keys keep their defaults.
    pub fn from_syncplay_ini<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        // Values are taken verbatim, like the Syncplay client writes them
        let options = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(content.trim_start_matches('\u{feff}'), options)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;

        let defaults = Self::default();
        let port = match ini_value(&ini, "server_data", "port") {
            Some(port) => port
                .parse()
                .map_err(|_| ConfigError::Parse(format!("{}: invalid port '{}'", path.display(), port)))?,
            None => defaults.port,
        };
        let text = |section: &str, key: &str, fallback: &str| {
            ini_value(&ini, section, key).unwrap_or(fallback).to_string()
        };

        Ok(Self {
            host: text("server_data", "host", &defaults.host),
            port,
            room: text("client_settings", "room", &defaults.room),
            name: text("client_settings", "name", &defaults.name),
            ..defaults
        })
    }
}

/// Location of the Syncplay client config in the user's home directory
pub fn syncplay_ini_path() -> Option<PathBuf> {
    env::var_os("HOME").map(|home| PathBuf::from(home).join(SYNCPLAY_INI_PATH))
}

fn ini_value<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.get_from(Some(section), key)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Syncplay settings for a config without a syncplay section
fn syncplay_fallback(syncplay_ini: Option<&Path>) -> SyncplayConfig {
    let Some(path) = syncplay_ini.filter(|path| path.exists()) else {
        return SyncplayConfig::default();
    };

    match SyncplayConfig::from_syncplay_ini(path) {
        Ok(config) => {
            info!("Using Syncplay server and identity from {}", path.display());
            config
        }
        Err(e) => {
            warn!("Ignoring Syncplay client config: {}", e);
            SyncplayConfig::default()
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebserverConfig {
    pub enable: bool,
    pub host: String,
    pub port: u16,
    /// Directory of static assets served at `/`
    pub static_path: Option<PathBuf>,
}

impl Default for WebserverConfig {
    fn default() -> Self {
        Self {
            enable: true,
            host: "0.0.0.0".to_string(),
            port: 5000,
            static_path: None,
        }
    }
}

/// Media-control command settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerctlConfig {
    pub binary: String,
    /// Players never addressed by commands
    pub ignore_list: Vec<String>,
    /// Where runtime changes to the ignore list are persisted
    pub ignore_list_file: Option<PathBuf>,
    pub cache_ttl_ms: u64,
}

impl Default for PlayerctlConfig {
    fn default() -> Self {
        Self {
            binary: "playerctl".to_string(),
            ignore_list: vec!["kdeconnect".to_string()],
            ignore_list_file: None,
            cache_ttl_ms: 1000,
        }
    }
}

/// Thumbnail extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Edge length of the generated image in pixels
    pub size: u32,
    pub ffmpeg: String,
    pub ffprobe: String,
    pub cache_size: u64,
    pub cache_ttl_secs: u64,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            size: 512,
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            cache_size: 5,
            cache_ttl_secs: 300,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub syncplay: SyncplayConfig,
    pub webserver: WebserverConfig,
    pub playerctl: PlayerctlConfig,
    pub thumbnail: ThumbnailConfig,
    pub logging: Option<LoggingConfig>,
}

impl AppConfig {
    /// Build the configuration from a parsed JSON document
    pub fn from_value(config: &serde_json::Value) -> Result<Self, ConfigError> {
        Self::from_value_with_ini(config, syncplay_ini_path().as_deref())
    }

    /// Like [`from_value`](Self::from_value), with an explicit syncplay.ini location
    pub fn from_value_with_ini(config: &serde_json::Value, syncplay_ini: Option<&Path>) -> Result<Self, ConfigError> {
        Ok(Self {
            syncplay: match get_service_config(config, "syncplay") {
                Some(value) => parse_section(value, "syncplay")?,
                None => syncplay_fallback(syncplay_ini),
            },
            webserver: section(config, "webserver")?,
            playerctl: section(config, "playerctl")?,
            thumbnail: section(config, "thumbnail")?,
            logging: match get_service_config(config, "logging") {
                Some(value) => Some(parse_section(value, "logging")?),
                None => None,
            },
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Load the configuration file, using defaults if it does not exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Self::from_value(&serde_json::Value::Null);
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config = Self::from_json(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

fn section<T: DeserializeOwned + Default>(config: &serde_json::Value, name: &str) -> Result<T, ConfigError> {
    match get_service_config(config, name) {
        Some(value) => parse_section(value, name),
        None => Ok(T::default()),
    }
}

fn parse_section<T: DeserializeOwned>(value: &serde_json::Value, name: &str) -> Result<T, ConfigError> {
    serde_json::from_value(value.clone()).map_err(|e| ConfigError::Parse(format!("section '{}': {}", name, e)))
}
