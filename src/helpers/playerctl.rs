use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::RwLock;
use std::time::Duration;
use log::{debug, info, warn};
use moka::sync::Cache;

use crate::config::PlayerctlConfig;
use crate::data::PlayerCommand;

/// Errors from running playerctl
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlayerCtlError {
    #[error("Failed to run {binary}: {reason}")]
    Spawn { binary: String, reason: String },

    #[error("playerctl {command} failed: {reason}")]
    Failed { command: String, reason: String },

    #[error("Unexpected playerctl output '{0}'")]
    InvalidOutput(String),

    #[error("Failed to save ignore list: {0}")]
    Persist(String),
}

/// Runs the playerctl command line tool
///
/// Players on the ignore list are excluded from every invocation. Read-only
/// queries can go through a short-lived cache since the web UI polls them.
pub struct PlayerCtl {
    binary: String,
    ignore_list: RwLock<Vec<String>>,
    ignore_list_file: Option<PathBuf>,
    cache: Cache<Vec<String>, Result<String, PlayerCtlError>>,
}

impl PlayerCtl {
    pub fn new(config: &PlayerctlConfig) -> Self {
        let ignore_list = match &config.ignore_list_file {
            Some(path) => load_ignore_list(path).unwrap_or_else(|| config.ignore_list.clone()),
            None => config.ignore_list.clone(),
        };
        debug!("Ignoring players: {:?}", ignore_list);

        Self {
            binary: config.binary.clone(),
            ignore_list: RwLock::new(ignore_list),
            ignore_list_file: config.ignore_list_file.clone(),
            cache: Cache::builder()
                .max_capacity(256)
                .time_to_live(Duration::from_millis(config.cache_ttl_ms.max(1)))
                .build(),
        }
    }

    /// Full argument list for one invocation
    pub fn build_args(&self, command: &str, args: &[&str], player: Option<&str>) -> Vec<String> {
        let mut full: Vec<String> = self
            .ignore_list()
            .iter()
            .map(|p| format!("--ignore-player={}", p))
            .collect();

        if let Some(player) = player.filter(|p| !p.is_empty()) {
            full.push(format!("--player={}", player));
        }
        full.push(command.to_string());
        full.extend(args.iter().map(|a| a.to_string()));
        full
    }

    /// Run a command and return its trimmed standard output
    pub fn run(&self, command: &str, args: &[&str], player: Option<&str>) -> Result<String, PlayerCtlError> {
        let full = self.build_args(command, args, player);
        self.execute(command, &full)
    }

    /// Like [`PlayerCtl::run`], but reuses a recent result for identical arguments
    pub fn run_cached(&self, command: &str, args: &[&str], player: Option<&str>) -> Result<String, PlayerCtlError> {
        let full = self.build_args(command, args, player);
        if let Some(result) = self.cache.get(&full) {
            return result;
        }
        let result = self.execute(command, &full);
        self.cache.insert(full, result.clone());
        result
    }

    fn execute(&self, command: &str, args: &[String]) -> Result<String, PlayerCtlError> {
        debug!("Running {} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| PlayerCtlError::Spawn {
                binary: self.binary.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let reason = if stderr.is_empty() { output.status.to_string() } else { stderr };
            debug!("{} {} failed: {}", self.binary, command, reason);
            return Err(PlayerCtlError::Failed {
                command: command.to_string(),
                reason,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Names of all players playerctl can see
    pub fn list_players(&self) -> Vec<String> {
        match self.run_cached("--list-all", &[], None) {
            Ok(output) => output
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
            Err(e) => {
                debug!("No players found: {}", e);
                Vec::new()
            }
        }
    }

    pub fn send_command(&self, command: PlayerCommand, player: Option<&str>) -> Result<String, PlayerCtlError> {
        info!("Sending {} to {}", command, player.unwrap_or("active player"));
        self.run(command.as_arg(), &[], player)
    }

    pub fn status(&self, player: Option<&str>) -> Result<String, PlayerCtlError> {
        self.run_cached("status", &[], player)
    }

    pub fn volume(&self, player: Option<&str>) -> Result<f64, PlayerCtlError> {
        parse_number(&self.run_cached("volume", &[], player)?)
    }

    pub fn set_volume(&self, level: f64, player: Option<&str>) -> Result<(), PlayerCtlError> {
        let level = format!("{:.2}", level);
        self.run("volume", &[&level], player).map(|_| ())
    }

    /// Playback position in seconds
    pub fn position(&self, player: Option<&str>) -> Result<f64, PlayerCtlError> {
        parse_number(&self.run("position", &[], player)?)
    }

    pub fn set_position(&self, seconds: f64, player: Option<&str>) -> Result<(), PlayerCtlError> {
        let seconds = seconds.to_string();
        self.run("position", &[&seconds], player).map(|_| ())
    }

    /// Seek relative to the current position, never before the start
    pub fn seek_relative(&self, offset: i64, player: Option<&str>) -> Result<f64, PlayerCtlError> {
        let target = (self.position(player)? + offset as f64).max(0.0);
        self.set_position(target, player)?;
        Ok(target)
    }

    /// One metadata field such as `title` or `mpris:length`
    pub fn metadata(&self, key: &str, player: Option<&str>) -> Result<String, PlayerCtlError> {
        self.run_cached("metadata", &[key], player)
    }

    pub fn ignore_list(&self) -> Vec<String> {
        self.ignore_list
            .read()
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    /// Replace the ignore list and persist it if a file is configured
    pub fn set_ignore_list(&self, list: Vec<String>) -> Result<(), PlayerCtlError> {
        if let Some(path) = &self.ignore_list_file {
            save_ignore_list(path, &list)?;
        }
        match self.ignore_list.write() {
            Ok(mut current) => *current = list,
            Err(poisoned) => *poisoned.into_inner() = list,
        }
        self.cache.invalidate_all();
        info!("Ignore list updated: {:?}", self.ignore_list());
        Ok(())
    }
}

fn parse_number(output: &str) -> Result<f64, PlayerCtlError> {
    output
        .trim()
        .parse::<f64>()
        .map_err(|_| PlayerCtlError::InvalidOutput(output.to_string()))
}

/// Read a JSON ignore list; None if the file is missing or invalid
pub fn load_ignore_list(path: &Path) -> Option<Vec<String>> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(list) => Some(list),
        Err(e) => {
            warn!("Ignoring invalid ignore list {}: {}", path.display(), e);
            None
        }
    }
}

pub fn save_ignore_list(path: &Path, list: &[String]) -> Result<(), PlayerCtlError> {
    let json = serde_json::to_string(list).map_err(|e| PlayerCtlError::Persist(e.to_string()))?;
    fs::write(path, json).map_err(|e| PlayerCtlError::Persist(format!("{}: {}", path.display(), e)))
}
