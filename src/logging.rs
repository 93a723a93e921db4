use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use log::{debug, info, LevelFilter};
use serde::{Deserialize, Serialize};
use env_logger::{Builder, Target, WriteStyle};

/// Available logging subsystems
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingSubsystem {
    /// Main application logging
    Main,
    /// HTTP API handlers
    Api,
    /// Syncplay session and protocol
    Syncplay,
    /// Media-control command invocations
    Playerctl,
    /// Thumbnail extraction
    Thumbnail,
    /// Configuration loading and parsing
    Config,
    /// Rocket and its HTTP stack
    Deps,
}

impl LoggingSubsystem {
    /// Module prefixes covered by this subsystem
    pub fn module_prefixes(&self) -> &'static [&'static str] {
        match self {
            LoggingSubsystem::Main => &["playerctl_web"],
            LoggingSubsystem::Api => &["playerctl_web::api"],
            LoggingSubsystem::Syncplay => &["playerctl_web::syncplay"],
            LoggingSubsystem::Playerctl => &["playerctl_web::helpers::playerctl"],
            LoggingSubsystem::Thumbnail => &["playerctl_web::helpers::thumbnail"],
            LoggingSubsystem::Config => &["playerctl_web::config"],
            LoggingSubsystem::Deps => &["rocket", "hyper"],
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "main" => Some(LoggingSubsystem::Main),
            "api" => Some(LoggingSubsystem::Api),
            "syncplay" => Some(LoggingSubsystem::Syncplay),
            "playerctl" => Some(LoggingSubsystem::Playerctl),
            "thumbnail" => Some(LoggingSubsystem::Thumbnail),
            "config" => Some(LoggingSubsystem::Config),
            "deps" | "dependencies" => Some(LoggingSubsystem::Deps),
            _ => None,
        }
    }
}

/// Logging configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global log level (off, error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Target for log output (stdout, stderr, file)
    #[serde(default = "default_target")]
    pub target: String,

    /// Log file path (when target is "file")
    pub file_path: Option<String>,

    #[serde(default = "default_true")]
    pub timestamps: bool,

    #[serde(default = "default_true")]
    pub colors: bool,

    /// Subsystem-specific log levels; unknown names are used as module paths
    #[serde(default)]
    pub subsystems: HashMap<String, String>,

    #[serde(default)]
    pub include_module_path: bool,

    #[serde(default)]
    pub include_line_numbers: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_target() -> String {
    "stdout".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            target: default_target(),
            file_path: None,
            timestamps: true,
            colors: true,
            subsystems: HashMap::new(),
            include_module_path: false,
            include_line_numbers: false,
        }
    }
}

impl LoggingConfig {
    /// Load logging configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read logging config file: {}", e))?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("Failed to parse logging config: {}", e))
    }

    /// Convert string log level to LevelFilter
    pub fn parse_log_level(level: &str) -> LevelFilter {
        match level.to_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "debug" => LevelFilter::Debug,
            "trace" => LevelFilter::Trace,
            _ => {
                eprintln!("Warning: Unknown log level '{}', defaulting to 'info'", level);
                LevelFilter::Info
            }
        }
    }

    /// Per-module filters, expanded from the subsystem map
    pub fn module_filters(&self) -> Vec<(String, LevelFilter)> {
        let mut filters = Vec::new();
        for (name, level) in &self.subsystems {
            let level = Self::parse_log_level(level);
            match LoggingSubsystem::parse(name) {
                Some(subsystem) => {
                    for prefix in subsystem.module_prefixes() {
                        filters.push((prefix.to_string(), level));
                    }
                }
                None => filters.push((name.clone(), level)),
            }
        }
        filters.sort();
        filters
    }

    /// Filter in env_logger directive syntax, for display
    pub fn build_filter_string(&self) -> String {
        let mut parts = vec![self.level.to_lowercase()];
        for (module, level) in self.module_filters() {
            parts.push(format!("{}={}", module, level.to_string().to_lowercase()));
        }
        parts.join(",")
    }

    /// Initialize the global logger with this configuration
    pub fn initialize_logger(&self) -> Result<(), String> {
        let filter_string = self.build_filter_string();
        let mut builder = Builder::new();

        builder.parse_env("RUST_LOG");
        builder.filter(None, Self::parse_log_level(&self.level));
        for (module, level) in self.module_filters() {
            builder.filter(Some(&module), level);
        }

        builder.write_style(if self.colors { WriteStyle::Auto } else { WriteStyle::Never });

        match self.target.to_lowercase().as_str() {
            "stdout" => {
                builder.target(Target::Stdout);
            }
            "stderr" => {
                builder.target(Target::Stderr);
            }
            "file" => {
                let path = self
                    .file_path
                    .as_ref()
                    .ok_or_else(|| "File target specified but no file_path provided".to_string())?;
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| format!("Failed to open log file {}: {}", path, e))?;
                builder.target(Target::Pipe(Box::new(file)));
            }
            other => {
                return Err(format!("Unknown logging target: {}", other));
            }
        }

        let include_module_path = self.include_module_path;
        let include_line_numbers = self.include_line_numbers;
        let timestamps = self.timestamps;

        builder.format(move |buf, record| {
            if timestamps {
                write!(buf, "[{}] ", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))?;
            }
            write!(buf, "[{}] ", record.level())?;
            if include_module_path {
                if let Some(module) = record.module_path() {
                    write!(buf, "[{}] ", module)?;
                }
            }
            if include_line_numbers {
                if let (Some(file), Some(line)) = (record.file(), record.line()) {
                    write!(buf, "[{}:{}] ", file, line)?;
                }
            }
            writeln!(buf, "{}", record.args())
        });

        builder.try_init().map_err(|e| format!("Failed to initialize logger: {}", e))?;

        info!("Logging initialized with filter: {}", filter_string);
        Ok(())
    }
}

/// Initialize logging from an optional config and the command line verbosity flags
pub fn initialize_logging(config: Option<LoggingConfig>, debug_mode: bool, verbose_mode: bool) -> Result<(), String> {
    let mut config = config.unwrap_or_default();

    if verbose_mode {
        config.level = "trace".to_string();
    } else if debug_mode {
        config.level = "debug".to_string();
    }

    config.initialize_logger()?;
    debug!("Debug logging enabled");
    Ok(())
}
