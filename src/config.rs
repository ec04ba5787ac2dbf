//! Configuration for the logging setup

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::logging::format::{is_valid_strftime, Layout, BRIEF_PATTERN, DETAILED_PATTERN};
use crate::logging::{Level, DEFAULT_TIME_FORMAT};

/// Root of the standard per-day task log directories
pub const DEFAULT_LOG_ROOT: &str = "/jac_logs";

/// drwxrwsrwx: world-writable with setgid, so every task can share a day directory
pub const DEFAULT_DIR_MODE: u32 = 0o2777;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Task name; when set, records also go to `<log_root>/<yyyymmdd>/<task_name>.log`
    #[serde(default)]
    pub task_name: Option<String>,

    /// Root directory for per-day log directories (a leading `~` is expanded)
    #[serde(default = "default_log_root")]
    pub log_root: String,

    /// Full strftime path template, overriding `log_root` and `task_name`
    #[serde(default)]
    pub path_template: Option<String>,

    /// Render the file path template in UTC (default: true)
    #[serde(default = "default_true")]
    pub file_utc: bool,

    /// Mode for newly created log directories; 0 skips the chmod (default: 0o2777)
    #[serde(default = "default_dir_mode")]
    pub dir_mode: u32,

    /// Records below this level are dropped everywhere (default: INFO)
    #[serde(default = "default_level")]
    pub level: Level,

    /// Minimum level forwarded to the task-control system (default: INFO)
    #[serde(default = "default_level")]
    pub bridge_level: Level,

    /// Records at or above this level are error messages (default: WARNING)
    #[serde(default = "default_bridge_threshold")]
    pub bridge_threshold: Level,

    /// Layout for console and file output
    #[serde(default = "default_console_format")]
    pub console_format: String,

    /// Layout for task-control messages
    #[serde(default = "default_bridge_format")]
    pub bridge_format: String,

    /// chrono format for `{asctime}`
    #[serde(default = "default_time_format")]
    pub time_format: String,

    /// Render `{asctime}` in UTC instead of local time
    #[serde(default)]
    pub utc_timestamps: bool,
}

fn default_log_root() -> String {
    DEFAULT_LOG_ROOT.to_string()
}

fn default_true() -> bool {
    true
}

fn default_dir_mode() -> u32 {
    DEFAULT_DIR_MODE
}

fn default_level() -> Level {
    Level::Info
}

fn default_bridge_threshold() -> Level {
    Level::Warning
}

fn default_console_format() -> String {
    DETAILED_PATTERN.to_string()
}

fn default_bridge_format() -> String {
    BRIEF_PATTERN.to_string()
}

fn default_time_format() -> String {
    DEFAULT_TIME_FORMAT.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            task_name: None,
            log_root: default_log_root(),
            path_template: None,
            file_utc: true,
            dir_mode: default_dir_mode(),
            level: default_level(),
            bridge_level: default_level(),
            bridge_threshold: default_bridge_threshold(),
            console_format: default_console_format(),
            bridge_format: default_bridge_format(),
            time_format: default_time_format(),
            utc_timestamps: false,
        }
    }
}

/// Escape `%` so a literal string survives strftime rendering
fn escape_strftime(s: &str) -> String {
    s.replace('%', "%%")
}

impl LoggingConfig {
    /// Default configuration with the file sink enabled for `task_name`
    pub fn for_task(task_name: impl Into<String>) -> Self {
        Self {
            task_name: Some(task_name.into()),
            ..Self::default()
        }
    }

    /// Load configuration from the default file, or return defaults if not found
    pub fn load() -> Result<Self> {
        Self::load_or_default(&config_file_path())
    }

    /// Load configuration from `path`, or return defaults if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load and validate configuration from `path`
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Check layouts, time format and path template
    pub fn validate(&self) -> Result<()> {
        self.console_layout()?;
        self.bridge_layout()?;
        if let Some(template) = self.file_template() {
            if !is_valid_strftime(&template) {
                anyhow::bail!("Invalid log path template '{}'", template);
            }
        }
        Ok(())
    }

    /// Directory mode for the file sink, `None` when chmod is disabled
    pub fn dir_mode(&self) -> Option<u32> {
        (self.dir_mode != 0).then_some(self.dir_mode)
    }

    /// Strftime template for the file sink, if file logging is enabled
    pub fn file_template(&self) -> Option<String> {
        if let Some(template) = &self.path_template {
            return Some(shellexpand::tilde(template).into_owned());
        }
        let task_name = self.task_name.as_deref()?;
        let root = shellexpand::tilde(&self.log_root);
        Some(format!(
            "{}/%Y%m%d/{}.log",
            root.trim_end_matches('/'),
            escape_strftime(task_name)
        ))
    }

    pub fn console_layout(&self) -> Result<Layout> {
        self.layout(&self.console_format)
            .context("Invalid console_format")
    }

    pub fn bridge_layout(&self) -> Result<Layout> {
        self.layout(&self.bridge_format).context("Invalid bridge_format")
    }

    fn layout(&self, pattern: &str) -> Result<Layout> {
        let layout = Layout::parse(pattern)?
            .with_time_format(self.time_format.clone())?
            .with_utc(self.utc_timestamps);
        Ok(layout)
    }
}

/// Get the base configuration directory (~/.drama-log)
/// Falls back to ./.drama-log if home directory cannot be determined
pub fn config_dir() -> PathBuf {
    try_config_dir().unwrap_or_else(|| {
        tracing::warn!("Could not determine home directory, using current directory for config");
        PathBuf::from(".drama-log")
    })
}

/// Try to get the base configuration directory, returning None if home dir is unavailable
pub fn try_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".drama-log"))
}

/// Get the path to the config file
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}
