// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline configuration
//!
//! Configuration is a JSON document whose every field has a default, so an
//! empty object (or no file at all) yields the stock pipeline. Lookup order:
//!
//! 1. Explicit path passed on the command line
//! 2. `GAZECURSOR_CONFIG` environment variable
//! 3. `<config dir>/gazecursor/config.json`
//! 4. Built-in defaults
//!
//! `GAZECURSOR_DEVICE` and `GAZECURSOR_LOG` override single fields afterwards.

use crate::constants;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Configuration file name inside the per-user config directory
const CONFIG_FILE_NAME: &str = "config.json";
/// Application directory inside the per-user config directory
const CONFIG_DIR_NAME: &str = "gazecursor";

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Scheduling parameters of one periodic stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSettings {
    /// CPU core the stage's thread is pinned to
    pub cpu: usize,
    /// SCHED_FIFO priority
    pub priority: i32,
    /// Release period in milliseconds
    pub period_ms: u64,
}

impl TaskSettings {
    pub const fn new(cpu: usize, priority: i32, period_ms: u64) -> Self {
        Self {
            cpu,
            priority,
            period_ms,
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Capture device settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// V4L2 device node
    pub device_path: String,
    /// Requested frame width
    pub width: u32,
    /// Requested frame height
    pub height: u32,
    /// Number of device-mapped buffers
    pub pool_size: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device_path: constants::capture::DEVICE_PATH.to_string(),
            width: constants::capture::WIDTH,
            height: constants::capture::HEIGHT,
            pool_size: constants::capture::POOL_SIZE,
        }
    }
}

/// Queue capacities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// High-water mark of each frame subscriber queue
    pub subscriber_hwm: usize,
    /// High-water mark of each control channel
    pub control_hwm: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            subscriber_hwm: constants::transport::SUBSCRIBER_HWM,
            control_hwm: constants::transport::CONTROL_HWM,
        }
    }
}

/// Release loop settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Longest single sleep of the release loop
    pub max_sleep_ms: u64,
    /// Activations excluded from min/max timing statistics
    pub warm_up_activations: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_sleep_ms: constants::scheduler::MAX_SLEEP_MS,
            warm_up_activations: constants::scheduler::WARM_UP_ACTIVATIONS,
        }
    }
}

/// Per-stage scheduling table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskTable {
    pub cursor: TaskSettings,
    pub capture: TaskSettings,
    pub detection: TaskSettings,
    pub compression: TaskSettings,
    pub logging: TaskSettings,
}

impl Default for TaskTable {
    fn default() -> Self {
        Self {
            cursor: TaskSettings::new(0, 99, 50),
            capture: TaskSettings::new(0, 98, 60),
            detection: TaskSettings::new(0, 97, 100),
            compression: TaskSettings::new(1, 99, 70),
            logging: TaskSettings::new(1, 98, 250),
        }
    }
}

impl TaskTable {
    /// Stage name and settings in registration order
    pub fn entries(&self) -> [(&'static str, TaskSettings); 5] {
        [
            ("cursor", self.cursor),
            ("capture", self.capture),
            ("detection", self.detection),
            ("compression", self.compression),
            ("logging", self.logging),
        ]
    }
}

/// Cursor translation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorSettings {
    pub display_width: i32,
    pub display_height: i32,
    /// Number of recent detections averaged
    pub smoothing_window: usize,
    /// Directory holding calibration_face.csv / calibration_eye.csv
    pub calibration_dir: PathBuf,
    /// Mirror x before mapping (camera faces the user)
    pub mirror: bool,
    /// Drive a uinput pointer; when false or unavailable positions are only logged
    pub uinput: bool,
}

impl Default for CursorSettings {
    fn default() -> Self {
        Self {
            display_width: constants::cursor::DISPLAY_WIDTH,
            display_height: constants::cursor::DISPLAY_HEIGHT,
            smoothing_window: constants::cursor::SMOOTHING_WINDOW,
            calibration_dir: PathBuf::from("."),
            mirror: true,
            uinput: true,
        }
    }
}

/// Persisted output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Directory for compressed frames; `None` disables the compression stage
    pub image_dir: Option<PathBuf>,
    /// Directory for telemetry CSV files
    pub csv_dir: PathBuf,
    pub jpeg_quality: u8,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            image_dir: Some(PathBuf::from(constants::output::IMAGE_DIR)),
            csv_dir: PathBuf::from("."),
            jpeg_quality: constants::output::JPEG_QUALITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default log filter when RUST_LOG is unset
    pub log_level: String,
    pub capture: CaptureSettings,
    pub transport: TransportSettings,
    pub scheduler: SchedulerSettings,
    pub tasks: TaskTable,
    pub cursor: CursorSettings,
    pub output: OutputSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            capture: CaptureSettings::default(),
            transport: TransportSettings::default(),
            scheduler: SchedulerSettings::default(),
            tasks: TaskTable::default(),
            cursor: CursorSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration following the documented lookup order
    ///
    /// An explicitly named file (argument or environment) must exist and
    /// parse. The per-user default file is optional.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        let env_path = std::env::var_os("GAZECURSOR_CONFIG").map(PathBuf::from);

        let mut config = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!("No configuration file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_environment_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration file
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Apply single-field environment overrides
    pub fn apply_environment_overrides(&mut self) {
        if let Ok(device) = std::env::var("GAZECURSOR_DEVICE") {
            self.capture.device_path = device;
        }
        if let Ok(level) = std::env::var("GAZECURSOR_LOG") {
            self.log_level = level;
        }
    }

    /// Check value ranges the pipeline relies on
    pub fn validate(&self) -> ConfigResult<()> {
        if self.capture.pool_size == 0 {
            return Err(ConfigError::InvalidValue(
                "capture.pool_size must be at least 1".to_string(),
            ));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "capture resolution {}x{} is empty",
                self.capture.width, self.capture.height
            )));
        }
        if self.transport.subscriber_hwm == 0 || self.transport.control_hwm == 0 {
            return Err(ConfigError::InvalidValue(
                "transport high-water marks must be at least 1".to_string(),
            ));
        }
        if self.scheduler.max_sleep_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "scheduler.max_sleep_ms must be at least 1".to_string(),
            ));
        }
        if self.cursor.display_width < 1 || self.cursor.display_height < 1 {
            return Err(ConfigError::InvalidValue(format!(
                "cursor display {}x{} is empty",
                self.cursor.display_width, self.cursor.display_height
            )));
        }
        if self.cursor.smoothing_window == 0 {
            return Err(ConfigError::InvalidValue(
                "cursor.smoothing_window must be at least 1".to_string(),
            ));
        }
        if !(1..=100).contains(&self.output.jpeg_quality) {
            return Err(ConfigError::InvalidValue(format!(
                "output.jpeg_quality {} outside 1..=100",
                self.output.jpeg_quality
            )));
        }

        let priorities =
            constants::scheduler::FIFO_PRIORITY_MIN..=constants::scheduler::FIFO_PRIORITY_MAX;
        for (name, task) in self.tasks.entries() {
            if task.period_ms == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "tasks.{}.period_ms must be greater than zero",
                    name
                )));
            }
            if !priorities.contains(&task.priority) {
                return Err(ConfigError::InvalidValue(format!(
                    "tasks.{}.priority {} outside {:?}",
                    name, task.priority, priorities
                )));
            }
        }
        Ok(())
    }

    pub fn max_sleep(&self) -> Duration {
        Duration::from_millis(self.scheduler.max_sleep_ms)
    }
}

/// Per-user configuration file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"capture": {"pool_size": 6}}"#).unwrap();
        assert_eq!(config.capture.pool_size, 6);
        assert_eq!(config.capture.width, constants::capture::WIDTH);
        assert_eq!(config.transport, TransportSettings::default());
    }

    #[test]
    fn test_validate_rejects_zero_period() {
        let mut config = Config::default();
        config.tasks.detection.period_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_validate_rejects_priority_out_of_range() {
        let mut config = Config::default();
        config.tasks.cursor.priority = 120;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_task_table_order() {
        let names: Vec<_> = TaskTable::default()
            .entries()
            .iter()
            .map(|(name, _)| *name)
            .collect();
        assert_eq!(
            names,
            ["cursor", "capture", "detection", "compression", "logging"]
        );
    }
}
