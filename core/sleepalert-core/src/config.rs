//! Runtime configuration.
//!
//! Loaded from `~/.sleepalert/config.toml` when present. Every key is optional;
//! a missing file yields the defaults below.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MonitorError, Result};

const DEFAULT_CONFIG_RELATIVE_PATH: &str = ".sleepalert/config.toml";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const MAX_QUICK_PULSES: u32 = 2;
const MAX_POLL_INTERVAL_SECS: u64 = 3_600;
const MAX_PULSE_MS: u64 = 10_000;
const MAX_WARN_INTERVAL_SECS: u64 = 86_400;

#[derive(Debug, Clone, Deserialize)]
pub struct LevelConfig {
    #[serde(default = "default_warn5")]
    pub warn5: f64,
    #[serde(default = "default_warn4")]
    pub warn4: f64,
    #[serde(default = "default_warn3")]
    pub warn3: f64,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            warn5: default_warn5(),
            warn4: default_warn4(),
            warn3: default_warn3(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlashConfig {
    /// Brightness used for the dark half of every pulse.
    #[serde(default)]
    pub low_level: f64,
    #[serde(default = "default_quick_pulses")]
    pub quick_pulses: u32,
    #[serde(default = "default_quick_pulse_ms")]
    pub quick_pulse_ms: u64,
    #[serde(default = "default_continuous_pulse_ms")]
    pub continuous_pulse_ms: u64,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            low_level: 0.0,
            quick_pulses: default_quick_pulses(),
            quick_pulse_ms: default_quick_pulse_ms(),
            continuous_pulse_ms: default_continuous_pulse_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayBackend {
    #[default]
    Auto,
    BrightnessCli,
    Sysfs,
    /// Log-only mode: alerts are tracked but the display is never touched.
    Disabled,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PowerBackend {
    #[default]
    Auto,
    Pmset,
    Sysfs,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DisplayConfig {
    #[serde(default)]
    pub backend: DisplayBackend,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PowerConfig {
    #[serde(default)]
    pub backend: PowerBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Minimum spacing between repeats of the same collaborator failure.
    #[serde(default = "default_warn_interval_secs")]
    pub warn_interval_secs: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            warn_interval_secs: default_warn_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Brightness at or below which the Warn3 alert fires regardless of battery.
    #[serde(default)]
    pub brightness_cutoff: Option<f64>,
    #[serde(default)]
    pub levels: LevelConfig,
    #[serde(default)]
    pub flash: FlashConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub power: PowerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            brightness_cutoff: None,
            levels: LevelConfig::default(),
            flash: FlashConfig::default(),
            display: DisplayConfig::default(),
            power: PowerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn warn_interval(&self) -> Duration {
        Duration::from_secs(self.logging.warn_interval_secs)
    }

    /// Clamps out-of-range values so the monitor never sees them.
    pub fn sanitized(mut self) -> Self {
        self.poll_interval_secs = self.poll_interval_secs.clamp(1, MAX_POLL_INTERVAL_SECS);
        self.brightness_cutoff = self
            .brightness_cutoff
            .filter(|value| value.is_finite())
            .map(clamp_unit);
        self.levels.warn5 = clamp_unit(self.levels.warn5);
        self.levels.warn4 = clamp_unit(self.levels.warn4);
        self.levels.warn3 = clamp_unit(self.levels.warn3);
        self.flash.low_level = clamp_unit(self.flash.low_level);
        self.flash.quick_pulses = self.flash.quick_pulses.clamp(1, MAX_QUICK_PULSES);
        self.flash.quick_pulse_ms = self.flash.quick_pulse_ms.clamp(1, MAX_PULSE_MS);
        self.flash.continuous_pulse_ms = self.flash.continuous_pulse_ms.clamp(1, MAX_PULSE_MS);
        self.logging.warn_interval_secs = self.logging.warn_interval_secs.min(MAX_WARN_INTERVAL_SECS);
        self
    }
}

pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_RELATIVE_PATH))
}

/// Loads the config at `path` (or the default location), falling back to defaults
/// when the file does not exist.
pub fn load_config(path: Option<&Path>) -> Result<MonitorConfig> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) => path,
            None => return Ok(MonitorConfig::default()),
        },
    };

    if !config_path.exists() {
        return Ok(MonitorConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|err| MonitorError::ConfigMalformed {
        path: config_path.clone(),
        details: err.to_string(),
    })?;
    toml::from_str::<MonitorConfig>(&content)
        .map(MonitorConfig::sanitized)
        .map_err(|err| MonitorError::ConfigMalformed {
            path: config_path,
            details: err.to_string(),
        })
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_warn5() -> f64 {
    0.8
}

fn default_warn4() -> f64 {
    0.6
}

fn default_warn3() -> f64 {
    0.4
}

fn default_quick_pulses() -> u32 {
    2
}

fn default_quick_pulse_ms() -> u64 {
    150
}

fn default_continuous_pulse_ms() -> u64 {
    300
}

fn default_warn_interval_secs() -> u64 {
    300
}
