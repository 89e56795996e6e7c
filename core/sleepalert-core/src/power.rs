//! Power source and battery charge readers.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command::run_checked;
use crate::config::PowerBackend;
use crate::error::{MonitorError, Result};

const PMSET_PROGRAM: &str = "/usr/bin/pmset";
const PMSET_TIMEOUT_SECS: u64 = 2;
const SYSFS_POWER_SUPPLY_ROOT: &str = "/sys/class/power_supply";

static RE_PERCENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)%").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerSource {
    OnBattery,
    OnAcPower,
}

impl PowerSource {
    pub fn from_plugged_in(plugged_in: bool) -> Self {
        if plugged_in {
            PowerSource::OnAcPower
        } else {
            PowerSource::OnBattery
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PowerSource::OnBattery => "on battery",
            PowerSource::OnAcPower => "plugged in",
        }
    }
}

/// One consistent sample of power source and charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PowerReading {
    pub source: PowerSource,
    pub percent: u8,
}

impl PowerReading {
    pub fn on_battery(&self) -> bool {
        self.source == PowerSource::OnBattery
    }
}

pub trait PowerReader {
    fn name(&self) -> &str;

    fn power_source(&self) -> Result<PowerSource>;

    fn battery_percent(&self) -> Result<u8>;

    /// Reads both values. Backends that get both from one query should override this.
    fn read(&self) -> Result<PowerReading> {
        Ok(PowerReading {
            source: self.power_source()?,
            percent: self.battery_percent()?,
        })
    }
}

impl<T: PowerReader + ?Sized> PowerReader for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn power_source(&self) -> Result<PowerSource> {
        (**self).power_source()
    }

    fn battery_percent(&self) -> Result<u8> {
        (**self).battery_percent()
    }

    fn read(&self) -> Result<PowerReading> {
        (**self).read()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// pmset (macOS)
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct PmsetReader {
    program: PathBuf,
    timeout: Duration,
}

impl Default for PmsetReader {
    fn default() -> Self {
        Self {
            program: PathBuf::from(PMSET_PROGRAM),
            timeout: Duration::from_secs(PMSET_TIMEOUT_SECS),
        }
    }
}

impl PowerReader for PmsetReader {
    fn name(&self) -> &str {
        "pmset"
    }

    fn power_source(&self) -> Result<PowerSource> {
        self.read().map(|reading| reading.source)
    }

    fn battery_percent(&self) -> Result<u8> {
        self.read().map(|reading| reading.percent)
    }

    fn read(&self) -> Result<PowerReading> {
        let output = run_checked(&self.program, &["-g", "batt"], self.timeout)?;
        parse_pmset_output(&output.stdout)
    }
}

/// Parses `pmset -g batt`, e.g.
/// `Now drawing from 'Battery Power'\n -InternalBattery-0 (id=1234) 85%; discharging; 2:30 remaining`.
pub fn parse_pmset_output(output: &str) -> Result<PowerReading> {
    let source = PowerSource::from_plugged_in(output.contains("'AC Power'"));
    let percent = RE_PERCENT
        .captures(output)
        .and_then(|captures| captures[1].parse::<u8>().ok())
        .filter(|percent| *percent <= 100)
        .ok_or_else(|| MonitorError::Parse {
            what: "pmset battery",
            raw: output.trim().to_string(),
        })?;
    Ok(PowerReading { source, percent })
}

// ═══════════════════════════════════════════════════════════════════════════════
// sysfs (Linux)
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct SysfsPowerReader {
    root: PathBuf,
}

impl Default for SysfsPowerReader {
    fn default() -> Self {
        Self::with_root(PathBuf::from(SYSFS_POWER_SUPPLY_ROOT))
    }
}

impl SysfsPowerReader {
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    fn supplies(&self) -> Result<Vec<PathBuf>> {
        let entries = fs_err::read_dir(&self.root)
            .map_err(|err| MonitorError::from_io(self.root.display().to_string(), err))?;
        let mut supplies: Vec<PathBuf> = entries.filter_map(|entry| entry.ok().map(|e| e.path())).collect();
        supplies.sort();
        Ok(supplies)
    }
}

impl PowerReader for SysfsPowerReader {
    fn name(&self) -> &str {
        "sysfs"
    }

    fn power_source(&self) -> Result<PowerSource> {
        self.read().map(|reading| reading.source)
    }

    fn battery_percent(&self) -> Result<u8> {
        self.read().map(|reading| reading.percent)
    }

    fn read(&self) -> Result<PowerReading> {
        let mut battery: Option<(u8, String)> = None;
        let mut external_online: Option<bool> = None;

        for supply in self.supplies()? {
            let Some(kind) = read_trimmed(&supply.join("type")) else {
                continue;
            };
            match kind.as_str() {
                "Battery" if battery.is_none() => {
                    let Some(capacity) = read_trimmed(&supply.join("capacity")) else {
                        continue;
                    };
                    let percent = capacity.parse::<u8>().map_err(|_| MonitorError::Parse {
                        what: "battery capacity",
                        raw: capacity.clone(),
                    })?;
                    let status = read_trimmed(&supply.join("status")).unwrap_or_default();
                    battery = Some((percent.min(100), status));
                }
                "Mains" | "USB" => {
                    let online = read_trimmed(&supply.join("online")).is_some_and(|value| value == "1");
                    external_online = Some(external_online.unwrap_or(false) || online);
                }
                _ => {}
            }
        }

        let (percent, status) = battery.ok_or_else(|| {
            MonitorError::BackendUnavailable(format!("no battery under {}", self.root.display()))
        })?;
        let plugged_in = match external_online {
            Some(online) => online,
            None => status != "Discharging",
        };
        Ok(PowerReading {
            source: PowerSource::from_plugged_in(plugged_in),
            percent,
        })
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs_err::read_to_string(path).ok().map(|value| value.trim().to_string())
}

pub fn open_reader(backend: PowerBackend) -> Box<dyn PowerReader> {
    match backend {
        PowerBackend::Pmset => Box::new(PmsetReader::default()),
        PowerBackend::Sysfs => Box::new(SysfsPowerReader::default()),
        PowerBackend::Auto if cfg!(target_os = "macos") => Box::new(PmsetReader::default()),
        PowerBackend::Auto => Box::new(SysfsPowerReader::default()),
    }
}
