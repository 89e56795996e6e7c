//! Test-injection overrides.
//!
//! Three independent knobs, read fresh on every tick so they can be changed
//! while the daemon runs. They substitute readings at the input boundary and
//! nothing downstream knows whether an override was used.

use std::collections::HashMap;

use crate::error::Result;
use crate::power::{PowerReading, PowerSource};

pub const TEST_BATTERY_LEVEL_ENV: &str = "SLEEPALERT_TEST_BATTERY_LEVEL";
pub const TEST_PLUGGED_ENV: &str = "SLEEPALERT_TEST_PLUGGED_IN";
pub const TEST_BRIGHTNESS_CUTOFF_ENV: &str = "SLEEPALERT_TEST_BRIGHTNESS_CUTOFF";

pub trait OverrideSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads overrides from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl OverrideSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl OverrideSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidOverride {
    pub key: &'static str,
    pub raw: String,
    pub expected: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub battery_percent: Option<u8>,
    pub plugged_in: Option<bool>,
    pub brightness_cutoff: Option<f64>,
    pub invalid: Vec<InvalidOverride>,
}

impl Overrides {
    pub fn read(source: &dyn OverrideSource) -> Self {
        let mut overrides = Overrides::default();

        if let Some(raw) = source.var(TEST_BATTERY_LEVEL_ENV) {
            match raw.trim().parse::<u8>() {
                Ok(level) if level <= 100 => overrides.battery_percent = Some(level),
                _ => overrides.invalid.push(InvalidOverride {
                    key: TEST_BATTERY_LEVEL_ENV,
                    raw,
                    expected: "integer 0-100",
                }),
            }
        }

        if let Some(raw) = source.var(TEST_PLUGGED_ENV) {
            overrides.plugged_in = Some(is_truthy(&raw));
        }

        if let Some(raw) = source.var(TEST_BRIGHTNESS_CUTOFF_ENV) {
            match raw.trim().parse::<f64>() {
                Ok(value) if (0.0..=1.0).contains(&value) => overrides.brightness_cutoff = Some(value),
                _ => overrides.invalid.push(InvalidOverride {
                    key: TEST_BRIGHTNESS_CUTOFF_ENV,
                    raw,
                    expected: "0.0-1.0",
                }),
            }
        }

        overrides
    }

    /// Produces this tick's reading, calling `real` only for values that are
    /// not overridden. A simulated battery level defaults to "on battery".
    pub fn apply<F>(&self, real: F) -> Result<PowerReading>
    where
        F: FnOnce() -> Result<PowerReading>,
    {
        if let Some(percent) = self.battery_percent {
            return Ok(PowerReading {
                source: PowerSource::from_plugged_in(self.plugged_in.unwrap_or(false)),
                percent,
            });
        }

        let mut reading = real()?;
        if let Some(plugged_in) = self.plugged_in {
            reading.source = PowerSource::from_plugged_in(plugged_in);
        }
        Ok(reading)
    }

    /// Human-readable lines for the startup banner.
    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(cutoff) = self.brightness_cutoff {
            lines.push(format!(
                "Test mode: brightness cutoff {:.2} enabled (mimics 3% behavior)",
                cutoff
            ));
        }
        match (self.battery_percent, self.plugged_in) {
            (Some(level), plugged) => lines.push(format!(
                "Test mode: simulating battery at {}% ({})",
                level,
                PowerSource::from_plugged_in(plugged.unwrap_or(false)).as_str()
            )),
            (None, Some(plugged)) => lines.push(format!(
                "Test mode: forcing power source ({})",
                PowerSource::from_plugged_in(plugged).as_str()
            )),
            (None, None) => {}
        }
        lines
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;

    fn source(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    fn real_reading() -> Result<PowerReading> {
        Ok(PowerReading {
            source: PowerSource::OnAcPower,
            percent: 100,
        })
    }

    #[test]
    fn no_overrides_uses_real_reading() {
        let overrides = Overrides::read(&source(&[]));
        assert_eq!(overrides, Overrides::default());
        assert_eq!(overrides.apply(real_reading).expect("reading"), real_reading().expect("real"));
        assert!(overrides.describe().is_empty());
    }

    #[test]
    fn simulated_level_defaults_to_on_battery() {
        let overrides = Overrides::read(&source(&[(TEST_BATTERY_LEVEL_ENV, "4")]));
        let reading = overrides
            .apply(|| panic!("real reader must not be queried"))
            .expect("reading");
        assert_eq!(reading, PowerReading { source: PowerSource::OnBattery, percent: 4 });
    }

    #[test]
    fn plugged_override_accepts_truthy_spellings() {
        for raw in ["1", "true", "YES", " on "] {
            let overrides = Overrides::read(&source(&[(TEST_BATTERY_LEVEL_ENV, "3"), (TEST_PLUGGED_ENV, raw)]));
            assert_eq!(overrides.plugged_in, Some(true), "raw {raw:?}");
        }
        let overrides = Overrides::read(&source(&[(TEST_PLUGGED_ENV, "0")]));
        assert_eq!(overrides.plugged_in, Some(false));
    }

    #[test]
    fn plugged_override_alone_replaces_real_source() {
        let overrides = Overrides::read(&source(&[(TEST_PLUGGED_ENV, "no")]));
        let reading = overrides.apply(real_reading).expect("reading");
        assert_eq!(reading, PowerReading { source: PowerSource::OnBattery, percent: 100 });
    }

    #[test]
    fn real_reader_failure_propagates_without_level_override() {
        let overrides = Overrides::read(&source(&[(TEST_PLUGGED_ENV, "1")]));
        let result = overrides.apply(|| Err(MonitorError::BackendUnavailable("pmset".to_string())));
        assert!(result.is_err());
    }

    #[test]
    fn invalid_values_are_reported_and_ignored() {
        let overrides = Overrides::read(&source(&[
            (TEST_BATTERY_LEVEL_ENV, "150"),
            (TEST_BRIGHTNESS_CUTOFF_ENV, "dim"),
        ]));
        assert_eq!(overrides.battery_percent, None);
        assert_eq!(overrides.brightness_cutoff, None);
        assert_eq!(overrides.invalid.len(), 2);
        assert_eq!(overrides.invalid[0].key, TEST_BATTERY_LEVEL_ENV);
        assert_eq!(overrides.invalid[1].raw, "dim");
    }

    #[test]
    fn cutoff_override_is_parsed() {
        let overrides = Overrides::read(&source(&[(TEST_BRIGHTNESS_CUTOFF_ENV, "0.3")]));
        assert_eq!(overrides.brightness_cutoff, Some(0.3));
        assert_eq!(
            overrides.describe(),
            vec!["Test mode: brightness cutoff 0.30 enabled (mimics 3% behavior)".to_string()]
        );
    }
}
