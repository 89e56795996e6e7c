//! Display brightness control.
//!
//! Brightness is always a fraction in [0.0, 1.0]. Two backends exist:
//! the `brightness` CLI (macOS) and the Linux backlight class in sysfs.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command::run_checked;
use crate::config::{clamp_unit, DisplayBackend};
use crate::error::{MonitorError, Result};
use crate::flash::{self, FlashPattern, FlashReport};
use crate::pacer::Pacer;

const BRIGHTNESS_CLI_NAME: &str = "brightness";
const BRIGHTNESS_CLI_FALLBACKS: [&str; 2] = ["/usr/local/bin/brightness", "/opt/homebrew/bin/brightness"];
const BRIGHTNESS_CLI_TIMEOUT_SECS: u64 = 2;
const SYSFS_BACKLIGHT_ROOT: &str = "/sys/class/backlight";

static RE_BRIGHTNESS_LISTING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)brightness[^0-9]*([0-9]*\.?[0-9]+)").unwrap());

pub trait DisplayController {
    fn name(&self) -> &str;

    fn brightness(&mut self) -> Result<f64>;

    fn set_brightness(&mut self, level: f64) -> Result<()>;

    fn flash(&mut self, pattern: &FlashPattern, pacer: &mut dyn Pacer) -> Result<FlashReport> {
        flash::run_pattern(self, pattern, pacer)
    }
}

impl<T: DisplayController + ?Sized> DisplayController for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn brightness(&mut self) -> Result<f64> {
        (**self).brightness()
    }

    fn set_brightness(&mut self, level: f64) -> Result<()> {
        (**self).set_brightness(level)
    }

    fn flash(&mut self, pattern: &FlashPattern, pacer: &mut dyn Pacer) -> Result<FlashReport> {
        (**self).flash(pattern, pacer)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// brightness CLI
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct BrightnessCli {
    program: PathBuf,
    timeout: Duration,
}

impl BrightnessCli {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            timeout: Duration::from_secs(BRIGHTNESS_CLI_TIMEOUT_SECS),
        }
    }

    /// Finds the tool on `PATH` or in the usual Homebrew locations.
    pub fn discover() -> Option<Self> {
        let on_path = std::env::var_os("PATH").and_then(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(BRIGHTNESS_CLI_NAME))
                .find(|candidate| is_executable(candidate))
        });
        on_path
            .or_else(|| {
                BRIGHTNESS_CLI_FALLBACKS
                    .iter()
                    .map(PathBuf::from)
                    .find(|candidate| is_executable(candidate))
            })
            .map(Self::new)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl DisplayController for BrightnessCli {
    fn name(&self) -> &str {
        "brightness-cli"
    }

    fn brightness(&mut self) -> Result<f64> {
        let output = run_checked(&self.program, &["-l"], self.timeout)?;
        parse_brightness_listing(&output.combined())
    }

    fn set_brightness(&mut self, level: f64) -> Result<()> {
        let arg = format!("{:.4}", clamp_unit(level));
        run_checked(&self.program, &[arg.as_str()], self.timeout)?;
        Ok(())
    }
}

/// Extracts the first display's brightness from `brightness -l` output.
pub fn parse_brightness_listing(output: &str) -> Result<f64> {
    let captures = RE_BRIGHTNESS_LISTING
        .captures(output)
        .ok_or_else(|| MonitorError::Parse {
            what: "brightness listing",
            raw: output.trim().to_string(),
        })?;
    captures[1]
        .parse::<f64>()
        .map(clamp_unit)
        .map_err(|_| MonitorError::Parse {
            what: "brightness value",
            raw: captures[1].to_string(),
        })
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// sysfs backlight
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct SysfsBacklight {
    device: PathBuf,
    max_brightness: u64,
}

impl SysfsBacklight {
    /// Picks the first device (sorted by name) under `root` with a usable `max_brightness`.
    pub fn discover(root: &Path) -> Result<Self> {
        let entries = fs_err::read_dir(root).map_err(|err| MonitorError::from_io(root.display().to_string(), err))?;
        let mut devices: Vec<PathBuf> = entries.filter_map(|entry| entry.ok().map(|e| e.path())).collect();
        devices.sort();

        devices
            .into_iter()
            .find_map(|device| {
                let max_brightness = read_u64(&device.join("max_brightness")).ok()?;
                (max_brightness > 0).then_some(Self {
                    device,
                    max_brightness,
                })
            })
            .ok_or_else(|| {
                MonitorError::BackendUnavailable(format!("no backlight device under {}", root.display()))
            })
    }

    pub fn device(&self) -> &Path {
        &self.device
    }
}

impl DisplayController for SysfsBacklight {
    fn name(&self) -> &str {
        "sysfs-backlight"
    }

    fn brightness(&mut self) -> Result<f64> {
        let raw = read_u64(&self.device.join("brightness"))?;
        Ok(clamp_unit(raw as f64 / self.max_brightness as f64))
    }

    fn set_brightness(&mut self, level: f64) -> Result<()> {
        let path = self.device.join("brightness");
        let raw = (clamp_unit(level) * self.max_brightness as f64).round() as u64;
        fs_err::write(&path, raw.to_string()).map_err(|err| MonitorError::from_io(path.display().to_string(), err))
    }
}

fn read_u64(path: &Path) -> Result<u64> {
    let content = fs_err::read_to_string(path).map_err(|err| MonitorError::from_io(path.display().to_string(), err))?;
    content.trim().parse::<u64>().map_err(|_| MonitorError::Parse {
        what: "sysfs integer",
        raw: content.trim().to_string(),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Selection
// ═══════════════════════════════════════════════════════════════════════════════

/// Stand-in used when no brightness control exists; every call fails so the
/// monitor keeps tracking battery levels without visual effect.
#[derive(Debug, Clone)]
pub struct UnavailableDisplay {
    reason: String,
}

impl UnavailableDisplay {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl DisplayController for UnavailableDisplay {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn brightness(&mut self) -> Result<f64> {
        Err(MonitorError::BackendUnavailable(self.reason.clone()))
    }

    fn set_brightness(&mut self, _level: f64) -> Result<()> {
        Err(MonitorError::BackendUnavailable(self.reason.clone()))
    }
}

pub fn open_display(backend: DisplayBackend) -> Result<Box<dyn DisplayController>> {
    let sysfs_root = Path::new(SYSFS_BACKLIGHT_ROOT);
    match backend {
        DisplayBackend::BrightnessCli => BrightnessCli::discover()
            .map(|cli| Box::new(cli) as Box<dyn DisplayController>)
            .ok_or_else(|| MonitorError::BackendUnavailable("brightness CLI not found".to_string())),
        DisplayBackend::Disabled => Ok(Box::new(UnavailableDisplay::new("display alerts disabled"))),
        DisplayBackend::Sysfs => {
            SysfsBacklight::discover(sysfs_root).map(|dev| Box::new(dev) as Box<dyn DisplayController>)
        }
        DisplayBackend::Auto => {
            if let Some(cli) = BrightnessCli::discover() {
                return Ok(Box::new(cli));
            }
            SysfsBacklight::discover(sysfs_root)
                .map(|dev| Box::new(dev) as Box<dyn DisplayController>)
                .map_err(|_| {
                    MonitorError::BackendUnavailable(
                        "neither the brightness CLI nor a sysfs backlight is available".to_string(),
                    )
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_brightness_cli_listing() {
        let output = "display 0: main, active, awake, online, built-in, ID 0x4280a80\n\
                      display 0: brightness 0.687500";
        let value = parse_brightness_listing(output).expect("parse listing");
        assert!((value - 0.6875).abs() < 1e-9);
    }

    #[test]
    fn listing_without_brightness_is_parse_error() {
        let err = parse_brightness_listing("display 0: main, active").expect_err("no brightness");
        assert!(matches!(err, MonitorError::Parse { .. }));
    }

    #[test]
    fn listing_is_case_insensitive_and_clamped() {
        let value = parse_brightness_listing("Brightness: 1.5").expect("parse listing");
        assert_eq!(value, 1.0);
    }

    #[test]
    fn sysfs_backlight_reads_and_writes_fraction() {
        let root = tempfile::tempdir().expect("temp dir");
        let device = root.path().join("intel_backlight");
        fs_err::create_dir_all(&device).expect("create device");
        fs_err::write(device.join("max_brightness"), "1000\n").expect("write max");
        fs_err::write(device.join("brightness"), "750\n").expect("write brightness");

        let mut backlight = SysfsBacklight::discover(root.path()).expect("discover");
        assert!((backlight.brightness().expect("read") - 0.75).abs() < 1e-9);

        backlight.set_brightness(0.4).expect("write");
        let raw = fs_err::read_to_string(device.join("brightness")).expect("read back");
        assert_eq!(raw.trim(), "400");
    }

    #[test]
    fn sysfs_backlight_skips_devices_without_max() {
        let root = tempfile::tempdir().expect("temp dir");
        fs_err::create_dir_all(root.path().join("acpi_video0")).expect("create broken device");
        let device = root.path().join("intel_backlight");
        fs_err::create_dir_all(&device).expect("create device");
        fs_err::write(device.join("max_brightness"), "255").expect("write max");
        fs_err::write(device.join("brightness"), "255").expect("write brightness");

        let backlight = SysfsBacklight::discover(root.path()).expect("discover");
        assert_eq!(backlight.device(), device.as_path());
    }

    #[test]
    fn empty_backlight_root_is_unavailable() {
        let root = tempfile::tempdir().expect("temp dir");
        let err = SysfsBacklight::discover(root.path()).expect_err("no devices");
        assert!(matches!(err, MonitorError::BackendUnavailable(_)));
    }

    #[test]
    fn unavailable_display_always_fails() {
        let mut display = UnavailableDisplay::new("no backlight");
        assert!(display.brightness().is_err());
        assert!(display.set_brightness(0.5).is_err());
    }
}
