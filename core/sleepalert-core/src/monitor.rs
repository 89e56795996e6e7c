//! The battery monitor loop.
//!
//! Each tick reads the power state, classifies it into a [`LevelBand`] and
//! drives the display:
//!
//! - Warn bands are edge-triggered: dim + quick flash once per entry.
//! - Critical is level-triggered: every tick flashes for the whole poll window.
//! - Returning to Normal restores the brightness captured when the excursion began.
//!
//! Collaborator failures never end the loop. They are logged through a
//! [`LogThrottle`] and the tick is retried on the next poll.

use serde::Serialize;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::display::DisplayController;
use crate::error::{ErrorClass, MonitorError, Result};
use crate::flash::FlashPattern;
use crate::level::{classify, LevelBand};
use crate::overrides::{OverrideSource, Overrides, ProcessEnv};
use crate::pacer::Pacer;
use crate::power::{PowerReader, PowerReading};
use crate::throttle::LogThrottle;

const POWER_SOURCE: &str = "power";
const DISPLAY_READ: &str = "display.read";
const DISPLAY_WRITE: &str = "display.write";
/// Assumed brightness when leaving Normal with nothing read or written yet.
const FALLBACK_BRIGHTNESS: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorState {
    pub level: LevelBand,
    /// Brightness captured when the state left Normal.
    pub original_brightness: Option<f64>,
    pub on_battery: bool,
    pub battery_percent: u8,
    pub flashing: bool,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self {
            level: LevelBand::Normal,
            original_brightness: None,
            on_battery: false,
            battery_percent: 100,
            flashing: false,
        }
    }
}

impl MonitorState {
    pub fn check_invariants(&self) -> Result<()> {
        if self.original_brightness.is_some() != (self.level != LevelBand::Normal) {
            return Err(MonitorError::Invariant(format!(
                "original brightness {:?} inconsistent with level {}",
                self.original_brightness, self.level
            )));
        }
        if self.flashing && !(self.level == LevelBand::Critical && self.on_battery) {
            return Err(MonitorError::Invariant(format!(
                "flashing while level {} on_battery={}",
                self.level, self.on_battery
            )));
        }
        Ok(())
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    /// The reading could not be taken; no state changed.
    pub skipped: bool,
    pub previous: Option<LevelBand>,
    pub level: Option<LevelBand>,
    /// Warn band entry action ran (brightness set + quick flash).
    pub warned: bool,
    /// Critical flashing ran and used up the poll window.
    pub window_consumed: bool,
    pub restored: bool,
    pub cutoff_fired: bool,
}

pub struct Monitor<R, D, P> {
    reader: R,
    display: D,
    pacer: P,
    overrides: Box<dyn OverrideSource>,
    config: MonitorConfig,
    state: MonitorState,
    last_known_brightness: Option<f64>,
    /// Brightness a failed dim or flash should have left behind.
    pending_target: Option<f64>,
    cutoff_armed: bool,
    last_reading: Option<PowerReading>,
    throttle: LogThrottle,
    reported_invalid: HashSet<String>,
}

impl<R, D, P> Monitor<R, D, P>
where
    R: PowerReader,
    D: DisplayController,
    P: Pacer,
{
    pub fn new(reader: R, display: D, pacer: P, config: MonitorConfig) -> Self {
        let throttle = LogThrottle::new(config.warn_interval());
        Self {
            reader,
            display,
            pacer,
            overrides: Box::new(ProcessEnv),
            config,
            state: MonitorState::default(),
            last_known_brightness: None,
            pending_target: None,
            cutoff_armed: true,
            last_reading: None,
            throttle,
            reported_invalid: HashSet::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: Box<dyn OverrideSource>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    pub fn pacer_mut(&mut self) -> &mut P {
        &mut self.pacer
    }

    pub fn set_overrides(&mut self, overrides: Box<dyn OverrideSource>) {
        self.overrides = overrides;
    }

    /// Polls until a stop is requested, then restores brightness.
    ///
    /// Only an invariant violation ends the loop early; it is returned after a
    /// best-effort restore.
    pub fn run(&mut self) -> Result<()> {
        info!(
            poll_interval_secs = self.config.poll_interval_secs,
            reader = self.reader.name(),
            display = self.display.name(),
            "Battery monitor started"
        );

        let outcome = loop {
            if self.pacer.stop_requested() {
                break Ok(());
            }
            let report = match self.tick() {
                Ok(report) => report,
                Err(err) => break Err(err),
            };
            if report.window_consumed {
                continue;
            }
            if !self.pacer.pause(self.config.poll_interval()) {
                break Ok(());
            }
        };

        info!("Stopping battery monitor");
        self.shutdown();
        outcome
    }

    /// One poll: read, classify, act.
    pub fn tick(&mut self) -> Result<TickReport> {
        let overrides = Overrides::read(self.overrides.as_ref());
        self.report_invalid_overrides(&overrides);

        let reader = &self.reader;
        let reading = match overrides.apply(|| reader.read()) {
            Ok(reading) => reading,
            Err(err) => {
                self.log_failure(POWER_SOURCE, &err);
                return Ok(TickReport {
                    skipped: true,
                    ..TickReport::default()
                });
            }
        };
        if self.throttle.clear_source(POWER_SOURCE) {
            info!("Battery readings recovered");
        }
        self.record_reading(reading);

        let previous = self.state.level;
        let next = classify(reading.on_battery(), reading.percent);
        let mut report = TickReport {
            previous: Some(previous),
            ..TickReport::default()
        };
        self.apply_transition(previous, next, &mut report)?;
        if !report.warned && !report.restored && self.state.level != LevelBand::Critical {
            self.retry_pending_target();
        }

        // Only a display left alone by the battery path can cross the cutoff.
        if let Some(cutoff) = overrides.brightness_cutoff.or(self.config.brightness_cutoff) {
            if self.state.level == LevelBand::Normal && !report.restored {
                report.cutoff_fired = self.check_brightness_cutoff(cutoff);
            }
        }

        report.level = Some(self.state.level);
        if let Err(err) = self.state.check_invariants() {
            error!(error = %err, state = ?self.state, "Monitor state corrupted");
            return Err(err);
        }
        Ok(report)
    }

    /// Restores the captured brightness, if any. Called on clean shutdown.
    pub fn shutdown(&mut self) {
        self.state.flashing = false;
        let Some(original) = self.state.original_brightness else {
            return;
        };
        info!(brightness = original, "Restoring original brightness");
        match self.display.set_brightness(original) {
            Ok(()) => {
                self.last_known_brightness = Some(original);
                self.state.original_brightness = None;
                self.state.level = LevelBand::Normal;
            }
            Err(err) => warn!(error = %err, "Failed to restore brightness on shutdown"),
        }
    }

    fn apply_transition(&mut self, previous: LevelBand, next: LevelBand, report: &mut TickReport) -> Result<()> {
        if previous == next {
            if next == LevelBand::Critical {
                self.state.flashing = true;
                report.window_consumed = self.flash_critical();
            }
            return Ok(());
        }

        if next == LevelBand::Normal {
            report.restored = self.restore(previous)?;
            return Ok(());
        }

        if previous == LevelBand::Normal {
            let original = self.read_brightness().unwrap_or_else(|| {
                if self.throttle.check(DISPLAY_READ, "capture", Instant::now()).is_some() {
                    warn!(
                        level = %next,
                        assumed = FALLBACK_BRIGHTNESS,
                        "Brightness unreadable; assuming default for restore"
                    );
                }
                FALLBACK_BRIGHTNESS
            });
            self.state.original_brightness = Some(original);
        }

        self.state.level = next;
        match next {
            LevelBand::Critical => {
                warn!(
                    percent = self.state.battery_percent,
                    "CRITICAL: battery nearly empty, flashing screen"
                );
                self.state.flashing = true;
                report.window_consumed = self.flash_critical();
            }
            band => {
                self.state.flashing = false;
                if let Some(target) = band.dim_target(&self.config.levels) {
                    warn!(
                        percent = self.state.battery_percent,
                        level = %band,
                        brightness = target,
                        "Low battery: dimming + flash alert"
                    );
                    self.dim_and_flash(target);
                    report.warned = true;
                }
            }
        }
        Ok(())
    }

    /// Returns `Ok(false)` if the display refused the write; the level is kept so
    /// the next tick retries.
    fn restore(&mut self, previous: LevelBand) -> Result<bool> {
        let Some(original) = self.state.original_brightness else {
            let err = MonitorError::Invariant(format!(
                "leaving {} without a captured brightness",
                previous
            ));
            error!(error = %err, state = ?self.state, "Monitor state corrupted");
            return Err(err);
        };
        self.state.flashing = false;

        let reason = if self.state.on_battery {
            "Battery level recovered, restoring brightness"
        } else {
            "Device plugged in, restoring brightness"
        };
        match self.display.set_brightness(original) {
            Ok(()) => {
                info!(percent = self.state.battery_percent, brightness = original, "{}", reason);
                self.last_known_brightness = Some(original);
                self.finish_restore();
                Ok(true)
            }
            // No display to restore; the excursion is over all the same.
            Err(err @ MonitorError::BackendUnavailable(_)) => {
                self.log_failure(DISPLAY_WRITE, &err);
                info!(percent = self.state.battery_percent, "{}", reason);
                self.finish_restore();
                Ok(true)
            }
            Err(err) => {
                self.log_failure(DISPLAY_WRITE, &err);
                Ok(false)
            }
        }
    }

    fn finish_restore(&mut self) {
        self.state.original_brightness = None;
        self.state.level = LevelBand::Normal;
        self.pending_target = None;
    }

    fn flash_critical(&mut self) -> bool {
        let target = self
            .read_brightness()
            .or(self.state.original_brightness)
            .unwrap_or(1.0);
        let pattern = FlashPattern::continuous(&self.config.flash, target, self.config.poll_interval());
        debug!(
            percent = self.state.battery_percent,
            pulses = pattern.pulses,
            target,
            "Critical flash window"
        );
        match self.display.flash(&pattern, &mut self.pacer) {
            Ok(report) => {
                self.last_known_brightness = Some(target);
                self.pending_target = None;
                if report.interrupted {
                    debug!(pulses = report.pulses_completed, "Critical flash interrupted");
                }
                true
            }
            Err(err) => {
                self.log_failure(DISPLAY_WRITE, &err);
                false
            }
        }
    }

    fn dim_and_flash(&mut self, target: f64) {
        let dimmed = self.write_brightness(target);
        let pattern = FlashPattern::quick(&self.config.flash, target);
        self.pending_target = match self.display.flash(&pattern, &mut self.pacer) {
            // a completed pulse rewrote the target even if the dim failed
            Ok(report) if dimmed || report.pulses_completed > 0 => None,
            Ok(_) => Some(target),
            Err(err) => {
                self.log_failure(DISPLAY_WRITE, &err);
                Some(target)
            }
        };
    }

    /// Re-sends the brightness a failed dim or flash was meant to leave.
    fn retry_pending_target(&mut self) {
        let Some(target) = self.pending_target else {
            return;
        };
        if self.write_brightness(target) {
            debug!(brightness = target, "Pending brightness applied");
            self.pending_target = None;
        }
    }

    fn write_brightness(&mut self, target: f64) -> bool {
        match self.display.set_brightness(target) {
            Ok(()) => {
                self.last_known_brightness = Some(target);
                if self.throttle.clear_source(DISPLAY_WRITE) {
                    info!("Brightness control recovered");
                }
                true
            }
            Err(err) => {
                self.log_failure(DISPLAY_WRITE, &err);
                false
            }
        }
    }

    /// Fires the Warn3 action once per crossing at or below `cutoff`. Never touches
    /// the battery bookkeeping.
    fn check_brightness_cutoff(&mut self, cutoff: f64) -> bool {
        let current = match self.display.brightness() {
            Ok(value) => {
                self.last_known_brightness = Some(value);
                value
            }
            Err(err) => {
                self.log_failure(DISPLAY_READ, &err);
                return false;
            }
        };

        if current > cutoff {
            self.cutoff_armed = true;
            return false;
        }
        if !self.cutoff_armed {
            return false;
        }

        self.cutoff_armed = false;
        warn!(
            brightness = current,
            cutoff,
            "Brightness at or below cutoff, running 3% alert"
        );
        self.dim_and_flash(self.config.levels.warn3);
        true
    }

    /// Current brightness, falling back to the last value seen or written.
    fn read_brightness(&mut self) -> Option<f64> {
        match self.display.brightness() {
            Ok(value) => {
                if self.throttle.clear_source(DISPLAY_READ) {
                    info!("Brightness readings recovered");
                }
                self.last_known_brightness = Some(value);
                Some(value)
            }
            Err(err) => {
                self.log_failure(DISPLAY_READ, &err);
                self.last_known_brightness
            }
        }
    }

    fn record_reading(&mut self, reading: PowerReading) {
        self.state.on_battery = reading.on_battery();
        self.state.battery_percent = reading.percent;
        if self.last_reading != Some(reading) {
            info!(
                percent = reading.percent,
                source = reading.source.as_str(),
                "Battery: {}% ({})",
                reading.percent,
                reading.source.as_str()
            );
            self.last_reading = Some(reading);
        }
    }

    fn report_invalid_overrides(&mut self, overrides: &Overrides) {
        for invalid in &overrides.invalid {
            if self.reported_invalid.insert(format!("{}={}", invalid.key, invalid.raw)) {
                warn!(
                    key = invalid.key,
                    value = %invalid.raw,
                    expected = invalid.expected,
                    "Invalid test override ignored"
                );
            }
        }
    }

    fn log_failure(&mut self, source: &'static str, err: &MonitorError) {
        let Some(suppressed) = self.throttle.check(source, err.throttle_key(), Instant::now()) else {
            return;
        };
        match err.class() {
            ErrorClass::Unavailable => warn!(
                source,
                error = %err,
                suppressed,
                "Collaborator unavailable; continuing without it"
            ),
            ErrorClass::Transient | ErrorClass::Invariant => warn!(
                source,
                error = %err,
                suppressed,
                "Collaborator call failed; retrying next poll"
            ),
        }
    }
}
