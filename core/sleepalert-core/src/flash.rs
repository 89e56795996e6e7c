//! Flash sequences: a bounded quick flash and the Critical continuous flash.

use std::time::Duration;

use crate::config::{clamp_unit, FlashConfig};
use crate::display::DisplayController;
use crate::error::{MonitorError, Result};
use crate::pacer::Pacer;

#[derive(Debug, Clone, PartialEq)]
pub struct FlashPattern {
    /// Brightness for the dark half of each pulse.
    pub low: f64,
    /// Brightness restored after each pulse; the display ends here.
    pub target: f64,
    pub half_period: Duration,
    pub pulses: u32,
}

impl FlashPattern {
    pub fn quick(config: &FlashConfig, target: f64) -> Self {
        Self {
            low: clamp_unit(config.low_level),
            target: clamp_unit(target),
            half_period: Duration::from_millis(config.quick_pulse_ms),
            pulses: config.quick_pulses,
        }
    }

    /// Enough pulses to fill `window`, at least one.
    pub fn continuous(config: &FlashConfig, target: f64, window: Duration) -> Self {
        let half_period = Duration::from_millis(config.continuous_pulse_ms.max(1));
        let period_ms = half_period.as_millis().saturating_mul(2).max(1);
        let pulses = (window.as_millis() / period_ms).clamp(1, u32::MAX as u128) as u32;
        Self {
            low: clamp_unit(config.low_level),
            target: clamp_unit(target),
            half_period,
            pulses,
        }
    }

    pub fn duration(&self) -> Duration {
        self.half_period.saturating_mul(self.pulses.saturating_mul(2))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashReport {
    pub pulses_completed: u32,
    pub interrupted: bool,
}

/// Pulses `display` per `pattern`, always finishing on the target brightness.
///
/// A stop request observed at any pulse edge restores the target and returns
/// early with `interrupted` set. A failed brightness write aborts the sequence
/// after one more attempt to put the display back on the target.
pub fn run_pattern<D>(display: &mut D, pattern: &FlashPattern, pacer: &mut dyn Pacer) -> Result<FlashReport>
where
    D: DisplayController + ?Sized,
{
    let mut report = FlashReport {
        pulses_completed: 0,
        interrupted: false,
    };

    for _ in 0..pattern.pulses {
        if pacer.stop_requested() {
            report.interrupted = true;
            return Ok(report);
        }
        display
            .set_brightness(pattern.low)
            .map_err(|err| settle_on_target(display, pattern.target, err))?;
        let dark_held = pacer.pause(pattern.half_period);
        display
            .set_brightness(pattern.target)
            .map_err(|err| settle_on_target(display, pattern.target, err))?;
        if !dark_held {
            report.interrupted = true;
            return Ok(report);
        }
        report.pulses_completed += 1;
        if !pacer.pause(pattern.half_period) {
            report.interrupted = true;
            return Ok(report);
        }
    }

    Ok(report)
}

/// Best-effort write back to `target`; the first failure is the one reported.
fn settle_on_target<D>(display: &mut D, target: f64, err: MonitorError) -> MonitorError
where
    D: DisplayController + ?Sized,
{
    let _ = display.set_brightness(target);
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{DisplayCall, FakeDisplay, InstantPacer};

    #[test]
    fn quick_pattern_uses_config() {
        let pattern = FlashPattern::quick(&FlashConfig::default(), 0.6);
        assert_eq!(pattern.pulses, 2);
        assert_eq!(pattern.half_period, Duration::from_millis(150));
        assert_eq!(pattern.low, 0.0);
        assert_eq!(pattern.target, 0.6);
        assert_eq!(pattern.duration(), Duration::from_millis(600));
    }

    #[test]
    fn continuous_pattern_fills_window() {
        let pattern = FlashPattern::continuous(&FlashConfig::default(), 0.7, Duration::from_secs(10));
        assert_eq!(pattern.pulses, 16);
        assert!(pattern.duration() <= Duration::from_secs(10));

        let tiny = FlashPattern::continuous(&FlashConfig::default(), 0.7, Duration::from_millis(10));
        assert_eq!(tiny.pulses, 1);
    }

    #[test]
    fn quick_flash_alternates_low_and_target() {
        let mut display = FakeDisplay::new(0.8);
        let mut pacer = InstantPacer::new();
        let pattern = FlashPattern::quick(&FlashConfig::default(), 0.8);

        let report = run_pattern(&mut display, &pattern, &mut pacer).expect("flash");

        assert_eq!(report.pulses_completed, 2);
        assert!(!report.interrupted);
        assert_eq!(
            display.calls(),
            &[
                DisplayCall::Set(0.0),
                DisplayCall::Set(0.8),
                DisplayCall::Set(0.0),
                DisplayCall::Set(0.8),
            ]
        );
        assert_eq!(pacer.pauses().len(), 4);
    }

    #[test]
    fn stop_mid_pulse_restores_target() {
        let mut display = FakeDisplay::new(0.5);
        let mut pacer = InstantPacer::new().stop_on_pause(3);
        let pattern = FlashPattern::continuous(&FlashConfig::default(), 0.5, Duration::from_secs(10));

        let report = run_pattern(&mut display, &pattern, &mut pacer).expect("flash");

        assert!(report.interrupted);
        assert_eq!(report.pulses_completed, 1);
        assert_eq!(display.current(), 0.5);
        assert_eq!(display.calls().last(), Some(&DisplayCall::Set(0.5)));
    }

    #[test]
    fn write_failure_aborts_sequence() {
        let mut display = FakeDisplay::new(0.5);
        display.fail_writes(true);
        let mut pacer = InstantPacer::new();
        let pattern = FlashPattern::quick(&FlashConfig::default(), 0.5);

        assert!(run_pattern(&mut display, &pattern, &mut pacer).is_err());
        assert!(pacer.pauses().is_empty());
    }

    #[test]
    fn failed_restore_write_falls_back_to_target() {
        let mut display = FakeDisplay::new(0.8);
        display.fail_set_calls(&[2]);
        let mut pacer = InstantPacer::new();
        let pattern = FlashPattern::quick(&FlashConfig::default(), 0.8);

        assert!(run_pattern(&mut display, &pattern, &mut pacer).is_err());
        assert_eq!(
            display.calls(),
            &[DisplayCall::Set(0.0), DisplayCall::Set(0.8), DisplayCall::Set(0.8)]
        );
        assert_eq!(display.current(), 0.8);
    }
}
