//! Deterministic collaborator doubles for tests.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use crate::display::DisplayController;
use crate::error::{MonitorError, Result};
use crate::pacer::Pacer;
use crate::power::{PowerReader, PowerReading, PowerSource};

/// Replays scripted readings; the last one repeats once the script runs out.
#[derive(Debug, Default)]
pub struct FakeReader {
    script: RefCell<VecDeque<Option<PowerReading>>>,
    last: RefCell<Option<PowerReading>>,
    reads: RefCell<u32>,
}

impl FakeReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_battery(percents: &[u8]) -> Self {
        let reader = Self::new();
        for percent in percents {
            reader.push(PowerSource::OnBattery, *percent);
        }
        reader
    }

    pub fn push(&self, source: PowerSource, percent: u8) {
        self.script
            .borrow_mut()
            .push_back(Some(PowerReading { source, percent }));
    }

    /// Queues a failed read.
    pub fn push_failure(&self) {
        self.script.borrow_mut().push_back(None);
    }

    pub fn reads(&self) -> u32 {
        *self.reads.borrow()
    }
}

impl PowerReader for FakeReader {
    fn name(&self) -> &str {
        "fake"
    }

    fn power_source(&self) -> Result<PowerSource> {
        self.read().map(|reading| reading.source)
    }

    fn battery_percent(&self) -> Result<u8> {
        self.read().map(|reading| reading.percent)
    }

    fn read(&self) -> Result<PowerReading> {
        *self.reads.borrow_mut() += 1;
        let next = self.script.borrow_mut().pop_front();
        match next {
            Some(Some(reading)) => {
                *self.last.borrow_mut() = Some(reading);
                Ok(reading)
            }
            Some(None) => Err(MonitorError::CommandFailed {
                command: "fake".to_string(),
                details: "scripted failure".to_string(),
            }),
            None => self.last.borrow().ok_or_else(|| MonitorError::CommandFailed {
                command: "fake".to_string(),
                details: "no scripted reading".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisplayCall {
    Get,
    Set(f64),
}

#[derive(Debug)]
pub struct FakeDisplay {
    current: f64,
    calls: Vec<DisplayCall>,
    fail_reads: bool,
    fail_writes: bool,
    deny_writes: bool,
    failing_sets: HashSet<usize>,
    set_count: usize,
}

impl FakeDisplay {
    pub fn new(current: f64) -> Self {
        Self {
            current,
            calls: Vec::new(),
            fail_reads: false,
            fail_writes: false,
            deny_writes: false,
            failing_sets: HashSet::new(),
            set_count: 0,
        }
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    /// Simulates the user moving the brightness slider.
    pub fn set_current(&mut self, value: f64) {
        self.current = value;
    }

    pub fn calls(&self) -> &[DisplayCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn sets(&self) -> Vec<f64> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                DisplayCall::Set(value) => Some(*value),
                DisplayCall::Get => None,
            })
            .collect()
    }

    pub fn fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn deny_writes(&mut self, deny: bool) {
        self.deny_writes = deny;
    }

    /// Fails only the listed `set_brightness` calls, counted from 1 over the
    /// display's lifetime.
    pub fn fail_set_calls(&mut self, calls: &[usize]) {
        self.failing_sets = calls.iter().copied().collect();
    }
}

impl DisplayController for FakeDisplay {
    fn name(&self) -> &str {
        "fake"
    }

    fn brightness(&mut self) -> Result<f64> {
        self.calls.push(DisplayCall::Get);
        if self.fail_reads {
            return Err(MonitorError::CommandFailed {
                command: "brightness -l".to_string(),
                details: "scripted failure".to_string(),
            });
        }
        Ok(self.current)
    }

    fn set_brightness(&mut self, level: f64) -> Result<()> {
        self.calls.push(DisplayCall::Set(level));
        self.set_count += 1;
        if self.failing_sets.contains(&self.set_count) {
            return Err(MonitorError::CommandFailed {
                command: "brightness".to_string(),
                details: format!("scripted failure on write {}", self.set_count),
            });
        }
        if self.deny_writes {
            return Err(MonitorError::PermissionDenied {
                resource: "display".to_string(),
            });
        }
        if self.fail_writes {
            return Err(MonitorError::CommandFailed {
                command: "brightness".to_string(),
                details: "scripted failure".to_string(),
            });
        }
        self.current = level;
        Ok(())
    }
}

/// Records pauses without sleeping. Optionally reports a stop on the n-th pause.
#[derive(Debug, Default)]
pub struct InstantPacer {
    pauses: Vec<Duration>,
    stop_on_pause: Option<usize>,
    stopped: bool,
}

impl InstantPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `n`-th pause (1-based) returns `false` and every later check sees a stop.
    pub fn stop_on_pause(mut self, n: usize) -> Self {
        self.stop_on_pause = Some(n);
        self
    }

    pub fn pauses(&self) -> &[Duration] {
        &self.pauses
    }

    pub fn total_paused(&self) -> Duration {
        self.pauses.iter().sum()
    }

    pub fn request_stop(&mut self) {
        self.stopped = true;
    }
}

impl Pacer for InstantPacer {
    fn pause(&mut self, duration: Duration) -> bool {
        if self.stopped {
            return false;
        }
        self.pauses.push(duration);
        if self.stop_on_pause == Some(self.pauses.len()) {
            self.stopped = true;
            return false;
        }
        true
    }

    fn stop_requested(&self) -> bool {
        self.stopped
    }
}
