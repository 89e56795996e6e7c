//! sleepalert-core: low-battery visual alerts.
//!
//! Watches the power source and battery charge and drives the display to warn
//! before the machine shuts down:
//!
//! - 5%, 4%, 3% on battery: dim to 80/60/40% with a quick flash on entry
//! - 2% and below: continuous flashing until power returns or charge recovers
//! - plugged in or above 5%: restore the brightness from before the alerts
//!
//! The [`monitor::Monitor`] owns all state. Hardware access goes through the
//! [`power::PowerReader`] and [`display::DisplayController`] traits so tests can
//! substitute deterministic doubles.

pub mod command;
pub mod config;
pub mod display;
pub mod error;
pub mod flash;
pub mod level;
pub mod monitor;
pub mod overrides;
pub mod pacer;
pub mod power;
pub mod throttle;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use config::{load_config, MonitorConfig};
pub use display::{open_display, DisplayController, UnavailableDisplay};
pub use error::{ErrorClass, MonitorError, Result};
pub use level::{classify, LevelBand};
pub use monitor::{Monitor, MonitorState, TickReport};
pub use overrides::{OverrideSource, Overrides, ProcessEnv};
pub use pacer::{Pacer, SleepPacer, StopFlag};
pub use power::{open_reader, PowerReader, PowerReading, PowerSource};
