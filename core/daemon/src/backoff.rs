//! Crash-loop protection.
//!
//! The supervisor relaunches the daemon whenever it exits. Each launch is
//! recorded with whether it ended cleanly; only launches that died inside the
//! window count against the next start. A clean stop (SIGINT/SIGTERM) does not.

use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const WINDOW_SECS: i64 = 120;
const MAX_QUICK_CRASHES: usize = 3;
const DELAY_STEP_SECS: u64 = 10;
const DELAY_MAX_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Launch {
    started_at: DateTime<Utc>,
    #[serde(default)]
    clean_exit: bool,
}

#[derive(Debug)]
pub struct LaunchLog {
    path: PathBuf,
    launches: Vec<Launch>,
}

impl LaunchLog {
    pub fn open(path: &Path) -> Self {
        let launches = match load_launches(path) {
            Ok(launches) => launches,
            Err(err) => {
                debug!(error = %err, "Starting with empty launch log");
                Vec::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            launches,
        }
    }

    /// Records this launch and returns how long to hold off before touching
    /// the display, if the daemon has been dying right after start.
    pub fn begin(&mut self, now: DateTime<Utc>) -> Option<Duration> {
        self.launches
            .retain(|launch| now.signed_duration_since(launch.started_at).num_seconds() <= WINDOW_SECS);
        let recent_crashes = self.launches.iter().filter(|launch| !launch.clean_exit).count();
        self.launches.push(Launch {
            started_at: now,
            clean_exit: false,
        });
        self.persist();

        let delay = restart_delay(recent_crashes + 1);
        if let Some(delay) = delay {
            warn!(
                recent_crashes,
                delay_secs = delay.as_secs(),
                "Repeated restarts detected, delaying startup"
            );
        }
        delay
    }

    /// Marks the current launch as a clean stop so the next start is not delayed for it.
    pub fn finish_clean(&mut self) {
        if let Some(current) = self.launches.last_mut() {
            current.clean_exit = true;
            self.persist();
        }
    }

    fn persist(&self) {
        if let Err(err) = save_launches(&self.path, &self.launches) {
            warn!(error = %err, "Failed to persist launch log");
        }
    }
}

/// Delay for the `crashes`-th unclean start within the window.
fn restart_delay(crashes: usize) -> Option<Duration> {
    let extra = crashes.checked_sub(MAX_QUICK_CRASHES).filter(|extra| *extra > 0)?;
    let secs = DELAY_STEP_SECS.saturating_mul(extra as u64).min(DELAY_MAX_SECS);
    Some(Duration::from_secs(secs))
}

fn load_launches(path: &Path) -> Result<Vec<Launch>, String> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(format!("Failed to read launch log: {}", err)),
    };
    serde_json::from_slice(&data).map_err(|err| format!("Failed to parse launch log: {}", err))
}

fn save_launches(path: &Path, launches: &[Launch]) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| format!("Failed to create state dir: {}", err))?;
    }
    let payload =
        serde_json::to_vec_pretty(launches).map_err(|err| format!("Failed to serialize launch log: {}", err))?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, payload).map_err(|err| format!("Failed to write launch log: {}", err))?;
    fs::rename(&tmp_path, path).map_err(|err| format!("Failed to commit launch log: {}", err))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn log_in(dir: &TempDir) -> LaunchLog {
        LaunchLog::open(&dir.path().join("state").join("daemon-backoff.json"))
    }

    #[test]
    fn delay_grows_per_crash_and_caps() {
        assert_eq!(restart_delay(1), None);
        assert_eq!(restart_delay(3), None);
        assert_eq!(restart_delay(4), Some(Duration::from_secs(DELAY_STEP_SECS)));
        assert_eq!(restart_delay(5), Some(Duration::from_secs(2 * DELAY_STEP_SECS)));
        assert_eq!(restart_delay(40), Some(Duration::from_secs(DELAY_MAX_SECS)));
    }

    #[test]
    fn fourth_quick_crash_is_delayed() {
        let dir = tempfile::tempdir().expect("temp dir");
        let now = Utc::now();
        let mut log = log_in(&dir);
        for secs in [30, 20, 10] {
            assert_eq!(log.begin(now - ChronoDuration::seconds(secs)), None);
        }
        assert_eq!(log.begin(now), Some(Duration::from_secs(DELAY_STEP_SECS)));
    }

    #[test]
    fn clean_stops_do_not_count() {
        let dir = tempfile::tempdir().expect("temp dir");
        let now = Utc::now();
        let mut log = log_in(&dir);
        for secs in [40, 30, 20, 10] {
            log.begin(now - ChronoDuration::seconds(secs));
            log.finish_clean();
        }
        assert_eq!(log.begin(now), None);
    }

    #[test]
    fn stale_launches_fall_out_of_window() {
        let dir = tempfile::tempdir().expect("temp dir");
        let now = Utc::now();
        let mut log = log_in(&dir);
        for secs in [WINDOW_SECS + 30, WINDOW_SECS + 20, WINDOW_SECS + 10, WINDOW_SECS + 5] {
            log.begin(now - ChronoDuration::seconds(secs));
        }
        assert_eq!(log.begin(now), None);
        assert_eq!(log.launches.len(), 1);
    }

    #[test]
    fn log_survives_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let now = Utc::now();
        {
            let mut log = log_in(&dir);
            log.begin(now - ChronoDuration::seconds(5));
            log.finish_clean();
        }

        let reopened = log_in(&dir);
        assert_eq!(
            reopened.launches,
            vec![Launch {
                started_at: now - ChronoDuration::seconds(5),
                clean_exit: true,
            }]
        );
        assert!(!dir.path().join("state").join("daemon-backoff.tmp").exists());
    }
}
