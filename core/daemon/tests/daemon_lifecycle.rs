use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct DaemonGuard {
    child: Child,
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn log_dir(home: &Path) -> PathBuf {
    home.join("logs")
}

fn write_config(home: &Path) -> PathBuf {
    let path = home.join("config.toml");
    fs_err::write(
        &path,
        r#"
poll_interval_secs = 1

[display]
backend = "disabled"
"#,
    )
    .expect("Failed to write config");
    path
}

fn spawn_daemon(home: &Path, env: &[(&str, &str)]) -> DaemonGuard {
    let config = write_config(home);
    let mut command = Command::new(env!("CARGO_BIN_EXE_sleepalert-daemon"));
    command
        .arg("--config")
        .arg(&config)
        .arg("--log-dir")
        .arg(log_dir(home))
        .arg("--no-backoff")
        .env("HOME", home)
        .env_remove("RUST_LOG")
        .env_remove("SLEEPALERT_TEST_BATTERY_LEVEL")
        .env_remove("SLEEPALERT_TEST_PLUGGED_IN")
        .env_remove("SLEEPALERT_TEST_BRIGHTNESS_CUTOFF")
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    for (key, value) in env {
        command.env(key, value);
    }
    DaemonGuard {
        child: command.spawn().expect("Failed to spawn sleepalert-daemon"),
    }
}

fn wait_for_log(path: &Path, needle: &str, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(content) = fs_err::read_to_string(path) {
            if content.contains(needle) {
                return;
            }
        }
        sleep(Duration::from_millis(25));
    }
    panic!("Timed out waiting for {:?} in {}", needle, path.display());
}

fn terminate(guard: &mut DaemonGuard, timeout: Duration) -> ExitStatus {
    // SAFETY: the pid belongs to a child we spawned and have not reaped yet.
    let rc = unsafe { libc::kill(guard.child.id() as libc::pid_t, libc::SIGTERM) };
    assert_eq!(rc, 0, "Failed to signal daemon");

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = guard.child.try_wait().expect("Failed to poll daemon") {
            return status;
        }
        assert!(Instant::now() < deadline, "Daemon did not exit after SIGTERM");
        sleep(Duration::from_millis(25));
    }
}

#[test]
fn daemon_logs_simulated_reading_and_stops_on_sigterm() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    let mut daemon = spawn_daemon(
        home.path(),
        &[
            ("SLEEPALERT_TEST_BATTERY_LEVEL", "50"),
            ("SLEEPALERT_TEST_PLUGGED_IN", "1"),
        ],
    );

    let status_log = log_dir(home.path()).join("status.log");
    wait_for_log(&status_log, "Battery: 50% (plugged in)", Duration::from_secs(5));

    let status = terminate(&mut daemon, Duration::from_secs(5));
    assert!(status.success(), "Daemon exited with {status:?}");

    let content = fs_err::read_to_string(&status_log).expect("Failed to read status log");
    assert!(content.contains("Test mode: simulating battery at 50% (plugged in)"));
    assert!(content.contains("Stopping battery monitor"));
}

#[test]
fn low_battery_without_display_goes_to_error_log() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    let mut daemon = spawn_daemon(home.path(), &[("SLEEPALERT_TEST_BATTERY_LEVEL", "4")]);

    let error_log = log_dir(home.path()).join("error.log");
    wait_for_log(&error_log, "Low battery: dimming + flash alert", Duration::from_secs(5));

    let status = terminate(&mut daemon, Duration::from_secs(5));
    assert!(status.success(), "Daemon exited with {status:?}");

    let errors = fs_err::read_to_string(&error_log).expect("Failed to read error log");
    assert!(errors.contains("level=warn4"));
    assert!(!errors.contains("Battery: 4%"), "info lines must stay out of error.log");
}
