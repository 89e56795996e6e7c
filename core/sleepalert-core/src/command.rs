//! Bounded external command execution.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{MonitorError, Result};

const POLL_SLICE_MS: u64 = 10;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout and stderr joined, trimmed. Some tools print their listing on stderr.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr).trim().to_string()
    }
}

/// Runs `program` with `args`, killing it if it outlives `timeout`.
pub fn run_with_timeout(program: &Path, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
    let label = describe(program, args);
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => {
                MonitorError::BackendUnavailable(format!("{} not found", program.display()))
            }
            _ => MonitorError::from_io(label.clone(), err),
        })?;

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(MonitorError::CommandTimedOut {
                    command: label,
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            Ok(None) => thread::sleep(Duration::from_millis(POLL_SLICE_MS)),
            Err(err) => return Err(MonitorError::from_io(label, err)),
        }
    };

    let mut stdout = String::new();
    let mut stderr = String::new();
    if let Some(mut pipe) = child.stdout.take() {
        let _ = pipe.read_to_string(&mut stdout);
    }
    if let Some(mut pipe) = child.stderr.take() {
        let _ = pipe.read_to_string(&mut stderr);
    }

    Ok(CommandOutput {
        success: status.success(),
        code: status.code(),
        stdout,
        stderr,
    })
}

/// Like [`run_with_timeout`] but turns a non-zero exit into `CommandFailed`.
pub fn run_checked(program: &Path, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
    let output = run_with_timeout(program, args, timeout)?;
    if output.success {
        return Ok(output);
    }
    let combined = output.combined();
    let details = if combined.is_empty() {
        match output.code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    } else {
        combined
    };
    Err(MonitorError::CommandFailed {
        command: describe(program, args),
        details,
    })
}

fn describe(program: &Path, args: &[&str]) -> String {
    let mut label = program.display().to_string();
    for arg in args {
        label.push(' ');
        label.push_str(arg);
    }
    label
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_of_successful_command() {
        let output = run_checked(Path::new("/bin/sh"), &["-c", "echo 42%"], Duration::from_secs(2))
            .expect("run sh");
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "42%");
    }

    #[test]
    fn non_zero_exit_is_command_failed() {
        let err = run_checked(
            Path::new("/bin/sh"),
            &["-c", "echo nope >&2; exit 3"],
            Duration::from_secs(2),
        )
        .expect_err("failing command");
        match err {
            MonitorError::CommandFailed { details, .. } => assert_eq!(details, "nope"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_program_is_unavailable() {
        let err = run_with_timeout(
            Path::new("/nonexistent/sleepalert-tool"),
            &[],
            Duration::from_secs(1),
        )
        .expect_err("missing program");
        assert!(matches!(err, MonitorError::BackendUnavailable(_)));
    }

    #[test]
    fn slow_command_times_out() {
        let err = run_with_timeout(Path::new("/bin/sh"), &["-c", "sleep 5"], Duration::from_millis(100))
            .expect_err("timeout");
        assert!(matches!(err, MonitorError::CommandTimedOut { timeout_ms: 100, .. }));
    }
}
