//! SleepAlert daemon entrypoint.
//!
//! Runs the battery monitor until SIGINT/SIGTERM. Meant to be launched at login
//! by a supervisor (launchd, systemd --user) that restarts it if it exits.

use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};

use sleepalert_core::{
    load_config, open_display, open_reader, DisplayController, Monitor, MonitorConfig, Overrides, ProcessEnv,
    Pacer, SleepPacer, StopFlag, UnavailableDisplay,
};

use crate::backoff::LaunchLog;

mod backoff;
mod logging;
mod signals;

const STATE_DIR_NAME: &str = ".sleepalert";

#[derive(Parser)]
#[command(name = "sleepalert-daemon")]
#[command(about = "Dims and flashes the screen when the battery is about to run out")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.sleepalert/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Seconds between battery polls, overriding the config file
    #[arg(long, value_name = "SECS")]
    poll_interval_secs: Option<u64>,

    /// Directory for status.log and error.log (default: ~/.sleepalert/logs)
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Also log to stderr
    #[arg(long)]
    foreground: bool,

    /// Skip the crash-loop startup delay
    #[arg(long)]
    no_backoff: bool,
}

fn main() {
    let cli = Cli::parse();
    let log_dir = cli.log_dir.clone().or_else(|| state_dir().ok().map(|dir| dir.join("logs")));
    let logging_guard = logging::init(log_dir.as_deref(), cli.foreground);

    let stop = StopFlag::new();
    if let Err(err) = signals::install(&stop) {
        warn!(error = %err, "Signal handlers not installed; brightness will not be restored on stop");
    }

    let mut launches = if cli.no_backoff {
        None
    } else {
        match state_dir() {
            Ok(dir) => Some(LaunchLog::open(&dir.join("daemon-backoff.json"))),
            Err(err) => {
                warn!(error = %err, "Failed to resolve launch log path");
                None
            }
        }
    };
    if let Some(delay) = launches.as_mut().and_then(|log| log.begin(Utc::now())) {
        if !SleepPacer::new(stop.clone()).pause(delay) {
            info!("Stopped during startup delay");
            if let Some(log) = launches.as_mut() {
                log.finish_clean();
            }
            return;
        }
    }

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load config; using defaults");
            MonitorConfig::default()
        }
    };
    if let Some(secs) = cli.poll_interval_secs {
        config.poll_interval_secs = secs;
        config = config.sanitized();
    }

    for line in Overrides::read(&ProcessEnv).describe() {
        info!("{}", line);
    }

    let reader = open_reader(config.power.backend);
    let display: Box<dyn DisplayController> = match open_display(config.display.backend) {
        Ok(display) => {
            let backend = display.name();
            info!(backend, "Brightness backend selected");
            display
        }
        Err(err) => {
            warn!(
                error = %err,
                "Brightness control unavailable; alerts will be logged but not shown"
            );
            Box::new(UnavailableDisplay::new(err.to_string()))
        }
    };

    let mut monitor = Monitor::new(reader, display, SleepPacer::new(stop), config);
    match monitor.run() {
        Ok(()) => {
            if let Some(log) = launches.as_mut() {
                log.finish_clean();
            }
        }
        Err(err) => {
            error!(error = %err, "Battery monitor stopped on internal error");
            drop(logging_guard);
            std::process::exit(1);
        }
    }
}

fn state_dir() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
    Ok(home.join(STATE_DIR_NAME))
}
