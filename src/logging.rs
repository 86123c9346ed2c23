// Logging setup shared by both binaries: every message goes to the
// terminal and is appended to a local log file.

use anyhow::{Context, Result};
use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, ConfigBuilder, TermLogger, TerminalMode, WriteLogger};
use std::fs::OpenOptions;
use std::path::Path;

/// Default log file, relative to the working directory.
pub const LOG_FILE_PATH: &str = "./debug.log";

/// Keeps the process logger alive for the run; flushes it when dropped.
#[derive(Debug)]
#[must_use = "dropping the guard flushes the log; hold it until the run ends"]
pub struct LogGuard {
    _private: (),
}

impl LogGuard {
    pub fn flush(&self) {
        log::logger().flush();
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Install the console + file logger. Call once, at process start.
pub fn init(log_file: &Path, verbose: bool) -> Result<LogGuard> {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file {}", log_file.display()))?;

    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .build();

    CombinedLogger::init(vec![
        TermLogger::new(level, config.clone(), TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(level, config, file),
    ])
    .context("Failed to initialize logger")?;

    Ok(LogGuard { _private: () })
}

/// Log a run's failure, once, with its full context chain and return
/// the process exit status for it.
pub fn report(result: Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            log::error!("{:#}", err);
            1
        }
    }
}
