//! Tracing subscriber setup
//!
//! Console output on stderr plus a daily file at
//! `<log_dir>/invoice_validator_<YYYYMMDD>.log`. `RUST_LOG` overrides the
//! level picked from the CLI verbosity. While a progress bar owns the
//! terminal the console only shows errors; the file keeps everything.

use crate::cli::Verbosity;
use crate::errors::{PipelineError, Result};
use chrono::Local;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log file for `date`, e.g. `invoice_validator_20240309.log`
pub fn log_file_name(date: chrono::NaiveDate) -> String {
    format!("invoice_validator_{}.log", date.format("%Y%m%d"))
}

/// Default filter directive for a verbosity level
pub fn default_directive(verbosity: Verbosity) -> &'static str {
    match verbosity {
        Verbosity::Quiet => "error",
        Verbosity::Normal => "info",
        Verbosity::Verbose => "invoice_validator=debug,info",
        Verbosity::VeryVerbose => "trace",
    }
}

/// Console directive; a live progress bar narrows it to errors
pub fn console_directive(verbosity: Verbosity, progress_bar: bool) -> &'static str {
    if progress_bar {
        "error"
    } else {
        default_directive(verbosity)
    }
}

fn env_filter_or(directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive))
}

/// Install the global subscriber; returns the log file path
pub fn init_logging(log_dir: &Path, verbosity: Verbosity, progress_bar: bool) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;
    let path = log_dir.join(log_file_name(Local::now().date_naive()));
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let console_filter = if progress_bar {
        EnvFilter::new(console_directive(verbosity, true))
    } else {
        env_filter_or(default_directive(verbosity))
    };

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .with_filter(env_filter_or(default_directive(verbosity)));

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| PipelineError::Generic(format!("Failed to initialise logging: {}", e)))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(log_file_name(date), "invoice_validator_20240309.log");
    }

    #[test]
    fn test_directives_parse() {
        for verbosity in [
            Verbosity::Quiet,
            Verbosity::Normal,
            Verbosity::Verbose,
            Verbosity::VeryVerbose,
        ] {
            assert!(EnvFilter::try_new(default_directive(verbosity)).is_ok());
        }
    }

    #[test]
    fn test_progress_bar_narrows_console() {
        assert_eq!(console_directive(Verbosity::Verbose, true), "error");
        assert_eq!(console_directive(Verbosity::Verbose, false), "invoice_validator=debug,info");
        assert_eq!(console_directive(Verbosity::Quiet, false), "error");
    }
}
