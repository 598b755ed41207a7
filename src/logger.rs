//! Stderr logger for the `log` facade.
//!
//! The management commands talk to the operator through log records: `info`
//! lines are printed bare, warnings and errors carry a coloured prefix, and
//! debug/trace lines are dimmed and tagged with their module. Records from
//! other crates (reqwest, hyper) are dropped unless they are warnings or worse.
//!
//! The logger is installed once by [`init`] and drained by [`flush`] before the
//! process exits.

use console::style;
use log::{LevelFilter, Log, Metadata, Record};
use std::io::Write;

struct Logger;

static LOGGER: Logger = Logger;

/// Installs the logger with the given verbosity. Calling it twice only updates the level.
pub fn init(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_err() {
        trace!("logger already installed");
    }
    log::set_max_level(level);
}

pub fn flush() {
    log::logger().flush();
}

/// Log levels accepted by `--log-level`, named the way the MCP server runtime names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, strum::Display)]
#[value(rename_all = "UPPER")]
#[strum(serialize_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warning => LevelFilter::Warn,
            LogLevel::Error | LogLevel::Critical => LevelFilter::Error,
        }
    }

    /// Spelling expected by the runtime's `--log-level` flag
    pub fn runtime_arg(&self) -> String {
        self.to_string().to_lowercase()
    }
}

impl Logger {
    fn is_ours(metadata: &Metadata) -> bool {
        metadata.target().starts_with("qgmcp")
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
            && (Self::is_ours(metadata) || metadata.level() <= log::Level::Warn)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = match record.level() {
            log::Level::Error => format!("{} {}", style("ERROR").red().bold(), record.args()),
            log::Level::Warn => format!("{} {}", style("WARN").yellow().bold(), record.args()),
            log::Level::Info => record.args().to_string(),
            log::Level::Debug | log::Level::Trace => style(format!(
                "{} {} {}",
                record.level(),
                record.target(),
                record.args()
            ))
            .dim()
            .to_string(),
        };
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
