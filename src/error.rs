//! Custom diagnostic error types for rich error reporting via miette.
//!
//! Fatal conditions of `qgmcp start` carry an error code and a remediation hint.
//! Conditions that only degrade a command (a process that already exited, a PID
//! that belongs to something else, an unreachable health endpoint) are not errors
//! here; they are modelled as outcomes by the modules that produce them, except
//! for [`HealthError`] which is carried inside the status report.

// False positive: fields are used in #[error] format strings and miette derive macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that abort `qgmcp start`.
#[derive(Debug, Error, Diagnostic)]
pub enum StartError {
    #[error("port {port} is already in use{}", owner_suffix(.owner))]
    #[diagnostic(code(qgmcp::start::port_unavailable))]
    PortUnavailable {
        host: String,
        port: u16,
        owner: Option<String>,
        #[help]
        advice: String,
    },

    #[error("--reload can only be used with --foreground")]
    #[diagnostic(
        code(qgmcp::start::reload_requires_foreground),
        help("hot reloading is for development; run: qgmcp start --foreground --reload")
    )]
    ReloadRequiresForeground,

    #[error("failed to save PID file: {}", path.display())]
    #[diagnostic(
        code(qgmcp::start::pid_persist_failed),
        help(
            "the server process was terminated because it could not be tracked.\nCheck that the run/ directory is writable and start again"
        )
    )]
    PidPersistFailure {
        path: PathBuf,
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn server runtime `{program}`")]
    #[diagnostic(
        code(qgmcp::start::spawn_failed),
        help(
            "make sure the runtime is installed, or set supervisor.runtime_command in config.yaml (or QGMCP_RUNTIME_COMMAND)"
        )
    )]
    SpawnFailed {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("runtime command is empty")]
    #[diagnostic(
        code(qgmcp::start::empty_runtime_command),
        help("supervisor.runtime_command must name at least the program to run")
    )]
    EmptyRuntimeCommand,
}

impl StartError {
    pub fn port_unavailable(host: &str, port: u16, owner: Option<String>) -> Self {
        Self::PortUnavailable {
            host: host.to_string(),
            port,
            owner,
            advice: port_advice(port),
        }
    }
}

fn owner_suffix(owner: &Option<String>) -> String {
    owner
        .as_ref()
        .map(|o| format!(" by {o}"))
        .unwrap_or_default()
}

fn format_timeout(timeout: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*timeout)
}

#[cfg(unix)]
fn port_advice(port: u16) -> String {
    format!(
        "Please stop the process using port {port} or use a different port with --port\nTo kill the process: lsof -ti :{port} | xargs kill -9"
    )
}

#[cfg(windows)]
fn port_advice(port: u16) -> String {
    format!(
        "Please stop the process using port {port} or use a different port with --port\nTo find the process: netstat -ano | findstr :{port}\nTo kill it: taskkill /F /PID <pid>"
    )
}

/// Errors related to the PID file.
#[derive(Debug, Error, Diagnostic)]
pub enum FileError {
    #[error("failed to write file: {}", path.display())]
    #[diagnostic(code(qgmcp::file::write_error))]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove file: {}", path.display())]
    #[diagnostic(code(qgmcp::file::remove_error))]
    RemoveError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Reasons the health endpoint could not be read. Never fatal.
#[derive(Debug, Error, Diagnostic)]
pub enum HealthError {
    #[error("could not connect to health endpoint {url}")]
    #[diagnostic(code(qgmcp::health::unreachable))]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("health endpoint {url} did not answer within {}", format_timeout(.timeout))]
    #[diagnostic(code(qgmcp::health::timeout))]
    Timeout { url: String, timeout: Duration },

    #[error("health endpoint {url} returned HTTP {status}")]
    #[diagnostic(code(qgmcp::health::bad_status))]
    BadStatus { url: String, status: u16 },

    #[error("health endpoint {url} returned an invalid payload")]
    #[diagnostic(code(qgmcp::health::invalid_payload))]
    InvalidPayload {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}
