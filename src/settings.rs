//! User-configurable settings for qgmcp.
//!
//! Settings are resolved in this order (later wins):
//! 1. Built-in defaults
//! 2. `config.yaml` at the project root (the same file the MCP server reads)
//! 3. Environment variables
//!
//! Command line flags are applied on top by the CLI.
//!
//! Example config.yaml:
//! ```yaml
//! server:
//!   host: 0.0.0.0
//!   port: 8000
//!   health_check_timeout: 5
//!
//! supervisor:
//!   runtime_command: [".venv/bin/python", "-m", "uvicorn"]
//!   app_signature: "src.server:app"
//!   stop_grace_period: 2s
//! ```
//!
//! Sections the supervisor does not know about (`querygrid`, `logging`) are ignored.

use crate::env;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "config.yaml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub supervisor: SupervisorSettings,
}

/// Listener settings shared with the MCP server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Seconds to wait for `GET /health`
    pub health_check_timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Program and leading arguments used to launch the ASGI runtime. The app
    /// signature and listener flags are appended. Empty means auto-detect.
    pub runtime_command: Vec<String>,
    /// Module path of the ASGI application; also how a running server is recognised
    pub app_signature: String,
    /// Time between the graceful and the forceful signal when stopping
    pub stop_grace_period: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            health_check_timeout: 5,
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            runtime_command: vec![],
            app_signature: "src.server:app".to_string(),
            stop_grace_period: "2s".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `<project_dir>/config.yaml`, then overlay environment variables.
    pub fn load(project_dir: &Path) -> Self {
        let mut settings = Self::read_file(&Self::config_path(project_dir)).unwrap_or_default();
        settings.load_from_env();
        settings
    }

    pub fn config_path(project_dir: &Path) -> PathBuf {
        project_dir.join(CONFIG_FILE_NAME)
    }

    /// Parse a config file. Missing or malformed files yield `None`; a malformed
    /// file is reported since the server would fall back to defaults as well.
    fn read_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            trace!("no config file at {}", path.display());
            return None;
        }
        let raw = match xx::file::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to read {}, using defaults: {e}", path.display());
                return None;
            }
        };
        Self::from_yaml(&raw)
            .map_err(|e| warn!("Failed to load {}, using defaults: {e}", path.display()))
            .ok()
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        // an empty document deserializes as null
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    fn load_from_env(&mut self) {
        if let Some(cmd) = &*env::QGMCP_RUNTIME_COMMAND {
            match shell_words::split(cmd) {
                Ok(words) => self.supervisor.runtime_command = words,
                Err(e) => warn!("Ignoring QGMCP_RUNTIME_COMMAND: {e}"),
            }
        }
        if let Some(signature) = &*env::QGMCP_APP_SIGNATURE {
            self.supervisor.app_signature = signature.clone();
        }
        if let Some(grace) = &*env::QGMCP_STOP_GRACE_PERIOD {
            self.supervisor.stop_grace_period = grace.clone();
        }
        if let Some(timeout) = *env::QG_MCP_SERVER_HEALTH_CHECK_TIMEOUT {
            self.server.health_check_timeout = timeout;
        }
    }

    pub fn parse_duration(s: &str) -> Option<Duration> {
        humantime::parse_duration(s.trim()).ok()
    }

    pub fn supervisor_stop_grace_period(&self) -> Duration {
        Self::parse_duration(&self.supervisor.stop_grace_period).unwrap_or_else(|| {
            warn!(
                "invalid stop_grace_period {:?}, using 2s",
                self.supervisor.stop_grace_period
            );
            Duration::from_secs(2)
        })
    }

    pub fn server_health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.server.health_check_timeout)
    }
}
