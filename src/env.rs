use once_cell::sync::Lazy;
pub use std::env::*;
use std::path::PathBuf;

pub static CWD: Lazy<PathBuf> = Lazy::new(|| current_dir().unwrap_or_else(|_| PathBuf::from(".")));

/// Root of the MCP server checkout. `run/`, `logs/`, `src/` and `config.yaml` live under it.
pub static QGMCP_PROJECT_DIR: Lazy<PathBuf> =
    Lazy::new(|| var_path("QGMCP_PROJECT_DIR").unwrap_or_else(|| CWD.clone()));

pub static QGMCP_LOG: Lazy<Option<log::LevelFilter>> = Lazy::new(|| var_log_level("QGMCP_LOG"));

// Overrides for the `supervisor` section of config.yaml
pub static QGMCP_RUNTIME_COMMAND: Lazy<Option<String>> =
    Lazy::new(|| var("QGMCP_RUNTIME_COMMAND").ok().filter(|v| !v.trim().is_empty()));
pub static QGMCP_APP_SIGNATURE: Lazy<Option<String>> =
    Lazy::new(|| var("QGMCP_APP_SIGNATURE").ok().filter(|v| !v.trim().is_empty()));
pub static QGMCP_STOP_GRACE_PERIOD: Lazy<Option<String>> =
    Lazy::new(|| var("QGMCP_STOP_GRACE_PERIOD").ok());
pub static QG_MCP_SERVER_HEALTH_CHECK_TIMEOUT: Lazy<Option<u64>> =
    Lazy::new(|| var_u64("QG_MCP_SERVER_HEALTH_CHECK_TIMEOUT"));

fn var_path(name: &str) -> Option<PathBuf> {
    var(name).map(PathBuf::from).ok()
}

fn var_u64(name: &str) -> Option<u64> {
    var(name).ok().and_then(|val| val.parse().ok())
}

fn var_log_level(name: &str) -> Option<log::LevelFilter> {
    var(name).ok().and_then(|level| level.parse().ok())
}
