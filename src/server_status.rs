use crate::error::HealthError;
use crate::health::HealthReport;

/// What `qgmcp status` found.
#[derive(Debug, strum::Display, strum::EnumIs)]
#[strum(serialize_all = "snake_case")]
pub enum ServerStatus {
    /// No PID file
    NotRunning,
    /// The PID file names a process that no longer exists. The file has been removed.
    Stale { pid: u32 },
    Running {
        pid: u32,
        health: Result<HealthReport, HealthError>,
    },
}

impl ServerStatus {
    pub fn style(&self) -> String {
        let s = self.to_string();
        match self {
            ServerStatus::NotRunning => console::style(s).dim().to_string(),
            ServerStatus::Stale { .. } => console::style(s).yellow().to_string(),
            ServerStatus::Running { health: Ok(_), .. } => console::style(s).green().to_string(),
            ServerStatus::Running { health: Err(_), .. } => console::style(s).yellow().to_string(),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            ServerStatus::NotRunning => None,
            ServerStatus::Stale { pid } | ServerStatus::Running { pid, .. } => Some(*pid),
        }
    }

    /// Process exit code for `qgmcp status`
    pub fn exit_code(&self) -> u8 {
        if self.is_running() { 0 } else { 1 }
    }
}
