//! Supervisor - lifecycle of the MCP server process
//!
//! This module is split into focused submodules:
//! - `lifecycle`: `start` (background and foreground) and `stop`
//! - `status`: liveness check, stale PID cleanup and the health probe
//!
//! Every invocation of the CLI builds one [`Supervisor`] and calls exactly one
//! operation on it. All collaborators are handed in at construction.

mod lifecycle;
mod status;

use crate::logger::LogLevel;
use crate::pid_file::PidFile;
use crate::process_tree::ProcessTree;
use crate::procs::{self, ProcessBackend};
use crate::runtime::QueryGridOverrides;
use crate::settings::Settings;
use std::path::{Path, PathBuf};

pub use lifecycle::{StartOutcome, StopOutcome};

pub struct Supervisor {
    project_dir: PathBuf,
    settings: Settings,
    backend: Box<dyn ProcessBackend>,
    pid_file: PidFile,
}

/// Everything `qgmcp start` was asked to do.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub host: String,
    pub port: u16,
    pub foreground: bool,
    /// Restart the runtime on source changes; only valid in the foreground
    pub reload: bool,
    /// Defaults to `<project>/logs`
    pub log_dir: Option<PathBuf>,
    pub log_level: LogLevel,
    pub querygrid: QueryGridOverrides,
}

impl Supervisor {
    pub fn new(project_dir: PathBuf, settings: Settings, backend: Box<dyn ProcessBackend>) -> Self {
        let pid_file = PidFile::for_project(&project_dir);
        Self {
            project_dir,
            settings,
            backend,
            pid_file,
        }
    }

    /// A supervisor for `project_dir` using its config.yaml and the native process backend.
    pub fn for_project(project_dir: &Path) -> Self {
        Self::new(
            project_dir.to_path_buf(),
            Settings::load(project_dir),
            procs::platform_backend(),
        )
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn pid_file(&self) -> &PidFile {
        &self.pid_file
    }

    fn process_tree(&self) -> ProcessTree<'_> {
        ProcessTree::new(
            self.backend.as_ref(),
            self.settings.supervisor_stop_grace_period(),
        )
    }

    /// Removes the PID file, logging instead of failing. Used on paths that are
    /// already exiting.
    fn discard_pid_file(&self) {
        match self.pid_file.delete() {
            Ok(true) => info!("Removed PID file {}", self.pid_file.path().display()),
            Ok(false) => {}
            Err(e) => warn!("Failed to remove PID file: {e}"),
        }
    }

    fn discard_stale_pid_file(&self) {
        match self.pid_file.delete() {
            Ok(true) => debug!("removed stale PID file {}", self.pid_file.path().display()),
            Ok(false) => {}
            Err(e) => warn!("Failed to remove stale PID file: {e}"),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::process_tree::fake::FakeBackend;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Shares one fake process table between the test and the supervisor.
    pub struct SharedFake(pub Arc<FakeBackend>);

    impl ProcessBackend for SharedFake {
        fn list_children(&self, pid: u32) -> Vec<u32> {
            self.0.list_children(pid)
        }
        fn signal_terminate(&self, pid: u32) -> crate::procs::SignalOutcome {
            self.0.signal_terminate(pid)
        }
        fn signal_kill(&self, pid: u32) -> crate::procs::SignalOutcome {
            self.0.signal_kill(pid)
        }
        fn is_alive(&self, pid: u32) -> bool {
            self.0.is_alive(pid)
        }
        fn command_line_of(&self, pid: u32) -> Option<String> {
            self.0.command_line_of(pid)
        }
        fn find_by_pattern(&self, pattern: &str) -> Vec<u32> {
            self.0.find_by_pattern(pattern)
        }
        fn verifies_identity(&self) -> bool {
            self.0.verifies_identity()
        }
    }

    pub fn supervisor(backend: FakeBackend) -> (Supervisor, Arc<FakeBackend>, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.supervisor.stop_grace_period = "0s".to_string();
        let backend = Arc::new(backend);
        let supervisor = Supervisor::new(
            dir.path().to_path_buf(),
            settings,
            Box::new(SharedFake(backend.clone())),
        );
        (supervisor, backend, dir)
    }
}
