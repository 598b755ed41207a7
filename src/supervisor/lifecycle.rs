//! Server lifecycle - start and stop
//!
//! `start` checks the port, resolves the log file and the runtime command, then
//! either detaches the runtime and records its PID, or runs it attached to the
//! terminal until it exits or the supervisor is interrupted.
//!
//! `stop` prefers the PID file and falls back to searching the process table for
//! the app signature when there is none.

use super::{StartOptions, Supervisor};
use crate::error::{FileError, StartError};
use crate::identity::{self, IdentityCheck};
use crate::runtime::{self, RuntimeCommand};
use crate::{Result, logger, port};
use miette::IntoDiagnostic;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::Stdio;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The runtime runs on in its own session
    Detached { pid: u32, log_file: PathBuf },
    /// A foreground runtime exited by itself
    Exited { code: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq, strum::EnumIs)]
pub enum StopOutcome {
    /// These process trees were terminated
    Stopped { pids: Vec<u32> },
    /// The PID file named a process that is gone or is not the server
    NotOurServer { pid: u32 },
    /// No PID file and no process carrying the app signature
    NotRunning,
}

impl Supervisor {
    pub async fn start(&self, opts: StartOptions) -> Result<StartOutcome> {
        if opts.reload && !opts.foreground {
            return Err(StartError::ReloadRequiresForeground.into());
        }

        if port::is_port_in_use(&opts.host, opts.port) {
            let owner = port::describe_owner(opts.port);
            return Err(StartError::port_unavailable(&opts.host, opts.port, owner).into());
        }

        let log_file = runtime::prepare_log_file(&self.project_dir, opts.log_dir.as_deref())?;
        let runtime = RuntimeCommand::build(&self.settings, &self.project_dir, &opts, &log_file)?;
        debug!("project directory: {}", self.project_dir.display());
        debug!("runtime command: {}", runtime.display());

        if opts.foreground {
            info!("Starting server in foreground mode");
            if opts.reload {
                info!("Hot reload enabled - watching for file changes");
            }
            self.run_foreground(&runtime).await
        } else {
            info!("Starting server in background mode");
            let pid = self.spawn_background(&runtime, &log_file)?;
            info!("Server started in background (logs: {})", log_file.display());
            Ok(StartOutcome::Detached { pid, log_file })
        }
    }

    /// Spawns the runtime in a new session and records its PID. A runtime whose
    /// PID cannot be recorded is killed again, since nothing could stop it later.
    fn spawn_background(&self, runtime: &RuntimeCommand, log_file: &Path) -> Result<u32> {
        let write_error = |source| FileError::WriteError {
            path: log_file.to_path_buf(),
            source,
        };
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .map_err(write_error)?;
        let stderr = log.try_clone().map_err(write_error)?;

        let mut cmd = runtime.std_command();
        cmd.stdin(Stdio::null()).stdout(log).stderr(stderr);
        detach(&mut cmd);
        let mut child = cmd.spawn().map_err(|source| StartError::SpawnFailed {
            program: runtime.program.clone(),
            source,
        })?;
        let pid = child.id();
        debug!("spawned runtime with pid {pid}");

        if let Err(FileError::WriteError { path, source } | FileError::RemoveError { path, source }) =
            self.pid_file.write(pid)
        {
            error!("Failed to save PID file: {source}");
            match child.kill().and_then(|_| child.wait()) {
                Ok(_) => info!("Server process terminated due to PID file error."),
                Err(e) => error!("Failed to terminate server process: {e}"),
            }
            return Err(StartError::PidPersistFailure { path, pid, source }.into());
        }
        info!("Server PID saved to {}", self.pid_file.path().display());
        Ok(pid)
    }

    async fn run_foreground(&self, runtime: &RuntimeCommand) -> Result<StartOutcome> {
        let mut signals = ShutdownSignals::install()?;
        let mut child = runtime
            .tokio_command()
            .spawn()
            .map_err(|source| StartError::SpawnFailed {
                program: runtime.program.clone(),
                source,
            })?;
        let pid = child.id();
        if let Some(pid) = pid {
            debug!("runtime running with pid {pid}");
        }

        let exited = tokio::select! {
            status = child.wait() => Some(status.into_diagnostic()?),
            _ = signals.recv() => None,
        };

        match exited {
            Some(status) => {
                self.discard_pid_file();
                // a runtime ended by a signal was interrupted along with us
                let code = status.code().unwrap_or(0);
                debug!("runtime exited with {status}");
                Ok(StartOutcome::Exited { code })
            }
            None => {
                info!("Shutdown signal received. Shutting down process tree now.");
                if let Some(pid) = pid {
                    self.process_tree().kill_now(pid);
                }
                let _ = child.wait().await;
                self.discard_pid_file();
                logger::flush();
                std::process::exit(0)
            }
        }
    }

    pub async fn stop(&self) -> Result<StopOutcome> {
        let outcome = match self.pid_file.read() {
            Some(pid) => {
                info!("Stopping server using PID from file: {pid}");
                self.stop_recorded(pid).await
            }
            None => {
                info!("PID file missing; attempting process search fallback");
                self.stop_by_pattern().await
            }
        };
        self.discard_pid_file();
        Ok(outcome)
    }

    async fn stop_recorded(&self, pid: u32) -> StopOutcome {
        if self.backend.verifies_identity() {
            let signature = &self.settings.supervisor.app_signature;
            match identity::is_our_server(self.backend.as_ref(), pid, signature) {
                IdentityCheck::Confirmed => {
                    info!("Confirmed PID {pid} is our server, killing process tree");
                }
                IdentityCheck::Mismatch { command } => {
                    debug!("pid {pid} is running {command:?}");
                    warn!("PID {pid} is not our server or already stopped");
                    return StopOutcome::NotOurServer { pid };
                }
                IdentityCheck::Gone => {
                    warn!("PID {pid} is not our server or already stopped");
                    return StopOutcome::NotOurServer { pid };
                }
            }
        }
        self.terminate(pid).await;
        StopOutcome::Stopped { pids: vec![pid] }
    }

    async fn stop_by_pattern(&self) -> StopOutcome {
        let pids = self
            .backend
            .find_by_pattern(&self.settings.supervisor.app_signature);
        if pids.is_empty() {
            error!("No running server process found");
            return StopOutcome::NotRunning;
        }
        for &pid in &pids {
            info!("Found server process {pid}, killing process tree");
            self.terminate(pid).await;
        }
        StopOutcome::Stopped { pids }
    }

    async fn terminate(&self, pid: u32) {
        let report = self.process_tree().terminate(pid).await;
        for denied in report.denied() {
            warn!("Process {denied} could not be killed: permission denied");
        }
    }
}

#[cfg(unix)]
fn detach(cmd: &mut std::process::Command) {
    use std::os::unix::process::CommandExt;
    // SAFETY: setsid is async-signal-safe and touches no memory of the parent
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid()
                .map(|_| ())
                .map_err(std::io::Error::from)
        });
    }
}

#[cfg(windows)]
fn detach(cmd: &mut std::process::Command) {
    use std::os::windows::process::CommandExt;
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
}

/// Interrupt and termination requests delivered to the supervisor while a
/// foreground runtime is attached.
struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    #[cfg(unix)]
    fn install() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).into_diagnostic()?,
            terminate: signal(SignalKind::terminate()).into_diagnostic()?,
        })
    }

    #[cfg(windows)]
    fn install() -> Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => debug!("received SIGINT"),
            _ = self.terminate.recv() => debug!("received SIGTERM"),
        }
    }

    #[cfg(windows)]
    async fn recv(&mut self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to wait for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    }
}
