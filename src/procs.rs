//! OS process capability used by the supervisor.
//!
//! Everything platform specific about processes lives here behind
//! [`ProcessBackend`]: [`ProcessTree`](crate::process_tree::ProcessTree) and the
//! supervisor are written once against the trait. The process table itself is
//! read through `sysinfo`; signals go through `nix` on Unix and `taskkill` /
//! `TerminateProcess` on Windows.

use std::sync::Mutex;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, UpdateKind};

/// Result of delivering one signal to one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIs)]
#[strum(serialize_all = "snake_case")]
pub enum SignalOutcome {
    Succeeded,
    /// The process exited before the signal was sent
    NotFound,
    /// The process exists but could not be signalled
    Denied,
}

pub trait ProcessBackend: Send + Sync {
    /// Direct children of `pid`, one level deep.
    fn list_children(&self, pid: u32) -> Vec<u32>;
    /// Ask the process to exit (SIGTERM or the platform equivalent).
    fn signal_terminate(&self, pid: u32) -> SignalOutcome;
    /// Force the process to exit (SIGKILL or the platform equivalent).
    fn signal_kill(&self, pid: u32) -> SignalOutcome;
    fn is_alive(&self, pid: u32) -> bool;
    /// Full command line, arguments joined by spaces.
    fn command_line_of(&self, pid: u32) -> Option<String>;
    /// Every process (other than this one) whose command line contains `pattern`.
    fn find_by_pattern(&self, pattern: &str) -> Vec<u32>;
    /// Whether `stop` should check a recorded PID's command line before signalling it.
    fn verifies_identity(&self) -> bool;
}

/// Backend for the platform this binary was built for.
pub fn platform_backend() -> Box<dyn ProcessBackend> {
    #[cfg(unix)]
    {
        Box::new(UnixBackend::default())
    }
    #[cfg(windows)]
    {
        Box::new(WindowsBackend::default())
    }
}

/// Snapshot of the process table, refreshed before every query since the
/// supervisor asks about processes that are in the middle of exiting.
pub struct Procs {
    system: Mutex<sysinfo::System>,
}

impl Default for Procs {
    fn default() -> Self {
        Self::new()
    }
}

impl Procs {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(sysinfo::System::new()),
        }
    }

    fn lock_system(&self) -> std::sync::MutexGuard<'_, sysinfo::System> {
        self.system.lock().unwrap_or_else(|poisoned| {
            warn!("System mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn refresh_kind() -> ProcessRefreshKind {
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::OnlyIfNotSet)
    }

    fn refreshed(&self) -> std::sync::MutexGuard<'_, sysinfo::System> {
        let mut system = self.lock_system();
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, Self::refresh_kind());
        system
    }

    pub fn exists(&self, pid: u32) -> bool {
        let mut system = self.lock_system();
        let target = sysinfo::Pid::from_u32(pid);
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[target]),
            true,
            Self::refresh_kind(),
        );
        system
            .process(target)
            .is_some_and(|p| p.status() != sysinfo::ProcessStatus::Zombie)
    }

    pub fn children(&self, pid: u32) -> Vec<u32> {
        let parent = sysinfo::Pid::from_u32(pid);
        let mut children: Vec<u32> = self
            .refreshed()
            .processes()
            .iter()
            .filter(|(_, p)| p.parent() == Some(parent))
            .filter(|(_, p)| is_live_process(p))
            .map(|(child, _)| child.as_u32())
            .collect();
        children.sort_unstable();
        children
    }

    pub fn command_line(&self, pid: u32) -> Option<String> {
        let mut system = self.lock_system();
        let target = sysinfo::Pid::from_u32(pid);
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[target]),
            true,
            Self::refresh_kind(),
        );
        let process = system.process(target)?;
        if process.status() == sysinfo::ProcessStatus::Zombie {
            return None;
        }
        Some(join_cmd(process.cmd()))
    }

    pub fn matching(&self, pattern: &str) -> Vec<u32> {
        let own = std::process::id();
        let mut pids: Vec<u32> = self
            .refreshed()
            .processes()
            .iter()
            .filter(|(pid, _)| pid.as_u32() != own)
            .filter(|(_, p)| is_live_process(p))
            .filter(|(_, p)| join_cmd(p.cmd()).contains(pattern))
            .map(|(pid, _)| pid.as_u32())
            .collect();
        pids.sort_unstable();
        pids
    }

    #[cfg_attr(unix, allow(dead_code))]
    fn with_process<T>(&self, pid: u32, f: impl FnOnce(&sysinfo::Process) -> T) -> Option<T> {
        let mut system = self.lock_system();
        let target = sysinfo::Pid::from_u32(pid);
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[target]),
            true,
            Self::refresh_kind(),
        );
        system.process(target).map(f)
    }
}

/// Linux lists every thread as a task whose parent is the owning process and
/// whose command line is the process's own, so threads are dropped here.
fn is_live_process(p: &sysinfo::Process) -> bool {
    p.thread_kind().is_none() && p.status() != sysinfo::ProcessStatus::Zombie
}

fn join_cmd(cmd: &[std::ffi::OsString]) -> String {
    cmd.iter()
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(unix)]
#[derive(Default)]
pub struct UnixBackend {
    procs: Procs,
}

#[cfg(unix)]
impl UnixBackend {
    fn send(&self, pid: u32, signal: Option<nix::sys::signal::Signal>) -> SignalOutcome {
        use nix::errno::Errno;
        // 0 would address our own process group and negative values whole groups
        let Ok(raw) = i32::try_from(pid) else {
            return SignalOutcome::NotFound;
        };
        if raw <= 0 {
            return SignalOutcome::NotFound;
        }
        match nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw), signal) {
            Ok(()) => SignalOutcome::Succeeded,
            Err(Errno::ESRCH) => SignalOutcome::NotFound,
            Err(Errno::EPERM) => SignalOutcome::Denied,
            Err(e) => {
                warn!("unexpected error signalling pid {pid}: {e}");
                SignalOutcome::Denied
            }
        }
    }
}

#[cfg(unix)]
impl ProcessBackend for UnixBackend {
    fn list_children(&self, pid: u32) -> Vec<u32> {
        self.procs.children(pid)
    }

    fn signal_terminate(&self, pid: u32) -> SignalOutcome {
        self.send(pid, Some(nix::sys::signal::Signal::SIGTERM))
    }

    fn signal_kill(&self, pid: u32) -> SignalOutcome {
        self.send(pid, Some(nix::sys::signal::Signal::SIGKILL))
    }

    fn is_alive(&self, pid: u32) -> bool {
        match self.send(pid, None) {
            SignalOutcome::NotFound => false,
            // a zombie still answers signal 0 but has already exited
            SignalOutcome::Succeeded => self.procs.exists(pid),
            SignalOutcome::Denied => true,
        }
    }

    fn command_line_of(&self, pid: u32) -> Option<String> {
        self.procs.command_line(pid)
    }

    fn find_by_pattern(&self, pattern: &str) -> Vec<u32> {
        self.procs.matching(pattern)
    }

    fn verifies_identity(&self) -> bool {
        true
    }
}

#[cfg(windows)]
#[derive(Default)]
pub struct WindowsBackend {
    procs: Procs,
}

#[cfg(windows)]
impl ProcessBackend for WindowsBackend {
    fn list_children(&self, pid: u32) -> Vec<u32> {
        self.procs.children(pid)
    }

    fn signal_terminate(&self, pid: u32) -> SignalOutcome {
        if !self.procs.exists(pid) {
            return SignalOutcome::NotFound;
        }
        // without /F taskkill posts WM_CLOSE, the closest thing to SIGTERM
        let status = duct::cmd!("taskkill", "/PID", pid.to_string())
            .stdout_null()
            .stderr_null()
            .unchecked()
            .run();
        match status {
            Ok(output) if output.status.success() => SignalOutcome::Succeeded,
            Ok(_) if !self.procs.exists(pid) => SignalOutcome::NotFound,
            Ok(_) => SignalOutcome::Denied,
            Err(e) => {
                warn!("failed to run taskkill for pid {pid}: {e}");
                SignalOutcome::Denied
            }
        }
    }

    fn signal_kill(&self, pid: u32) -> SignalOutcome {
        match self.procs.with_process(pid, |p| p.kill()) {
            None => SignalOutcome::NotFound,
            Some(true) => SignalOutcome::Succeeded,
            Some(false) if !self.procs.exists(pid) => SignalOutcome::NotFound,
            Some(false) => SignalOutcome::Denied,
        }
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.procs.exists(pid)
    }

    fn command_line_of(&self, pid: u32) -> Option<String> {
        self.procs.command_line(pid)
    }

    fn find_by_pattern(&self, pattern: &str) -> Vec<u32> {
        self.procs.matching(pattern)
    }

    /// Identity is not checked before stopping on Windows; the recorded PID is
    /// terminated unconditionally.
    fn verifies_identity(&self) -> bool {
        false
    }
}
