//! Two-phase termination of a server process and its direct children.
//!
//! The only child the server ever has is its own runtime worker (hot reload
//! runs in a child of the runtime), so one level of children is enough.
//!
//! Termination is best-effort and never atomic: every child, then the parent,
//! gets the graceful signal; after the grace period every survivor, children
//! first, gets the forceful one. A process that is already gone is recorded as
//! [`SignalOutcome::NotFound`] and the sequence carries on with the others.

use crate::procs::{ProcessBackend, SignalOutcome};
use std::time::Duration;

pub struct ProcessTree<'a> {
    backend: &'a dyn ProcessBackend,
    grace_period: Duration,
}

/// What happened to each PID during [`ProcessTree::terminate`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TerminateReport {
    pub root: u32,
    pub children: Vec<u32>,
    /// Graceful signal outcome per PID, in the order sent
    pub graceful: Vec<(u32, SignalOutcome)>,
    /// Forceful signal outcome for every PID still alive after the grace period
    pub forceful: Vec<(u32, SignalOutcome)>,
}

impl TerminateReport {
    pub fn graceful_outcome(&self, pid: u32) -> Option<SignalOutcome> {
        lookup(&self.graceful, pid)
    }

    pub fn forceful_outcome(&self, pid: u32) -> Option<SignalOutcome> {
        lookup(&self.forceful, pid)
    }

    /// PIDs that refused both signals
    pub fn denied(&self) -> Vec<u32> {
        self.forceful
            .iter()
            .filter(|(_, outcome)| outcome.is_denied())
            .map(|(pid, _)| *pid)
            .collect()
    }
}

fn lookup(outcomes: &[(u32, SignalOutcome)], pid: u32) -> Option<SignalOutcome> {
    outcomes.iter().find(|(p, _)| *p == pid).map(|(_, o)| *o)
}

impl<'a> ProcessTree<'a> {
    pub fn new(backend: &'a dyn ProcessBackend, grace_period: Duration) -> Self {
        Self {
            backend,
            grace_period,
        }
    }

    pub fn children_of(&self, pid: u32) -> Vec<u32> {
        self.backend.list_children(pid)
    }

    pub async fn terminate(&self, pid: u32) -> TerminateReport {
        let children = self.children_of(pid);
        debug!("terminating pid {pid} with children {children:?}");
        let order: Vec<u32> = children.iter().copied().chain([pid]).collect();

        let mut graceful = Vec::with_capacity(order.len());
        for &target in &order {
            let outcome = self.backend.signal_terminate(target);
            log_signal("SIGTERM", target, pid, outcome);
            graceful.push((target, outcome));
        }

        tokio::time::sleep(self.grace_period).await;

        let mut forceful = vec![];
        for &target in &order {
            if !self.backend.is_alive(target) {
                continue;
            }
            let outcome = self.backend.signal_kill(target);
            log_signal("SIGKILL", target, pid, outcome);
            forceful.push((target, outcome));
        }

        TerminateReport {
            root: pid,
            children,
            graceful,
            forceful,
        }
    }

    /// Kills the children of `pid`, then `pid`, without a grace period.
    pub fn kill_now(&self, pid: u32) -> Vec<(u32, SignalOutcome)> {
        self.children_of(pid)
            .into_iter()
            .chain([pid])
            .map(|target| {
                let outcome = self.backend.signal_kill(target);
                log_signal("SIGKILL", target, pid, outcome);
                (target, outcome)
            })
            .collect()
    }
}

fn log_signal(signal: &str, target: u32, root: u32, outcome: SignalOutcome) {
    let role = if target == root { "parent" } else { "child" };
    match outcome {
        SignalOutcome::Succeeded => info!("Sent {signal} to {role} process {target}"),
        SignalOutcome::NotFound => debug!("{role} process {target} already exited"),
        SignalOutcome::Denied => warn!("Not permitted to send {signal} to {role} process {target}"),
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use crate::procs::{ProcessBackend, SignalOutcome};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Default)]
    pub struct FakeProcess {
        pub parent: Option<u32>,
        pub command: String,
        pub alive: bool,
        /// survives SIGTERM
        pub stubborn: bool,
        /// signals are refused
        pub protected: bool,
    }

    /// In-memory process table that records every signal it receives.
    #[derive(Default)]
    pub struct FakeBackend {
        pub procs: Mutex<BTreeMap<u32, FakeProcess>>,
        pub signals: Mutex<Vec<(&'static str, u32)>>,
        pub identity: bool,
    }

    impl FakeBackend {
        pub fn new() -> Self {
            Self {
                identity: true,
                ..Default::default()
            }
        }

        pub fn spawn(&self, pid: u32, parent: Option<u32>, command: &str) -> &Self {
            self.procs.lock().unwrap().insert(
                pid,
                FakeProcess {
                    parent,
                    command: command.to_string(),
                    alive: true,
                    ..Default::default()
                },
            );
            self
        }

        pub fn update(&self, pid: u32, f: impl FnOnce(&mut FakeProcess)) {
            if let Some(p) = self.procs.lock().unwrap().get_mut(&pid) {
                f(p);
            }
        }

        pub fn signals(&self) -> Vec<(&'static str, u32)> {
            self.signals.lock().unwrap().clone()
        }

        fn deliver(&self, name: &'static str, pid: u32, forceful: bool) -> SignalOutcome {
            self.signals.lock().unwrap().push((name, pid));
            let mut procs = self.procs.lock().unwrap();
            match procs.get_mut(&pid) {
                Some(p) if p.alive && p.protected => SignalOutcome::Denied,
                Some(p) if p.alive => {
                    if forceful || !p.stubborn {
                        p.alive = false;
                    }
                    SignalOutcome::Succeeded
                }
                _ => SignalOutcome::NotFound,
            }
        }
    }

    impl ProcessBackend for FakeBackend {
        fn list_children(&self, pid: u32) -> Vec<u32> {
            // exited children stay listed, like a table snapshot taken just before they exit
            self.procs
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, p)| p.parent == Some(pid))
                .map(|(child, _)| *child)
                .collect()
        }

        fn signal_terminate(&self, pid: u32) -> SignalOutcome {
            self.deliver("TERM", pid, false)
        }

        fn signal_kill(&self, pid: u32) -> SignalOutcome {
            self.deliver("KILL", pid, true)
        }

        fn is_alive(&self, pid: u32) -> bool {
            self.procs
                .lock()
                .unwrap()
                .get(&pid)
                .is_some_and(|p| p.alive)
        }

        fn command_line_of(&self, pid: u32) -> Option<String> {
            self.procs
                .lock()
                .unwrap()
                .get(&pid)
                .filter(|p| p.alive)
                .map(|p| p.command.clone())
        }

        fn find_by_pattern(&self, pattern: &str) -> Vec<u32> {
            self.procs
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, p)| p.alive && p.command.contains(pattern))
                .map(|(pid, _)| *pid)
                .collect()
        }

        fn verifies_identity(&self) -> bool {
            self.identity
        }
    }
}
