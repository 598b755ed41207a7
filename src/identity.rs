//! Checks that a recorded PID still belongs to the MCP server before it is signalled.
//!
//! PIDs get recycled: a PID file left behind by a crashed server can point at an
//! unrelated process by the time `stop` runs.

use crate::procs::ProcessBackend;

#[derive(Debug, Clone, PartialEq, Eq, strum::EnumIs)]
pub enum IdentityCheck {
    /// The command line contains the server signature
    Confirmed,
    /// Something else holds the PID now
    Mismatch { command: String },
    /// No such process
    Gone,
}

pub fn is_our_server(backend: &dyn ProcessBackend, pid: u32, signature: &str) -> IdentityCheck {
    match backend.command_line_of(pid) {
        None => IdentityCheck::Gone,
        Some(command) if command.contains(signature) => IdentityCheck::Confirmed,
        Some(command) => IdentityCheck::Mismatch { command },
    }
}
