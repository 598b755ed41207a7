use crate::Result;
use crate::supervisor::{StopOutcome, Supervisor};
use std::process::ExitCode;

/// Stops the MCP server and its child processes
#[derive(Debug, clap::Args)]
#[clap(
    visible_alias = "kill",
    verbatim_doc_comment,
    long_about = "\
Stops the MCP server and its child processes

Uses the PID in run/server.pid when there is one, after checking that the
process really is the server. Without a PID file, every process whose command
line carries the app signature is stopped instead.

Children get SIGTERM before the parent; anything still alive after the grace
period gets SIGKILL. Stopping a server that is not running is not an error."
)]
pub struct Stop {}

impl Stop {
    pub async fn run(&self, supervisor: &Supervisor) -> Result<ExitCode> {
        match supervisor.stop().await? {
            StopOutcome::Stopped { pids } => debug!("stopped {pids:?}"),
            StopOutcome::NotOurServer { .. } | StopOutcome::NotRunning => {}
        }
        Ok(ExitCode::SUCCESS)
    }
}
