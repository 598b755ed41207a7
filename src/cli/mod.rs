use crate::supervisor::Supervisor;
use crate::{Result, env};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

mod start;
mod status;
mod stop;

/// Manage the QueryGrid Manager MCP server
#[derive(Debug, clap::Parser)]
#[clap(name = "qgmcp", version, about)]
struct Cli {
    /// Root of the MCP server checkout [env: QGMCP_PROJECT_DIR] [default: current directory]
    #[clap(long, global = true, value_name = "DIR")]
    project_dir: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    Start(start::Start),
    Status(status::Status),
    Stop(stop::Stop),
}

impl Cli {
    fn project_dir(&self) -> PathBuf {
        match &self.project_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => env::CWD.join(dir),
            None => env::QGMCP_PROJECT_DIR.clone(),
        }
    }
}

pub async fn run() -> Result<ExitCode> {
    let args = Cli::parse();
    let project_dir = args.project_dir();
    trace!("project directory: {}", project_dir.display());
    let supervisor = Supervisor::for_project(&project_dir);
    match args.command {
        Command::Start(start) => start.run(&supervisor).await,
        Command::Status(status) => status.run(&supervisor).await,
        Command::Stop(stop) => stop.run(&supervisor).await,
    }
}
