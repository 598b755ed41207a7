use crate::logger::{self, LogLevel};
use crate::runtime::QueryGridOverrides;
use crate::supervisor::{StartOptions, StartOutcome, Supervisor};
use crate::{Result, env};
use std::path::PathBuf;
use std::process::ExitCode;

/// Starts the MCP server
#[derive(Debug, clap::Args)]
#[clap(
    verbatim_doc_comment,
    long_about = "\
Starts the MCP server

By default the server is detached from the terminal, its output goes to
logs/qg_server_YYYYMMDD.log and its PID is saved to run/server.pid.
With --foreground it stays attached until it exits or is interrupted.

Examples:
  qgmcp start                            Start in the background on 0.0.0.0:8000
  qgmcp start --port 8003                Use another port
  qgmcp start --foreground --reload      Develop with hot reload
  qgmcp start --qgm-host qgm.example.com --qgm-username admin
                                         Point the server at a QueryGrid Manager"
)]
pub struct Start {
    /// Address to bind [default: server.host from config.yaml, else 0.0.0.0]
    #[clap(long, env = "QG_MCP_SERVER_HOST")]
    host: Option<String>,
    /// Port to bind [default: server.port from config.yaml, else 8000]
    #[clap(long, env = "QG_MCP_SERVER_PORT")]
    port: Option<u16>,
    /// Stay attached to the terminal
    #[clap(long)]
    foreground: bool,
    /// Restart on changes under src/ (requires --foreground)
    #[clap(long)]
    reload: bool,
    /// Directory for the server log [default: <project>/logs]
    #[clap(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
    /// Log level for the server and for this command
    #[clap(long, value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
    /// QueryGrid Manager host
    #[clap(long, value_name = "HOST")]
    qgm_host: Option<String>,
    /// QueryGrid Manager port
    #[clap(long, value_name = "PORT")]
    qgm_port: Option<u16>,
    /// QueryGrid Manager username
    #[clap(long, value_name = "USERNAME")]
    qgm_username: Option<String>,
    /// QueryGrid Manager password
    #[clap(long, value_name = "PASSWORD")]
    qgm_password: Option<String>,
    /// Verify the QueryGrid Manager TLS certificate (true, 1 or yes; anything else is false)
    #[clap(long, value_name = "BOOL", value_parser = parse_truthy)]
    qgm_verify_ssl: Option<bool>,
}

impl Start {
    pub async fn run(&self, supervisor: &Supervisor) -> Result<ExitCode> {
        if env::QGMCP_LOG.is_none() {
            logger::init(self.log_level.level_filter());
        }
        let server = &supervisor.settings().server;
        let opts = StartOptions {
            host: self.host.clone().unwrap_or_else(|| server.host.clone()),
            port: self.port.unwrap_or(server.port),
            foreground: self.foreground,
            reload: self.reload,
            log_dir: self.log_dir.clone(),
            log_level: self.log_level,
            querygrid: QueryGridOverrides {
                host: self.qgm_host.clone(),
                port: self.qgm_port,
                username: self.qgm_username.clone(),
                password: self.qgm_password.clone(),
                verify_ssl: self.qgm_verify_ssl,
            },
        };
        match supervisor.start(opts).await? {
            StartOutcome::Detached { .. } => Ok(ExitCode::SUCCESS),
            StartOutcome::Exited { code } => Ok(ExitCode::from(u8::try_from(code).unwrap_or(1))),
        }
    }
}

fn parse_truthy(s: &str) -> std::result::Result<bool, String> {
    Ok(matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
}
