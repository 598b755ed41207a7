use crate::Result;
use crate::server_status::ServerStatus;
use crate::supervisor::Supervisor;
use std::process::ExitCode;

/// Reports whether the MCP server is running and how healthy it is
#[derive(Debug, clap::Args)]
#[clap(
    visible_alias = "stat",
    verbatim_doc_comment,
    long_about = "\
Reports whether the MCP server is running and how healthy it is

Exits 0 when the server is running, 1 otherwise. A PID file left behind by a
server that died is removed. The health endpoint is queried only when the
process is alive; an unreachable endpoint is reported but the server still
counts as running.

Output:
  Server is running (PID: 12345)
  Health Check Results:
    Application: ok
    QueryGrid: ok
    QueryGrid Version: 03.07.00.01"
)]
pub struct Status {
    /// Address the server listens on [default: server.host from config.yaml]
    #[clap(long, env = "QG_MCP_SERVER_HOST")]
    host: Option<String>,
    /// Port the server listens on [default: server.port from config.yaml]
    #[clap(long, env = "QG_MCP_SERVER_PORT")]
    port: Option<u16>,
}

impl Status {
    pub async fn run(&self, supervisor: &Supervisor) -> Result<ExitCode> {
        let server = &supervisor.settings().server;
        let host = self.host.as_deref().unwrap_or(&server.host);
        let port = self.port.unwrap_or(server.port);

        let status = supervisor.status(host, port).await?;
        debug!("status: {}", status.style());
        match &status {
            ServerStatus::NotRunning => info!("Server is not running (no PID file found)"),
            ServerStatus::Stale { pid } => {
                info!("Server is not running (stale PID file found: {pid})");
                if !supervisor.pid_file().exists() {
                    info!("Removed stale PID file");
                }
            }
            ServerStatus::Running { pid, health } => {
                info!("Server is running (PID: {pid})");
                match health {
                    Ok(report) => {
                        info!("Health Check Results:");
                        info!("  Application: {}", report.app());
                        info!("  QueryGrid: {}", report.querygrid());
                        if let Some(version) = &report.querygrid_version {
                            info!("  QueryGrid Version: {version}");
                        }
                    }
                    Err(e) => warn!("Could not fetch health check: {e}"),
                }
            }
        }
        Ok(ExitCode::from(status.exit_code()))
    }
}
