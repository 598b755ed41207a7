use super::Supervisor;
use crate::Result;
use crate::health;
use crate::server_status::ServerStatus;

impl Supervisor {
    /// Reports whether the recorded server is alive, removing a stale PID file.
    /// A running server is probed on `host:port`; a failed probe is carried in
    /// the result and never turns a running server into a stopped one.
    pub async fn status(&self, host: &str, port: u16) -> Result<ServerStatus> {
        let Some(pid) = self.pid_file.read() else {
            if self.pid_file.exists() {
                // unreadable contents are treated as no record at all
                self.discard_stale_pid_file();
            }
            return Ok(ServerStatus::NotRunning);
        };

        if !self.backend.is_alive(pid) {
            self.discard_stale_pid_file();
            return Ok(ServerStatus::Stale { pid });
        }

        let url = health::health_url(host, port);
        let timeout = self.settings.server_health_check_timeout();
        let health = health::probe(&url, timeout).await;
        Ok(ServerStatus::Running { pid, health })
    }
}
