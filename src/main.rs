use log::LevelFilter;
use qgmcp_cli::{Result, cli, env, logger};
use std::process::ExitCode;
#[cfg(unix)]
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::SignalKind;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    logger::init(env::QGMCP_LOG.unwrap_or(LevelFilter::Info));
    #[cfg(unix)]
    handle_epipe();
    let result = cli::run().await;
    logger::flush();
    result
}

#[cfg(unix)]
fn handle_epipe() {
    match signal::unix::signal(SignalKind::pipe()) {
        Ok(mut pipe_stream) => {
            tokio::spawn(async move {
                pipe_stream.recv().await;
                log::debug!("received SIGPIPE");
            });
        }
        Err(e) => {
            log::warn!("Could not set up SIGPIPE handler: {e}");
        }
    }
}
