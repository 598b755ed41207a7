//! Client for the MCP server's `/health` endpoint.

use crate::error::HealthError;
use serde::Deserialize;
use std::time::Duration;

/// Payload of `GET /health`. Only `app` is always present; missing fields are
/// shown as `unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct HealthReport {
    #[serde(default)]
    pub app: Option<String>,
    /// `ok`, `unreachable` or `not-configured`
    #[serde(default)]
    pub querygrid: Option<String>,
    #[serde(default)]
    pub querygrid_version: Option<String>,
}

impl HealthReport {
    pub fn app(&self) -> &str {
        self.app.as_deref().unwrap_or("unknown")
    }

    pub fn querygrid(&self) -> &str {
        self.querygrid.as_deref().unwrap_or("unknown")
    }
}

/// The wildcard bind address is reached through localhost.
pub fn health_url(host: &str, port: u16) -> String {
    if host == "0.0.0.0" {
        format!("http://localhost:{port}/health")
    } else {
        format!("http://{host}:{port}/health")
    }
}

pub async fn probe(url: &str, timeout: Duration) -> Result<HealthReport, HealthError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|source| HealthError::Unreachable {
            url: url.to_string(),
            source,
        })?;
    let unreachable = |source: reqwest::Error| {
        if source.is_timeout() {
            HealthError::Timeout {
                url: url.to_string(),
                timeout,
            }
        } else {
            HealthError::Unreachable {
                url: url.to_string(),
                source,
            }
        }
    };
    trace!("GET {url}");
    let response = client.get(url).send().await.map_err(unreachable)?;
    let status = response.status();
    if !status.is_success() {
        return Err(HealthError::BadStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let body = response.text().await.map_err(unreachable)?;
    serde_json::from_str(&body).map_err(|source| HealthError::InvalidPayload {
        url: url.to_string(),
        source,
    })
}
