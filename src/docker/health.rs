//! Health-check polling against a freshly started container

use std::time::Duration;

use tracing::debug;

use crate::errors::CoreError;

/// Polling parameters, resolved from process config and the service row.
#[derive(Debug, Clone)]
pub struct HealthCheckOptions {
    /// Wait before the first attempt, giving the process time to bind.
    pub start_delay: Duration,
    /// Per-attempt request timeout.
    pub timeout: Duration,
    /// Attempts before giving up.
    pub retries: u32,
}

impl Default for HealthCheckOptions {
    fn default() -> Self {
        Self {
            start_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(5),
            retries: 10,
        }
    }
}

/// Backoff between attempts: 1 s doubling, capped at 10 s.
pub fn health_backoff(attempt: u32) -> Duration {
    let secs = 1u64 << attempt.min(4);
    Duration::from_secs(secs.min(10))
}

/// Poll `http://<ip>:<port><path>` until a 2xx/3xx response or until retries
/// are exhausted. Returns the number of attempts it took.
pub async fn wait_until_healthy(
    ip: &str,
    port: u16,
    path: &str,
    options: &HealthCheckOptions,
) -> Result<u32, CoreError> {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let url = format!("http://{ip}:{port}{path}");

    let client = reqwest::Client::builder()
        .timeout(options.timeout)
        .build()?;

    tokio::time::sleep(options.start_delay).await;

    for attempt in 0..options.retries {
        match client.get(&url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                if (200..400).contains(&status) {
                    debug!(url, status, attempt, "Health check passed");
                    return Ok(attempt + 1);
                }
                debug!(url, status, attempt, "Health check got failing status");
            }
            Err(e) => {
                debug!(url, attempt, "Health check request failed: {e}");
            }
        }

        if attempt + 1 < options.retries {
            tokio::time::sleep(health_backoff(attempt)).await;
        }
    }

    Err(CoreError::Timeout {
        operation: format!("health check against {url}"),
        seconds: options.retries as u64 * options.timeout.as_secs(),
    })
}
