//! Process configuration — loaded from environment variables.

use std::time::Duration;

use crate::errors::CoreError;

/// RenderLite core configuration.
///
/// Required:
/// - `DATABASE_URL`: Postgres connection string
/// - `REDIS_URL`: key-value bus connection string
/// - `ENCRYPTION_KEY`: 32-byte hex key for the secret envelope
///
/// Everything else has a default; see the individual fields.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection URL.
    pub database_url: String,
    /// Redis connection URL (queues + pub/sub channel).
    pub redis_url: String,
    /// Symmetric key for encrypting env vars and tokens at rest.
    pub encryption_key: [u8; 32],
    /// Suffix for auto-assigned hostnames.
    pub base_domain: String,
    /// Port the reverse proxy forwards to inside each container.
    pub container_port: u16,
    /// Name of the shared network all managed containers attach to.
    pub docker_network: String,
    /// Image build budget.
    pub build_timeout: Duration,
    /// Repository clone budget.
    pub clone_timeout: Duration,
    /// Delay before the first health-check attempt against a new container.
    pub health_check_start_delay: Duration,
    /// Per-attempt health-check timeout (service config overrides this).
    pub health_check_timeout: Duration,
    /// Health-check attempts before giving up.
    pub health_check_retries: u32,
    /// Emit TLS + cert-resolver router labels.
    pub enable_tls: bool,
    /// Concurrent jobs per queue.
    pub queue_concurrency: usize,
    /// Jobs admitted per rolling rate window, per queue.
    pub queue_rate_limit: usize,
    /// Rolling rate window length.
    pub queue_rate_window: Duration,
    /// Queue-level delivery attempts per job.
    pub queue_max_attempts: u32,
    /// Interval between reconciler sweeps.
    pub reconcile_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, CoreError> {
        let database_url = require("DATABASE_URL")?;
        let redis_url = require("REDIS_URL")?;
        let encryption_key = parse_key(&require("ENCRYPTION_KEY")?)?;

        Ok(Self {
            database_url,
            redis_url,
            encryption_key,
            base_domain: var_or("BASE_DOMAIN", "renderlite.local"),
            container_port: parsed_or("CONTAINER_PORT", 3000),
            docker_network: var_or("DOCKER_NETWORK", "renderlite"),
            build_timeout: Duration::from_millis(parsed_or("BUILD_TIMEOUT_MS", 300_000)),
            clone_timeout: Duration::from_millis(parsed_or("CLONE_TIMEOUT_MS", 60_000)),
            health_check_start_delay: Duration::from_millis(parsed_or(
                "HEALTH_CHECK_START_DELAY_MS",
                5_000,
            )),
            health_check_timeout: Duration::from_millis(parsed_or("HEALTH_CHECK_TIMEOUT_MS", 5_000)),
            health_check_retries: parsed_or("HEALTH_CHECK_RETRIES", 10),
            enable_tls: var_or("ENABLE_TLS", "false") == "true",
            queue_concurrency: parsed_or("QUEUE_CONCURRENCY", 2),
            queue_rate_limit: parsed_or("QUEUE_RATE_LIMIT", 5),
            queue_rate_window: Duration::from_secs(parsed_or("QUEUE_RATE_WINDOW_SECS", 60)),
            queue_max_attempts: parsed_or("QUEUE_MAX_ATTEMPTS", 3),
            reconcile_interval: Duration::from_secs(parsed_or("RECONCILE_INTERVAL_SECS", 3_600)),
        })
    }
}

fn require(key: &'static str) -> Result<String, CoreError> {
    std::env::var(key)
        .map_err(|_| CoreError::Config(format!("missing required environment variable {key}")))
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Parse the 64-hex-char encryption key into raw bytes.
pub fn parse_key(hex_key: &str) -> Result<[u8; 32], CoreError> {
    let bytes = hex::decode(hex_key.trim())
        .map_err(|_| CoreError::Config("ENCRYPTION_KEY must be hex-encoded".to_string()))?;
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CoreError::Config("ENCRYPTION_KEY must decode to 32 bytes".to_string()))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_valid() {
        let key = parse_key(&"ab".repeat(32)).unwrap();
        assert_eq!(key.len(), 32);
        assert_eq!(key[0], 0xab);
    }

    #[test]
    fn test_parse_key_rejects_short() {
        assert!(parse_key("abcd").is_err());
    }

    #[test]
    fn test_parse_key_rejects_non_hex() {
        assert!(parse_key(&"zz".repeat(32)).is_err());
    }
}
