//! Application configuration options

use std::time::Duration;

use crate::config::Config;
use crate::workers::{deployer, events, metrics, reconciler};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Process configuration from the environment.
    pub config: Config,

    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Queue worker options (applied to both queues)
    pub deployer: deployer::Options,

    /// Metrics sampler options
    pub metrics: metrics::Options,

    /// Reconciler ticker options
    pub reconciler: reconciler::Options,

    /// Event bridge options
    pub event_bridge: events::Options,
}

impl AppOptions {
    /// Derive worker options from the process configuration.
    pub fn from_config(config: Config) -> Self {
        let deployer = deployer::Options {
            concurrency: config.queue_concurrency,
            rate_limit: config.queue_rate_limit,
            rate_window: config.queue_rate_window,
            max_attempts: config.queue_max_attempts,
            ..Default::default()
        };
        let reconciler = reconciler::Options {
            interval: config.reconcile_interval,
            ..Default::default()
        };

        Self {
            config,
            lifecycle: LifecycleOptions::default(),
            deployer,
            metrics: metrics::Options::default(),
            reconciler,
            event_bridge: events::Options::default(),
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown before the process force-exits.
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}
