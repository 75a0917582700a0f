//! Reconciler ticker
//!
//! Runs one sweep shortly after startup, then on a fixed interval.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::info;

use crate::reconciler::Reconciler;

/// Reconciler worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Interval between periodic sweeps.
    pub interval: Duration,
    /// Delay before the startup sweep.
    pub startup_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3_600),
            startup_delay: Duration::from_secs(10),
        }
    }
}

/// Run the ticker until shutdown.
pub async fn run(
    options: &Options,
    reconciler: Reconciler,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!("Reconciler starting...");

    tokio::select! {
        _ = &mut shutdown_signal => {
            info!("Reconciler shutting down...");
            return;
        }
        _ = tokio::time::sleep(options.startup_delay) => {}
    }
    reconciler.run_sweeps().await;

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Reconciler shutting down...");
                return;
            }
            _ = tokio::time::sleep(options.interval) => {}
        }
        reconciler.run_sweeps().await;
    }
}
