//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::AppOptions;
use crate::app::state::AppState;
use crate::errors::CoreError;
use crate::reconciler::Reconciler;
use crate::workers::{deployer, events, metrics, reconciler};

/// Run the RenderLite control plane until the shutdown signal fires.
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), CoreError> {
    info!("Initializing RenderLite...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), &options);

    let state = match init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to start RenderLite: {e}");
            shutdown_manager.shutdown().await?;
            return Err(e);
        }
    };
    shutdown_manager.with_app_state(state);

    tokio::select! {
        _ = shutdown_signal => {
            info!("Shutdown signal received, shutting down...");
        }
    }

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppState>, CoreError> {
    let state = Arc::new(AppState::init(options.config.clone()).await?);

    // Build-queue workers.
    {
        info!("Initializing build worker...");
        let worker_options = options.deployer.clone();
        let queue = state.build_queue.clone();
        let ctx = state.pipeline_context();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            deployer::run_build_worker(
                &worker_options,
                queue,
                ctx,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
        });
        shutdown_manager.register("build worker", handle);
    }

    // Rollback-queue workers.
    {
        info!("Initializing rollback worker...");
        let worker_options = options.deployer.clone();
        let queue = state.rollback_queue.clone();
        let ctx = state.pipeline_context();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            deployer::run_rollback_worker(
                &worker_options,
                queue,
                ctx,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
        });
        shutdown_manager.register("rollback worker", handle);
    }

    // Event bridge: bus channel -> local topic rooms.
    {
        info!("Initializing event bridge...");
        let bridge_options = options.event_bridge.clone();
        let redis_config = state.redis_config.clone();
        let hub = state.hub.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            events::run(
                &bridge_options,
                redis_config,
                hub,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
        });
        shutdown_manager.register("event bridge", handle);
    }

    // Metrics sampler.
    {
        info!("Initializing metrics sampler...");
        let metrics_options = options.metrics.clone();
        let pool = state.pool.clone();
        let runtime = state.runtime.clone();
        let hub = state.hub.clone();
        let publisher = state.publisher.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            metrics::run(
                &metrics_options,
                pool,
                runtime,
                hub,
                publisher,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
        });
        shutdown_manager.register("metrics sampler", handle);
    }

    // Reconciler ticker.
    {
        info!("Initializing reconciler...");
        let reconciler_options = options.reconciler.clone();
        let sweeps = Reconciler::new(
            state.pool.clone(),
            state.runtime.clone(),
            state.publisher.clone(),
        );
        let mut shutdown_rx = shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            reconciler::run(
                &reconciler_options,
                sweeps,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
        });
        shutdown_manager.register("reconciler", handle);
    }

    Ok(state)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    max_shutdown_delay: std::time::Duration,
    handles: Vec<(&'static str, JoinHandle<()>)>,
    app_state: Option<Arc<AppState>>,
}

impl ShutdownManager {
    fn new(shutdown_tx: broadcast::Sender<()>, options: &AppOptions) -> Self {
        Self {
            shutdown_tx,
            max_shutdown_delay: options.lifecycle.max_shutdown_delay,
            handles: Vec::new(),
            app_state: None,
        }
    }

    fn register(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.handles.push((name, handle));
    }

    fn with_app_state(&mut self, state: Arc<AppState>) {
        self.app_state = Some(state);
    }

    async fn shutdown(&mut self) -> Result<(), CoreError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(self.max_shutdown_delay, self.shutdown_impl()).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), CoreError> {
        info!("Shutting down RenderLite...");

        // Workers first so nothing publishes into a closed bus.
        for (name, handle) in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!(worker = name, "Worker task panicked: {e}");
            }
        }

        if let Some(state) = self.app_state.take() {
            state.shutdown().await?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
