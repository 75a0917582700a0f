//! Application state management

use std::sync::Arc;

use fred::clients::RedisClient;
use fred::interfaces::ClientLike;
use fred::types::{Builder, RedisConfig};
use sqlx::PgPool;
use tracing::info;

use crate::config::Config;
use crate::crypto::SecretBox;
use crate::deploy::PipelineContext;
use crate::docker::{ContainerRuntime, DockerRuntime};
use crate::errors::CoreError;
use crate::events::{EventPublisher, SubscriptionHub};
use crate::ingress::Ingress;
use crate::queue::{JobQueue, BUILD_QUEUE, ROLLBACK_QUEUE};
use crate::store;

/// Main application state
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: PgPool,
    pub redis: RedisClient,
    /// Kept around so the event bridge can build its own subscriber.
    pub redis_config: RedisConfig,
    pub build_queue: JobQueue,
    pub rollback_queue: JobQueue,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub publisher: EventPublisher,
    pub hub: Arc<SubscriptionHub>,
    pub secrets: SecretBox,
}

impl AppState {
    /// Connect every collaborator: store (with migrations), key-value bus,
    /// container runtime.
    pub async fn init(config: Config) -> Result<Self, CoreError> {
        info!("Initializing application state...");

        let pool = store::connect(&config.database_url).await?;

        let redis_config = RedisConfig::from_url(&config.redis_url)?;
        let redis = Builder::from_config(redis_config.clone()).build()?;
        let _ = redis.init().await?;

        let build_queue = JobQueue::new(redis.clone(), BUILD_QUEUE);
        let rollback_queue = JobQueue::new(redis.clone(), ROLLBACK_QUEUE);

        let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::connect(
            &config.docker_network,
            &config.base_domain,
            config.enable_tls,
        )?);

        let publisher = EventPublisher::new(redis.clone());
        let hub = Arc::new(SubscriptionHub::default());
        let secrets = SecretBox::new(&config.encryption_key);

        Ok(Self {
            config: Arc::new(config),
            pool,
            redis,
            redis_config,
            build_queue,
            rollback_queue,
            runtime,
            publisher,
            hub,
            secrets,
        })
    }

    /// Dependencies handed to each pipeline worker.
    pub fn pipeline_context(&self) -> PipelineContext {
        PipelineContext {
            pool: self.pool.clone(),
            runtime: self.runtime.clone(),
            publisher: self.publisher.clone(),
            config: self.config.clone(),
        }
    }

    /// Entry points for the REST collaborator.
    pub fn ingress(&self) -> Ingress {
        Ingress::new(
            self.pool.clone(),
            self.build_queue.clone(),
            self.rollback_queue.clone(),
            self.secrets.clone(),
            self.publisher.clone(),
        )
    }

    /// Release long-lived connections. Workers must be drained first.
    pub async fn shutdown(&self) -> Result<(), CoreError> {
        info!("Shutting down application state...");
        self.redis.quit().await?;
        self.pool.close().await;
        Ok(())
    }
}
