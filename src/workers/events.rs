//! Event-bridge worker
//!
//! One Redis subscriber per hub process: consumes the shared realtime
//! channel and re-emits every event into the local topic rooms. Workers in
//! other processes publish onto the same channel, which is what gives
//! subscribers a cross-process view.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use fred::clients::SubscriberClient;
use fred::interfaces::{ClientLike, EventInterface, PubsubInterface};
use fred::types::{Builder, RedisConfig};
use tracing::{debug, error, info, warn};

use crate::events::{Event, SubscriptionHub, EVENTS_CHANNEL};

/// Event-bridge worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Delay before reconnecting after a bus failure.
    pub reconnect_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

/// Run the bridge until shutdown.
pub async fn run(
    options: &Options,
    redis_config: RedisConfig,
    hub: Arc<SubscriptionHub>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!("Event bridge starting...");

    loop {
        let subscriber = match connect(&redis_config).await {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to connect event subscriber: {e}");
                tokio::select! {
                    _ = &mut shutdown_signal => break,
                    _ = tokio::time::sleep(options.reconnect_delay) => continue,
                }
            }
        };

        info!(channel = EVENTS_CHANNEL, "Event bridge subscribed");
        let mut messages = subscriber.message_rx();

        loop {
            tokio::select! {
                _ = &mut shutdown_signal => {
                    let _: Result<(), _> = subscriber.unsubscribe(EVENTS_CHANNEL).await;
                    let _ = subscriber.quit().await;
                    info!("Event bridge shutting down...");
                    return;
                }
                message = messages.recv() => {
                    match message {
                        Ok(message) => {
                            let Ok(payload) = message.value.convert::<String>() else {
                                warn!("Dropping non-string bus message");
                                continue;
                            };
                            match serde_json::from_str::<Event>(&payload) {
                                Ok(event) => {
                                    let reached = hub.publish_local(event);
                                    debug!(reached, "Bridged event to local rooms");
                                }
                                Err(e) => warn!("Dropping undecodable event: {e}"),
                            }
                        }
                        Err(e) => {
                            warn!("Event subscriber stream broke: {e}, reconnecting...");
                            break;
                        }
                    }
                }
            }
        }

        tokio::select! {
            _ = &mut shutdown_signal => break,
            _ = tokio::time::sleep(options.reconnect_delay) => {}
        }
    }

    info!("Event bridge stopped");
}

async fn connect(config: &RedisConfig) -> Result<SubscriberClient, fred::error::RedisError> {
    let subscriber = Builder::from_config(config.clone()).build_subscriber_client()?;
    subscriber.init().await?;
    subscriber.subscribe(EVENTS_CHANNEL).await?;
    Ok(subscriber)
}
