//! Publishing side of the realtime channel
//!
//! Workers do not share memory with the subscription hub, which lives in the
//! REST/WS process. All events cross one pub/sub channel on the key-value
//! bus; each hub process runs exactly one subscriber that re-emits into its
//! local topic rooms.

use fred::clients::RedisClient;
use fred::interfaces::PubsubInterface;
use tracing::warn;

use crate::errors::CoreError;
use crate::events::types::Event;

/// The single shared pub/sub channel.
pub const EVENTS_CHANNEL: &str = "renderlite:realtime:events";

/// Fire-and-forget event publisher used by workers and sweeps.
#[derive(Clone)]
pub struct EventPublisher {
    client: RedisClient,
}

impl EventPublisher {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    /// Publish one event onto the shared channel. Per-publisher order on a
    /// single topic is preserved by the bus.
    pub async fn publish(&self, event: &Event) -> Result<(), CoreError> {
        let payload = serde_json::to_string(event)?;
        let _: i64 = self.client.publish(EVENTS_CHANNEL, payload).await?;
        Ok(())
    }

    /// Publish, logging instead of propagating failures. Event delivery is
    /// best-effort; the deployment row keeps the durable record.
    pub async fn publish_best_effort(&self, event: &Event) {
        if let Err(e) = self.publish(event).await {
            warn!(topic = %event.topic(), "Failed to publish event: {e}");
        }
    }
}
