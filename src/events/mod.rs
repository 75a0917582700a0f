//! Realtime event bus and subscription hub

pub mod bus;
pub mod hub;
pub mod types;

pub use bus::{EventPublisher, EVENTS_CHANNEL};
pub use hub::SubscriptionHub;
pub use types::{Event, MetricsPayload};
