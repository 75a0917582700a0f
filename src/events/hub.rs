//! In-process fan-out to subscribed clients
//!
//! Topic rooms are lazily created broadcast channels. Delivery within one
//! topic preserves publication order per publisher; a slow subscriber that
//! overflows its buffer loses in-flight events and recovers from the
//! deployment row snapshot on reconnect.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::events::types::Event;

const DEFAULT_ROOM_CAPACITY: usize = 256;

/// Topic-room registry for one hub process.
pub struct SubscriptionHub {
    rooms: Mutex<HashMap<String, broadcast::Sender<Event>>>,
    capacity: usize,
}

impl Default for SubscriptionHub {
    fn default() -> Self {
        Self::new(DEFAULT_ROOM_CAPACITY)
    }
}

impl SubscriptionHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Join a topic room, creating it on first use.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Event> {
        let mut rooms = self.rooms.lock().expect("hub lock poisoned");
        rooms
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Route an event into its topic room. Returns the number of subscribers
    /// it reached; empty rooms are pruned.
    pub fn publish_local(&self, event: Event) -> usize {
        let topic = event.topic();
        let mut rooms = self.rooms.lock().expect("hub lock poisoned");
        match rooms.get(&topic) {
            Some(sender) => match sender.send(event) {
                Ok(reached) => reached,
                Err(_) => {
                    // Last receiver is gone; drop the room.
                    rooms.remove(&topic);
                    0
                }
            },
            None => 0,
        }
    }

    /// Number of live subscribers on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let rooms = self.rooms.lock().expect("hub lock poisoned");
        rooms.get(topic).map_or(0, |s| s.receiver_count())
    }

    /// Service ids with at least one live `service:<id>` subscriber. Drives
    /// the metrics sampling set.
    pub fn watched_service_ids(&self) -> Vec<Uuid> {
        let rooms = self.rooms.lock().expect("hub lock poisoned");
        rooms
            .iter()
            .filter(|(_, sender)| sender.receiver_count() > 0)
            .filter_map(|(topic, _)| topic.strip_prefix("service:"))
            .filter_map(|id| Uuid::parse_str(id).ok())
            .collect()
    }
}
