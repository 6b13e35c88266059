use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Shared channel for privileged observers; regular users get a channel
/// named after their user id.
pub const OBSERVERS_CHANNEL: &str = "observers";

const CHANNEL_CAPACITY: usize = 256;

/// Derived events pushed to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    PositionUpdate {
        vehicle_id: Uuid,
        vehicle_name: String,
        status: String,
        lat: f64,
        lon: f64,
        speed: f64,
        heading: Option<f64>,
        timestamp: DateTime<Utc>,
    },
    Alert {
        vehicle_id: Uuid,
        vehicle_name: String,
        alert_type: String,
        message: String,
        location: String,
        data: Value,
        timestamp: DateTime<Utc>,
    },
    GeofenceTransition {
        vehicle_id: Uuid,
        geofence_id: Uuid,
        geofence_name: String,
        entered: bool,
        timestamp: DateTime<Utc>,
    },
}

/// In-process fan-out hub. Channels are created on first subscribe; a
/// publish to a channel nobody joined is dropped on the floor, which is
/// exactly the fire-and-forget contract the pipeline needs.
#[derive(Default)]
pub struct Hub {
    channels: RwLock<HashMap<String, broadcast::Sender<Event>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, channel: &str) -> broadcast::Receiver<Event> {
        let mut channels = self.channels.write().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish to one channel. Lagging or absent subscribers are ignored.
    pub async fn publish(&self, channel: &str, event: Event) {
        let channels = self.channels.read().await;
        if let Some(sender) = channels.get(channel) {
            let _ = sender.send(event);
        }
    }

    /// Publish a vehicle-scoped event to its owner and to the privileged
    /// observers.
    pub async fn publish_for_owner(&self, owner: Uuid, event: Event) {
        self.publish(&owner.to_string(), event.clone()).await;
        self.publish(OBSERVERS_CHANNEL, event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn position_event(vehicle_id: Uuid) -> Event {
        Event::PositionUpdate {
            vehicle_id,
            vehicle_name: "van-7".into(),
            status: "moving".into(),
            lat: 20.0,
            lon: -100.0,
            speed: 40.0,
            heading: Some(90.0),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn owner_and_observers_both_receive() {
        let hub = Hub::new();
        let owner = Uuid::new_v4();
        let mut owner_rx = hub.subscribe(&owner.to_string()).await;
        let mut observers_rx = hub.subscribe(OBSERVERS_CHANNEL).await;

        hub.publish_for_owner(owner, position_event(Uuid::new_v4())).await;

        assert!(matches!(owner_rx.recv().await, Ok(Event::PositionUpdate { .. })));
        assert!(matches!(observers_rx.recv().await, Ok(Event::PositionUpdate { .. })));
    }

    #[tokio::test]
    async fn other_users_do_not_receive() {
        let hub = Hub::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut other_rx = hub.subscribe(&other.to_string()).await;

        hub.publish_for_owner(owner, position_event(Uuid::new_v4())).await;

        assert!(matches!(
            other_rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let hub = Hub::new();
        hub.publish_for_owner(Uuid::new_v4(), position_event(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn events_serialize_with_a_tag() {
        let json = serde_json::to_value(position_event(Uuid::new_v4())).unwrap();
        assert_eq!(json["event"], "position_update");
        assert_eq!(json["speed"], 40.0);
    }
}
