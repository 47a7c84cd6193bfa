//! Live order updates fanned out to WebSocket subscribers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dispatch::DeliveryOffer;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    OrderStatusChanged {
        order_id: Uuid,
        status: String,
    },
    DeliveryFeeComputed {
        order_id: Uuid,
        fee: f64,
        distance_km: f64,
        pickup_order: Vec<Uuid>,
    },
    DriverOffered {
        order_id: Uuid,
        offer: DeliveryOffer,
    },
    NoDriversAvailable {
        order_id: Uuid,
        message: String,
    },
}

impl DispatchEvent {
    pub fn order_id(&self) -> Uuid {
        match self {
            Self::OrderStatusChanged { order_id, .. }
            | Self::DeliveryFeeComputed { order_id, .. }
            | Self::DriverOffered { order_id, .. }
            | Self::NoDriversAvailable { order_id, .. } => *order_id,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DispatchEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Fire-and-forget; an event with nobody listening is dropped.
    pub fn publish(&self, event: DispatchEvent) {
        let order_id = event.order_id();
        match self.sender.send(event) {
            Ok(receivers) => tracing::debug!(%order_id, receivers, "Published dispatch event"),
            Err(_) => tracing::debug!(%order_id, "No subscribers for dispatch event"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.sender.subscribe()
    }
}
