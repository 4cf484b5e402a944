// Gateway Broadcast Channel
//
// Fans events out to every live WebSocket connection through a
// tokio broadcast channel. Connections that join later see nothing earlier.

use crate::protocol::GatewayEvent;
use async_trait::async_trait;
use lobby_presence::{BroadcastChannel, BroadcastError};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

#[derive(Clone)]
pub struct GatewayBroadcaster {
    tx: broadcast::Sender<GatewayEvent>,
}

impl GatewayBroadcaster {
    /// `capacity` events are buffered per subscriber before it lags
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Wait until every connection has taken all queued events, or until
    /// `timeout` passes. Returns whether the queue emptied.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.tx.is_empty() {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    /// Send a prepared event. Having no subscribers is not an error.
    pub fn send(&self, event: GatewayEvent) {
        let name = event.event.clone();
        match self.tx.send(event) {
            Ok(receivers) => tracing::debug!("Broadcast {} to {} connection(s)", name, receivers),
            Err(_) => tracing::debug!("Broadcast {} dropped: no connections", name),
        }
    }
}

#[async_trait]
impl BroadcastChannel for GatewayBroadcaster {
    async fn publish(&self, event: &str, payload: JsonValue) -> Result<(), BroadcastError> {
        let tenant = payload
            .get("tenantId")
            .and_then(|t| t.as_str())
            .map(ToString::to_string);

        let mut gateway_event = GatewayEvent::new(event, payload);
        gateway_event.tenant = tenant;
        self.send(gateway_event);
        Ok(())
    }
}
