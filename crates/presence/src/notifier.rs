// Presence Notifications
//
// Turns registry transitions into broadcast events. Publishing is best
// effort: one bounded attempt, failures are logged and counted.

use crate::error::BroadcastError;
use crate::types::PresenceEvent;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Real-time fan-out to every currently connected subscriber.
///
/// At-most-once, no replay for subscribers that join later, no ordering
/// across subscribers.
#[async_trait]
pub trait BroadcastChannel: Send + Sync {
    async fn publish(&self, event: &str, payload: JsonValue) -> Result<(), BroadcastError>;
}

/// Publishes [`PresenceEvent`]s on a [`BroadcastChannel`]
#[derive(Clone)]
pub struct PresenceNotifier {
    channel: Arc<dyn BroadcastChannel>,
    publish_timeout: Duration,
    published: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
}

impl PresenceNotifier {
    pub fn new(channel: Arc<dyn BroadcastChannel>, publish_timeout: Duration) -> Self {
        Self {
            channel,
            publish_timeout,
            published: Arc::new(AtomicU64::new(0)),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish one event. Returns whether the channel accepted it.
    pub async fn notify(&self, event: &PresenceEvent) -> bool {
        let name = event.event_name();
        match self.try_publish(name, event).await {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    "Published {} for {}/{}",
                    name,
                    event.tenant_id,
                    event.player_id
                );
                true
            }
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    tenant = %event.tenant_id,
                    player = %event.player_id,
                    failures,
                    "Presence notification dropped: {}",
                    e
                );
                false
            }
        }
    }

    async fn try_publish(&self, name: &str, event: &PresenceEvent) -> Result<(), BroadcastError> {
        let payload = serde_json::to_value(event).map_err(|e| BroadcastError::PublishFailed {
            event: name.to_string(),
            reason: e.to_string(),
        })?;

        match tokio::time::timeout(self.publish_timeout, self.channel.publish(name, payload)).await
        {
            Ok(result) => result,
            Err(_) => Err(BroadcastError::Timeout {
                event: name.to_string(),
                timeout_ms: self.publish_timeout.as_millis() as u64,
            }),
        }
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
