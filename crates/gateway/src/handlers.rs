// Gateway Method Handlers
//
// Maps request methods onto the presence registry.

use crate::broadcast::GatewayBroadcaster;
use crate::protocol::{
    ConnectParams, DisconnectParams, GatewayEvent, GatewayRequest, ProtocolError, PushParams,
    TenantParams,
};
use lobby_presence::PresenceRegistry;
use serde::Serialize;
use serde_json::json;
use serde_json::Value as JsonValue;
use std::time::Instant;

/// Event name used by `lobby.push`
pub const TEST_MESSAGE_EVENT: &str = "TestMessage";

pub type HandlerResult = Result<JsonValue, ProtocolError>;

fn to_payload<T: Serialize>(value: T) -> HandlerResult {
    serde_json::to_value(value).map_err(|e| {
        tracing::error!("Failed to encode response payload: {}", e);
        ProtocolError::new(
            ProtocolError::INTERNAL_ERROR,
            format!("Failed to encode response: {}", e),
        )
    })
}

pub struct MethodHandlers {
    registry: PresenceRegistry,
    broadcaster: GatewayBroadcaster,
    started_at: Instant,
}

impl MethodHandlers {
    pub fn new(registry: PresenceRegistry, broadcaster: GatewayBroadcaster) -> Self {
        Self {
            registry,
            broadcaster,
            started_at: Instant::now(),
        }
    }

    pub fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    /// Handle health check
    pub async fn health(&self, _request: &GatewayRequest) -> HandlerResult {
        let notifier = self.registry.notifier();
        Ok(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_ms": self.started_at.elapsed().as_millis() as u64,
            "store": self.registry.store().backend_name(),
            "atomic_writes": self.registry.store().atomic_writes(),
            "connections": self.broadcaster.subscriber_count(),
            "notifications_published": notifier.map(|n| n.published_count()).unwrap_or(0),
            "notifications_failed": notifier.map(|n| n.failure_count()).unwrap_or(0),
        }))
    }

    /// presence.connect
    pub async fn connect(&self, request: &GatewayRequest) -> HandlerResult {
        let params: ConnectParams = request.parse_params()?;
        let record = self
            .registry
            .connect(&params.tenant_id, &params.player_id, &params.name)
            .await?;
        to_payload(record)
    }

    /// presence.disconnect
    pub async fn disconnect(&self, request: &GatewayRequest) -> HandlerResult {
        let params: DisconnectParams = request.parse_params()?;
        let record = self
            .registry
            .disconnect(&params.tenant_id, &params.player_id)
            .await?;
        to_payload(record)
    }

    /// presence.list
    pub async fn list_online(&self, request: &GatewayRequest) -> HandlerResult {
        let params: TenantParams = request.parse_params()?;
        let listing = self.registry.list_online(&params.tenant_id).await?;
        to_payload(listing)
    }

    /// lobby.push - send a message to every connection
    pub async fn push(&self, request: &GatewayRequest) -> HandlerResult {
        let params: PushParams = request.parse_params()?;
        tracing::info!("Push requested: {}", params.message);
        self.broadcaster.send(GatewayEvent::new(
            TEST_MESSAGE_EVENT,
            JsonValue::String(params.message.clone()),
        ));
        Ok(json!({
            "message": "Message sent via gateway",
            "sentMessage": params.message,
        }))
    }
}
