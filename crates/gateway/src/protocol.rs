// Lobby WebSocket Protocol
//
// Frame types exchanged with real-time clients.
//
// Protocol flow:
// 1. Client opens a WebSocket on the configured path
// 2. Server sends a "hello" response carrying protocol version and policy
// 3. Client sends requests (presence.connect, presence.subscribe, ...)
// 4. Server pushes events (presence.online, presence.offline, TestMessage, shutdown)

use lobby_presence::PresenceError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Gateway frame - top-level message type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayFrame {
    #[serde(rename = "req")]
    Request(GatewayRequest),

    #[serde(rename = "res")]
    Response(GatewayResponse),

    #[serde(rename = "event")]
    Event(GatewayEvent),
}

/// Request frame from client to gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRequest {
    /// Unique request ID
    pub id: String,

    /// Method name (e.g., "health", "presence.connect", "presence.list")
    pub method: String,

    /// Method parameters
    #[serde(default)]
    pub params: JsonValue,
}

impl GatewayRequest {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: JsonValue) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Deserialize `params` into a method's parameter type
    pub fn parse_params<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(self.params.clone()).map_err(|e| {
            ProtocolError::new(
                ProtocolError::INVALID_REQUEST,
                format!("Invalid params for {}: {}", self.method, e),
            )
        })
    }
}

/// Response frame from gateway to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    /// Request ID being responded to
    pub id: String,

    /// Success flag
    pub ok: bool,

    /// Response payload (if ok)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,

    /// Error details (if not ok)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProtocolError>,
}

impl GatewayResponse {
    pub fn ok(id: String, payload: JsonValue) -> Self {
        Self {
            id,
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn error(id: String, error: ProtocolError) -> Self {
        Self {
            id,
            ok: false,
            payload: None,
            error: Some(error),
        }
    }
}

/// Protocol error type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolError {
    /// Error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Whether the request is retryable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,

    /// Retry after milliseconds (if retryable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl ProtocolError {
    // Standard error codes
    pub const INVALID_REQUEST: &'static str = "INVALID_REQUEST";
    pub const UNAVAILABLE: &'static str = "UNAVAILABLE";
    pub const NOT_FOUND: &'static str = "NOT_FOUND";
    pub const INTERNAL_ERROR: &'static str = "INTERNAL_ERROR";

    /// Suggested back-off after a store failure
    pub const STORE_RETRY_AFTER_MS: u64 = 250;

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: None,
            retry_after_ms: None,
        }
    }

    pub fn with_retryable(mut self, retry_after_ms: u64) -> Self {
        self.retryable = Some(true);
        self.retry_after_ms = Some(retry_after_ms);
        self
    }
}

impl From<PresenceError> for ProtocolError {
    fn from(err: PresenceError) -> Self {
        match &err {
            PresenceError::InvalidIdentifier { .. } => {
                ProtocolError::new(ProtocolError::INVALID_REQUEST, err.to_string())
            }
            PresenceError::Store { .. } => {
                ProtocolError::new(ProtocolError::UNAVAILABLE, err.to_string())
                    .with_retryable(Self::STORE_RETRY_AFTER_MS)
            }
        }
    }
}

/// Event frame pushed from gateway to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    /// Event name (e.g., "presence.online")
    pub event: String,

    /// Event payload
    pub payload: JsonValue,

    /// Tenant the event belongs to; never sent on the wire
    #[serde(skip)]
    pub tenant: Option<String>,
}

impl GatewayEvent {
    pub fn new(event: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            event: event.into(),
            payload,
            tenant: None,
        }
    }

    pub fn for_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }
}

/// Shutdown event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShutdownEvent {
    /// Shutdown reason
    pub reason: String,

    /// Expected restart time (milliseconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_expected_ms: Option<u64>,
}

// ============================================================================
// Method parameters
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub tenant_id: String,
    pub player_id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectParams {
    pub tenant_id: String,
    pub player_id: String,
}

/// Parameters of presence.list and presence.subscribe
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantParams {
    pub tenant_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushParams {
    pub message: String,
}

// ============================================================================
// Hello
// ============================================================================

/// Hello payload sent once per connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloOkPayload {
    /// Protocol version info
    pub protocol: ProtocolVersion,

    /// Server version
    pub version: String,

    /// Connection identifier
    pub connection_id: String,

    /// Gateway policy
    pub policy: GatewayPolicy,
}

/// Protocol version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolVersion {
    /// Minimum supported version
    pub min: u32,

    /// Maximum supported version
    pub max: u32,
}

/// Gateway policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayPolicy {
    /// Maximum payload size
    pub max_payload: usize,

    /// Tenant events require presence.subscribe
    pub require_tenant_subscription: bool,
}
