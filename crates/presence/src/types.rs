// Presence Domain Types
//
// Identifiers, the two-valued presence state, and the records handed back to
// callers of the registry.

use crate::error::PresenceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Message returned by every successful disconnect
pub const DISCONNECT_MESSAGE: &str = "Player disconnected successfully.";

/// Isolated namespace, e.g. one game publisher.
///
/// Never empty, and never contains `:` so a tenant id cannot reach into
/// another tenant's keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn parse(id: &str) -> Result<Self, PresenceError> {
        if id.trim().is_empty() {
            return Err(PresenceError::invalid("tenantId", "cannot be empty"));
        }
        if id.contains(':') {
            return Err(PresenceError::invalid(
                "tenantId",
                format!("'{}' must not contain ':'", id),
            ));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Player identifier, unique within one tenant only
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn parse(id: &str) -> Result<Self, PresenceError> {
        if id.trim().is_empty() {
            return Err(PresenceError::invalid("playerId", "cannot be empty"));
        }
        Ok(Self(id.to_string()))
    }

    /// Wrap a member read back from the online set
    pub(crate) fn from_stored(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Presence of one player. A player with no recorded state is `Offline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PresenceState {
    Online,
    #[default]
    Offline,
}

impl PresenceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "Online",
            Self::Offline => "Offline",
        }
    }
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Online" => Ok(Self::Online),
            "Offline" => Ok(Self::Offline),
            other => Err(format!("unknown presence state '{}'", other)),
        }
    }
}

/// Result of a connect
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub tenant_id: TenantId,
    pub player_id: PlayerId,
    pub display_name: String,
    pub state: PresenceState,
}

/// Result of a disconnect
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectRecord {
    pub tenant_id: TenantId,
    pub player_id: PlayerId,
    pub message: String,
}

/// Players currently online for one tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineListing {
    pub tenant_id: TenantId,
    /// Sorted for stable output
    pub online_players: Vec<PlayerId>,
    pub count: usize,
}

impl OnlineListing {
    pub fn contains(&self, player: &str) -> bool {
        self.online_players.iter().any(|p| p.as_str() == player)
    }
}

/// A presence transition, emitted once per successful connect/disconnect
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEvent {
    pub tenant_id: TenantId,
    pub player_id: PlayerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub state: PresenceState,
    pub timestamp: DateTime<Utc>,
}

impl PresenceEvent {
    pub const ONLINE: &'static str = "presence.online";
    pub const OFFLINE: &'static str = "presence.offline";

    pub fn new(tenant_id: TenantId, player_id: PlayerId, state: PresenceState) -> Self {
        Self {
            tenant_id,
            player_id,
            display_name: None,
            state,
            timestamp: Utc::now(),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Broadcast event name for this transition
    pub fn event_name(&self) -> &'static str {
        match self.state {
            PresenceState::Online => Self::ONLINE,
            PresenceState::Offline => Self::OFFLINE,
        }
    }
}
