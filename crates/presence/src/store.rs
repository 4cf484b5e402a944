// Presence Store
//
// Maps tenants, players and presence states onto key-value store keys. This
// module owns the key naming scheme and nothing else: no business rules, no
// retries.
//
// Keys:
//   tenant:{tenantId}:players:online          -> set of player ids
//   tenant:{tenantId}:player:{playerId}:state -> "Online" (absent when offline)

use crate::error::StoreError;
use crate::kv::{KeyValueStore, KvWrite};
use crate::types::{PlayerId, PresenceState, TenantId};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub fn online_set_key(tenant: &TenantId) -> String {
    format!("tenant:{}:players:online", tenant)
}

pub fn state_key(tenant: &TenantId, player: &PlayerId) -> String {
    format!("tenant:{}:player:{}:state", tenant, player)
}

/// Domain view over a [`KeyValueStore`]. Cheap to clone.
#[derive(Clone)]
pub struct PresenceStore {
    kv: Arc<dyn KeyValueStore>,
    op_timeout: Duration,
}

impl PresenceStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, op_timeout: Duration) -> Self {
        Self { kv, op_timeout }
    }

    pub fn backend_name(&self) -> &str {
        self.kv.backend_name()
    }

    /// Whether the paired connect/disconnect writes land atomically
    pub fn atomic_writes(&self) -> bool {
        self.kv.atomic_batches()
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                operation,
                timeout_ms: self.op_timeout.as_millis() as u64,
            }),
        }
    }

    pub async fn add_online(&self, tenant: &TenantId, player: &PlayerId) -> Result<(), StoreError> {
        let key = online_set_key(tenant);
        self.bounded("add_online", self.kv.add_member(&key, player.as_str()))
            .await
            .map(|_| ())
    }

    pub async fn remove_online(
        &self,
        tenant: &TenantId,
        player: &PlayerId,
    ) -> Result<(), StoreError> {
        let key = online_set_key(tenant);
        self.bounded("remove_online", self.kv.remove_member(&key, player.as_str()))
            .await
            .map(|_| ())
    }

    pub async fn list_online(&self, tenant: &TenantId) -> Result<HashSet<PlayerId>, StoreError> {
        let key = online_set_key(tenant);
        let members = self.bounded("list_online", self.kv.members(&key)).await?;
        Ok(members.into_iter().map(PlayerId::from_stored).collect())
    }

    pub async fn is_online_member(
        &self,
        tenant: &TenantId,
        player: &PlayerId,
    ) -> Result<bool, StoreError> {
        let key = online_set_key(tenant);
        self.bounded("is_online_member", self.kv.contains(&key, player.as_str()))
            .await
    }

    pub async fn set_state(
        &self,
        tenant: &TenantId,
        player: &PlayerId,
        state: PresenceState,
    ) -> Result<(), StoreError> {
        let key = state_key(tenant, player);
        self.bounded("set_state", self.kv.set(&key, state.as_str()))
            .await
    }

    /// `None` when no state is recorded
    pub async fn get_state(
        &self,
        tenant: &TenantId,
        player: &PlayerId,
    ) -> Result<Option<PresenceState>, StoreError> {
        let key = state_key(tenant, player);
        let raw = self.bounded("get_state", self.kv.get(&key)).await?;
        Ok(raw.map(|value| {
            value.parse().unwrap_or_else(|e| {
                tracing::warn!("{} at {}, reading as Offline", e, key);
                PresenceState::Offline
            })
        }))
    }

    pub async fn clear_state(&self, tenant: &TenantId, player: &PlayerId) -> Result<(), StoreError> {
        let key = state_key(tenant, player);
        self.bounded("clear_state", self.kv.delete(&key))
            .await
            .map(|_| ())
    }

    /// Rewrite the state key to match set membership and return the state
    /// that results. The membership check and the write land together on
    /// atomic backends, so a racing connect or disconnect is never undone.
    pub async fn repair_state(
        &self,
        tenant: &TenantId,
        player: &PlayerId,
    ) -> Result<Option<PresenceState>, StoreError> {
        let ops = [KvWrite::MirrorMembership {
            set_key: online_set_key(tenant),
            member: player.as_str().to_string(),
            key: state_key(tenant, player),
            value: PresenceState::Online.as_str().to_string(),
        }];
        self.bounded("repair_state", self.kv.write_batch(&ops))
            .await?;
        self.get_state(tenant, player).await
    }

    /// State first, then membership
    pub async fn write_connect(
        &self,
        tenant: &TenantId,
        player: &PlayerId,
    ) -> Result<(), StoreError> {
        let ops = [
            KvWrite::Set {
                key: state_key(tenant, player),
                value: PresenceState::Online.as_str().to_string(),
            },
            KvWrite::AddMember {
                key: online_set_key(tenant),
                member: player.as_str().to_string(),
            },
        ];
        self.bounded("write_connect", self.kv.write_batch(&ops))
            .await
    }

    /// Membership first, then state
    pub async fn write_disconnect(
        &self,
        tenant: &TenantId,
        player: &PlayerId,
    ) -> Result<(), StoreError> {
        let ops = [
            KvWrite::RemoveMember {
                key: online_set_key(tenant),
                member: player.as_str().to_string(),
            },
            KvWrite::Delete {
                key: state_key(tenant, player),
            },
        ];
        self.bounded("write_disconnect", self.kv.write_batch(&ops))
            .await
    }
}
