// Presence Registry
//
// Connect/disconnect semantics for (tenant, player) pairs and the invariant
// tying the two stored facts together:
//
//   player is in OnlineSet(tenant)  <=>  PresenceState(tenant, player) == Online
//
// Both transitions are idempotent. The registry keeps no in-process state, so
// one instance can be shared by any number of concurrent callers.

use crate::error::{PresenceError, StoreError};
use crate::kv::KeyValueStore;
use crate::notifier::{BroadcastChannel, PresenceNotifier};
use crate::reconcile::Reconciler;
use crate::store::PresenceStore;
use crate::types::{
    DisconnectRecord, OnlineListing, PlayerId, PresenceEvent, PresenceRecord, PresenceState,
    TenantId, DISCONNECT_MESSAGE,
};
use lobby_core::Config;
use std::sync::Arc;
use std::time::Duration;

/// Multi-tenant presence registry
#[derive(Clone)]
pub struct PresenceRegistry {
    store: PresenceStore,
    notifier: Option<PresenceNotifier>,
    read_repair: bool,
}

impl PresenceRegistry {
    pub fn new(store: PresenceStore) -> Self {
        Self {
            store,
            notifier: None,
            read_repair: true,
        }
    }

    /// Build a registry from configuration. `channel` is only used when
    /// notifications are enabled.
    pub fn from_config(
        kv: Arc<dyn KeyValueStore>,
        channel: Option<Arc<dyn BroadcastChannel>>,
        config: &Config,
    ) -> Self {
        let store = PresenceStore::new(kv, Duration::from_millis(config.store.op_timeout_ms));
        let mut registry = Self::new(store).with_read_repair(config.presence.read_repair);
        if config.notifier.enabled {
            if let Some(channel) = channel {
                registry = registry.with_notifier(PresenceNotifier::new(
                    channel,
                    Duration::from_millis(config.notifier.publish_timeout_ms),
                ));
            }
        }
        registry
    }

    pub fn with_notifier(mut self, notifier: PresenceNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_read_repair(mut self, enabled: bool) -> Self {
        self.read_repair = enabled;
        self
    }

    pub fn store(&self) -> &PresenceStore {
        &self.store
    }

    pub fn notifier(&self) -> Option<&PresenceNotifier> {
        self.notifier.as_ref()
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.store.clone())
    }

    /// Mark a player online.
    ///
    /// Reconnecting an online player rewrites the same values and emits a
    /// fresh event.
    pub async fn connect(
        &self,
        tenant: &str,
        player: &str,
        display_name: &str,
    ) -> Result<PresenceRecord, PresenceError> {
        let tenant = TenantId::parse(tenant)?;
        let player = PlayerId::parse(player)?;

        self.store
            .write_connect(&tenant, &player)
            .await
            .map_err(|e| store_error(&tenant, Some(&player), "connect", e))?;

        tracing::info!(tenant = %tenant, player = %player, "Player connected");

        if let Some(notifier) = &self.notifier {
            let event = PresenceEvent::new(tenant.clone(), player.clone(), PresenceState::Online)
                .with_display_name(display_name);
            notifier.notify(&event).await;
        }

        Ok(PresenceRecord {
            tenant_id: tenant,
            player_id: player,
            display_name: display_name.to_string(),
            state: PresenceState::Online,
        })
    }

    /// Mark a player offline. Unknown and already-offline players succeed.
    pub async fn disconnect(
        &self,
        tenant: &str,
        player: &str,
    ) -> Result<DisconnectRecord, PresenceError> {
        let tenant = TenantId::parse(tenant)?;
        let player = PlayerId::parse(player)?;

        self.store
            .write_disconnect(&tenant, &player)
            .await
            .map_err(|e| store_error(&tenant, Some(&player), "disconnect", e))?;

        tracing::info!(tenant = %tenant, player = %player, "Player disconnected");

        if let Some(notifier) = &self.notifier {
            let event = PresenceEvent::new(tenant.clone(), player.clone(), PresenceState::Offline);
            notifier.notify(&event).await;
        }

        Ok(DisconnectRecord {
            tenant_id: tenant,
            player_id: player,
            message: DISCONNECT_MESSAGE.to_string(),
        })
    }

    /// Players online for one tenant; empty for tenants never seen
    pub async fn list_online(&self, tenant: &str) -> Result<OnlineListing, PresenceError> {
        let tenant = TenantId::parse(tenant)?;

        let members = self
            .store
            .list_online(&tenant)
            .await
            .map_err(|e| store_error(&tenant, None, "list_online", e))?;

        let mut online_players: Vec<PlayerId> = members.into_iter().collect();
        online_players.sort();
        let count = online_players.len();

        tracing::debug!(tenant = %tenant, count, "Listed online players");

        Ok(OnlineListing {
            tenant_id: tenant,
            online_players,
            count,
        })
    }

    /// Current state of one player.
    ///
    /// With read-repair on, a state that disagrees with set membership is
    /// rewritten to match the set before it is returned. The rewrite checks
    /// membership again as part of the write, so a connect or disconnect
    /// that lands in between wins.
    pub async fn state(&self, tenant: &str, player: &str) -> Result<PresenceState, PresenceError> {
        let tenant = TenantId::parse(tenant)?;
        let player = PlayerId::parse(player)?;
        let fail = |e| store_error(&tenant, Some(&player), "state", e);

        let recorded = self
            .store
            .get_state(&tenant, &player)
            .await
            .map_err(fail)?
            .unwrap_or_default();

        if !self.read_repair {
            return Ok(recorded);
        }

        let member = self
            .store
            .is_online_member(&tenant, &player)
            .await
            .map_err(fail)?;

        match (member, recorded) {
            (true, PresenceState::Offline) | (false, PresenceState::Online) => {
                tracing::warn!(
                    tenant = %tenant,
                    player = %player,
                    member,
                    "Repairing state to match online set"
                );
                let repaired = self
                    .store
                    .repair_state(&tenant, &player)
                    .await
                    .map_err(fail)?;
                Ok(repaired.unwrap_or_default())
            }
            (_, state) => Ok(state),
        }
    }
}

fn store_error(
    tenant: &TenantId,
    player: Option<&PlayerId>,
    operation: &'static str,
    source: StoreError,
) -> PresenceError {
    tracing::error!(
        tenant = %tenant,
        player = player.map(PlayerId::as_str).unwrap_or("-"),
        "Presence {} failed: {}",
        operation,
        source
    );
    PresenceError::Store {
        tenant: tenant.to_string(),
        player: player.map(ToString::to_string),
        operation,
        source,
    }
}
