// Reconciliation Sweep
//
// Resolves divergence left behind by partial writes, treating online-set
// membership as authoritative. Stale `Online` states for players outside the
// set cannot be found without a key scan; `PresenceRegistry::state` repairs
// those when they are read.

use crate::error::{PresenceError, StoreError};
use crate::store::PresenceStore;
use crate::types::{PlayerId, PresenceState, TenantId};
use serde::Serialize;

/// Outcome of one sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub tenant_id: TenantId,
    /// Members of the online set at sweep time
    pub members: usize,
    /// Players whose state was rewritten to Online
    pub repaired: Vec<PlayerId>,
}

pub struct Reconciler {
    store: PresenceStore,
}

impl Reconciler {
    pub fn new(store: PresenceStore) -> Self {
        Self { store }
    }

    pub async fn sweep(&self, tenant: &str) -> Result<ReconcileReport, PresenceError> {
        let tenant = TenantId::parse(tenant)?;
        let members = self
            .store
            .list_online(&tenant)
            .await
            .map_err(|e| sweep_error(&tenant, None, e))?;

        let mut players: Vec<PlayerId> = members.into_iter().collect();
        players.sort();

        let mut repaired = Vec::new();
        for player in &players {
            let state = self
                .store
                .get_state(&tenant, player)
                .await
                .map_err(|e| sweep_error(&tenant, Some(player), e))?;
            if state != Some(PresenceState::Online) {
                // membership is checked again inside the write; a player who
                // disconnected since the listing keeps no state
                let now = self
                    .store
                    .repair_state(&tenant, player)
                    .await
                    .map_err(|e| sweep_error(&tenant, Some(player), e))?;
                if now == Some(PresenceState::Online) {
                    repaired.push(player.clone());
                }
            }
        }

        if !repaired.is_empty() {
            tracing::warn!(
                tenant = %tenant,
                repaired = repaired.len(),
                "Reconciliation restored Online state"
            );
        }

        Ok(ReconcileReport {
            tenant_id: tenant,
            members: players.len(),
            repaired,
        })
    }
}

fn sweep_error(tenant: &TenantId, player: Option<&PlayerId>, source: StoreError) -> PresenceError {
    PresenceError::Store {
        tenant: tenant.to_string(),
        player: player.map(ToString::to_string),
        operation: "reconcile",
        source,
    }
}
