// Lobby Presence
//
// Multi-tenant player presence: which players are online per tenant, kept in
// a shared key-value store, with change notifications fanned out to live
// subscribers.

pub mod error;
pub mod kv;
pub mod memory;
pub mod notifier;
pub mod reconcile;
pub mod redis_store;
pub mod registry;
pub mod store;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{BroadcastError, PresenceError, StoreError};
pub use kv::{KeyValueStore, KvWrite};
pub use memory::InMemoryStore;
pub use notifier::{BroadcastChannel, PresenceNotifier};
pub use reconcile::{ReconcileReport, Reconciler};
pub use redis_store::RedisStore;
pub use registry::PresenceRegistry;
pub use store::PresenceStore;
pub use types::{
    DisconnectRecord, OnlineListing, PlayerId, PresenceEvent, PresenceRecord, PresenceState,
    TenantId,
};
pub use worker::{PresenceWorker, RegistryFactory, StoreRegistryFactory, TenantSnapshot};

use lobby_core::{StoreBackend, StoreConfig};
use std::sync::Arc;

/// Open the key-value backend selected by configuration
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory presence store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StoreBackend::Redis => Ok(Arc::new(RedisStore::connect(&config.redis_url).await?)),
    }
}
