// Key-Value Store Interface
//
// The minimal contract the presence layer needs from a shared store: named
// keys holding either a set of strings or a single string.

use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashSet;

/// One write inside a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvWrite {
    AddMember { key: String, member: String },
    RemoveMember { key: String, member: String },
    Set { key: String, value: String },
    Delete { key: String },
    /// `SET key value` when `member` is in `set_key`, otherwise `DEL key`.
    /// The membership check and the write are one step on atomic backends.
    MirrorMembership {
        set_key: String,
        member: String,
        key: String,
        value: String,
    },
}

/// Shared key-value store.
///
/// Every single-key operation must be atomic on the backend.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Backend name for logs (e.g., "memory", "redis")
    fn backend_name(&self) -> &str;

    /// Add to a set; returns whether the member was new
    async fn add_member(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Remove from a set; returns whether the member was present
    async fn remove_member(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Members of a set; an absent key is the empty set
    async fn members(&self, key: &str) -> Result<HashSet<String>, StoreError>;

    async fn contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self.members(key).await?.contains(member))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Delete a key; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Apply writes in order.
    ///
    /// The default issues one call per write and stops at the first failure,
    /// so earlier writes stay applied. Backends with transactions override
    /// this and report it through [`KeyValueStore::atomic_batches`].
    async fn write_batch(&self, ops: &[KvWrite]) -> Result<(), StoreError> {
        for op in ops {
            apply_write(self, op).await?;
        }
        Ok(())
    }

    /// Whether `write_batch` is all-or-nothing
    fn atomic_batches(&self) -> bool {
        false
    }
}

/// Apply a single write through the per-key operations
pub async fn apply_write<S>(store: &S, op: &KvWrite) -> Result<(), StoreError>
where
    S: KeyValueStore + ?Sized,
{
    match op {
        KvWrite::AddMember { key, member } => store.add_member(key, member).await.map(|_| ()),
        KvWrite::RemoveMember { key, member } => {
            store.remove_member(key, member).await.map(|_| ())
        }
        KvWrite::Set { key, value } => store.set(key, value).await,
        KvWrite::Delete { key } => store.delete(key).await.map(|_| ()),
        KvWrite::MirrorMembership {
            set_key,
            member,
            key,
            value,
        } => {
            if store.contains(set_key, member).await? {
                store.set(key, value).await
            } else {
                store.delete(key).await.map(|_| ())
            }
        }
    }
}
