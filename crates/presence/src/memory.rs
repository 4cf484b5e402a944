// In-Memory Key-Value Store
//
// Process-local backend with Redis-like semantics: a key holds either a set
// or a string, empty sets disappear, and type mismatches are errors.

use crate::error::StoreError;
use crate::kv::{KeyValueStore, KvWrite};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
enum Entry {
    Set(HashSet<String>),
    Value(String),
}

/// In-memory store. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

fn wrong_type(operation: &'static str, key: &str) -> StoreError {
    StoreError::unavailable(
        operation,
        format!("WRONGTYPE key '{}' holds the wrong kind of value", key),
    )
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub async fn key_count(&self) -> usize {
        self.entries.read().await.len()
    }

    fn apply_locked(entries: &mut HashMap<String, Entry>, op: &KvWrite) -> Result<(), StoreError> {
        match op {
            KvWrite::AddMember { key, member } => {
                Self::add_locked(entries, key, member)?;
            }
            KvWrite::RemoveMember { key, member } => {
                Self::remove_locked(entries, key, member)?;
            }
            KvWrite::Set { key, value } => {
                Self::set_locked(entries, key, value)?;
            }
            KvWrite::Delete { key } => {
                entries.remove(key);
            }
            KvWrite::MirrorMembership {
                set_key,
                member,
                key,
                value,
            } => {
                let is_member = match entries.get(set_key.as_str()) {
                    None => false,
                    Some(Entry::Set(set)) => set.contains(member),
                    Some(Entry::Value(_)) => return Err(wrong_type("mirror_membership", set_key)),
                };
                if is_member {
                    Self::set_locked(entries, key, value)?;
                } else {
                    entries.remove(key);
                }
            }
        }
        Ok(())
    }

    /// Reject a batch that would hit a WRONGTYPE error part way through.
    ///
    /// Only the keys named by `ops` are looked at, tracking what the batch
    /// itself turns into strings or sets.
    fn check_batch(entries: &HashMap<String, Entry>, ops: &[KvWrite]) -> Result<(), StoreError> {
        // key -> holds a string once the ops so far have run
        let mut holds_value: HashMap<&str, bool> = HashMap::new();

        for op in ops {
            match op {
                KvWrite::AddMember { key, .. } | KvWrite::RemoveMember { key, .. } => {
                    if Self::is_value(entries, &holds_value, key) {
                        return Err(wrong_type("write_batch", key));
                    }
                    holds_value.insert(key.as_str(), false);
                }
                KvWrite::Set { key, .. } => {
                    holds_value.insert(key.as_str(), true);
                }
                KvWrite::Delete { key } => {
                    holds_value.insert(key.as_str(), false);
                }
                KvWrite::MirrorMembership { set_key, key, .. } => {
                    if Self::is_value(entries, &holds_value, set_key) {
                        return Err(wrong_type("write_batch", set_key));
                    }
                    // SET or DEL depending on membership; assume the string
                    holds_value.insert(key.as_str(), true);
                }
            }
        }
        Ok(())
    }

    fn is_value(entries: &HashMap<String, Entry>, holds_value: &HashMap<&str, bool>, key: &str) -> bool {
        match holds_value.get(key) {
            Some(value) => *value,
            None => matches!(entries.get(key), Some(Entry::Value(_))),
        }
    }

    fn add_locked(
        entries: &mut HashMap<String, Entry>,
        key: &str,
        member: &str,
    ) -> Result<bool, StoreError> {
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(HashSet::new()));
        match entry {
            Entry::Set(set) => Ok(set.insert(member.to_string())),
            Entry::Value(_) => Err(wrong_type("add_member", key)),
        }
    }

    fn remove_locked(
        entries: &mut HashMap<String, Entry>,
        key: &str,
        member: &str,
    ) -> Result<bool, StoreError> {
        let (removed, now_empty) = match entries.get_mut(key) {
            None => return Ok(false),
            Some(Entry::Value(_)) => return Err(wrong_type("remove_member", key)),
            Some(Entry::Set(set)) => (set.remove(member), set.is_empty()),
        };
        if now_empty {
            entries.remove(key);
        }
        Ok(removed)
    }

    fn set_locked(
        entries: &mut HashMap<String, Entry>,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        // SET replaces whatever the key held, like Redis
        entries.insert(key.to_string(), Entry::Value(value.to_string()));
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn add_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        Self::add_locked(&mut entries, key, member)
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        Self::remove_locked(&mut entries, key, member)
    }

    async fn members(&self, key: &str) -> Result<HashSet<String>, StoreError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            None => Ok(HashSet::new()),
            Some(Entry::Set(set)) => Ok(set.clone()),
            Some(Entry::Value(_)) => Err(wrong_type("members", key)),
        }
    }

    async fn contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            None => Ok(false),
            Some(Entry::Set(set)) => Ok(set.contains(member)),
            Some(Entry::Value(_)) => Err(wrong_type("contains", key)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        Self::set_locked(&mut entries, key, value)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            None => Ok(None),
            Some(Entry::Value(value)) => Ok(Some(value.clone())),
            Some(Entry::Set(_)) => Err(wrong_type("get", key)),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).is_some())
    }

    /// All writes happen under one write lock; on failure nothing is applied.
    async fn write_batch(&self, ops: &[KvWrite]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        Self::check_batch(&entries, ops)?;
        for op in ops {
            Self::apply_locked(&mut entries, op)?;
        }
        Ok(())
    }

    fn atomic_batches(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_operations_are_idempotent() {
        let store = InMemoryStore::new();
        assert!(store.add_member("k", "a").await.unwrap());
        assert!(!store.add_member("k", "a").await.unwrap());
        assert_eq!(store.members("k").await.unwrap().len(), 1);

        assert!(store.remove_member("k", "a").await.unwrap());
        assert!(!store.remove_member("k", "a").await.unwrap());
        assert_eq!(store.key_count().await, 0);
    }

    #[tokio::test]
    async fn test_absent_keys_read_empty() {
        let store = InMemoryStore::new();
        assert!(store.members("nope").await.unwrap().is_empty());
        assert_eq!(store.get("nope").await.unwrap(), None);
        assert!(!store.delete("nope").await.unwrap());
        assert!(!store.contains("nope", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_type_is_error() {
        let store = InMemoryStore::new();
        store.set("k", "v").await.unwrap();
        assert!(store.add_member("k", "a").await.is_err());
        assert!(store.members("k").await.is_err());
    }

    #[tokio::test]
    async fn test_failed_batch_applies_nothing() {
        let store = InMemoryStore::new();
        store.set("str", "v").await.unwrap();

        let ops = vec![
            KvWrite::Set {
                key: "state".to_string(),
                value: "Online".to_string(),
            },
            KvWrite::AddMember {
                key: "str".to_string(),
                member: "p1".to_string(),
            },
        ];
        assert!(store.write_batch(&ops).await.is_err());
        assert_eq!(store.get("state").await.unwrap(), None);
        assert!(store.atomic_batches());
    }

    #[tokio::test]
    async fn test_batch_tracks_types_it_creates() {
        let store = InMemoryStore::new();
        store.set("k", "v").await.unwrap();
        store.add_member("other", "x").await.unwrap();

        // turning a string into a set inside the batch is fine
        let ops = vec![
            KvWrite::Delete { key: "k".to_string() },
            KvWrite::AddMember {
                key: "k".to_string(),
                member: "a".to_string(),
            },
        ];
        store.write_batch(&ops).await.unwrap();
        assert!(store.contains("k", "a").await.unwrap());

        // a set overwritten earlier in the batch cannot take members
        let ops = vec![
            KvWrite::RemoveMember {
                key: "other".to_string(),
                member: "x".to_string(),
            },
            KvWrite::Set {
                key: "k".to_string(),
                value: "v2".to_string(),
            },
            KvWrite::AddMember {
                key: "k".to_string(),
                member: "b".to_string(),
            },
        ];
        assert!(store.write_batch(&ops).await.is_err());
        assert!(store.contains("other", "x").await.unwrap());
        assert!(store.contains("k", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_mirror_membership_follows_the_set() {
        let store = InMemoryStore::new();
        store.add_member("online", "p1").await.unwrap();
        store.set("p2:state", "Online").await.unwrap();

        let mirror = |member: &str| KvWrite::MirrorMembership {
            set_key: "online".to_string(),
            member: member.to_string(),
            key: format!("{}:state", member),
            value: "Online".to_string(),
        };
        store.write_batch(&[mirror("p1"), mirror("p2")]).await.unwrap();

        assert_eq!(store.get("p1:state").await.unwrap().as_deref(), Some("Online"));
        assert_eq!(store.get("p2:state").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mirror_membership_against_string_is_error() {
        let store = InMemoryStore::new();
        store.set("online", "oops").await.unwrap();

        let ops = vec![KvWrite::MirrorMembership {
            set_key: "online".to_string(),
            member: "p1".to_string(),
            key: "p1:state".to_string(),
            value: "Online".to_string(),
        }];
        assert!(store.write_batch(&ops).await.is_err());
        assert_eq!(store.get("p1:state").await.unwrap(), None);
    }
}
