// Test doubles shared by the unit tests of this crate.

use crate::error::{BroadcastError, StoreError};
use crate::kv::{KeyValueStore, KvWrite};
use crate::memory::InMemoryStore;
use crate::notifier::BroadcastChannel;
use crate::registry::PresenceRegistry;
use crate::store::PresenceStore;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;

/// Keeps every published event
#[derive(Default)]
pub struct RecordingChannel {
    events: Mutex<Vec<(String, JsonValue)>>,
}

impl RecordingChannel {
    pub async fn events(&self) -> Vec<(String, JsonValue)> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl BroadcastChannel for RecordingChannel {
    async fn publish(&self, event: &str, payload: JsonValue) -> Result<(), BroadcastError> {
        self.events.lock().await.push((event.to_string(), payload));
        Ok(())
    }
}

/// Rejects every publish
pub struct FailingChannel;

#[async_trait]
impl BroadcastChannel for FailingChannel {
    async fn publish(&self, event: &str, _payload: JsonValue) -> Result<(), BroadcastError> {
        Err(BroadcastError::PublishFailed {
            event: event.to_string(),
            reason: "transport down".to_string(),
        })
    }
}

/// Never completes a publish
pub struct HangingChannel;

#[async_trait]
impl BroadcastChannel for HangingChannel {
    async fn publish(&self, _event: &str, _payload: JsonValue) -> Result<(), BroadcastError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// In-memory store without atomic batches whose operations can be made to
/// fail or hang by name.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    failing: StdMutex<HashSet<&'static str>>,
    hanging: StdMutex<HashSet<&'static str>>,
}

impl FlakyStore {
    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn hang(&self, operation: &'static str) {
        self.hanging.lock().unwrap().insert(operation);
    }

    async fn check(&self, operation: &'static str) -> Result<(), StoreError> {
        let hangs = self.hanging.lock().unwrap().contains(operation);
        if hangs {
            std::future::pending::<()>().await;
        }
        if self.failing.lock().unwrap().contains(operation) {
            return Err(StoreError::unavailable(operation, "connection reset"));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    fn backend_name(&self) -> &str {
        "flaky"
    }

    async fn add_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.check("add_member").await?;
        self.inner.add_member(key, member).await
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.check("remove_member").await?;
        self.inner.remove_member(key, member).await
    }

    async fn members(&self, key: &str) -> Result<HashSet<String>, StoreError> {
        self.check("members").await?;
        self.inner.members(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check("set").await?;
        self.inner.set(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check("get").await?;
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check("delete").await?;
        self.inner.delete(key).await
    }
}

/// A transition run by [`InterleavingStore`]
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Connect,
    Disconnect,
}

/// Atomic in-memory store that, once armed, runs presence transitions for one
/// player around the next call to a chosen operation. The transitions go
/// through a second registry over the same data, as another client would.
pub struct InterleavingStore {
    pub inner: InMemoryStore,
    other: PresenceRegistry,
    tenant: &'static str,
    player: &'static str,
    trigger: &'static str,
    before: Vec<Step>,
    after: Vec<Step>,
    armed: AtomicBool,
}

impl InterleavingStore {
    pub fn new(tenant: &'static str, player: &'static str, trigger: &'static str) -> Self {
        let inner = InMemoryStore::new();
        let other = PresenceRegistry::new(PresenceStore::new(
            Arc::new(inner.clone()),
            Duration::from_secs(1),
        ));
        Self {
            inner,
            other,
            tenant,
            player,
            trigger,
            before: Vec::new(),
            after: Vec::new(),
            armed: AtomicBool::new(false),
        }
    }

    pub fn before(mut self, steps: &[Step]) -> Self {
        self.before = steps.to_vec();
        self
    }

    pub fn after(mut self, steps: &[Step]) -> Self {
        self.after = steps.to_vec();
        self
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    async fn run(&self, steps: &[Step]) {
        for step in steps {
            match step {
                Step::Connect => {
                    self.other.connect(self.tenant, self.player, "").await.unwrap();
                }
                Step::Disconnect => {
                    self.other.disconnect(self.tenant, self.player).await.unwrap();
                }
            }
        }
    }

    async fn around<T>(&self, operation: &'static str, call: impl Future<Output = T>) -> T {
        let fire = operation == self.trigger && self.armed.swap(false, Ordering::SeqCst);
        if fire {
            self.run(&self.before).await;
        }
        let result = call.await;
        if fire {
            self.run(&self.after).await;
        }
        result
    }
}

#[async_trait]
impl KeyValueStore for InterleavingStore {
    fn backend_name(&self) -> &str {
        "interleaving"
    }

    async fn add_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.around("add_member", self.inner.add_member(key, member)).await
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.around("remove_member", self.inner.remove_member(key, member)).await
    }

    async fn members(&self, key: &str) -> Result<HashSet<String>, StoreError> {
        self.around("members", self.inner.members(key)).await
    }

    async fn contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.around("contains", self.inner.contains(key, member)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.around("set", self.inner.set(key, value)).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.around("get", self.inner.get(key)).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.around("delete", self.inner.delete(key)).await
    }

    async fn write_batch(&self, ops: &[KvWrite]) -> Result<(), StoreError> {
        self.around("write_batch", self.inner.write_batch(ops)).await
    }

    fn atomic_batches(&self) -> bool {
        true
    }
}
