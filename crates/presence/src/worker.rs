// Presence Worker
//
// Long-lived background task polling a fixed list of tenants. The worker
// holds a factory, not a registry: every tick builds a fresh registry, uses
// it for that tick only, and drops it.

use crate::kv::KeyValueStore;
use crate::registry::PresenceRegistry;
use lobby_core::{Config, WorkerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Builds a registry for one unit of work
pub trait RegistryFactory: Send + Sync {
    fn create(&self) -> PresenceRegistry;
}

impl<F> RegistryFactory for F
where
    F: Fn() -> PresenceRegistry + Send + Sync,
{
    fn create(&self) -> PresenceRegistry {
        self()
    }
}

/// Factory over a shared store handle. Registries it builds never publish
/// notifications.
pub struct StoreRegistryFactory {
    kv: Arc<dyn KeyValueStore>,
    config: Config,
}

impl StoreRegistryFactory {
    pub fn new(kv: Arc<dyn KeyValueStore>, config: Config) -> Self {
        Self { kv, config }
    }
}

impl RegistryFactory for StoreRegistryFactory {
    fn create(&self) -> PresenceRegistry {
        PresenceRegistry::from_config(self.kv.clone(), None, &self.config)
    }
}

/// What one tick saw for one tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantSnapshot {
    pub tenant: String,
    pub online: usize,
    pub repaired: usize,
}

pub struct PresenceWorker<F: RegistryFactory> {
    factory: F,
    tenants: Vec<String>,
    interval: Duration,
    reconcile: bool,
}

impl<F: RegistryFactory> PresenceWorker<F> {
    pub fn new(factory: F, config: &WorkerConfig) -> Self {
        Self {
            factory,
            tenants: config.tenants.clone(),
            interval: Duration::from_millis(config.interval_ms),
            reconcile: config.reconcile,
        }
    }

    /// Run until `shutdown` flips to true or its sender is dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Presence worker started: {} tenant(s), every {:?}",
            self.tenants.len(),
            self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Presence worker stopped");
    }

    /// One tick over every tenant. Failed tenants are logged and skipped.
    pub async fn run_once(&self) -> Vec<TenantSnapshot> {
        let registry = self.factory.create();
        let mut snapshots = Vec::with_capacity(self.tenants.len());

        for tenant in &self.tenants {
            let repaired = if self.reconcile {
                match registry.reconciler().sweep(tenant).await {
                    Ok(report) => report.repaired.len(),
                    Err(e) => {
                        tracing::error!(tenant = %tenant, "Reconciliation failed: {}", e);
                        continue;
                    }
                }
            } else {
                0
            };

            match registry.list_online(tenant).await {
                Ok(listing) => {
                    tracing::info!(
                        tenant = %tenant,
                        count = listing.count,
                        "Polling presence - players in lobby"
                    );
                    snapshots.push(TenantSnapshot {
                        tenant: tenant.clone(),
                        online: listing.count,
                        repaired,
                    });
                }
                Err(e) => {
                    tracing::error!(tenant = %tenant, "Polling failed: {}", e);
                }
            }
        }

        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KeyValueStore;
    use crate::memory::InMemoryStore;
    use crate::store::PresenceStore;
    use crate::test_support::FlakyStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn worker_config(tenants: &[&str]) -> WorkerConfig {
        WorkerConfig {
            enabled: true,
            interval_ms: 10,
            tenants: tenants.iter().map(|t| t.to_string()).collect(),
            reconcile: true,
        }
    }

    #[tokio::test]
    async fn test_fresh_registry_per_tick() {
        let kv = InMemoryStore::new();
        let created = Arc::new(AtomicUsize::new(0));
        let factory = {
            let created = created.clone();
            let kv = kv.clone();
            move || {
                created.fetch_add(1, Ordering::SeqCst);
                PresenceRegistry::new(PresenceStore::new(
                    Arc::new(kv.clone()),
                    Duration::from_secs(1),
                ))
            }
        };
        let worker = PresenceWorker::new(factory, &worker_config(&["acme"]));

        worker.run_once().await;
        worker.run_once().await;
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_once_counts_and_repairs() {
        let kv = InMemoryStore::new();
        kv.add_member("tenant:acme:players:online", "p1").await.unwrap();
        let factory = StoreRegistryFactory::new(Arc::new(kv.clone()), Config::default());
        let worker = PresenceWorker::new(factory, &worker_config(&["acme", "empty"]));

        let snapshots = worker.run_once().await;
        assert_eq!(
            snapshots,
            vec![
                TenantSnapshot {
                    tenant: "acme".to_string(),
                    online: 1,
                    repaired: 1
                },
                TenantSnapshot {
                    tenant: "empty".to_string(),
                    online: 0,
                    repaired: 0
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_tenant_does_not_stop_tick() {
        let kv = InMemoryStore::new();
        kv.add_member("tenant:acme:players:online", "p1").await.unwrap();
        kv.set("tenant:acme:player:p1:state", "Online").await.unwrap();
        let factory = StoreRegistryFactory::new(Arc::new(kv), Config::default());
        // "bad:tenant" fails before any store access; the tick moves on
        let worker = PresenceWorker::new(factory, &worker_config(&["bad:tenant", "acme", " "]));

        assert_eq!(
            worker.run_once().await,
            vec![TenantSnapshot {
                tenant: "acme".to_string(),
                online: 1,
                repaired: 0
            }]
        );
    }

    #[tokio::test]
    async fn test_store_failure_yields_no_snapshots() {
        let flaky = Arc::new(FlakyStore::default());
        flaky.fail("members");
        let factory = StoreRegistryFactory::new(flaky, Config::default());
        let worker = PresenceWorker::new(factory, &worker_config(&["acme", "globex"]));

        assert!(worker.run_once().await.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let created = Arc::new(AtomicUsize::new(0));
        let factory = {
            let created = created.clone();
            move || {
                created.fetch_add(1, Ordering::SeqCst);
                PresenceRegistry::new(PresenceStore::new(
                    Arc::new(InMemoryStore::new()),
                    Duration::from_secs(1),
                ))
            }
        };
        let worker = PresenceWorker::new(factory, &worker_config(&["acme"]));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(worker.run(rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
        assert!(created.load(Ordering::SeqCst) >= 1);
    }
}
