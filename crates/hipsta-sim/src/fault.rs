use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hipsta_core::{EntityStore, Item, ListQuery, StoreError, StoreRole, SyncError, Tag, TagKey};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::Mutex;

/// Prefix used in error messages to distinguish injected faults from real errors.
pub const FAULT_PREFIX: &str = "[fault-injected]";

/// Configuration for fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of failing a request before it reaches the store (0.0-1.0).
    pub error_rate: f64,
}

/// Statistics about injected faults.
#[derive(Debug, Clone, Default)]
pub struct FaultStats {
    pub fault_count: usize,
}

/// A store wrapper that randomly fails requests with transport errors.
///
/// A failed request never reaches the inner store.
pub struct FaultyStore {
    inner: Arc<dyn EntityStore>,
    rng: Mutex<ChaCha8Rng>,
    config: FaultConfig,
    enabled: AtomicBool,
    fault_count: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn EntityStore>, rng: ChaCha8Rng, config: FaultConfig) -> Self {
        FaultyStore {
            inner,
            rng: Mutex::new(rng),
            config,
            enabled: AtomicBool::new(true),
            fault_count: AtomicUsize::new(0),
        }
    }

    pub fn stats(&self) -> FaultStats {
        FaultStats {
            fault_count: self.fault_count.load(Ordering::Relaxed),
        }
    }

    /// Turn injection on or off without touching the RNG stream.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    async fn check(&self, operation: &str) -> Result<(), StoreError> {
        if self.config.error_rate <= 0.0 || !self.enabled.load(Ordering::Relaxed) {
            return Ok(());
        }
        let roll: f64 = self.rng.lock().await.gen();
        if roll >= self.config.error_rate {
            return Ok(());
        }
        self.fault_count.fetch_add(1, Ordering::Relaxed);
        Err(StoreError::transport(
            format!("{} {}", FAULT_PREFIX, operation),
            std::io::Error::other(format!("{} connection reset", FAULT_PREFIX)),
        ))
    }
}

#[async_trait]
impl EntityStore for FaultyStore {
    fn role(&self) -> StoreRole {
        self.inner.role()
    }

    fn name(&self) -> &str {
        "faulty"
    }

    async fn create(&self, template: Option<&Item>) -> Result<Item, StoreError> {
        self.check("create").await?;
        self.inner.create(template).await
    }

    async fn read(&self, id: &str) -> Result<Item, StoreError> {
        self.check("read").await?;
        self.inner.read(id).await
    }

    async fn update(&self, item: &Item) -> Result<Item, StoreError> {
        self.check("update").await?;
        self.inner.update(item).await
    }

    async fn delete(&self, item: &Item) -> Result<(), StoreError> {
        self.check("delete").await?;
        self.inner.delete(item).await
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<String>, StoreError> {
        self.check("list").await?;
        self.inner.list(query).await
    }

    async fn tags(&self) -> Result<Vec<Tag>, StoreError> {
        self.check("tags").await?;
        self.inner.tags().await
    }

    async fn ensure_tag(&self, name: &str) -> Result<Tag, StoreError> {
        self.check("ensure_tag").await?;
        self.inner.ensure_tag(name).await
    }

    async fn delete_tag(&self, key: &TagKey) -> Result<(), StoreError> {
        self.check("delete_tag").await?;
        self.inner.delete_tag(key).await
    }
}

/// Check if a store error was injected by the fault layer.
pub fn is_injected_fault(err: &StoreError) -> bool {
    err.to_string().contains(FAULT_PREFIX)
}

/// Check if a sync failed because of an injected fault.
pub fn is_injected_sync_fault(err: &SyncError) -> bool {
    match err {
        SyncError::Local(e) | SyncError::Remote(e) => is_injected_fault(e),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hipsta_sync::MemoryStore;
    use rand::SeedableRng;

    fn faulty(error_rate: f64) -> FaultyStore {
        FaultyStore::new(
            Arc::new(MemoryStore::new(StoreRole::Remote)),
            ChaCha8Rng::seed_from_u64(7),
            FaultConfig { error_rate },
        )
    }

    #[tokio::test]
    async fn test_always_failing_store_never_reaches_inner() {
        let store = faulty(1.0);
        let err = store.create(Some(&Item::new("https://a.example"))).await.unwrap_err();
        assert!(is_injected_fault(&err));
        assert!(err.is_transient());

        store.set_enabled(false);
        assert!(store.list(&ListQuery::default()).await.unwrap().is_empty());
        assert_eq!(store.stats().fault_count, 1);
    }

    #[tokio::test]
    async fn test_zero_rate_is_transparent() {
        let store = faulty(0.0);
        let item = store.create(Some(&Item::new("https://a.example"))).await.unwrap();
        assert_eq!(item.remote_id.as_deref(), Some("R1"));
        assert_eq!(store.stats().fault_count, 0);
    }

    #[test]
    fn test_real_errors_are_not_faults() {
        let err = StoreError::not_found(StoreRole::Remote, "R1");
        assert!(!is_injected_fault(&err));
        assert!(!is_injected_sync_fault(&SyncError::Remote(err)));
        assert!(!is_injected_sync_fault(&SyncError::InProgress));
    }
}
