use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::TimeDelta;
use hipsta_core::{EntityStore, Item, ListQuery, StoreError, StoreRole, SyncError, Tag, TagKey};
use hipsta_sync::{
    Coordinator, MemoryStore, RemoteConfig, RemoteStore, SqliteStore, SyncConfig, SyncReport,
    SyncState,
};

async fn snapshot(store: &dyn EntityStore) -> Vec<Item> {
    let ids = store.list(&ListQuery::recently_modified()).await.unwrap();
    store.read_many(&ids).await.unwrap()
}

/// Every local record is linked to a remote record with the same content,
/// and the remote store holds nothing else.
async fn assert_equivalent(local: &dyn EntityStore, remote: &dyn EntityStore) {
    let local = snapshot(local).await;
    let remote = snapshot(remote).await;
    assert_eq!(local.len(), remote.len());
    for l in &local {
        let twin = remote
            .iter()
            .find(|r| r.remote_id == l.remote_id)
            .unwrap_or_else(|| panic!("no remote twin for {:?}", l.local_id));
        assert!(l.same_content(twin), "{:?} differs from {:?}", l, twin);
    }
}

#[tokio::test]
async fn test_create_then_sync_is_converged() {
    let local = Arc::new(MemoryStore::new(StoreRole::Local));
    let remote = Arc::new(MemoryStore::new(StoreRole::Remote));
    let coordinator = Coordinator::new(local.clone(), remote.clone(), SyncConfig::default());

    let done = coordinator
        .create(Some(Item::new("https://example.com")), |_| {}, |_| {})
        .await;
    let quick = done.quick.unwrap();
    let full = done.full.unwrap();
    assert_eq!(quick.local_id.as_deref(), Some("L1"));
    assert!(quick.remote_id.is_none());
    assert_eq!(full.local_id.as_deref(), Some("L1"));
    assert_eq!(full.remote_id.as_deref(), Some("R1"));

    let report = coordinator.sync().await.unwrap();
    assert_eq!(
        report,
        SyncReport {
            passes: 1,
            actions_applied: 0
        }
    );
}

#[tokio::test]
async fn test_unlinked_local_pushed_in_one_pass() {
    let local = Arc::new(MemoryStore::new(StoreRole::Local));
    let remote = Arc::new(MemoryStore::new(StoreRole::Remote));

    // L1 <-> R1 already in sync, L2 never reached the remote store.
    let l1 = local.create(Some(&Item::new("https://one.example"))).await.unwrap();
    let r1 = remote.create(Some(&l1)).await.unwrap();
    let mut l1 = l1;
    l1.remote_id = r1.remote_id.clone();
    local.update(&l1).await.unwrap();
    local.create(Some(&Item::new("https://two.example"))).await.unwrap();

    let coordinator = Coordinator::new(local.clone(), remote.clone(), SyncConfig::default());
    let report = coordinator.sync().await.unwrap();
    assert_eq!(
        report,
        SyncReport {
            passes: 2,
            actions_applied: 1
        }
    );

    let l2 = local.read("L2").await.unwrap();
    assert_eq!(l2.remote_id.as_deref(), Some("R2"));
    assert_equivalent(local.as_ref(), remote.as_ref()).await;
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    let local = Arc::new(SqliteStore::in_memory(StoreRole::Local).unwrap());
    let service = Arc::new(MemoryStore::new(StoreRole::Remote));
    let remote = Arc::new(RemoteStore::spawn(service.clone(), RemoteConfig::default()));
    let coordinator = Coordinator::new(local.clone(), remote, SyncConfig::default());

    // Diverge in every way the diff knows about.
    let pushed = local
        .create(Some(&Item::new("https://local-only.example")))
        .await
        .unwrap();
    let mut pulled = Item::new("https://remote-only.example")
        .with_tags([Tag::new("Cloud").unwrap()]);
    pulled.is_archived = true;
    service.create(Some(&pulled)).await.unwrap();

    let first = coordinator.sync().await.unwrap();
    assert_eq!(first.actions_applied, 2);

    let second = coordinator.sync().await.unwrap();
    assert_eq!(
        second,
        SyncReport {
            passes: 1,
            actions_applied: 0
        }
    );
    assert!(matches!(
        coordinator.sync_state(),
        SyncState::Converged { passes: 1 }
    ));

    let items = coordinator
        .all_items(&ListQuery::recently_modified())
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
    assert!(items
        .iter()
        .any(|i| i.local_id == pushed.local_id && i.remote_id.is_some()));
    assert!(items
        .iter()
        .any(|i| i.is_archived && i.has_tag(&TagKey::normalize("cloud").unwrap())));
    assert_equivalent(local.as_ref(), service.as_ref()).await;
}

#[tokio::test]
async fn test_newer_remote_edit_is_pulled_and_remote_delete_propagates() {
    let local = Arc::new(MemoryStore::new(StoreRole::Local));
    let remote = Arc::new(MemoryStore::new(StoreRole::Remote));
    let coordinator = Coordinator::new(local.clone(), remote.clone(), SyncConfig::default());

    let keep = coordinator
        .create(Some(Item::new("https://keep.example")), |_| {}, |_| {})
        .await
        .into_result()
        .unwrap();
    let gone = coordinator
        .create(Some(Item::new("https://gone.example")), |_| {}, |_| {})
        .await
        .into_result()
        .unwrap();

    // Another device edits one record and deletes the other.
    let mut edited = remote.read(keep.remote_id.as_deref().unwrap()).await.unwrap();
    edited.url_string = "https://kept.example".to_string();
    edited.modification_date = edited.modification_date + TimeDelta::seconds(5);
    remote.update(&edited).await.unwrap();
    remote.delete(&gone).await.unwrap();

    let report = coordinator.sync().await.unwrap();
    assert_eq!(report.actions_applied, 2);

    let items = snapshot(local.as_ref()).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].url_string, "https://kept.example");
    assert_eq!(items[0].local_id, keep.local_id);
    assert_equivalent(local.as_ref(), remote.as_ref()).await;
}

/// Remote store that accepts updates without keeping them.
struct Forgetful {
    inner: MemoryStore,
    updates: AtomicU32,
}

#[async_trait]
impl EntityStore for Forgetful {
    fn role(&self) -> StoreRole {
        StoreRole::Remote
    }
    async fn create(&self, template: Option<&Item>) -> Result<Item, StoreError> {
        self.inner.create(template).await
    }
    async fn read(&self, id: &str) -> Result<Item, StoreError> {
        self.inner.read(id).await
    }
    async fn update(&self, item: &Item) -> Result<Item, StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(item.clone())
    }
    async fn delete(&self, item: &Item) -> Result<(), StoreError> {
        self.inner.delete(item).await
    }
    async fn list(&self, query: &ListQuery) -> Result<Vec<String>, StoreError> {
        self.inner.list(query).await
    }
    async fn tags(&self) -> Result<Vec<Tag>, StoreError> {
        self.inner.tags().await
    }
    async fn ensure_tag(&self, name: &str) -> Result<Tag, StoreError> {
        self.inner.ensure_tag(name).await
    }
    async fn delete_tag(&self, key: &TagKey) -> Result<(), StoreError> {
        self.inner.delete_tag(key).await
    }
}

#[tokio::test]
async fn test_gives_up_after_three_apply_passes() {
    let local = Arc::new(MemoryStore::new(StoreRole::Local));
    let remote = Arc::new(Forgetful {
        inner: MemoryStore::new(StoreRole::Remote),
        updates: AtomicU32::new(0),
    });

    // Linked pair where the local side is newer and can never be pushed.
    let mut item = local.create(Some(&Item::new("https://a.example"))).await.unwrap();
    let twin = remote.inner.create(Some(&item)).await.unwrap();
    item.remote_id = twin.remote_id;
    item.is_archived = true;
    item.touch();
    local.update(&item).await.unwrap();

    let coordinator = Coordinator::new(local, remote.clone(), SyncConfig::default());
    let err = coordinator.sync().await.unwrap_err();

    assert!(matches!(err, SyncError::DidNotConverge { passes: 3 }));
    assert_eq!(remote.updates.load(Ordering::SeqCst), 3);
    assert!(matches!(
        coordinator.sync_state(),
        SyncState::Failed(SyncError::DidNotConverge { passes: 3 })
    ));
}

#[tokio::test]
async fn test_pass_budget_is_configurable() {
    let local = Arc::new(MemoryStore::new(StoreRole::Local));
    let remote = Arc::new(Forgetful {
        inner: MemoryStore::new(StoreRole::Remote),
        updates: AtomicU32::new(0),
    });
    let mut item = local.create(Some(&Item::new("https://a.example"))).await.unwrap();
    let twin = remote.inner.create(Some(&item)).await.unwrap();
    item.remote_id = twin.remote_id;
    item.touch();
    local.update(&item).await.unwrap();

    let coordinator = Coordinator::new(local, remote.clone(), SyncConfig { max_passes: 1 });
    assert!(matches!(
        coordinator.sync().await,
        Err(SyncError::DidNotConverge { passes: 1 })
    ));
    assert_eq!(remote.updates.load(Ordering::SeqCst), 1);
}

/// Remote service that cannot be reached.
struct Offline;

fn unreachable() -> StoreError {
    StoreError::transport("list", std::io::Error::other("network is unreachable"))
}

#[async_trait]
impl EntityStore for Offline {
    fn role(&self) -> StoreRole {
        StoreRole::Remote
    }
    async fn create(&self, _: Option<&Item>) -> Result<Item, StoreError> {
        Err(unreachable())
    }
    async fn read(&self, _: &str) -> Result<Item, StoreError> {
        Err(unreachable())
    }
    async fn update(&self, _: &Item) -> Result<Item, StoreError> {
        Err(unreachable())
    }
    async fn delete(&self, _: &Item) -> Result<(), StoreError> {
        Err(unreachable())
    }
    async fn list(&self, _: &ListQuery) -> Result<Vec<String>, StoreError> {
        Err(unreachable())
    }
    async fn tags(&self) -> Result<Vec<Tag>, StoreError> {
        Err(unreachable())
    }
    async fn ensure_tag(&self, _: &str) -> Result<Tag, StoreError> {
        Err(unreachable())
    }
    async fn delete_tag(&self, _: &TagKey) -> Result<(), StoreError> {
        Err(unreachable())
    }
}

#[tokio::test]
async fn test_unreachable_remote_fails_sync() {
    let local = Arc::new(MemoryStore::new(StoreRole::Local));
    local.create(Some(&Item::new("https://a.example"))).await.unwrap();
    let remote = RemoteStore::spawn(Arc::new(Offline), RemoteConfig::default());
    let coordinator = Coordinator::new(local.clone(), Arc::new(remote), SyncConfig::default());

    let err = coordinator.sync().await.unwrap_err();
    assert!(matches!(err, SyncError::Remote(StoreError::Transport { .. })));
    assert!(matches!(coordinator.sync_state(), SyncState::Failed(SyncError::Remote(_))));

    // Nothing was written locally.
    assert!(local.read("L1").await.unwrap().remote_id.is_none());
}

/// Remote store whose first create races with a local edit: the user archives
/// L1 while the request is in flight.
struct EditedDuringCreate {
    inner: MemoryStore,
    local: Arc<MemoryStore>,
    edited: AtomicBool,
}

#[async_trait]
impl EntityStore for EditedDuringCreate {
    fn role(&self) -> StoreRole {
        StoreRole::Remote
    }
    async fn create(&self, template: Option<&Item>) -> Result<Item, StoreError> {
        let created = self.inner.create(template).await?;
        if !self.edited.swap(true, Ordering::SeqCst) {
            let mut record = self.local.read("L1").await?;
            record.is_archived = true;
            record.touch();
            self.local.update(&record).await?;
        }
        Ok(created)
    }
    async fn read(&self, id: &str) -> Result<Item, StoreError> {
        self.inner.read(id).await
    }
    async fn update(&self, item: &Item) -> Result<Item, StoreError> {
        self.inner.update(item).await
    }
    async fn delete(&self, item: &Item) -> Result<(), StoreError> {
        self.inner.delete(item).await
    }
    async fn list(&self, query: &ListQuery) -> Result<Vec<String>, StoreError> {
        self.inner.list(query).await
    }
    async fn tags(&self) -> Result<Vec<Tag>, StoreError> {
        self.inner.tags().await
    }
    async fn ensure_tag(&self, name: &str) -> Result<Tag, StoreError> {
        self.inner.ensure_tag(name).await
    }
    async fn delete_tag(&self, key: &TagKey) -> Result<(), StoreError> {
        self.inner.delete_tag(key).await
    }
}

fn edited_during_create(local: &Arc<MemoryStore>) -> Arc<EditedDuringCreate> {
    Arc::new(EditedDuringCreate {
        inner: MemoryStore::new(StoreRole::Remote),
        local: local.clone(),
        edited: AtomicBool::new(false),
    })
}

#[tokio::test]
async fn test_sync_push_keeps_edit_made_during_remote_create() {
    let local = Arc::new(MemoryStore::new(StoreRole::Local));
    let remote = edited_during_create(&local);
    local.create(Some(&Item::new("https://a.example"))).await.unwrap();

    let coordinator = Coordinator::new(local.clone(), remote.clone(), SyncConfig::default());
    let report = coordinator.sync().await.unwrap();

    // Push the record, then push the edit that landed meanwhile.
    assert_eq!(
        report,
        SyncReport {
            passes: 3,
            actions_applied: 2
        }
    );
    let stored = local.read("L1").await.unwrap();
    assert!(stored.is_archived);
    assert_eq!(stored.remote_id.as_deref(), Some("R1"));
    assert!(remote.inner.read("R1").await.unwrap().is_archived);
    assert_equivalent(local.as_ref(), remote.as_ref()).await;
}

#[tokio::test]
async fn test_create_keeps_edit_made_during_remote_create() {
    let local = Arc::new(MemoryStore::new(StoreRole::Local));
    let remote = edited_during_create(&local);
    let coordinator = Coordinator::new(local.clone(), remote.clone(), SyncConfig::default());

    let done = coordinator
        .create(Some(Item::new("https://a.example")), |_| {}, |_| {})
        .await;
    let full = done.full.unwrap();
    assert_eq!(full.local_id.as_deref(), Some("L1"));
    assert_eq!(full.remote_id.as_deref(), Some("R1"));

    let stored = local.read("L1").await.unwrap();
    assert!(stored.is_archived);
    assert!(stored.modification_date > done.quick.unwrap().modification_date);

    let report = coordinator.sync().await.unwrap();
    assert_eq!(report.actions_applied, 1);
    assert!(remote.inner.read("R1").await.unwrap().is_archived);
    assert_equivalent(local.as_ref(), remote.as_ref()).await;
}

/// Local store where a linked record is deleted from both stores right after
/// the first listing, before the syncer reads it.
struct DeletedAfterList {
    inner: MemoryStore,
    remote: Arc<MemoryStore>,
    victim: Mutex<Option<Item>>,
}

#[async_trait]
impl EntityStore for DeletedAfterList {
    fn role(&self) -> StoreRole {
        StoreRole::Local
    }
    async fn create(&self, template: Option<&Item>) -> Result<Item, StoreError> {
        self.inner.create(template).await
    }
    async fn read(&self, id: &str) -> Result<Item, StoreError> {
        self.inner.read(id).await
    }
    async fn update(&self, item: &Item) -> Result<Item, StoreError> {
        self.inner.update(item).await
    }
    async fn delete(&self, item: &Item) -> Result<(), StoreError> {
        self.inner.delete(item).await
    }
    async fn list(&self, query: &ListQuery) -> Result<Vec<String>, StoreError> {
        let ids = self.inner.list(query).await?;
        let victim = self.victim.lock().unwrap().take();
        if let Some(victim) = victim {
            self.inner.delete(&victim).await?;
            self.remote.delete(&victim).await?;
        }
        Ok(ids)
    }
    async fn tags(&self) -> Result<Vec<Tag>, StoreError> {
        self.inner.tags().await
    }
    async fn ensure_tag(&self, name: &str) -> Result<Tag, StoreError> {
        self.inner.ensure_tag(name).await
    }
    async fn delete_tag(&self, key: &TagKey) -> Result<(), StoreError> {
        self.inner.delete_tag(key).await
    }
}

#[tokio::test]
async fn test_record_deleted_during_pass_is_skipped() {
    let remote = Arc::new(MemoryStore::new(StoreRole::Remote));
    let local = Arc::new(DeletedAfterList {
        inner: MemoryStore::new(StoreRole::Local),
        remote: remote.clone(),
        victim: Mutex::new(None),
    });

    let mut linked = Vec::new();
    for url in ["https://kept.example", "https://gone.example"] {
        let l = local.inner.create(Some(&Item::new(url))).await.unwrap();
        let r = remote.create(Some(&l)).await.unwrap();
        let l = local
            .inner
            .link(l.local_id.as_deref().unwrap(), r.remote_id.as_deref().unwrap())
            .await
            .unwrap();
        linked.push(l);
    }
    *local.victim.lock().unwrap() = Some(linked[1].clone());

    let coordinator = Coordinator::new(local.clone(), remote.clone(), SyncConfig::default());
    let report = coordinator.sync().await.unwrap();

    assert_eq!(
        report,
        SyncReport {
            passes: 1,
            actions_applied: 0
        }
    );
    assert_eq!(local.inner.len(), 1);
    assert_eq!(remote.len(), 1);
    assert_equivalent(local.as_ref(), remote.as_ref()).await;
}
