//! Reconciliation of the local and remote stores.
//!
//! A run reads both stores, diffs them record by record and applies the
//! differences through the store primitives. A pass that applied anything
//! is followed by another read/diff pass; after `max_passes` such passes the
//! run gives up.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use hipsta_core::{require_id, EntityStore, Item, ListQuery, StoreRole, SyncError};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info};

/// Configuration for the syncer.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Apply passes allowed before giving up.
    pub max_passes: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig { max_passes: 3 }
    }
}

/// Where a run currently is.
#[derive(Debug, Clone, Default)]
pub enum SyncState {
    /// No run has started yet.
    #[default]
    Idle,
    /// Reading both stores.
    Reading { pass: u32 },
    /// Comparing the two record sets.
    Diffing { pass: u32 },
    /// Writing the differences.
    Applying { pass: u32, actions: usize },
    /// The last run found both stores equal.
    Converged { passes: u32 },
    /// The last run ended with an error.
    Failed(SyncError),
}

impl SyncState {
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            SyncState::Reading { .. } | SyncState::Diffing { .. } | SyncState::Applying { .. }
        )
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Read/diff passes performed, including the final clean one.
    pub passes: u32,
    /// Actions applied over all passes.
    pub actions_applied: usize,
}

/// One difference between the stores, and how it is resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    /// Local record never reached the remote store.
    PushCreate(Item),
    /// Local record is newer than its remote twin.
    PushUpdate(Item),
    /// Remote twin is newer; copy it onto the local record.
    PullUpdate { local: Item, remote: Item },
    /// Remote twin is gone.
    DeleteLocal(Item),
    /// Remote record nothing local links to.
    PullCreate(Item),
}

/// Compute the actions that bring `local` and `remote` together.
///
/// Whole records are compared. When both sides changed, the newer
/// modification date wins; equal dates favor the local record.
pub fn diff(local: &[Item], remote: &[Item]) -> Vec<SyncAction> {
    let remote_by_id: HashMap<&str, &Item> = remote
        .iter()
        .filter_map(|r| r.remote_id.as_deref().map(|id| (id, r)))
        .collect();
    let mut linked: HashSet<&str> = HashSet::new();
    let mut actions = Vec::new();

    for l in local {
        let Some(remote_id) = l.remote_id.as_deref() else {
            actions.push(SyncAction::PushCreate(l.clone()));
            continue;
        };
        linked.insert(remote_id);
        match remote_by_id.get(remote_id) {
            None => actions.push(SyncAction::DeleteLocal(l.clone())),
            Some(r) if l.same_content(r) => {}
            Some(r) if r.modification_date > l.modification_date => {
                actions.push(SyncAction::PullUpdate {
                    local: l.clone(),
                    remote: (*r).clone(),
                });
            }
            Some(_) => actions.push(SyncAction::PushUpdate(l.clone())),
        }
    }

    for r in remote {
        if let Some(id) = r.remote_id.as_deref() {
            if !linked.contains(id) {
                actions.push(SyncAction::PullCreate(r.clone()));
            }
        }
    }

    actions
}

/// Drives reconciliation runs. Only one run at a time.
pub struct Syncer {
    local: Arc<dyn EntityStore>,
    remote: Arc<dyn EntityStore>,
    config: SyncConfig,
    state: watch::Sender<SyncState>,
    running: Mutex<()>,
}

impl Syncer {
    pub fn new(
        local: Arc<dyn EntityStore>,
        remote: Arc<dyn EntityStore>,
        config: SyncConfig,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Syncer {
            local,
            remote,
            config,
            state,
            running: Mutex::new(()),
        }
    }

    /// Observe run progress.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run until both stores agree, or fail.
    ///
    /// Returns [`SyncError::InProgress`] at once when another run holds the
    /// syncer.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        let _guard = self.running.try_lock().map_err(|_| SyncError::InProgress)?;
        info!(max_passes = self.config.max_passes, "sync started");

        match self.run().await {
            Ok(report) => {
                info!(passes = report.passes, actions = report.actions_applied, "sync converged");
                self.state.send_replace(SyncState::Converged {
                    passes: report.passes,
                });
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "sync failed");
                self.state.send_replace(SyncState::Failed(e.clone()));
                Err(e)
            }
        }
    }

    async fn run(&self) -> Result<SyncReport, SyncError> {
        let mut applied_passes = 0u32;
        let mut actions_applied = 0usize;

        loop {
            let pass = applied_passes + 1;
            self.state.send_replace(SyncState::Reading { pass });
            let local = read_all(self.local.as_ref()).await?;
            let remote = read_all(self.remote.as_ref()).await?;

            self.state.send_replace(SyncState::Diffing { pass });
            let actions = diff(&local, &remote);
            debug!(pass, local = local.len(), remote = remote.len(), actions = actions.len(), "diffed stores");
            if actions.is_empty() {
                return Ok(SyncReport {
                    passes: pass,
                    actions_applied,
                });
            }

            self.state.send_replace(SyncState::Applying {
                pass,
                actions: actions.len(),
            });
            for action in &actions {
                self.apply(action).await?;
            }
            actions_applied += actions.len();
            applied_passes += 1;

            if applied_passes >= self.config.max_passes {
                return Err(SyncError::DidNotConverge {
                    passes: applied_passes,
                });
            }
        }
    }

    async fn apply(&self, action: &SyncAction) -> Result<(), SyncError> {
        let local_err = |e| SyncError::from_store(StoreRole::Local, e);
        let remote_err = |e| SyncError::from_store(StoreRole::Remote, e);

        match action {
            SyncAction::PushCreate(item) => {
                let local_id = require_id(item, StoreRole::Local).map_err(local_err)?;
                let created = self.remote.create(Some(item)).await.map_err(remote_err)?;
                let remote_id = require_id(&created, StoreRole::Remote).map_err(remote_err)?;
                self.local.link(local_id, remote_id).await.map_err(local_err)?;
            }
            SyncAction::PushUpdate(item) => {
                self.remote.update(item).await.map_err(remote_err)?;
            }
            SyncAction::PullUpdate { local, remote } => {
                let mut merged = local.clone();
                merged.copy_content_from(remote);
                self.local.update(&merged).await.map_err(local_err)?;
            }
            SyncAction::DeleteLocal(item) => match self.local.delete(item).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(local_err(e)),
            },
            SyncAction::PullCreate(item) => {
                self.local.create(Some(item)).await.map_err(local_err)?;
            }
        }
        Ok(())
    }
}

/// Every record of a store, newest modification first.
///
/// A record deleted between listing and reading is left out.
async fn read_all(store: &dyn EntityStore) -> Result<Vec<Item>, SyncError> {
    let role = store.role();
    let ids = store
        .list(&ListQuery::recently_modified())
        .await
        .map_err(|e| SyncError::from_store(role, e))?;

    let mut items = Vec::with_capacity(ids.len());
    for id in &ids {
        match store.read(id).await {
            Ok(item) => items.push(item),
            Err(e) if e.is_not_found() => {
                debug!(store = role.as_str(), id = %id, "record vanished while listing");
            }
            Err(e) => return Err(SyncError::from_store(role, e)),
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryStore;
    use chrono::TimeDelta;
    use hipsta_core::Tag;

    fn linked(local_id: &str, remote_id: &str, url: &str) -> Item {
        let mut item = Item::new(url);
        item.local_id = Some(local_id.to_string());
        item.remote_id = Some(remote_id.to_string());
        item
    }

    fn remote_twin(item: &Item) -> Item {
        let mut twin = item.clone();
        twin.local_id = None;
        twin
    }

    #[test]
    fn test_diff_equal_sets_is_empty() {
        let l = linked("L1", "R1", "https://a.example");
        assert!(diff(&[l.clone()], &[remote_twin(&l)]).is_empty());
    }

    #[test]
    fn test_diff_unlinked_local_is_push_create() {
        let mut l = Item::new("https://a.example");
        l.local_id = Some("L1".to_string());
        assert_eq!(diff(&[l.clone()], &[]), vec![SyncAction::PushCreate(l)]);
    }

    #[test]
    fn test_diff_missing_remote_is_delete_local() {
        let l = linked("L1", "R1", "https://a.example");
        assert_eq!(diff(&[l.clone()], &[]), vec![SyncAction::DeleteLocal(l)]);
    }

    #[test]
    fn test_diff_unreferenced_remote_is_pull_create() {
        let mut r = Item::new("https://a.example");
        r.remote_id = Some("R1".to_string());
        assert_eq!(diff(&[], &[r.clone()]), vec![SyncAction::PullCreate(r)]);
    }

    #[test]
    fn test_diff_newer_side_wins() {
        let l = linked("L1", "R1", "https://a.example");
        let mut r = remote_twin(&l);
        r.is_archived = true;
        r.modification_date = l.modification_date + TimeDelta::seconds(1);
        assert!(matches!(
            diff(&[l.clone()], &[r.clone()]).as_slice(),
            [SyncAction::PullUpdate { .. }]
        ));

        let mut newer_local = l.clone();
        newer_local.modification_date = r.modification_date + TimeDelta::seconds(1);
        assert_eq!(
            diff(&[newer_local.clone()], &[r]),
            vec![SyncAction::PushUpdate(newer_local)]
        );
    }

    #[test]
    fn test_diff_equal_dates_favor_local() {
        let l = linked("L1", "R1", "https://a.example");
        let mut r = remote_twin(&l);
        r.tags.insert(Tag::new("other").unwrap());
        assert_eq!(diff(&[l.clone()], &[r]), vec![SyncAction::PushUpdate(l)]);
    }

    #[tokio::test]
    async fn test_sync_state_published() {
        let local: Arc<dyn EntityStore> = Arc::new(MemoryStore::new(StoreRole::Local));
        let remote: Arc<dyn EntityStore> = Arc::new(MemoryStore::new(StoreRole::Remote));
        local.create(Some(&Item::new("https://a.example"))).await.unwrap();

        let syncer = Syncer::new(local, remote, SyncConfig::default());
        let rx = syncer.subscribe();
        assert!(matches!(*rx.borrow(), SyncState::Idle));

        let report = syncer.sync().await.unwrap();
        assert_eq!(report, SyncReport { passes: 2, actions_applied: 1 });
        assert!(matches!(syncer.state(), SyncState::Converged { passes: 2 }));
        assert!(!syncer.state().is_running());
    }

    #[tokio::test]
    async fn test_concurrent_sync_is_rejected() {
        let local: Arc<dyn EntityStore> = Arc::new(MemoryStore::new(StoreRole::Local));
        let remote: Arc<dyn EntityStore> = Arc::new(MemoryStore::new(StoreRole::Remote));
        let syncer = Syncer::new(local, remote, SyncConfig::default());

        let _held = syncer.running.try_lock().unwrap();
        assert!(matches!(syncer.sync().await, Err(SyncError::InProgress)));
    }
}
