use std::sync::Arc;

use hipsta_core::{
    require_id, resolve_application_state, EntityStore, Item, ListQuery, StoreError, StoreRole, SyncError,
    Tag, TagKey, TagState,
};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::sync::{SyncConfig, SyncReport, SyncState, Syncer};

/// Both outcomes of a dual-phase operation, as delivered to the callbacks.
#[derive(Debug, Clone)]
pub struct Completion<T> {
    /// Local outcome.
    pub quick: Result<T, StoreError>,
    /// Remote outcome, or the local error when the local half failed.
    pub full: Result<T, StoreError>,
}

impl<T> Completion<T> {
    /// The remote outcome, unless the local half already failed.
    pub fn into_result(self) -> Result<T, StoreError> {
        self.quick?;
        self.full
    }
}

/// Front door for every client operation.
///
/// Each mutation runs against the local store first, reports that through
/// `quick`, then runs against the remote store and reports through `full`.
/// A local failure is reported to both callbacks and the remote store is
/// never called.
pub struct Coordinator {
    local: Arc<dyn EntityStore>,
    remote: Arc<dyn EntityStore>,
    syncer: Syncer,
    remote_activity: Option<watch::Receiver<usize>>,
}

impl Coordinator {
    pub fn new(
        local: Arc<dyn EntityStore>,
        remote: Arc<dyn EntityStore>,
        sync_config: SyncConfig,
    ) -> Self {
        let syncer = Syncer::new(local.clone(), remote.clone(), sync_config);
        Coordinator {
            local,
            remote,
            syncer,
            remote_activity: None,
        }
    }

    /// Count queued remote requests as activity in [`Coordinator::is_syncing`].
    pub fn with_remote_activity(mut self, activity: watch::Receiver<usize>) -> Self {
        self.remote_activity = Some(activity);
        self
    }

    pub fn local(&self) -> &Arc<dyn EntityStore> {
        &self.local
    }

    pub fn remote(&self) -> &Arc<dyn EntityStore> {
        &self.remote
    }

    /// Create an item from `template` (or an empty one).
    ///
    /// Once the remote create succeeds, its identity is recorded on the local
    /// record before `full` fires.
    pub async fn create<Q, F>(&self, template: Option<Item>, quick: Q, full: F) -> Completion<Item>
    where
        Q: FnOnce(Result<Item, StoreError>) + Send,
        F: FnOnce(Result<Item, StoreError>) + Send,
    {
        let local = self.local.create(template.as_ref()).await;
        quick(local.clone());
        let local_item = match local {
            Ok(item) => item,
            Err(e) => return self.local_failed(e, full),
        };

        let result = self.push_new(local_item.clone()).await;
        self.finish("create", local_item.local_id.as_deref(), Ok(local_item.clone()), result, full)
    }

    /// Read an item by local identity, then its remote twin.
    pub async fn read<Q, F>(&self, local_id: &str, quick: Q, full: F) -> Completion<Item>
    where
        Q: FnOnce(Result<Item, StoreError>) + Send,
        F: FnOnce(Result<Item, StoreError>) + Send,
    {
        let local = self.local.read(local_id).await;
        quick(local.clone());
        let local_item = match local {
            Ok(item) => item,
            Err(e) => return self.local_failed(e, full),
        };

        let result = match local_item.remote_id.as_deref() {
            Some(remote_id) => self.remote.read(remote_id).await,
            None => Err(StoreError::not_found(StoreRole::Remote, format!("unlinked:{local_id}"))),
        }
        .map(|mut remote_item| {
            remote_item.local_id = local_item.local_id.clone();
            remote_item
        });
        self.finish("read", Some(local_id), Ok(local_item), result, full)
    }

    /// Write an item's fields to both stores.
    ///
    /// The modification date is refreshed first. An item the remote store
    /// has never seen is created there and linked.
    pub async fn update<Q, F>(&self, mut item: Item, quick: Q, full: F) -> Completion<Item>
    where
        Q: FnOnce(Result<Item, StoreError>) + Send,
        F: FnOnce(Result<Item, StoreError>) + Send,
    {
        item.touch();
        let local = self.local.update(&item).await;
        quick(local.clone());
        let local_item = match local {
            Ok(item) => item,
            Err(e) => return self.local_failed(e, full),
        };

        let result = if local_item.remote_id.is_some() {
            self.remote
                .update(&local_item)
                .await
                .map(|mut remote_item| {
                    remote_item.local_id = local_item.local_id.clone();
                    remote_item
                })
        } else {
            self.push_new(local_item.clone()).await
        };
        self.finish("update", local_item.local_id.as_deref(), Ok(local_item.clone()), result, full)
    }

    /// Delete an item from both stores.
    ///
    /// The remote twin is the one the local record is linked to when the
    /// delete starts, which may be newer than the link `item` carries. A
    /// record already gone from either store counts as deleted.
    pub async fn delete<Q, F>(&self, item: Item, quick: Q, full: F) -> Completion<()>
    where
        Q: FnOnce(Result<(), StoreError>) + Send,
        F: FnOnce(Result<(), StoreError>) + Send,
    {
        let link = match self.current_link(&item).await {
            Ok(link) => link,
            Err(e) => {
                quick(Err(e.clone()));
                return self.local_failed(e, full);
            }
        };

        let local = tolerate_missing(self.local.delete(&item).await);
        quick(local.clone());
        if let Err(e) = local {
            return self.local_failed(e, full);
        }

        let result = match link {
            Some(remote_id) => {
                let mut twin = item.clone();
                twin.remote_id = Some(remote_id);
                tolerate_missing(self.remote.delete(&twin).await)
            }
            None => Ok(()),
        };
        self.finish("delete", item.local_id.as_deref(), Ok(()), result, full)
    }

    /// Items matching `query`, from the local store.
    pub async fn all_items(&self, query: &ListQuery) -> Result<Vec<Item>, StoreError> {
        let ids = self.local.list(query).await?;
        self.local.read_many(&ids).await
    }

    /// Tags, from the local store.
    pub async fn tags(&self) -> Result<Vec<Tag>, StoreError> {
        self.local.tags().await
    }

    /// Tri-state of `tag` over the given local identities.
    pub async fn tag_application_state(
        &self,
        tag: &TagKey,
        local_ids: &[String],
    ) -> Result<TagState, StoreError> {
        resolve_application_state(self.local.as_ref(), tag, local_ids).await
    }

    /// Reconcile both stores.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        self.syncer.sync().await
    }

    pub fn sync_state(&self) -> SyncState {
        self.syncer.state()
    }

    pub fn subscribe_sync(&self) -> watch::Receiver<SyncState> {
        self.syncer.subscribe()
    }

    pub fn sync_config(&self) -> &SyncConfig {
        self.syncer.config()
    }

    /// True while a sync run is active or remote requests are outstanding.
    pub fn is_syncing(&self) -> bool {
        let queued = self
            .remote_activity
            .as_ref()
            .is_some_and(|rx| *rx.borrow() > 0);
        queued || self.syncer.state().is_running()
    }

    /// Create the remote twin of a local record and link the two.
    ///
    /// Only the link is written back, so local edits made while the remote
    /// create was in flight survive.
    async fn push_new(&self, local_item: Item) -> Result<Item, StoreError> {
        let local_id = require_id(&local_item, StoreRole::Local)?;
        let mut remote_item = self.remote.create(Some(&local_item)).await?;
        let remote_id = require_id(&remote_item, StoreRole::Remote)?;
        self.local.link(local_id, remote_id).await?;
        remote_item.local_id = local_item.local_id.clone();
        Ok(remote_item)
    }

    /// The remote identity the stored local record is linked to, falling
    /// back to the one `item` carries.
    async fn current_link(&self, item: &Item) -> Result<Option<String>, StoreError> {
        let Some(local_id) = item.local_id.as_deref() else {
            return Ok(item.remote_id.clone());
        };
        match self.local.read(local_id).await {
            Ok(stored) => Ok(stored.remote_id.or_else(|| item.remote_id.clone())),
            Err(e) if e.is_not_found() => Ok(item.remote_id.clone()),
            Err(e) => Err(e),
        }
    }

    fn local_failed<T, F>(&self, err: StoreError, full: F) -> Completion<T>
    where
        T: Clone,
        F: FnOnce(Result<T, StoreError>),
    {
        debug!(error = %err, "local half failed, remote skipped");
        full(Err(err.clone()));
        Completion {
            quick: Err(err.clone()),
            full: Err(err),
        }
    }

    fn finish<T, F>(
        &self,
        operation: &str,
        local_id: Option<&str>,
        quick: Result<T, StoreError>,
        full_result: Result<T, StoreError>,
        full: F,
    ) -> Completion<T>
    where
        T: Clone,
        F: FnOnce(Result<T, StoreError>),
    {
        if let Err(e) = &full_result {
            warn!(operation, id = local_id.unwrap_or("-"), error = %e, "remote half failed");
        }
        full(full_result.clone());
        Completion {
            quick,
            full: full_result,
        }
    }
}

fn tolerate_missing(result: Result<(), StoreError>) -> Result<(), StoreError> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}
