use std::path::Path;
use std::sync::Arc;

use hipsta_config::{ConfigError, LibraryConfig, StoreConfig};
use hipsta_core::{
    EntityStore, Item, ListQuery, StoreError, StoreRole, SyncError, Tag, TagKey, TagState,
};
use tracing::{debug, info, instrument, warn};

use crate::backends::{MemoryStore, SqliteStore};
use crate::coordinator::{Completion, Coordinator};
use crate::remote::{RemoteConfig, RemoteStore};
use crate::sync::{SyncConfig, SyncReport, SyncState};

/// Errors that can occur while opening or using a library.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LibraryError {
    /// Configuration could not be loaded or is invalid.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Point-in-time summary of a library.
#[derive(Debug, Clone)]
pub struct LibraryStatus {
    pub name: Option<String>,
    pub local_kind: &'static str,
    pub remote_kind: &'static str,
    pub items: usize,
    pub unarchived: usize,
    pub unlinked: usize,
    pub tags: usize,
    pub remote_in_flight: usize,
    pub max_passes: u32,
    pub sync_state: SyncState,
}

/// Per-id outcome of a bulk operation.
pub type BulkOutcome = Vec<(String, Completion<Item>)>;

/// A bookmark library: a local store, a queued remote store and the
/// coordinator between them.
pub struct Library {
    name: Option<String>,
    coordinator: Coordinator,
    remote: Arc<RemoteStore>,
    local_kind: &'static str,
    remote_kind: &'static str,
}

fn create_store(role: StoreRole, config: &StoreConfig) -> Result<Arc<dyn EntityStore>, LibraryError> {
    match config {
        StoreConfig::Sqlite(sqlite) => {
            let store = SqliteStore::open(Path::new(&sqlite.path), role)?;
            Ok(Arc::new(store))
        }
        StoreConfig::Memory(memory) => {
            let store = match &memory.id_prefix {
                Some(prefix) => MemoryStore::with_prefix(role, prefix.clone()),
                None => MemoryStore::new(role),
            };
            Ok(Arc::new(store))
        }
    }
}

fn log_phase<T>(operation: &'static str, phase: &'static str, result: &Result<T, StoreError>) {
    match result {
        Ok(_) => debug!(operation, phase, "completed"),
        Err(e) => debug!(operation, phase, error = %e, "failed"),
    }
}

impl Library {
    /// Open a library from a configuration.
    ///
    /// Must be called within a Tokio runtime; the remote worker is spawned here.
    #[instrument(skip(config), fields(name = ?config.name))]
    pub async fn from_config(config: LibraryConfig) -> Result<Self, LibraryError> {
        let effective = config.effective();
        effective.validate_or_err()?;

        let local_config = effective
            .local
            .as_ref()
            .ok_or_else(|| ConfigError::InvalidConfig("no local store configured".to_string()))?;
        let remote_config = effective
            .remote
            .as_ref()
            .ok_or_else(|| ConfigError::InvalidConfig("no remote store configured".to_string()))?;

        let local = create_store(StoreRole::Local, local_config)?;
        let service = create_store(StoreRole::Remote, remote_config)?;
        let remote = Arc::new(RemoteStore::spawn(
            service,
            RemoteConfig {
                latency: remote_config
                    .latency()
                    .map(|l| l.as_duration())
                    .unwrap_or_default(),
            },
        ));

        let sync_config = SyncConfig {
            max_passes: effective.sync.max_passes,
        };
        let coordinator = Coordinator::new(local, remote.clone(), sync_config)
            .with_remote_activity(remote.subscribe());

        let library = Library {
            name: effective.name.clone(),
            coordinator,
            remote,
            local_kind: local_config.kind(),
            remote_kind: remote_config.kind(),
        };
        info!(
            local = library.local_kind,
            remote = library.remote_kind,
            "library opened"
        );

        if effective.sync.on_open {
            if let Err(e) = library.sync().await {
                warn!(error = %e, "sync on open failed");
            }
        }

        Ok(library)
    }

    /// A library with both stores in memory.
    pub async fn in_memory() -> Result<Self, LibraryError> {
        Self::from_config(LibraryConfig::default()).await
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Save a new bookmark. Tag names are validated before anything is written.
    pub async fn add(&self, url: &str, tag_names: &[String]) -> Result<Completion<Item>, LibraryError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(StoreError::Validation("url must not be empty".to_string()).into());
        }
        let tags = tag_names
            .iter()
            .map(|name| Tag::new(name))
            .collect::<Result<Vec<_>, _>>()?;

        let template = Item::new(url).with_tags(tags);
        Ok(self
            .coordinator
            .create(
                Some(template),
                |r| log_phase("create", "quick", &r),
                |r| log_phase("create", "full", &r),
            )
            .await)
    }

    /// Read a bookmark from the local store.
    pub async fn get(&self, local_id: &str) -> Result<Item, StoreError> {
        self.coordinator.local().read(local_id).await
    }

    /// Read a bookmark from both stores.
    pub async fn get_both(&self, local_id: &str) -> Completion<Item> {
        self.coordinator
            .read(
                local_id,
                |r| log_phase("read", "quick", &r),
                |r| log_phase("read", "full", &r),
            )
            .await
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Vec<Item>, StoreError> {
        self.coordinator.all_items(query).await
    }

    /// Archive or unarchive each of the given bookmarks.
    pub async fn set_archived(&self, local_ids: &[String], archived: bool) -> BulkOutcome {
        self.modify_each(local_ids, |item| item.is_archived = archived)
            .await
    }

    /// Apply a tag (created on first use) to each of the given bookmarks.
    pub async fn apply_tag(&self, name: &str, local_ids: &[String]) -> Result<BulkOutcome, StoreError> {
        let tag = self.coordinator.local().ensure_tag(name).await?;
        Ok(self
            .modify_each(local_ids, |item| {
                item.tags.insert(tag.clone());
            })
            .await)
    }

    /// Remove a tag from each of the given bookmarks.
    pub async fn remove_tag(&self, name: &str, local_ids: &[String]) -> Result<BulkOutcome, StoreError> {
        let key = TagKey::normalize(name)?;
        Ok(self
            .modify_each(local_ids, |item| item.tags.retain(|t| t.key != key))
            .await)
    }

    /// Delete a bookmark from both stores.
    pub async fn remove(&self, local_id: &str) -> Completion<()> {
        let item = match self.get(local_id).await {
            Ok(item) => item,
            Err(e) => {
                return Completion {
                    quick: Err(e.clone()),
                    full: Err(e),
                }
            }
        };
        self.coordinator
            .delete(
                item,
                |r| log_phase("delete", "quick", &r),
                |r| log_phase("delete", "full", &r),
            )
            .await
    }

    pub async fn tags(&self) -> Result<Vec<Tag>, StoreError> {
        self.coordinator.tags().await
    }

    /// Get or create a tag in the local store.
    pub async fn create_tag(&self, name: &str) -> Result<Tag, StoreError> {
        self.coordinator.local().ensure_tag(name).await
    }

    /// Strip a tag from every bookmark carrying it, then delete the tag.
    ///
    /// Returns the number of bookmarks that were updated.
    pub async fn delete_tag(&self, name: &str) -> Result<usize, StoreError> {
        let key = TagKey::normalize(name)?;
        let ids = self
            .coordinator
            .local()
            .list(&ListQuery::recently_modified().tagged(key.clone()))
            .await?;
        let outcomes = self
            .modify_each(&ids, |item| item.tags.retain(|t| t.key != key))
            .await;

        self.coordinator.local().delete_tag(&key).await?;
        match self.remote.delete_tag(&key).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(tag = %key, error = %e, "remote tag delete failed"),
        }
        Ok(outcomes.len())
    }

    /// Tri-state of a tag over the given bookmarks.
    pub async fn tag_state(&self, name: &str, local_ids: &[String]) -> Result<TagState, StoreError> {
        let key = TagKey::normalize(name)?;
        self.coordinator.tag_application_state(&key, local_ids).await
    }

    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        self.coordinator.sync().await
    }

    pub async fn status(&self) -> Result<LibraryStatus, StoreError> {
        let local = self.coordinator.local();
        let items = self.coordinator.all_items(&ListQuery::default()).await?;
        let unarchived = items.iter().filter(|i| !i.is_archived).count();
        let unlinked = items.iter().filter(|i| i.remote_id.is_none()).count();
        let tags = local.tags().await?.len();

        Ok(LibraryStatus {
            name: self.name.clone(),
            local_kind: self.local_kind,
            remote_kind: self.remote_kind,
            items: items.len(),
            unarchived,
            unlinked,
            tags,
            remote_in_flight: self.remote.in_flight(),
            max_passes: self.coordinator.sync_config().max_passes,
            sync_state: self.coordinator.sync_state(),
        })
    }

    async fn modify_each<M>(&self, local_ids: &[String], modify: M) -> BulkOutcome
    where
        M: Fn(&mut Item),
    {
        let mut outcomes = Vec::with_capacity(local_ids.len());
        for id in local_ids {
            let mut item = match self.get(id).await {
                Ok(item) => item,
                Err(e) => {
                    outcomes.push((
                        id.clone(),
                        Completion {
                            quick: Err(e.clone()),
                            full: Err(e),
                        },
                    ));
                    continue;
                }
            };
            modify(&mut item);
            let done = self
                .coordinator
                .update(
                    item,
                    |r| log_phase("update", "quick", &r),
                    |r| log_phase("update", "full", &r),
                )
                .await;
            outcomes.push((id.clone(), done));
        }
        outcomes
    }
}
