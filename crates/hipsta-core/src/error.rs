use std::error::Error;
use std::sync::Arc;

use crate::model::StoreRole;

/// Shared, cloneable error source.
type Source = Arc<dyn Error + Send + Sync>;

/// Errors returned by an entity store.
///
/// Cloneable so a single local failure can be handed to both completion
/// callbacks of a dual-phase operation.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The record or tag does not exist in this store.
    #[error("Not found in {store} store: {id}")]
    NotFound { store: StoreRole, id: String },

    /// The network-backed service failed.
    #[error("Transport failure during '{operation}': {source}")]
    Transport {
        operation: String,
        #[source]
        source: Source,
    },

    /// Input rejected before any write.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The persistence engine failed.
    #[error("Storage failure in {store} store: {source}")]
    Storage {
        store: StoreRole,
        #[source]
        source: Source,
    },

    /// The store's request queue has shut down.
    #[error("The {store} store is closed")]
    Closed { store: StoreRole },
}

impl StoreError {
    pub fn not_found(store: StoreRole, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            store,
            id: id.into(),
        }
    }

    pub fn transport<E>(operation: impl Into<String>, source: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        StoreError::Transport {
            operation: operation.into(),
            source: Arc::new(source),
        }
    }

    pub fn storage<E>(store: StoreRole, source: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        StoreError::Storage {
            store,
            source: Arc::new(source),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Returns true if this error is transient and the operation may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transport { .. } | StoreError::Closed { .. })
    }
}

/// Errors that end a reconciliation run.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum SyncError {
    /// Reading or writing the local store failed.
    #[error("Local store failed during sync: {0}")]
    Local(#[source] StoreError),

    /// Reading or writing the remote store failed.
    #[error("Remote store failed during sync: {0}")]
    Remote(#[source] StoreError),

    /// Every allowed pass applied changes and the stores still differ.
    #[error("Sync did not converge after {passes} passes")]
    DidNotConverge { passes: u32 },

    /// Another sync holds the syncer.
    #[error("A sync is already in progress")]
    InProgress,
}

impl SyncError {
    /// Wrap a store error on the side it came from.
    pub fn from_store(role: StoreRole, err: StoreError) -> Self {
        match role {
            StoreRole::Local => SyncError::Local(err),
            StoreRole::Remote => SyncError::Remote(err),
        }
    }
}
