use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{Item, StoreRole, Tag, TagKey};
use crate::query::ListQuery;

/// One side of the store pair.
///
/// Each returned future is the operation's completion and resolves exactly
/// once, whether the store is an in-process database or a queued network
/// service.
#[async_trait]
pub trait EntityStore: Send + Sync + 'static {
    /// Which identity field of an [`Item`] this store keys on.
    fn role(&self) -> StoreRole;

    /// Human-readable name for logs and status output.
    fn name(&self) -> &str {
        self.role().as_str()
    }

    /// Create a record, copying the template's fields and the other store's
    /// identity. A fresh identity for this store is assigned.
    async fn create(&self, template: Option<&Item>) -> Result<Item, StoreError>;

    /// Read a record by this store's identity.
    async fn read(&self, id: &str) -> Result<Item, StoreError>;

    /// Replace url, archive state, tags and modification date of the record
    /// the item identifies in this store.
    async fn update(&self, item: &Item) -> Result<Item, StoreError>;

    /// Record `remote_id` as the remote twin of the local record `local_id`.
    /// Every other stored field is left as it is.
    async fn link(&self, local_id: &str, remote_id: &str) -> Result<Item, StoreError> {
        let mut record = self.read(local_id).await?;
        record.remote_id = Some(remote_id.to_string());
        self.update(&record).await
    }

    /// Delete the record and its auxiliary data.
    async fn delete(&self, item: &Item) -> Result<(), StoreError>;

    /// Identifiers of the records matching the query, in its order.
    async fn list(&self, query: &ListQuery) -> Result<Vec<String>, StoreError>;

    /// All tags, by display name.
    async fn tags(&self) -> Result<Vec<Tag>, StoreError>;

    /// Get or create the tag for a user-supplied name.
    async fn ensure_tag(&self, name: &str) -> Result<Tag, StoreError>;

    /// Delete a tag and every association to it. Items are kept.
    async fn delete_tag(&self, key: &TagKey) -> Result<(), StoreError>;

    /// Read several records in order, failing on the first error.
    async fn read_many(&self, ids: &[String]) -> Result<Vec<Item>, StoreError> {
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            items.push(self.read(id).await?);
        }
        Ok(items)
    }
}

/// The identity `item` carries for `role`, or `NotFound` when it has none.
pub fn require_id(item: &Item, role: StoreRole) -> Result<&str, StoreError> {
    item.id_for(role)
        .ok_or_else(|| StoreError::not_found(role, "<unlinked>"))
}

/// Order tags the way every store lists them.
pub fn sort_tags(tags: &mut [Tag]) {
    tags.sort_by(|a, b| {
        a.display_name
            .to_lowercase()
            .cmp(&b.display_name.to_lowercase())
            .then_with(|| a.key.cmp(&b.key))
    });
}
