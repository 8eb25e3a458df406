use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use hipsta_core::{
    require_id, sort_tags, EntityStore, Item, ListQuery, StoreError, StoreRole, Tag, TagKey,
};
use tracing::debug;

#[derive(Default)]
struct State {
    items: HashMap<String, Item>,
    tags: BTreeMap<TagKey, Tag>,
}

impl State {
    fn register_tags(&mut self, item: &Item) {
        for tag in &item.tags {
            self.tags
                .entry(tag.key.clone())
                .or_insert_with(|| tag.clone());
        }
    }
}

/// In-memory store. Used for tests and as a stand-in cloud service.
///
/// Identifiers are the prefix followed by a sequence number (`L1`, `L2`, ...).
pub struct MemoryStore {
    role: StoreRole,
    prefix: String,
    next_id: AtomicU64,
    state: RwLock<State>,
}

impl MemoryStore {
    /// Create a new empty store. Ids are prefixed `L` or `R` by role.
    pub fn new(role: StoreRole) -> Self {
        let prefix = match role {
            StoreRole::Local => "L",
            StoreRole::Remote => "R",
        };
        Self::with_prefix(role, prefix)
    }

    pub fn with_prefix(role: StoreRole, prefix: impl Into<String>) -> Self {
        MemoryStore {
            role,
            prefix: prefix.into(),
            next_id: AtomicU64::new(1),
            state: RwLock::new(State::default()),
        }
    }

    /// Set the store-private page title of a record.
    pub fn set_page_title(&self, id: &str, title: Option<&str>) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let item = state
            .items
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(self.role, id))?;
        item.page_title = title.map(str::to_string);
        Ok(())
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .items
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.prefix, n)
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    fn role(&self) -> StoreRole {
        self.role
    }

    async fn create(&self, template: Option<&Item>) -> Result<Item, StoreError> {
        let id = self.next_id();
        let record = super::new_record(self.role, id.clone(), template);

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.register_tags(&record);
        state.items.insert(id.clone(), record.clone());
        debug!(store = self.role.as_str(), id = %id, "created record");
        Ok(record)
    }

    async fn read(&self, id: &str) -> Result<Item, StoreError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .items
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(self.role, id))
    }

    async fn update(&self, item: &Item) -> Result<Item, StoreError> {
        let id = require_id(item, self.role)?;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let record = state
            .items
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(self.role, id))?;

        record.copy_content_from(item);
        if self.role == StoreRole::Local && item.remote_id.is_some() {
            record.remote_id = item.remote_id.clone();
        }
        let updated = record.clone();
        state.register_tags(&updated);
        Ok(updated)
    }

    async fn link(&self, local_id: &str, remote_id: &str) -> Result<Item, StoreError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let record = state
            .items
            .get_mut(local_id)
            .ok_or_else(|| StoreError::not_found(self.role, local_id))?;
        record.remote_id = Some(remote_id.to_string());
        Ok(record.clone())
    }

    async fn delete(&self, item: &Item) -> Result<(), StoreError> {
        let id = require_id(item, self.role)?;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.items.remove(id).is_some() {
            debug!(store = self.role.as_str(), id = %id, "deleted record");
            Ok(())
        } else {
            Err(StoreError::not_found(self.role, id))
        }
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(query.apply(state.items.iter().map(|(id, item)| (id.as_str(), item))))
    }

    async fn tags(&self) -> Result<Vec<Tag>, StoreError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let mut tags: Vec<Tag> = state.tags.values().cloned().collect();
        sort_tags(&mut tags);
        Ok(tags)
    }

    async fn ensure_tag(&self, name: &str) -> Result<Tag, StoreError> {
        let tag = Tag::new(name)?;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        Ok(state.tags.entry(tag.key.clone()).or_insert(tag).clone())
    }

    async fn delete_tag(&self, key: &TagKey) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.tags.remove(key).is_none() {
            return Err(StoreError::not_found(self.role, key.as_str()));
        }
        for item in state.items.values_mut() {
            item.tags.retain(|t| &t.key != key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str) -> Tag {
        Tag::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_sequential_ids_by_role() {
        let local = MemoryStore::new(StoreRole::Local);
        let remote = MemoryStore::new(StoreRole::Remote);

        let a = local.create(None).await.unwrap();
        let b = local.create(None).await.unwrap();
        let r = remote.create(Some(&a)).await.unwrap();

        assert_eq!(a.local_id.as_deref(), Some("L1"));
        assert_eq!(b.local_id.as_deref(), Some("L2"));
        assert_eq!(r.remote_id.as_deref(), Some("R1"));
        assert!(r.local_id.is_none());
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let store = MemoryStore::new(StoreRole::Local);
        let err = store.read("L404").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { store: StoreRole::Local, ref id } if id == "L404"));
    }

    #[tokio::test]
    async fn test_update_replaces_fields_and_links() {
        let store = MemoryStore::new(StoreRole::Local);
        let mut item = store.create(Some(&Item::new("https://a.example"))).await.unwrap();
        store.set_page_title("L1", Some("A")).unwrap();

        item.url_string = "https://b.example".to_string();
        item.is_archived = true;
        item.tags.insert(tag("later"));
        item.remote_id = Some("R7".to_string());
        item.touch();

        let updated = store.update(&item).await.unwrap();
        assert_eq!(updated.url_string, "https://b.example");
        assert!(updated.is_archived);
        assert_eq!(updated.remote_id.as_deref(), Some("R7"));
        assert_eq!(updated.modification_date, item.modification_date);
        assert_eq!(updated.page_title.as_deref(), Some("A"));
        assert_eq!(store.tags().await.unwrap(), vec![tag("later")]);
    }

    #[tokio::test]
    async fn test_update_unlinked_or_missing_is_not_found() {
        let store = MemoryStore::new(StoreRole::Remote);
        let unlinked = Item::new("https://a.example");
        assert!(store.update(&unlinked).await.unwrap_err().is_not_found());

        let mut gone = Item::new("https://a.example");
        gone.remote_id = Some("R99".to_string());
        assert!(store.update(&gone).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_link_keeps_newer_content() {
        let store = MemoryStore::new(StoreRole::Local);
        let stale = store.create(Some(&Item::new("https://a.example"))).await.unwrap();

        let mut edited = stale.clone();
        edited.is_archived = true;
        edited.touch();
        store.update(&edited).await.unwrap();

        let linked = store.link("L1", "R3").await.unwrap();
        assert_eq!(linked.remote_id.as_deref(), Some("R3"));
        assert!(linked.is_archived);
        assert_eq!(linked.modification_date, edited.modification_date);
        assert!(store.link("L9", "R3").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let store = MemoryStore::new(StoreRole::Local);
        let item = store.create(None).await.unwrap();
        store.delete(&item).await.unwrap();
        assert!(store.delete(&item).await.unwrap_err().is_not_found());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_by_tag_and_archive() {
        let store = MemoryStore::new(StoreRole::Local);
        let a = store
            .create(Some(&Item::new("https://a.example").with_tags([tag("x")])))
            .await
            .unwrap();
        let mut b = Item::new("https://b.example").with_tags([tag("x")]);
        b.is_archived = true;
        store.create(Some(&b)).await.unwrap();
        store.create(Some(&Item::new("https://c.example"))).await.unwrap();

        let query = ListQuery::recently_modified()
            .unarchived()
            .tagged(TagKey::normalize("X").unwrap());
        let ids = store.list(&query).await.unwrap();
        assert_eq!(ids, vec![a.local_id.unwrap()]);
    }

    #[tokio::test]
    async fn test_ensure_tag_is_get_or_create() {
        let store = MemoryStore::new(StoreRole::Local);
        let first = store.ensure_tag("Read Later").await.unwrap();
        let second = store.ensure_tag("readlater").await.unwrap();
        assert_eq!(first.display_name, "Read Later");
        assert_eq!(second.display_name, "Read Later");
        assert_eq!(store.tags().await.unwrap().len(), 1);

        assert!(matches!(
            store.ensure_tag("   ").await,
            Err(StoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_tags_sorted_by_display_name() {
        let store = MemoryStore::new(StoreRole::Local);
        store.ensure_tag("zebra").await.unwrap();
        store.ensure_tag("Apple").await.unwrap();
        store.ensure_tag("mango").await.unwrap();
        let names: Vec<String> = store
            .tags()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.display_name)
            .collect();
        assert_eq!(names, vec!["Apple", "mango", "zebra"]);
    }

    #[tokio::test]
    async fn test_delete_tag_keeps_items() {
        let store = MemoryStore::new(StoreRole::Local);
        let item = store
            .create(Some(&Item::new("https://a.example").with_tags([tag("x"), tag("y")])))
            .await
            .unwrap();
        store.delete_tag(&TagKey::normalize("x").unwrap()).await.unwrap();

        let read = store.read(item.local_id.as_deref().unwrap()).await.unwrap();
        assert_eq!(read.tags.len(), 1);
        assert!(read.has_tag(&TagKey::normalize("y").unwrap()));
        assert!(store
            .delete_tag(&TagKey::normalize("x").unwrap())
            .await
            .unwrap_err()
            .is_not_found());
    }
}
