mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use hipsta_core::{now, Item, StoreRole};

/// Build the record a store keeps for a create request.
///
/// Synced fields are copied from the template. Only a local store keeps the
/// other side's identity; a remote record never knows its local twin.
pub(crate) fn new_record(role: StoreRole, id: String, template: Option<&Item>) -> Item {
    let mut record = match template {
        Some(t) => {
            let mut record = Item::new(t.url_string.clone());
            record.copy_content_from(t);
            record.creation_date = t.creation_date;
            record
        }
        None => {
            let mut record = Item::new(String::new());
            let now = now();
            record.creation_date = now;
            record.modification_date = now;
            record
        }
    };
    if role == StoreRole::Local {
        record.remote_id = template.and_then(|t| t.remote_id.clone());
    }
    record.set_id_for(role, Some(id));
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use hipsta_core::Tag;

    #[test]
    fn test_new_record_local_keeps_linkage() {
        let mut template = Item::new("https://example.com").with_tags([Tag::new("a").unwrap()]);
        template.remote_id = Some("R4".to_string());
        template.local_id = Some("stale".to_string());
        template.page_title = Some("Example".to_string());

        let record = new_record(StoreRole::Local, "L1".to_string(), Some(&template));
        assert_eq!(record.local_id.as_deref(), Some("L1"));
        assert_eq!(record.remote_id.as_deref(), Some("R4"));
        assert_eq!(record.creation_date, template.creation_date);
        assert_eq!(record.modification_date, template.modification_date);
        assert!(record.page_title.is_none());
        assert!(record.same_content(&template));
    }

    #[test]
    fn test_new_record_remote_drops_local_identity() {
        let mut template = Item::new("https://example.com");
        template.local_id = Some("L1".to_string());

        let record = new_record(StoreRole::Remote, "R1".to_string(), Some(&template));
        assert_eq!(record.remote_id.as_deref(), Some("R1"));
        assert!(record.local_id.is_none());
    }

    #[test]
    fn test_new_record_without_template() {
        let record = new_record(StoreRole::Local, "L9".to_string(), None);
        assert_eq!(record.url_string, "");
        assert!(!record.is_archived);
        assert!(record.tags.is_empty());
        assert_eq!(record.creation_date, record.modification_date);
    }
}
