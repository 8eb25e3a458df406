use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::model::{Item, TagKey};
use crate::traits::EntityStore;

/// How a tag relates to a selection of items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagState {
    /// Every resolved item carries the tag.
    On,
    /// No resolved item carries it, or nothing resolved.
    Off,
    /// Some do, some don't, or part of the selection could not be resolved.
    Mixed,
}

impl TagState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagState::On => "on",
            TagState::Off => "off",
            TagState::Mixed => "mixed",
        }
    }
}

/// Tri-state of `tag` over a selection. `None` entries are ids that did
/// not resolve to an item.
pub fn application_state<'a, I>(tag: &TagKey, items: I) -> TagState
where
    I: IntoIterator<Item = Option<&'a Item>>,
{
    let mut resolved = 0usize;
    let mut unresolved = 0usize;
    let mut tagged = 0usize;
    for item in items {
        match item {
            Some(item) => {
                resolved += 1;
                if item.has_tag(tag) {
                    tagged += 1;
                }
            }
            None => unresolved += 1,
        }
    }

    if resolved == 0 {
        TagState::Off
    } else if unresolved > 0 {
        TagState::Mixed
    } else if tagged == resolved {
        TagState::On
    } else if tagged == 0 {
        TagState::Off
    } else {
        TagState::Mixed
    }
}

/// Resolve `ids` through `store` and compute the tri-state.
///
/// Ids the store does not know count as unresolved; any other store error
/// is returned.
pub async fn resolve_application_state<S>(
    store: &S,
    tag: &TagKey,
    ids: &[String],
) -> Result<TagState, StoreError>
where
    S: EntityStore + ?Sized,
{
    let mut items = Vec::with_capacity(ids.len());
    for id in ids {
        match store.read(id).await {
            Ok(item) => items.push(Some(item)),
            Err(e) if e.is_not_found() => {
                debug!(store = store.name(), id = %id, "tag state: id did not resolve");
                items.push(None);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(application_state(tag, items.iter().map(Option::as_ref)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Tag;

    fn key() -> TagKey {
        TagKey::normalize("news").unwrap()
    }

    fn tagged() -> Item {
        Item::new("https://a.example").with_tags([Tag::new("News").unwrap()])
    }

    fn untagged() -> Item {
        Item::new("https://b.example")
    }

    #[test]
    fn test_empty_selection_is_off() {
        assert_eq!(application_state(&key(), Vec::<Option<&Item>>::new()), TagState::Off);
    }

    #[test]
    fn test_all_tagged_is_on() {
        let (a, b) = (tagged(), tagged());
        assert_eq!(application_state(&key(), [Some(&a), Some(&b)]), TagState::On);
    }

    #[test]
    fn test_none_tagged_is_off() {
        let (a, b) = (untagged(), untagged());
        assert_eq!(application_state(&key(), [Some(&a), Some(&b)]), TagState::Off);
    }

    #[test]
    fn test_some_tagged_is_mixed() {
        let (a, b) = (tagged(), untagged());
        assert_eq!(application_state(&key(), [Some(&a), Some(&b)]), TagState::Mixed);
    }

    #[test]
    fn test_nothing_resolved_is_off() {
        assert_eq!(application_state(&key(), [None::<&Item>, None]), TagState::Off);
    }

    #[test]
    fn test_partial_resolution_is_mixed() {
        let a = tagged();
        assert_eq!(application_state(&key(), [Some(&a), None]), TagState::Mixed);
        let b = untagged();
        assert_eq!(application_state(&key(), [None, Some(&b)]), TagState::Mixed);
    }
}
