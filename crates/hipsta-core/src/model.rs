use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Normalized key of the placeholder tag created from an "Untitled Tag" name.
pub const UNTITLED_TAG_KEY: &str = "untitledtag";

const UNTITLED_TAG_DISPLAY: &str = "Untitled Tag";

/// Current time truncated to whole milliseconds.
///
/// Every timestamp in the system goes through here so that dates survive a
/// round trip through either store unchanged.
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Which side of the pair a store plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreRole {
    /// Fast, on-device store. Authoritative for reads.
    Local,
    /// Slow, network-backed store.
    Remote,
}

impl StoreRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreRole::Local => "local",
            StoreRole::Remote => "remote",
        }
    }

    /// The opposite side.
    pub fn other(&self) -> StoreRole {
        match self {
            StoreRole::Local => StoreRole::Remote,
            StoreRole::Remote => StoreRole::Local,
        }
    }
}

impl fmt::Display for StoreRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized tag identity: trimmed, lower-cased, all whitespace removed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagKey(String);

impl TagKey {
    /// Normalize a user-supplied tag name.
    ///
    /// Returns a validation error when nothing is left after normalization.
    pub fn normalize(name: &str) -> Result<TagKey, StoreError> {
        let key: String = name
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        if key.is_empty() {
            return Err(StoreError::Validation(format!(
                "tag name '{}' is empty after normalization",
                name
            )));
        }
        Ok(TagKey(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TagKey {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TagKey::normalize(&value)
    }
}

impl From<TagKey> for String {
    fn from(key: TagKey) -> Self {
        key.0
    }
}

/// A label that can be applied to many items.
///
/// Identity (equality, ordering, hashing) is the normalized key alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub key: TagKey,
    pub display_name: String,
}

impl Tag {
    /// Build a tag from a user-supplied name.
    pub fn new(name: &str) -> Result<Tag, StoreError> {
        let key = TagKey::normalize(name)?;
        let display_name = if key.as_str() == UNTITLED_TAG_KEY {
            UNTITLED_TAG_DISPLAY.to_string()
        } else {
            name.trim().to_string()
        };
        Ok(Tag { key, display_name })
    }

    /// Rebuild a tag from persisted parts.
    pub fn from_parts(key: TagKey, display_name: impl Into<String>) -> Tag {
        Tag {
            key,
            display_name: display_name.into(),
        }
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Tag {}

impl Hash for Tag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}

/// A saved bookmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Identity in the local store.
    pub local_id: Option<String>,
    /// Identity in the remote store; absent until the first remote round trip.
    pub remote_id: Option<String>,
    pub url_string: String,
    pub is_archived: bool,
    pub tags: BTreeSet<Tag>,
    pub creation_date: DateTime<Utc>,
    pub modification_date: DateTime<Utc>,
    /// Store-private auxiliary data. Never synced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
}

impl Item {
    /// A fresh, unsaved item dated now.
    pub fn new(url_string: impl Into<String>) -> Item {
        let now = now();
        Item {
            local_id: None,
            remote_id: None,
            url_string: url_string.into(),
            is_archived: false,
            tags: BTreeSet::new(),
            creation_date: now,
            modification_date: now,
            page_title: None,
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Item {
        self.tags.extend(tags);
        self
    }

    pub fn id_for(&self, role: StoreRole) -> Option<&str> {
        match role {
            StoreRole::Local => self.local_id.as_deref(),
            StoreRole::Remote => self.remote_id.as_deref(),
        }
    }

    pub fn set_id_for(&mut self, role: StoreRole, id: Option<String>) {
        match role {
            StoreRole::Local => self.local_id = id,
            StoreRole::Remote => self.remote_id = id,
        }
    }

    /// Refresh the modification date.
    ///
    /// The new date is always strictly later than the previous one, even when
    /// the clock has not advanced a full millisecond.
    pub fn touch(&mut self) {
        let floor = self.modification_date + TimeDelta::milliseconds(1);
        self.modification_date = now().max(floor);
    }

    pub fn has_tag(&self, key: &TagKey) -> bool {
        self.tags.iter().any(|t| &t.key == key)
    }

    /// True when the synced fields of both records agree.
    ///
    /// Identities and auxiliary data are ignored.
    pub fn same_content(&self, other: &Item) -> bool {
        self.url_string == other.url_string
            && self.is_archived == other.is_archived
            && self.tags == other.tags
            && self.modification_date == other.modification_date
    }

    /// Copy the synced fields of `source` onto this record, keeping identities.
    pub fn copy_content_from(&mut self, source: &Item) {
        self.url_string = source.url_string.clone();
        self.is_archived = source.is_archived;
        self.tags = source.tags.clone();
        self.modification_date = source.modification_date;
    }
}
