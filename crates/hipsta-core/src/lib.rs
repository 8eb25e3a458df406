mod error;
mod model;
mod query;
mod tag_index;
mod traits;

pub use error::{StoreError, SyncError};
pub use model::{now, Item, StoreRole, Tag, TagKey, UNTITLED_TAG_KEY};
pub use query::{ArchiveFilter, ItemFilter, ListQuery, SortKey};
pub use tag_index::{application_state, resolve_application_state, TagState};
pub use traits::{require_id, sort_tags, EntityStore};
