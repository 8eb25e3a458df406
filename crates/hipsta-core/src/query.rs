use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::model::{Item, TagKey};

/// Field an item listing is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    CreationDate,
    #[default]
    ModificationDate,
    UrlString,
    PageTitle,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::CreationDate => "creation_date",
            SortKey::ModificationDate => "modification_date",
            SortKey::UrlString => "url_string",
            SortKey::PageTitle => "page_title",
        }
    }
}

/// Which archive states a listing includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFilter {
    #[default]
    All,
    Unarchived,
}

/// Restrictions on which items a listing returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemFilter {
    pub archived: ArchiveFilter,
    /// Case-insensitive substring of the url or page title.
    pub search: Option<String>,
    /// Only items carrying this tag.
    pub tag: Option<TagKey>,
}

impl ItemFilter {
    /// The search text, lower-cased, or `None` when blank.
    pub fn search_needle(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    pub fn matches(&self, item: &Item) -> bool {
        if self.archived == ArchiveFilter::Unarchived && item.is_archived {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !item.has_tag(tag) {
                return false;
            }
        }
        if let Some(needle) = self.search_needle() {
            let in_url = item.url_string.to_lowercase().contains(&needle);
            let in_title = item
                .page_title
                .as_deref()
                .is_some_and(|t| t.to_lowercase().contains(&needle));
            if !in_url && !in_title {
                return false;
            }
        }
        true
    }
}

/// An ordered, filtered listing of identifiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListQuery {
    pub sort: SortKey,
    pub ascending: bool,
    pub filter: ItemFilter,
}

impl ListQuery {
    /// Newest modification first, no filter. The order reconciliation reads in.
    pub fn recently_modified() -> Self {
        ListQuery::default()
    }

    pub fn sorted_by(sort: SortKey, ascending: bool) -> Self {
        ListQuery {
            sort,
            ascending,
            filter: ItemFilter::default(),
        }
    }

    pub fn unarchived(mut self) -> Self {
        self.filter.archived = ArchiveFilter::Unarchived;
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.filter.search = Some(text.into());
        self
    }

    pub fn tagged(mut self, key: TagKey) -> Self {
        self.filter.tag = Some(key);
        self
    }

    /// Compare two items under this query's order. Ties fall back to the id.
    pub fn compare(&self, a: (&str, &Item), b: (&str, &Item)) -> Ordering {
        let primary = match self.sort {
            SortKey::CreationDate => a.1.creation_date.cmp(&b.1.creation_date),
            SortKey::ModificationDate => a.1.modification_date.cmp(&b.1.modification_date),
            SortKey::UrlString => a
                .1
                .url_string
                .to_lowercase()
                .cmp(&b.1.url_string.to_lowercase()),
            SortKey::PageTitle => title_key(a.1).cmp(&title_key(b.1)),
        };
        let ordered = primary.then_with(|| a.0.cmp(b.0));
        if self.ascending {
            ordered
        } else {
            ordered.reverse()
        }
    }

    /// Filter and order `(id, item)` pairs held in memory.
    pub fn apply<'a, I>(&self, items: I) -> Vec<String>
    where
        I: IntoIterator<Item = (&'a str, &'a Item)>,
    {
        let mut matching: Vec<(&str, &Item)> = items
            .into_iter()
            .filter(|(_, item)| self.filter.matches(item))
            .collect();
        matching.sort_by(|a, b| self.compare(*a, *b));
        matching.into_iter().map(|(id, _)| id.to_string()).collect()
    }
}

fn title_key(item: &Item) -> String {
    item.page_title.as_deref().unwrap_or("").to_lowercase()
}
