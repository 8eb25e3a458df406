use hipsta_core::{ListQuery, SortKey, TagKey};
use hipsta_sync::Library;

use super::format_tags;

pub struct Options {
    pub sort: SortKey,
    pub ascending: bool,
    pub include_archived: bool,
    pub search: Option<String>,
    pub tag: Option<String>,
    pub json: bool,
}

pub async fn run(library: &Library, options: Options) -> Result<(), Box<dyn std::error::Error>> {
    let mut query = ListQuery::sorted_by(options.sort, options.ascending);
    if !options.include_archived {
        query = query.unarchived();
    }
    if let Some(text) = options.search {
        query = query.search(text);
    }
    if let Some(name) = options.tag {
        query = query.tagged(TagKey::normalize(&name)?);
    }

    let items = library.list(&query).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("(no bookmarks)");
        return Ok(());
    }

    for item in items {
        let id = item.local_id.as_deref().unwrap_or("-");
        let sync_marker = if item.remote_id.is_some() { " " } else { "*" };
        let archive_marker = if item.is_archived { "a" } else { "-" };
        println!(
            "{:>6}{} {} {}  {}",
            id,
            sync_marker,
            archive_marker,
            item.modification_date.format("%Y-%m-%d %H:%M"),
            item.url_string
        );
        if let Some(title) = &item.page_title {
            println!("{:>8}  {}", "", title);
        }
        if !item.tags.is_empty() {
            println!("{:>8}  [{}]", "", format_tags(&item));
        }
    }

    Ok(())
}
