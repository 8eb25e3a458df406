use hipsta_sync::Library;

use super::{format_tags, link, print_phases};

pub async fn run(library: &Library, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let done = library.get_both(id).await;
    let item = print_phases(done, |item| {
        format!("{} modified {}", link(item), item.modification_date.to_rfc3339())
    })?;

    println!();
    println!("URL:       {}", item.url_string);
    if let Some(title) = &item.page_title {
        println!("Title:     {}", title);
    }
    println!("Archived:  {}", if item.is_archived { "yes" } else { "no" });
    println!("Tags:      {}", format_tags(&item));
    println!("Created:   {}", item.creation_date.format("%Y-%m-%d %H:%M:%S"));
    println!("Modified:  {}", item.modification_date.format("%Y-%m-%d %H:%M:%S"));
    Ok(())
}
