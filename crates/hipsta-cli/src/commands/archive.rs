use hipsta_sync::Library;

use super::print_bulk;

pub async fn run(library: &Library, ids: &[String], archived: bool) -> Result<(), Box<dyn std::error::Error>> {
    let outcomes = library.set_archived(ids, archived).await;
    print_bulk(outcomes)?;
    Ok(())
}
