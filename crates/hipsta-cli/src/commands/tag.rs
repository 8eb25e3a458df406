use hipsta_sync::Library;

use super::print_bulk;

pub async fn apply(library: &Library, name: &str, ids: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let outcomes = library.apply_tag(name, ids).await?;
    print_bulk(outcomes)?;
    Ok(())
}

pub async fn remove(library: &Library, name: &str, ids: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let outcomes = library.remove_tag(name, ids).await?;
    print_bulk(outcomes)?;
    Ok(())
}

pub async fn state(library: &Library, name: &str, ids: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let state = library.tag_state(name, ids).await?;
    println!("{}", state.as_str());
    Ok(())
}
