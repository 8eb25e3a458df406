use hipsta_sync::Library;

use super::{describe_item, print_phases};

pub async fn run(library: &Library, url: &str, tags: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let done = library.add(url, tags).await?;
    println!("Saved {}", url.trim());
    print_phases(done, describe_item)?;
    Ok(())
}
