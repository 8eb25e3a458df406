use hipsta_sync::Library;

use super::print_phases;

pub async fn run(library: &Library, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("Removing {}", id);
    print_phases(library.remove(id).await, |_| "removed".to_string())?;
    Ok(())
}
