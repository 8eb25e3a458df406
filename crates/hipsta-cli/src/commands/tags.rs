use hipsta_sync::Library;

pub async fn run(
    library: &Library,
    create: Option<String>,
    delete: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(name) = create {
        let tag = library.create_tag(&name).await?;
        println!("Tag {} ({})", tag.display_name, tag.key);
        return Ok(());
    }

    if let Some(name) = delete {
        let stripped = library.delete_tag(&name).await?;
        println!("Deleted tag {} from {} bookmark(s)", name, stripped);
        return Ok(());
    }

    let tags = library.tags().await?;
    if tags.is_empty() {
        println!("(no tags)");
        return Ok(());
    }
    for tag in tags {
        println!("{:<24} {}", tag.display_name, tag.key);
    }
    Ok(())
}
