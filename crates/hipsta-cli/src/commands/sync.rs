use hipsta_sync::Library;

pub async fn run(library: &Library) -> Result<(), Box<dyn std::error::Error>> {
    let report = library.sync().await?;
    if report.actions_applied == 0 {
        println!("Already in sync");
    } else {
        println!(
            "Synced: {} change(s) applied in {} pass(es)",
            report.actions_applied, report.passes
        );
    }
    Ok(())
}
