use hipsta_sync::{Library, SyncState};

pub async fn run(library: &Library) -> Result<(), Box<dyn std::error::Error>> {
    let status = library.status().await?;

    println!("Hipsta Status");
    println!("=============");
    println!();

    if let Some(name) = &status.name {
        println!("Library: {}", name);
    }
    println!("Device store: {}", status.local_kind);
    println!("Cloud store:  {}", status.remote_kind);
    println!();

    println!("Bookmarks:");
    println!("  total:       {}", status.items);
    println!("  unarchived:  {}", status.unarchived);
    println!("  not synced:  {}", status.unlinked);
    println!("  tags:        {}", status.tags);
    println!();

    println!("Sync:");
    println!("  max passes:  {}", status.max_passes);
    println!("  in flight:   {}", status.remote_in_flight);
    println!("  last run:    {}", describe(&status.sync_state));

    Ok(())
}

fn describe(state: &SyncState) -> String {
    match state {
        SyncState::Idle => "never".to_string(),
        SyncState::Reading { pass } => format!("reading (pass {})", pass),
        SyncState::Diffing { pass } => format!("diffing (pass {})", pass),
        SyncState::Applying { pass, actions } => format!("applying {} change(s) (pass {})", actions, pass),
        SyncState::Converged { passes } => format!("converged after {} pass(es)", passes),
        SyncState::Failed(e) => format!("failed: {}", e),
    }
}
