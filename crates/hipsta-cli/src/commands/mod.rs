pub mod add;
pub mod archive;
pub mod config;
pub mod ls;
pub mod rm;
pub mod show;
pub mod status;
pub mod sync;
pub mod tag;
pub mod tags;
pub mod validate;

use hipsta_core::{Item, StoreError};
use hipsta_sync::{BulkOutcome, Completion};

/// Print both phases of a completed operation.
///
/// A local failure is returned; a remote failure is only printed since the
/// next sync retries it.
pub(crate) fn print_phases<T>(
    done: Completion<T>,
    describe: impl Fn(&T) -> String,
) -> Result<T, StoreError> {
    match &done.quick {
        Ok(value) => println!("  device: {}", describe(value)),
        Err(e) => println!("  device: failed: {}", e),
    }
    match &done.full {
        Ok(value) => println!("  cloud:  {}", describe(value)),
        Err(e) => println!("  cloud:  failed: {}", e),
    }
    match (done.quick, done.full) {
        (Err(e), _) => Err(e),
        (Ok(_), Ok(value)) | (Ok(value), Err(_)) => Ok(value),
    }
}

/// Print the outcome of a bulk update, one bookmark at a time.
pub(crate) fn print_bulk(outcomes: BulkOutcome) -> Result<(), StoreError> {
    let mut first_error = None;
    for (id, done) in outcomes {
        println!("{}", id);
        if let Err(e) = print_phases(done, describe_item) {
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

pub(crate) fn describe_item(item: &Item) -> String {
    let archived = if item.is_archived { " (archived)" } else { "" };
    format!("{} {}{}", link(item), item.url_string, archived)
}

pub(crate) fn format_tags(item: &Item) -> String {
    item.tags
        .iter()
        .map(|t| t.display_name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `L1 -> R1`, or `L1 -> -` while the record is unlinked.
pub(crate) fn link(item: &Item) -> String {
    format!(
        "{} -> {}",
        item.local_id.as_deref().unwrap_or("-"),
        item.remote_id.as_deref().unwrap_or("-")
    )
}
