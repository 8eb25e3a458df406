pub mod backends;
pub mod coordinator;
pub mod library;
pub mod remote;
pub mod sync;

pub use backends::{MemoryStore, SqliteStore};
pub use coordinator::{Completion, Coordinator};
pub use library::{BulkOutcome, Library, LibraryError, LibraryStatus};
pub use remote::{RemoteConfig, RemoteStore};
pub use sync::{diff, SyncAction, SyncConfig, SyncReport, SyncState, Syncer};
