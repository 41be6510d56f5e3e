//! Incremental indexing and filesystem watching (§4.10): the `add`/`change`/
//! `unlink` diff-tombstone-resolve lifecycle applied after the initial full
//! index, plus the optional supplemental AI-assisted relationship pass
//! (§4.10.1).

pub mod indexer;
pub mod watcher;

pub use indexer::{IncrementalIndexer, WatchApplyOutcome};
pub use watcher::{is_code_path, WatcherService, WatcherState};
