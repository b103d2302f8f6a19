//! Chain polling for inclusion depth, reorgs and staleness of live attempts.

mod task;

pub use task::{spawn_watcher_task, watcher_task, WatcherError, WatcherResult};
