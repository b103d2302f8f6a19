//! The dispatch engine: prices, signs, submits and tracks the lifecycle of
//! operations against the base chain, bounded by `max_in_flight`.

pub mod error;

mod handle;
mod state;
mod task;

pub use error::{DispatcherError, DispatcherResult};
pub use handle::{spawn_dispatcher_task, DispatcherHandle};
pub use task::OperationOutcome;
