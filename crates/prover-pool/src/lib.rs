//! Proof-worker liveness coordination: heartbeat tracking, job assignment
//! and admission gating for completed proofs.

pub mod error;

mod pool;
mod task;

/// Identifier assigned to a worker at registration.
pub type WorkerId = u64;

pub use error::{PoolError, PoolResult};
pub use pool::{ProofJob, ProofResult, WorkerPool, WorkerRecord, WorkerState};
pub use task::{liveness_task, spawn_liveness_task, ProverPoolHandle};
