use thiserror::Error;

use crate::WorkerId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PoolError {
    #[error("unknown worker {0}")]
    UnknownWorker(WorkerId),

    #[error("worker {0} was declared gone")]
    WorkerGone(WorkerId),

    #[error("job pool is at capacity ({0})")]
    PoolSaturated(usize),

    #[error("worker {0} is already assigned op {1}")]
    AlreadyAssigned(WorkerId, u64),

    #[error("worker {0} is not assigned op {1}")]
    NotAssigned(WorkerId, u64),
}

pub type PoolResult<T> = Result<T, PoolError>;
