use cairn_db::{types::InvalidTransition, DbError};
use thiserror::Error;

use crate::rpc::ClientError;

#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("db: {0}")]
    Db(#[from] DbError),

    #[error("client: {0}")]
    Client(#[from] ClientError),

    #[error("signer: {0}")]
    Signer(#[from] anyhow::Error),

    #[error("status: {0}")]
    Transition(#[from] InvalidTransition),

    #[error("no live attempt recorded for op {0}")]
    MissingAttempt(u64),

    #[error("{0}")]
    Other(String),
}

pub type DispatcherResult<T> = Result<T, DispatcherError>;
