use thiserror::Error;

/// Simple result type used across the database interface.
pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("missing operation entry for seq {0}")]
    MissingOperation(u64),

    #[error("missing attempt entry for op {0} attempt {1}")]
    MissingAttempt(u64, u32),

    #[error("{0}")]
    Other(String),
}
