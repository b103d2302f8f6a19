use crate::{
    errors::DbResult,
    types::{OperationEntry, OperationStatus, TxAttemptEntry, TxAttemptStatus},
};

/// Persistence contract for the dispatch engine and the confirmation watcher.
///
/// The engine treats the store as durable and authoritative: after a restart
/// every in-memory queue must be rebuildable from this interface alone.
pub trait SenderDatabase {
    /// Inserts a new operation entry keyed by its sequence number. Returns
    /// `false` without touching the store if an entry already exists, which is
    /// what makes `submit` idempotent.
    fn put_operation(&self, seq: u64, entry: OperationEntry) -> DbResult<bool>;

    /// Fetch an operation by its sequence number.
    fn get_operation(&self, seq: u64) -> DbResult<Option<OperationEntry>>;

    /// Update the status of an existing operation.
    fn set_operation_status(&self, seq: u64, status: OperationStatus) -> DbResult<()>;

    /// All operations not yet in a terminal state, ascending by sequence
    /// number.
    fn get_pending_operations(&self) -> DbResult<Vec<(u64, OperationEntry)>>;

    /// Persist a transaction attempt, keyed by `(op_seq, attempt_no)`.
    /// Overwrites any previous entry under the same key.
    fn put_attempt(&self, entry: TxAttemptEntry) -> DbResult<()>;

    /// Fetch a single attempt.
    fn get_attempt(&self, op_seq: u64, attempt_no: u32) -> DbResult<Option<TxAttemptEntry>>;

    /// The newest attempt recorded for an operation, if any.
    fn get_latest_attempt(&self, op_seq: u64) -> DbResult<Option<TxAttemptEntry>>;

    /// Update the status of an existing attempt.
    fn set_attempt_status(
        &self,
        op_seq: u64,
        attempt_no: u32,
        status: TxAttemptStatus,
    ) -> DbResult<()>;

    /// Highest nonce assigned to any recorded attempt, if any. Used to rebuild
    /// the nonce sequence on startup.
    fn get_max_nonce(&self) -> DbResult<Option<u64>>;
}
