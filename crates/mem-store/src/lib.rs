//! In-memory implementation of the sender database traits, used as the
//! default store for the dev binary and as the backing store in tests.

use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use cairn_db::{
    traits::SenderDatabase,
    types::{OperationEntry, OperationStatus, TxAttemptEntry, TxAttemptStatus},
    DbError, DbResult,
};

/// Keeps operations and attempts in ordered maps behind locks. Reads may be
/// concurrent; writes take the exclusive lock for the duration of the small
/// critical section.
#[derive(Debug, Default)]
pub struct MemSenderDb {
    operations: RwLock<BTreeMap<u64, OperationEntry>>,
    attempts: RwLock<BTreeMap<(u64, u32), TxAttemptEntry>>,
}

impl MemSenderDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

// The locks are only held across map accesses, never across await points, so
// poisoning can only come from a panicking map op.
fn lock_err(what: &str) -> DbError {
    DbError::Other(format!("lock poisoned: {what}"))
}

impl SenderDatabase for MemSenderDb {
    fn put_operation(&self, seq: u64, entry: OperationEntry) -> DbResult<bool> {
        let mut ops = self.operations.write().map_err(|_| lock_err("operations"))?;
        if ops.contains_key(&seq) {
            return Ok(false);
        }
        ops.insert(seq, entry);
        Ok(true)
    }

    fn get_operation(&self, seq: u64) -> DbResult<Option<OperationEntry>> {
        let ops = self.operations.read().map_err(|_| lock_err("operations"))?;
        Ok(ops.get(&seq).cloned())
    }

    fn set_operation_status(&self, seq: u64, status: OperationStatus) -> DbResult<()> {
        let mut ops = self.operations.write().map_err(|_| lock_err("operations"))?;
        let entry = ops.get_mut(&seq).ok_or(DbError::MissingOperation(seq))?;
        entry.status = status;
        Ok(())
    }

    fn get_pending_operations(&self) -> DbResult<Vec<(u64, OperationEntry)>> {
        let ops = self.operations.read().map_err(|_| lock_err("operations"))?;
        Ok(ops
            .iter()
            .filter(|(_, entry)| !entry.is_terminal())
            .map(|(seq, entry)| (*seq, entry.clone()))
            .collect())
    }

    fn put_attempt(&self, entry: TxAttemptEntry) -> DbResult<()> {
        let mut attempts = self.attempts.write().map_err(|_| lock_err("attempts"))?;
        attempts.insert((entry.op_seq, entry.attempt_no), entry);
        Ok(())
    }

    fn get_attempt(&self, op_seq: u64, attempt_no: u32) -> DbResult<Option<TxAttemptEntry>> {
        let attempts = self.attempts.read().map_err(|_| lock_err("attempts"))?;
        Ok(attempts.get(&(op_seq, attempt_no)).cloned())
    }

    fn get_latest_attempt(&self, op_seq: u64) -> DbResult<Option<TxAttemptEntry>> {
        let attempts = self.attempts.read().map_err(|_| lock_err("attempts"))?;
        Ok(attempts
            .range((op_seq, 0)..=(op_seq, u32::MAX))
            .next_back()
            .map(|(_, entry)| entry.clone()))
    }

    fn set_attempt_status(
        &self,
        op_seq: u64,
        attempt_no: u32,
        status: TxAttemptStatus,
    ) -> DbResult<()> {
        let mut attempts = self.attempts.write().map_err(|_| lock_err("attempts"))?;
        let entry = attempts
            .get_mut(&(op_seq, attempt_no))
            .ok_or(DbError::MissingAttempt(op_seq, attempt_no))?;
        entry.status = status;
        Ok(())
    }

    fn get_max_nonce(&self) -> DbResult<Option<u64>> {
        let attempts = self.attempts.read().map_err(|_| lock_err("attempts"))?;
        Ok(attempts.values().map(|entry| entry.nonce).max())
    }
}
