use std::collections::{BTreeMap, BTreeSet, VecDeque};

use cairn_db::{
    traits::SenderDatabase,
    types::{OperationStatus, TxAttemptEntry},
};

use super::error::{DispatcherError, DispatcherResult};

/// In-memory working state of the dispatcher task. Owned exclusively by the
/// task; both the nonce sequence and the in-flight set mutate only through it.
pub(crate) struct DispatcherState {
    /// Operations waiting for a free in-flight slot, FIFO.
    pub(crate) queue: VecDeque<u64>,

    /// The live attempt per in-flight operation.
    pub(crate) live: BTreeMap<u64, TxAttemptEntry>,

    /// Live attempts the RPC node has not acknowledged yet.
    pub(crate) unsent: BTreeSet<u64>,

    /// Next nonce to assign. Strictly serialized single writer.
    pub(crate) next_nonce: u64,
}

impl DispatcherState {
    /// Rebuilds the queue, the live set and the nonce sequence from the store
    /// alone. `chain_nonce` is the account nonce as the chain reports it,
    /// used when the store has no attempts (or lags behind the chain).
    pub(crate) fn initialize<D: SenderDatabase>(
        db: &D,
        chain_nonce: u64,
    ) -> DispatcherResult<Self> {
        let mut queue = VecDeque::new();
        let mut live = BTreeMap::new();
        let mut unsent = BTreeSet::new();

        for (seq, op) in db.get_pending_operations()? {
            match op.status {
                OperationStatus::Queued => queue.push_back(seq),
                OperationStatus::InFlight => {
                    let attempt = db
                        .get_latest_attempt(seq)?
                        .ok_or(DispatcherError::MissingAttempt(seq))?;
                    if !attempt.is_terminal() {
                        // Re-broadcast after restart; the node dedupes.
                        unsent.insert(seq);
                    }
                    live.insert(seq, attempt);
                }
                _ => {}
            }
        }

        let next_nonce = db
            .get_max_nonce()?
            .map(|nonce| nonce + 1)
            .unwrap_or(0)
            .max(chain_nonce);

        Ok(Self {
            queue,
            live,
            unsent,
            next_nonce,
        })
    }

    /// Drops every trace of an operation from the working sets, freeing its
    /// in-flight slot.
    pub(crate) fn retire(&mut self, seq: u64) {
        self.live.remove(&seq);
        self.unsent.remove(&seq);
    }
}
