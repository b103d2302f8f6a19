//! Module for database local types

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use thiserror::Error;

use cairn_primitives::buf::Buf32;

/// A logical unit of on-chain work, e.g. publishing the commitment for one
/// rollup block. Keyed externally by a monotonic sequence number.
#[derive(Debug, Clone, PartialEq, BorshSerialize, BorshDeserialize, Arbitrary)]
pub struct OperationEntry {
    /// Commitment identifying the state transition this operation publishes.
    pub commitment: Buf32,
    payload: Vec<u8>,
    created_at: u64,
    pub status: OperationStatus,
}

impl OperationEntry {
    /// Create a new queued operation. `created_at` is unix millis.
    pub fn new_queued(commitment: Buf32, payload: Vec<u8>, created_at: u64) -> Self {
        Self {
            commitment,
            payload,
            created_at,
            status: OperationStatus::Queued,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            OperationStatus::Complete | OperationStatus::Abandoned(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, BorshSerialize, BorshDeserialize, Arbitrary)]
pub enum OperationStatus {
    /// Waiting for a free in-flight slot.
    Queued,

    /// Has a live transaction attempt out on the chain.
    InFlight,

    /// An attempt for this operation reached the confirmation depth.
    Complete,

    /// Given up on; needs operator intervention.
    Abandoned(AbandonReason),
}

#[derive(Debug, Clone, PartialEq, BorshSerialize, BorshDeserialize, Arbitrary)]
pub enum AbandonReason {
    /// Execution reverted on chain. Resubmission cannot fix a revert.
    Reverted,

    /// The resubmission limit was exhausted without inclusion.
    ResubmissionLimit,

    /// Cancelled before any attempt was submitted.
    Cancelled,
}

/// One concrete signed submission of an operation. Multiple attempts may exist
/// per operation; only the newest one is live, older ones are kept for audit.
#[derive(Debug, Clone, PartialEq, BorshSerialize, BorshDeserialize, Arbitrary)]
pub struct TxAttemptEntry {
    pub op_seq: u64,
    pub attempt_no: u32,
    pub nonce: u64,
    pub gas_price: u64,
    tx_raw: Vec<u8>,
    txid: Buf32,
    pub submitted_at: u64,
    pub status: TxAttemptStatus,
}

impl TxAttemptEntry {
    pub fn new_pending(
        op_seq: u64,
        attempt_no: u32,
        nonce: u64,
        gas_price: u64,
        tx_raw: Vec<u8>,
        txid: Buf32,
        submitted_at: u64,
    ) -> Self {
        Self {
            op_seq,
            attempt_no,
            nonce,
            gas_price,
            tx_raw,
            txid,
            submitted_at,
            status: TxAttemptStatus::Pending,
        }
    }

    pub fn tx_raw(&self) -> &[u8] {
        &self.tx_raw
    }

    pub fn txid(&self) -> Buf32 {
        self.txid
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Confirmation state attached to a [`TxAttemptEntry`].
///
/// ## State Transitions
///
/// - `Pending` -> `IncludedUnconfirmed` / `Confirmed`: seen in a block.
/// - `IncludedUnconfirmed` -> `Confirmed`: confirmation depth reached.
/// - `IncludedUnconfirmed` / `Confirmed` -> `Pending`: the containing block
///   was reorged away. This is the one exception to monotonic progression.
/// - `Pending` -> `Stuck`: no inclusion within the expected wait time. A stuck
///   attempt is retired, never revived; resubmission creates a new attempt.
/// - included states -> `Failed`: execution reverted.
#[derive(Debug, Clone, Copy, PartialEq, BorshSerialize, BorshDeserialize, Arbitrary)]
pub enum TxAttemptStatus {
    /// Broadcast but not seen in any block yet.
    Pending,

    /// Seen in a block, confirmation depth below the threshold.
    IncludedUnconfirmed { height: u64 },

    /// Included with at least the configured depth of blocks on top.
    Confirmed { height: u64 },

    /// Not included within the expected wait time. Terminal for the attempt;
    /// a replacement attempt with the same nonce takes over.
    Stuck,

    /// Execution reverted. Terminal.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid attempt status transition {0:?} -> {1:?}")]
pub struct InvalidTransition(pub TxAttemptStatus, pub TxAttemptStatus);

impl TxAttemptStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxAttemptStatus::Stuck | TxAttemptStatus::Failed)
    }

    pub fn is_included(&self) -> bool {
        matches!(
            self,
            TxAttemptStatus::IncludedUnconfirmed { .. } | TxAttemptStatus::Confirmed { .. }
        )
    }

    /// Attempts to transition to `target`, rejecting anything the confirmation
    /// lifecycle does not allow. In particular `Stuck` and `Failed` are dead
    /// ends, and only included states may revert to `Pending` (reorg).
    pub fn transition(&mut self, target: TxAttemptStatus) -> Result<(), InvalidTransition> {
        use TxAttemptStatus::*;

        let valid = match (*self, &target) {
            (Pending, IncludedUnconfirmed { .. }) => true,
            (Pending, Confirmed { .. }) => true,
            (Pending, Stuck) => true,
            // Found included with reverted execution.
            (Pending, Failed) => true,

            (IncludedUnconfirmed { .. }, Confirmed { .. }) => true,
            // Reorg moved the tx to a different (possibly shallower) block.
            (IncludedUnconfirmed { .. }, IncludedUnconfirmed { .. }) => true,
            (IncludedUnconfirmed { .. }, Pending) => true,
            (IncludedUnconfirmed { .. }, Failed) => true,

            (Confirmed { .. }, Confirmed { .. }) => true,
            (Confirmed { .. }, IncludedUnconfirmed { .. }) => true,
            (Confirmed { .. }, Pending) => true,
            (Confirmed { .. }, Failed) => true,

            _ => false,
        };

        if valid {
            *self = target;
            Ok(())
        } else {
            Err(InvalidTransition(*self, target))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_progression() {
        let mut status = TxAttemptStatus::Pending;
        status
            .transition(TxAttemptStatus::IncludedUnconfirmed { height: 10 })
            .unwrap();
        status
            .transition(TxAttemptStatus::Confirmed { height: 10 })
            .unwrap();
        assert_eq!(status, TxAttemptStatus::Confirmed { height: 10 });
    }

    #[test]
    fn test_reorg_reverts_included_states() {
        for included in [
            TxAttemptStatus::IncludedUnconfirmed { height: 5 },
            TxAttemptStatus::Confirmed { height: 5 },
        ] {
            let mut status = included;
            status.transition(TxAttemptStatus::Pending).unwrap();
            assert_eq!(status, TxAttemptStatus::Pending);
        }
    }

    #[test]
    fn test_stuck_is_a_dead_end() {
        let mut status = TxAttemptStatus::Stuck;
        let res = status.transition(TxAttemptStatus::Pending);
        assert!(
            matches!(res, Err(InvalidTransition(TxAttemptStatus::Stuck, _))),
            "a stuck attempt must be retired, not revived"
        );

        let res = status.transition(TxAttemptStatus::IncludedUnconfirmed { height: 1 });
        assert!(res.is_err());
    }

    #[test]
    fn test_failed_is_a_dead_end() {
        let mut status = TxAttemptStatus::Failed;
        for target in [
            TxAttemptStatus::Pending,
            TxAttemptStatus::Confirmed { height: 1 },
            TxAttemptStatus::Stuck,
        ] {
            assert!(status.transition(target).is_err());
        }
    }

    #[test]
    fn test_pending_cannot_regress_from_terminal_paths() {
        let mut status = TxAttemptStatus::Pending;
        // Pending has never been included, so it can't go back to itself.
        assert!(status.transition(TxAttemptStatus::Pending).is_err());
        status.transition(TxAttemptStatus::Stuck).unwrap();
        assert!(status.is_terminal());
    }
}
