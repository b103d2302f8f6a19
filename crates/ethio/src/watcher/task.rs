use std::{sync::Arc, time::Duration};

use cairn_common::time::now_millis;
use cairn_config::WatcherConfig;
use cairn_db::{
    traits::SenderDatabase,
    types::{InvalidTransition, OperationStatus, TxAttemptEntry, TxAttemptStatus},
    DbError,
};
use cairn_tasks::TaskExecutor;
use thiserror::Error;
use tracing::*;

use crate::rpc::{traits::L1Client, types::RpcTxStatus, ClientError};

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("db: {0}")]
    Db(#[from] DbError),

    #[error("client: {0}")]
    Client(#[from] ClientError),

    #[error("status: {0}")]
    Transition(#[from] InvalidTransition),
}

pub type WatcherResult<T> = Result<T, WatcherError>;

/// Spawns the confirmation watcher task.
pub fn spawn_watcher_task<D, C>(
    executor: &TaskExecutor,
    rpc_client: Arc<C>,
    db: Arc<D>,
    config: WatcherConfig,
) where
    D: SenderDatabase + Send + Sync + 'static,
    C: L1Client,
{
    executor.spawn_critical_async("ethio::watcher_task", watcher_task(rpc_client, db, config));
}

/// Polls the chain on its own interval, decoupled from the dispatcher tick,
/// and advances attempt statuses in the store. The dispatcher acts on the
/// terminal states it finds there.
pub async fn watcher_task<D, C>(
    rpc_client: Arc<C>,
    db: Arc<D>,
    config: WatcherConfig,
) -> anyhow::Result<()>
where
    D: SenderDatabase + Send + Sync + 'static,
    C: L1Client,
{
    info!("starting confirmation watcher task");
    let interval = tokio::time::interval(Duration::from_millis(config.poll_interval_ms));
    tokio::pin!(interval);

    loop {
        interval.as_mut().tick().await;

        if let Err(err) = poll_once(rpc_client.as_ref(), db.as_ref(), &config, now_millis()).await
        {
            // A failed poll cycle is retried on the next interval.
            warn!(%err, "watcher poll failed");
        }
    }
}

/// One poll cycle: fetch the chain height once, then re-query inclusion for
/// every live attempt. Inclusion is never cached across polls, which is what
/// makes reorg detection work.
pub(crate) async fn poll_once<D, C>(
    rpc_client: &C,
    db: &D,
    config: &WatcherConfig,
    now: u64,
) -> WatcherResult<()>
where
    D: SenderDatabase + Send + Sync + 'static,
    C: L1Client,
{
    let chain_height = rpc_client.get_chain_height().await?;

    for (seq, op) in db.get_pending_operations()? {
        if op.status != OperationStatus::InFlight {
            continue;
        }
        let Some(attempt) = db.get_latest_attempt(seq)? else {
            warn!(%seq, "in-flight operation has no attempt recorded");
            continue;
        };
        if attempt.is_terminal() {
            // Retired attempts are excluded from polling.
            continue;
        }

        let observed = match rpc_client.get_tx_status(attempt.txid()).await {
            Ok(observed) => observed,
            Err(err) => {
                warn!(%seq, txid = %attempt.txid(), %err, "tx status query failed, skipping");
                continue;
            }
        };

        let Some(next) = next_status(&attempt, observed, chain_height, config, now) else {
            continue;
        };

        if next == TxAttemptStatus::Pending && attempt.status.is_included() {
            warn!(
                %seq,
                txid = %attempt.txid(),
                prev = ?attempt.status,
                "reorg detected, reverting attempt to pending"
            );
        } else {
            debug!(%seq, txid = %attempt.txid(), prev = ?attempt.status, ?next, "attempt status advanced");
        }

        let mut status = attempt.status;
        status.transition(next)?;
        db.set_attempt_status(seq, attempt.attempt_no, status)?;
    }
    Ok(())
}

/// Decides the next status for a live attempt given what the chain reports.
/// Returns `None` when nothing changes.
///
/// The inclusion-depth check runs before any staleness check: an included but
/// shallow attempt is never stuck.
fn next_status(
    attempt: &TxAttemptEntry,
    observed: Option<RpcTxStatus>,
    chain_height: u64,
    config: &WatcherConfig,
    now: u64,
) -> Option<TxAttemptStatus> {
    let next = match observed {
        Some(tx) if !tx.success => TxAttemptStatus::Failed,
        Some(tx) => {
            let depth = chain_height.saturating_sub(tx.block_height);
            if depth >= config.confirmation_depth {
                TxAttemptStatus::Confirmed {
                    height: tx.block_height,
                }
            } else {
                TxAttemptStatus::IncludedUnconfirmed {
                    height: tx.block_height,
                }
            }
        }
        None => match attempt.status {
            // Previously included but now absent from the canonical chain.
            TxAttemptStatus::IncludedUnconfirmed { .. } | TxAttemptStatus::Confirmed { .. } => {
                TxAttemptStatus::Pending
            }
            TxAttemptStatus::Pending
                if now.saturating_sub(attempt.submitted_at) > config.expected_wait_ms =>
            {
                TxAttemptStatus::Stuck
            }
            _ => return None,
        },
    };

    (next != attempt.status).then_some(next)
}

#[cfg(test)]
mod tests {
    use cairn_db::types::OperationEntry;
    use cairn_mem_store::MemSenderDb;
    use cairn_primitives::buf::Buf32;

    use super::*;
    use crate::test_utils::TestL1Client;

    fn test_config() -> WatcherConfig {
        WatcherConfig {
            poll_interval_ms: 100,
            confirmation_depth: 6,
            expected_wait_ms: 10_000,
        }
    }

    /// An in-flight op with one pending attempt, submitted at t=1000.
    fn seed_in_flight(db: &MemSenderDb, seq: u64, txid: Buf32) {
        let op = OperationEntry::new_queued([seq as u8; 32].into(), vec![seq as u8], 500);
        db.put_operation(seq, op).unwrap();
        db.set_operation_status(seq, OperationStatus::InFlight)
            .unwrap();
        let attempt =
            TxAttemptEntry::new_pending(seq, 0, seq, 100, vec![seq as u8; 4], txid, 1_000);
        db.put_attempt(attempt).unwrap();
    }

    fn attempt_status(db: &MemSenderDb, seq: u64) -> TxAttemptStatus {
        db.get_attempt(seq, 0).unwrap().unwrap().status
    }

    #[tokio::test]
    async fn test_inclusion_and_confirmation_depth() {
        let db = MemSenderDb::new();
        let client = TestL1Client::new(100);
        let txid = Buf32::from([1; 32]);
        seed_in_flight(&db, 1, txid);

        // Included at height 96 with the chain at 100: depth 4 < 6.
        client.include_tx(txid, 96, true);
        poll_once(&client, &db, &test_config(), 2_000).await.unwrap();
        assert_eq!(
            attempt_status(&db, 1),
            TxAttemptStatus::IncludedUnconfirmed { height: 96 }
        );

        // Chain advances; depth 6 reaches the threshold.
        client.set_height(102);
        poll_once(&client, &db, &test_config(), 3_000).await.unwrap();
        assert_eq!(
            attempt_status(&db, 1),
            TxAttemptStatus::Confirmed { height: 96 }
        );
    }

    #[tokio::test]
    async fn test_reorg_reverts_confirmed_to_pending() {
        let db = MemSenderDb::new();
        let client = TestL1Client::new(110);
        let txid = Buf32::from([2; 32]);
        seed_in_flight(&db, 1, txid);

        client.include_tx(txid, 100, true);
        poll_once(&client, &db, &test_config(), 2_000).await.unwrap();
        assert_eq!(
            attempt_status(&db, 1),
            TxAttemptStatus::Confirmed { height: 100 }
        );

        // The containing block vanishes from the canonical chain.
        client.drop_tx(txid);
        poll_once(&client, &db, &test_config(), 3_000).await.unwrap();
        assert_eq!(attempt_status(&db, 1), TxAttemptStatus::Pending);
    }

    #[tokio::test]
    async fn test_unincluded_past_deadline_is_stuck() {
        let db = MemSenderDb::new();
        let client = TestL1Client::new(100);
        seed_in_flight(&db, 1, Buf32::from([3; 32]));

        // Within the expected wait: still pending.
        poll_once(&client, &db, &test_config(), 5_000).await.unwrap();
        assert_eq!(attempt_status(&db, 1), TxAttemptStatus::Pending);

        // Past submitted_at + expected_wait_ms.
        poll_once(&client, &db, &test_config(), 12_000).await.unwrap();
        assert_eq!(attempt_status(&db, 1), TxAttemptStatus::Stuck);
    }

    #[tokio::test]
    async fn test_included_shallow_attempt_is_never_stuck() {
        let db = MemSenderDb::new();
        let client = TestL1Client::new(100);
        let txid = Buf32::from([4; 32]);
        seed_in_flight(&db, 1, txid);
        client.include_tx(txid, 99, true);

        // Way past the staleness deadline, but the depth check wins.
        poll_once(&client, &db, &test_config(), 500_000).await.unwrap();
        assert_eq!(
            attempt_status(&db, 1),
            TxAttemptStatus::IncludedUnconfirmed { height: 99 }
        );
    }

    #[tokio::test]
    async fn test_reverted_execution_is_failed() {
        let db = MemSenderDb::new();
        let client = TestL1Client::new(100);
        let txid = Buf32::from([5; 32]);
        seed_in_flight(&db, 1, txid);
        client.include_tx(txid, 98, false);

        poll_once(&client, &db, &test_config(), 2_000).await.unwrap();
        assert_eq!(attempt_status(&db, 1), TxAttemptStatus::Failed);
    }

    #[tokio::test]
    async fn test_terminal_attempts_are_not_polled() {
        let db = MemSenderDb::new();
        let client = TestL1Client::new(100);
        let txid = Buf32::from([6; 32]);
        seed_in_flight(&db, 1, txid);
        db.set_attempt_status(1, 0, TxAttemptStatus::Stuck).unwrap();

        // Even if the tx shows up included, a retired attempt stays retired.
        client.include_tx(txid, 99, true);
        poll_once(&client, &db, &test_config(), 2_000).await.unwrap();
        assert_eq!(attempt_status(&db, 1), TxAttemptStatus::Stuck);
    }

    #[test]
    fn test_next_status_no_change_is_none() {
        let config = test_config();
        let attempt = TxAttemptEntry::new_pending(1, 0, 0, 100, vec![], Buf32::zero(), 1_000);
        assert_eq!(next_status(&attempt, None, 100, &config, 2_000), None);

        let observed = Some(RpcTxStatus {
            block_height: 90,
            success: true,
        });
        let mut confirmed = attempt.clone();
        confirmed.status = TxAttemptStatus::Confirmed { height: 90 };
        assert_eq!(next_status(&confirmed, observed, 100, &config, 2_000), None);
    }
}
