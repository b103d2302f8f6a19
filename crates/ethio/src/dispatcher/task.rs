use std::{sync::Arc, time::Duration};

use cairn_common::time::now_millis;
use cairn_config::DispatcherConfig;
use cairn_db::{
    traits::SenderDatabase,
    types::{AbandonReason, OperationStatus, TxAttemptEntry, TxAttemptStatus},
};
use cairn_primitives::buf::Buf32;
use tokio::sync::{mpsc, oneshot};
use tracing::*;

use crate::{gas::GasPriceHandle, rpc::traits::L1Client, signer::TxSigner};

use super::{
    error::{DispatcherError, DispatcherResult},
    state::DispatcherState,
};

/// Terminal outcome of an operation, reported to the engine's owner.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    Confirmed { seq: u64, txid: Buf32, height: u64 },
    Reverted { seq: u64, txid: Buf32 },
    ResubmissionsExhausted { seq: u64, attempts: u32 },
}

/// Messages from the handle to the dispatcher task.
#[derive(Debug)]
pub(crate) enum DispatcherMessage {
    Enqueue(u64),
    Cancel(u64, oneshot::Sender<bool>),
}

pub(crate) struct DispatcherContext<D, C, S> {
    pub(crate) db: Arc<D>,
    pub(crate) rpc_client: Arc<C>,
    pub(crate) signer: Arc<S>,
    pub(crate) gas_price: GasPriceHandle,
    pub(crate) config: DispatcherConfig,
    pub(crate) outcome_tx: mpsc::Sender<OperationOutcome>,
}

/// Periodically drains queued operations into fresh attempts, acts on
/// terminal attempt states and keeps broadcasting until the node acks.
pub(crate) async fn dispatcher_task<D, C, S>(
    ctx: DispatcherContext<D, C, S>,
    mut state: DispatcherState,
    mut msg_rx: mpsc::Receiver<DispatcherMessage>,
) -> anyhow::Result<()>
where
    D: SenderDatabase + Send + Sync + 'static,
    C: L1Client,
    S: TxSigner,
{
    info!("starting dispatcher task");
    let mut interval = tokio::time::interval(Duration::from_millis(ctx.config.dispatch_interval_ms));

    loop {
        tokio::select! {
            _ = interval.tick() => {}

            Some(msg) = msg_rx.recv() => handle_message(&ctx, &mut state, msg),
        }

        if let Err(err) = run_tick(&ctx, &mut state).await {
            // Transient IO failures are absorbed here; the next tick retries.
            warn!(%err, "dispatcher tick failed");
        }
    }
}

pub(crate) fn handle_message<D, C, S>(
    ctx: &DispatcherContext<D, C, S>,
    state: &mut DispatcherState,
    msg: DispatcherMessage,
) where
    D: SenderDatabase + Send + Sync + 'static,
{
    match msg {
        DispatcherMessage::Enqueue(seq) => {
            debug!(%seq, "received operation");
            state.queue.push_back(seq);
        }
        DispatcherMessage::Cancel(seq, resp) => {
            // Once an attempt is out on the chain it cannot be recalled, so
            // only still-queued operations are cancellable.
            let cancellable = state.queue.contains(&seq);
            if cancellable {
                state.queue.retain(|&queued| queued != seq);
                if let Err(err) = ctx
                    .db
                    .set_operation_status(seq, OperationStatus::Abandoned(AbandonReason::Cancelled))
                {
                    warn!(%seq, %err, "failed to persist cancellation");
                }
                info!(%seq, "operation cancelled before first attempt");
            }
            let _ = resp.send(cancellable);
        }
    }
}

pub(crate) async fn run_tick<D, C, S>(
    ctx: &DispatcherContext<D, C, S>,
    state: &mut DispatcherState,
) -> DispatcherResult<()>
where
    D: SenderDatabase + Send + Sync + 'static,
    C: L1Client,
    S: TxSigner,
{
    process_live_attempts(ctx, state).await?;
    fill_in_flight(ctx, state)?;
    broadcast_unsent(ctx, state).await;
    Ok(())
}

/// Reads back the watcher's view of every live attempt and acts on terminal
/// states: confirmation completes the operation, a revert abandons it, a
/// stuck attempt goes through bounded resubmission.
async fn process_live_attempts<D, C, S>(
    ctx: &DispatcherContext<D, C, S>,
    state: &mut DispatcherState,
) -> DispatcherResult<()>
where
    D: SenderDatabase + Send + Sync + 'static,
    S: TxSigner,
{
    let live_seqs: Vec<u64> = state.live.keys().copied().collect();
    for seq in live_seqs {
        let attempt_no = state.live[&seq].attempt_no;
        let Some(stored) = ctx.db.get_attempt(seq, attempt_no)? else {
            warn!(%seq, %attempt_no, "live attempt missing from store");
            continue;
        };

        match stored.status {
            TxAttemptStatus::Confirmed { height } => {
                ctx.db
                    .set_operation_status(seq, OperationStatus::Complete)?;
                state.retire(seq);
                info!(%seq, txid = %stored.txid(), %height, "operation confirmed");
                report(
                    ctx,
                    OperationOutcome::Confirmed {
                        seq,
                        txid: stored.txid(),
                        height,
                    },
                )
                .await;
            }
            TxAttemptStatus::Failed => {
                ctx.db.set_operation_status(
                    seq,
                    OperationStatus::Abandoned(AbandonReason::Reverted),
                )?;
                state.retire(seq);
                error!(%seq, txid = %stored.txid(), "execution reverted; operator intervention required");
                report(
                    ctx,
                    OperationOutcome::Reverted {
                        seq,
                        txid: stored.txid(),
                    },
                )
                .await;
            }
            TxAttemptStatus::Stuck => resubmit(ctx, state, stored).await?,
            _ => {
                if stored.status.is_included() {
                    // The chain has it; no point rebroadcasting.
                    state.unsent.remove(&seq);
                }
                state.live.insert(seq, stored);
            }
        }
    }
    Ok(())
}

/// Retires a stuck attempt and replaces it with a re-priced one carrying the
/// same nonce, or abandons the operation once its resubmission allowance is
/// spent.
async fn resubmit<D, C, S>(
    ctx: &DispatcherContext<D, C, S>,
    state: &mut DispatcherState,
    stuck: TxAttemptEntry,
) -> DispatcherResult<()>
where
    D: SenderDatabase + Send + Sync + 'static,
    S: TxSigner,
{
    let seq = stuck.op_seq;

    if stuck.attempt_no >= ctx.config.max_resubmissions {
        ctx.db.set_operation_status(
            seq,
            OperationStatus::Abandoned(AbandonReason::ResubmissionLimit),
        )?;
        state.retire(seq);
        error!(
            %seq,
            attempts = stuck.attempt_no + 1,
            "resubmission limit exhausted; operator intervention required"
        );
        report(
            ctx,
            OperationOutcome::ResubmissionsExhausted {
                seq,
                attempts: stuck.attempt_no + 1,
            },
        )
        .await;
        return Ok(());
    }

    let op = ctx
        .db
        .get_operation(seq)?
        .ok_or(cairn_db::DbError::MissingOperation(seq))?;

    // Nonce is preserved so the replacement displaces the stuck tx; the price
    // is re-read from the adjuster and must strictly outbid the old attempt.
    let gas_price = ctx.gas_price.current_estimate().max(stuck.gas_price + 1);
    let signed = ctx.signer.sign_tx(op.payload(), stuck.nonce, gas_price)?;
    let attempt = TxAttemptEntry::new_pending(
        seq,
        stuck.attempt_no + 1,
        stuck.nonce,
        gas_price,
        signed.raw,
        signed.txid,
        now_millis(),
    );
    ctx.db.put_attempt(attempt.clone())?;
    state.live.insert(seq, attempt);
    state.unsent.insert(seq);
    info!(%seq, attempt_no = stuck.attempt_no + 1, %gas_price, "resubmitting stuck attempt");
    Ok(())
}

/// Drains queued operations FIFO into fresh attempts while in-flight slots
/// are free. Nonce assignment happens here and only here.
fn fill_in_flight<D, C, S>(
    ctx: &DispatcherContext<D, C, S>,
    state: &mut DispatcherState,
) -> DispatcherResult<()>
where
    D: SenderDatabase + Send + Sync + 'static,
    S: TxSigner,
{
    while state.live.len() < ctx.config.max_in_flight {
        let Some(seq) = state.queue.pop_front() else {
            break;
        };
        let Some(op) = ctx.db.get_operation(seq)? else {
            warn!(%seq, "queued operation missing from store");
            continue;
        };
        if op.status != OperationStatus::Queued {
            debug!(%seq, status = ?op.status, "skipping non-queued operation");
            continue;
        }

        let gas_price = ctx.gas_price.current_estimate();
        let nonce = state.next_nonce;
        let signed = match ctx.signer.sign_tx(op.payload(), nonce, gas_price) {
            Ok(signed) => signed,
            Err(err) => {
                state.queue.push_front(seq);
                return Err(DispatcherError::Signer(err));
            }
        };
        let attempt = TxAttemptEntry::new_pending(
            seq,
            0,
            nonce,
            gas_price,
            signed.raw,
            signed.txid,
            now_millis(),
        );
        if let Err(err) = ctx.db.put_attempt(attempt.clone()) {
            state.queue.push_front(seq);
            return Err(err.into());
        }
        ctx.db
            .set_operation_status(seq, OperationStatus::InFlight)?;

        // The nonce is consumed only once the attempt is durably recorded.
        state.next_nonce += 1;
        state.live.insert(seq, attempt);
        state.unsent.insert(seq);
        info!(%seq, %nonce, %gas_price, "submitting operation");
    }
    Ok(())
}

/// Pushes every not-yet-acked live attempt to the node. "Already known"
/// counts as accepted; transport failures stay queued for the next tick.
async fn broadcast_unsent<D, C, S>(ctx: &DispatcherContext<D, C, S>, state: &mut DispatcherState)
where
    C: L1Client,
{
    let unsent: Vec<u64> = state.unsent.iter().copied().collect();
    for seq in unsent {
        let Some(attempt) = state.live.get(&seq) else {
            state.unsent.remove(&seq);
            continue;
        };
        match ctx.rpc_client.send_raw_tx(attempt.tx_raw()).await {
            Ok(txid) => {
                debug!(%seq, %txid, "broadcast accepted");
                state.unsent.remove(&seq);
            }
            Err(err) if err.is_already_known() => {
                state.unsent.remove(&seq);
            }
            Err(err) => {
                warn!(%seq, %err, "broadcast failed, will retry next tick");
            }
        }
    }
}

async fn report<D, C, S>(ctx: &DispatcherContext<D, C, S>, outcome: OperationOutcome) {
    if ctx.outcome_tx.send(outcome).await.is_err() {
        warn!("operation outcome receiver dropped");
    }
}

#[cfg(test)]
mod tests {
    use cairn_db::types::OperationEntry;
    use cairn_mem_store::MemSenderDb;

    use super::*;
    use crate::{signer::DigestSigner, test_utils::TestL1Client};

    const TEST_GAS_PRICE: u64 = 100;

    fn test_ctx(
        db: Arc<MemSenderDb>,
        client: Arc<TestL1Client>,
    ) -> (
        DispatcherContext<MemSenderDb, TestL1Client, DigestSigner>,
        mpsc::Receiver<OperationOutcome>,
    ) {
        let (outcome_tx, outcome_rx) = mpsc::channel(16);
        let ctx = DispatcherContext {
            db,
            rpc_client: client,
            signer: Arc::new(DigestSigner::new("0xoperator".to_string())),
            gas_price: GasPriceHandle::fixed(TEST_GAS_PRICE),
            config: DispatcherConfig {
                max_in_flight: 3,
                dispatch_interval_ms: 100,
                max_resubmissions: 2,
            },
            outcome_tx,
        };
        (ctx, outcome_rx)
    }

    fn seed_queued_ops(db: &MemSenderDb, count: u64) {
        for seq in 1..=count {
            let entry = OperationEntry::new_queued([seq as u8; 32].into(), vec![seq as u8], 1_000);
            assert!(db.put_operation(seq, entry).unwrap());
        }
    }

    fn init_state(db: &MemSenderDb) -> DispatcherState {
        DispatcherState::initialize(db, 0).unwrap()
    }

    #[tokio::test]
    async fn test_backpressure_bounds_in_flight() {
        let db = MemSenderDb::new_shared();
        let client = Arc::new(TestL1Client::new(100));
        seed_queued_ops(&db, 5);
        let (ctx, _outcome_rx) = test_ctx(db.clone(), client.clone());
        let mut state = init_state(&db);

        run_tick(&ctx, &mut state).await.unwrap();

        assert_eq!(state.live.len(), 3, "exactly max_in_flight go live");
        assert_eq!(state.queue.len(), 2, "the rest keep waiting");
        assert!(state.unsent.is_empty(), "all broadcasts accepted");
        assert_eq!(client.sent_count(), 3);

        // Nonces are contiguous across the live attempts.
        let nonces: Vec<u64> = state.live.values().map(|a| a.nonce).collect();
        assert_eq!(nonces, vec![0, 1, 2]);

        for seq in 1..=3 {
            let op = db.get_operation(seq).unwrap().unwrap();
            assert_eq!(op.status, OperationStatus::InFlight);
        }
        for seq in 4..=5 {
            let op = db.get_operation(seq).unwrap().unwrap();
            assert_eq!(op.status, OperationStatus::Queued);
        }
    }

    #[tokio::test]
    async fn test_confirmation_frees_slot_for_queued_op() {
        let db = MemSenderDb::new_shared();
        let client = Arc::new(TestL1Client::new(100));
        seed_queued_ops(&db, 5);
        let (ctx, mut outcome_rx) = test_ctx(db.clone(), client);
        let mut state = init_state(&db);
        run_tick(&ctx, &mut state).await.unwrap();

        // The watcher confirms op 1's attempt.
        db.set_attempt_status(1, 0, TxAttemptStatus::Confirmed { height: 90 })
            .unwrap();
        run_tick(&ctx, &mut state).await.unwrap();

        let op = db.get_operation(1).unwrap().unwrap();
        assert_eq!(op.status, OperationStatus::Complete);
        assert!(!state.live.contains_key(&1));
        assert!(state.live.contains_key(&4), "freed slot refills from queue");
        assert_eq!(state.live[&4].nonce, 3, "nonce sequence continues");

        let outcome = outcome_rx.try_recv().unwrap();
        assert!(matches!(outcome, OperationOutcome::Confirmed { seq: 1, .. }));
    }

    #[tokio::test]
    async fn test_stuck_attempt_resubmits_with_same_nonce() {
        let db = MemSenderDb::new_shared();
        let client = Arc::new(TestL1Client::new(100));
        seed_queued_ops(&db, 1);
        let (ctx, mut outcome_rx) = test_ctx(db.clone(), client);
        let mut state = init_state(&db);
        run_tick(&ctx, &mut state).await.unwrap();

        let original = state.live[&1].clone();
        db.set_attempt_status(1, 0, TxAttemptStatus::Stuck).unwrap();
        run_tick(&ctx, &mut state).await.unwrap();

        let replacement = &state.live[&1];
        assert_eq!(replacement.attempt_no, 1);
        assert_eq!(replacement.nonce, original.nonce, "nonce preserved");
        assert!(
            replacement.gas_price > original.gas_price,
            "replacement must outbid"
        );
        assert_ne!(replacement.txid(), original.txid());

        // The retired attempt stays recorded for audit.
        let retired = db.get_attempt(1, 0).unwrap().unwrap();
        assert_eq!(retired.status, TxAttemptStatus::Stuck);
        assert!(outcome_rx.try_recv().is_err(), "no terminal outcome yet");
    }

    #[tokio::test]
    async fn test_resubmission_limit_abandons_operation() {
        let db = MemSenderDb::new_shared();
        let client = Arc::new(TestL1Client::new(100));
        seed_queued_ops(&db, 1);
        let (ctx, mut outcome_rx) = test_ctx(db.clone(), client);
        let mut state = init_state(&db);
        run_tick(&ctx, &mut state).await.unwrap();

        // Two resubmissions are allowed; the third stuck attempt is fatal.
        for expected_attempt in 1..=2u32 {
            let attempt_no = state.live[&1].attempt_no;
            db.set_attempt_status(1, attempt_no, TxAttemptStatus::Stuck)
                .unwrap();
            run_tick(&ctx, &mut state).await.unwrap();
            assert_eq!(state.live[&1].attempt_no, expected_attempt);
        }
        db.set_attempt_status(1, 2, TxAttemptStatus::Stuck).unwrap();
        run_tick(&ctx, &mut state).await.unwrap();

        assert!(!state.live.contains_key(&1));
        let op = db.get_operation(1).unwrap().unwrap();
        assert_eq!(
            op.status,
            OperationStatus::Abandoned(AbandonReason::ResubmissionLimit)
        );
        let outcome = outcome_rx.try_recv().unwrap();
        assert_eq!(
            outcome,
            OperationOutcome::ResubmissionsExhausted { seq: 1, attempts: 3 }
        );
    }

    #[tokio::test]
    async fn test_revert_is_fatal_and_never_retried() {
        let db = MemSenderDb::new_shared();
        let client = Arc::new(TestL1Client::new(100));
        seed_queued_ops(&db, 1);
        let (ctx, mut outcome_rx) = test_ctx(db.clone(), client);
        let mut state = init_state(&db);
        run_tick(&ctx, &mut state).await.unwrap();

        db.set_attempt_status(1, 0, TxAttemptStatus::Failed).unwrap();
        run_tick(&ctx, &mut state).await.unwrap();

        assert!(!state.live.contains_key(&1));
        let op = db.get_operation(1).unwrap().unwrap();
        assert_eq!(
            op.status,
            OperationStatus::Abandoned(AbandonReason::Reverted)
        );
        assert!(matches!(
            outcome_rx.try_recv().unwrap(),
            OperationOutcome::Reverted { seq: 1, .. }
        ));
        assert!(
            db.get_attempt(1, 1).unwrap().is_none(),
            "no replacement attempt for a revert"
        );
    }

    #[tokio::test]
    async fn test_broadcast_retries_after_transient_error() {
        let db = MemSenderDb::new_shared();
        let client = Arc::new(TestL1Client::new(100));
        client.set_fail_sends(true);
        seed_queued_ops(&db, 1);
        let (ctx, _outcome_rx) = test_ctx(db.clone(), client.clone());
        let mut state = init_state(&db);

        run_tick(&ctx, &mut state).await.unwrap();
        assert!(state.unsent.contains(&1), "send failed, still unsent");

        client.set_fail_sends(false);
        run_tick(&ctx, &mut state).await.unwrap();
        assert!(state.unsent.is_empty());
        assert_eq!(client.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_only_before_first_attempt() {
        let db = MemSenderDb::new_shared();
        let client = Arc::new(TestL1Client::new(100));
        seed_queued_ops(&db, 4);
        let (ctx, _outcome_rx) = test_ctx(db.clone(), client);
        let mut state = init_state(&db);
        run_tick(&ctx, &mut state).await.unwrap();

        // Op 4 is still queued; cancellation succeeds.
        let (tx, rx) = oneshot::channel();
        handle_message(&ctx, &mut state, DispatcherMessage::Cancel(4, tx));
        assert!(rx.await.unwrap());
        let op = db.get_operation(4).unwrap().unwrap();
        assert_eq!(
            op.status,
            OperationStatus::Abandoned(AbandonReason::Cancelled)
        );

        // Op 1 already has a live attempt; cancellation is refused.
        let (tx, rx) = oneshot::channel();
        handle_message(&ctx, &mut state, DispatcherMessage::Cancel(1, tx));
        assert!(!rx.await.unwrap());
        assert!(state.live.contains_key(&1));
    }
}
