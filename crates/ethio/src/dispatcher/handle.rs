use std::sync::Arc;

use cairn_common::time::now_millis;
use cairn_config::DispatcherConfig;
use cairn_db::{traits::SenderDatabase, types::OperationEntry};
use cairn_primitives::buf::Buf32;
use cairn_tasks::TaskExecutor;
use tokio::sync::{mpsc, oneshot};
use tracing::*;

use crate::{gas::GasPriceHandle, rpc::traits::L1Client, signer::TxSigner};

use super::{
    error::{DispatcherError, DispatcherResult},
    state::DispatcherState,
    task::{dispatcher_task, DispatcherContext, DispatcherMessage, OperationOutcome},
};

/// Handle for feeding operations into the dispatcher task.
pub struct DispatcherHandle<D> {
    db: Arc<D>,
    sender: mpsc::Sender<DispatcherMessage>,
}

impl<D: SenderDatabase + Send + Sync + 'static> DispatcherHandle<D> {
    pub(crate) fn new(db: Arc<D>, sender: mpsc::Sender<DispatcherMessage>) -> Self {
        Self { db, sender }
    }

    /// Enqueues an operation for submission. Idempotent on the sequence
    /// number: a second submit for a seq that already has an entry (queued,
    /// live or terminal) is a no-op returning `false`.
    pub async fn submit_operation(
        &self,
        seq: u64,
        commitment: Buf32,
        payload: Vec<u8>,
    ) -> DispatcherResult<bool> {
        let entry = OperationEntry::new_queued(commitment, payload, now_millis());
        if !self.db.put_operation(seq, entry)? {
            warn!(%seq, "ignoring duplicate operation submission");
            return Ok(false);
        }

        if self.sender.send(DispatcherMessage::Enqueue(seq)).await.is_err() {
            // Not really an error, it just means the task is shutting down;
            // the entry is persisted and will be picked up on restart.
            warn!(%seq, "dispatcher task not running, operation parked in store");
        }
        Ok(true)
    }

    /// Cancels an operation. Succeeds only while it is still queued; once an
    /// attempt is live on the chain it can only be replaced, not recalled.
    pub async fn cancel_operation(&self, seq: u64) -> DispatcherResult<bool> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.sender
            .send(DispatcherMessage::Cancel(seq, resp_tx))
            .await
            .map_err(|_| DispatcherError::Other("dispatcher task not running".to_string()))?;
        resp_rx
            .await
            .map_err(|_| DispatcherError::Other("cancel request dropped".to_string()))
    }
}

/// Spawns the dispatcher task, rebuilding its state from the store. Returns
/// the submit handle and the channel on which terminal operation outcomes are
/// reported.
#[allow(clippy::type_complexity)]
pub fn spawn_dispatcher_task<D, C, S>(
    executor: &TaskExecutor,
    rpc_client: Arc<C>,
    signer: Arc<S>,
    gas_price: GasPriceHandle,
    db: Arc<D>,
    config: DispatcherConfig,
    chain_nonce: u64,
) -> DispatcherResult<(DispatcherHandle<D>, mpsc::Receiver<OperationOutcome>)>
where
    D: SenderDatabase + Send + Sync + 'static,
    C: L1Client,
    S: TxSigner,
{
    let state = DispatcherState::initialize(db.as_ref(), chain_nonce)?;
    let (msg_tx, msg_rx) = mpsc::channel(64);
    let (outcome_tx, outcome_rx) = mpsc::channel(64);

    let ctx = DispatcherContext {
        db: db.clone(),
        rpc_client,
        signer,
        gas_price,
        config,
        outcome_tx,
    };
    executor.spawn_critical_async(
        "ethio::dispatcher_task",
        dispatcher_task(ctx, state, msg_rx),
    );

    Ok((DispatcherHandle::new(db, msg_tx), outcome_rx))
}
