//! Rollup operator client: wires the store, the chain client and the engine
//! tasks together and runs until shutdown.

use std::{fs, sync::Arc, time::Duration};

use anyhow::Context;
use cairn_common::logging;
use cairn_config::Config;
use cairn_ethio::{
    dispatcher::{spawn_dispatcher_task, DispatcherHandle, OperationOutcome},
    gas::spawn_gas_price_task,
    rpc::{traits::L1Client, HttpL1Client},
    signer::DigestSigner,
    watcher::spawn_watcher_task,
};
use cairn_mem_store::MemSenderDb;
use cairn_prover_pool::{spawn_liveness_task, ProofResult};
use cairn_tasks::{TaskExecutor, TaskManager};
use tokio::sync::mpsc;
use tracing::*;

use crate::args::Args;

mod args;

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    if let Err(e) = main_inner(args) {
        eprintln!("FATAL ERROR: {e}");
        return Err(e);
    }
    Ok(())
}

fn main_inner(args: Args) -> anyhow::Result<()> {
    // Start runtime for async IO tasks.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("cairn-rt")
        .build()
        .expect("init: build rt");

    // Init the logging before we do anything else.
    logging::init(logging::LoggerConfig::with_base_name("cairn-client"));

    let config = load_config(&args)?;

    let rpc_client = Arc::new(HttpL1Client::new(
        config.l1.rpc_url.clone(),
        Duration::from_millis(config.l1.rpc_timeout_ms),
    )?);
    let db = MemSenderDb::new_shared();
    let signer = Arc::new(DigestSigner::new(config.client.signer_account.clone()));

    let task_manager = TaskManager::new(runtime.handle().clone());
    let executor = task_manager.executor();

    // The store starts empty here, so the nonce sequence seeds from the
    // chain's view of the account.
    let chain_nonce =
        runtime.block_on(rpc_client.get_account_nonce(&config.client.signer_account))?;

    let gas_price = spawn_gas_price_task(&executor, rpc_client.clone(), config.ethio.gas.clone());
    let (dispatcher_handle, outcome_rx) = spawn_dispatcher_task(
        &executor,
        rpc_client.clone(),
        signer,
        gas_price,
        db.clone(),
        config.ethio.dispatcher.clone(),
        chain_nonce,
    )?;
    spawn_watcher_task(&executor, rpc_client, db, config.ethio.watcher.clone());

    // Worker pool; the worker-facing RPC surface serves registration,
    // heartbeats and job hand-out from this handle.
    let (pool_handle, admit_rx) = spawn_liveness_task(&executor, config.prover_pool.clone());

    spawn_admission_forwarder(&executor, dispatcher_handle, admit_rx);
    spawn_outcome_logger(&executor, outcome_rx);

    task_manager.start_signal_listeners();
    info!("cairn client ready");

    let res = task_manager.monitor();
    drop(pool_handle);
    res.map_err(Into::into)
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let raw = fs::read_to_string(&args.config)
        .with_context(|| format!("reading config {}", args.config.display()))?;
    let mut config: Config = toml::from_str(&raw).context("parsing config")?;

    if let Some(url) = &args.rpc_url {
        config.l1.rpc_url = url.clone();
    }
    if let Some(account) = &args.signer_account {
        config.client.signer_account = account.clone();
    }
    Ok(config)
}

/// Bridges admitted proof results into the dispatch queue, fire-and-forget.
fn spawn_admission_forwarder(
    executor: &TaskExecutor,
    dispatcher: DispatcherHandle<MemSenderDb>,
    mut admit_rx: mpsc::Receiver<ProofResult>,
) {
    executor.spawn_critical_async("admission_forwarder", async move {
        while let Some(result) = admit_rx.recv().await {
            let seq = result.op_seq;
            match dispatcher
                .submit_operation(seq, result.commitment, result.payload)
                .await
            {
                Ok(true) => debug!(%seq, "proof result enqueued for submission"),
                Ok(false) => debug!(%seq, "proof result already enqueued"),
                Err(err) => warn!(%seq, %err, "failed to enqueue proof result"),
            }
        }
        Ok(())
    });
}

fn spawn_outcome_logger(executor: &TaskExecutor, mut outcome_rx: mpsc::Receiver<OperationOutcome>) {
    executor.spawn_critical_async("outcome_logger", async move {
        while let Some(outcome) = outcome_rx.recv().await {
            match outcome {
                OperationOutcome::Confirmed { seq, txid, height } => {
                    info!(%seq, %txid, %height, "operation confirmed on chain");
                }
                OperationOutcome::Reverted { seq, txid } => {
                    error!(%seq, %txid, "operation reverted, operator intervention required");
                }
                OperationOutcome::ResubmissionsExhausted { seq, attempts } => {
                    error!(%seq, %attempts, "operation abandoned after exhausting resubmissions");
                }
            }
        }
        Ok(())
    });
}
