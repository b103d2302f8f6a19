use std::{sync::Arc, time::Duration};

use cairn_common::time::now_millis;
use cairn_config::GasConfig;
use cairn_tasks::TaskExecutor;
use tokio::sync::watch;
use tracing::*;

use crate::rpc::traits::L1Client;

use super::adjuster::GasPriceAdjuster;

/// Read side of the live gas price estimate. Cheap to clone, never blocks.
#[derive(Debug, Clone)]
pub struct GasPriceHandle {
    rx: watch::Receiver<u64>,
}

impl GasPriceHandle {
    pub fn current_estimate(&self) -> u64 {
        *self.rx.borrow()
    }

    /// A handle pinned to a constant price, for tests and tools that don't
    /// run the sampling task.
    pub fn fixed(price: u64) -> Self {
        let (_tx, rx) = watch::channel(price);
        Self { rx }
    }
}

/// Spawns the gas price task and returns the estimate handle.
pub fn spawn_gas_price_task(
    executor: &TaskExecutor,
    rpc_client: Arc<impl L1Client>,
    config: GasConfig,
) -> GasPriceHandle {
    let adjuster = GasPriceAdjuster::new(config.clone());
    let (estimate_tx, estimate_rx) = watch::channel(adjuster.current_estimate());

    executor.spawn_critical_async(
        "ethio::gas_price_task",
        gas_price_task(rpc_client, adjuster, config, estimate_tx),
    );
    GasPriceHandle { rx: estimate_rx }
}

/// Samples the network price and ticks the estimate update on independent
/// intervals. A failed sample is logged and skipped; it never stalls the
/// estimate or the task.
pub async fn gas_price_task(
    rpc_client: Arc<impl L1Client>,
    mut adjuster: GasPriceAdjuster,
    config: GasConfig,
    estimate_tx: watch::Sender<u64>,
) -> anyhow::Result<()> {
    info!("starting gas price task");
    let mut sample_interval =
        tokio::time::interval(Duration::from_millis(config.sample_interval_ms));
    let mut update_interval =
        tokio::time::interval(Duration::from_millis(config.update_interval_ms));

    loop {
        tokio::select! {
            _ = sample_interval.tick() => {
                match rpc_client.get_gas_price().await {
                    Ok(price) => adjuster.sample(price, now_millis()),
                    Err(err) => warn!(%err, "gas price sample failed, skipping"),
                }
            }
            _ = update_interval.tick() => {
                let estimate = adjuster.update(now_millis());
                if estimate_tx.send(estimate).is_err() {
                    // Every reader is gone; nothing left to price for.
                    return Ok(());
                }
            }
        }
    }
}
