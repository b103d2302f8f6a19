use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use cairn_config::ProverPoolConfig;
use cairn_tasks::TaskExecutor;
use tokio::sync::{mpsc, Mutex};
use tracing::*;

use crate::{
    error::PoolResult,
    pool::{ProofJob, ProofResult, WorkerPool},
    WorkerId,
};

/// Shared handle to the worker pool, the surface the worker-facing RPC layer
/// calls into. Admitted results flow out on the admission channel,
/// fire-and-forget.
#[derive(Clone)]
pub struct ProverPoolHandle {
    pool: Arc<Mutex<WorkerPool>>,
    admit_tx: mpsc::Sender<ProofResult>,
}

impl ProverPoolHandle {
    pub async fn register_worker(&self, name: &str) -> WorkerId {
        self.pool.lock().await.register_worker(name, Instant::now())
    }

    pub async fn heartbeat(&self, id: WorkerId) -> PoolResult<()> {
        self.pool.lock().await.heartbeat(id, Instant::now())
    }

    pub async fn add_job(&self, job: ProofJob) -> PoolResult<()> {
        self.pool.lock().await.add_job(job)
    }

    pub async fn request_job(&self, id: WorkerId) -> PoolResult<Option<ProofJob>> {
        self.pool.lock().await.request_job(id, Instant::now())
    }

    /// Accepts a completed proof and forwards it downstream. Results that
    /// raced the liveness timeout are discarded here and never reach the
    /// dispatch engine.
    pub async fn submit_result(&self, id: WorkerId, result: ProofResult) -> PoolResult<()> {
        let seq = result.op_seq;
        let admitted = self
            .pool
            .lock()
            .await
            .submit_result(id, result, Instant::now());
        match admitted {
            Ok(result) => {
                if self.admit_tx.send(result).await.is_err() {
                    warn!(%seq, "admission receiver dropped");
                }
                Ok(())
            }
            Err(err) => {
                warn!(worker = %id, %seq, %err, "discarding proof result");
                Err(err)
            }
        }
    }
}

/// Spawns the liveness coordinator tick. Returns the worker-facing handle and
/// the stream of admitted results.
pub fn spawn_liveness_task(
    executor: &TaskExecutor,
    config: ProverPoolConfig,
) -> (ProverPoolHandle, mpsc::Receiver<ProofResult>) {
    let pool = Arc::new(Mutex::new(WorkerPool::new(config.job_capacity)));
    let (admit_tx, admit_rx) = mpsc::channel(64);
    let handle = ProverPoolHandle {
        pool: pool.clone(),
        admit_tx,
    };
    executor.spawn_critical_async("prover_pool::liveness_task", liveness_task(pool, config));
    (handle, admit_rx)
}

/// Lazily expires silent workers on a fixed tick. A timeout is a liveness
/// transition, not an alert: the job goes back to the pool and the loop moves
/// on.
pub async fn liveness_task(
    pool: Arc<Mutex<WorkerPool>>,
    config: ProverPoolConfig,
) -> anyhow::Result<()> {
    info!("starting worker liveness task");
    let timeout = Duration::from_millis(config.heartbeat_timeout_ms);
    let mut interval = tokio::time::interval(Duration::from_millis(config.tick_interval_ms));

    loop {
        interval.tick().await;

        let gone = pool.lock().await.expire(Instant::now(), timeout);
        for (worker, job) in gone {
            match job {
                Some(seq) => info!(%worker, %seq, "worker timed out, job returned to pool"),
                None => info!(%worker, "idle worker timed out"),
            }
        }
    }
}
