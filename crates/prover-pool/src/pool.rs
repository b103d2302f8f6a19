use std::{
    collections::{BTreeMap, HashMap},
    time::{Duration, Instant},
};

use cairn_primitives::buf::Buf32;
use tracing::*;

use crate::{
    error::{PoolError, PoolResult},
    WorkerId,
};

/// A unit of proving work awaiting a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ProofJob {
    pub op_seq: u64,
    pub commitment: Buf32,
    pub witness: Vec<u8>,
}

/// A finished proof. Admissible into the dispatch engine only if the worker
/// that produced it was still alive when it arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct ProofResult {
    pub op_seq: u64,
    pub commitment: Buf32,
    pub payload: Vec<u8>,
}

/// Per-worker liveness state.
///
/// ## State Transitions
///
/// - `Idle` -> `Assigned`: the worker picked up a job.
/// - `Assigned` -> `Idle`: the assignment completed.
/// - `Idle` / `Assigned` -> `Gone`: no heartbeat within the timeout. Terminal;
///   the record is purged and the worker must re-register.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorkerState {
    Idle,
    Assigned { job: u64 },
    Gone,
}

#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub name: String,
    pub last_seen: Instant,
    pub state: WorkerState,
}

/// Registry of proof workers plus the pool of jobs they draw from. Expiry is
/// checked lazily on each coordinator tick rather than via per-worker timers.
#[derive(Debug)]
pub struct WorkerPool {
    workers: HashMap<WorkerId, WorkerRecord>,
    /// Prepared jobs nobody is working on, keyed by sequence number so
    /// assignment goes lowest-first.
    unassigned: BTreeMap<u64, ProofJob>,
    /// Jobs currently held by some worker.
    assigned: BTreeMap<u64, ProofJob>,
    job_capacity: usize,
    next_worker_id: WorkerId,
}

impl WorkerPool {
    pub fn new(job_capacity: usize) -> Self {
        Self {
            workers: HashMap::new(),
            unassigned: BTreeMap::new(),
            assigned: BTreeMap::new(),
            job_capacity,
            next_worker_id: 0,
        }
    }

    pub fn register_worker(&mut self, name: &str, now: Instant) -> WorkerId {
        let id = self.next_worker_id;
        self.next_worker_id += 1;
        self.workers.insert(
            id,
            WorkerRecord {
                name: name.to_string(),
                last_seen: now,
                state: WorkerState::Idle,
            },
        );
        info!(worker = %id, %name, "worker registered");
        id
    }

    pub fn worker_state(&self, id: WorkerId) -> Option<WorkerState> {
        self.workers.get(&id).map(|record| record.state)
    }

    pub fn unassigned_count(&self) -> usize {
        self.unassigned.len()
    }

    fn live_worker_mut(&mut self, id: WorkerId) -> PoolResult<&mut WorkerRecord> {
        let record = self
            .workers
            .get_mut(&id)
            .ok_or(PoolError::UnknownWorker(id))?;
        if record.state == WorkerState::Gone {
            return Err(PoolError::WorkerGone(id));
        }
        Ok(record)
    }

    /// Refreshes a worker's last-seen time. A gone worker must re-register.
    pub fn heartbeat(&mut self, id: WorkerId, now: Instant) -> PoolResult<()> {
        let record = self.live_worker_mut(id)?;
        record.last_seen = now;
        Ok(())
    }

    /// Queues a prepared job, bounded by capacity. Duplicate sequence numbers
    /// are ignored so intake is idempotent.
    pub fn add_job(&mut self, job: ProofJob) -> PoolResult<()> {
        if self.unassigned.contains_key(&job.op_seq) || self.assigned.contains_key(&job.op_seq) {
            debug!(seq = %job.op_seq, "ignoring duplicate job");
            return Ok(());
        }
        if self.unassigned.len() >= self.job_capacity {
            return Err(PoolError::PoolSaturated(self.job_capacity));
        }
        self.unassigned.insert(job.op_seq, job);
        Ok(())
    }

    /// Hands the lowest-sequence unassigned job to an idle worker. `None`
    /// when nothing is queued.
    pub fn request_job(&mut self, id: WorkerId, now: Instant) -> PoolResult<Option<ProofJob>> {
        let record = self.live_worker_mut(id)?;
        if let WorkerState::Assigned { job } = record.state {
            return Err(PoolError::AlreadyAssigned(id, job));
        }
        record.last_seen = now;

        let Some((seq, job)) = self.unassigned.pop_first() else {
            return Ok(None);
        };
        self.assigned.insert(seq, job.clone());

        let record = self.live_worker_mut(id)?;
        record.state = WorkerState::Assigned { job: seq };
        debug!(worker = %id, %seq, "job assigned");
        Ok(Some(job))
    }

    /// Accepts a completed proof, returning it for admission downstream. A
    /// result from an unknown or gone worker is rejected so it can be
    /// discarded: it raced the liveness timeout and its job may already be
    /// reassigned.
    pub fn submit_result(
        &mut self,
        id: WorkerId,
        result: ProofResult,
        now: Instant,
    ) -> PoolResult<ProofResult> {
        let record = self.live_worker_mut(id)?;
        match record.state {
            WorkerState::Assigned { job } if job == result.op_seq => {
                record.state = WorkerState::Idle;
                record.last_seen = now;
                self.assigned.remove(&result.op_seq);
                Ok(result)
            }
            _ => Err(PoolError::NotAssigned(id, result.op_seq)),
        }
    }

    /// Declares workers silent past `timeout` gone, returning their jobs to
    /// the unassigned pool for reassignment. Records marked gone on a prior
    /// tick are purged. Returns `(worker, returned job)` pairs for logging.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<(WorkerId, Option<u64>)> {
        self.workers
            .retain(|_, record| record.state != WorkerState::Gone);

        let mut timed_out = Vec::new();
        for (&id, record) in self.workers.iter_mut() {
            if now.duration_since(record.last_seen) <= timeout {
                continue;
            }
            let job = match record.state {
                WorkerState::Assigned { job } => Some(job),
                _ => None,
            };
            record.state = WorkerState::Gone;
            timed_out.push((id, job));
        }

        for (_, job) in &timed_out {
            if let Some(seq) = job {
                if let Some(job) = self.assigned.remove(seq) {
                    self.unassigned.insert(*seq, job);
                }
            }
        }
        timed_out
    }
}
