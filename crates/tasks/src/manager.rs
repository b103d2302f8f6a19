use std::{fmt, panic};

use futures_util::FutureExt;
use tokio::{runtime::Handle, sync::mpsc};
use tracing::*;

use crate::shutdown::{Shutdown, ShutdownSignal};

/// Error reported when a critical task panics or returns an error.
#[derive(Debug, thiserror::Error)]
pub struct CriticalTaskError {
    task_name: &'static str,
    reason: String,
}

impl fmt::Display for CriticalTaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "critical task `{}` failed: {}", self.task_name, self.reason)
    }
}

fn panic_reason(error: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = error.downcast_ref::<String>() {
        msg.clone()
    } else if let Some(msg) = error.downcast_ref::<&str>() {
        (*msg).to_string()
    } else {
        "panicked".to_string()
    }
}

/// Spawns and tracks the long running engine tasks. The first critical task
/// failure triggers a coordinated shutdown of everything else.
pub struct TaskManager {
    tokio_handle: Handle,
    failed_tasks_tx: mpsc::UnboundedSender<CriticalTaskError>,
    failed_tasks_rx: mpsc::UnboundedReceiver<CriticalTaskError>,
    shutdown_signal: ShutdownSignal,
}

impl TaskManager {
    pub fn new(tokio_handle: Handle) -> Self {
        let (failed_tasks_tx, failed_tasks_rx) = mpsc::unbounded_channel();
        Self {
            tokio_handle,
            failed_tasks_tx,
            failed_tasks_rx,
            shutdown_signal: ShutdownSignal::new(),
        }
    }

    pub fn executor(&self) -> TaskExecutor {
        TaskExecutor {
            tokio_handle: self.tokio_handle.clone(),
            failed_tasks_tx: self.failed_tasks_tx.clone(),
            shutdown_signal: self.shutdown_signal.clone(),
        }
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown_signal.clone()
    }

    /// Sends a shutdown when the process receives an interrupt.
    pub fn start_signal_listeners(&self) {
        let shutdown_signal = self.shutdown_signal.clone();
        self.tokio_handle.spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            warn!("got INT, initiating shutdown");
            shutdown_signal.send();
        });
    }

    /// Blocks until a critical task fails (returning the failure) or an
    /// external shutdown is triggered (returning `Ok`). Either way every
    /// remaining task is told to shut down before returning.
    pub fn monitor(mut self) -> Result<(), CriticalTaskError> {
        let shutdown = self.shutdown_signal.subscribe();
        let res = self.tokio_handle.block_on(async {
            tokio::select! {
                failure = self.failed_tasks_rx.recv() => match failure {
                    Some(err) => Err(err),
                    None => Ok(()),
                },
                _ = shutdown.wait_for_shutdown() => Ok(()),
            }
        });

        self.shutdown_signal.send();
        res
    }
}

/// A type that can spawn new critical tasks.
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    tokio_handle: Handle,
    failed_tasks_tx: mpsc::UnboundedSender<CriticalTaskError>,
    shutdown_signal: ShutdownSignal,
}

impl TaskExecutor {
    /// Spawn a future as a critical task. A panic or an `Err` return reports
    /// the failure to the manager, which triggers shutdown; a clean return or
    /// an externally triggered shutdown ends the task silently.
    pub fn spawn_critical_async<F>(&self, name: &'static str, fut: F) -> tokio::task::JoinHandle<()>
    where
        F: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let failed_tasks_tx = self.failed_tasks_tx.clone();
        let shutdown = self.shutdown_signal.subscribe();

        info!(%name, "starting critical task");
        self.tokio_handle.spawn(async move {
            let guarded = panic::AssertUnwindSafe(fut).catch_unwind();
            tokio::select! {
                result = guarded => {
                    let reason = match result {
                        Ok(Ok(())) => return,
                        Ok(Err(err)) => format!("{err:#}"),
                        Err(panic_err) => panic_reason(panic_err),
                    };
                    error!(%name, %reason, "critical task failed");
                    let _ = failed_tasks_tx.send(CriticalTaskError {
                        task_name: name,
                        reason,
                    });
                }
                _ = shutdown.wait_for_shutdown() => {
                    debug!(%name, "task shut down");
                }
            }
        })
    }

    /// Spawn a critical task that wants to poll the shutdown state itself.
    pub fn spawn_critical_async_with_shutdown<F, Fut>(
        &self,
        name: &'static str,
        func: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: FnOnce(Shutdown) -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let fut = func(self.shutdown_signal.subscribe());
        self.spawn_critical_async(name, fut)
    }
}
