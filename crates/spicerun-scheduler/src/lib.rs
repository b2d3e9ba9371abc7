//! spicerun job scheduler
//!
//! Accepts simulation jobs, queues them FIFO, and runs at most
//! `concurrency` of them at a time on a fixed pool of worker tasks.
//!
//! # Architecture
//!
//! - One coordinator task owns the job table. It is the only writer.
//! - N worker tasks each run one job at a time through a
//!   [`SimulationRunner`](spicerun_backend::SimulationRunner).
//! - Clients send commands to the coordinator; status reads use snapshots
//!   published on a watch channel and never wait on it.
//!
//! Failed attempts are classified by [`RetryPolicy`]: transient launch
//! failures are retried with exponential backoff, artifact timeouts switch
//! to a configured fallback backend, everything else is terminal.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use spicerun_backend::{BackendRegistry, ProcessRunner};
//! use spicerun_scheduler::{JobClient, Scheduler, SubmitRequest};
//!
//! let registry = Arc::new(BackendRegistry::builtin());
//! let runner = Arc::new(ProcessRunner::new(registry.clone(), &config.workspace_root));
//! let scheduler = Scheduler::start(config, registry, runner)?;
//! let handle = scheduler.handle();
//!
//! let id = handle.submit(SubmitRequest::new("rc.asc", "ltspice")).await?;
//! handle.wait_for_terminal(id).await?;
//! let result = handle.fetch(id).await?;
//! ```

pub mod client;
pub mod config;
mod coordinator;
pub mod error;
mod handle;
pub mod persist;
pub mod retry;
mod worker;

#[cfg(test)]
mod tests;

pub use client::{CancelAck, JobClient, SubmitRequest};
pub use config::SchedulerConfig;
pub use coordinator::JobTable;
pub use error::{ClientError, ClientResult, SchedulerError, SchedulerResult};
pub use handle::SchedulerHandle;
pub use retry::{RetryDecision, RetryPolicy};

use std::sync::Arc;

use spicerun_backend::{BackendRegistry, RootLock, SimulationRunner};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use coordinator::{Command, Coordinator};
use persist::StateFile;

/// Depth of the client command queue.
const COMMAND_QUEUE_DEPTH: usize = 64;

/// A running scheduler.
pub struct Scheduler {
    handle: SchedulerHandle,
    task: JoinHandle<()>,
}

impl Scheduler {
    /// Validates the configuration, restores persisted jobs and starts the
    /// coordinator and workers. Must be called from within a tokio runtime.
    pub fn start(
        config: SchedulerConfig,
        registry: Arc<BackendRegistry>,
        runner: Arc<dyn SimulationRunner>,
    ) -> SchedulerResult<Self> {
        config.validate(&registry)?;

        let root_lock = match RootLock::acquire(&config.workspace_root) {
            Ok((lock, removed)) => {
                if removed > 0 {
                    tracing::info!(
                        removed,
                        root = %config.workspace_root.display(),
                        "removed stale job workspaces"
                    );
                }
                Some(lock)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    root = %config.workspace_root.display(),
                    "cannot lock workspace root, stale job workspaces are kept"
                );
                None
            }
        };
        let persisted = match &config.state_file {
            Some(path) => StateFile::new(path).load()?,
            None => Vec::new(),
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let workers = (0..config.concurrency)
            .map(|index| worker::spawn_worker(index, runner.clone(), events_tx.clone()))
            .collect();
        let (snapshots_tx, snapshots_rx) = watch::channel(Arc::new(JobTable::new()));
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);

        tracing::info!(
            concurrency = config.concurrency,
            max_retries = config.max_retries,
            "starting scheduler"
        );
        let mut coordinator =
            Coordinator::new(config, registry.clone(), workers, events_tx, snapshots_tx);
        coordinator.restore(persisted);
        let task = tokio::spawn(
            async move {
                let _root_lock = root_lock;
                coordinator.run(commands_rx, events_rx).await
            }
            .instrument(tracing::info_span!("scheduler")),
        );

        Ok(Self {
            handle: SchedulerHandle {
                commands: commands_tx,
                snapshots: snapshots_rx,
                registry,
            },
            task,
        })
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Stops the coordinator. Running jobs are cancelled; the persisted
    /// table keeps them for the next start.
    pub async fn shutdown(self) {
        let _ = self.handle.commands.send(Command::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "scheduler task failed");
        }
    }
}
