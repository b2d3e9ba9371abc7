//! In-process client of a running scheduler.

use std::sync::Arc;

use async_trait::async_trait;
use spicerun_backend::BackendRegistry;
use spicerun_spec::{JobId, JobSnapshot, SimulationResult};
use tokio::sync::{mpsc, oneshot, watch};

use crate::client::{CancelAck, JobClient, SubmitRequest};
use crate::coordinator::{Command, JobTable};
use crate::error::{ClientError, ClientResult};

/// Cheap, cloneable handle to a [`Scheduler`](crate::Scheduler).
///
/// Status reads go to the latest published snapshot and never wait on the
/// coordinator. Everything else is a message to it.
#[derive(Clone)]
pub struct SchedulerHandle {
    pub(crate) commands: mpsc::Sender<Command>,
    pub(crate) snapshots: watch::Receiver<Arc<JobTable>>,
    pub(crate) registry: Arc<BackendRegistry>,
}

impl SchedulerHandle {
    /// The registry jobs are validated against.
    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Latest snapshot of one job.
    pub fn snapshot(&self, id: JobId) -> ClientResult<JobSnapshot> {
        self.snapshots
            .borrow()
            .get(&id)
            .cloned()
            .ok_or(ClientError::JobNotFound { id })
    }

    /// Snapshots of every known job, oldest submission first.
    pub fn list(&self) -> Vec<JobSnapshot> {
        let mut jobs: Vec<_> = self.snapshots.borrow().values().cloned().collect();
        jobs.sort_by_key(|s| s.timestamps.submitted_at);
        jobs
    }

    /// Waits until the job reaches a terminal status.
    pub async fn wait_for_terminal(&self, id: JobId) -> ClientResult<JobSnapshot> {
        let mut snapshots = self.snapshots.clone();
        loop {
            {
                let table = snapshots.borrow_and_update();
                match table.get(&id) {
                    Some(snapshot) if snapshot.status.is_terminal() => {
                        return Ok(snapshot.clone())
                    }
                    Some(_) => {}
                    None => return Err(ClientError::JobNotFound { id }),
                }
            }
            snapshots
                .changed()
                .await
                .map_err(|_| ClientError::SchedulerClosed)?;
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<ClientResult<T>>) -> Command,
    ) -> ClientResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| ClientError::SchedulerClosed)?;
        response.await.map_err(|_| ClientError::SchedulerClosed)?
    }
}

#[async_trait]
impl JobClient for SchedulerHandle {
    async fn submit(&self, request: SubmitRequest) -> ClientResult<JobId> {
        self.request(|reply| Command::Submit { request, reply }).await
    }

    async fn status(&self, id: JobId) -> ClientResult<JobSnapshot> {
        self.snapshot(id)
    }

    async fn fetch(&self, id: JobId) -> ClientResult<SimulationResult> {
        self.request(|reply| Command::Fetch { id, reply }).await
    }

    async fn cancel(&self, id: JobId) -> ClientResult<CancelAck> {
        self.request(|reply| Command::Cancel { id, reply }).await
    }
}
