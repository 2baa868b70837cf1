// Worker registry and the manager that starts and stops it as a unit

use crate::errors::WorkerError;
use crate::worker::image_checker;
use crate::worker::{Dependencies, Worker, WorkerTask};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info};

/// Every background worker this process runs, in start order
pub fn registered_workers() -> Vec<(&'static str, WorkerTask)> {
    vec![(image_checker::WORKER_NAME, image_checker::task())]
}

/// Owns a fixed set of workers, built once at construction.
pub struct WorkerManager {
    workers: Vec<Worker>,
    exit_notify: Arc<Notify>,
}

impl WorkerManager {
    /// Build the manager with the registered workers
    pub fn new(deps: Arc<Dependencies>) -> Self {
        Self::with_tasks(deps, registered_workers())
    }

    pub fn with_tasks(deps: Arc<Dependencies>, tasks: Vec<(&'static str, WorkerTask)>) -> Self {
        let exit_notify = Arc::new(Notify::new());
        let workers = tasks
            .into_iter()
            .map(|(name, task)| {
                Worker::new(name, task, Arc::clone(&deps)).with_exit_notify(Arc::clone(&exit_notify))
            })
            .collect();

        Self {
            workers,
            exit_notify,
        }
    }

    /// Launch every worker. Returns once all have been launched, without
    /// waiting for any of them to become ready.
    ///
    /// A worker that refuses to start does not prevent the others from
    /// starting; the first refusal is returned.
    pub fn start(&self) -> Result<(), WorkerError> {
        info!(workers = self.workers.len(), "Starting workers");

        let mut first_error = None;
        // Worker::start only spawns, so the tasks still run concurrently
        for worker in &self.workers {
            if let Err(e) = worker.start() {
                error!(worker = %worker.name(), error = %e, "Failed to start worker");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Stop every worker concurrently and wait until all have terminated
    pub async fn stop(&self) {
        info!(workers = self.workers.len(), "Stopping workers");
        join_all(self.workers.iter().map(Worker::stop)).await;
        info!("All workers stopped");
    }

    /// Resolve once some worker's task returned without being stopped, with
    /// the names of every worker in that state.
    pub async fn wait_for_unexpected_exit(&self) -> Vec<String> {
        loop {
            self.exit_notify.notified().await;
            let exited: Vec<String> = self
                .workers
                .iter()
                .filter(|worker| worker.exited_unexpectedly())
                .map(|worker| worker.name().to_string())
                .collect();
            if !exited.is_empty() {
                return exited;
            }
        }
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }
}
