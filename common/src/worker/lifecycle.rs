// Lifecycle of a single long-running background task

use crate::errors::WorkerError;
use crate::telemetry;
use crate::worker::Dependencies;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, info_span, warn, Instrument};

/// Body of a worker.
///
/// The task must return once `cancel` fires. It never reports errors to the
/// worker; recoverable failures are logged and handled inside the task.
pub type WorkerTask =
    Arc<dyn Fn(CancellationToken, Arc<Dependencies>) -> BoxFuture<'static, ()> + Send + Sync>;

enum State {
    Idle,
    Running(CancellationToken),
    Stopped,
}

/// Supervises one task instance: started once, stopped once, never restarted.
pub struct Worker {
    name: String,
    task: WorkerTask,
    deps: Arc<Dependencies>,
    state: Mutex<State>,
    tracker: TaskTracker,
    exited_unexpectedly: Arc<AtomicBool>,
    exit_notify: Arc<Notify>,
}

impl Worker {
    pub fn new(name: impl Into<String>, task: WorkerTask, deps: Arc<Dependencies>) -> Self {
        Self {
            name: name.into(),
            task,
            deps,
            state: Mutex::new(State::Idle),
            tracker: TaskTracker::new(),
            exited_unexpectedly: Arc::new(AtomicBool::new(false)),
            exit_notify: Arc::new(Notify::new()),
        }
    }

    /// Share `notify` with other workers so a single waiter learns about any
    /// task that returns without being stopped.
    pub fn with_exit_notify(mut self, notify: Arc<Notify>) -> Self {
        self.exit_notify = notify;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Launch the task and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), WorkerError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            State::Running(_) => return Err(WorkerError::AlreadyStarted(self.name.clone())),
            State::Stopped => return Err(WorkerError::Stopped(self.name.clone())),
            State::Idle => {}
        }

        let cancel = CancellationToken::new();
        *state = State::Running(cancel.clone());

        let task = (self.task)(cancel.clone(), Arc::clone(&self.deps));
        let name = self.name.clone();
        let exited_unexpectedly = Arc::clone(&self.exited_unexpectedly);
        let exit_notify = Arc::clone(&self.exit_notify);

        self.tracker.spawn(
            async move {
                info!("Worker started");
                let panicked = AssertUnwindSafe(task).catch_unwind().await.is_err();

                if panicked {
                    error!("Worker task panicked");
                } else if cancel.is_cancelled() {
                    info!("Worker exiting");
                    telemetry::record_worker_exit(&name, "stopped");
                    return;
                } else {
                    warn!("Worker exited before stop was requested");
                }

                exited_unexpectedly.store(true, Ordering::SeqCst);
                telemetry::record_worker_exit(&name, "unexpected");
                exit_notify.notify_one();
            }
            .instrument(info_span!("worker", worker = %self.name)),
        );

        Ok(())
    }

    /// Cancel the task and wait until it has returned.
    ///
    /// Safe before `start`, after the task already exited, and from several
    /// callers at once; every caller returns only once the task is gone.
    pub async fn stop(&self) {
        info!(worker = %self.name, "Stop signal received");

        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let State::Running(cancel) = std::mem::replace(&mut *state, State::Stopped) {
                cancel.cancel();
            }
        }

        self.tracker.close();
        self.tracker.wait().await;

        info!(worker = %self.name, "Worker stopped gracefully");
    }

    /// True if the task returned on its own, without `stop` being called
    pub fn exited_unexpectedly(&self) -> bool {
        self.exited_unexpectedly.load(Ordering::SeqCst)
    }

    /// True once the worker left the idle state and no task instance is running
    pub fn is_finished(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        !matches!(*state, State::Idle) && self.tracker.is_empty()
    }
}
