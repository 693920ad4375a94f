//! Periodic background maintenance.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

/// Runs a maintenance task at a fixed interval until stopped.
///
/// The task runs on the worker between sleeps; it must not block for
/// long. Stopping waits for the worker to exit, so a task started by the
/// final tick finishes before [`stop`](PeriodicSweep::stop) returns.
pub struct PeriodicSweep {
    interval: Duration,
    task: Arc<dyn Fn() + Send + Sync>,
    stop: Arc<Notify>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicSweep {
    /// Creates a sweep running `task` every `interval`.
    pub fn new(interval: Duration, task: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            interval,
            task: Arc::new(task),
            stop: Arc::new(Notify::new()),
            worker: Mutex::new(None),
        }
    }

    /// Spawns the sweep worker. Has no effect if it is already running.
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        let interval = self.interval;
        let task = Arc::clone(&self.task);
        let stop = Arc::clone(&self.stop);
        *worker = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.notified() => break,
                    _ = tokio::time::sleep(interval) => task(),
                }
            }
            debug!("sweep worker exited");
        }));
    }

    /// Returns true while the worker is running.
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Signals the worker and waits for it to exit.
    pub async fn stop(&self) {
        self.stop.notify_one();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}
