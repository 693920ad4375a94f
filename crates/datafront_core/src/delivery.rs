//! Per-client update batching and debounced delivery.

use crate::comms::Comms;
use datafront_protocol::{ClientId, QueryNotification, SingletonPatch, TablePatch, UpdateFrame};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Lifecycle phase of a [`DeliveryQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePhase {
    /// Nothing is queued.
    Idle,
    /// Content is queued and a debounce window is armed.
    Pending,
    /// The worker is composing and sending frames.
    Flushing,
    /// The queue is shut down; pushes are dropped. Terminal.
    Stopped,
}

/// Updates queued for one client since its last flush.
#[derive(Debug, Default)]
struct PendingUpdates {
    table_patches: Vec<TablePatch>,
    singleton_patches: Vec<SingletonPatch>,
    query_notifications: Vec<QueryNotification>,
}

impl PendingUpdates {
    fn len(&self) -> usize {
        self.table_patches.len() + self.singleton_patches.len() + self.query_notifications.len()
    }

    fn into_frame(self) -> UpdateFrame {
        UpdateFrame {
            table_patches: self.table_patches,
            singleton_patches: self.singleton_patches,
            query_notifications: self.query_notifications,
        }
    }
}

#[derive(Debug)]
struct QueueState {
    phase: QueuePhase,
    pending: HashMap<ClientId, PendingUpdates>,
}

/// State shared between the queue handle and its flush worker.
struct QueueShared {
    state: Mutex<QueueState>,
    wake: Notify,
    stop: Notify,
    debounce: Duration,
    scope: String,
    comms: Arc<dyn Comms>,
}

impl QueueShared {
    fn push_with(&self, client: &ClientId, append: impl FnOnce(&mut PendingUpdates)) {
        let mut state = self.state.lock();
        match state.phase {
            QueuePhase::Stopped => {
                debug!(%client, "update dropped after queue stop");
            }
            QueuePhase::Idle => {
                append(state.pending.entry(client.clone()).or_default());
                state.phase = QueuePhase::Pending;
                self.wake.notify_one();
            }
            QueuePhase::Pending | QueuePhase::Flushing => {
                append(state.pending.entry(client.clone()).or_default());
            }
        }
    }

    async fn run_worker(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.stop.notified() => break,
                _ = self.wake.notified() => {}
            }
            tokio::select! {
                _ = self.stop.notified() => break,
                _ = tokio::time::sleep(self.debounce) => {}
            }
            self.flush();
        }
        debug!("delivery worker exited");
    }

    /// Drains every client's pending lists and emits one frame per client.
    ///
    /// The queue lock is released before any Comms call; a failed broadcast
    /// is logged and does not block delivery to the remaining clients.
    fn flush(&self) {
        let drained: Vec<(ClientId, UpdateFrame)> = {
            let mut state = self.state.lock();
            if state.phase == QueuePhase::Stopped {
                return;
            }
            state.phase = QueuePhase::Flushing;
            state
                .pending
                .drain()
                .map(|(client, pending)| (client, pending.into_frame()))
                .collect()
        };

        debug!(clients = drained.len(), "flushing update frames");

        for (client, frame) in drained {
            let payload = serde_json::to_value(&frame).unwrap_or(Value::Null);
            let recipients = [client];
            if let Err(error) = self.comms.broadcast(&self.scope, "update", &recipients, payload) {
                warn!(client = %recipients[0], %error, "update delivery failed");
            }
        }

        let mut state = self.state.lock();
        if state.phase != QueuePhase::Flushing {
            return;
        }
        if state.pending.is_empty() {
            state.phase = QueuePhase::Idle;
        } else {
            // Pushes landed while frames were going out; arm a new window.
            state.phase = QueuePhase::Pending;
            self.wake.notify_one();
        }
    }
}

/// Debounced per-client update delivery.
///
/// Resources enqueue patches addressed to individual clients; a single
/// long-lived flush worker batches everything queued for a client within one
/// debounce window and emits it as one `update` event through [`Comms`].
///
/// Ordering: FIFO per client within each update kind. Nothing is guaranteed
/// across kinds or across clients. Content pending at shutdown is discarded.
pub struct DeliveryQueue {
    shared: Arc<QueueShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeliveryQueue {
    /// Creates a queue flushing through `comms` under the given scope.
    pub fn new(comms: Arc<dyn Comms>, scope: impl Into<String>, debounce: Duration) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                state: Mutex::new(QueueState {
                    phase: QueuePhase::Idle,
                    pending: HashMap::new(),
                }),
                wake: Notify::new(),
                stop: Notify::new(),
                debounce,
                scope: scope.into(),
                comms,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Spawns the flush worker.
    ///
    /// Has no effect if the worker is already running. Pushes made before
    /// `start` are delivered once the worker picks up the armed window.
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        *worker = Some(tokio::spawn(Arc::clone(&self.shared).run_worker()));
    }

    /// Signals the worker and waits for it to exit.
    ///
    /// Everything still queued is discarded; pushes after `stop` are
    /// dropped.
    pub async fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            state.phase = QueuePhase::Stopped;
            state.pending.clear();
        }
        self.shared.stop.notify_one();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }

    /// Queues a table patch for one client.
    pub fn push_table(&self, client: &ClientId, patch: TablePatch) {
        self.shared
            .push_with(client, |pending| pending.table_patches.push(patch));
    }

    /// Queues a singleton patch for one client.
    pub fn push_singleton(&self, client: &ClientId, patch: SingletonPatch) {
        self.shared
            .push_with(client, |pending| pending.singleton_patches.push(patch));
    }

    /// Queues a query invalidation notification for one client.
    pub fn push_query_notification(&self, client: &ClientId, notification: QueryNotification) {
        self.shared.push_with(client, |pending| {
            pending.query_notifications.push(notification);
        });
    }

    /// Returns the queue's current phase.
    pub fn phase(&self) -> QueuePhase {
        self.shared.state.lock().phase
    }

    /// Returns how many updates are queued for one client.
    pub fn pending_count(&self, client: &ClientId) -> usize {
        self.shared
            .state
            .lock()
            .pending
            .get(client)
            .map(PendingUpdates::len)
            .unwrap_or(0)
    }
}
