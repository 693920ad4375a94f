//! Comms doubles recording what the sync core broadcasts.

use datafront_core::Comms;
use datafront_protocol::{ClientId, UpdateFrame};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// One recorded broadcast call.
#[derive(Debug, Clone)]
pub struct BroadcastCall {
    /// Scope the call was made under.
    pub scope: String,
    /// Event name, `update` for delivery queue flushes.
    pub event: String,
    /// Clients the call addressed.
    pub recipients: Vec<ClientId>,
    /// Payload exactly as sent.
    pub payload: Value,
}

impl BroadcastCall {
    /// Decodes the payload as an update frame.
    pub fn frame(&self) -> UpdateFrame {
        serde_json::from_value(self.payload.clone()).expect("Failed to decode update frame")
    }
}

/// A [`Comms`] double that records every broadcast and always succeeds.
#[derive(Debug, Default)]
pub struct RecordingComms {
    calls: Mutex<Vec<BroadcastCall>>,
}

impl RecordingComms {
    /// Creates a recorder, already wrapped for sharing with the front.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every call recorded so far.
    pub fn calls(&self) -> Vec<BroadcastCall> {
        self.calls.lock().clone()
    }

    /// Number of calls recorded so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Calls addressed to the given client.
    pub fn calls_for(&self, client: &ClientId) -> Vec<BroadcastCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.recipients.contains(client))
            .cloned()
            .collect()
    }

    /// Update frames delivered to the given client, in arrival order.
    pub fn frames_for(&self, client: &ClientId) -> Vec<UpdateFrame> {
        self.calls_for(client)
            .iter()
            .map(BroadcastCall::frame)
            .collect()
    }

    /// Blocks until at least `n` calls were recorded.
    ///
    /// Panics after two seconds; a scenario that has not flushed by then
    /// is stuck.
    pub async fn wait_for_calls(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.call_count() < n {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("Timed out waiting for broadcasts");
    }

    /// Blocks until at least `n` calls addressed the given client.
    pub async fn wait_for_client(&self, client: &ClientId, n: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.calls_for(client).len() < n {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("Timed out waiting for client broadcasts");
    }
}

impl Comms for RecordingComms {
    fn broadcast(
        &self,
        scope: &str,
        event: &str,
        recipients: &[ClientId],
        payload: Value,
    ) -> Result<(), String> {
        self.calls.lock().push(BroadcastCall {
            scope: scope.to_string(),
            event: event.to_string(),
            recipients: recipients.to_vec(),
            payload,
        });
        Ok(())
    }
}

/// A [`Comms`] double that rejects every broadcast.
#[derive(Debug, Default)]
pub struct FailingComms;

impl Comms for FailingComms {
    fn broadcast(
        &self,
        _scope: &str,
        _event: &str,
        _recipients: &[ClientId],
        _payload: Value,
    ) -> Result<(), String> {
        Err("transport down".to_string())
    }
}
