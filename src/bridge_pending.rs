use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::jsonrpc::JsonRpcResponse;

pub type ResponseReceiver = oneshot::Receiver<Result<JsonRpcResponse, String>>;

struct PendingRequest {
    method: String,
    sender: oneshot::Sender<Result<JsonRpcResponse, String>>,
}

/// Tracks in-flight collector requests and matches them to responses by ID.
/// Callers apply their own timeout and `cancel` on expiry.
pub struct PendingRequestTracker {
    pending: Mutex<HashMap<u64, PendingRequest>>,
}

impl Default for PendingRequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRequestTracker {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, id: u64, method: &str) -> ResponseReceiver {
        let (tx, rx) = oneshot::channel();
        let mut map = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(
            id,
            PendingRequest {
                method: method.to_string(),
                sender: tx,
            },
        );
        debug!(id, method, "registered collector request");
        rx
    }

    /// Returns false for a response nobody is waiting for.
    pub fn resolve(&self, response: JsonRpcResponse) -> bool {
        let id = response.id;
        let entry = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
        match entry {
            Some(entry) => {
                debug!(id, method = %entry.method, "collector responded");
                // The waiter may have timed out already.
                let _ = entry.sender.send(Ok(response));
                true
            }
            None => {
                warn!(id, "response for unknown or expired request");
                false
            }
        }
    }

    pub fn cancel(&self, id: u64) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }

    /// Fails every waiter, e.g. when the collector exits.
    pub fn fail_all(&self, reason: &str) {
        let drained: Vec<(u64, PendingRequest)> = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();
        for (id, entry) in drained {
            debug!(id, method = %entry.method, reason, "failing collector request");
            let _ = entry.sender.send(Err(reason.to_string()));
        }
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
