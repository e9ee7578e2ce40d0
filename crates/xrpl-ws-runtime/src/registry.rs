//! In-flight request bookkeeping
//!
//! Each outbound request registers a one-shot completion channel under its id
//! before it is written to the transport. Whoever removes the entry first
//! (the dispatcher on a response, the caller on timeout, or a disconnect)
//! decides the outcome; removal is the single point of truth.

use dashmap::{mapref::entry::Entry, DashMap};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::debug;

use xrpl_ws_core::{ClientError, ClientResult};

/// Receiving half handed back to the caller of [`RequestRegistry::register`]
pub type ResponseReceiver = oneshot::Receiver<ClientResult<Value>>;

// ----------------------------------------------------------------------------
// Pending Request
// ----------------------------------------------------------------------------

/// A request awaiting its correlated response
#[derive(Debug)]
pub struct PendingRequest {
    pub created_at: Instant,
    sender: oneshot::Sender<ClientResult<Value>>,
}

impl PendingRequest {
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    fn complete(self, result: ClientResult<Value>) -> bool {
        self.sender.send(result).is_ok()
    }
}

// ----------------------------------------------------------------------------
// Request Registry
// ----------------------------------------------------------------------------

/// Concurrent map from request id to its waiter
#[derive(Debug, Default)]
pub struct RequestRegistry {
    pending: DashMap<String, PendingRequest>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `id`
    ///
    /// Fails with `InvalidRequest` if a request with the same id is already
    /// in flight.
    pub fn register(&self, id: &str) -> ClientResult<ResponseReceiver> {
        match self.pending.entry(id.to_string()) {
            Entry::Occupied(_) => Err(ClientError::invalid_request(format!(
                "Request id {} is already in flight",
                id
            ))),
            Entry::Vacant(slot) => {
                let (sender, receiver) = oneshot::channel();
                slot.insert(PendingRequest {
                    created_at: Instant::now(),
                    sender,
                });
                Ok(receiver)
            }
        }
    }

    /// Deliver `response` to the waiter registered under `id`
    ///
    /// Returns `false` when nobody is waiting (already timed out or never
    /// registered).
    pub fn resolve(&self, id: &str, response: Value) -> bool {
        match self.pending.remove(id) {
            Some((_, request)) => {
                debug!(id, waited_ms = request.age().as_millis() as u64, "Resolving pending request");
                request.complete(Ok(response))
            }
            None => false,
        }
    }

    /// Drop the waiter for `id` without completing it
    pub fn remove(&self, id: &str) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Fail every pending request with `Disconnected`
    pub fn fail_all(&self, reason: &str) -> usize {
        let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();

        let mut failed = 0;
        for id in ids {
            if let Some((_, request)) = self.pending.remove(&id) {
                request.complete(Err(ClientError::disconnected(reason)));
                failed += 1;
            }
        }
        failed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
