//! Request correlation table.
//!
//! Every outgoing request gets an entry keyed by its id. The entry is removed
//! and settled in the same critical section, so an id can never be settled
//! twice and is only reused after its entry is gone.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::config::IdStrategy;
use crate::error::{PeerError, PeerResult};
use crate::types::RequestId;

type Settlement = PeerResult<Value>;
type Entries = Mutex<HashMap<RequestId, oneshot::Sender<Settlement>>>;

/// Receiving half of a pending request.
///
/// Dropping it before it settles removes the entry from the table.
#[derive(Debug)]
pub struct PendingResponse {
    id: RequestId,
    receiver: oneshot::Receiver<Settlement>,
    entries: Weak<Entries>,
    settled: bool,
}

impl PendingResponse {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Wait for the matching response, error, or local failure
    pub async fn wait(mut self) -> Settlement {
        // A dropped sender means the table itself went away
        let settlement = (&mut self.receiver).await.unwrap_or(Err(PeerError::Closed));
        self.settled = true;
        settlement
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(entries) = self.entries.upgrade() {
            if entries.lock().remove(&self.id).is_some() {
                debug!(id = %self.id, "Caller stopped waiting, request abandoned");
            }
        }
    }
}

/// Outstanding requests awaiting a response
#[derive(Debug)]
pub struct PendingRequests {
    strategy: IdStrategy,
    next_id: AtomicI64,
    entries: Arc<Entries>,
}

impl PendingRequests {
    pub fn new(strategy: IdStrategy) -> Self {
        Self {
            strategy,
            next_id: AtomicI64::new(1),
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn generate_id(&self) -> RequestId {
        match self.strategy {
            IdStrategy::Counter => RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed)),
            IdStrategy::Uuid => RequestId::String(uuid::Uuid::new_v4().to_string()),
        }
    }

    /// Allocate an id not used by any outstanding request and register it
    pub fn register(&self) -> PendingResponse {
        let (sender, receiver) = oneshot::channel();
        let mut entries = self.entries.lock();
        loop {
            let id = self.generate_id();
            if let Entry::Vacant(slot) = entries.entry(id.clone()) {
                slot.insert(sender);
                return PendingResponse {
                    id,
                    receiver,
                    entries: Arc::downgrade(&self.entries),
                    settled: false,
                };
            }
            debug!(id = %id, "Generated request id is still outstanding, retrying");
        }
    }

    /// Drop an entry without settling it (the request was never sent)
    pub fn cancel(&self, id: &RequestId) -> bool {
        self.entries.lock().remove(id).is_some()
    }

    /// Settle the entry for `id` with a successful result
    pub fn resolve(&self, id: &RequestId, result: Value) -> PeerResult<()> {
        self.settle(id, Ok(result))
    }

    /// Settle the entry for `id` with a failure
    pub fn reject(&self, id: &RequestId, error: PeerError) -> PeerResult<()> {
        self.settle(id, Err(error))
    }

    fn settle(&self, id: &RequestId, settlement: Settlement) -> PeerResult<()> {
        let sender = self
            .entries
            .lock()
            .remove(id)
            .ok_or_else(|| PeerError::UnknownRequestId(id.clone()))?;

        if sender.send(settlement).is_err() {
            debug!(id = %id, "Caller stopped waiting before the response arrived");
        }
        Ok(())
    }

    /// Reject every outstanding request with `reason` and clear the table.
    /// Returns how many requests were failed.
    pub fn fail_all(&self, reason: PeerError) -> usize {
        let drained: Vec<_> = self.entries.lock().drain().collect();
        let count = drained.len();
        for (_id, sender) in drained {
            let _ = sender.send(Err(reason.clone()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.entries.lock().contains_key(id)
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new(IdStrategy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counter_ids_are_monotonic() {
        let table = PendingRequests::new(IdStrategy::Counter);
        let first = table.register();
        let second = table.register();

        assert_eq!(first.id(), &RequestId::Number(1));
        assert_eq!(second.id(), &RequestId::Number(2));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_uuid_ids_are_strings() {
        let table = PendingRequests::new(IdStrategy::Uuid);
        let first = table.register();
        let second = table.register();

        assert!(first.id().as_str().is_some());
        assert_ne!(first.id(), second.id());
    }

    #[tokio::test]
    async fn test_resolve_settles_once() {
        let table = PendingRequests::default();
        let pending = table.register();
        let id = pending.id().clone();

        table.resolve(&id, json!("done")).unwrap();
        assert_eq!(
            table.resolve(&id, json!("again")),
            Err(PeerError::UnknownRequestId(id.clone()))
        );
        assert_eq!(pending.wait().await, Ok(json!("done")));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_reject_and_unknown_ids() {
        let table = PendingRequests::default();
        let pending = table.register();
        let id = pending.id().clone();

        table.reject(&id, PeerError::aborted("nope")).unwrap();
        assert_eq!(pending.wait().await, Err(PeerError::aborted("nope")));

        let unknown = RequestId::String("never-sent".to_string());
        assert_eq!(
            table.reject(&unknown, PeerError::Closed),
            Err(PeerError::UnknownRequestId(unknown))
        );
    }

    #[tokio::test]
    async fn test_fail_all_clears_table() {
        let table = PendingRequests::default();
        let a = table.register();
        let b = table.register();

        assert_eq!(table.fail_all(PeerError::aborted("link down")), 2);
        assert!(table.is_empty());
        assert_eq!(a.wait().await, Err(PeerError::aborted("link down")));
        assert_eq!(b.wait().await, Err(PeerError::aborted("link down")));

        let c = table.register();
        assert_eq!(c.id(), &RequestId::Number(3));
        table.resolve(&RequestId::Number(3), json!(1)).unwrap();
        assert_eq!(c.wait().await, Ok(json!(1)));
    }

    #[test]
    fn test_dropping_unsettled_response_removes_entry() {
        let table = PendingRequests::default();
        let pending = table.register();
        let id = pending.id().clone();
        drop(pending);

        assert!(table.is_empty());
        assert_eq!(
            table.resolve(&id, Value::Null),
            Err(PeerError::UnknownRequestId(id))
        );
    }

    #[tokio::test]
    async fn test_settled_response_leaves_newer_entries_alone() {
        let table = PendingRequests::default();
        let first = table.register();
        table.resolve(first.id(), json!(1)).unwrap();
        let second = table.register();

        assert_eq!(first.wait().await, Ok(json!(1)));
        assert!(table.contains(second.id()));
    }

    #[test]
    fn test_cancel_removes_entry() {
        let table = PendingRequests::default();
        let pending = table.register();

        assert!(table.cancel(pending.id()));
        assert!(!table.contains(pending.id()));
    }
}
