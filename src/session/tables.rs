//! ## CORRELATION TABLES
//! **Based on spec.md §4.4 "Correlation table" and §5 "Shared resources"
//! ("the pending-receipt table and subscription table each have their own
//! mutex").**
//!
//! Grounded in `original_source/receipt_map.go` and
//! `original_source/subscriptionMap.go`: both are small `sync.RWMutex`-guarded
//! map types with their own `Get`/`Set`/`Del`, rather than bare
//! `Mutex<HashMap<..>>` fields scattered across the session struct. Kept here
//! as named types for the same reason — a seam to hang close/drain behavior
//! off, matching the Go originals' intent even though neither original
//! survives verbatim.

use std::collections::HashMap;
use std::sync::mpsc::Sender as StdSender;
use std::sync::Mutex;

use crate::error::StompError;

/// Why a receipted request failed, kept distinct from `StompError` so the
/// two causes a waiter can be failed with — an actual `ERROR` frame versus
/// session teardown — never collapse into the same string and get relayed
/// as the wrong `StompError` variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReceiptFailure {
  /// The matching `ERROR` frame's body.
  ServerError(String),
  /// The session tore down (fatally or via `Session::close`) before this
  /// receipt arrived.
  SessionClosed,
}

/// The terminal outcome of a receipted request: `Ok(())` for a `RECEIPT`,
/// `Err(ReceiptFailure)` for an `ERROR` or a torn-down session.
pub(crate) type ReceiptOutcome = Result<(), ReceiptFailure>;

/// Maps `receipt-id` to the one-shot sender awaiting its outcome.
/// **Based on `original_source/receipt_map.go`.**
pub(crate) struct ReceiptTable {
  inner: Mutex<HashMap<String, oneshot::Sender<ReceiptOutcome>>>,
}

impl ReceiptTable {
  pub(crate) fn new() -> Self {
    Self {
      inner: Mutex::new(HashMap::new()),
    }
  }

  /// Registers a waiter. Must happen before the frame reaches the wire
  /// (spec.md §4.4) to avoid losing a reply that arrives before insertion.
  pub(crate) fn insert(&self, receipt_id: String, sender: oneshot::Sender<ReceiptOutcome>) {
    self.inner.lock().unwrap().insert(receipt_id, sender);
  }

  /// Delivers `outcome` to the waiter registered under `receipt_id`, if any.
  /// Removal is exclusive: the first of RECEIPT/ERROR to name this id wins.
  pub(crate) fn complete(&self, receipt_id: &str, outcome: ReceiptOutcome) -> bool {
    match self.inner.lock().unwrap().remove(receipt_id) {
      Some(sender) => {
        let _ = sender.send(outcome);
        true
      }
      None => false,
    }
  }

  /// Fatal-error teardown (spec.md §7 "Propagation", §8 scenario S6): every
  /// pending waiter completes with `SessionClosed`, not a stringified copy
  /// of `error` — the cause of the teardown is logged, but the waiter only
  /// needs to know the session is gone.
  pub(crate) fn fail_all(&self, error: &StompError) {
    log::debug!("failing all pending receipts: session closed ({error})");
    let mut table = self.inner.lock().unwrap();
    for (_, sender) in table.drain() {
      let _ = sender.send(Err(ReceiptFailure::SessionClosed));
    }
  }
}

/// One registered subscription: its destination (for the STOMP 1.0 routing
/// fallback, Open Question 9(a)) and the channel feeding its inbox.
struct Entry<R> {
  id: String,
  destination: String,
  sender: StdSender<crate::session::Message<R>>,
}

/// Maps subscription-id (and, for 1.0 fallback, destination) to the
/// subscription's inbox sender. **Based on
/// `original_source/subscriptionMap.go`**, generalized with the destination
/// field the Go original's bare `map[string]chan` didn't carry, needed for
/// the 1.0 routing fallback spec.md §9(a) calls for.
pub(crate) struct SubscriptionTable<R> {
  entries: Mutex<Vec<Entry<R>>>,
}

impl<R> SubscriptionTable<R> {
  pub(crate) fn new() -> Self {
    Self {
      entries: Mutex::new(Vec::new()),
    }
  }

  pub(crate) fn insert(
    &self,
    id: String,
    destination: String,
    sender: StdSender<crate::session::Message<R>>,
  ) {
    self.entries.lock().unwrap().push(Entry {
      id,
      destination,
      sender,
    });
  }

  pub(crate) fn remove(&self, id: &str) -> bool {
    let mut entries = self.entries.lock().unwrap();
    let before = entries.len();
    entries.retain(|e| e.id != id);
    entries.len() != before
  }

  /// Routes an inbound MESSAGE (spec.md §9(a)): by `subscription` header
  /// when present (1.1/1.2); otherwise by last-matching `destination`
  /// among currently-registered subscriptions (1.0 fallback).
  pub(crate) fn route(
    &self,
    subscription_id: Option<&str>,
    destination: &str,
  ) -> Option<StdSender<crate::session::Message<R>>> {
    let entries = self.entries.lock().unwrap();
    match subscription_id {
      Some(id) => entries.iter().find(|e| e.id == id).map(|e| e.sender.clone()),
      None => entries
        .iter()
        .rev()
        .find(|e| e.destination == destination)
        .map(|e| e.sender.clone()),
    }
  }

  /// True if registering a 1.0 subscription to `destination` would conflict
  /// with an existing subscription to a *different* destination — the
  /// "refuse to register a second subscription to a different destination"
  /// half of the 9(a) policy.
  pub(crate) fn has_conflicting_1_0_destination(&self, destination: &str) -> bool {
    let entries = self.entries.lock().unwrap();
    entries.iter().any(|e| e.destination != destination)
  }

  /// Session-close teardown: dropping every sender closes each inbox.
  pub(crate) fn close_all(&self) {
    self.entries.lock().unwrap().clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn receipt_table_delivers_exactly_once() {
    let table = ReceiptTable::new();
    let (tx, rx) = oneshot::channel();
    table.insert("r-1".to_string(), tx);
    assert!(table.complete("r-1", Ok(())));
    assert!(!table.complete("r-1", Ok(())));
    assert_eq!(rx.recv().unwrap(), Ok(()));
  }

  #[test]
  fn receipt_table_fail_all_delivers_to_every_waiter() {
    let table = ReceiptTable::new();
    let (tx1, rx1) = oneshot::channel();
    let (tx2, rx2) = oneshot::channel();
    table.insert("r-1".to_string(), tx1);
    table.insert("r-2".to_string(), tx2);
    table.fail_all(&StompError::SessionClosed);
    assert_eq!(rx1.recv().unwrap(), Err(ReceiptFailure::SessionClosed));
    assert_eq!(rx2.recv().unwrap(), Err(ReceiptFailure::SessionClosed));
  }

  #[test]
  fn unknown_receipt_completion_is_a_noop() {
    let table = ReceiptTable::new();
    assert!(!table.complete("missing", Ok(())));
  }
}
