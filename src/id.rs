//! ## IDENTIFIER SEQUENCE
//! **Based on spec.md §3 "Identifier sequence" and Design Note 9 ("Module-level
//! state" — "prefer the per-session scoping").**
//!
//! Grounded in the teacher's `GenericClient { system: Mutex<u32>, .. }`,
//! scoped per-client rather than as a crate-level static. Here it's a bare
//! `AtomicU64` since STOMP ids need no synchronization beyond a single
//! fetch-and-increment.

use std::sync::atomic::{AtomicU64, Ordering};

/// A per-session monotonically increasing counter. Values are handed out as
/// decimal strings for use as subscription-ids, transaction-ids, and
/// receipt-ids.
#[derive(Debug, Default)]
pub struct IdSequence {
  next: AtomicU64,
}

impl IdSequence {
  pub fn new() -> Self {
    Self {
      next: AtomicU64::new(0),
    }
  }

  /// Returns the next id in the sequence as a decimal string.
  pub fn next(&self) -> String {
    self.next.fetch_add(1, Ordering::Relaxed).to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ids_are_distinct_and_increasing() {
    let seq = IdSequence::new();
    let a = seq.next();
    let b = seq.next();
    let c = seq.next();
    assert_eq!(a, "0");
    assert_eq!(b, "1");
    assert_eq!(c, "2");
  }

  #[test]
  fn two_sequences_do_not_share_state() {
    let a = IdSequence::new();
    let b = IdSequence::new();
    assert_eq!(a.next(), "0");
    assert_eq!(b.next(), "0");
  }
}
