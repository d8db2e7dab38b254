//! ## WRITE MAILBOX
//! **Based on spec.md §4.4 "Structure" and §5 "Ordering guarantees".**
//!
//! The single FIFO queue through which every application thread's outbound
//! frame reaches the writer worker — grounded in the teacher's
//! `PrimitiveClient::connect` returning an `mpsc::Sender<HsmsMessage>` mailbox
//! to the caller while the tx thread owns the `Receiver` end.

use std::sync::mpsc::Sender as StdSender;

use crate::frame::Command;
use crate::header::HeaderMap;
use crate::session::tables::ReceiptOutcome;

/// One outbound frame plus its completion channels.
pub(crate) struct WriteRequest {
  pub(crate) command: Command,
  pub(crate) headers: HeaderMap,
  pub(crate) body: Vec<u8>,
  /// Set when this frame carries a `content-length` (i.e. has a body worth
  /// announcing the length of); `None` for empty-bodied control frames.
  pub(crate) known_length: Option<u64>,
  /// Reports whether the frame was actually written to the transport.
  pub(crate) write_ack: oneshot::Sender<std::io::Result<()>>,
  /// Present iff the frame carries a `receipt` header: the writer registers
  /// this in the [`super::tables::ReceiptTable`] before writing.
  pub(crate) receipt: Option<(String, oneshot::Sender<ReceiptOutcome>)>,
}

/// What arrives on the writer worker's mailbox.
pub(crate) enum MailboxItem {
  Write(WriteRequest),
  /// Tells the writer worker to stop after draining anything already queued
  /// ahead of it. Used by `Session::close`.
  Shutdown,
}

pub(crate) type MailboxSender = StdSender<MailboxItem>;
