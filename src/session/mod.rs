//! ## SESSION MULTIPLEXER & SESSION API
//! **Based on spec.md §4.4-4.6 and §6.**
//!
//! Grounded throughout in `semi-hsms-rs::PrimitiveClient::connect` /
//! `GenericClient` (`examples/NathanielHardesty-semi-rs/semi-hsms-rs/src/lib.rs`):
//! a synchronous connect handshake on the caller's thread, followed by two
//! spawned worker threads sharing the connection through a mailbox and a
//! oneshot-keyed correlation table. The STOMP-specific surface (Send,
//! Subscribe, Ack/Nack, Begin/Commit/Abort, Close) is new, but every
//! plumbing decision underneath it — mailbox shape, receipt table, thread
//! split — follows that file.

pub mod cancel;
pub(crate) mod mailbox;
pub(crate) mod tables;
mod workers;

use std::io::{Read, Write};
use std::sync::mpsc::Receiver as StdReceiver;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::body::Body;
use crate::error::{Result, StompError};
use crate::frame::{decode_frame_head, encode_frame, BodyKind, Command, Decoded};
use crate::header::{self, HeaderMap};
use crate::id::IdSequence;
use crate::options::{AckOptions, ConnectOptions, SendOptions, SubscribeOptions};

pub use cancel::CancelToken;

use mailbox::{MailboxItem, MailboxSender, WriteRequest};
use tables::{ReceiptFailure, ReceiptTable, SubscriptionTable};

/// How often the receipt wait re-checks `CancelToken::is_cancelled` between
/// oneshot polls. Bounds the worst-case delay between an explicit `cancel()`
/// call and `submit` noticing it (spec.md §5 "Cancellation after submission").
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);
const DISCONNECT_CEILING: Duration = Duration::from_secs(60);

/// Shared, `Arc`-held state the two workers and every `Session` clone agree
/// on: the correlation tables and the closed flag. **Based on
/// `semi-hsms-rs::PrimitiveClient`'s `connection_state: RwLock<..>` shared
/// between the client handle and its worker threads.**
pub(crate) struct SessionCore<R> {
  pub(crate) receipts: ReceiptTable,
  pub(crate) subscriptions: SubscriptionTable<R>,
  pub(crate) rx_heart_beat_ms: u32,
  closed: Mutex<bool>,
}

impl<R> SessionCore<R> {
  fn new(rx_heart_beat_ms: u32) -> Self {
    Self {
      receipts: ReceiptTable::new(),
      subscriptions: SubscriptionTable::new(),
      rx_heart_beat_ms,
      closed: Mutex::new(false),
    }
  }

  pub(crate) fn is_closed(&self) -> bool {
    *self.closed.lock().unwrap()
  }

  /// Idempotent fatal teardown (spec.md §7 "Propagation"): every pending
  /// receipt fails, every subscription inbox closes, and the session is
  /// marked closed. Safe to call from either worker or from `Session::close`.
  pub(crate) fn fail(&self, error: &StompError) {
    let mut closed = self.closed.lock().unwrap();
    if *closed {
      return;
    }
    *closed = true;
    drop(closed);
    self.receipts.fail_all(error);
    self.subscriptions.close_all();
  }
}

struct CloseInner {
  started: bool,
  done: bool,
  outcome: Option<StompError>,
}

/// Coordinates concurrent `Session::close` callers (spec.md §8 scenario S6):
/// the first caller performs the actual DISCONNECT handshake; every other
/// concurrent caller waits for, then replays, the same terminal outcome.
struct CloseState {
  inner: Mutex<CloseInner>,
  condvar: Condvar,
}

impl CloseState {
  fn new() -> Self {
    Self {
      inner: Mutex::new(CloseInner {
        started: false,
        done: false,
        outcome: None,
      }),
      condvar: Condvar::new(),
    }
  }
}

/// A delivered MESSAGE reshaped as (Header, Body) (spec.md §3 "Message").
/// The body owns the drain-on-close completion latch described in §4.3.
pub struct Message<R> {
  pub headers: HeaderMap,
  pub body: Body<R>,
}

impl<R: Read> Message<R> {
  pub fn destination(&self) -> Option<&str> {
    self.headers.get(header::name::DESTINATION)
  }

  pub fn message_id(&self) -> Option<&str> {
    self.headers.get(header::name::MESSAGE_ID)
  }

  pub fn ack_id(&self) -> Option<&str> {
    self.headers.get(header::name::ACK)
  }

  pub fn subscription_id(&self) -> Option<&str> {
    self.headers.get(header::name::SUBSCRIPTION)
  }
}

/// A live subscription (spec.md §3 "Subscription"). Reading [`Subscription::recv`]
/// drains the inbox; dropping a `Subscription` without calling
/// [`Subscription::unsubscribe`] leaves the server-side subscription intact
/// (Design Note 9 "Cyclic ownership") — only an explicit `unsubscribe` tears
/// it down.
pub struct Subscription<R> {
  session: Session<R>,
  id: String,
  inbox: StdReceiver<Message<R>>,
}

impl<R: Read + Send + 'static> Subscription<R> {
  pub fn id(&self) -> &str {
    &self.id
  }

  /// Blocks for the next delivered message. Returns a session-closed error
  /// once the session tears down or this subscription is unsubscribed.
  pub fn recv(&self) -> Result<Message<R>> {
    self.inbox.recv().map_err(|_| StompError::SessionClosed)
  }

  pub fn unsubscribe(
    self,
    options: AckOptions,
    cancel: impl Into<Option<CancelToken>>,
  ) -> Result<()> {
    let cancel = cancel.into().unwrap_or_else(CancelToken::never);
    let mut headers = HeaderMap::new();
    headers.set(header::name::ID, self.id.clone());
    for (name, value) in &options.custom_headers {
      headers.append(name.clone(), value.clone());
    }
    let receipt_id = if options.receipt {
      Some(self.session.id_seq.next())
    } else {
      None
    };
    if let Some(rid) = &receipt_id {
      headers.set(header::name::RECEIPT, rid.clone());
    }
    let result = self
      .session
      .submit(Command::Unsubscribe, headers, Vec::new(), None, receipt_id, &cancel);
    self.session.core.subscriptions.remove(&self.id);
    result
  }
}

/// A BEGIN'd transaction (spec.md §3 "Transaction"). Dropped without
/// `commit`/`abort`, it simply leaks the server-side transaction the same
/// way an un-unsubscribed `Subscription` leaks a server-side subscription.
pub struct Transaction<R> {
  session: Session<R>,
  id: String,
}

impl<R: Read + Send + 'static> Transaction<R> {
  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn commit(self, cancel: impl Into<Option<CancelToken>>) -> Result<()> {
    self.finish(Command::Commit, cancel)
  }

  pub fn abort(self, cancel: impl Into<Option<CancelToken>>) -> Result<()> {
    self.finish(Command::Abort, cancel)
  }

  fn finish(self, command: Command, cancel: impl Into<Option<CancelToken>>) -> Result<()> {
    let cancel = cancel.into().unwrap_or_else(CancelToken::never);
    let mut headers = HeaderMap::new();
    headers.set(header::name::TRANSACTION, self.id.clone());
    self.session.submit(command, headers, Vec::new(), None, None, &cancel)
  }
}

/// A bound STOMP session (spec.md §3 "Session" and §4.6 "State machine").
/// Cheap to clone: every clone shares the same underlying workers and
/// correlation tables.
pub struct Session<R> {
  core: Arc<SessionCore<R>>,
  mailbox: MailboxSender,
  id_seq: Arc<IdSequence>,
  version: String,
  session_id: Option<String>,
  server: Option<String>,
  tx_heart_beat_ms: u32,
  rx_heart_beat_ms: u32,
  close_state: Arc<CloseState>,
}

impl<R> Clone for Session<R> {
  fn clone(&self) -> Self {
    Self {
      core: self.core.clone(),
      mailbox: self.mailbox.clone(),
      id_seq: self.id_seq.clone(),
      version: self.version.clone(),
      session_id: self.session_id.clone(),
      server: self.server.clone(),
      tx_heart_beat_ms: self.tx_heart_beat_ms,
      rx_heart_beat_ms: self.rx_heart_beat_ms,
      close_state: self.close_state.clone(),
    }
  }
}

fn negotiate_heart_beat(requested_tx_ms: u32, requested_rx_ms: u32, header_value: Option<&str>) -> (u32, u32) {
  let (sx, sy) = header_value
    .and_then(|v| {
      let mut parts = v.split(',');
      let sx: u32 = parts.next()?.trim().parse().ok()?;
      let sy: u32 = parts.next()?.trim().parse().ok()?;
      Some((sx, sy))
    })
    .unwrap_or((0, 0));
  let tx = if requested_tx_ms == 0 || sy == 0 {
    0
  } else {
    requested_tx_ms.max(sy)
  };
  let rx = if requested_rx_ms == 0 || sx == 0 {
    0
  } else {
    requested_rx_ms.max(sx)
  };
  (tx, rx)
}

/// ### CONNECT
/// **Based on spec.md §4.5 "Connect".**
///
/// Runs the CONNECT/CONNECTED handshake synchronously on the calling thread
/// — exactly the way `semi-hsms-rs::PrimitiveClient::connect` performs its
/// Select handshake before spawning the rx/tx threads — then starts the
/// reader and writer workers and hands back a bound [`Session`].
pub fn connect<R, W>(mut reader: R, mut writer: W, options: ConnectOptions) -> Result<Session<R>>
where
  R: Read + Send + 'static,
  W: Write + Send + 'static,
{
  let mut headers = HeaderMap::new();
  headers.set(header::name::ACCEPT_VERSION, options.accept_version.join(","));
  headers.set(
    header::name::HOST,
    options.host.clone().unwrap_or_else(|| "localhost".to_string()),
  );
  headers.set(
    header::name::HEART_BEAT,
    format!("{},{}", options.heart_beat_tx_ms, options.heart_beat_rx_ms),
  );
  if let Some(login) = &options.login {
    headers.set(header::name::LOGIN, login.clone());
  }
  if let Some(passcode) = &options.passcode {
    headers.set(header::name::PASSCODE, passcode.clone());
  }
  for (name, value) in &options.custom_headers {
    headers.append(name.clone(), value.clone());
  }

  encode_frame(&mut writer, Command::Connect, &headers, std::io::empty(), None)
    .map_err(StompError::Transport)?;

  let (command, response_headers, body_kind) = match decode_frame_head(&mut reader)? {
    Decoded::Frame {
      command,
      headers,
      body_kind,
    } => (command, headers, body_kind),
    Decoded::HeartBeat => {
      return Err(StompError::UnexpectedCommand(
        "heart-beat received before CONNECTED".to_string(),
      ))
    }
    Decoded::Eof => return Err(StompError::Eof),
    Decoded::ReadTimeout => return Err(StompError::TimedOut),
  };

  let (release_tx, release_rx) = oneshot::channel();
  let body = match body_kind {
    BodyKind::Bounded(n) => Body::bounded(reader, n, release_tx),
    BodyKind::Unbounded => Body::unbounded(reader, release_tx),
  };

  if command == Command::Error {
    let text = body
      .read_to_vec()
      .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
      .unwrap_or_default();
    return Err(StompError::ServerError(text));
  }
  if command != Command::Connected {
    let _ = body.close();
    return Err(StompError::UnexpectedCommand(command.to_string()));
  }
  body.close().map_err(StompError::Transport)?;
  let reader = release_rx.recv().map_err(|_| StompError::Eof)?;

  let version = response_headers
    .get(header::name::VERSION)
    .unwrap_or("1.0")
    .to_string();
  let session_id = response_headers.get(header::name::SESSION).map(str::to_string);
  let server = response_headers.get(header::name::SERVER).map(str::to_string);
  let (tx_heart_beat_ms, rx_heart_beat_ms) = negotiate_heart_beat(
    options.heart_beat_tx_ms,
    options.heart_beat_rx_ms,
    response_headers.get(header::name::HEART_BEAT),
  );

  let core = Arc::new(SessionCore::new(rx_heart_beat_ms));
  let (mailbox_tx, mailbox_rx) = std::sync::mpsc::channel();

  let writer_core = core.clone();
  thread::Builder::new()
    .name("stomp-writer".to_string())
    .spawn(move || workers::run_writer(writer, mailbox_rx, writer_core, tx_heart_beat_ms))
    .map_err(StompError::Transport)?;

  let reader_core = core.clone();
  thread::Builder::new()
    .name("stomp-reader".to_string())
    .spawn(move || workers::run_reader(reader, reader_core))
    .map_err(StompError::Transport)?;

  log::info!("connected: version={version} session={session_id:?} server={server:?}");

  Ok(Session {
    core,
    mailbox: mailbox_tx,
    id_seq: Arc::new(IdSequence::new()),
    version,
    session_id,
    server,
    tx_heart_beat_ms,
    rx_heart_beat_ms,
    close_state: Arc::new(CloseState::new()),
  })
}

impl<R: Read + Send + 'static> Session<R> {
  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn id(&self) -> Option<&str> {
    self.session_id.as_deref()
  }

  pub fn server(&self) -> Option<&str> {
    self.server.as_deref()
  }

  pub fn tx_heart_beat_ms(&self) -> u32 {
    self.tx_heart_beat_ms
  }

  pub fn rx_heart_beat_ms(&self) -> u32 {
    self.rx_heart_beat_ms
  }

  pub fn is_closed(&self) -> bool {
    self.core.is_closed()
  }

  /// Writes `command`/`headers`/`body` via the mailbox, waits for the
  /// writer's write-outcome, then — if `receipt_id` is `Some` — waits for
  /// the matching RECEIPT/ERROR. Every Send/Subscribe/Unsubscribe/Ack/Nack/
  /// Begin/Commit/Abort operation is this same shape (spec.md §4.5).
  fn submit(
    &self,
    command: Command,
    headers: HeaderMap,
    body: Vec<u8>,
    known_length: Option<u64>,
    receipt_id: Option<String>,
    cancel: &CancelToken,
  ) -> Result<()> {
    if self.core.is_closed() {
      return Err(StompError::SessionClosed);
    }
    if cancel.is_cancelled() {
      return Err(StompError::Cancelled);
    }

    let (write_ack, write_ack_rx) = oneshot::channel();
    // Built here and split: the sender half goes to the writer (which
    // registers it in the receipt table before writing); the receiver half
    // stays on this side to await the outcome.
    let (receipt_entry, receipt_rx) = match receipt_id {
      Some(id) => {
        let (tx, rx) = oneshot::channel();
        (Some((id, tx)), Some(rx))
      }
      None => (None, None),
    };

    let request = WriteRequest {
      command,
      headers,
      body,
      known_length,
      write_ack,
      receipt: receipt_entry,
    };

    self
      .mailbox
      .send(MailboxItem::Write(request))
      .map_err(|_| StompError::SessionClosed)?;

    match write_ack_rx.recv_timeout(DEFAULT_OPERATION_TIMEOUT) {
      Ok(Ok(())) => {}
      Ok(Err(e)) => return Err(StompError::Transport(e)),
      Err(_) => return Err(StompError::SessionClosed),
    }

    match receipt_rx {
      None => Ok(()),
      // Polls the oneshot alongside `cancel`'s own condvar (via
      // `CancelToken::wait_timeout`) rather than a bare `recv_timeout`, so an
      // explicit `cancel()` from another thread is noticed within one poll
      // interval instead of only once the deadline elapses.
      Some(rx) => {
        let deadline = cancel.remaining().unwrap_or(DEFAULT_OPERATION_TIMEOUT);
        let started = Instant::now();
        loop {
          match rx.try_recv() {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(ReceiptFailure::ServerError(body))) => return Err(StompError::ServerError(body)),
            Ok(Err(ReceiptFailure::SessionClosed)) => return Err(StompError::SessionClosed),
            Err(oneshot::TryRecvError::Disconnected) => return Err(StompError::SessionClosed),
            Err(oneshot::TryRecvError::Empty) => {}
          }
          if cancel.is_cancelled() {
            return Err(StompError::Cancelled);
          }
          let elapsed = started.elapsed();
          if elapsed >= deadline {
            return Err(StompError::TimedOut);
          }
          cancel.wait_timeout(CANCEL_POLL_INTERVAL.min(deadline - elapsed));
        }
      }
    }
  }

  /// **Based on spec.md §4.5 "Send".**
  pub fn send(
    &self,
    destination: &str,
    body: impl Into<Vec<u8>>,
    options: SendOptions,
    cancel: impl Into<Option<CancelToken>>,
  ) -> Result<()> {
    let cancel = cancel.into().unwrap_or_else(CancelToken::never);
    let body = body.into();
    let mut headers = HeaderMap::new();
    headers.set(header::name::DESTINATION, destination.to_string());
    if let Some(content_type) = &options.content_type {
      headers.set(header::name::CONTENT_TYPE, content_type.clone());
    }
    if let Some(transaction) = &options.transaction {
      headers.set(header::name::TRANSACTION, transaction.clone());
    }
    for (name, value) in &options.custom_headers {
      headers.append(name.clone(), value.clone());
    }
    let receipt_id = if options.receipt {
      Some(self.id_seq.next())
    } else {
      None
    };
    if let Some(id) = &receipt_id {
      headers.set(header::name::RECEIPT, id.clone());
    }
    let known_length = if body.is_empty() {
      None
    } else {
      Some(body.len() as u64)
    };
    self.submit(Command::Send, headers, body, known_length, receipt_id, &cancel)
  }

  /// **Based on spec.md §4.5 "Subscribe".**
  pub fn subscribe(
    &self,
    destination: &str,
    options: SubscribeOptions,
    cancel: impl Into<Option<CancelToken>>,
  ) -> Result<Subscription<R>> {
    let cancel = cancel.into().unwrap_or_else(CancelToken::never);
    if self.version == "1.0" && self.core.subscriptions.has_conflicting_1_0_destination(destination) {
      // Open Question 9(a): a 1.0 session has no `subscription` header on
      // MESSAGE, so routing falls back to `destination`; a second
      // subscription to a different destination would make that fallback
      // ambiguous, so it's refused outright.
      return Err(StompError::UnexpectedCommand(
        "STOMP 1.0 session already has a subscription to a different destination".to_string(),
      ));
    }

    let id = options.id.clone().unwrap_or_else(|| self.id_seq.next());
    let mut headers = HeaderMap::new();
    headers.set(header::name::ID, id.clone());
    headers.set(header::name::DESTINATION, destination.to_string());
    headers.set(header::name::ACK, options.ack.as_str());
    for (name, value) in &options.custom_headers {
      headers.append(name.clone(), value.clone());
    }
    let receipt_id = if options.receipt {
      Some(self.id_seq.next())
    } else {
      None
    };
    if let Some(rid) = &receipt_id {
      headers.set(header::name::RECEIPT, rid.clone());
    }

    self.submit(Command::Subscribe, headers, Vec::new(), None, receipt_id, &cancel)?;

    let (inbox_tx, inbox_rx) = std::sync::mpsc::channel();
    self.core.subscriptions.insert(id.clone(), destination.to_string(), inbox_tx);

    Ok(Subscription {
      session: self.clone(),
      id,
      inbox: inbox_rx,
    })
  }

  fn ack_or_nack(
    &self,
    command: Command,
    message: &Message<R>,
    options: AckOptions,
    cancel: impl Into<Option<CancelToken>>,
  ) -> Result<()> {
    let cancel = cancel.into().unwrap_or_else(CancelToken::never);
    let mut headers = HeaderMap::new();
    if self.version == "1.2" {
      let id = message
        .ack_id()
        .ok_or(StompError::MissingHeader("ack"))?
        .to_string();
      headers.set(header::name::ID, id);
    } else {
      let subscription = message
        .subscription_id()
        .ok_or(StompError::MissingHeader("subscription"))?
        .to_string();
      let message_id = message
        .message_id()
        .ok_or(StompError::MissingHeader("message-id"))?
        .to_string();
      headers.set(header::name::SUBSCRIPTION, subscription);
      headers.set(header::name::MESSAGE_ID, message_id);
    }
    if let Some(transaction) = &options.transaction {
      headers.set(header::name::TRANSACTION, transaction.clone());
    }
    for (name, value) in &options.custom_headers {
      headers.append(name.clone(), value.clone());
    }
    let receipt_id = if options.receipt {
      Some(self.id_seq.next())
    } else {
      None
    };
    if let Some(rid) = &receipt_id {
      headers.set(header::name::RECEIPT, rid.clone());
    }
    self.submit(command, headers, Vec::new(), None, receipt_id, &cancel)
  }

  /// **Based on spec.md §4.5 "Ack/Nack".**
  pub fn ack(
    &self,
    message: &Message<R>,
    options: AckOptions,
    cancel: impl Into<Option<CancelToken>>,
  ) -> Result<()> {
    self.ack_or_nack(Command::Ack, message, options, cancel)
  }

  pub fn nack(
    &self,
    message: &Message<R>,
    options: AckOptions,
    cancel: impl Into<Option<CancelToken>>,
  ) -> Result<()> {
    self.ack_or_nack(Command::Nack, message, options, cancel)
  }

  /// **Based on spec.md §4.5 "Begin/Commit/Abort".**
  pub fn begin(&self, cancel: impl Into<Option<CancelToken>>) -> Result<Transaction<R>> {
    let cancel = cancel.into().unwrap_or_else(CancelToken::never);
    let id = self.id_seq.next();
    let mut headers = HeaderMap::new();
    headers.set(header::name::TRANSACTION, id.clone());
    self.submit(Command::Begin, headers, Vec::new(), None, None, &cancel)?;
    Ok(Transaction {
      session: self.clone(),
      id,
    })
  }

  /// **Based on spec.md §4.5 "Close" and §8 scenario S6.**
  pub fn close(&self, cancel: impl Into<Option<CancelToken>>) -> Result<()> {
    let cancel = cancel.into().unwrap_or_else(CancelToken::never);
    {
      let mut state = self.close_state.inner.lock().unwrap();
      if state.started {
        while !state.done {
          state = self.close_state.condvar.wait(state).unwrap();
        }
        return match &state.outcome {
          None => Ok(()),
          Some(e) => Err(e.clone_for_broadcast()),
        };
      }
      state.started = true;
    }

    let outcome = self.do_close(cancel);

    let mut state = self.close_state.inner.lock().unwrap();
    state.outcome = outcome.as_ref().err().map(StompError::clone_for_broadcast);
    state.done = true;
    self.close_state.condvar.notify_all();
    outcome
  }

  fn do_close(&self, cancel: CancelToken) -> Result<()> {
    if self.core.is_closed() {
      let _ = self.mailbox.send(MailboxItem::Shutdown);
      return Ok(());
    }

    let receipt_id = "session-disconnect".to_string();
    let (receipt_tx, receipt_rx) = oneshot::channel();
    let (write_ack, write_ack_rx) = oneshot::channel();
    let mut headers = HeaderMap::new();
    headers.set(header::name::RECEIPT, receipt_id.clone());

    let request = WriteRequest {
      command: Command::Disconnect,
      headers,
      body: Vec::new(),
      known_length: None,
      write_ack,
      receipt: Some((receipt_id, receipt_tx)),
    };

    if self.mailbox.send(MailboxItem::Write(request)).is_err() {
      self.core.fail(&StompError::SessionClosed);
      return Ok(());
    }

    let _ = write_ack_rx.recv_timeout(DEFAULT_OPERATION_TIMEOUT);
    let wait = cancel.remaining().unwrap_or(DISCONNECT_CEILING).min(DISCONNECT_CEILING);
    let _ = receipt_rx.recv_timeout(wait);

    self.core.fail(&StompError::SessionClosed);
    let _ = self.mailbox.send(MailboxItem::Shutdown);
    Ok(())
  }
}
