//! ## READER / WRITER WORKERS
//! **Based on spec.md §4.4 "Structure" and §5 "Heart-beats (contract)".**
//!
//! Direct generalization of `semi-hsms-rs::PrimitiveClient::connect`'s
//! rx/tx thread pair and `GenericClient::tx_handle`'s outbox-insert-before-send
//! pattern, adapted to STOMP's `receipt`/`receipt-id` correlation and to the
//! body hand-off invariant (spec.md §3 "Invariant (critical)") the HSMS
//! length-prefixed protocol never needed.

use std::io::{self, Read, Write};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::body::Body;
use crate::error::StompError;
use crate::frame::{decode_frame_head, encode_frame, write_heartbeat, BodyKind, Command, Decoded};
use crate::header;
use crate::session::mailbox::MailboxItem;
use crate::session::tables::ReceiptFailure;
use crate::session::{Message, SessionCore};

/// The writer worker: owns the transport's write half exclusively. Consumes
/// [`MailboxItem`]s; for receipted frames, registers the waiter in the
/// receipt table *before* writing, per spec.md §4.4's race-avoidance note.
/// When the mailbox has been idle for the negotiated tx heart-beat interval,
/// emits a bare LF instead of blocking forever.
pub(crate) fn run_writer<R, W: Write>(
  mut writer: W,
  mailbox: Receiver<MailboxItem>,
  core: Arc<SessionCore<R>>,
  tx_heart_beat_ms: u32,
) {
  let tx_interval = if tx_heart_beat_ms > 0 {
    Some(Duration::from_millis(tx_heart_beat_ms as u64))
  } else {
    None
  };
  let mut last_write = Instant::now();
  loop {
    let wait = match tx_interval {
      Some(interval) => interval.saturating_sub(last_write.elapsed()),
      None => Duration::from_secs(24 * 60 * 60),
    };
    match mailbox.recv_timeout(wait) {
      Ok(MailboxItem::Shutdown) => {
        log::debug!("writer worker: shutdown requested");
        return;
      }
      Ok(MailboxItem::Write(req)) => {
        if let Some((id, sender)) = req.receipt {
          core.receipts.insert(id, sender);
        }
        let result = encode_frame(
          &mut writer,
          req.command,
          &req.headers,
          io::Cursor::new(req.body),
          req.known_length,
        );
        last_write = Instant::now();
        if let Err(e) = result {
          let ack_err = io::Error::new(e.kind(), e.to_string());
          let _ = req.write_ack.send(Err(ack_err));
          core.fail(&StompError::Transport(e));
          return;
        }
        let _ = req.write_ack.send(Ok(()));
      }
      Err(RecvTimeoutError::Timeout) => {
        if tx_interval.is_some() && last_write.elapsed() >= tx_interval.unwrap() {
          if let Err(e) = write_heartbeat(&mut writer) {
            core.fail(&StompError::Transport(e));
            return;
          }
          last_write = Instant::now();
        }
      }
      Err(RecvTimeoutError::Disconnected) => {
        log::debug!("writer worker: mailbox closed");
        return;
      }
    }
    if core.is_closed() {
      return;
    }
  }
}

/// The reader worker: owns the transport's read half exclusively. Parses one
/// frame head at a time; for frames with a body, hands a [`Body`] to either
/// the correlation tables (RECEIPT/ERROR) or a subscription inbox (MESSAGE),
/// then blocks on that body's completion latch before parsing the next frame
/// head — this is the structural enforcement of the "at most one inbound
/// body live" invariant (spec.md §3).
pub(crate) fn run_reader<R: Read + Send + 'static>(reader: R, core: Arc<SessionCore<R>>) {
  let mut transport = Some(reader);
  let rx_heart_beat_ms = core.rx_heart_beat_ms;
  let mut last_seen = Instant::now();

  loop {
    if core.is_closed() {
      return;
    }
    let decoded = decode_frame_head(transport.as_mut().expect("transport present between frames"));
    match decoded {
      Ok(Decoded::ReadTimeout) => {
        if rx_heart_beat_ms > 0
          && last_seen.elapsed() >= Duration::from_millis(2 * rx_heart_beat_ms as u64)
        {
          core.fail(&StompError::HeartbeatTimeout);
          return;
        }
        continue;
      }
      Ok(Decoded::HeartBeat) => {
        last_seen = Instant::now();
        continue;
      }
      Ok(Decoded::Eof) => {
        core.fail(&StompError::Eof);
        return;
      }
      Err(e) => {
        core.fail(&e);
        return;
      }
      Ok(Decoded::Frame {
        command,
        headers,
        body_kind,
      }) => {
        last_seen = Instant::now();
        let t = transport.take().expect("transport present");
        let (release_tx, release_rx) = oneshot::channel();
        let body = match body_kind {
          BodyKind::Bounded(n) => Body::bounded(t, n, release_tx),
          BodyKind::Unbounded => Body::unbounded(t, release_tx),
        };

        match command {
          Command::Receipt => {
            if let Some(id) = headers.get(header::name::RECEIPT_ID) {
              core.receipts.complete(id, Ok(()));
            } else {
              log::warn!("RECEIPT frame with no receipt-id header; dropping");
            }
            if let Err(e) = body.close() {
              core.fail(&StompError::Transport(e));
              return;
            }
          }
          Command::Error => {
            let receipt_id = headers.get(header::name::RECEIPT_ID).map(str::to_string);
            match body.read_to_vec() {
              Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                if let Some(id) = &receipt_id {
                  core.receipts.complete(id, Err(ReceiptFailure::ServerError(text.clone())));
                }
                log::warn!("server ERROR: {text}");
              }
              Err(e) => {
                core.fail(&StompError::Transport(e));
                return;
              }
            }
          }
          Command::Message => {
            let subscription_id = headers.get(header::name::SUBSCRIPTION);
            let destination = headers.get(header::name::DESTINATION).unwrap_or("");
            match core.subscriptions.route(subscription_id, destination) {
              Some(inbox) => {
                let message = Message { headers, body };
                if let Err(std::sync::mpsc::SendError(message)) = inbox.send(message) {
                  log::debug!("inbox gone for delivered MESSAGE; draining locally");
                  let _ = message.body.close();
                }
              }
              None => {
                log::warn!("MESSAGE for unknown subscription/destination {destination:?}; draining");
                if let Err(e) = body.close() {
                  core.fail(&StompError::Transport(e));
                  return;
                }
              }
            }
          }
          Command::Connected => {
            let _ = body.close();
            core.fail(&StompError::UnexpectedCommand(
              "CONNECTED received mid-session".to_string(),
            ));
            return;
          }
          _ => {
            log::warn!("unexpected command {command} from server mid-session; draining body");
            if let Err(e) = body.close() {
              core.fail(&StompError::Transport(e));
              return;
            }
          }
        }

        match release_rx.recv() {
          Ok(t) => transport = Some(t),
          Err(_) => {
            // Body was dropped without the transport ever being reclaimed —
            // can only happen if the process is tearing down mid-delivery.
            core.fail(&StompError::SessionClosed);
            return;
          }
        }
      }
    }
  }
}
