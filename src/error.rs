//! ## ERROR TAXONOMY
//! **Based on spec.md §7.**
//!
//! Grounded in `smpp::CodecError`'s per-cause enum shape (`examples/iainh-smpp/src/codec.rs`)
//! rather than the teacher's bare `std::io::Error`/`ConnectionStateTransition`
//! pairing: the taxonomy spec.md asks for is richer than HSMS's, and each
//! cause gets its own variant instead of being flattened into an `io::Error`
//! message string.

use std::io;

use thiserror::Error;

/// Every error this crate can produce, grouped by the §7 taxonomy.
#[derive(Debug, Error)]
pub enum StompError {
  // --- Transport ---
  #[error("transport error: {0}")]
  Transport(#[from] io::Error),

  #[error("transport closed (end of stream)")]
  Eof,

  // --- Codec ---
  #[error("command line exceeds the {limit}-byte limit")]
  CommandLineTooLong { limit: usize },

  #[error("header block exceeds the {limit}-byte limit")]
  HeaderBlockTooLong { limit: usize },

  #[error("malformed command line")]
  MalformedCommandLine,

  #[error("malformed header line: {0:?}")]
  MalformedHeader(String),

  #[error("unrecognized STOMP command: {0:?}")]
  UnknownCommand(String),

  #[error("invalid content-length header: {0:?}")]
  InvalidContentLength(String),

  #[error("expected NUL terminator after content-length body, found byte {0:#04x}")]
  MissingNulTerminator(u8),

  #[error("required header {0:?} is missing")]
  MissingHeader(&'static str),

  // --- Protocol ---
  #[error("unexpected command {0} for current session state")]
  UnexpectedCommand(String),

  #[error("server returned ERROR: {0}")]
  ServerError(String),

  // --- Application ---
  #[error("session is closed")]
  SessionClosed,

  #[error("unknown subscription id {0:?}")]
  UnknownSubscription(String),

  #[error("operation cancelled")]
  Cancelled,

  #[error("operation timed out")]
  TimedOut,

  // --- Heart-beat ---
  #[error("heart-beat timeout: no data received within the grace window")]
  HeartbeatTimeout,
}

pub type Result<T> = std::result::Result<T, StompError>;

impl StompError {
  /// True for errors that must tear down the whole session (§7
  /// "Propagation"): transport, codec, and heart-beat-timeout failures.
  /// Protocol/application errors are per-request.
  pub fn is_fatal(&self) -> bool {
    matches!(
      self,
      StompError::Transport(_)
        | StompError::Eof
        | StompError::CommandLineTooLong { .. }
        | StompError::HeaderBlockTooLong { .. }
        | StompError::MalformedCommandLine
        | StompError::MalformedHeader(_)
        | StompError::UnknownCommand(_)
        | StompError::InvalidContentLength(_)
        | StompError::MissingNulTerminator(_)
        | StompError::HeartbeatTimeout
    )
  }

  /// A cloneable shallow copy suitable for fanning the same fatal error out
  /// to every pending receipt and every subscription at once (§7
  /// "Propagation"). `io::Error` isn't `Clone`, so we flatten to a message.
  pub fn clone_for_broadcast(&self) -> StompError {
    match self {
      StompError::Transport(e) => StompError::Transport(io::Error::new(e.kind(), e.to_string())),
      other => other.clone_variant(),
    }
  }

  fn clone_variant(&self) -> StompError {
    match self {
      StompError::Eof => StompError::Eof,
      StompError::CommandLineTooLong { limit } => StompError::CommandLineTooLong { limit: *limit },
      StompError::HeaderBlockTooLong { limit } => StompError::HeaderBlockTooLong { limit: *limit },
      StompError::MalformedCommandLine => StompError::MalformedCommandLine,
      StompError::MalformedHeader(s) => StompError::MalformedHeader(s.clone()),
      StompError::UnknownCommand(s) => StompError::UnknownCommand(s.clone()),
      StompError::InvalidContentLength(s) => StompError::InvalidContentLength(s.clone()),
      StompError::MissingNulTerminator(b) => StompError::MissingNulTerminator(*b),
      StompError::MissingHeader(s) => StompError::MissingHeader(s),
      StompError::UnexpectedCommand(s) => StompError::UnexpectedCommand(s.clone()),
      StompError::ServerError(s) => StompError::ServerError(s.clone()),
      StompError::SessionClosed => StompError::SessionClosed,
      StompError::UnknownSubscription(s) => StompError::UnknownSubscription(s.clone()),
      StompError::Cancelled => StompError::Cancelled,
      StompError::TimedOut => StompError::TimedOut,
      StompError::HeartbeatTimeout => StompError::HeartbeatTimeout,
      StompError::Transport(e) => StompError::Transport(io::Error::new(e.kind(), e.to_string())),
    }
  }
}
