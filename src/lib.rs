//! # stomp-core
//!
//! A STOMP 1.0/1.1/1.2 client core: wire codec, session multiplexer, and
//! request/reply coordination over a caller-supplied blocking byte stream.
//!
//! This crate does not dial TCP, resolve DNS, or negotiate TLS — callers
//! hand it a split read/write pair (e.g. two clones of a `TcpStream`, or an
//! in-memory duplex pipe in tests) and get back a [`session::Session`].
//!
//! ```no_run
//! use std::net::TcpStream;
//! use stomp_core::{options::ConnectOptions, session};
//!
//! # fn main() -> stomp_core::Result<()> {
//! let stream = TcpStream::connect("localhost:61613")?;
//! let reader = stream.try_clone()?;
//! let session = session::connect(reader, stream, ConnectOptions::new())?;
//!
//! let subscription = session.subscribe(
//!     "/queue/demo",
//!     Default::default(),
//!     None,
//! )?;
//! let message = subscription.recv()?;
//! let body = message.body.read_to_vec()?;
//! println!("{}", String::from_utf8_lossy(&body));
//! # Ok(())
//! # }
//! ```

pub mod body;
pub mod error;
pub mod frame;
pub mod header;
pub mod id;
pub mod options;
pub mod session;

pub use error::{Result, StompError};
pub use session::{connect, CancelToken, Message, Session, Subscription, Transaction};
