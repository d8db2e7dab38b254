//! ## BODY STREAMS
//! **Based on spec.md §3-4.3 and the Go original's `waiting_read_closer.go`/`frame/reader_test.go`.**
//!
//! Three adapters compose here:
//! - [`LengthBoundedReader`] — a `content-length`-bounded body.
//! - [`NulTerminatedReader`] — a body that ends at the first NUL.
//! - [`Body`] — the drain-on-close wrapper the session hands to callers,
//!   carrying the transport itself so the reader worker can reclaim it.
//!
//! The Go original's `waitingReadCloser` ties a `sync.WaitGroup` to the
//! reader; `Close` both closes the underlying reader and calls `wg.Done()`,
//! which is exactly the one-shot completion latch spec.md §4.3 describes.
//! Here the latch additionally *carries the transport back*, since Rust's
//! ownership model makes "give the transport back" a value-passing problem
//! rather than a shared-mutable-state one.

use std::io::{self, ErrorKind, Read};

use oneshot::Sender as ReleaseSender;

/// A body view bounded by a `content-length` header: yields exactly `N`
/// bytes, then consumes (and validates) the mandatory trailing NUL.
pub struct LengthBoundedReader<R> {
  inner: R,
  remaining: u64,
  nul_consumed: bool,
}

impl<R: Read> LengthBoundedReader<R> {
  pub fn new(inner: R, length: u64) -> Self {
    Self {
      inner,
      remaining: length,
      nul_consumed: false,
    }
  }

  fn consume_nul(&mut self) -> io::Result<()> {
    if self.nul_consumed {
      return Ok(());
    }
    let mut byte = [0u8; 1];
    let n = self.inner.read(&mut byte)?;
    if n == 0 {
      return Err(io::Error::new(
        ErrorKind::UnexpectedEof,
        "stream ended before the content-length terminator",
      ));
    }
    if byte[0] != 0 {
      return Err(io::Error::new(
        ErrorKind::InvalidData,
        format!(
          "expected NUL terminator after content-length body, found byte {:#04x}",
          byte[0]
        ),
      ));
    }
    self.nul_consumed = true;
    Ok(())
  }

  pub fn into_inner(self) -> R {
    self.inner
  }
}

impl<R: Read> Read for LengthBoundedReader<R> {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    if self.remaining == 0 {
      self.consume_nul()?;
      return Ok(0);
    }
    let cap = (self.remaining as usize).min(buf.len());
    let n = self.inner.read(&mut buf[..cap])?;
    if n == 0 {
      return Err(io::Error::new(
        ErrorKind::UnexpectedEof,
        "stream ended before the declared content-length",
      ));
    }
    self.remaining -= n as u64;
    if self.remaining == 0 {
      self.consume_nul()?;
    }
    Ok(n)
  }
}

/// A body view with no `content-length`: yields bytes up to (not including)
/// the first NUL, then signals end-of-stream forever after.
pub struct NulTerminatedReader<R> {
  inner: R,
  done: bool,
}

impl<R: Read> NulTerminatedReader<R> {
  pub fn new(inner: R) -> Self {
    Self { inner, done: false }
  }

  pub fn into_inner(self) -> R {
    self.inner
  }
}

impl<R: Read> Read for NulTerminatedReader<R> {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    if self.done || buf.is_empty() {
      return Ok(0);
    }
    let mut written = 0;
    while written < buf.len() {
      let mut byte = [0u8; 1];
      let n = self.inner.read(&mut byte)?;
      if n == 0 {
        self.done = true;
        return Err(io::Error::new(
          ErrorKind::UnexpectedEof,
          "stream ended before the NUL body terminator",
        ));
      }
      if byte[0] == 0 {
        self.done = true;
        return Ok(written);
      }
      buf[written] = byte[0];
      written += 1;
    }
    Ok(written)
  }
}

enum Bounds<R> {
  Bounded(LengthBoundedReader<R>),
  Unbounded(NulTerminatedReader<R>),
}

impl<R: Read> Read for Bounds<R> {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    match self {
      Bounds::Bounded(r) => r.read(buf),
      Bounds::Unbounded(r) => r.read(buf),
    }
  }
}

impl<R> Bounds<R> {
  fn into_inner(self) -> R {
    match self {
      Bounds::Bounded(r) => r.into_inner(),
      Bounds::Unbounded(r) => r.into_inner(),
    }
  }
}

/// ## DRAIN-ON-CLOSE BODY
/// **Based on spec.md §4.3 "Drain-on-close wrapper".**
///
/// The body the session hands to application code for every inbound frame.
/// It owns the transport outright for as long as it's alive: the reader
/// worker cannot parse the next frame until this `Body` is closed (or
/// dropped — see the `Drop` impl), because closing is the only way the
/// transport is handed back.
pub struct Body<R> {
  bounds: Option<Bounds<R>>,
  release: Option<ReleaseSender<R>>,
}

impl<R: Read> Body<R> {
  pub(crate) fn bounded(inner: R, length: u64, release: ReleaseSender<R>) -> Self {
    Body {
      bounds: Some(Bounds::Bounded(LengthBoundedReader::new(inner, length))),
      release: Some(release),
    }
  }

  pub(crate) fn unbounded(inner: R, release: ReleaseSender<R>) -> Self {
    Body {
      bounds: Some(Bounds::Unbounded(NulTerminatedReader::new(inner))),
      release: Some(release),
    }
  }

  /// Drains any unread body bytes, consumes the terminator, and signals the
  /// session reader worker that the transport is safe to parse again. Most
  /// callers should read the body to completion themselves (cheaper) and
  /// then call `close`; calling `close` early still drains correctly.
  pub fn close(mut self) -> io::Result<()> {
    self.finish()
  }

  /// Reads the whole body into a `Vec<u8>` and closes it. Convenience for
  /// the common case (ERROR bodies, small MESSAGE payloads).
  pub fn read_to_vec(mut self) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    self.read_to_end(&mut buf)?;
    self.finish()?;
    Ok(buf)
  }

  fn finish(&mut self) -> io::Result<()> {
    let mut sink = [0u8; 8192];
    let drain_result = loop {
      match Read::read(self, &mut sink) {
        Ok(0) => break Ok(()),
        Ok(_) => continue,
        Err(e) => break Err(e),
      }
    };
    if let Some(bounds) = self.bounds.take() {
      let transport = bounds.into_inner();
      if let Some(release) = self.release.take() {
        let _ = release.send(transport);
      }
    }
    drain_result
  }
}

impl<R: Read> Read for Body<R> {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    match self.bounds.as_mut() {
      Some(b) => b.read(buf),
      None => Ok(0),
    }
  }
}

impl<R: Read> Drop for Body<R> {
  /// A caller that drops a `Body` without calling `close` would otherwise
  /// wedge the session forever (the reader worker never gets the transport
  /// back). Best-effort drain-and-release on drop makes that a correctness
  /// footgun rather than a deadlock.
  fn drop(&mut self) {
    if self.bounds.is_some() {
      let _ = self.finish();
    }
  }
}
