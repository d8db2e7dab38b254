//! In-memory duplex byte pipe standing in for a TCP socket in integration
//! tests — grounded in the teacher's use of `TcpStream` pairs for its own
//! (network-only) integration story, adapted so the session multiplexer can
//! be driven end-to-end without a real socket.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

struct Channel {
  queue: Mutex<VecDeque<u8>>,
  condvar: Condvar,
  closed: AtomicBool,
}

impl Channel {
  fn new() -> Self {
    Self {
      queue: Mutex::new(VecDeque::new()),
      condvar: Condvar::new(),
      closed: AtomicBool::new(false),
    }
  }
}

/// One end of an in-memory duplex pipe. Implements `Read`/`Write` and is
/// cheaply `Clone`, so the same end can serve as both the reader half and
/// the writer half a `Session` expects.
pub struct PipeEnd {
  incoming: Arc<Channel>,
  outgoing: Arc<Channel>,
}

impl Clone for PipeEnd {
  fn clone(&self) -> Self {
    Self {
      incoming: self.incoming.clone(),
      outgoing: self.outgoing.clone(),
    }
  }
}

impl PipeEnd {
  /// Marks this end's outgoing channel closed: the peer's next read past
  /// the end of any buffered bytes returns `Ok(0)` instead of blocking.
  pub fn close(&self) {
    self.outgoing.closed.store(true, Ordering::SeqCst);
    self.outgoing.condvar.notify_all();
  }
}

impl Read for PipeEnd {
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    let mut queue = self.incoming.queue.lock().unwrap();
    loop {
      if !queue.is_empty() {
        let n = queue.len().min(buf.len());
        for slot in buf.iter_mut().take(n) {
          *slot = queue.pop_front().unwrap();
        }
        return Ok(n);
      }
      if self.incoming.closed.load(Ordering::SeqCst) {
        return Ok(0);
      }
      queue = self.incoming.condvar.wait(queue).unwrap();
    }
  }
}

impl Write for PipeEnd {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    let mut queue = self.outgoing.queue.lock().unwrap();
    queue.extend(buf.iter().copied());
    self.outgoing.condvar.notify_all();
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

/// Creates two connected ends: bytes written to one are read from the other.
pub fn duplex_pipe() -> (PipeEnd, PipeEnd) {
  let a = Arc::new(Channel::new());
  let b = Arc::new(Channel::new());
  (
    PipeEnd {
      incoming: a.clone(),
      outgoing: b.clone(),
    },
    PipeEnd {
      incoming: b,
      outgoing: a,
    },
  )
}
