//! Sends two messages inside a single transaction and commits it — if the
//! broker ever reports an ERROR mid-transaction, abort instead so neither
//! message is delivered.

use std::net::TcpStream;

use stomp_core::options::{ConnectOptions, SendOptions};

fn main() -> stomp_core::Result<()> {
  env_logger::init();

  let stream = TcpStream::connect("127.0.0.1:61613").map_err(stomp_core::StompError::Transport)?;
  let reader = stream.try_clone().map_err(stomp_core::StompError::Transport)?;
  let session = stomp_core::connect(reader, stream, ConnectOptions::new())?;

  let transaction = session.begin(None)?;
  let send_options = SendOptions::new().with_transaction(transaction.id());

  let outcome = session
    .send("/queue/demo", b"first in transaction".to_vec(), send_options.clone(), None)
    .and_then(|_| session.send("/queue/demo", b"second in transaction".to_vec(), send_options, None));

  match outcome {
    Ok(()) => transaction.commit(None)?,
    Err(e) => {
      eprintln!("aborting transaction after error: {e}");
      transaction.abort(None)?;
    }
  }

  session.close(None)
}
