//! Connects to a broker on localhost, subscribes to a queue on one thread,
//! and sends a handful of messages to it from another — the same rx/tx
//! thread split the library itself uses internally, just one level up.
//!
//! Run a broker locally (e.g. `docker run -p 61613:61613 rmohr/activemq`)
//! before `cargo run --example send_receive`.

use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use stomp_core::options::{ConnectOptions, SendOptions, SubscribeOptions};

fn main() -> stomp_core::Result<()> {
  env_logger::init();

  let stream = TcpStream::connect("127.0.0.1:61613").map_err(stomp_core::StompError::Transport)?;
  let reader = stream.try_clone().map_err(stomp_core::StompError::Transport)?;
  let session = stomp_core::connect(reader, stream, ConnectOptions::new().with_host("localhost"))?;

  println!(
    "connected: version={} session={:?} server={:?}",
    session.version(),
    session.id(),
    session.server()
  );

  let subscription = session.subscribe("/queue/demo", SubscribeOptions::new(), None)?;
  let rx_session = session.clone();
  let rx_thread = thread::spawn(move || loop {
    match subscription.recv() {
      Ok(message) => {
        let destination = message.destination().unwrap_or("?").to_string();
        match message.body.read_to_vec() {
          Ok(body) => println!("received on {destination}: {}", String::from_utf8_lossy(&body)),
          Err(e) => {
            eprintln!("failed to read message body: {e}");
            break;
          }
        }
      }
      Err(_) => {
        println!("subscription closed");
        break;
      }
    }
    if rx_session.is_closed() {
      break;
    }
  });

  for i in 0..5 {
    session.send(
      "/queue/demo",
      format!("hello #{i}").into_bytes(),
      SendOptions::new().with_receipt(),
      None,
    )?;
    thread::sleep(Duration::from_millis(200));
  }

  thread::sleep(Duration::from_millis(500));
  session.close(None)?;
  rx_thread.join().unwrap();
  Ok(())
}
