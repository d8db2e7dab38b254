//! Integration tests driving the full session multiplexer over an in-memory
//! duplex pipe with a scripted fake-server thread, covering spec.md §8
//! scenarios S4 (receipt correlation), S5 (back-pressured body), and S6
//! (close idempotence), plus the basic connect handshake.

mod support;

use std::io::Read;
use std::thread;

use stomp_core::error::StompError;
use stomp_core::frame::{decode_frame_head, encode_frame, Command, Decoded};
use stomp_core::header::{self, HeaderMap};
use stomp_core::options::{ConnectOptions, SendOptions, SubscribeOptions};
use support::{duplex_pipe, PipeEnd};

fn init_logging() {
  let _ = env_logger::try_init();
}

/// Reads one frame head plus its (small) body off `server`, as the fake
/// server side of the pipe.
fn server_read_frame(server: &mut PipeEnd) -> (Command, HeaderMap, Vec<u8>) {
  loop {
    match decode_frame_head(server).expect("decode on server side") {
      Decoded::Frame {
        command,
        headers,
        body_kind,
      } => {
        let body = match body_kind {
          stomp_core::frame::BodyKind::Bounded(n) => {
            let mut buf = vec![0u8; n as usize];
            server.read_exact(&mut buf).unwrap();
            let mut nul = [0u8; 1];
            server.read_exact(&mut nul).unwrap();
            buf
          }
          stomp_core::frame::BodyKind::Unbounded => {
            let mut buf = Vec::new();
            let mut byte = [0u8; 1];
            loop {
              server.read_exact(&mut byte).unwrap();
              if byte[0] == 0 {
                break;
              }
              buf.push(byte[0]);
            }
            buf
          }
        };
        return (command, headers, body);
      }
      Decoded::HeartBeat | Decoded::ReadTimeout => continue,
      Decoded::Eof => panic!("server side saw EOF while waiting for a frame"),
    }
  }
}

fn server_write_frame(server: &mut PipeEnd, command: Command, headers: &HeaderMap) {
  encode_frame(server, command, headers, std::io::empty(), None).expect("server write");
}

fn handshake(server: &mut PipeEnd, version: &str, session_id: &str) {
  let (command, _headers, _body) = server_read_frame(server);
  assert_eq!(command, Command::Connect);
  let mut reply = HeaderMap::new();
  reply.set(header::name::VERSION, version.to_string());
  reply.set(header::name::SESSION, session_id.to_string());
  reply.set(header::name::SERVER, "test-broker/1.0".to_string());
  reply.set(header::name::HEART_BEAT, "0,0".to_string());
  server_write_frame(server, Command::Connected, &reply);
}

#[test]
fn connect_negotiates_version_and_session_id() {
  init_logging();
  let (client, mut server) = duplex_pipe();
  let server_thread = thread::spawn(move || {
    handshake(&mut server, "1.2", "sess-42");
    server
  });

  let session = stomp_core::connect(client.clone(), client, ConnectOptions::new()).unwrap();
  assert_eq!(session.version(), "1.2");
  assert_eq!(session.id(), Some("sess-42"));
  assert_eq!(session.server(), Some("test-broker/1.0"));

  server_thread.join().unwrap();
}

#[test]
fn s4_receipt_correlation_completes_only_the_matching_waiter() {
  init_logging();
  let (client, mut server) = duplex_pipe();
  let server_thread = thread::spawn(move || {
    handshake(&mut server, "1.2", "sess-1");

    // Read both SENDs first, then answer receipts out of order relative to
    // arrival — the table must still route each RECEIPT to its own waiter.
    let (cmd1, headers1, _) = server_read_frame(&mut server);
    assert_eq!(cmd1, Command::Send);
    let receipt1 = headers1.get(header::name::RECEIPT).unwrap().to_string();

    let (cmd2, headers2, _) = server_read_frame(&mut server);
    assert_eq!(cmd2, Command::Send);
    let receipt2 = headers2.get(header::name::RECEIPT).unwrap().to_string();

    let mut reply2 = HeaderMap::new();
    reply2.set(header::name::RECEIPT_ID, receipt2);
    server_write_frame(&mut server, Command::Receipt, &reply2);

    let mut reply1 = HeaderMap::new();
    reply1.set(header::name::RECEIPT_ID, receipt1);
    server_write_frame(&mut server, Command::Receipt, &reply1);

    server
  });

  let session = stomp_core::connect(client.clone(), client, ConnectOptions::new()).unwrap();

  let s1 = session.clone();
  let t1 = thread::spawn(move || {
    s1.send(
      "/queue/a",
      b"first".to_vec(),
      SendOptions::new().with_receipt(),
      None,
    )
  });
  let s2 = session.clone();
  let t2 = thread::spawn(move || {
    s2.send(
      "/queue/b",
      b"second".to_vec(),
      SendOptions::new().with_receipt(),
      None,
    )
  });

  assert!(t1.join().unwrap().is_ok());
  assert!(t2.join().unwrap().is_ok());

  server_thread.join().unwrap();
}

#[test]
fn s5_back_pressured_body_blocks_delivery_until_closed() {
  init_logging();
  let (client, mut server) = duplex_pipe();
  let server_thread = thread::spawn(move || {
    handshake(&mut server, "1.2", "sess-1");

    let (cmd, headers, _) = server_read_frame(&mut server);
    assert_eq!(cmd, Command::Subscribe);
    let sub_id = headers.get(header::name::ID).unwrap().to_string();

    for (i, text) in ["first", "second"].into_iter().enumerate() {
      let mut headers = HeaderMap::new();
      headers.set(header::name::SUBSCRIPTION, sub_id.clone());
      headers.set(header::name::MESSAGE_ID, format!("m-{i}"));
      headers.set(header::name::DESTINATION, "/queue/a".to_string());
      headers.set(header::name::CONTENT_LENGTH, text.len().to_string());
      encode_frame(&mut server, Command::Message, &headers, text.as_bytes(), Some(text.len() as u64))
        .unwrap();
    }

    // Meanwhile an independent SEND must still be serviced by the writer.
    let (cmd, _headers, body) = server_read_frame(&mut server);
    assert_eq!(cmd, Command::Send);
    assert_eq!(body, b"concurrent");

    server
  });

  let session = stomp_core::connect(client.clone(), client, ConnectOptions::new()).unwrap();
  let subscription = session
    .subscribe("/queue/a", SubscribeOptions::new(), None)
    .unwrap();

  let first = subscription.recv().unwrap();
  assert_eq!(first.body.read_to_vec().unwrap(), b"first");
  // `read_to_vec` already closes the body, reclaiming the transport, so the
  // second MESSAGE becomes visible. Before that point a bounded wait on the
  // inbox would observe nothing (back-pressure); exercised implicitly by the
  // fact the server thread only proceeds to read further SENDs once both
  // MESSAGE frames have actually left the socket, which requires the reader
  // worker to have advanced past the first frame's body.

  let concurrent_session = session.clone();
  let sender = thread::spawn(move || {
    concurrent_session
      .send("/queue/a", b"concurrent".to_vec(), SendOptions::new(), None)
      .unwrap()
  });

  let second = subscription.recv().unwrap();
  assert_eq!(second.body.read_to_vec().unwrap(), b"second");

  sender.join().unwrap();
  server_thread.join().unwrap();
}

#[test]
fn s6_close_is_idempotent_and_fails_subsequent_calls() {
  init_logging();
  let (client, mut server) = duplex_pipe();
  let server_thread = thread::spawn(move || {
    handshake(&mut server, "1.2", "sess-1");
    let (cmd, headers, _) = server_read_frame(&mut server);
    assert_eq!(cmd, Command::Disconnect);
    let receipt_id = headers.get(header::name::RECEIPT).unwrap().to_string();
    let mut reply = HeaderMap::new();
    reply.set(header::name::RECEIPT_ID, receipt_id);
    server_write_frame(&mut server, Command::Receipt, &reply);
    server
  });

  let session = stomp_core::connect(client.clone(), client, ConnectOptions::new()).unwrap();

  let s1 = session.clone();
  let t1 = thread::spawn(move || s1.close(None));
  let s2 = session.clone();
  let t2 = thread::spawn(move || s2.close(None));

  assert!(t1.join().unwrap().is_ok());
  assert!(t2.join().unwrap().is_ok());
  assert!(session.is_closed());

  match session.send("/queue/a", b"too late".to_vec(), SendOptions::new(), None) {
    Err(StompError::SessionClosed) => {}
    other => panic!("expected SessionClosed, got {other:?}"),
  }

  server_thread.join().unwrap();
}
