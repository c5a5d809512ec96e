//! Store server over a real TCP socket

use crate::harness::wait_until;
use downhole_io::store::{MemoryStore, SharedStore};
use downhole_io::streaming::{FrameReader, Request, Response, StoreServer, read_message, write_message};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

struct Server {
    addr: SocketAddr,
    store: Arc<MemoryStore>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Server {
    fn start() -> Self {
        let store = Arc::new(MemoryStore::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let server = StoreServer::bind(
            "127.0.0.1:0",
            store.clone(),
            15.0,
            Arc::clone(&shutdown),
        )
        .unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.spawn().unwrap();
        Self {
            addr,
            store,
            shutdown,
            handle: Some(handle),
        }
    }

    fn connect(&self) -> Client {
        let stream = TcpStream::connect(self.addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        Client {
            stream,
            reader: FrameReader::new(),
        }
    }
}

impl Server {
    /// Set the shutdown flag; false if the server thread is still running after `timeout`
    fn stop_within(&mut self, timeout: Duration) -> bool {
        self.shutdown.store(true, Ordering::Relaxed);
        let Some(handle) = self.handle.take() else {
            return true;
        };
        let (tx, rx) = crossbeam_channel::bounded(1);
        std::thread::spawn(move || {
            let _ = tx.send(handle.join().is_ok());
        });
        rx.recv_timeout(timeout).unwrap_or(false)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
    }
}

struct Client {
    stream: TcpStream,
    reader: FrameReader,
}

impl Client {
    fn call(&mut self, request: &Request) -> Response {
        write_message(&mut self.stream, request).unwrap();
        self.recv()
    }

    fn recv(&mut self) -> Response {
        read_message(&mut self.reader, &mut self.stream).unwrap()
    }
}

#[test]
fn test_get_set_roundtrip() {
    let server = Server::start();
    let mut client = server.connect();

    assert_eq!(
        client.call(&Request::Get {
            key: "load-cell".to_string()
        }),
        Response::Value { value: None }
    );
    assert_eq!(
        client.call(&Request::Set {
            key: "load-cell".to_string(),
            value: r#"{"load": 2.5}"#.to_string(),
        }),
        Response::Ok
    );
    assert_eq!(
        server.store.get("load-cell").unwrap().as_deref(),
        Some(r#"{"load": 2.5}"#)
    );
    assert_eq!(
        client.call(&Request::Get {
            key: "load-cell".to_string()
        }),
        Response::Value {
            value: Some(r#"{"load": 2.5}"#.to_string())
        }
    );
}

#[test]
fn test_subscribe_streams_messages() {
    let server = Server::start();
    let mut subscriber = server.connect();
    let mut publisher = server.connect();

    assert_eq!(
        subscriber.call(&Request::Subscribe {
            topic: "downhole".to_string()
        }),
        Response::Ok
    );
    assert!(wait_until(Duration::from_secs(2), || {
        server.store.subscriber_count("downhole") == 1
    }));

    for intent in ["motor-rpm:40", "motor-stop"] {
        assert_eq!(
            publisher.call(&Request::Publish {
                topic: "downhole".to_string(),
                payload: intent.to_string(),
            }),
            Response::Ok
        );
    }

    for expected in ["motor-rpm:40", "motor-stop"] {
        assert_eq!(
            subscriber.recv(),
            Response::Message {
                topic: "downhole".to_string(),
                payload: expected.to_string(),
            }
        );
    }
}

#[test]
fn test_malformed_json_keeps_connection() {
    let server = Server::start();
    let mut client = server.connect();

    let garbage = b"{not json";
    let mut frame = (garbage.len() as u32).to_be_bytes().to_vec();
    frame.extend_from_slice(garbage);
    client.stream.write_all(&frame).unwrap();
    assert!(matches!(client.recv(), Response::Error { .. }));

    match client.call(&Request::Snapshot) {
        Response::State(state) => {
            assert!(!state.alive);
            assert!(state.telemetry.is_none());
        }
        other => panic!("expected state, got {:?}", other),
    }
}

#[test]
fn test_oversized_frame_closes_connection() {
    let server = Server::start();
    let mut client = server.connect();

    client.stream.write_all(&u32::MAX.to_be_bytes()).unwrap();
    let mut buf = [0u8; 1];
    // Server drops the socket without replying
    let n = client.stream.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0);
}

#[test]
fn test_stalled_subscriber_does_not_block_shutdown() {
    let mut server = Server::start();
    let mut stalled = server.connect();
    assert_eq!(
        stalled.call(&Request::Subscribe {
            topic: "uphole".to_string()
        }),
        Response::Ok
    );
    assert!(wait_until(Duration::from_secs(2), || {
        server.store.subscriber_count("uphole") == 1
    }));

    // Far more than the socket buffers hold; the client never reads
    let payload = "x".repeat(100_000);
    for _ in 0..300 {
        server.store.publish("uphole", &payload).unwrap();
    }

    assert!(server.stop_within(Duration::from_secs(5)));
    drop(stalled);
}

#[test]
fn test_departed_subscribers_are_released() {
    let server = Server::start();
    for _ in 0..20 {
        let mut client = server.connect();
        assert_eq!(
            client.call(&Request::Subscribe {
                topic: "oricalib".to_string()
            }),
            Response::Ok
        );
    }

    // Nothing is published, so only the hangup can end these sessions
    assert!(wait_until(Duration::from_secs(2), || {
        server.store.subscriber_count("oricalib") == 0
    }));
}
