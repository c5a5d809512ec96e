//! TCP access to the shared store
//!
//! External collaborators (GUI, loggers, depth and load drivers) reach the
//! daemon's store through this server. Each client gets its own thread.
//!
//! # Messages
//!
//! Internally tagged JSON, one per frame (see [`super::wire`]):
//!
//! | Request | Response |
//! |---------|----------|
//! | `{"type":"Get","key":..}` | `{"type":"Value","value":..}` (null if absent) |
//! | `{"type":"Set","key":..,"value":..}` | `{"type":"Ok"}` |
//! | `{"type":"Publish","topic":..,"payload":..}` | `{"type":"Ok"}` |
//! | `{"type":"Subscribe","topic":..}` | `{"type":"Ok"}`, then a `Message` per publish |
//! | `{"type":"Snapshot"}` | `{"type":"State",..}` with the drill state fields |
//!
//! Malformed JSON is answered with `{"type":"Error","message":..}` and the
//! connection stays open. An oversized length prefix closes it. After
//! `Subscribe` the connection only streams messages until the client leaves.
//! A subscriber that stops reading is dropped after one write timeout.

use super::wire::{FrameReader, write_message};
use crate::error::{Error, Result};
use crate::state::{DrillState, DrillStateAggregator};
use crate::store::SharedStore;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Client socket read and write timeout, bounds shutdown latency
const CLIENT_POLL: Duration = Duration::from_millis(200);

/// Read timeout while a subscriber's topic is quiet, only to notice hangups
const HANGUP_POLL: Duration = Duration::from_millis(1);

/// Pause between accept attempts on an idle listener
const ACCEPT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Get { key: String },
    Set { key: String, value: String },
    Publish { topic: String, payload: String },
    Subscribe { topic: String },
    Snapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Value { value: Option<String> },
    Ok,
    Message { topic: String, payload: String },
    State(DrillState),
    Error { message: String },
}

pub struct StoreServer {
    listener: TcpListener,
    store: Arc<dyn SharedStore>,
    aggregator: Arc<DrillStateAggregator>,
    shutdown: Arc<AtomicBool>,
}

impl StoreServer {
    pub fn bind(
        bind_address: &str,
        store: Arc<dyn SharedStore>,
        liveness_threshold_secs: f64,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(bind_address)?;
        listener.set_nonblocking(true)?;
        let aggregator = Arc::new(DrillStateAggregator::new(
            Arc::clone(&store),
            liveness_threshold_secs,
        ));
        log::info!("Store server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            store,
            aggregator,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until shutdown, then wait for their threads
    pub fn run(self) -> Result<()> {
        let mut clients: Vec<JoinHandle<()>> = Vec::new();

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, addr)) => match self.spawn_session(stream, addr) {
                    Ok(handle) => clients.push(handle),
                    Err(e) => log::warn!("Dropping client {}: {}", addr, e),
                },
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    log::error!("Error accepting client connection: {}", e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
            clients.retain(|h| !h.is_finished());
        }

        for handle in clients {
            if handle.join().is_err() {
                log::error!("Store client thread panicked");
            }
        }
        log::info!("Store server stopped");
        Ok(())
    }

    /// [`StoreServer::run`] on a named thread
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("store-server".to_string())
            .spawn(move || {
                if let Err(e) = self.run() {
                    log::error!("Store server error: {}", e);
                }
            })?;
        Ok(handle)
    }

    fn spawn_session(&self, stream: TcpStream, addr: SocketAddr) -> Result<JoinHandle<()>> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(CLIENT_POLL))?;
        stream.set_write_timeout(Some(CLIENT_POLL))?;
        stream.set_nodelay(true)?;
        log::info!("Store client connected: {}", addr);

        let mut session = ClientSession {
            stream,
            reader: FrameReader::new(),
            store: Arc::clone(&self.store),
            aggregator: Arc::clone(&self.aggregator),
            shutdown: Arc::clone(&self.shutdown),
        };
        let handle = thread::Builder::new()
            .name(format!("store-client-{}", addr))
            .spawn(move || match session.run() {
                Ok(()) => log::info!("Store client {} disconnected", addr),
                Err(e) => log::warn!("Store client {} dropped: {}", addr, e),
            })?;
        Ok(handle)
    }
}

struct ClientSession {
    stream: TcpStream,
    reader: FrameReader,
    store: Arc<dyn SharedStore>,
    aggregator: Arc<DrillStateAggregator>,
    shutdown: Arc<AtomicBool>,
}

impl ClientSession {
    fn run(&mut self) -> Result<()> {
        while !self.shutdown.load(Ordering::Relaxed) {
            let payload = match self.reader.poll(&mut self.stream) {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(Error::Io(e)) if is_hangup(e.kind()) => return Ok(()),
                Err(e) => return Err(e),
            };

            let request = match serde_json::from_slice::<Request>(&payload) {
                Ok(request) => request,
                Err(e) => {
                    log::debug!("Malformed request: {}", e);
                    self.reply(&Response::Error {
                        message: format!("malformed request: {}", e),
                    })?;
                    continue;
                }
            };

            if let Request::Subscribe { topic } = request {
                return self.stream_topic(&topic);
            }
            let response = self.handle(request);
            self.reply(&response)?;
        }
        Ok(())
    }

    fn handle(&self, request: Request) -> Response {
        let result = match request {
            Request::Get { key } => self.store.get(&key).map(|value| Response::Value { value }),
            Request::Set { key, value } => self.store.set(&key, &value).map(|()| Response::Ok),
            Request::Publish { topic, payload } => {
                self.store.publish(&topic, &payload).map(|_| Response::Ok)
            }
            Request::Snapshot => Ok(Response::State(self.aggregator.snapshot())),
            Request::Subscribe { .. } => Err(Error::Other("already subscribed".to_string())),
        };
        result.unwrap_or_else(|e| Response::Error {
            message: e.to_string(),
        })
    }

    /// Forward every message on `topic` until the client goes away
    fn stream_topic(&mut self, topic: &str) -> Result<()> {
        let subscription = match self.store.subscribe(topic) {
            Ok(sub) => sub,
            Err(e) => {
                return self.reply(&Response::Error {
                    message: e.to_string(),
                });
            }
        };
        self.reply(&Response::Ok)?;
        self.stream.set_read_timeout(Some(HANGUP_POLL))?;
        log::debug!("Client subscribed to '{}'", topic);

        while !self.shutdown.load(Ordering::Relaxed) {
            let Some(msg) = subscription.recv_timeout(CLIENT_POLL)? else {
                // Quiet topic: a write would never fail, so check for a hangup
                match self.reader.poll(&mut self.stream) {
                    Ok(None) => {}
                    Ok(Some(_)) => log::debug!("Ignoring request on '{}' subscription", topic),
                    Err(Error::Io(e)) if is_hangup(e.kind()) => return Ok(()),
                    Err(e) => return Err(e),
                }
                continue;
            };
            let response = Response::Message {
                topic: msg.topic,
                payload: msg.payload,
            };
            match self.reply(&response) {
                Ok(()) => {}
                Err(Error::Io(e)) => {
                    // Includes a write timeout from a client that stopped reading
                    log::debug!("Subscriber on '{}' gone: {}", topic, e);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn reply(&mut self, response: &Response) -> Result<()> {
        write_message(&mut self.stream, response)
    }
}

fn is_hangup(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_json_shape() {
        let json = r#"{"type":"Set","key":"load-cell","value":"{\"load\":3.5}"}"#;
        let request: Request = serde_json::from_str(json).unwrap();
        assert_eq!(
            request,
            Request::Set {
                key: "load-cell".to_string(),
                value: r#"{"load":3.5}"#.to_string(),
            }
        );
        assert_eq!(
            serde_json::from_str::<Request>(r#"{"type":"Snapshot"}"#).unwrap(),
            Request::Snapshot
        );
    }

    #[test]
    fn test_response_json_shape() {
        let value = serde_json::to_value(Response::Value { value: None }).unwrap();
        assert_eq!(value, serde_json::json!({"type": "Value", "value": null}));

        let state = serde_json::to_value(Response::State(DrillState::default())).unwrap();
        assert_eq!(state["type"], "State");
        assert_eq!(state["alive"], false);
    }
}
