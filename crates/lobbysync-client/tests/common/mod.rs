//! In-memory connector: every connection attempt hands the test a [`Peer`]
//! standing in for the server end of the link.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use lobbysync_client::{ClientOptions, ClientSocket, Connector, Outgoing, TransportEvent, TransportLink};
use lobbysync_core::error::{Result, SyncError};
use lobbysync_core::protocol::{EntityKind, EntityOp, Payload};

pub const ENDPOINT: &str = "ws://test.invalid/ws/main";

pub struct Peer {
    from_client: mpsc::UnboundedReceiver<Outgoing>,
    to_client: mpsc::UnboundedSender<TransportEvent>,
}

impl Peer {
    /// Next payload the client sent.
    pub async fn recv(&mut self) -> Payload {
        match self.from_client.recv().await {
            Some(Outgoing::Text(text)) => Payload::decode(&text).unwrap(),
            other => panic!("expected a payload, got {other:?}"),
        }
    }

    /// Next raw outgoing message, if one is already queued.
    pub fn try_recv(&mut self) -> Option<Outgoing> {
        self.from_client.try_recv().ok()
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.to_client.send(TransportEvent::Frame(text.to_owned()));
    }

    pub fn send(&self, payload: &Payload) {
        self.send_raw(&payload.encode().unwrap());
    }

    pub fn send_op(&self, app_id: u32, kind: EntityKind, op: EntityOp) {
        self.send(&Payload::new(app_id, kind.tag(), op.to_value().unwrap()));
    }

    pub fn answer(&self, request: &Payload, data: Value) {
        self.send(&request.answer(data));
    }

    pub fn close(&self, reason: Option<&str>) {
        let _ = self
            .to_client
            .send(TransportEvent::Closed(reason.map(str::to_owned)));
    }
}

#[derive(Default)]
pub struct MemoryConnector {
    peers: Mutex<Option<mpsc::UnboundedSender<Peer>>>,
    refuse: AtomicBool,
}

impl MemoryConnector {
    pub fn refuse(&self, on: bool) {
        self.refuse.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _endpoint: &str) -> Result<TransportLink> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SyncError::Transport("connection refused".into()));
        }
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let peer = Peer {
            from_client: out_rx,
            to_client: in_tx,
        };
        if let Some(peers) = self.peers.lock().unwrap().as_ref() {
            let _ = peers.send(peer);
        }
        Ok(TransportLink {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}

/// Socket over a fresh in-memory connector, plus the stream of peers.
pub fn socket() -> (ClientSocket, Arc<MemoryConnector>, mpsc::UnboundedReceiver<Peer>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let connector = Arc::new(MemoryConnector::default());
    *connector.peers.lock().unwrap() = Some(tx);
    let socket = ClientSocket::with_connector(ClientOptions::new(ENDPOINT), connector.clone()).unwrap();
    (socket, connector, rx)
}

/// Let spawned tasks drain their queues (paused clock).
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Record every value an emitter dispatches.
pub fn record<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |v: &T| sink.lock().unwrap().push(v.clone()))
}
