//! Client transport state machine.
//!
//! `Disconnected -> Connecting -> Connected`, back to `Disconnected` on any
//! close. After a transient close a reconnection is scheduled; an explicit
//! [`ClientSocket::disconnect`] (or a close frame from the server) forbids
//! it until the next successful [`ClientSocket::connect`].
//!
//! Every connection attempt gets a generation number. Events from a link
//! whose generation is no longer current are ignored, so a late close from
//! a replaced link never tears down its successor.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use lobbysync_core::emitter::Emitter;
use lobbysync_core::error::{Result, SyncError};
use lobbysync_core::guard::lock;
use lobbysync_core::protocol::payload::KEEPALIVE_MARKER;
use lobbysync_core::protocol::{Frame, Payload};
use lobbysync_core::PendingRequests;

use crate::options::{check_log_level, ClientOptions};
use crate::transport::{Connector, Outgoing, TransportEvent, WsConnector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

struct LinkState {
    status: ConnectionStatus,
    generation: u64,
    outgoing: Option<mpsc::UnboundedSender<Outgoing>>,
    allow_reconnect: bool,
    reconnect: Option<JoinHandle<()>>,
    close_reason: Option<String>,
}

struct Inner {
    options: ClientOptions,
    connector: Arc<dyn Connector>,
    log_level: AtomicU8,
    state: Mutex<LinkState>,
    pending: PendingRequests<Value>,
    on_connection_updated: Emitter<bool>,
    on_payload: Emitter<Payload>,
}

#[derive(Clone)]
pub struct ClientSocket {
    inner: Arc<Inner>,
}

impl ClientSocket {
    /// Socket over the WebSocket connector.
    pub fn new(options: ClientOptions) -> Result<Self> {
        Self::with_connector(options, Arc::new(WsConnector))
    }

    pub fn with_connector(options: ClientOptions, connector: Arc<dyn Connector>) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                log_level: AtomicU8::new(options.log_level),
                options,
                connector,
                state: Mutex::new(LinkState {
                    status: ConnectionStatus::Disconnected,
                    generation: 0,
                    outgoing: None,
                    allow_reconnect: false,
                    reconnect: None,
                    close_reason: None,
                }),
                pending: PendingRequests::new(),
                on_connection_updated: Emitter::new(),
                on_payload: Emitter::new(),
            }),
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    pub fn log_level(&self) -> u8 {
        self.inner.log_level.load(Ordering::Relaxed)
    }

    pub fn set_log_level(&self, level: u8) -> Result<()> {
        check_log_level(level)?;
        self.inner.log_level.store(level, Ordering::Relaxed);
        Ok(())
    }

    pub fn status(&self) -> ConnectionStatus {
        lock(&self.inner.state).status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Reason carried by the last close frame the server sent, if any.
    pub fn close_reason(&self) -> Option<String> {
        lock(&self.inner.state).close_reason.clone()
    }

    /// Fires `true` on open and `false` when a live connection goes away.
    pub fn on_connection_updated(&self) -> &Emitter<bool> {
        &self.inner.on_connection_updated
    }

    /// Inbound payloads that are not answers to a pending request.
    pub fn on_payload(&self) -> &Emitter<Payload> {
        &self.inner.on_payload
    }

    /// Number of correlated requests still waiting for an answer.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    // ---- lifecycle

    pub async fn connect(&self) -> Result<()> {
        let generation = {
            let mut st = lock(&self.inner.state);
            match st.status {
                ConnectionStatus::Connected => return Err(SyncError::AlreadyConnected),
                ConnectionStatus::Connecting => {
                    return Err(SyncError::InvalidState("connection attempt in progress"))
                }
                ConnectionStatus::Disconnected => {}
            }
            if let Some(task) = st.reconnect.take() {
                task.abort();
            }
            st.status = ConnectionStatus::Connecting;
            st.generation += 1;
            st.generation
        };

        let endpoint = &self.inner.options.endpoint;
        let link = match self.inner.connector.connect(endpoint).await {
            Ok(link) => link,
            Err(e) => {
                {
                    let mut st = lock(&self.inner.state);
                    if st.generation == generation {
                        st.status = ConnectionStatus::Disconnected;
                    }
                }
                if self.log_level() >= 1 {
                    tracing::warn!(%endpoint, error = %e, "connect failed");
                }
                self.schedule_reconnect();
                return Err(e);
            }
        };

        {
            let mut st = lock(&self.inner.state);
            if st.generation != generation {
                // disconnect() ran while the link was opening
                let _ = link.outgoing.send(Outgoing::Close);
                return Err(SyncError::NotConnected);
            }
            st.status = ConnectionStatus::Connected;
            st.outgoing = Some(link.outgoing);
            st.allow_reconnect = true;
            st.close_reason = None;
        }

        tokio::spawn(read_loop(
            Arc::downgrade(&self.inner),
            generation,
            link.incoming,
        ));

        if self.log_level() >= 1 {
            tracing::info!(%endpoint, "connected");
        }
        self.inner.on_connection_updated.dispatch(&true);
        Ok(())
    }

    /// Close for good: no reconnection until the next [`connect`](Self::connect).
    pub fn disconnect(&self) {
        let (was_connected, outgoing) = {
            let mut st = lock(&self.inner.state);
            st.allow_reconnect = false;
            if let Some(task) = st.reconnect.take() {
                task.abort();
            }
            st.generation += 1;
            let was_connected = st.status == ConnectionStatus::Connected;
            st.status = ConnectionStatus::Disconnected;
            (was_connected, st.outgoing.take())
        };
        if let Some(tx) = outgoing {
            let _ = tx.send(Outgoing::Close);
        }
        if was_connected {
            if self.log_level() >= 1 {
                tracing::info!(endpoint = %self.inner.options.endpoint, "disconnected");
            }
            self.inner.on_connection_updated.dispatch(&false);
        }
    }

    fn schedule_reconnect(&self) {
        let delay = self.inner.options.reconnect_delay;
        let mut st = lock(&self.inner.state);
        if !st.allow_reconnect || delay.is_zero() || st.reconnect.is_some() {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        st.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let socket = ClientSocket { inner };
            {
                let mut st = lock(&socket.inner.state);
                st.reconnect = None;
                if !st.allow_reconnect {
                    return;
                }
            }
            if let Err(e) = socket.connect().await {
                tracing::debug!(error = %e, "reconnection attempt failed");
            }
        }));
    }

    fn on_event(&self, generation: u64, event: TransportEvent) {
        match event {
            TransportEvent::Frame(text) => {
                if lock(&self.inner.state).generation != generation {
                    return;
                }
                self.handle_frame(&text)
            }
            TransportEvent::Closed(reason) => {
                let was_connected = {
                    let mut st = lock(&self.inner.state);
                    if st.generation != generation {
                        return;
                    }
                    st.outgoing = None;
                    let was_connected = st.status == ConnectionStatus::Connected;
                    st.status = ConnectionStatus::Disconnected;
                    was_connected
                };
                if self.log_level() >= 1 {
                    tracing::info!(reason = reason.as_deref().unwrap_or(""), "connection closed");
                }
                if was_connected {
                    self.inner.on_connection_updated.dispatch(&false);
                }
                self.schedule_reconnect();
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        let level = self.log_level();
        if text.starts_with(KEEPALIVE_MARKER) {
            if level >= 2 {
                tracing::trace!(frame = %text, "keepalive");
            }
            return;
        }
        if level >= 2 {
            tracing::trace!(frame = %text, "<-");
        }
        match Frame::decode(text) {
            Ok(Frame::Payload(payload)) => {
                if level == 1 {
                    tracing::debug!(app_id = payload.app_id, r#type = %payload.msg_type, "payload");
                }
                // the server only ever answers; a correlated payload is never a push
                if let Some(id) = payload.correlation_id.as_deref() {
                    if !self.inner.pending.resolve(id, payload.data.clone()) && level >= 1 {
                        tracing::debug!(%id, r#type = %payload.msg_type, "answer without a pending request dropped");
                    }
                    return;
                }
                self.inner.on_payload.dispatch(&payload);
            }
            Ok(Frame::Close { reason }) => {
                if level >= 1 {
                    tracing::info!(reason = reason.as_deref().unwrap_or(""), "closed by server");
                }
                lock(&self.inner.state).close_reason = reason;
                self.disconnect();
            }
            Ok(Frame::Keepalive(_)) => {}
            Err(e) => {
                if level >= 1 {
                    tracing::warn!(error = %e, "invalid frame dropped");
                }
            }
        }
    }

    // ---- payloads

    fn send_text(&self, text: String) -> bool {
        let st = lock(&self.inner.state);
        match (&st.outgoing, st.status) {
            (Some(tx), ConnectionStatus::Connected) => tx.send(Outgoing::Text(text)).is_ok(),
            _ => false,
        }
    }

    /// Fire-and-forget. Returns false (and sends nothing) when not connected.
    pub fn send_payload(&self, app_id: u32, msg_type: &str, data: Value) -> bool {
        let text = match Payload::new(app_id, msg_type, data).encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "payload not encodable");
                return false;
            }
        };
        let level = self.log_level();
        if level >= 1 {
            tracing::debug!(app_id, r#type = %msg_type, "send payload");
        }
        if level >= 2 {
            tracing::trace!(frame = %text, "->");
        }
        self.send_text(text)
    }

    /// Send with a fresh correlation id and wait for the answer's data.
    /// Fails with `Timeout` when no answer arrives in time; the pending
    /// entry is gone in every outcome.
    pub async fn send_payload_with_return(
        &self,
        app_id: u32,
        msg_type: &str,
        data: Value,
    ) -> Result<Value> {
        let pending = &self.inner.pending;
        let request = pending.register();
        let payload = Payload::new(app_id, msg_type, data).with_correlation(request.id());
        let text = match payload.encode() {
            Ok(text) => text,
            Err(e) => {
                request.abandon(pending);
                return Err(e);
            }
        };
        let level = self.log_level();
        if level >= 1 {
            tracing::debug!(app_id, r#type = %msg_type, id = %request.id(), waiting = pending.len(), "send payload with return");
        }
        if level >= 2 {
            tracing::trace!(frame = %text, "->");
        }
        if !self.send_text(text) {
            request.abandon(pending);
            return Err(SyncError::NotConnected);
        }

        let answer = request.wait(pending, self.inner.options.request_timeout).await;
        if let Err(e) = &answer {
            if level >= 1 {
                tracing::warn!(app_id, r#type = %msg_type, error = %e, "request failed");
            }
        }
        answer
    }
}

async fn read_loop(
    inner: Weak<Inner>,
    generation: u64,
    mut incoming: mpsc::UnboundedReceiver<TransportEvent>,
) {
    loop {
        // a link dropped without a close event counts as closed
        let event = incoming
            .recv()
            .await
            .unwrap_or(TransportEvent::Closed(None));
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let closed = matches!(event, TransportEvent::Closed(_));
        ClientSocket { inner }.on_event(generation, event);
        if closed {
            return;
        }
    }
}
