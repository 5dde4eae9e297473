//! Pluggable client transport.
//!
//! A [`Connector`] opens one connection and hands back a [`TransportLink`]:
//! a sender for outgoing frames and a receiver of inbound events. The link
//! ends with exactly one [`TransportEvent::Closed`]. The default connector
//! runs tokio-tungstenite behind a pump task; tests plug in channel pairs.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use lobbysync_core::error::{Result, SyncError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Text(String),
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One inbound text frame.
    Frame(String),
    /// Connection gone; the reason, when the peer or the error gave one.
    Closed(Option<String>),
}

/// An open connection.
pub struct TransportLink {
    pub outgoing: mpsc::UnboundedSender<Outgoing>,
    pub incoming: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Resolve once the connection is open.
    async fn connect(&self, endpoint: &str) -> Result<TransportLink>;
}

/// WebSocket connector (tokio-tungstenite, rustls).
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<TransportLink> {
        let (stream, _response) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| SyncError::Transport(format!("connect {endpoint} failed: {e}")))?;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(stream, out_rx, in_tx));

        Ok(TransportLink {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}

async fn pump(
    stream: WsStream,
    mut out_rx: mpsc::UnboundedReceiver<Outgoing>,
    in_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let (mut sink, mut source) = stream.split();

    let reason = loop {
        tokio::select! {
            frame = source.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if in_tx.send(TransportEvent::Frame(text)).is_err() {
                            let _ = sink.send(Message::Close(None)).await;
                            break None;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        tracing::debug!(bytes = data.len(), "binary frame ignored");
                    }
                    // Pings are auto-replied by tungstenite
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        break frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty());
                    }
                    Some(Err(e)) => break Some(e.to_string()),
                    None => break None,
                }
            }

            outgoing = out_rx.recv() => {
                match outgoing {
                    Some(Outgoing::Text(text)) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            break Some(format!("send failed: {e}"));
                        }
                    }
                    Some(Outgoing::Close) | None => {
                        let _ = sink.send(Message::Close(None)).await;
                        let _ = sink.close().await;
                        break None;
                    }
                }
            }
        }
    };

    let _ = in_tx.send(TransportEvent::Closed(reason));
}
