//! The seam between the wire codec in this crate and an actual
//! transport. [`BrokerSocket`] is deliberately narrow — send raw bytes,
//! receive raw bytes, close — so the Session Orchestrator (in
//! `tickgate-data`) can drive it without knowing whether it's talking to
//! a real upstream or [`MockBrokerSocket`].

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::error::IntegrationError;

/// One inbound event off the socket.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    Binary(Vec<u8>),
    Text(String),
    Closed { code: u16, reason: String },
}

/// A duplex broker connection: binary frames in, text control messages
/// out, and a lifecycle the caller can close. Implementors own whatever
/// background task pumps bytes; `recv` just drains the channel it feeds.
#[async_trait]
pub trait BrokerSocket: Send {
    async fn send_text(&mut self, message: String) -> Result<(), IntegrationError>;
    async fn recv(&mut self) -> Option<SocketEvent>;

    /// Non-blocking drain of whatever is already buffered, so a caller
    /// that just woke up on `recv` can pull any further already-ready
    /// events without another await round-trip (§4.2's burst coalescing).
    /// Returns `None` once nothing more is immediately available.
    fn try_recv(&mut self) -> Option<SocketEvent>;

    async fn close(&mut self);
}

/// Real upstream connection over `tokio-tungstenite`.
///
/// The socket's read and write halves are pumped by a single background
/// task (`tokio_tungstenite::WebSocketStream` is one `Sink + Stream`, not
/// independently splittable into owned halves without `split()`, and
/// `split()` still shares the same underlying I/O so a `select!` loop is
/// the simplest way to multiplex them). `send_text` hands a message to
/// that task over an internal channel rather than writing directly, so
/// the inbound read loop this task also drives is never blocked on a
/// caller being slow to drain `recv`.
#[derive(Debug)]
pub struct WsBrokerSocket {
    outbound: mpsc::Sender<String>,
    inbound: mpsc::Receiver<SocketEvent>,
    pump: tokio::task::JoinHandle<()>,
}

impl WsBrokerSocket {
    pub async fn connect(url: &str) -> Result<Self, IntegrationError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| IntegrationError::Transport(e.to_string()))?;

        let (mut sink, mut source) = stream.split();
        let (inbound_tx, inbound_rx) = mpsc::channel(1024);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(64);

        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    incoming = source.next() => {
                        match incoming {
                            Some(Ok(WsMessage::Binary(bytes))) => {
                                if inbound_tx.send(SocketEvent::Binary(bytes.into())).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(WsMessage::Text(text))) => {
                                if inbound_tx.send(SocketEvent::Text(text.into())).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(WsMessage::Close(frame))) => {
                                let (code, reason) = frame
                                    .map(|f| (f.code.into(), f.reason.to_string()))
                                    .unwrap_or((1000, String::new()));
                                let _ = inbound_tx.send(SocketEvent::Closed { code, reason }).await;
                                break;
                            }
                            Some(Ok(_)) => continue,
                            Some(Err(_)) | None => {
                                let _ = inbound_tx
                                    .send(SocketEvent::Closed {
                                        code: 1006,
                                        reason: "transport error".into(),
                                    })
                                    .await;
                                break;
                            }
                        }
                    }
                    outgoing = outbound_rx.recv() => {
                        match outgoing {
                            Some(text) => {
                                if sink.send(WsMessage::Text(text.into())).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        Ok(Self {
            outbound: outbound_tx,
            inbound: inbound_rx,
            pump,
        })
    }
}

#[async_trait]
impl BrokerSocket for WsBrokerSocket {
    async fn send_text(&mut self, message: String) -> Result<(), IntegrationError> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| IntegrationError::Transport("socket pump task has exited".into()))
    }

    async fn recv(&mut self) -> Option<SocketEvent> {
        self.inbound.recv().await
    }

    fn try_recv(&mut self) -> Option<SocketEvent> {
        self.inbound.try_recv().ok()
    }

    async fn close(&mut self) {
        self.pump.abort();
    }
}

/// In-memory double used by Session Orchestrator tests: a pair of
/// channels standing in for the wire, with no real network involved.
#[derive(Debug)]
pub struct MockBrokerSocket {
    sent: mpsc::UnboundedSender<String>,
    inbound: mpsc::Receiver<SocketEvent>,
}

/// The test-side handle paired with a [`MockBrokerSocket`]: push events
/// in, inspect what was sent out.
#[derive(Debug)]
pub struct MockBrokerSocketHandle {
    pub sent: mpsc::UnboundedReceiver<String>,
    inbound_tx: mpsc::Sender<SocketEvent>,
}

impl MockBrokerSocketHandle {
    pub async fn push(&self, event: SocketEvent) {
        let _ = self.inbound_tx.send(event).await;
    }
}

impl MockBrokerSocket {
    pub fn pair() -> (Self, MockBrokerSocketHandle) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        (
            Self {
                sent: sent_tx,
                inbound: inbound_rx,
            },
            MockBrokerSocketHandle {
                sent: sent_rx,
                inbound_tx,
            },
        )
    }
}

#[async_trait]
impl BrokerSocket for MockBrokerSocket {
    async fn send_text(&mut self, message: String) -> Result<(), IntegrationError> {
        self.sent
            .send(message)
            .map_err(|_| IntegrationError::Transport("mock handle dropped".into()))
    }

    async fn recv(&mut self) -> Option<SocketEvent> {
        self.inbound.recv().await
    }

    fn try_recv(&mut self) -> Option<SocketEvent> {
        self.inbound.try_recv().ok()
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_socket_round_trips_a_control_message_and_an_event() {
        let (mut socket, handle) = MockBrokerSocket::pair();

        socket.send_text(r#"{"a":"subscribe","v":[1]}"#.to_string()).await.unwrap();
        let mut sent = handle.sent;
        assert_eq!(sent.recv().await.unwrap(), r#"{"a":"subscribe","v":[1]}"#);

        handle
            .inbound_tx
            .send(SocketEvent::Text("{}".to_string()))
            .await
            .unwrap();
        match socket.recv().await {
            Some(SocketEvent::Text(text)) => assert_eq!(text, "{}"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
