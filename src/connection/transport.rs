use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::error::LiveError;

/// Event surfaced by an open transport link.
#[derive(Debug)]
pub enum TransportEvent {
    /// A text frame arrived from the remote service
    Message(String),
    /// The link closed. `clean` is true for a normal close handshake.
    Closed { clean: bool, reason: String },
}

/// An established duplex link to the remote service.
///
/// Payloads written to `outbound` are framed and sent; inbound frames and
/// the final close notification arrive on `inbound`. Dropping `outbound`
/// closes the link from our side.
pub struct TransportLink {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<TransportEvent>,
}

/// Dialer for the realtime service.
///
/// The production implementation speaks WebSocket; tests substitute an
/// in-memory channel pair.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a duplex link to `url`.
    async fn open(&self, url: &str) -> Result<TransportLink, LiveError>;

    /// Transport name for logging
    fn name(&self) -> &str;
}

/// WebSocket transport over `tokio-tungstenite`.
///
/// `open` splits the socket into sink/stream halves, each pumped by its
/// own task so sends never block receives.
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str) -> Result<TransportLink, LiveError> {
        let (socket, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| LiveError::Transport(format!("connect to {} failed: {}", url, e)))?;

        debug!("websocket open: {}", url);

        let (mut sink, mut stream) = socket.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(64); // TODO: make queue depths configurable
        let (in_tx, in_rx) = mpsc::channel::<TransportEvent>(256);

        // Writer pump: drains the outbound queue into the socket. Ends when
        // the sender side is dropped, which closes the socket from our side.
        tokio::spawn(async move {
            while let Some(payload) = out_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(payload)).await {
                    warn!("websocket send failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Reader pump: forwards inbound text frames and reports the close.
        tokio::spawn(async move {
            let mut exit: Option<TransportEvent> = None;

            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(TransportEvent::Message(text)).await.is_err() {
                            // Receiver gone; nobody cares about the close either.
                            return;
                        }
                    }
                    Ok(Message::Close(close_frame)) => {
                        let (clean, reason) = match close_frame {
                            Some(cf) => (
                                cf.code == CloseCode::Normal,
                                format!("close code {:?}: {}", cf.code, cf.reason),
                            ),
                            None => (false, "close without frame".to_string()),
                        };
                        exit = Some(TransportEvent::Closed { clean, reason });
                        break;
                    }
                    // Pings and pongs are answered by tungstenite itself;
                    // binary frames are not part of this protocol.
                    Ok(_) => {}
                    Err(e) => {
                        exit = Some(TransportEvent::Closed {
                            clean: false,
                            reason: e.to_string(),
                        });
                        break;
                    }
                }
            }

            let exit = exit.unwrap_or(TransportEvent::Closed {
                clean: false,
                reason: "connection reset".to_string(),
            });
            let _ = in_tx.send(exit).await;
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }

    fn name(&self) -> &str {
        "websocket"
    }
}
