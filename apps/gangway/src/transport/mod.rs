use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};
use url::Url;

use crate::protocol::ClientFrame;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket connect failed: {0}")]
    Connect(String),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Lifecycle events surfaced by the socket, in the order the connection
/// delivered them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One inbound message payload, exactly as received.
    Frame(String),
    /// The connection ended; carries the close code when the peer sent one.
    Closed(Option<u16>),
    /// A connection-level error. The matching `Closed` event follows.
    Error(String),
}

/// The client side of one terminal websocket. Owning this handle is owning
/// the connection: dropping it tears both I/O pumps down, so at most one
/// handle can keep a connection alive.
pub struct TerminalSocket {
    outbound: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl TerminalSocket {
    /// Open the websocket and start its read/write pumps. A successful
    /// return is the "open" signal; everything afterwards arrives on the
    /// returned event receiver, in delivery order.
    pub async fn connect(
        url: &Url,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), TransportError> {
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        debug!(target: "gangway::transport", url = %url, "websocket connected");

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<TransportEvent>();

        let writer = tokio::spawn(async move {
            while let Some(payload) = outbound_rx.recv().await {
                if sink.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
        });

        let reader = tokio::spawn(async move {
            loop {
                match source.next().await {
                    Some(Ok(Message::Text(text))) => {
                        trace!(target: "gangway::transport", bytes = text.len(), "frame received");
                        if event_tx.send(TransportEvent::Frame(text)).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        if event_tx.send(TransportEvent::Frame(text)).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.map(|frame| u16::from(frame.code));
                        let _ = event_tx.send(TransportEvent::Closed(code));
                        break;
                    }
                    // Ping/Pong are answered by tungstenite itself.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        let _ = event_tx.send(TransportEvent::Error(err.to_string()));
                        let _ = event_tx.send(TransportEvent::Closed(None));
                        break;
                    }
                    None => {
                        let _ = event_tx.send(TransportEvent::Closed(None));
                        break;
                    }
                }
            }
        });

        Ok((
            Self {
                outbound: outbound_tx,
                reader,
                writer,
            },
            event_rx,
        ))
    }

    /// Serialize and queue one frame. If the writer already ended the frame
    /// is dropped; a dead socket swallowing input is the contract, not an
    /// error.
    pub fn send(&self, frame: &ClientFrame) -> Result<(), TransportError> {
        let payload = serde_json::to_string(frame)?;
        if self.outbound.send(payload).is_err() {
            debug!(target: "gangway::transport", "dropping frame, writer already stopped");
        }
        Ok(())
    }

    /// Tear the connection down. Dropping the handle does the same; the
    /// method exists so call sites read as a close, not a leak.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for TerminalSocket {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}
