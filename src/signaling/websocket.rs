//! WebSocket signaling client
//!
//! Connects to a relay server, pumps outbound messages from an internal
//! queue, and forwards parsed inbound messages to whoever holds the
//! receiver half returned by [`WebSocketSignaling::connect`] — normally a
//! task that feeds them into
//! [`NegotiationCoordinator::on_remote_message`](crate::NegotiationCoordinator::on_remote_message).

use super::channel::SignalingChannel;
use super::protocol::SignalingMessage;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket-backed [`SignalingChannel`]
pub struct WebSocketSignaling {
    url: String,
    tx: mpsc::UnboundedSender<Message>,
}

impl WebSocketSignaling {
    /// Connect to a signaling server
    ///
    /// Returns the channel plus the stream of inbound messages. Both the
    /// sender and receiver background tasks stop when the socket closes;
    /// the inbound receiver then yields `None`.
    ///
    /// # Arguments
    ///
    /// * `url` - WebSocket signaling server URL (ws:// or wss://)
    pub async fn connect(
        url: &str,
    ) -> crate::Result<(Self, mpsc::UnboundedReceiver<SignalingMessage>)> {
        info!("Connecting to signaling server: {}", url);

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| crate::Error::WebSocket(format!("Failed to connect: {}", e)))?;

        info!("Connected to signaling server");

        let (write, read) = ws_stream.split();

        let (tx, rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::sender_task(write, rx));
        tokio::spawn(Self::receiver_task(read, inbound_tx));

        Ok((
            Self {
                url: url.to_string(),
                tx,
            },
            inbound_rx,
        ))
    }

    /// Signaling server URL this channel is connected to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sender task: drains the outbound queue into the WebSocket
    async fn sender_task(
        mut write: futures::stream::SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = write.send(msg).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }

        debug!("Signaling sender task terminated");
    }

    /// Receiver task: parses inbound frames and forwards them
    async fn receiver_task(
        mut read: futures::stream::SplitStream<WsStream>,
        inbound: mpsc::UnboundedSender<SignalingMessage>,
    ) {
        while let Some(result) = read.next().await {
            match result {
                Ok(Message::Text(text)) => match SignalingMessage::from_json(&text) {
                    Ok(msg) => {
                        if inbound.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Discarding unparseable signaling message: {}", e),
                },
                Ok(Message::Close(_)) => {
                    info!("Signaling connection closed by server");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
            }
        }

        debug!("Signaling receiver task terminated");
    }
}

#[async_trait]
impl SignalingChannel for WebSocketSignaling {
    async fn send(&self, message: SignalingMessage) -> crate::Result<()> {
        let json = message.to_json()?;
        debug!("Sending signaling message: {}", message.method());

        self.tx
            .send(Message::Text(json))
            .map_err(|e| crate::Error::Signaling(format!("Failed to queue message: {}", e)))
    }
}
