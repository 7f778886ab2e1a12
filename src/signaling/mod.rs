//! Signaling channel and wire protocol

mod channel;
pub mod protocol;
mod websocket;

pub use channel::SignalingChannel;
pub use protocol::SignalingMessage;
pub use websocket::WebSocketSignaling;
