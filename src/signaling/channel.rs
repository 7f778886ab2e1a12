//! Outbound signaling seam

use super::protocol::SignalingMessage;
use async_trait::async_trait;

/// Ordered, addressable message transport to the other participants'
/// coordinators, typically relayed through a signaling server.
///
/// Delivery is assumed FIFO per destination and at-least-once; the
/// negotiation state machine tolerates duplicates and races by design, so
/// implementations only need to hand the message to the transport. Send
/// failures are surfaced as errors and logged by callers; there is no
/// automatic resend.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Send one signaling message; addressing is carried in the message params.
    async fn send(&self, message: SignalingMessage) -> crate::Result<()>;
}
