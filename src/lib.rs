//! WebRTC negotiation coordinator for ConfMesh meetings
//!
//! This crate coordinates real-time media sessions between meeting
//! participants: it decides when to originate an offer, resolves offer
//! collisions deterministically, buffers network-path candidates that
//! arrive early, and recovers failed connections with bounded restarts —
//! all over an unreliable, relayed signaling channel.
//!
//! # Features
//!
//! - **Multi-peer mesh topology**: one negotiation session per remote
//!   participant, sessions progress independently
//! - **Perfect negotiation**: polite/impolite roles derived from the peer
//!   IDs make both ends converge on one description pair without extra
//!   round-trips, even when both offer simultaneously
//! - **Candidate buffering**: candidates that outrun their description are
//!   queued and replayed exactly once
//! - **Supervised recovery**: debounced degraded detection, in-place ICE
//!   restarts, and server-driven hard restarts with backoff
//! - **JSON-RPC 2.0 signaling**: WebSocket-based description and candidate
//!   exchange
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Remote coordinators (one per participant)               │
//! │  ↕ (relayed signaling: offer/answer/candidate)           │
//! │  SignalingChannel (WebSocket, JSON-RPC 2.0)              │
//! │  ↕                                                       │
//! │  NegotiationCoordinator                                  │
//! │  ├─ PeerSession per remote_id (serialized event queue)   │
//! │  │   ├─ CandidateBuffer (early candidates)               │
//! │  │   └─ MediaConnection (opaque capability, webrtc-rs)   │
//! │  └─ ReconnectSupervisor (debounce, restart, backoff)     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use confmesh_webrtc::CoordinatorConfig;
//!
//! let config = CoordinatorConfig {
//!     max_peers: 8,
//!     ..Default::default()
//! };
//!
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Async usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use confmesh_webrtc::{
//!     CoordinatorConfig, NegotiationCoordinator, RtcConnectionFactory, WebSocketSignaling,
//! };
//!
//! # async fn example() -> confmesh_webrtc::Result<()> {
//! let (signaling, inbound) = WebSocketSignaling::connect("ws://localhost:8080").await?;
//!
//! let coordinator = NegotiationCoordinator::new(
//!     CoordinatorConfig::default(),
//!     Arc::new(signaling),
//!     Arc::new(RtcConnectionFactory),
//! )?;
//! coordinator.spawn_inbound(inbound);
//!
//! // The membership layer tells us who to connect to.
//! coordinator.connect_to("peer-abc123", true, None).await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod signaling;

mod coordinator;
mod peer;
mod supervisor;

// Re-exports for public API
pub use config::{ConnectionConfig, CoordinatorConfig, RestartPolicy, TurnServerConfig};
pub use coordinator::NegotiationCoordinator;
pub use error::{Error, Result};
pub use peer::capability::{
    CandidateInit, ConnectionEvent, ConnectionEvents, ConnectionFactory, DescriptionKind,
    HealthState, MediaConnection, SessionDescription,
};
pub use peer::rtc::{RtcConnection, RtcConnectionFactory};
pub use peer::session::{Role, SessionSnapshot, SignalingPhase};
pub use signaling::{SignalingChannel, SignalingMessage, WebSocketSignaling};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
