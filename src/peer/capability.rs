//! The media connection capability seam
//!
//! The coordinator never touches ICE or DTLS directly; it drives an opaque
//! capability that produces and commits session descriptions, applies
//! candidates, and reports its health through an event stream. The
//! production implementation over webrtc-rs lives in [`super::rtc`]; tests
//! substitute scripted fakes.

use crate::config::ConnectionConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::track::track_local::TrackLocal;

/// Kind of a session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptionKind {
    /// Offer side of a description exchange
    Offer,
    /// Answer side of a description exchange
    Answer,
}

/// Negotiated media/transport parameters exchanged as an offer or answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer
    pub kind: DescriptionKind,
    /// Raw SDP
    pub sdp: String,
}

impl SessionDescription {
    /// Build an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: DescriptionKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Build an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: DescriptionKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// One discovered network-path candidate, mirroring RTCIceCandidateInit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateInit {
    /// Candidate attribute line
    pub candidate: String,
    /// Media stream identification tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Index of the media description this candidate belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    /// ICE username fragment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl CandidateInit {
    /// True for the empty candidate some stacks emit at end-of-gathering
    pub fn is_empty(&self) -> bool {
        self.candidate.trim().is_empty()
    }
}

/// Connection health derived from the capability's observable status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Connection not yet started
    New,
    /// Transport negotiation in progress
    Connecting,
    /// Media path established
    Connected,
    /// Transient loss; may recover without intervention
    Degraded,
    /// Transport reported outright failure
    Failed,
    /// Connection closed
    Closed,
}

impl HealthState {
    /// Lowercase wire name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::New => "new",
            HealthState::Connecting => "connecting",
            HealthState::Connected => "connected",
            HealthState::Degraded => "degraded",
            HealthState::Failed => "failed",
            HealthState::Closed => "closed",
        }
    }
}

/// Events a connection capability pushes to its owning session
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The observable connection status changed
    HealthChanged(HealthState),
    /// A locally gathered candidate to trickle to the remote peer
    /// (`None` once gathering completes)
    LocalCandidate(Option<CandidateInit>),
    /// Local media changed in a way that requires renegotiation
    NegotiationNeeded,
}

/// Receiver half of a connection's event stream
pub type ConnectionEvents = mpsc::UnboundedReceiver<ConnectionEvent>;

/// Opaque media-connection capability owned by exactly one peer session
///
/// All methods may suspend; the owning session serializes calls, so
/// implementations never see concurrent negotiation operations for the
/// same connection.
#[async_trait]
pub trait MediaConnection: Send + Sync {
    /// Produce a local description of kind offer
    async fn create_offer(&self, ice_restart: bool) -> crate::Result<SessionDescription>;

    /// Produce an answer to the committed remote offer
    async fn create_answer(&self) -> crate::Result<SessionDescription>;

    /// Commit a description as the local description
    async fn set_local_description(&self, description: SessionDescription) -> crate::Result<()>;

    /// Commit a description as the remote description
    async fn set_remote_description(&self, description: SessionDescription) -> crate::Result<()>;

    /// Apply a remote network-path candidate
    async fn add_candidate(&self, candidate: CandidateInit) -> crate::Result<()>;

    /// Attach a local media track
    async fn add_track(&self, track: Arc<dyn TrackLocal + Send + Sync>) -> crate::Result<()>;

    /// Close the connection and release its resources
    async fn close(&self) -> crate::Result<()>;

    /// Unique identifier of this connection instance
    fn connection_id(&self) -> &str;
}

/// Builds connection capabilities for new peer sessions
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Create a connection for `remote_id` along with its event stream
    async fn create(
        &self,
        remote_id: &str,
        config: &ConnectionConfig,
    ) -> crate::Result<(Arc<dyn MediaConnection>, ConnectionEvents)>;
}
