//! Error types for the negotiation coordinator

/// Result type alias using the coordinator Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while coordinating peer negotiation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Signaling channel error
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// No live session for the addressed peer
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// SDP creation or commit failed
    #[error("SDP negotiation error: {0}")]
    Sdp(String),

    /// ICE candidate could not be parsed or applied
    #[error("ICE candidate error: {0}")]
    IceCandidate(String),

    /// Peer connection capability error
    #[error("Peer connection error: {0}")]
    PeerConnection(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrack(String),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Signaling(_) | Error::WebSocket(_) | Error::Io(_)
        )
    }

    /// Check if this error relates to a single peer rather than the coordinator
    pub fn is_peer_error(&self) -> bool {
        matches!(
            self,
            Error::PeerNotFound(_)
                | Error::PeerConnection(_)
                | Error::IceCandidate(_)
                | Error::Sdp(_)
        )
    }
}
