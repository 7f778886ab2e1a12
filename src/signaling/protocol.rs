//! JSON-RPC 2.0 signaling protocol types
//!
//! Every message addressed to a remote coordinator carries a `connection_id`
//! correlation token of the form `"{local}-{remote}"` (suffixed `-restart`
//! for ICE-restart offers) so both ends can match descriptions to the
//! connection attempt that produced them.

use crate::config::ConnectionConfig;
use crate::peer::capability::{CandidateInit, HealthState};
use serde::{Deserialize, Serialize};

/// JSON-RPC 2.0 protocol version
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 request envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    /// Protocol version (must be "2.0")
    pub jsonrpc: String,

    /// Method name to invoke
    pub method: String,

    /// Method parameters
    pub params: serde_json::Value,

    /// Request ID for matching with response (absent for notifications)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl JsonRpcRequest {
    /// Parse a request from a JSON string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| crate::Error::Serialization(e.to_string()))
    }

    /// Serialize the request to a JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| crate::Error::Serialization(e.to_string()))
    }
}

/// Parameters for `peer.offer`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfferParams {
    /// Sending peer ID
    pub from: String,
    /// Target peer ID
    pub to: String,
    /// Correlation token for this connection attempt
    pub connection_id: String,
    /// SDP offer
    pub sdp: String,
    /// True when this offer restarts the transport of an existing session
    #[serde(default)]
    pub restart: bool,
}

/// Parameters for `peer.answer`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerParams {
    /// Sending peer ID
    pub from: String,
    /// Target peer ID
    pub to: String,
    /// Correlation token for this connection attempt
    pub connection_id: String,
    /// SDP answer
    pub sdp: String,
}

/// Parameters for `peer.candidate`
///
/// `candidate` is `None` when the sender has finished gathering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateParams {
    /// Sending peer ID
    pub from: String,
    /// Target peer ID
    pub to: String,
    /// Correlation token for this connection attempt
    pub connection_id: String,
    /// Network-path candidate, or `None` to signal end-of-gathering
    pub candidate: Option<CandidateInit>,
}

/// Parameters for `peer.connection_state` (outbound, informational)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionStateParams {
    /// Sending peer ID
    pub from: String,
    /// Target peer ID
    pub to: String,
    /// Correlation token for this connection attempt
    pub connection_id: String,
    /// Observed connection health
    pub state: HealthState,
}

/// Parameters for `peer.connection_failed` (outbound, informational)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionFailedParams {
    /// Sending peer ID
    pub from: String,
    /// Target peer ID
    pub to: String,
    /// Correlation token for this connection attempt
    pub connection_id: String,
    /// Failure reason
    pub reason: String,
}

/// Parameters for `peer.restart_requested` (inbound, from a server-side monitor)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestartRequestedParams {
    /// Peer whose session should be rebuilt
    pub peer_id: String,
    /// Attempt counter maintained by the monitor (0-indexed)
    #[serde(default)]
    pub attempt: u32,
}

/// Parameters for `peer.hard_restart` (inbound)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HardRestartParams {
    /// Peer whose session should be replaced outright
    pub peer_id: String,
    /// Replacement connection configuration for the rebuilt session
    pub connection: ConnectionConfig,
}

/// Signaling messages exchanged between coordinators
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingMessage {
    /// Session description of kind offer
    Offer(OfferParams),
    /// Session description of kind answer
    Answer(AnswerParams),
    /// Network-path candidate (or end-of-gathering marker)
    Candidate(CandidateParams),
    /// Connection health transition, informational
    ConnectionState(ConnectionStateParams),
    /// Connection failure notice, informational
    ConnectionFailed(ConnectionFailedParams),
    /// Server-side monitor asks for a hard restart after a settle delay
    RestartRequested(RestartRequestedParams),
    /// Server instructs an immediate session replacement with new config
    HardRestart(HardRestartParams),
}

impl SignalingMessage {
    /// JSON-RPC method name for this message
    pub fn method(&self) -> &'static str {
        match self {
            SignalingMessage::Offer(_) => "peer.offer",
            SignalingMessage::Answer(_) => "peer.answer",
            SignalingMessage::Candidate(_) => "peer.candidate",
            SignalingMessage::ConnectionState(_) => "peer.connection_state",
            SignalingMessage::ConnectionFailed(_) => "peer.connection_failed",
            SignalingMessage::RestartRequested(_) => "peer.restart_requested",
            SignalingMessage::HardRestart(_) => "peer.hard_restart",
        }
    }

    /// Peer this message is addressed to, when it carries addressing
    pub fn recipient(&self) -> Option<&str> {
        match self {
            SignalingMessage::Offer(p) => Some(&p.to),
            SignalingMessage::Answer(p) => Some(&p.to),
            SignalingMessage::Candidate(p) => Some(&p.to),
            SignalingMessage::ConnectionState(p) => Some(&p.to),
            SignalingMessage::ConnectionFailed(p) => Some(&p.to),
            SignalingMessage::RestartRequested(_) | SignalingMessage::HardRestart(_) => None,
        }
    }

    /// Wrap the message in a JSON-RPC request envelope
    ///
    /// Candidates are notifications (no `id`); everything else gets a
    /// generated request ID.
    pub fn to_request(&self) -> crate::Result<JsonRpcRequest> {
        let params = match self {
            SignalingMessage::Offer(p) => serde_json::to_value(p),
            SignalingMessage::Answer(p) => serde_json::to_value(p),
            SignalingMessage::Candidate(p) => serde_json::to_value(p),
            SignalingMessage::ConnectionState(p) => serde_json::to_value(p),
            SignalingMessage::ConnectionFailed(p) => serde_json::to_value(p),
            SignalingMessage::RestartRequested(p) => serde_json::to_value(p),
            SignalingMessage::HardRestart(p) => serde_json::to_value(p),
        }
        .map_err(|e| crate::Error::Serialization(e.to_string()))?;

        let id = match self {
            SignalingMessage::Candidate(_) => None,
            _ => Some(uuid::Uuid::new_v4().to_string()),
        };

        Ok(JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: self.method().to_string(),
            params,
            id,
        })
    }

    /// Serialize to a JSON-RPC request string
    pub fn to_json(&self) -> crate::Result<String> {
        self.to_request()?.to_json()
    }

    /// Decode a message from a JSON-RPC request envelope
    pub fn from_request(req: &JsonRpcRequest) -> crate::Result<Self> {
        fn params<T: serde::de::DeserializeOwned>(req: &JsonRpcRequest) -> crate::Result<T> {
            serde_json::from_value(req.params.clone()).map_err(|e| {
                crate::Error::Serialization(format!("invalid {} params: {}", req.method, e))
            })
        }

        match req.method.as_str() {
            "peer.offer" => Ok(SignalingMessage::Offer(params(req)?)),
            "peer.answer" => Ok(SignalingMessage::Answer(params(req)?)),
            "peer.candidate" => Ok(SignalingMessage::Candidate(params(req)?)),
            "peer.connection_state" => Ok(SignalingMessage::ConnectionState(params(req)?)),
            "peer.connection_failed" => Ok(SignalingMessage::ConnectionFailed(params(req)?)),
            "peer.restart_requested" => Ok(SignalingMessage::RestartRequested(params(req)?)),
            "peer.hard_restart" => Ok(SignalingMessage::HardRestart(params(req)?)),
            other => Err(crate::Error::Serialization(format!(
                "unknown signaling method: {}",
                other
            ))),
        }
    }

    /// Parse a message from a JSON-RPC request string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Self::from_request(&JsonRpcRequest::from_json(json)?)
    }
}
