//! Per-peer negotiation state machine
//!
//! One `PeerSession` exists per live remote participant. Every mutation goes
//! through the session's event queue and is processed one event at a time by
//! [`PeerSession::run`], so description commits and candidate application
//! never interleave — the mutual-exclusion invariants hold structurally
//! rather than by locking.

use super::candidates::CandidateBuffer;
use super::capability::{CandidateInit, HealthState, MediaConnection, SessionDescription};
use crate::signaling::protocol::{
    AnswerParams, CandidateParams, ConnectionFailedParams, ConnectionStateParams, OfferParams,
};
use crate::signaling::{SignalingChannel, SignalingMessage};
use crate::supervisor::SupervisorEvent;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Collision-resolution role, fixed for the lifetime of a session
///
/// Exactly one end of every pair is polite: the polite end abandons its own
/// in-flight offer when the two sides collide, the impolite end proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Defers in a collision
    Polite,
    /// Proceeds in a collision
    Impolite,
}

impl Role {
    /// Derive the role from the total order over the two peer IDs
    ///
    /// Both ends compute this independently and always disagree, which is
    /// what makes collision resolution deterministic.
    pub fn derive(local_id: &str, remote_id: &str) -> Role {
        if local_id < remote_id {
            Role::Polite
        } else {
            Role::Impolite
        }
    }
}

/// Description-exchange phase of the underlying negotiation protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingPhase {
    /// No exchange in progress
    Stable,
    /// A local offer is committed and awaiting the remote answer
    HaveLocalOffer,
    /// A remote offer is committed and being answered
    HaveRemoteOffer,
}

/// Events consumed by a session's serialized loop
#[derive(Debug)]
pub(crate) enum SessionEvent {
    /// An offer arrived from the remote peer
    RemoteOffer {
        description: SessionDescription,
        restart: bool,
    },
    /// An answer arrived from the remote peer
    RemoteAnswer { description: SessionDescription },
    /// A candidate arrived from the remote peer (`None` = end-of-gathering)
    RemoteCandidate { candidate: Option<CandidateInit> },
    /// Originate an offer (initial, renegotiation, or ICE restart)
    Originate { restart: bool },
    /// The connection capability asked for renegotiation
    NegotiationNeeded,
    /// The capability gathered a local candidate to trickle out
    LocalCandidate { candidate: Option<CandidateInit> },
    /// The capability's observable health changed
    Health { state: HealthState },
    /// Report current state (used by observability and tests)
    Inspect { reply: oneshot::Sender<SessionSnapshot> },
    /// Tear the session down
    Close { done: oneshot::Sender<()> },
}

/// Point-in-time view of a session's state
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Remote participant this session negotiates with
    pub remote_id: String,
    /// Collision role
    pub role: Role,
    /// Current description-exchange phase
    pub phase: SignalingPhase,
    /// Last observed connection health
    pub health: HealthState,
    /// True while an offer is being originated
    pub making_offer: bool,
    /// True while a remote description commit is in flight
    pub applying_remote: bool,
    /// Candidates waiting for a remote description
    pub buffered_candidates: usize,
    /// Identifier of the owned connection instance
    pub connection_id: String,
}

/// Negotiation state machine for exactly one remote peer
pub(crate) struct PeerSession {
    local_id: String,
    remote_id: String,
    role: Role,
    token: String,

    phase: SignalingPhase,
    making_offer: bool,
    applying_remote: bool,
    remote_description_set: bool,
    health: HealthState,

    pending: CandidateBuffer,
    connection: Arc<dyn MediaConnection>,
    signaling: Arc<dyn SignalingChannel>,
    supervisor: mpsc::UnboundedSender<SupervisorEvent>,
}

impl PeerSession {
    pub(crate) fn new(
        local_id: String,
        remote_id: String,
        connection: Arc<dyn MediaConnection>,
        signaling: Arc<dyn SignalingChannel>,
        supervisor: mpsc::UnboundedSender<SupervisorEvent>,
    ) -> Self {
        let role = Role::derive(&local_id, &remote_id);
        let token = format!("{}-{}", local_id, remote_id);

        debug!(
            "Session {} created with role {:?} (token {})",
            remote_id, role, token
        );

        Self {
            local_id,
            remote_id,
            role,
            token,
            phase: SignalingPhase::Stable,
            making_offer: false,
            applying_remote: false,
            remote_description_set: false,
            health: HealthState::New,
            pending: CandidateBuffer::new(),
            connection,
            signaling,
            supervisor,
        }
    }

    /// Consume events until closed
    pub(crate) async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            if let SessionEvent::Close { done } = event {
                self.close().await;
                let _ = done.send(());
                break;
            }

            self.handle_event(event).await;
        }

        debug!("Session {} loop terminated", self.remote_id);
    }

    pub(crate) async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::RemoteOffer {
                description,
                restart,
            } => self.handle_remote_offer(description, restart).await,
            SessionEvent::RemoteAnswer { description } => {
                self.handle_remote_answer(description).await
            }
            SessionEvent::RemoteCandidate { candidate } => {
                self.handle_remote_candidate(candidate).await
            }
            SessionEvent::Originate { restart } => self.originate_offer(restart).await,
            SessionEvent::NegotiationNeeded => self.handle_negotiation_needed().await,
            SessionEvent::LocalCandidate { candidate } => {
                self.handle_local_candidate(candidate).await
            }
            SessionEvent::Health { state } => self.handle_health(state).await,
            SessionEvent::Inspect { reply } => {
                let _ = reply.send(self.snapshot());
            }
            SessionEvent::Close { done } => {
                // Reached only from direct calls in tests; run() intercepts it.
                self.close().await;
                let _ = done.send(());
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            remote_id: self.remote_id.clone(),
            role: self.role,
            phase: self.phase,
            health: self.health,
            making_offer: self.making_offer,
            applying_remote: self.applying_remote,
            buffered_candidates: self.pending.len(),
            connection_id: self.connection.connection_id().to_string(),
        }
    }

    /// Originate an offer and transmit it
    ///
    /// Failures are logged and the attempt abandoned; retry is the
    /// supervisor's job, not this state machine's.
    async fn originate_offer(&mut self, restart: bool) {
        self.making_offer = true;
        let result = self.try_originate(restart).await;
        self.making_offer = false;

        if let Err(e) = result {
            warn!("Offer origination for {} failed: {}", self.remote_id, e);
        }
    }

    async fn try_originate(&mut self, restart: bool) -> crate::Result<()> {
        let offer = self.connection.create_offer(restart).await?;
        self.connection.set_local_description(offer.clone()).await?;
        self.phase = SignalingPhase::HaveLocalOffer;

        let connection_id = if restart {
            format!("{}-restart", self.token)
        } else {
            self.token.clone()
        };

        self.signaling
            .send(SignalingMessage::Offer(OfferParams {
                from: self.local_id.clone(),
                to: self.remote_id.clone(),
                connection_id,
                sdp: offer.sdp,
                restart,
            }))
            .await?;

        info!(
            "Sent {}offer to {}",
            if restart { "restart " } else { "" },
            self.remote_id
        );
        Ok(())
    }

    /// Perfect-negotiation offer handling
    async fn handle_remote_offer(&mut self, description: SessionDescription, restart: bool) {
        let collision = self.making_offer || self.phase != SignalingPhase::Stable;
        let ignore = collision && self.role == Role::Polite;

        if ignore {
            info!(
                "Ignoring offer from {} due to collision (polite party)",
                self.remote_id
            );
            return;
        }

        if restart {
            info!("Applying restart offer from {}", self.remote_id);
        }

        self.applying_remote = true;
        if let Err(e) = self.connection.set_remote_description(description).await {
            warn!("Failed to commit offer from {}: {}", self.remote_id, e);
            self.applying_remote = false;
            return;
        }
        self.phase = SignalingPhase::HaveRemoteOffer;
        self.remote_description_set = true;
        self.applying_remote = false;

        self.pending.drain(self.connection.as_ref()).await;

        let answer = match self.connection.create_answer().await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Failed to create answer for {}: {}", self.remote_id, e);
                return;
            }
        };

        if let Err(e) = self.connection.set_local_description(answer.clone()).await {
            warn!("Failed to commit answer for {}: {}", self.remote_id, e);
            return;
        }
        self.phase = SignalingPhase::Stable;

        let send = self
            .signaling
            .send(SignalingMessage::Answer(AnswerParams {
                from: self.local_id.clone(),
                to: self.remote_id.clone(),
                connection_id: self.token.clone(),
                sdp: answer.sdp,
            }))
            .await;

        match send {
            Ok(()) => info!("Sent answer to {}", self.remote_id),
            Err(e) => warn!("Failed to send answer to {}: {}", self.remote_id, e),
        }
    }

    async fn handle_remote_answer(&mut self, description: SessionDescription) {
        if self.phase != SignalingPhase::HaveLocalOffer {
            warn!(
                "Discarding stale answer from {} in phase {:?}",
                self.remote_id, self.phase
            );
            return;
        }

        self.applying_remote = true;
        match self.connection.set_remote_description(description).await {
            Ok(()) => {
                self.phase = SignalingPhase::Stable;
                self.remote_description_set = true;
                self.applying_remote = false;
                debug!("Answer from {} applied", self.remote_id);
                self.pending.drain(self.connection.as_ref()).await;
            }
            Err(e) => {
                warn!("Failed to commit answer from {}: {}", self.remote_id, e);
                self.applying_remote = false;
            }
        }
    }

    async fn handle_remote_candidate(&mut self, candidate: Option<CandidateInit>) {
        let Some(candidate) = candidate else {
            debug!("End of candidates from {}", self.remote_id);
            return;
        };

        if candidate.is_empty() {
            debug!("Discarding empty candidate from {}", self.remote_id);
            return;
        }

        if self.remote_description_set && !self.applying_remote {
            if let Err(e) = self.connection.add_candidate(candidate).await {
                warn!("Dropping candidate from {}: {}", self.remote_id, e);
            }
        } else {
            self.pending.push(candidate);
        }
    }

    async fn handle_negotiation_needed(&mut self) {
        if self.making_offer || self.phase != SignalingPhase::Stable {
            debug!(
                "Skipping negotiation-needed for {}: exchange already in progress",
                self.remote_id
            );
            return;
        }

        self.originate_offer(false).await;
    }

    async fn handle_local_candidate(&mut self, candidate: Option<CandidateInit>) {
        if candidate.is_none() {
            debug!("ICE gathering complete for {}", self.remote_id);
        }

        let send = self
            .signaling
            .send(SignalingMessage::Candidate(CandidateParams {
                from: self.local_id.clone(),
                to: self.remote_id.clone(),
                connection_id: self.token.clone(),
                candidate,
            }))
            .await;

        if let Err(e) = send {
            warn!("Failed to send candidate to {}: {}", self.remote_id, e);
        }
    }

    async fn handle_health(&mut self, state: HealthState) {
        if state == self.health {
            return;
        }

        debug!(
            "Session {} health: {:?} -> {:?}",
            self.remote_id, self.health, state
        );
        self.health = state;

        let notify = self
            .signaling
            .send(SignalingMessage::ConnectionState(ConnectionStateParams {
                from: self.local_id.clone(),
                to: self.remote_id.clone(),
                connection_id: self.token.clone(),
                state,
            }))
            .await;
        if let Err(e) = notify {
            debug!("Failed to send state notice for {}: {}", self.remote_id, e);
        }

        if state == HealthState::Failed {
            let notice = self
                .signaling
                .send(SignalingMessage::ConnectionFailed(ConnectionFailedParams {
                    from: self.local_id.clone(),
                    to: self.remote_id.clone(),
                    connection_id: self.token.clone(),
                    reason: "transport-failed".to_string(),
                }))
                .await;
            if let Err(e) = notice {
                debug!("Failed to send failure notice for {}: {}", self.remote_id, e);
            }
        }

        // Catch any candidate that raced the connected transition.
        if state == HealthState::Connected && self.remote_description_set {
            self.pending.drain(self.connection.as_ref()).await;
        }

        let _ = self.supervisor.send(SupervisorEvent::Health {
            remote_id: self.remote_id.clone(),
            state,
        });
    }

    async fn close(&mut self) {
        info!("Closing session {}", self.remote_id);

        self.pending.clear();
        if let Err(e) = self.connection.close().await {
            warn!("Error closing connection for {}: {}", self.remote_id, e);
        }

        let _ = self.supervisor.send(SupervisorEvent::Health {
            remote_id: self.remote_id.clone(),
            state: HealthState::Closed,
        });
    }
}
