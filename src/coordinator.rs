//! Single entry point for all negotiation-relevant events
//!
//! The coordinator owns the map of peer sessions, routes inbound signaling
//! to the addressed session's queue, and drives session creation and
//! teardown as peers join, leave, or get restarted. Events for one remote
//! peer are processed strictly in arrival order (each session consumes its
//! own queue); sessions for different peers run concurrently.

use crate::config::{ConnectionConfig, CoordinatorConfig};
use crate::peer::capability::{ConnectionEvent, ConnectionFactory, SessionDescription};
use crate::peer::session::{PeerSession, SessionEvent, SessionSnapshot};
use crate::signaling::{SignalingChannel, SignalingMessage};
use crate::supervisor::{ReconnectSupervisor, SupervisorEvent};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::track::track_local::TrackLocal;

/// Running session plus the tasks that serve it
struct PeerHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
    task: JoinHandle<()>,
    pump: JoinHandle<()>,
}

/// Owns and routes to the per-peer negotiation sessions
pub struct NegotiationCoordinator {
    local_id: String,
    config: CoordinatorConfig,
    signaling: Arc<dyn SignalingChannel>,
    factory: Arc<dyn ConnectionFactory>,

    sessions: RwLock<HashMap<String, PeerHandle>>,
    /// Serializes session creation/teardown so replacement never leaves two
    /// live connections for one peer
    structure: Mutex<()>,

    tracks: RwLock<Vec<Arc<dyn TrackLocal + Send + Sync>>>,
    supervisor: mpsc::UnboundedSender<SupervisorEvent>,
}

impl NegotiationCoordinator {
    /// Create a coordinator and start its reconnect supervisor
    ///
    /// # Arguments
    ///
    /// * `config` - Validated coordinator configuration
    /// * `signaling` - Outbound channel to the other coordinators
    /// * `factory` - Builder for connection capabilities
    pub fn new(
        config: CoordinatorConfig,
        signaling: Arc<dyn SignalingChannel>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let local_id = config
            .peer_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let (supervisor_tx, supervisor_rx) = mpsc::unbounded_channel();

        let coordinator = Arc::new(Self {
            local_id,
            config: config.clone(),
            signaling,
            factory,
            sessions: RwLock::new(HashMap::new()),
            structure: Mutex::new(()),
            tracks: RwLock::new(Vec::new()),
            supervisor: supervisor_tx.clone(),
        });

        ReconnectSupervisor::spawn(
            Arc::downgrade(&coordinator),
            &config,
            supervisor_tx,
            supervisor_rx,
        );

        info!("Negotiation coordinator ready: local_id={}", coordinator.local_id);
        Ok(coordinator)
    }

    /// Local participant ID used for role derivation and message addressing
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Register a local media track, attached to every session created from
    /// now on
    pub async fn add_local_track(&self, track: Arc<dyn TrackLocal + Send + Sync>) {
        self.tracks.write().await.push(track);
    }

    /// Connect to a remote participant, replacing any existing session
    ///
    /// # Arguments
    ///
    /// * `remote_id` - Peer to connect to
    /// * `should_originate_offer` - Whether this side starts the exchange
    /// * `config_override` - Replacement connection config (hard restart),
    ///   `None` for the coordinator-wide default
    pub async fn connect_to(
        &self,
        remote_id: &str,
        should_originate_offer: bool,
        config_override: Option<ConnectionConfig>,
    ) -> Result<()> {
        if remote_id == self.local_id {
            return Err(Error::InvalidConfig(format!(
                "cannot connect to self ({})",
                remote_id
            )));
        }

        let _guard = self.structure.lock().await;

        self.teardown(remote_id).await;
        self.spawn_session(remote_id, config_override, should_originate_offer)
            .await?;
        Ok(())
    }

    /// Route one inbound signaling message
    ///
    /// Unknown-peer answers and candidates are evidence of stale or
    /// duplicated delivery and are dropped with a log; an offer from an
    /// unknown peer creates the session.
    pub async fn on_remote_message(&self, message: SignalingMessage) {
        match message {
            SignalingMessage::Offer(p) => {
                let events = match self.ensure_session(&p.from).await {
                    Ok(events) => events,
                    Err(e) => {
                        warn!("Cannot accept offer from {}: {}", p.from, e);
                        return;
                    }
                };
                let _ = events.send(SessionEvent::RemoteOffer {
                    description: SessionDescription::offer(p.sdp),
                    restart: p.restart,
                });
            }
            SignalingMessage::Answer(p) => {
                match self.session_events(&p.from).await {
                    Some(events) => {
                        let _ = events.send(SessionEvent::RemoteAnswer {
                            description: SessionDescription::answer(p.sdp),
                        });
                    }
                    None => warn!("No session for answer from {}, ignoring", p.from),
                }
            }
            SignalingMessage::Candidate(p) => {
                match self.session_events(&p.from).await {
                    Some(events) => {
                        let _ = events.send(SessionEvent::RemoteCandidate {
                            candidate: p.candidate,
                        });
                    }
                    None => warn!("No session for candidate from {}, ignoring", p.from),
                }
            }
            SignalingMessage::RestartRequested(p) => {
                let _ = self.supervisor.send(SupervisorEvent::RetryRequested {
                    remote_id: p.peer_id,
                    attempt: p.attempt,
                });
            }
            SignalingMessage::HardRestart(p) => {
                let _ = self.supervisor.send(SupervisorEvent::HardRestart {
                    remote_id: p.peer_id,
                    config: p.connection,
                });
            }
            SignalingMessage::ConnectionState(p) => {
                debug!("Peer {} reports connection state {:?}", p.from, p.state);
            }
            SignalingMessage::ConnectionFailed(p) => {
                debug!("Peer {} reports connection failure: {}", p.from, p.reason);
            }
        }
    }

    /// Close and remove the session for a departed peer
    pub async fn disconnect(&self, remote_id: &str) -> Result<()> {
        let _guard = self.structure.lock().await;

        if self.teardown(remote_id).await {
            Ok(())
        } else {
            Err(Error::PeerNotFound(remote_id.to_string()))
        }
    }

    /// Ask the session to originate an ICE-restart offer in place
    pub async fn request_restart(&self, remote_id: &str, reason: &str) -> Result<()> {
        match self.session_events(remote_id).await {
            Some(events) => {
                info!("Restarting connection with {} ({})", remote_id, reason);
                let _ = events.send(SessionEvent::Originate { restart: true });
                Ok(())
            }
            None => Err(Error::PeerNotFound(remote_id.to_string())),
        }
    }

    /// Number of live sessions
    pub async fn peer_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Check if a session exists for a peer
    pub async fn has_peer(&self, remote_id: &str) -> bool {
        self.sessions.read().await.contains_key(remote_id)
    }

    /// Snapshot one session's state
    pub async fn session_snapshot(&self, remote_id: &str) -> Option<SessionSnapshot> {
        let events = self.session_events(remote_id).await?;
        let (reply, rx) = oneshot::channel();
        events.send(SessionEvent::Inspect { reply }).ok()?;
        rx.await.ok()
    }

    /// Snapshot every live session
    pub async fn list_sessions(&self) -> Vec<SessionSnapshot> {
        let remote_ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();

        let mut snapshots = Vec::with_capacity(remote_ids.len());
        for remote_id in remote_ids {
            if let Some(snapshot) = self.session_snapshot(&remote_id).await {
                snapshots.push(snapshot);
            }
        }
        snapshots
    }

    /// Close every session
    pub async fn shutdown(&self) {
        let _guard = self.structure.lock().await;

        let remote_ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        for remote_id in remote_ids {
            self.teardown(&remote_id).await;
        }
    }

    /// Feed an inbound message stream into the coordinator
    pub fn spawn_inbound(
        self: &Arc<Self>,
        mut inbound: mpsc::UnboundedReceiver<SignalingMessage>,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                coordinator.on_remote_message(message).await;
            }
            debug!("Inbound signaling stream ended");
        })
    }

    async fn session_events(
        &self,
        remote_id: &str,
    ) -> Option<mpsc::UnboundedSender<SessionEvent>> {
        self.sessions
            .read()
            .await
            .get(remote_id)
            .map(|handle| handle.events.clone())
    }

    /// Get the session's queue, creating the session on first contact
    async fn ensure_session(
        &self,
        remote_id: &str,
    ) -> Result<mpsc::UnboundedSender<SessionEvent>> {
        if remote_id == self.local_id {
            return Err(Error::InvalidConfig(format!(
                "offer addressed from self ({})",
                remote_id
            )));
        }

        let _guard = self.structure.lock().await;

        if let Some(handle) = self.sessions.read().await.get(remote_id) {
            return Ok(handle.events.clone());
        }

        self.spawn_session(remote_id, None, false).await
    }

    /// Build and register a session; callers hold the structure lock
    async fn spawn_session(
        &self,
        remote_id: &str,
        config_override: Option<ConnectionConfig>,
        should_originate_offer: bool,
    ) -> Result<mpsc::UnboundedSender<SessionEvent>> {
        if self.sessions.read().await.len() >= self.config.max_peers as usize {
            return Err(Error::PeerConnection(format!(
                "Maximum peer limit reached ({})",
                self.config.max_peers
            )));
        }

        let connection_config = config_override.unwrap_or_else(|| self.config.connection.clone());
        let (connection, mut connection_events) =
            self.factory.create(remote_id, &connection_config).await?;

        for track in self.tracks.read().await.iter() {
            if let Err(e) = connection.add_track(Arc::clone(track)).await {
                warn!("Failed to attach local track for {}: {}", remote_id, e);
            }
        }

        let (events, events_rx) = mpsc::unbounded_channel();

        let session = PeerSession::new(
            self.local_id.clone(),
            remote_id.to_string(),
            connection,
            Arc::clone(&self.signaling),
            self.supervisor.clone(),
        );
        let task = tokio::spawn(session.run(events_rx));

        // Pump capability events into the same queue so they are serialized
        // with signaling events.
        let pump_events = events.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = connection_events.recv().await {
                let forwarded = match event {
                    ConnectionEvent::HealthChanged(state) => SessionEvent::Health { state },
                    ConnectionEvent::LocalCandidate(candidate) => {
                        SessionEvent::LocalCandidate { candidate }
                    }
                    ConnectionEvent::NegotiationNeeded => SessionEvent::NegotiationNeeded,
                };
                if pump_events.send(forwarded).is_err() {
                    break;
                }
            }
        });

        self.sessions.write().await.insert(
            remote_id.to_string(),
            PeerHandle {
                events: events.clone(),
                task,
                pump,
            },
        );

        info!(
            "Session created for {} (originating: {})",
            remote_id, should_originate_offer
        );

        if should_originate_offer {
            let _ = events.send(SessionEvent::Originate { restart: false });
        }

        Ok(events)
    }

    /// Close and remove a session; returns false when none existed
    async fn teardown(&self, remote_id: &str) -> bool {
        let Some(handle) = self.sessions.write().await.remove(remote_id) else {
            return false;
        };

        let (done, done_rx) = oneshot::channel();
        if handle.events.send(SessionEvent::Close { done }).is_ok() {
            let _ = done_rx.await;
        }
        handle.pump.abort();
        let _ = handle.task.await;

        debug!("Session for {} torn down", remote_id);
        true
    }
}
