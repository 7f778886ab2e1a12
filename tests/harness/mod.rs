//! Shared test harness: scripted connection capabilities and an in-process
//! signaling hub wiring coordinators together the way a relay server would.

#![allow(dead_code)]

use async_trait::async_trait;
use confmesh_webrtc::{
    CandidateInit, ConnectionConfig, ConnectionEvent, ConnectionFactory, CoordinatorConfig,
    HealthState, MediaConnection, NegotiationCoordinator, Result, SessionDescription,
    SignalingChannel, SignalingMessage,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use webrtc::track::track_local::TrackLocal;

/// Install a test subscriber once; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll an async condition until it holds or the timeout expires
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Coordinator config with test-friendly timings
pub fn fast_config(peer_id: &str) -> CoordinatorConfig {
    let mut config = CoordinatorConfig {
        peer_id: Some(peer_id.to_string()),
        degraded_debounce_ms: 80,
        retry_settle_ms: 20,
        ..Default::default()
    };
    config.restart.backoff_initial_ms = 10;
    config.restart.backoff_max_ms = 40;
    config
}

/// Build a coordinator wired to the hub with fast timings
pub fn coordinator(
    peer_id: &str,
    hub: &Arc<MemoryHub>,
    factory: &Arc<FakeFactory>,
) -> Arc<NegotiationCoordinator> {
    let factory: Arc<dyn ConnectionFactory> = factory.clone();
    NegotiationCoordinator::new(fast_config(peer_id), hub.channel(), factory)
        .expect("coordinator config is valid")
}

/// Scripted connection capability
///
/// Records every operation and exposes an `emit` hook so tests can drive the
/// health/candidate observables. Candidates containing `"malformed"` fail to
/// apply.
pub struct FakeConnection {
    id: String,
    owner: String,
    remote_id: String,
    events: StdMutex<Option<mpsc::UnboundedSender<ConnectionEvent>>>,

    pub offers: StdMutex<Vec<bool>>,
    pub local_descriptions: StdMutex<Vec<SessionDescription>>,
    pub remote_descriptions: StdMutex<Vec<SessionDescription>>,
    pub applied_candidates: StdMutex<Vec<String>>,
    pub closed: AtomicBool,
}

impl FakeConnection {
    /// Push a capability event into the owning session
    pub fn emit(&self, event: ConnectionEvent) {
        if let Some(tx) = self.events.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// Push a health transition
    pub fn emit_health(&self, state: HealthState) {
        self.emit(ConnectionEvent::HealthChanged(state));
    }

    /// Number of originated offers carrying the ICE-restart flag
    pub fn restart_offer_count(&self) -> usize {
        self.offers.lock().unwrap().iter().filter(|r| **r).count()
    }

    /// Number of originated offers
    pub fn offer_count(&self) -> usize {
        self.offers.lock().unwrap().len()
    }

    /// Candidates applied so far
    pub fn applied(&self) -> Vec<String> {
        self.applied_candidates.lock().unwrap().clone()
    }

    /// Remote descriptions committed so far
    pub fn remote_descriptions(&self) -> Vec<SessionDescription> {
        self.remote_descriptions.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaConnection for FakeConnection {
    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription> {
        self.offers.lock().unwrap().push(ice_restart);
        Ok(SessionDescription::offer(format!("offer-by-{}", self.owner)))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::answer(format!(
            "answer-by-{}",
            self.owner
        )))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.local_descriptions.lock().unwrap().push(description);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.remote_descriptions.lock().unwrap().push(description);
        Ok(())
    }

    async fn add_candidate(&self, candidate: CandidateInit) -> Result<()> {
        if candidate.candidate.contains("malformed") {
            return Err(confmesh_webrtc::Error::IceCandidate(
                "malformed candidate".to_string(),
            ));
        }
        self.applied_candidates
            .lock()
            .unwrap()
            .push(candidate.candidate);
        Ok(())
    }

    async fn add_track(&self, _track: Arc<dyn TrackLocal + Send + Sync>) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        // Ends the capability event stream, like a closed RTCPeerConnection.
        self.events.lock().unwrap().take();
        Ok(())
    }

    fn connection_id(&self) -> &str {
        &self.id
    }
}

/// Factory producing [`FakeConnection`]s and recording what it built
pub struct FakeFactory {
    owner: String,
    pub created: StdMutex<Vec<Arc<FakeConnection>>>,
    pub configs: StdMutex<Vec<ConnectionConfig>>,
}

impl FakeFactory {
    pub fn new(owner: &str) -> Arc<Self> {
        Arc::new(Self {
            owner: owner.to_string(),
            created: StdMutex::new(Vec::new()),
            configs: StdMutex::new(Vec::new()),
        })
    }

    /// Connection created n-th (0-indexed)
    pub fn connection(&self, index: usize) -> Arc<FakeConnection> {
        Arc::clone(&self.created.lock().unwrap()[index])
    }

    /// Most recently created connection
    pub fn last_connection(&self) -> Arc<FakeConnection> {
        Arc::clone(self.created.lock().unwrap().last().expect("no connection"))
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait]
impl ConnectionFactory for FakeFactory {
    async fn create(
        &self,
        remote_id: &str,
        config: &ConnectionConfig,
    ) -> Result<(Arc<dyn MediaConnection>, mpsc::UnboundedReceiver<ConnectionEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();

        let connection = Arc::new(FakeConnection {
            id: uuid::Uuid::new_v4().to_string(),
            owner: self.owner.clone(),
            remote_id: remote_id.to_string(),
            events: StdMutex::new(Some(tx)),
            offers: StdMutex::new(Vec::new()),
            local_descriptions: StdMutex::new(Vec::new()),
            remote_descriptions: StdMutex::new(Vec::new()),
            applied_candidates: StdMutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });

        self.created.lock().unwrap().push(Arc::clone(&connection));
        self.configs.lock().unwrap().push(config.clone());

        Ok((connection, rx))
    }
}

/// In-process signaling relay connecting registered coordinators
///
/// `hold` parks outbound messages in a queue so tests can stage true
/// message races (both offers in flight before either is delivered).
pub struct MemoryHub {
    peers: RwLock<HashMap<String, Arc<NegotiationCoordinator>>>,
    holding: AtomicBool,
    queue: Mutex<Vec<SignalingMessage>>,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            peers: RwLock::new(HashMap::new()),
            holding: AtomicBool::new(false),
            queue: Mutex::new(Vec::new()),
        })
    }

    pub async fn register(&self, coordinator: Arc<NegotiationCoordinator>) {
        self.peers
            .write()
            .await
            .insert(coordinator.local_id().to_string(), coordinator);
    }

    /// Channel handle for one participant
    pub fn channel(self: &Arc<Self>) -> Arc<HubChannel> {
        Arc::new(HubChannel {
            hub: Arc::clone(self),
        })
    }

    /// Park messages instead of delivering them
    pub fn hold(&self) {
        self.holding.store(true, Ordering::SeqCst);
    }

    /// Number of parked messages
    pub async fn queued(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Deliver everything parked and resume direct delivery
    pub async fn release(&self) {
        self.holding.store(false, Ordering::SeqCst);

        let parked: Vec<SignalingMessage> = self.queue.lock().await.drain(..).collect();
        for message in parked {
            self.deliver(message).await;
        }
    }

    async fn deliver(&self, message: SignalingMessage) {
        let Some(to) = message.recipient().map(String::from) else {
            return;
        };

        let peer = self.peers.read().await.get(&to).cloned();
        if let Some(peer) = peer {
            peer.on_remote_message(message).await;
        }
        // Unknown recipients are dropped, like a relay with no such client.
    }
}

/// [`SignalingChannel`] backed by a [`MemoryHub`]
pub struct HubChannel {
    hub: Arc<MemoryHub>,
}

#[async_trait]
impl SignalingChannel for HubChannel {
    async fn send(&self, message: SignalingMessage) -> Result<()> {
        if self.hub.holding.load(Ordering::SeqCst) {
            self.hub.queue.lock().await.push(message);
            return Ok(());
        }

        self.hub.deliver(message).await;
        Ok(())
    }
}
