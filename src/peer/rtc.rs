//! webrtc-rs backed connection capability

use super::capability::{
    CandidateInit, ConnectionEvent, ConnectionEvents, ConnectionFactory, DescriptionKind,
    HealthState, MediaConnection, SessionDescription,
};
use crate::config::ConnectionConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::TrackLocal;

/// Production [`MediaConnection`] wrapping a webrtc-rs `RTCPeerConnection`
pub struct RtcConnection {
    remote_id: String,
    connection_id: String,
    pc: Arc<RTCPeerConnection>,

    /// RTP senders retained to keep attached tracks alive
    senders: RwLock<Vec<Arc<RTCRtpSender>>>,
}

impl RtcConnection {
    /// Create a connection for `remote_id` and wire its observables into an
    /// event stream
    pub async fn new(
        remote_id: &str,
        config: &ConnectionConfig,
    ) -> Result<(Arc<Self>, ConnectionEvents)> {
        let connection_id = uuid::Uuid::new_v4().to_string();

        info!(
            "Creating peer connection: remote_id={}, connection_id={}",
            remote_id, connection_id
        );

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::PeerConnection(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry = register_default_interceptors(Default::default(), &mut media_engine)
            .map_err(|e| Error::PeerConnection(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(config.turn_servers.iter().map(|turn| {
                #[allow(clippy::needless_update)]
                RTCIceServer {
                    urls: vec![turn.url.clone()],
                    username: turn.username.clone(),
                    credential: turn.credential.clone(),
                    ..Default::default()
                }
            }))
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| Error::PeerConnection(format!("Failed to create connection: {}", e)))?,
        );

        let (events, events_rx) = mpsc::unbounded_channel();

        let tx = events.clone();
        let peer = remote_id.to_string();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let tx = tx.clone();
            let peer = peer.clone();

            Box::pin(async move {
                let health = match state {
                    RTCPeerConnectionState::New => HealthState::New,
                    RTCPeerConnectionState::Connecting => HealthState::Connecting,
                    RTCPeerConnectionState::Connected => HealthState::Connected,
                    RTCPeerConnectionState::Disconnected => HealthState::Degraded,
                    RTCPeerConnectionState::Failed => HealthState::Failed,
                    RTCPeerConnectionState::Closed => HealthState::Closed,
                    _ => return,
                };

                debug!("Connection state with {}: {:?}", peer, state);
                let _ = tx.send(ConnectionEvent::HealthChanged(health));
            })
        }));

        let tx = events.clone();
        let peer = remote_id.to_string();
        pc.on_ice_candidate(Box::new(move |candidate| {
            let tx = tx.clone();
            let peer = peer.clone();

            Box::pin(async move {
                match candidate {
                    Some(candidate) => match candidate.to_json() {
                        Ok(init) => {
                            let _ = tx.send(ConnectionEvent::LocalCandidate(Some(CandidateInit {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                                username_fragment: init.username_fragment,
                            })));
                        }
                        Err(e) => warn!("Failed to serialize local candidate for {}: {}", peer, e),
                    },
                    None => {
                        debug!("ICE gathering complete for {}", peer);
                        let _ = tx.send(ConnectionEvent::LocalCandidate(None));
                    }
                }
            })
        }));

        let tx = events;
        pc.on_negotiation_needed(Box::new(move || {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(ConnectionEvent::NegotiationNeeded);
            })
        }));

        Ok((
            Arc::new(Self {
                remote_id: remote_id.to_string(),
                connection_id,
                pc,
                senders: RwLock::new(Vec::new()),
            }),
            events_rx,
        ))
    }

    fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription> {
        match description.kind {
            DescriptionKind::Offer => RTCSessionDescription::offer(description.sdp),
            DescriptionKind::Answer => RTCSessionDescription::answer(description.sdp),
        }
        .map_err(|e| Error::Sdp(format!("Failed to parse description: {}", e)))
    }
}

#[async_trait]
impl MediaConnection for RtcConnection {
    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription> {
        let options = ice_restart.then(|| RTCOfferOptions {
            ice_restart: true,
            ..Default::default()
        });

        let offer = self
            .pc
            .create_offer(options)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to create offer: {}", e)))?;

        debug!("Created SDP offer for {}", self.remote_id);
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to create answer: {}", e)))?;

        debug!("Created SDP answer for {}", self.remote_id);
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let desc = Self::to_rtc_description(description)?;
        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to set local description: {}", e)))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let desc = Self::to_rtc_description(description)?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to set remote description: {}", e)))
    }

    async fn add_candidate(&self, candidate: CandidateInit) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };

        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::IceCandidate(format!("Failed to add candidate: {}", e)))
    }

    async fn add_track(&self, track: Arc<dyn TrackLocal + Send + Sync>) -> Result<()> {
        let sender = self
            .pc
            .add_track(track)
            .await
            .map_err(|e| Error::MediaTrack(format!("Failed to add track: {}", e)))?;

        self.senders.write().await.push(sender);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        info!("Closing peer connection for {}", self.remote_id);
        self.pc
            .close()
            .await
            .map_err(|e| Error::PeerConnection(format!("Failed to close connection: {}", e)))
    }

    fn connection_id(&self) -> &str {
        &self.connection_id
    }
}

/// [`ConnectionFactory`] producing [`RtcConnection`]s
#[derive(Debug, Default)]
pub struct RtcConnectionFactory;

#[async_trait]
impl ConnectionFactory for RtcConnectionFactory {
    async fn create(
        &self,
        remote_id: &str,
        config: &ConnectionConfig,
    ) -> Result<(Arc<dyn MediaConnection>, ConnectionEvents)> {
        let (conn, events) = RtcConnection::new(remote_id, config).await?;
        Ok((conn, events))
    }
}
