use crate::capture::{LocalTrack, TrackKind};
use crate::error::{Result, StreamError};
use crate::logger::dump_selected_pair;
use crate::peer::state::{ConnectionState, PeerEvent, PeerEventSender};
use crate::peer::types::{
    IceCandidate, NegotiationOffer, RemoteTrack, SdpKind, ServerConfig, SessionDescription,
};
use crate::utils::add_ice_url_scheme;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::{
    api::APIBuilder,
    ice_transport::ice_server::RTCIceServer,
    peer_connection::{
        configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
        sdp::session_description::RTCSessionDescription, RTCPeerConnection,
    },
};

/// One negotiated peer connection owned by a session
#[async_trait]
pub trait PeerHandle: Send + Sync {
    /// Declares the local tracks in the offer. No samples are written here.
    async fn add_local_tracks(&self, tracks: &[LocalTrack]) -> Result<()>;

    /// Creates an offer and installs it as the local description.
    async fn create_offer(&self) -> Result<NegotiationOffer>;

    async fn set_remote_description(&self, description: &SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()>;

    /// Closing twice must be harmless.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait PeerFactory: Send + Sync {
    /// Builds a peer that reports tracks and state changes on `events`.
    async fn create(&self, events: PeerEventSender) -> Result<Arc<dyn PeerHandle>>;
}

/// Peer factory backed by the `webrtc` crate
pub struct WebRtcPeerFactory {
    ice_servers: Vec<ServerConfig>,
}

impl WebRtcPeerFactory {
    pub fn new(ice_servers: Vec<ServerConfig>) -> Self {
        Self { ice_servers }
    }
}

#[async_trait]
impl PeerFactory for WebRtcPeerFactory {
    async fn create(&self, events: PeerEventSender) -> Result<Arc<dyn PeerHandle>> {
        let peer = new_peer(&self.ice_servers, events).await?;
        Ok(Arc::new(peer))
    }
}

pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    sends_video: AtomicBool,
    closed: AtomicBool,
}

/// creates the peer and wires its callbacks into `events`
pub async fn new_peer(servers: &[ServerConfig], events: PeerEventSender) -> Result<WebRtcPeer> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let pc = Arc::new(api.new_peer_connection(rtc_config(servers)).await?);

    let tx = events.clone();
    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        match cand.map(|c| c.to_json()) {
            Some(Ok(init)) => {
                let _ = tx.send(PeerEvent::LocalCandidate(IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_mline_index: init.sdp_mline_index,
                }));
            }
            Some(Err(e)) => warn!("Local candidate could not be serialized: {:?}", e),
            // None marks the end of gathering
            None => debug!("ICE candidate gathering completed"),
        }
        Box::pin(async {})
    }));

    pc.on_ice_gathering_state_change(Box::new(move |state| {
        debug!("ICE gathering state changed to: {:?}", state);
        Box::pin(async {})
    }));

    let tx = events.clone();
    let pc_state = Arc::downgrade(&pc);
    pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
        info!("Peer connection state changed to: {:?}", st);
        let state = ConnectionState::from(st);
        if state.is_lost() {
            if let Some(pc) = pc_state.upgrade() {
                tokio::spawn(async move {
                    dump_selected_pair(&pc, "BEFORE-FAIL").await;
                });
            }
        }
        let _ = tx.send(PeerEvent::ConnectionState(state));
        Box::pin(async {})
    }));

    let tx = events;
    pc.on_track(Box::new(move |track, _receiver, _transceiver| {
        let remote = RemoteTrack {
            track_id: track.id(),
            stream_id: track.stream_id(),
        };
        info!("Remote track arrived: {:?}", remote);
        let _ = tx.send(PeerEvent::RemoteTrack(remote));
        Box::pin(async {})
    }));

    Ok(WebRtcPeer {
        pc,
        sends_video: AtomicBool::new(false),
        closed: AtomicBool::new(false),
    })
}

#[async_trait]
impl PeerHandle for WebRtcPeer {
    async fn add_local_tracks(&self, tracks: &[LocalTrack]) -> Result<()> {
        for track in tracks {
            let mime_type = match track.kind {
                TrackKind::Video => MIME_TYPE_VP8,
                TrackKind::Audio => MIME_TYPE_OPUS,
            };
            let local = Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: mime_type.to_owned(),
                    ..Default::default()
                },
                track.id.clone(),
                track.stream_id.clone(),
            ));
            self.pc
                .add_track(local as Arc<dyn TrackLocal + Send + Sync>)
                .await?;
            if track.kind == TrackKind::Video {
                self.sends_video.store(true, Ordering::SeqCst);
            }
            debug!("Added local {:?} track {}", track.kind, track.id);
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<NegotiationOffer> {
        // the remote video is wanted even when nothing local is sent
        if !self.sends_video.load(Ordering::SeqCst) {
            self.pc
                .add_transceiver_from_kind(
                    RTPCodecType::Video,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await?;
        }

        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer).await?;
        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| StreamError::Negotiation("local description missing".into()))?;

        Ok(NegotiationOffer {
            description: SessionDescription {
                kind: SdpKind::Offer,
                sdp: local.sdp,
            },
        })
    }

    async fn set_remote_description(&self, description: &SessionDescription) -> Result<()> {
        let desc = match description.kind {
            SdpKind::Answer => RTCSessionDescription::answer(description.sdp.clone()),
            SdpKind::Offer => RTCSessionDescription::offer(description.sdp.clone()),
        }
        .map_err(|e| StreamError::Negotiation(e.to_string()))?;

        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| StreamError::Negotiation(e.to_string()))
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| StreamError::Candidate(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Closing peer connection");
        self.pc.close().await?;
        Ok(())
    }
}

/// Peer connection configuration
fn rtc_config(servers: &[ServerConfig]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: ice_servers(servers),
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

pub fn ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}
