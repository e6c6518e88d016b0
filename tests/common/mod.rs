//! Test doubles for every controller collaborator

#![allow(dead_code)]

use async_trait::async_trait;
use exercise_stream::capture::{CaptureConstraints, CaptureDevice, CaptureStream, LocalTrack, TrackKind};
use exercise_stream::config::StreamConfig;
use exercise_stream::controller::{Collaborators, StreamSessionController};
use exercise_stream::events::{UiSignal, UiSignals};
use exercise_stream::peer::{
    ConnectionState, IceCandidate, NegotiationAnswer, NegotiationOffer, PeerEvent,
    PeerEventSender, PeerFactory, PeerHandle, RemoteTrack, SdpKind, SessionDescription,
};
use exercise_stream::render::{MediaSource, RenderSurface, RenderTarget};
use exercise_stream::signaling::SignalingClient;
use exercise_stream::{Result, StreamError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Notify;

// ========== CAPTURE ==========

#[derive(Default)]
pub struct FakeCapture {
    pub deny: AtomicBool,
    pub acquired: AtomicUsize,
    pub stopped: Arc<AtomicUsize>,
    pub constraints: Mutex<Vec<CaptureConstraints>>,
}

impl FakeCapture {
    pub fn live(&self) -> usize {
        self.acquired.load(Ordering::SeqCst) - self.stopped.load(Ordering::SeqCst)
    }
}

pub struct FakeStream {
    id: String,
    stopped: AtomicBool,
    stop_count: Arc<AtomicUsize>,
}

impl CaptureStream for FakeStream {
    fn stream_id(&self) -> String {
        self.id.clone()
    }

    fn tracks(&self) -> Vec<LocalTrack> {
        vec![LocalTrack {
            id: format!("{}-video", self.id),
            stream_id: self.id.clone(),
            kind: TrackKind::Video,
        }]
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.stop_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl CaptureDevice for FakeCapture {
    async fn acquire(&self, constraints: &CaptureConstraints) -> Result<Box<dyn CaptureStream>> {
        self.constraints.lock().push(*constraints);
        if self.deny.load(Ordering::SeqCst) {
            return Err(StreamError::Capture("Permission denied".into()));
        }
        let n = self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            id: format!("camera-{n}"),
            stopped: AtomicBool::new(false),
            stop_count: self.stopped.clone(),
        }))
    }
}

// ========== PEER ==========

#[derive(Default)]
pub struct PeerScript {
    pub fail_offer: bool,
    pub fail_remote_description: bool,
    /// no remote track ever arrives
    pub silent: bool,
    pub rejected_candidates: Vec<String>,
}

#[derive(Default)]
pub struct FakePeerFactory {
    pub script: Mutex<PeerScript>,
    pub created: AtomicUsize,
    pub close_calls: Arc<AtomicUsize>,
    pub senders: Mutex<Vec<PeerEventSender>>,
    pub attempted_candidates: Arc<Mutex<Vec<String>>>,
}

impl FakePeerFactory {
    /// pushes an event into the n-th peer's channel
    pub fn inject(&self, peer: usize, event: PeerEvent) {
        let senders = self.senders.lock();
        senders[peer].send(event).expect("peer event receiver is gone");
    }
}

pub struct FakePeer {
    index: usize,
    events: PeerEventSender,
    fail_offer: bool,
    fail_remote_description: bool,
    silent: bool,
    rejected: Vec<String>,
    attempted: Arc<Mutex<Vec<String>>>,
    close_calls: Arc<AtomicUsize>,
}

#[async_trait]
impl PeerFactory for FakePeerFactory {
    async fn create(&self, events: PeerEventSender) -> Result<Arc<dyn PeerHandle>> {
        let index = self.created.fetch_add(1, Ordering::SeqCst);
        self.senders.lock().push(events.clone());
        let script = self.script.lock();
        Ok(Arc::new(FakePeer {
            index,
            events,
            fail_offer: script.fail_offer,
            fail_remote_description: script.fail_remote_description,
            silent: script.silent,
            rejected: script.rejected_candidates.clone(),
            attempted: self.attempted_candidates.clone(),
            close_calls: self.close_calls.clone(),
        }))
    }
}

#[async_trait]
impl PeerHandle for FakePeer {
    async fn add_local_tracks(&self, _tracks: &[LocalTrack]) -> Result<()> {
        Ok(())
    }

    async fn create_offer(&self) -> Result<NegotiationOffer> {
        if self.fail_offer {
            return Err(StreamError::Negotiation("createOffer failed".into()));
        }
        Ok(NegotiationOffer {
            description: SessionDescription {
                kind: SdpKind::Offer,
                sdp: format!("v=0\r\no=- {} 2 IN IP4 127.0.0.1\r\n", self.index),
            },
        })
    }

    async fn set_remote_description(&self, _description: &SessionDescription) -> Result<()> {
        if self.fail_remote_description {
            return Err(StreamError::Negotiation("setRemoteDescription failed".into()));
        }
        if !self.silent {
            let _ = self
                .events
                .send(PeerEvent::ConnectionState(ConnectionState::Connected));
            let _ = self.events.send(PeerEvent::RemoteTrack(RemoteTrack {
                track_id: format!("remote-{}", self.index),
                stream_id: format!("exercise-{}", self.index),
            }));
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        self.attempted.lock().push(candidate.candidate.clone());
        if self.rejected.contains(&candidate.candidate) {
            return Err(StreamError::Candidate("malformed candidate".into()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        let _ = self
            .events
            .send(PeerEvent::ConnectionState(ConnectionState::Closed));
        Ok(())
    }
}

// ========== SIGNALING ==========

#[derive(Clone)]
pub enum Reply {
    Answer(Vec<String>),
    Status(u16),
    Malformed,
    Hang,
    /// waits for the notify before answering
    Gated(Arc<Notify>, Vec<String>),
}

pub struct FakeSignaling {
    pub default_reply: Reply,
    pub replies: Mutex<HashMap<String, Reply>>,
    pub calls: AtomicUsize,
    pub exercises: Mutex<Vec<String>>,
}

impl FakeSignaling {
    pub fn new(default_reply: Reply) -> Self {
        Self {
            default_reply,
            replies: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            exercises: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn answer(candidates: &[String]) -> NegotiationAnswer {
    NegotiationAnswer {
        description: SessionDescription {
            kind: SdpKind::Answer,
            sdp: "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\n".into(),
        },
        candidates: candidates
            .iter()
            .map(|c| IceCandidate {
                candidate: c.clone(),
                sdp_mid: Some("0".into()),
                sdp_mline_index: Some(0),
            })
            .collect(),
    }
}

#[async_trait]
impl SignalingClient for FakeSignaling {
    async fn request_remote_answer(
        &self,
        _offer: &NegotiationOffer,
        exercise_id: &str,
    ) -> Result<NegotiationAnswer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.exercises.lock().push(exercise_id.to_string());
        let reply = self
            .replies
            .lock()
            .get(exercise_id)
            .cloned()
            .unwrap_or_else(|| self.default_reply.clone());

        match reply {
            Reply::Answer(candidates) => Ok(answer(&candidates)),
            Reply::Status(code) => Err(StreamError::Signaling(format!(
                "Server responded with status: {code}"
            ))),
            Reply::Malformed => Err(StreamError::Negotiation("answer carries no sdp".into())),
            Reply::Hang => std::future::pending().await,
            Reply::Gated(gate, candidates) => {
                gate.notified().await;
                Ok(answer(&candidates))
            }
        }
    }
}

// ========== RENDER & SIGNALS ==========

/// Render surface that also keeps a log of operations
#[derive(Default)]
pub struct RecordingRender {
    pub surface: RenderSurface,
    pub log: Mutex<Vec<String>>,
}

impl RecordingRender {
    pub fn current(&self) -> Option<MediaSource> {
        self.surface.current()
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl RenderTarget for RecordingRender {
    fn bind(&self, source: MediaSource) -> Result<()> {
        let label = match &source {
            MediaSource::LocalPreview { .. } => "bind:preview".to_string(),
            MediaSource::Remote { track_id, .. } => format!("bind:remote:{track_id}"),
            MediaSource::Pulled { url } => format!("bind:pulled:{url}"),
        };
        self.surface.bind(source)?;
        self.log.lock().push(label);
        Ok(())
    }

    fn unbind(&self) {
        self.surface.unbind();
        self.log.lock().push("unbind".into());
    }
}

/// Render target that reads controller state from inside `bind`, the way a
/// host labelling its video element would
#[derive(Default)]
pub struct IntrospectingRender {
    pub surface: RenderSurface,
    pub controller: OnceLock<StreamSessionController>,
    pub seen: Mutex<Vec<(Option<String>, Option<String>)>>,
}

impl RenderTarget for IntrospectingRender {
    fn bind(&self, source: MediaSource) -> Result<()> {
        if let Some(controller) = self.controller.get() {
            let _ = controller.mode();
            self.seen
                .lock()
                .push((controller.session_id(), controller.exercise_id()));
        }
        self.surface.bind(source)
    }

    fn unbind(&self) {
        if let Some(controller) = self.controller.get() {
            let _ = controller.session_id();
        }
        self.surface.unbind();
    }
}

#[derive(Default)]
pub struct RecordingSignals {
    pub seen: Mutex<Vec<UiSignal>>,
}

impl RecordingSignals {
    pub fn seen(&self) -> Vec<UiSignal> {
        self.seen.lock().clone()
    }
}

impl UiSignals for RecordingSignals {
    fn emit(&self, signal: UiSignal) {
        self.seen.lock().push(signal);
    }
}

// ========== HARNESS ==========

pub struct Harness {
    pub controller: StreamSessionController,
    pub capture: Arc<FakeCapture>,
    pub peers: Arc<FakePeerFactory>,
    pub signaling: Arc<FakeSignaling>,
    pub render: Arc<RecordingRender>,
    pub signals: Arc<RecordingSignals>,
}

pub fn candidates(names: &[&str]) -> Vec<String> {
    names
        .iter()
        .map(|n| format!("candidate:{n} 1 UDP 2130706431 192.168.1.1 8888 typ host"))
        .collect()
}

pub fn test_config() -> StreamConfig {
    StreamConfig {
        signaling_timeout_ms: 300,
        negotiation_timeout_ms: 300,
        ..StreamConfig::default()
    }
}

pub fn harness(reply: Reply) -> Harness {
    harness_with(test_config(), reply)
}

pub fn harness_with(config: StreamConfig, reply: Reply) -> Harness {
    let capture = Arc::new(FakeCapture::default());
    let peers = Arc::new(FakePeerFactory::default());
    let signaling = Arc::new(FakeSignaling::new(reply));
    let render = Arc::new(RecordingRender::default());
    let signals = Arc::new(RecordingSignals::default());

    let controller = StreamSessionController::new(
        config,
        Collaborators {
            capture: capture.clone(),
            peers: peers.clone(),
            signaling: signaling.clone(),
            render: render.clone(),
            signals: signals.clone(),
        },
    )
    .expect("valid test config");

    Harness {
        controller,
        capture,
        peers,
        signaling,
        render,
        signals,
    }
}
