//! Stream session controller
//!
//! Drives one exercise stream from request to display. The negotiated peer
//! stream is tried first; any failure along the way degrades the session to
//! the pulled MJPEG feed, which is terminal until the next `start`.
//!
//! ```text
//! Idle ─start─▶ AcquiringCapture ─ok─▶ Negotiating ─remote track─▶ Streaming(Primary)
//!                     │                     │                            │
//!                     └──── error ──────────┴───── error / lost ─────────┴─▶ Streaming(Fallback)
//! ```
//!
//! Every teardown bumps a generation counter. Work belonging to an older
//! generation is released as soon as it resolves and never touches the
//! render target.
//!
//! Render calls are serialized by their own gate, taken before the state
//! lock and never while holding it. Generation bumps happen under the gate,
//! so a binding checked as current stays current until the gate is released.
//! The state lock is never held while the render target runs.

use crate::capture::CaptureDevice;
use crate::config::{NegotiationPolicy, StreamConfig};
use crate::error::{Result, StreamError};
use crate::events::{UiSignal, UiSignals};
use crate::fallback::FallbackFeed;
use crate::logger::dump_candidate;
use crate::peer::connection::{PeerFactory, PeerHandle, WebRtcPeerFactory};
use crate::peer::ice;
use crate::peer::state::{peer_events, ConnectionState, PeerEvent, PeerEventReceiver};
use crate::peer::types::{CandidateReport, NegotiationAnswer, NegotiationOffer, RemoteTrack};
use crate::render::{MediaSource, RenderTarget};
use crate::session::{Session, SessionMode};
use crate::signaling::{HttpSignalingClient, SignalingClient};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    Primary,
    Fallback,
}

/// Observable controller state
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    AcquiringCapture,
    Negotiating,
    Streaming(StreamMode),
    Failed,
}

/// Everything the controller talks to, injected by the host
#[derive(Clone)]
pub struct Collaborators {
    pub capture: Arc<dyn CaptureDevice>,
    pub peers: Arc<dyn PeerFactory>,
    pub signaling: Arc<dyn SignalingClient>,
    pub render: Arc<dyn RenderTarget>,
    pub signals: Arc<dyn UiSignals>,
}

struct ControllerState {
    generation: u64,
    session: Option<Session>,
}

struct Inner {
    config: StreamConfig,
    feed: FallbackFeed,
    collab: Collaborators,
    state: Mutex<ControllerState>,
    render_gate: Mutex<()>,
    phase: watch::Sender<Phase>,
}

/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct StreamSessionController {
    inner: Arc<Inner>,
}

impl StreamSessionController {
    pub fn new(config: StreamConfig, collab: Collaborators) -> Result<Self> {
        config.validate()?;
        let feed = FallbackFeed::new(&config.fallback_base_url)?;
        let (phase, _) = watch::channel(Phase::Idle);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                feed,
                collab,
                state: Mutex::new(ControllerState {
                    generation: 0,
                    session: None,
                }),
                render_gate: Mutex::new(()),
                phase,
            }),
        })
    }

    /// Uses the webrtc peer factory and the HTTP signaling client built from `config`.
    pub fn with_defaults(
        config: StreamConfig,
        capture: Arc<dyn CaptureDevice>,
        render: Arc<dyn RenderTarget>,
        signals: Arc<dyn UiSignals>,
    ) -> Result<Self> {
        let signaling =
            HttpSignalingClient::new(config.signaling_url.clone(), config.signaling_timeout())?;
        let peers = WebRtcPeerFactory::new(config.ice_servers.clone());
        let collab = Collaborators {
            capture,
            peers: Arc::new(peers),
            signaling: Arc::new(signaling),
            render,
            signals,
        };
        Self::new(config, collab)
    }

    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    pub fn phase(&self) -> Phase {
        *self.inner.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.inner.phase.subscribe()
    }

    pub fn exercise_id(&self) -> Option<String> {
        let state = self.inner.state.lock();
        state.session.as_ref().map(|s| s.exercise_id.clone())
    }

    pub fn session_id(&self) -> Option<String> {
        let state = self.inner.state.lock();
        state.session.as_ref().map(|s| s.id.clone())
    }

    pub fn mode(&self) -> SessionMode {
        let state = self.inner.state.lock();
        state
            .session
            .as_ref()
            .map(|s| s.mode)
            .unwrap_or(SessionMode::Idle)
    }

    // ========  PUBLIC API =========

    /// Tears down any active session, then streams `exercise_id`.
    ///
    /// Returns once the surface shows the remote stream or the fallback feed,
    /// or the session failed or was superseded. Never returns an error: every
    /// recoverable failure ends in `Streaming(Fallback)`.
    pub async fn start(&self, exercise_id: &str) -> Phase {
        self.teardown().await;

        let exercise_id = exercise_id.trim();
        if exercise_id.is_empty() {
            info!("start called without an exercise");
            self.inner.collab.signals.emit(UiSignal::NoSession);
            return self.phase();
        }

        let (generation, session_id) = self.open_session(exercise_id).await;
        let span = info_span!("stream", session = %session_id, exercise = %exercise_id);
        self.drive(generation, exercise_id).instrument(span).await
    }

    /// Releases capture, closes the peer, clears the surface. No-op when idle.
    pub async fn stop(&self) {
        if self.teardown().await {
            info!("Stream session stopped");
            self.inner.collab.signals.emit(UiSignal::NoSession);
        }
    }

    /// Signaling round trip bounded by the signaling timeout.
    pub async fn request_remote_answer(
        &self,
        offer: &NegotiationOffer,
        exercise_id: &str,
    ) -> Result<NegotiationAnswer> {
        let limit = self.inner.config.signaling_timeout();
        timeout(
            limit,
            self.inner
                .collab
                .signaling
                .request_remote_answer(offer, exercise_id),
        )
        .await
        .map_err(|_| StreamError::Timeout(format!("signaling round trip exceeded {limit:?}")))?
    }

    /// Applies an answer to the active session's peer connection.
    pub async fn apply_answer(&self, answer: &NegotiationAnswer) -> Result<CandidateReport> {
        let peer = {
            let state = self.inner.state.lock();
            state.session.as_ref().and_then(|s| s.peer.clone())
        }
        .ok_or_else(|| StreamError::Negotiation("no active peer connection".into()))?;

        ice::apply_answer(peer.as_ref(), answer).await
    }

    // ========  STATE MACHINE =========

    async fn drive(&self, generation: u64, exercise_id: &str) -> Phase {
        if self.inner.config.policy == NegotiationPolicy::FallbackOnly {
            return self.enter_fallback(generation, "fallback-only policy").await;
        }

        match self.run_primary(generation, exercise_id).await {
            Ok(phase) => phase,
            Err(StreamError::Superseded(g)) => {
                debug!("Session generation {g} superseded, discarding its results");
                self.phase()
            }
            Err(e) if e.triggers_fallback() => {
                warn!("Real-time stream unavailable: {e}");
                self.enter_fallback(generation, &e.to_string()).await
            }
            Err(e) => {
                error!("Stream session failed: {e}");
                self.fail(generation).await
            }
        }
    }

    async fn run_primary(&self, generation: u64, exercise_id: &str) -> Result<Phase> {
        let collab = &self.inner.collab;

        let capture = collab.capture.acquire(&self.inner.config.capture).await?;
        let tracks = capture.tracks();
        {
            let _render = self.inner.render_gate.lock();
            let stream_id = capture.stream_id();
            {
                let mut state = self.inner.state.lock();
                let Some(session) = current_session(&mut state, generation) else {
                    capture.stop();
                    return Err(StreamError::Superseded(generation));
                };
                session.capture = Some(capture);
            }
            collab.render.bind(MediaSource::LocalPreview { stream_id })?;
            self.publish(Phase::Negotiating);
        }
        info!("Camera accessed successfully");

        let (events_tx, events) = peer_events();
        let peer = collab.peers.create(events_tx).await?;
        self.adopt_peer(generation, peer.clone()).await?;

        peer.add_local_tracks(&tracks).await?;
        let offer = peer.create_offer().await?;
        self.ensure_current(generation)?;

        info!("Sending offer to server...");
        let answer = self.request_remote_answer(&offer, exercise_id).await?;
        self.ensure_current(generation)?;

        ice::apply_answer(peer.as_ref(), &answer).await?;
        self.ensure_current(generation)?;
        info!("WebRTC connection setup completed, waiting for remote track");

        let mut events = events;
        let remote = self.await_remote_track(generation, &mut events).await?;
        self.attach_remote(generation, remote, events)
    }

    async fn adopt_peer(&self, generation: u64, peer: Arc<dyn PeerHandle>) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if let Some(session) = current_session(&mut state, generation) {
                session.peer = Some(peer);
                return Ok(());
            }
        }
        if let Err(e) = peer.close().await {
            warn!("Closing superseded peer failed: {e}");
        }
        Err(StreamError::Superseded(generation))
    }

    async fn await_remote_track(
        &self,
        generation: u64,
        events: &mut PeerEventReceiver,
    ) -> Result<RemoteTrack> {
        let limit = self.inner.config.negotiation_timeout();
        timeout(limit, self.recv_remote_track(generation, events))
            .await
            .map_err(|_| StreamError::Timeout(format!("no remote track within {limit:?}")))?
    }

    async fn recv_remote_track(
        &self,
        generation: u64,
        events: &mut PeerEventReceiver,
    ) -> Result<RemoteTrack> {
        while let Some(event) = events.recv().await {
            self.ensure_current(generation)?;
            match event {
                PeerEvent::RemoteTrack(track) => return Ok(track),
                PeerEvent::ConnectionState(state)
                    if state.is_lost() || state == ConnectionState::Closed =>
                {
                    return Err(StreamError::Negotiation(format!(
                        "connectivity {state:?} before a remote track arrived"
                    )));
                }
                PeerEvent::ConnectionState(state) => debug!("ICE connection state: {state:?}"),
                PeerEvent::LocalCandidate(candidate) => dump_candidate("LOCAL", &candidate),
            }
        }
        Err(StreamError::Negotiation("peer event stream closed".into()))
    }

    fn attach_remote(
        &self,
        generation: u64,
        remote: RemoteTrack,
        events: PeerEventReceiver,
    ) -> Result<Phase> {
        let phase = Phase::Streaming(StreamMode::Primary);
        {
            let _render = self.inner.render_gate.lock();
            self.ensure_current(generation)?;
            self.inner.collab.render.bind(MediaSource::Remote {
                track_id: remote.track_id,
                stream_id: remote.stream_id,
            })?;
            let mut state = self.inner.state.lock();
            let Some(session) = current_session(&mut state, generation) else {
                return Err(StreamError::Superseded(generation));
            };
            session.mode = SessionMode::Primary;
            session.monitor = Some(self.spawn_monitor(generation, events));
            self.publish(phase);
        }
        info!("Streaming remote video");
        self.inner.collab.signals.emit(UiSignal::LoadingFinished);
        Ok(phase)
    }

    /// Watches connectivity after the remote stream is up.
    fn spawn_monitor(&self, generation: u64, mut events: PeerEventReceiver) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(
            async move {
                while let Some(event) = events.recv().await {
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    let controller = StreamSessionController { inner };
                    if !controller.is_current(generation) {
                        break;
                    }
                    match event {
                        PeerEvent::ConnectionState(state) if state.is_lost() => {
                            warn!("ICE connection {state:?}, trying fallback");
                            controller
                                .enter_fallback(generation, &format!("connectivity {state:?}"))
                                .await;
                            break;
                        }
                        PeerEvent::ConnectionState(ConnectionState::Closed) => break,
                        PeerEvent::ConnectionState(state) => {
                            debug!("ICE connection state: {state:?}")
                        }
                        PeerEvent::LocalCandidate(candidate) => dump_candidate("LOCAL", &candidate),
                        PeerEvent::RemoteTrack(track) => debug!("Extra remote track ignored: {track:?}"),
                    }
                }
            }
            .in_current_span(),
        )
    }

    /// Releases capture and peer, then binds the pulled feed.
    async fn enter_fallback(&self, generation: u64, reason: &str) -> Phase {
        let (media, exercise_id) = {
            let mut state = self.inner.state.lock();
            match current_session(&mut state, generation) {
                Some(session) => (session.take_media(), session.exercise_id.clone()),
                None => return self.phase(),
            }
        };
        info!("Falling back to legacy video streaming ({reason})");
        media.release_detached().await;

        let url = self.inner.feed.url_for(&exercise_id);
        let bound = {
            let _render = self.inner.render_gate.lock();
            if !self.is_current(generation) {
                return self.phase();
            }
            let render = &self.inner.collab.render;
            render.unbind();
            match render.bind(MediaSource::Pulled { url: url.clone() }) {
                Ok(()) => {
                    let mut state = self.inner.state.lock();
                    if let Some(session) = current_session(&mut state, generation) {
                        session.mode = SessionMode::Fallback;
                    }
                    self.publish(Phase::Streaming(StreamMode::Fallback));
                    true
                }
                Err(e) => {
                    error!("Fallback feed could not be shown: {e}");
                    false
                }
            }
        };

        if bound {
            info!("Switched to legacy streaming mode: {url}");
            self.inner.collab.signals.emit(UiSignal::LoadingFinished);
            Phase::Streaming(StreamMode::Fallback)
        } else {
            self.fail(generation).await
        }
    }

    /// Nothing can be shown: drop the session and raise the error signal.
    async fn fail(&self, generation: u64) -> Phase {
        let resources = {
            let _render = self.inner.render_gate.lock();
            let mut session = {
                let mut state = self.inner.state.lock();
                if current_session(&mut state, generation).is_none() {
                    return self.phase();
                }
                state.session.take()
            };
            self.inner.collab.render.unbind();
            self.publish(Phase::Failed);
            // the monitor may be the caller, let it finish on its own
            if let Some(session) = session.as_mut() {
                drop(session.monitor.take());
            }
            session.map(Session::into_resources)
        };
        self.inner.collab.signals.emit(UiSignal::Error);
        if let Some(resources) = resources {
            resources.release_detached().await;
        }
        Phase::Failed
    }

    // ========  SESSION BOOKKEEPING =========

    async fn open_session(&self, exercise_id: &str) -> (u64, String) {
        let (generation, session_id, leftover) = {
            let _render = self.inner.render_gate.lock();
            let (opened, leftover) = {
                let mut state = self.inner.state.lock();
                // a concurrent start may have opened a session since our teardown
                let leftover = state.session.take().map(Session::into_resources);
                state.generation += 1;
                let session = Session::new(exercise_id, state.generation);
                let opened = (state.generation, session.id.clone());
                state.session = Some(session);
                (opened, leftover)
            };
            if leftover.is_some() {
                self.inner.collab.render.unbind();
            }
            self.publish(Phase::AcquiringCapture);
            (opened.0, opened.1, leftover)
        };
        if let Some(leftover) = leftover {
            leftover.release_detached().await;
        }
        info!("Opened stream session {session_id} for {exercise_id}");
        self.inner.collab.signals.emit(UiSignal::LoadingStarted);
        (generation, session_id)
    }

    /// Returns whether anything was active.
    async fn teardown(&self) -> bool {
        let (resources, was_active) = {
            let _render = self.inner.render_gate.lock();
            let session = {
                let mut state = self.inner.state.lock();
                state.generation += 1;
                state.session.take()
            };
            let was_active = session.is_some() || self.phase() != Phase::Idle;
            if let Some(session) = &session {
                info!(
                    "Closing stream session {} ({:?}, open {}s since {})",
                    session.id,
                    session.mode,
                    session.age_secs(),
                    session.started_at.format("%H:%M:%S")
                );
                self.inner.collab.render.unbind();
            }
            self.publish(Phase::Idle);
            (session.map(Session::into_resources), was_active)
        };
        if let Some(resources) = resources {
            resources.release_detached().await;
        }
        was_active
    }

    fn is_current(&self, generation: u64) -> bool {
        let mut state = self.inner.state.lock();
        current_session(&mut state, generation).is_some()
    }

    fn ensure_current(&self, generation: u64) -> Result<()> {
        if self.is_current(generation) {
            Ok(())
        } else {
            Err(StreamError::Superseded(generation))
        }
    }

    /// Receivers only wake on an actual transition.
    fn publish(&self, phase: Phase) {
        self.inner.phase.send_if_modified(|current| {
            if *current == phase {
                return false;
            }
            debug!("phase {current:?} -> {phase:?}");
            *current = phase;
            true
        });
    }
}

fn current_session(state: &mut ControllerState, generation: u64) -> Option<&mut Session> {
    if state.generation != generation {
        return None;
    }
    state
        .session
        .as_mut()
        .filter(|session| session.generation == generation)
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(session) = self.state.get_mut().session.take() {
            warn!("Controller dropped with an active session; call stop() first");
            session.into_resources().release_on_drop();
        }
    }
}
