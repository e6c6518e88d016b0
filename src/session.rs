use crate::capture::CaptureStream;
use crate::peer::connection::PeerHandle;
use crate::utils::random_id;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Idle,
    Primary,
    Fallback,
}

/// The one active stream session of a controller
pub struct Session {
    pub id: String,
    pub exercise_id: String,
    pub generation: u64,
    pub mode: SessionMode,
    pub started_at: DateTime<Local>,
    pub(crate) capture: Option<Box<dyn CaptureStream>>,
    pub(crate) peer: Option<Arc<dyn PeerHandle>>,
    pub(crate) monitor: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(exercise_id: &str, generation: u64) -> Self {
        Self {
            id: random_id(),
            exercise_id: exercise_id.to_string(),
            generation,
            mode: SessionMode::Idle,
            started_at: Local::now(),
            capture: None,
            peer: None,
            monitor: None,
        }
    }

    /// Seconds since the session was opened
    pub fn age_secs(&self) -> i64 {
        (Local::now() - self.started_at).num_seconds()
    }

    /// Capture and peer only; the monitor keeps running
    pub(crate) fn take_media(&mut self) -> Resources {
        Resources {
            capture: self.capture.take(),
            peer: self.peer.take(),
            monitor: None,
        }
    }

    pub(crate) fn into_resources(mut self) -> Resources {
        let mut resources = self.take_media();
        resources.monitor = self.monitor.take();
        resources
    }
}

/// Resources taken out of a session, released exactly once
#[derive(Default)]
pub(crate) struct Resources {
    capture: Option<Box<dyn CaptureStream>>,
    peer: Option<Arc<dyn PeerHandle>>,
    monitor: Option<JoinHandle<()>>,
}

impl Resources {
    pub(crate) fn is_empty(&self) -> bool {
        self.capture.is_none() && self.peer.is_none() && self.monitor.is_none()
    }

    async fn release(self) {
        if let Some(monitor) = self.monitor {
            monitor.abort();
        }
        if let Some(capture) = self.capture {
            debug!("Stopping capture stream {}", capture.stream_id());
            capture.stop();
        }
        if let Some(peer) = self.peer {
            if let Err(e) = peer.close().await {
                warn!("Peer close failed: {}", e);
            }
        }
    }

    /// Best effort from a synchronous context: capture stops now, the peer
    /// is closed on the ambient runtime if there is one.
    pub(crate) fn release_on_drop(self) {
        if let Some(monitor) = self.monitor {
            monitor.abort();
        }
        if let Some(capture) = self.capture {
            capture.stop();
        }
        if let Some(peer) = self.peer {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = peer.close().await {
                            warn!("Peer close failed: {}", e);
                        }
                    });
                }
                Err(_) => warn!("No runtime left to close the peer connection"),
            }
        }
    }

    /// Runs the release on its own task so a cancelled caller cannot
    /// leave a peer half-closed.
    pub(crate) async fn release_detached(self) {
        if self.is_empty() {
            return;
        }
        if let Err(e) = tokio::spawn(self.release()).await {
            warn!("Resource release task failed: {}", e);
        }
    }
}
