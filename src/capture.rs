//! Capture collaborator
//!
//! The controller never opens a device itself. The host hands in a
//! [`CaptureDevice`] (browser `getUserMedia`, a native camera, a test double)
//! and the controller owns the returned [`CaptureStream`] until teardown.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What the controller asks the capture device for
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct CaptureConstraints {
    pub width: u32,
    pub height: u32,
    pub audio: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            audio: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A local media track offered to the peer connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
}

/// An acquired capture stream. Owned by exactly one session.
///
/// Only track identities cross this seam; the peer offers matching sample
/// tracks and writing encoded media into them is left to the host.
pub trait CaptureStream: Send + Sync {
    fn stream_id(&self) -> String;

    fn tracks(&self) -> Vec<LocalTrack>;

    /// Stops every track. Calling it again must do nothing.
    fn stop(&self);
}

#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Fails with `StreamError::Capture` when the device is missing or denied.
    async fn acquire(&self, constraints: &CaptureConstraints) -> Result<Box<dyn CaptureStream>>;
}
