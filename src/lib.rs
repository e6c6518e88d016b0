//! Exercise video stream with graceful degradation.
//!
//! [`StreamSessionController`] negotiates a WebRTC stream for an exercise and
//! falls back to the server's MJPEG feed (`/video_feed/{id}`) whenever the
//! real-time path cannot be established or is lost.

pub mod capture;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod fallback;
pub mod logger;
pub mod peer;
pub mod render;
pub mod session;
pub mod signaling;
pub mod utils;

#[cfg(feature = "tauri")]
pub mod commands;

pub use capture::{CaptureConstraints, CaptureDevice, CaptureStream, LocalTrack, TrackKind};
pub use config::{NegotiationPolicy, StreamConfig};
pub use controller::{Collaborators, Phase, StreamMode, StreamSessionController};
pub use error::{Result, StreamError};
pub use events::{BroadcastSignals, UiSignal, UiSignals};
pub use fallback::{FallbackFeed, Frame, MjpegPuller};
pub use render::{MediaSource, RenderSurface, RenderTarget};
pub use session::SessionMode;
pub use signaling::{HttpSignalingClient, SignalingClient};
