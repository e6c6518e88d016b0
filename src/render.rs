//! Render target collaborator: one surface, one bound source at a time.

use crate::error::{Result, StreamError};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

/// Source currently shown on the surface
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaSource {
    /// local capture shown while negotiating
    LocalPreview { stream_id: String },
    /// negotiated remote track
    Remote { track_id: String, stream_id: String },
    /// continuously refreshed image pulled from the fallback feed
    Pulled { url: String },
}

/// Called by the controller with its state lock released, so implementations
/// may read `phase()`, `session_id()`, `exercise_id()` or `mode()`. Calls are
/// serialized; a `bind` must not wait on another render call.
pub trait RenderTarget: Send + Sync {
    /// Replaces whatever is bound. Implementations release the previous source.
    fn bind(&self, source: MediaSource) -> Result<()>;

    /// Releases the bound source; nothing bound is fine.
    fn unbind(&self);
}

/// In-memory surface that remembers its binding and lets hosts watch it
pub struct RenderSurface {
    attached: Mutex<bool>,
    current: watch::Sender<Option<MediaSource>>,
}

impl RenderSurface {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            attached: Mutex::new(true),
            current,
        }
    }

    pub fn current(&self) -> Option<MediaSource> {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<MediaSource>> {
        self.current.subscribe()
    }

    /// A detached surface (window closed, element removed) refuses bindings
    pub fn set_attached(&self, attached: bool) {
        *self.attached.lock() = attached;
        if !attached {
            self.unbind();
        }
    }
}

impl Default for RenderSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderTarget for RenderSurface {
    fn bind(&self, source: MediaSource) -> Result<()> {
        if !*self.attached.lock() {
            return Err(StreamError::Render("surface is detached".into()));
        }
        let previous = self.current.send_replace(Some(source.clone()));
        if let Some(previous) = previous {
            debug!("render: released {:?}", previous);
        }
        debug!("render: bound {:?}", source);
        Ok(())
    }

    fn unbind(&self) {
        if let Some(previous) = self.current.send_replace(None) {
            debug!("render: released {:?}", previous);
        }
    }
}
