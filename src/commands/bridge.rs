use crate::capture::CaptureDevice;
use crate::config::StreamConfig;
use crate::controller::StreamSessionController;
use crate::error::Result;
use crate::events::{UiSignal, UiSignals};
use crate::render::{MediaSource, RenderSurface, RenderTarget};
use std::sync::Arc;
use tauri::{App, AppHandle, Emitter, Manager, Runtime};
use tracing::{debug, warn};

/// Event carrying the source the page should show, `null` when cleared
pub const SOURCE_EVENT: &str = "stream-source";

impl<R: Runtime> UiSignals for AppHandle<R> {
    fn emit(&self, signal: UiSignal) {
        debug!("emit_state called with event: {}", signal.name());
        if let Err(e) = Emitter::emit(self, signal.name(), ()) {
            warn!("Failed to emit event {}: {:?}", signal.name(), e);
        }
    }
}

/// Keeps the binding in a [`RenderSurface`] and mirrors it to the webview
pub struct TauriRenderTarget<R: Runtime> {
    app: AppHandle<R>,
    surface: RenderSurface,
}

impl<R: Runtime> TauriRenderTarget<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        Self {
            app,
            surface: RenderSurface::new(),
        }
    }

    pub fn current(&self) -> Option<MediaSource> {
        self.surface.current()
    }
}

impl<R: Runtime> RenderTarget for TauriRenderTarget<R> {
    fn bind(&self, source: MediaSource) -> Result<()> {
        self.surface.bind(source.clone())?;
        if let Err(e) = Emitter::emit(&self.app, SOURCE_EVENT, Some(&source)) {
            warn!("Failed to emit {}: {:?}", SOURCE_EVENT, e);
        }
        Ok(())
    }

    fn unbind(&self) {
        self.surface.unbind();
        if let Err(e) = Emitter::emit(&self.app, SOURCE_EVENT, Option::<&MediaSource>::None) {
            warn!("Failed to emit {}: {:?}", SOURCE_EVENT, e);
        }
    }
}

/// Builds the default controller for this app and puts it in managed state
pub fn manage_controller<R: Runtime>(
    app: &App<R>,
    config: StreamConfig,
    capture: Arc<dyn CaptureDevice>,
) -> Result<()> {
    let handle = app.handle().clone();
    let controller = StreamSessionController::with_defaults(
        config,
        capture,
        Arc::new(TauriRenderTarget::new(handle.clone())),
        Arc::new(handle),
    )?;
    app.manage(controller);
    Ok(())
}
