//! Tauri surface: commands for the page, app events for signals and bindings.

pub mod bridge;
pub mod stream_api;

pub use bridge::{manage_controller, TauriRenderTarget, SOURCE_EVENT};
pub use stream_api::{start_stream, stop_stream, stream_phase};

/// Adds the stream commands to an app builder
pub fn register<R: tauri::Runtime>(builder: tauri::Builder<R>) -> tauri::Builder<R> {
    crate::logger::init();
    builder.invoke_handler(tauri::generate_handler![
        stream_api::start_stream,
        stream_api::stop_stream,
        stream_api::stream_phase,
    ])
}
