use crate::controller::{Phase, StreamSessionController};
use tauri::{command, State};

#[command]
pub async fn start_stream(
    controller: State<'_, StreamSessionController>,
    exercise_id: String,
) -> Result<Phase, String> {
    Ok(controller.start(&exercise_id).await)
}

#[command]
pub async fn stop_stream(controller: State<'_, StreamSessionController>) -> Result<(), String> {
    controller.stop().await;
    Ok(())
}

#[command]
pub fn stream_phase(controller: State<'_, StreamSessionController>) -> Phase {
    controller.phase()
}
