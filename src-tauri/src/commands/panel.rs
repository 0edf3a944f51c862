//! Record-answer panel Tauri commands

use crate::answer::{AnswerRecord, InterviewContext, JsonAnswerStore};
use crate::capture::CameraInfo;
use crate::notify::{Notification, Notifier};
use crate::panel::{CameraState, PanelSnapshot, RecordAnswerPanel};
use crate::utils::error::ErrorResponse;
use tauri::{AppHandle, Emitter, State};

/// Event name for panel state changes
pub const PANEL_EVENT: &str = "panel-event";

/// Event name for toast notifications
pub const NOTIFICATION_EVENT: &str = "notification";

/// Application state for the panel
pub struct PanelState {
    pub panel: RecordAnswerPanel,
    pub answers: JsonAnswerStore,
}

/// Forwards notifications to the webview as toasts
pub struct TauriNotifier {
    app: AppHandle,
}

impl TauriNotifier {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl Notifier for TauriNotifier {
    fn notify(&self, notification: Notification) {
        if let Err(e) = self.app.emit(NOTIFICATION_EVENT, &notification) {
            tracing::warn!("Failed to emit notification: {}", e);
        }
    }
}

/// Relay panel events to the webview until the panel goes away
pub fn forward_panel_events(app: AppHandle, panel: &RecordAnswerPanel) {
    let mut rx = panel.subscribe();
    tauri::async_runtime::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = app.emit(PANEL_EVENT, &event) {
                        tracing::warn!("Failed to emit panel event: {}", e);
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("Panel event relay lagged, {} events dropped", missed);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Start loading the face models; returns false if already started
#[tauri::command]
pub async fn initialize_panel(state: State<'_, PanelState>) -> Result<bool, String> {
    Ok(state.panel.initialize())
}

/// Toggle the webcam
#[tauri::command]
pub async fn toggle_camera(state: State<'_, PanelState>) -> Result<CameraState, String> {
    Ok(state.panel.toggle_camera().await)
}

/// Replace the answer text
#[tauri::command]
pub fn set_answer_text(state: State<'_, PanelState>, text: String) {
    state.panel.set_answer_text(text);
}

/// Select the question being answered
#[tauri::command]
pub fn set_interview_context(state: State<'_, PanelState>, context: InterviewContext) {
    state.panel.set_interview_context(context);
}

/// Save the current answer
#[tauri::command]
pub async fn save_answer(state: State<'_, PanelState>) -> Result<AnswerRecord, ErrorResponse> {
    state.panel.save_answer().await.map_err(ErrorResponse::from)
}

/// Current panel state
#[tauri::command]
pub fn get_panel_snapshot(state: State<'_, PanelState>) -> PanelSnapshot {
    state.panel.snapshot()
}

/// Get list of available cameras/webcams
#[tauri::command]
pub async fn get_cameras(state: State<'_, PanelState>) -> Result<Vec<CameraInfo>, String> {
    Ok(state.panel.cameras())
}

/// Saved answers of an interview
#[tauri::command]
pub async fn list_answers(
    state: State<'_, PanelState>,
    interview_id: String,
) -> Result<Vec<AnswerRecord>, ErrorResponse> {
    state
        .answers
        .list(&interview_id)
        .await
        .map_err(ErrorResponse::from)
}
