//! Panel state machine
//!
//! Defines the model and camera lifecycles plus the detection result the
//! overlay is drawn from.

use super::overlay::Overlay;
use crate::answer::InterviewContext;
use crate::capture::VideoStream;
use crate::perception::{Expression, ExpressionScores};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of the perception model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelReadiness {
    #[default]
    NotLoaded,
    Loading,
    Ready,
    /// Terminal for the session; there is no automatic retry
    Failed,
}

impl ModelReadiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, ModelReadiness::Ready)
    }
}

/// Webcam state as seen by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CameraState {
    #[default]
    Disabled,
    RequestingPermission,
    Enabled,
    PermissionDenied,
}

impl CameraState {
    pub fn is_enabled(&self) -> bool {
        matches!(self, CameraState::Enabled)
    }
}

/// Expressions of the best face in the most recently analyzed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub expressions: ExpressionScores,
    pub face_score: f32,
    pub analyzed_at: DateTime<Utc>,
}

impl DetectionResult {
    pub fn dominant(&self) -> Option<Expression> {
        self.expressions.dominant()
    }
}

/// A detection together with the overlay drawn for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub result: DetectionResult,
    pub overlay: Overlay,
}

/// An open camera and whatever was last detected on it
pub(crate) struct LiveCamera {
    pub stream: Box<dyn VideoStream>,
    pub annotation: Option<Annotation>,
}

/// Camera slot of the panel
///
/// Detections live inside the enabled variant, so turning the camera off
/// cannot leave a stale overlay behind.
pub(crate) enum CameraSlot {
    Disabled,
    Requesting,
    Denied,
    Enabled(LiveCamera),
}

impl CameraSlot {
    pub fn state(&self) -> CameraState {
        match self {
            CameraSlot::Disabled => CameraState::Disabled,
            CameraSlot::Requesting => CameraState::RequestingPermission,
            CameraSlot::Denied => CameraState::PermissionDenied,
            CameraSlot::Enabled(_) => CameraState::Enabled,
        }
    }

    pub fn annotation(&self) -> Option<&Annotation> {
        match self {
            CameraSlot::Enabled(live) => live.annotation.as_ref(),
            _ => None,
        }
    }
}

/// Serializable view of the whole panel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelSnapshot {
    pub model: ModelReadiness,
    pub camera: CameraState,
    pub detection: Option<DetectionResult>,
    pub overlay: Option<Overlay>,
    pub detection_active: bool,
    pub answer_text: String,
    pub context: InterviewContext,
}

/// Events emitted as the panel changes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum PanelEvent {
    ModelReadinessChanged(ModelReadiness),
    CameraStateChanged(CameraState),
    /// A tick finished; `None` means no face was found
    DetectionUpdated(Option<Annotation>),
    AnswerSaved(uuid::Uuid),
}

/// What a single detection tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another inference is still outstanding
    Busy,
    TornDown,
    ModelNotReady,
    CameraNotEnabled,
    NoFrame,
    Detected,
    NoFace,
    /// Inference failed; the previous detection is kept
    Failed,
    /// The camera changed while inferring; the result was dropped
    Discarded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let json =
            serde_json::to_string(&PanelEvent::CameraStateChanged(CameraState::RequestingPermission))
                .unwrap();
        assert_eq!(
            json,
            r#"{"type":"cameraStateChanged","payload":"requestingPermission"}"#
        );
    }

    #[test]
    fn test_only_ready_counts_as_ready() {
        assert!(ModelReadiness::Ready.is_ready());
        assert!(!ModelReadiness::Loading.is_ready());
        assert!(!ModelReadiness::Failed.is_ready());
        assert!(CameraState::Enabled.is_enabled());
        assert!(!CameraState::PermissionDenied.is_enabled());
    }
}
