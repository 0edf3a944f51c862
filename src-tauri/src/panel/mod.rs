//! Record-answer panel
//!
//! This module implements the emotion-annotated answer panel:
//! - ModelReadiness / CameraState state machine
//! - DetectionLoop, a skip-if-busy fixed-interval scheduler
//! - Overlay layout for the best detected face
//! - RecordAnswerPanel, which ties them to the collaborators

pub mod overlay;
pub mod scheduler;
pub mod session;
pub mod state;


pub use overlay::Overlay;
pub use session::{PanelServices, RecordAnswerPanel};
pub use state::{
    Annotation, CameraState, DetectionResult, ModelReadiness, PanelEvent, PanelSnapshot,
    TickOutcome,
};
