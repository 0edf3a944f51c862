//! Face-expression perception
//!
//! The panel only sees the `PerceptionModel` trait. The shipped model drives
//! an external detector process that loads the tiny face detector and the
//! face expression net from a model directory.

pub mod artifacts;
pub mod model;
pub mod sidecar;
pub mod types;

pub use artifacts::{ModelArtifacts, WeightsManifest};
pub use model::{InferenceError, ModelError, PerceptionModel};
pub use sidecar::SidecarModel;
pub use types::{best_face, Expression, ExpressionScores, FaceBox, FaceDetection, PixelBox};
