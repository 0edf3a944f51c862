//! Perception model contract
//!
//! The panel treats face detection and expression classification as a black
//! box with two calls: load the weights once, then analyze frames.

use super::artifacts::ModelArtifacts;
use super::types::FaceDetection;
use crate::capture::VideoFrame;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Model loading errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing model artifact: {0}")]
    MissingArtifact(PathBuf),

    #[error("Invalid weights manifest {path}: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("Model backend error: {0}")]
    Backend(String),

    #[error("Model did not become ready within {0:?}")]
    Timeout(Duration),
}

/// Per-frame inference errors
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Model is not loaded")]
    NotLoaded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Detector error: {0}")]
    Backend(String),

    #[error("Invalid detector output: {0}")]
    InvalidOutput(String),

    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),
}

/// Face detection + expression classification capability
#[async_trait]
pub trait PerceptionModel: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Load every artifact the model needs
    async fn load(&self, artifacts: &ModelArtifacts) -> Result<(), ModelError>;

    /// Detect faces and classify their expressions; may return no faces
    async fn detect_faces(&self, frame: &VideoFrame) -> Result<Vec<FaceDetection>, InferenceError>;
}
