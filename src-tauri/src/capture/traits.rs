//! Capture trait definitions
//!
//! Platform-agnostic traits for the webcam source.

use crate::config::CameraConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Bytes per pixel of an RGBA8 frame
pub const RGBA_BYTES_PER_PIXEL: usize = 4;

/// Information about a camera/webcam
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,

    /// Supported resolutions
    pub supported_resolutions: Vec<Resolution>,
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// A single decoded video frame in RGBA8 layout
///
/// Pixel data is shared, so cloning a frame out of the capture thread is cheap.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            data: data.into(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Whether the frame has pixels and its buffer matches its dimensions
    pub fn is_decodable(&self) -> bool {
        let expected = self.width as usize * self.height as usize * RGBA_BYTES_PER_PIXEL;
        expected > 0 && self.data.len() == expected
    }
}

/// Camera acquisition errors
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("Camera not found: {0}")]
    DeviceNotFound(String),

    #[error("Camera device error: {0}")]
    Device(String),
}

/// Grants access to video streams
#[async_trait]
pub trait MediaService: Send + Sync {
    /// Request permission and open a stream for the configured device
    async fn request_video_stream(
        &self,
        config: &CameraConfig,
    ) -> Result<Box<dyn VideoStream>, CameraError>;

    /// List the cameras this service can open
    fn cameras(&self) -> Vec<CameraInfo> {
        Vec::new()
    }
}

/// An open video stream
///
/// Dropping or stopping the stream releases the device.
pub trait VideoStream: Send {
    /// Most recent decoded frame, if the device has delivered one yet
    fn latest_frame(&self) -> Option<VideoFrame>;

    /// Native resolution of the stream
    fn resolution(&self) -> Resolution;

    /// Stop capturing and release the device; returns once it is released
    fn stop(&mut self);

    fn is_active(&self) -> bool;
}
