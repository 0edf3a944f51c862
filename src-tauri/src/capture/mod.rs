//! Webcam capture
//!
//! The panel talks to cameras only through `MediaService` and `VideoStream`.
//! The native backend is built on nokhwa and sits behind the
//! `native-camera` feature.

pub mod traits;

#[cfg(feature = "native-camera")]
pub mod webcam;

pub use traits::{
    CameraError, CameraInfo, MediaService, Resolution, VideoFrame, VideoStream,
    RGBA_BYTES_PER_PIXEL,
};

#[cfg(feature = "native-camera")]
pub use webcam::{get_cameras, NokhwaMediaService};
