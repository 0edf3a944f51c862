//! Webcam capture using nokhwa
//!
//! The camera is opened and polled on a dedicated thread. Decoded RGBA frames
//! replace a single shared slot, so readers always see the newest frame and
//! nothing queues up behind a slow detector.

use crate::capture::traits::{
    CameraError, CameraInfo, MediaService, Resolution, VideoFrame, VideoStream,
};
use crate::config::CameraConfig;
use async_trait::async_trait;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution as NokhwaResolution,
};
use nokhwa::{Camera, NokhwaError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Get list of available cameras
pub fn get_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| {
                let id = match info.index() {
                    CameraIndex::Index(i) => i.to_string(),
                    CameraIndex::String(s) => s.to_string(),
                };

                // Common resolutions
                let resolutions = vec![
                    Resolution::new(1920, 1080),
                    Resolution::new(1280, 720),
                    Resolution::new(640, 480),
                ];

                CameraInfo {
                    id,
                    name: info.human_name().to_string(),
                    supported_resolutions: resolutions,
                }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

/// Get camera index from a configured device id
fn camera_index(device_id: Option<&str>) -> CameraIndex {
    match device_id {
        Some(id) => match id.parse::<u32>() {
            Ok(idx) => CameraIndex::Index(idx),
            Err(_) => CameraIndex::String(id.to_string()),
        },
        None => CameraIndex::Index(0),
    }
}

fn classify_error(error: NokhwaError) -> CameraError {
    let message = error.to_string();
    if message.to_lowercase().contains("permission") {
        CameraError::PermissionDenied(message)
    } else {
        CameraError::Device(message)
    }
}

/// Ask the OS for camera access; resolves immediately where no prompt exists
async fn ensure_permission() -> Result<(), CameraError> {
    if nokhwa::nokhwa_check() {
        return Ok(());
    }

    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));
    nokhwa::nokhwa_initialize(move |granted| {
        if let Some(tx) = tx.lock().take() {
            let _ = tx.send(granted);
        }
    });

    match rx.await {
        Ok(true) => Ok(()),
        Ok(false) => Err(CameraError::PermissionDenied(
            "camera access was not granted".to_string(),
        )),
        Err(_) => Err(CameraError::Device(
            "permission prompt closed without an answer".to_string(),
        )),
    }
}

/// Opens webcam streams through nokhwa
#[derive(Debug, Default, Clone, Copy)]
pub struct NokhwaMediaService;

impl NokhwaMediaService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaService for NokhwaMediaService {
    async fn request_video_stream(
        &self,
        config: &CameraConfig,
    ) -> Result<Box<dyn VideoStream>, CameraError> {
        ensure_permission().await?;

        if get_cameras().is_empty() {
            return Err(CameraError::DeviceNotFound("No cameras found".to_string()));
        }

        let stream = NokhwaStream::open(config).await?;
        Ok(Box::new(stream))
    }

    fn cameras(&self) -> Vec<CameraInfo> {
        get_cameras()
    }
}

/// Live stream backed by a capture thread
pub struct NokhwaStream {
    running: Arc<AtomicBool>,
    latest: Arc<Mutex<Option<VideoFrame>>>,
    resolution: Resolution,
    capture_thread: Option<std::thread::JoinHandle<()>>,
}

impl NokhwaStream {
    async fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        let index = camera_index(config.device_id.as_deref());
        let requested = CameraFormat::new(
            NokhwaResolution::new(config.width, config.height),
            FrameFormat::MJPEG,
            config.fps,
        );

        let running = Arc::new(AtomicBool::new(true));
        let latest = Arc::new(Mutex::new(None));
        let (opened_tx, opened_rx) = oneshot::channel::<Result<Resolution, CameraError>>();

        let thread_running = running.clone();
        let thread_latest = latest.clone();

        // The camera handle never leaves this thread
        let handle = std::thread::spawn(move || {
            let format =
                RequestedFormat::new::<RgbAFormat>(RequestedFormatType::Closest(requested));

            let mut camera = match Camera::new(index.clone(), format) {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!("Failed to open camera {:?}: {:?}", index, e);
                    let _ = opened_tx.send(Err(classify_error(e)));
                    return;
                }
            };

            if let Err(e) = camera.open_stream() {
                tracing::error!("Failed to open camera stream: {:?}", e);
                let _ = opened_tx.send(Err(classify_error(e)));
                return;
            }

            let camera_format = camera.camera_format();
            let native = Resolution::new(
                camera_format.resolution().width(),
                camera_format.resolution().height(),
            );

            tracing::info!(
                "Webcam opened: {}x{} @ {}fps, format={:?}",
                native.width,
                native.height,
                camera_format.frame_rate(),
                camera_format.format()
            );

            if opened_tx.send(Ok(native)).is_err() {
                // Requester went away before the stream was handed over
                let _ = camera.stop_stream();
                return;
            }

            let mut frame_count: u64 = 0;
            while thread_running.load(Ordering::SeqCst) {
                // Blocks until the camera delivers the next frame
                let decoded = camera
                    .frame()
                    .and_then(|buffer| buffer.decode_image::<RgbAFormat>());

                match decoded {
                    Ok(image) => {
                        let (width, height) = (image.width(), image.height());
                        let frame = VideoFrame::new(width, height, image.into_raw());
                        *thread_latest.lock() = Some(frame);
                        frame_count += 1;
                    }
                    Err(e) => {
                        tracing::debug!("Failed to capture frame: {:?}", e);
                    }
                }
            }

            if let Err(e) = camera.stop_stream() {
                tracing::warn!("Error stopping camera stream: {:?}", e);
            }
            thread_latest.lock().take();

            tracing::info!("Webcam capture thread stopped after {} frames", frame_count);
        });

        let resolution = match opened_rx.await {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(CameraError::Device(
                    "capture thread exited before opening the camera".to_string(),
                ));
            }
        };

        Ok(Self {
            running,
            latest,
            resolution,
            capture_thread: Some(handle),
        })
    }
}

impl VideoStream for NokhwaStream {
    fn latest_frame(&self) -> Option<VideoFrame> {
        self.latest.lock().clone()
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        // Wait for the capture thread so the device is released on return
        if let Some(handle) = self.capture_thread.take() {
            let _ = handle.join();
            tracing::info!("Webcam capture stopped");
        }
    }

    fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for NokhwaStream {
    fn drop(&mut self) {
        self.stop();
    }
}
