//! Record-answer panel
//!
//! Owns the model lifecycle, the webcam, the detection loop and the answer
//! buffer for one interview session. All state sits behind a single mutex
//! that is never held across an `.await`; every change re-evaluates whether
//! the detection loop should be running.

use super::overlay::Overlay;
use super::scheduler::{BusyFlag, BusyGuard, DetectionLoop};
use super::state::{
    Annotation, CameraSlot, CameraState, DetectionResult, LiveCamera, ModelReadiness,
    PanelEvent, PanelSnapshot, TickOutcome,
};
use crate::answer::{AnswerRecord, AnswerStore, InterviewContext, PersistenceError};
use crate::capture::{CameraError, CameraInfo, MediaService};
use crate::config::PanelConfig;
use crate::notify::Notifier;
use crate::perception::{best_face, ModelArtifacts, ModelError, PerceptionModel};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub const MODELS_LOADED: &str = "Face detection models loaded successfully";
pub const MODELS_FAILED: &str = "Failed to load face detection models";
pub const WEBCAM_ENABLED: &str = "Webcam enabled";
pub const WEBCAM_FAILED: &str = "Failed to access webcam";
pub const WEBCAM_DENIED: &str = "Webcam permission denied";
pub const ANSWER_SAVED: &str = "Answer saved!";
pub const ANSWER_FAILED: &str = "Failed to save answer";

/// External collaborators of the panel
#[derive(Clone)]
pub struct PanelServices {
    pub model: Arc<dyn PerceptionModel>,
    pub media: Arc<dyn MediaService>,
    pub notifier: Arc<dyn Notifier>,
    pub store: Arc<dyn AnswerStore>,
}

struct PanelState {
    readiness: ModelReadiness,
    camera: CameraSlot,
    answer: String,
    context: InterviewContext,
    load_task: Option<JoinHandle<()>>,
    detection_loop: Option<DetectionLoop>,
    /// Bumped whenever the camera or loop changes, so late ticks can tell
    generation: u64,
    torn_down: bool,
}

struct PanelInner {
    config: PanelConfig,
    services: PanelServices,
    state: Mutex<PanelState>,
    busy: BusyFlag,
    event_tx: broadcast::Sender<PanelEvent>,
}

impl PanelInner {
    fn emit(&self, event: PanelEvent) {
        let _ = self.event_tx.send(event);
    }
}

impl Drop for PanelInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(detection) = state.detection_loop.take() {
            detection.cancel();
        }
        if let Some(task) = state.load_task.take() {
            task.abort();
        }
        if let CameraSlot::Enabled(mut live) =
            std::mem::replace(&mut state.camera, CameraSlot::Disabled)
        {
            live.stream.stop();
        }
    }
}

/// Handle to the panel; clones share the same session
#[derive(Clone)]
pub struct RecordAnswerPanel {
    inner: Arc<PanelInner>,
}

impl RecordAnswerPanel {
    pub fn new(config: PanelConfig, services: PanelServices) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            inner: Arc::new(PanelInner {
                config,
                services,
                state: Mutex::new(PanelState {
                    readiness: ModelReadiness::NotLoaded,
                    camera: CameraSlot::Disabled,
                    answer: String::new(),
                    context: InterviewContext::default(),
                    load_task: None,
                    detection_loop: None,
                    generation: 0,
                    torn_down: false,
                }),
                busy: BusyFlag::new(),
                event_tx,
            }),
        }
    }

    /// Subscribe to panel events
    pub fn subscribe(&self) -> broadcast::Receiver<PanelEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn model_readiness(&self) -> ModelReadiness {
        self.inner.state.lock().readiness
    }

    pub fn camera_state(&self) -> CameraState {
        self.inner.state.lock().camera.state()
    }

    /// Latest detection, present only while the camera is on and the model ready
    pub fn detection(&self) -> Option<DetectionResult> {
        self.inner
            .state
            .lock()
            .camera
            .annotation()
            .map(|a| a.result.clone())
    }

    pub fn is_detection_active(&self) -> bool {
        self.inner.state.lock().detection_loop.is_some()
    }

    pub fn snapshot(&self) -> PanelSnapshot {
        let state = self.inner.state.lock();
        let annotation = state.camera.annotation();
        PanelSnapshot {
            model: state.readiness,
            camera: state.camera.state(),
            detection: annotation.map(|a| a.result.clone()),
            overlay: annotation.map(|a| a.overlay.clone()),
            detection_active: state.detection_loop.is_some(),
            answer_text: state.answer.clone(),
            context: state.context.clone(),
        }
    }

    pub fn cameras(&self) -> Vec<CameraInfo> {
        self.inner.services.media.cameras()
    }

    /// Start loading the model in the background
    ///
    /// Only the first call in a session starts a load; later calls return
    /// `false`. Must be called from within a tokio runtime.
    pub fn initialize(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.torn_down || state.readiness != ModelReadiness::NotLoaded {
            tracing::debug!("Model load already requested ({:?})", state.readiness);
            return false;
        }

        state.readiness = ModelReadiness::Loading;
        self.inner
            .emit(PanelEvent::ModelReadinessChanged(ModelReadiness::Loading));

        tracing::info!(
            "Loading {} models from {:?}",
            self.inner.services.model.name(),
            self.inner.config.model_dir
        );

        let model = self.inner.services.model.clone();
        let artifacts = ModelArtifacts::face_expression(&self.inner.config.model_dir);
        let weak = Arc::downgrade(&self.inner);
        state.load_task = Some(tokio::spawn(async move {
            let result = model.load(&artifacts).await;
            match weak.upgrade() {
                Some(inner) => RecordAnswerPanel { inner }.finish_load(result),
                None => tracing::debug!("Panel dropped during model load, discarding result"),
            }
        }));
        true
    }

    fn finish_load(&self, result: Result<(), ModelError>) {
        {
            let mut state = self.inner.state.lock();
            state.load_task = None;
            if state.torn_down {
                tracing::debug!("Panel torn down during model load, discarding result");
                return;
            }

            state.readiness = match &result {
                Ok(()) => ModelReadiness::Ready,
                Err(_) => ModelReadiness::Failed,
            };
            self.inner
                .emit(PanelEvent::ModelReadinessChanged(state.readiness));
            self.reconcile(&mut state);
        }

        match result {
            Ok(()) => {
                tracing::info!("Models ready");
                self.inner.services.notifier.notify_success(MODELS_LOADED);
            }
            Err(e) => {
                tracing::error!("Model loading error: {}", e);
                self.inner.services.notifier.notify_failure(MODELS_FAILED);
            }
        }
    }

    /// Turn the webcam on or off, returning the resulting state
    ///
    /// Turning it off stops detection and releases the device before
    /// returning. A toggle while a permission request is pending is ignored.
    pub async fn toggle_camera(&self) -> CameraState {
        {
            let mut state = self.inner.state.lock();
            if state.torn_down {
                return state.camera.state();
            }

            match state.camera.state() {
                CameraState::Enabled => {
                    let live = self.take_camera(&mut state);
                    drop(state);
                    if let Some(mut live) = live {
                        live.stream.stop();
                    }
                    tracing::info!("Webcam disabled");
                    return CameraState::Disabled;
                }
                CameraState::RequestingPermission => {
                    tracing::debug!("Camera permission request already pending");
                    return CameraState::RequestingPermission;
                }
                CameraState::Disabled | CameraState::PermissionDenied => {
                    state.camera = CameraSlot::Requesting;
                    self.inner.emit(PanelEvent::CameraStateChanged(
                        CameraState::RequestingPermission,
                    ));
                }
            }
        }

        let result = self
            .inner
            .services
            .media
            .request_video_stream(&self.inner.config.camera)
            .await;

        let mut state = self.inner.state.lock();
        if state.torn_down {
            drop(state);
            if let Ok(mut stream) = result {
                stream.stop();
            }
            return CameraState::Disabled;
        }

        match result {
            Ok(stream) => {
                let resolution = stream.resolution();
                state.camera = CameraSlot::Enabled(LiveCamera {
                    stream,
                    annotation: None,
                });
                state.generation += 1;
                self.inner
                    .emit(PanelEvent::CameraStateChanged(CameraState::Enabled));
                self.reconcile(&mut state);
                drop(state);

                tracing::info!(
                    "Webcam enabled at {}x{}",
                    resolution.width,
                    resolution.height
                );
                self.inner.services.notifier.notify_success(WEBCAM_ENABLED);
                CameraState::Enabled
            }
            Err(CameraError::PermissionDenied(reason)) => {
                state.camera = CameraSlot::Denied;
                self.inner
                    .emit(PanelEvent::CameraStateChanged(CameraState::PermissionDenied));
                drop(state);

                tracing::warn!("Webcam access error: {}", reason);
                self.inner.services.notifier.notify_failure(WEBCAM_DENIED);
                CameraState::PermissionDenied
            }
            Err(e) => {
                state.camera = CameraSlot::Disabled;
                self.inner
                    .emit(PanelEvent::CameraStateChanged(CameraState::Disabled));
                drop(state);

                tracing::warn!("Webcam access error: {}", e);
                self.inner.services.notifier.notify_failure(WEBCAM_FAILED);
                CameraState::Disabled
            }
        }
    }

    /// Take the open camera out of the panel, stopping detection with it
    fn take_camera(&self, state: &mut PanelState) -> Option<LiveCamera> {
        let previous = std::mem::replace(&mut state.camera, CameraSlot::Disabled);
        state.generation += 1;
        self.reconcile(state);

        if previous.state() != CameraState::Disabled {
            self.inner
                .emit(PanelEvent::CameraStateChanged(CameraState::Disabled));
        }

        match previous {
            CameraSlot::Enabled(live) => {
                if live.annotation.is_some() {
                    self.inner.emit(PanelEvent::DetectionUpdated(None));
                }
                Some(live)
            }
            _ => None,
        }
    }

    /// Start or stop the detection loop to match the current state
    fn reconcile(&self, state: &mut PanelState) {
        let should_run =
            !state.torn_down && state.readiness.is_ready() && state.camera.state().is_enabled();

        if should_run && state.detection_loop.is_none() {
            state.generation += 1;
            let generation = state.generation;
            let weak: Weak<PanelInner> = Arc::downgrade(&self.inner);

            state.detection_loop = Some(DetectionLoop::spawn(
                self.inner.config.detection_interval(),
                self.inner.busy.clone(),
                move |guard| {
                    let weak = weak.clone();
                    async move {
                        if let Some(inner) = weak.upgrade() {
                            let panel = RecordAnswerPanel { inner };
                            panel.detect(guard, Some(generation)).await;
                        }
                    }
                },
            ));
            tracing::info!(
                "Detection loop started ({}ms)",
                self.inner.config.detection_interval_ms
            );
        } else if !should_run {
            if let Some(detection) = state.detection_loop.take() {
                detection.cancel();
                state.generation += 1;
                tracing::info!("Detection loop stopped");
            }
        }
    }

    /// Run one detection pass now
    ///
    /// Does nothing unless the model is ready, the camera is on and a frame
    /// is available; skips if another inference is still outstanding.
    pub async fn run_detection_tick(&self) -> TickOutcome {
        match self.inner.busy.try_acquire() {
            Some(guard) => self.detect(guard, None).await,
            None => TickOutcome::Busy,
        }
    }

    async fn detect(&self, _guard: BusyGuard, loop_generation: Option<u64>) -> TickOutcome {
        let (frame, resolution, generation) = {
            let state = self.inner.state.lock();
            if state.torn_down {
                return TickOutcome::TornDown;
            }
            if !state.readiness.is_ready() {
                return TickOutcome::ModelNotReady;
            }
            let CameraSlot::Enabled(live) = &state.camera else {
                return TickOutcome::CameraNotEnabled;
            };
            if loop_generation.is_some_and(|g| g != state.generation) {
                return TickOutcome::Discarded;
            }
            let Some(frame) = live.stream.latest_frame().filter(|f| f.is_decodable()) else {
                return TickOutcome::NoFrame;
            };
            (frame, live.stream.resolution(), state.generation)
        };

        let result = self.inner.services.model.detect_faces(&frame).await;

        let mut state = self.inner.state.lock();
        if state.torn_down || state.generation != generation {
            tracing::debug!("Camera changed during inference, dropping result");
            return TickOutcome::Discarded;
        }
        let CameraSlot::Enabled(live) = &mut state.camera else {
            return TickOutcome::Discarded;
        };

        match result {
            Err(e) => {
                tracing::error!("Emotion detection error: {}", e);
                TickOutcome::Failed
            }
            Ok(faces) => match best_face(&faces) {
                Some(face) => {
                    let annotation = Annotation {
                        result: DetectionResult {
                            expressions: face.expressions.clone(),
                            face_score: face.score,
                            analyzed_at: Utc::now(),
                        },
                        overlay: Overlay::compose(
                            face,
                            resolution,
                            self.inner.config.min_expression_confidence,
                            self.inner.config.camera.mirrored,
                        ),
                    };
                    tracing::debug!(
                        "Detected {} face(s), dominant expression {:?}",
                        faces.len(),
                        annotation.result.dominant()
                    );
                    live.annotation = Some(annotation.clone());
                    self.inner
                        .emit(PanelEvent::DetectionUpdated(Some(annotation)));
                    TickOutcome::Detected
                }
                None => {
                    live.annotation = None;
                    self.inner.emit(PanelEvent::DetectionUpdated(None));
                    TickOutcome::NoFace
                }
            },
        }
    }

    /// Replace the answer buffer
    pub fn set_answer_text(&self, text: impl Into<String>) {
        self.inner.state.lock().answer = text.into();
    }

    pub fn answer_text(&self) -> String {
        self.inner.state.lock().answer.clone()
    }

    /// Set the question the answer belongs to
    pub fn set_interview_context(&self, context: InterviewContext) {
        self.inner.state.lock().context = context;
    }

    /// Hand the current answer to the store
    ///
    /// Works regardless of camera or model state.
    pub async fn save_answer(&self) -> Result<AnswerRecord, PersistenceError> {
        let record = {
            let state = self.inner.state.lock();
            AnswerRecord::new(
                &state.context,
                state.answer.clone(),
                state.camera.annotation().map(|a| a.result.expressions.clone()),
            )
        };

        match self.inner.services.store.save(&record).await {
            Ok(()) => {
                if self.inner.config.clear_answer_on_save {
                    let mut state = self.inner.state.lock();
                    // Keep anything typed while the save was in flight
                    if state.answer == record.answer {
                        state.answer.clear();
                    }
                }

                tracing::info!(
                    "Answer saved for question {} ({} chars)",
                    record.question_index,
                    record.answer.chars().count()
                );
                self.inner.emit(PanelEvent::AnswerSaved(record.id));
                self.inner.services.notifier.notify_success(ANSWER_SAVED);
                Ok(record)
            }
            Err(e) => {
                tracing::error!("Failed to save answer: {}", e);
                self.inner.services.notifier.notify_failure(ANSWER_FAILED);
                Err(e)
            }
        }
    }

    /// Tear the session down: stop detection, release the camera and drop
    /// any pending model load
    pub fn shutdown(&self) {
        let live = {
            let mut state = self.inner.state.lock();
            if state.torn_down {
                return;
            }
            state.torn_down = true;

            if let Some(task) = state.load_task.take() {
                task.abort();
            }
            self.take_camera(&mut state)
        };

        if let Some(mut live) = live {
            live.stream.stop();
        }
        tracing::info!("Record-answer panel shut down");
    }
}
