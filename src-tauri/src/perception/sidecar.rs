//! Detector sidecar
//!
//! Runs the face-expression detector as a child process and talks to it over
//! stdin/stdout. Startup handshake is a single line:
//!
//! ```text
//! <- {"ready": true}
//! ```
//!
//! Each frame is a JSON header line followed by the raw RGBA bytes, answered
//! by one JSON line:
//!
//! ```text
//! -> {"width":640,"height":480,"format":"rgba8","bytes":1228800}\n<bytes>
//! <- {"faces":[{"box":{"x":0.4,"y":0.3,"width":0.2,"height":0.3},"score":0.97,"expressions":{"happy":0.82}}]}
//! ```
//!
//! Either side may instead answer `{"error": "..."}`.

use super::artifacts::ModelArtifacts;
use super::model::{InferenceError, ModelError, PerceptionModel};
use super::types::{ExpressionScores, FaceBox, FaceDetection};
use super::Expression;
use crate::capture::VideoFrame;
use crate::config::DetectorConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

/// Header sent ahead of each frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameHeader {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub bytes: usize,
}

impl FrameHeader {
    pub fn for_frame(frame: &VideoFrame) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            format: "rgba8".to_string(),
            bytes: frame.data.len(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireFace {
    #[serde(rename = "box")]
    bounding_box: FaceBox,
    score: f32,
    expressions: BTreeMap<Expression, f32>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SidecarReply {
    Ready { ready: bool },
    Faces { faces: Vec<WireFace> },
    Error { error: String },
}

fn in_unit_range(value: f32) -> bool {
    (0.0..=1.0).contains(&value)
}

impl TryFrom<WireFace> for FaceDetection {
    type Error = InferenceError;

    fn try_from(face: WireFace) -> Result<Self, Self::Error> {
        if !in_unit_range(face.score) {
            return Err(InferenceError::InvalidOutput(format!(
                "face score {} outside [0, 1]",
                face.score
            )));
        }

        if !face.bounding_box.is_normalized() {
            return Err(InferenceError::InvalidOutput(format!(
                "face box {:?} is not relative to the frame",
                face.bounding_box
            )));
        }

        if let Some((expression, p)) = face.expressions.iter().find(|(_, p)| !in_unit_range(**p)) {
            return Err(InferenceError::InvalidOutput(format!(
                "{expression} probability {p} outside [0, 1]"
            )));
        }

        Ok(FaceDetection {
            bounding_box: face.bounding_box,
            score: face.score,
            expressions: face.expressions.into_iter().collect::<ExpressionScores>(),
        })
    }
}

/// Decode one detector reply line into detections
pub fn parse_reply(line: &str) -> Result<Vec<FaceDetection>, InferenceError> {
    let reply: SidecarReply = serde_json::from_str(line.trim())
        .map_err(|e| InferenceError::Protocol(format!("unreadable reply: {e}")))?;

    match reply {
        SidecarReply::Faces { faces } => faces.into_iter().map(FaceDetection::try_from).collect(),
        SidecarReply::Error { error } => Err(InferenceError::Backend(error)),
        SidecarReply::Ready { .. } => Err(InferenceError::Protocol(
            "unexpected ready message".to_string(),
        )),
    }
}

/// A running detector process
struct SidecarProcess {
    // Held so the process is killed when this is dropped
    _child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl SidecarProcess {
    async fn spawn(config: &DetectorConfig, models_dir: &Path) -> Result<Self, ModelError> {
        let mut child = Command::new(&config.program)
            .args(&config.args)
            .arg("--models")
            .arg(models_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ModelError::Backend(format!("failed to start `{}`: {e}", config.program))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ModelError::Backend("detector stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ModelError::Backend("detector stdout unavailable".to_string()))?;

        let mut process = Self {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout),
        };

        let timeout = config.startup_timeout();
        let line = tokio::time::timeout(timeout, process.read_line())
            .await
            .map_err(|_| ModelError::Timeout(timeout))??;

        match serde_json::from_str::<SidecarReply>(line.trim()) {
            Ok(SidecarReply::Ready { ready: true }) => Ok(process),
            Ok(SidecarReply::Error { error }) => Err(ModelError::Backend(error)),
            _ => Err(ModelError::Backend(format!(
                "unexpected handshake from detector: {}",
                line.trim()
            ))),
        }
    }

    async fn read_line(&mut self) -> std::io::Result<String> {
        let mut line = String::new();
        if self.stdout.read_line(&mut line).await? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "detector closed its output",
            ));
        }
        Ok(line)
    }

    async fn infer(&mut self, frame: &VideoFrame) -> Result<Vec<FaceDetection>, InferenceError> {
        let header = serde_json::to_string(&FrameHeader::for_frame(frame))
            .map_err(|e| InferenceError::Protocol(e.to_string()))?;

        self.stdin.write_all(header.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.write_all(&frame.data).await?;
        self.stdin.flush().await?;

        let line = self.read_line().await?;
        parse_reply(&line)
    }
}

/// Perception model served by an external detector process
pub struct SidecarModel {
    config: DetectorConfig,
    models_dir: parking_lot::Mutex<Option<PathBuf>>,
    process: Mutex<Option<SidecarProcess>>,
}

impl SidecarModel {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            models_dir: parking_lot::Mutex::new(None),
            process: Mutex::new(None),
        }
    }
}

#[async_trait]
impl PerceptionModel for SidecarModel {
    fn name(&self) -> &str {
        &self.config.program
    }

    async fn load(&self, artifacts: &ModelArtifacts) -> Result<(), ModelError> {
        let mut process = self.process.lock().await;
        if process.is_some() {
            return Ok(());
        }

        let manifests = artifacts.verify().await?;
        tracing::info!(
            "Starting detector `{}` with {} networks from {:?}",
            self.config.program,
            manifests.len(),
            artifacts.dir()
        );

        *process = Some(SidecarProcess::spawn(&self.config, artifacts.dir()).await?);
        *self.models_dir.lock() = Some(artifacts.dir().to_path_buf());
        Ok(())
    }

    async fn detect_faces(&self, frame: &VideoFrame) -> Result<Vec<FaceDetection>, InferenceError> {
        let mut slot = self.process.lock().await;

        if slot.is_none() {
            // A previous failure dropped the process; bring it back if we were loaded
            let dir = self
                .models_dir
                .lock()
                .clone()
                .ok_or(InferenceError::NotLoaded)?;
            tracing::warn!("Restarting detector `{}`", self.config.program);
            let restarted = SidecarProcess::spawn(&self.config, &dir)
                .await
                .map_err(|e| InferenceError::Backend(e.to_string()))?;
            *slot = Some(restarted);
        }

        let Some(process) = slot.as_mut() else {
            return Err(InferenceError::NotLoaded);
        };

        let timeout = self.config.inference_timeout();
        match tokio::time::timeout(timeout, process.infer(frame)).await {
            Ok(Ok(faces)) => Ok(faces),
            // A whole reply line was consumed, so the stream is still in step
            Ok(Err(
                e @ (InferenceError::Backend(_)
                | InferenceError::InvalidOutput(_)
                | InferenceError::Protocol(_)),
            )) => Err(e),
            Ok(Err(e)) => {
                *slot = None;
                Err(e)
            }
            Err(_) => {
                *slot = None;
                Err(InferenceError::Timeout(timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_faces_reply() {
        let line = r#"{"faces":[{"box":{"x":0.4,"y":0.3,"width":0.2,"height":0.3},"score":0.97,"expressions":{"happy":0.82,"neutral":0.15}}]}"#;
        let faces = parse_reply(line).unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].score, 0.97);
        assert_eq!(faces[0].expressions.get(Expression::Happy), Some(0.82));
        assert_eq!(faces[0].expressions.get(Expression::Neutral), Some(0.15));
    }

    #[test]
    fn test_parse_empty_faces() {
        assert!(parse_reply("{\"faces\":[]}\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_error_reply() {
        let err = parse_reply(r#"{"error":"backend crashed"}"#).unwrap_err();
        assert!(matches!(err, InferenceError::Backend(m) if m == "backend crashed"));
    }

    #[test]
    fn test_out_of_range_probability_rejected() {
        let line = r#"{"faces":[{"box":{"x":0.1,"y":0.1,"width":0.1,"height":0.1},"score":0.9,"expressions":{"sad":1.4}}]}"#;
        assert!(matches!(
            parse_reply(line),
            Err(InferenceError::InvalidOutput(_))
        ));
    }

    #[test]
    fn test_pixel_box_rejected() {
        let line = r#"{"faces":[{"box":{"x":120,"y":80,"width":64,"height":64},"score":0.9,"expressions":{}}]}"#;
        assert!(matches!(
            parse_reply(line),
            Err(InferenceError::InvalidOutput(_))
        ));
    }

    #[test]
    fn test_garbage_is_protocol_error() {
        assert!(matches!(
            parse_reply("hello"),
            Err(InferenceError::Protocol(_))
        ));
    }

    #[test]
    fn test_frame_header() {
        let frame = VideoFrame::new(4, 2, vec![0u8; 32]);
        let header = FrameHeader::for_frame(&frame);
        assert_eq!(
            serde_json::to_string(&header).unwrap(),
            r#"{"width":4,"height":2,"format":"rgba8","bytes":32}"#
        );
    }

    #[tokio::test]
    async fn test_detect_before_load_is_not_loaded() {
        let model = SidecarModel::new(DetectorConfig::default());
        let frame = VideoFrame::new(1, 1, vec![0u8; 4]);
        assert!(matches!(
            model.detect_faces(&frame).await,
            Err(InferenceError::NotLoaded)
        ));
    }

    #[tokio::test]
    async fn test_load_fails_on_missing_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let model = SidecarModel::new(DetectorConfig::default());
        let err = model
            .load(&ModelArtifacts::face_expression(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingArtifact(_)));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::perception::artifacts::tests::write_face_expression_models;
        use tempfile::TempDir;

        const FACES_LINE: &str = r#"{"faces":[{"box":{"x":0.4,"y":0.3,"width":0.2,"height":0.3},"score":0.97,"expressions":{"happy":0.82}}]}"#;

        /// Shell detector: reads a header, skips the frame bytes, answers once per frame
        fn serve_loop(reply: &str) -> String {
            format!(
                r#"while IFS= read -r header; do
  n=$(printf '%s' "$header" | sed 's/.*"bytes":\([0-9]*\).*/\1/')
  head -c "$n" > /dev/null
  echo '{reply}'
done"#
            )
        }

        /// `sh -c <script> detector --models <dir>`, so the models dir is `$2`
        fn detector(script: String, inference_timeout_ms: u64) -> DetectorConfig {
            DetectorConfig {
                program: "sh".to_string(),
                args: vec!["-c".to_string(), script, "detector".to_string()],
                startup_timeout_ms: 5_000,
                inference_timeout_ms,
            }
        }

        fn models() -> (TempDir, ModelArtifacts) {
            let dir = tempfile::tempdir().unwrap();
            write_face_expression_models(dir.path());
            let artifacts = ModelArtifacts::face_expression(dir.path());
            (dir, artifacts)
        }

        fn frame() -> VideoFrame {
            VideoFrame::new(2, 2, vec![0u8; 16])
        }

        #[tokio::test]
        async fn test_round_trip_through_detector() {
            let (_dir, artifacts) = models();
            let script = format!("echo '{{\"ready\": true}}'\n{}", serve_loop(FACES_LINE));
            let model = SidecarModel::new(detector(script, 5_000));

            model.load(&artifacts).await.unwrap();
            for _ in 0..3 {
                let faces = model.detect_faces(&frame()).await.unwrap();
                assert_eq!(faces.len(), 1);
                assert_eq!(faces[0].expressions.get(Expression::Happy), Some(0.82));
            }
        }

        #[tokio::test]
        async fn test_error_handshake_fails_load() {
            let (_dir, artifacts) = models();
            let model = SidecarModel::new(detector(
                r#"echo '{"error": "weights corrupt"}'"#.to_string(),
                5_000,
            ));

            let err = model.load(&artifacts).await.unwrap_err();
            assert!(matches!(err, ModelError::Backend(m) if m == "weights corrupt"));
            assert!(matches!(
                model.detect_faces(&frame()).await,
                Err(InferenceError::NotLoaded)
            ));
        }

        #[tokio::test]
        async fn test_silent_detector_times_out_on_startup() {
            let (_dir, artifacts) = models();
            let mut config = detector("exec sleep 30".to_string(), 5_000);
            config.startup_timeout_ms = 200;
            let model = SidecarModel::new(config);

            assert!(matches!(
                model.load(&artifacts).await,
                Err(ModelError::Timeout(_))
            ));
        }

        #[tokio::test]
        async fn test_backend_error_keeps_detector_running() {
            let (dir, artifacts) = models();
            let script = format!(
                "echo '{{\"ready\": true}}'\necho started >> \"$2/starts\"\n{}",
                serve_loop(r#"{"error": "no tensor"}"#)
            );
            let model = SidecarModel::new(detector(script, 5_000));

            model.load(&artifacts).await.unwrap();
            for _ in 0..2 {
                assert!(matches!(
                    model.detect_faces(&frame()).await,
                    Err(InferenceError::Backend(_))
                ));
            }

            let starts = std::fs::read_to_string(dir.path().join("starts")).unwrap();
            assert_eq!(starts.lines().count(), 1);
        }

        #[tokio::test]
        async fn test_garbled_reply_keeps_detector_running() {
            let (dir, artifacts) = models();
            let script = format!(
                "echo '{{\"ready\": true}}'\necho started >> \"$2/starts\"\n{}",
                serve_loop("not json")
            );
            let model = SidecarModel::new(detector(script, 5_000));

            model.load(&artifacts).await.unwrap();
            for _ in 0..2 {
                assert!(matches!(
                    model.detect_faces(&frame()).await,
                    Err(InferenceError::Protocol(_))
                ));
            }

            let starts = std::fs::read_to_string(dir.path().join("starts")).unwrap();
            assert_eq!(starts.lines().count(), 1);
        }

        #[tokio::test]
        async fn test_stalled_inference_respawns_detector() {
            let (_dir, artifacts) = models();
            // The first process never answers a frame; later ones do
            let script = format!(
                "echo '{{\"ready\": true}}'\nif [ ! -e \"$2/stalled\" ]; then : > \"$2/stalled\"; exec sleep 30; fi\n{}",
                serve_loop(FACES_LINE)
            );
            let model = SidecarModel::new(detector(script, 500));

            model.load(&artifacts).await.unwrap();
            assert!(matches!(
                model.detect_faces(&frame()).await,
                Err(InferenceError::Timeout(_))
            ));

            let faces = model.detect_faces(&frame()).await.unwrap();
            assert_eq!(faces.len(), 1);
        }
    }
}
