//! Panel configuration
//!
//! Every field has a default, so a config file only needs the keys it
//! overrides. The file is JSON and uses camelCase keys like the rest of the
//! IPC surface.

use crate::utils::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "INTERVIEW_PANEL_CONFIG";

/// Top-level configuration for the record-answer panel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PanelConfig {
    /// Directory holding the face detector and expression net weights
    pub model_dir: PathBuf,

    /// Period of the detection loop in milliseconds
    pub detection_interval_ms: u64,

    /// Expressions below this confidence are left off the overlay
    pub min_expression_confidence: f32,

    /// Root directory for saved answers
    pub answers_dir: PathBuf,

    /// Clear the answer buffer after a successful save
    pub clear_answer_on_save: bool,

    /// Webcam settings
    pub camera: CameraConfig,

    /// Perception sidecar settings
    pub detector: DetectorConfig,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            detection_interval_ms: 1000,
            min_expression_confidence: 0.1,
            answers_dir: PathBuf::from("answers"),
            clear_answer_on_save: false,
            camera: CameraConfig::default(),
            detector: DetectorConfig::default(),
        }
    }
}

impl PanelConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PanelConfig = serde_json::from_str(&content)?;
        config.validate()?;

        tracing::debug!("Loaded panel config from {:?}", path);
        Ok(config)
    }

    /// Load from the file named by `INTERVIEW_PANEL_CONFIG`, or fall back to defaults
    pub fn from_env() -> AppResult<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> AppResult<()> {
        if self.detection_interval_ms == 0 {
            return Err(AppError::Config(
                "detectionIntervalMs must be greater than zero".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.min_expression_confidence) {
            return Err(AppError::Config(format!(
                "minExpressionConfidence must be within [0, 1], got {}",
                self.min_expression_confidence
            )));
        }

        if self.camera.width == 0 || self.camera.height == 0 || self.camera.fps == 0 {
            return Err(AppError::Config(
                "camera width, height and fps must be greater than zero".to_string(),
            ));
        }

        if self.detector.startup_timeout_ms == 0 || self.detector.inference_timeout_ms == 0 {
            return Err(AppError::Config(
                "detector startupTimeoutMs and inferenceTimeoutMs must be greater than zero"
                    .to_string(),
            ));
        }

        Ok(())
    }

    pub fn detection_interval(&self) -> Duration {
        Duration::from_millis(self.detection_interval_ms)
    }
}

/// Webcam capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CameraConfig {
    /// Device ID/index to capture from (None = first camera)
    pub device_id: Option<String>,

    /// Requested capture width
    pub width: u32,

    /// Requested capture height
    pub height: u32,

    /// Requested capture FPS
    pub fps: u32,

    /// Whether the preview is shown mirrored
    pub mirrored: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            width: 1280,
            height: 720,
            fps: 30,
            mirrored: true,
        }
    }
}

/// Settings for the external face-expression detector process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectorConfig {
    /// Program to spawn
    pub program: String,

    /// Extra arguments, placed before `--models <dir>`
    pub args: Vec<String>,

    /// How long to wait for the ready handshake
    pub startup_timeout_ms: u64,

    /// How long a single frame may take
    pub inference_timeout_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            program: "face-expression-detector".to_string(),
            args: Vec::new(),
            startup_timeout_ms: 30_000,
            inference_timeout_ms: 5_000,
        }
    }
}

impl DetectorConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_panel_behaviour() {
        let config = PanelConfig::default();
        assert_eq!(config.detection_interval(), Duration::from_secs(1));
        assert_eq!(config.model_dir, PathBuf::from("models"));
        assert!(config.camera.mirrored);
        assert!(!config.clear_answer_on_save);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("panel.json");
        std::fs::write(
            &path,
            r#"{ "detectionIntervalMs": 250, "camera": { "deviceId": "2" } }"#,
        )
        .unwrap();

        let config = PanelConfig::load(&path).unwrap();
        assert_eq!(config.detection_interval_ms, 250);
        assert_eq!(config.camera.device_id.as_deref(), Some("2"));
        assert_eq!(config.camera.width, 1280);
        assert_eq!(config.detector.program, "face-expression-detector");
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("panel.json");
        std::fs::write(&path, r#"{ "detectionIntervalMs": 0 }"#).unwrap();

        assert!(matches!(PanelConfig::load(&path), Err(AppError::Config(_))));
    }

    #[test]
    fn test_confidence_out_of_range_is_rejected() {
        let config = PanelConfig {
            min_expression_confidence: 1.5,
            ..PanelConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_detector_timeouts_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("panel.json");

        std::fs::write(&path, r#"{ "detector": { "inferenceTimeoutMs": 0 } }"#).unwrap();
        assert!(matches!(PanelConfig::load(&path), Err(AppError::Config(_))));

        std::fs::write(&path, r#"{ "detector": { "startupTimeoutMs": 0 } }"#).unwrap();
        assert!(matches!(PanelConfig::load(&path), Err(AppError::Config(_))));
    }
}
