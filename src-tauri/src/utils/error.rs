//! Error types and handling
//!
//! Application-level error type that the subsystem errors fold into, plus the
//! serializable form handed to the frontend.

use crate::answer::PersistenceError;
use crate::capture::CameraError;
use crate::perception::ModelError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Error response for frontend
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Model(_) => "MODEL_ERROR",
            AppError::Camera(CameraError::PermissionDenied(_)) => "PERMISSION_DENIED",
            AppError::Camera(_) => "CAMERA_ERROR",
            AppError::Persistence(_) => "PERSISTENCE_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

impl From<PersistenceError> for ErrorResponse {
    fn from(error: PersistenceError) -> Self {
        AppError::from(error).into()
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_has_its_own_code() {
        let response: ErrorResponse =
            AppError::Camera(CameraError::PermissionDenied("blocked".into())).into();
        assert_eq!(response.code, "PERMISSION_DENIED");
        assert!(response.message.contains("blocked"));

        let response: ErrorResponse =
            AppError::Camera(CameraError::Device("unplugged".into())).into();
        assert_eq!(response.code, "CAMERA_ERROR");
    }

    #[test]
    fn test_config_error_code() {
        let response: ErrorResponse = AppError::Config("bad interval".into()).into();
        assert_eq!(response.code, "CONFIG_ERROR");
        assert_eq!(response.message, "Configuration error: bad interval");
    }
}
