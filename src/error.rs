//! Custom error types for the application

use thiserror::Error;

/// Application-specific error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Audio device related errors
    #[error("Audio device error: {0}")]
    AudioDevice(String),
    /// Audio stream related errors
    #[error("Audio stream error: {0}")]
    AudioStream(String),
    /// Settings could not be located or stored
    #[error("Settings error: {0}")]
    Settings(String),
    /// Notification could not be delivered
    #[error("Notification error: {0}")]
    Notification(String),
    /// Interactive prompt failed
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Settings (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<cpal::DevicesError> for AppError {
    fn from(err: cpal::DevicesError) -> Self {
        AppError::AudioDevice(format!("Failed to enumerate devices: {}", err))
    }
}

impl From<cpal::DeviceNameError> for AppError {
    fn from(err: cpal::DeviceNameError) -> Self {
        AppError::AudioDevice(format!("Failed to get device name: {}", err))
    }
}

impl From<cpal::DefaultStreamConfigError> for AppError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        AppError::AudioDevice(format!("Failed to get default stream config: {}", err))
    }
}

impl From<cpal::SupportedStreamConfigsError> for AppError {
    fn from(err: cpal::SupportedStreamConfigsError) -> Self {
        AppError::AudioDevice(format!("Failed to get supported stream configs: {}", err))
    }
}

impl From<cpal::BuildStreamError> for AppError {
    fn from(err: cpal::BuildStreamError) -> Self {
        AppError::AudioStream(format!("Failed to build audio stream: {}", err))
    }
}

impl From<cpal::PlayStreamError> for AppError {
    fn from(err: cpal::PlayStreamError) -> Self {
        AppError::AudioStream(format!("Failed to play audio stream: {}", err))
    }
}

impl From<cpal::PauseStreamError> for AppError {
    fn from(err: cpal::PauseStreamError) -> Self {
        AppError::AudioStream(format!("Failed to pause audio stream: {}", err))
    }
}

impl From<dialoguer::Error> for AppError {
    fn from(err: dialoguer::Error) -> Self {
        AppError::Prompt(err.to_string())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = AppError::AudioDevice("Specified device not found".to_string());
        assert_eq!(err.to_string(), "Audio device error: Specified device not found");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: AppError = io.into();
        assert!(matches!(err, AppError::Io(_)));
        assert!(err.to_string().starts_with("I/O error"));
    }
}
