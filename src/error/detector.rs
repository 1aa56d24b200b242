// Detector error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Detector error code constants
///
/// Error code range: 1001-1006
pub struct DetectorErrorCodes {}

impl DetectorErrorCodes {
    /// Audio tap attach failed for a reason other than a missing source
    pub const SETUP_FAILED: i32 = 1001;

    /// No eligible playback source exists yet
    pub const NO_PLAYBACK_SOURCE: i32 = 1002;

    /// Setup retry ceiling reached
    pub const RETRIES_EXHAUSTED: i32 = 1003;

    /// Analysis window contained non-finite values
    pub const MALFORMED_WINDOW: i32 = 1004;

    /// Classifier could not produce a prediction
    pub const CLASSIFIER_FAULT: i32 = 1005;

    /// Classifier parameters could not be loaded
    pub const MODEL_LOAD: i32 = 1006;
}

/// Log a detector error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_detector_error(err: &DetectorError, context: &str) {
    error!(
        "Detector error in {}: code={}, component=Detector, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Detector-related errors
///
/// Setup errors are retried on a fixed backoff; window and classifier faults
/// are recovered locally and only ever logged.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorError {
    /// Audio tap attach failed
    SetupFailed { reason: String },

    /// No playback element to attach to
    NoPlaybackSource,

    /// Setup retried `attempts` times without success
    RetriesExhausted { attempts: u32 },

    /// Analysis window could not be turned into features
    MalformedWindow { reason: String },

    /// Classifier could not evaluate its input
    ClassifierFault { reason: String },

    /// Model file missing, unreadable, or inconsistent
    ModelLoad { reason: String },
}

impl ErrorCode for DetectorError {
    fn code(&self) -> i32 {
        match self {
            DetectorError::SetupFailed { .. } => DetectorErrorCodes::SETUP_FAILED,
            DetectorError::NoPlaybackSource => DetectorErrorCodes::NO_PLAYBACK_SOURCE,
            DetectorError::RetriesExhausted { .. } => DetectorErrorCodes::RETRIES_EXHAUSTED,
            DetectorError::MalformedWindow { .. } => DetectorErrorCodes::MALFORMED_WINDOW,
            DetectorError::ClassifierFault { .. } => DetectorErrorCodes::CLASSIFIER_FAULT,
            DetectorError::ModelLoad { .. } => DetectorErrorCodes::MODEL_LOAD,
        }
    }

    fn message(&self) -> String {
        match self {
            DetectorError::SetupFailed { reason } => {
                format!("Audio tap setup failed: {}", reason)
            }
            DetectorError::NoPlaybackSource => "No playback source available yet".to_string(),
            DetectorError::RetriesExhausted { attempts } => {
                format!("Detector setup gave up after {} attempts", attempts)
            }
            DetectorError::MalformedWindow { reason } => {
                format!("Malformed analysis window: {}", reason)
            }
            DetectorError::ClassifierFault { reason } => {
                format!("Classifier fault: {}", reason)
            }
            DetectorError::ModelLoad { reason } => {
                format!("Failed to load classifier model: {}", reason)
            }
        }
    }
}

impl fmt::Display for DetectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DetectorError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for DetectorError {}

impl From<std::io::Error> for DetectorError {
    fn from(err: std::io::Error) -> Self {
        DetectorError::ModelLoad {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for DetectorError {
    fn from(err: serde_json::Error) -> Self {
        DetectorError::ModelLoad {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_error_codes() {
        assert_eq!(
            DetectorError::SetupFailed {
                reason: "x".to_string()
            }
            .code(),
            DetectorErrorCodes::SETUP_FAILED
        );
        assert_eq!(
            DetectorError::NoPlaybackSource.code(),
            DetectorErrorCodes::NO_PLAYBACK_SOURCE
        );
        assert_eq!(
            DetectorError::RetriesExhausted { attempts: 5 }.code(),
            DetectorErrorCodes::RETRIES_EXHAUSTED
        );
        assert_eq!(
            DetectorError::ClassifierFault {
                reason: "x".to_string()
            }
            .code(),
            1005
        );
    }

    #[test]
    fn test_detector_error_display() {
        let err = DetectorError::RetriesExhausted { attempts: 5 };
        let display = format!("{}", err);
        assert!(display.contains("DetectorError"));
        assert!(display.contains("1003"));
        assert!(display.contains("5 attempts"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::other("missing model");
        let err: DetectorError = io_err.into();
        match err {
            DetectorError::ModelLoad { reason } => assert!(reason.contains("missing model")),
            other => panic!("Expected ModelLoad, got {:?}", other),
        }
    }
}
