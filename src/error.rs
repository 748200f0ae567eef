//! Error types for speechcoach
//!
//! Uses thiserror for ergonomic error definitions. Each kind maps to a
//! distinct message so the practice view can tell the user exactly what
//! went wrong (microphone permission, missing device, server rejection,
//! lost connection) instead of a single generic failure.

use thiserror::Error;

/// Message shown when a request never reached the server
pub const CONNECTIVITY_MESSAGE: &str =
    "Unable to connect to the server. Please check your internet connection and try again.";

/// Top-level error type for the speechcoach application
#[derive(Error, Debug)]
pub enum SpeechCoachError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while acquiring or running the microphone
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Microphone access was denied. Allow microphone access and try again.")]
    PermissionDenied,

    #[error("No microphone found: '{0}'. Connect a microphone and try again.")]
    DeviceNotFound(String),

    #[error("Audio capture is not available on this system: {0}")]
    CaptureUnavailable(String),

    #[error("Recording failed: {0}")]
    RecordingFailed(String),
}

/// Errors raised by calls to the coaching backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Missing credential, or the server answered 401/403
    #[error("Not signed in (HTTP {})", status.map(|s| s.to_string()).unwrap_or_else(|| "-".into()))]
    Unauthenticated { status: Option<u16> },

    /// The server was reached and refused the request
    #[error("{message}")]
    ApplicationRejection { status: Option<u16>, message: String },

    /// The request never reached the server
    #[error("Connection failed: {0}")]
    ConnectivityFailure(String),
}

impl ApiError {
    /// Build a rejection carrying a server-provided or fallback message
    pub fn rejection(status: Option<u16>, message: impl Into<String>) -> Self {
        ApiError::ApplicationRejection {
            status,
            message: message.into(),
        }
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, ApiError::Unauthenticated { .. })
    }

    /// Text for the inline error banner
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthenticated { .. } => "Please sign in to continue.".to_string(),
            ApiError::ApplicationRejection { message, .. } => message.clone(),
            ApiError::ConnectivityFailure(_) => CONNECTIVITY_MESSAGE.to_string(),
        }
    }
}

/// Errors raised by the practice session state machine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("No exercise is loaded")]
    NoExercise,

    #[error("No recording to submit. Record yourself first.")]
    NothingToSubmit,

    #[error("No analysis result available")]
    NoResult,

    #[error("Cannot {action} while {state}")]
    InvalidTransition { state: String, action: &'static str },

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SessionError {
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, SessionError::Api(e) if e.is_unauthenticated())
    }

    /// Text for the dismissible inline error banner
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Api(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

/// Result type alias using SpeechCoachError
pub type Result<T> = std::result::Result<T, SpeechCoachError>;
