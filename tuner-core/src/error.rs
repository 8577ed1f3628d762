//! # Error Types
//!
//! Errors surfaced by the capture pipeline and the audio host. "No pitch" is
//! never an error: the estimator reports it as `None`.

use thiserror::Error;

/// Errors originating from the tuner core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TunerError {
    /// The live input could not be obtained (no device, permission denied,
    /// unsupported format or host API failure). Not retried by the core.
    #[error("Audio input unavailable: {0}")]
    Acquisition(String),

    /// An output path (monitor or reference tone) could not be opened.
    #[error("Audio output unavailable: {0}")]
    Output(String),

    /// The input device vanished mid-session. The pipeline has stopped itself.
    #[error("Audio input device was lost")]
    DeviceLost,

    /// The operation needs a running capture session.
    #[error("Capture session is not running")]
    NotRunning,

    /// The session runs without a monitor output.
    #[error("Live monitoring is not available in this session")]
    MonitorUnavailable,
}

/// Convenience alias used throughout the core.
pub type Result<T> = std::result::Result<T, TunerError>;
