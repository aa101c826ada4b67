//! Error types for the capture module.

use thiserror::Error;

/// Errors that can occur while pulling frames.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The producer reported a failure.
    #[error("Capture source lost: {0}")]
    SourceLost(String),

    /// Capture stopped.
    #[error("Capture stopped")]
    Stopped,

    /// The producer went away.
    #[error("Frame channel disconnected")]
    ChannelDisconnected,
}
