//! Session state machine types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::types::SessionStats;

/// The current state of the capture session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No session is running.
    #[default]
    Idle,

    /// A session is being built.
    Starting {
        /// Current startup phase.
        phase: StartupPhase,
    },

    /// Frames are being encoded and muxed.
    Live {
        /// Active session configuration.
        config: SessionConfig,

        /// Statistics at the time of the transition.
        stats: SessionStats,
    },

    /// The session is being torn down.
    Stopping {
        /// Reason for stopping.
        reason: StopReason,

        /// Current shutdown phase.
        phase: ShutdownPhase,
    },

    /// The session failed.
    Error {
        /// Error message.
        message: String,

        /// Whether a new session can be started without intervention.
        recoverable: bool,
    },
}

impl SessionState {
    /// Returns true if no session is running.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns true if the session is live.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live { .. })
    }

    /// Returns true if the session is starting.
    pub fn is_starting(&self) -> bool {
        matches!(self, Self::Starting { .. })
    }

    /// Returns true if the session is stopping.
    pub fn is_stopping(&self) -> bool {
        matches!(self, Self::Stopping { .. })
    }

    /// Returns true if the session is in an error state.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Starting { .. } => "Starting",
            Self::Live { .. } => "Live",
            Self::Stopping { .. } => "Stopping",
            Self::Error { .. } => "Error",
        }
    }
}

/// Startup phases of a capture session, in order.
///
/// Each phase acquires one resource. A failure in any phase releases what the
/// earlier phases acquired, in reverse order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartupPhase {
    /// Creating the GPU compute context.
    AcquireDevice,

    /// Deriving encoder parameters.
    ConfigureEncoder,

    /// Creating the hardware frame pool and opening the encoder.
    BindFrames,

    /// Registering the output stream with the container.
    PublishStream,

    /// Writing the container header.
    WriteHeader,
}

impl StartupPhase {
    /// Returns the next phase, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::AcquireDevice => Some(Self::ConfigureEncoder),
            Self::ConfigureEncoder => Some(Self::BindFrames),
            Self::BindFrames => Some(Self::PublishStream),
            Self::PublishStream => Some(Self::WriteHeader),
            Self::WriteHeader => None,
        }
    }

    /// Returns the previous phase, if any (for rollback).
    pub fn previous(self) -> Option<Self> {
        match self {
            Self::AcquireDevice => None,
            Self::ConfigureEncoder => Some(Self::AcquireDevice),
            Self::BindFrames => Some(Self::ConfigureEncoder),
            Self::PublishStream => Some(Self::BindFrames),
            Self::WriteHeader => Some(Self::PublishStream),
        }
    }

    /// Returns the display name for this phase.
    pub fn name(self) -> &'static str {
        match self {
            Self::AcquireDevice => "Acquiring GPU context",
            Self::ConfigureEncoder => "Configuring encoder",
            Self::BindFrames => "Binding frame pool",
            Self::PublishStream => "Publishing output stream",
            Self::WriteHeader => "Writing container header",
        }
    }
}

impl fmt::Display for StartupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shutdown phases of a capture session, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownPhase {
    /// Stopping the capture loop.
    StopCapture,

    /// Signalling end of input and draining the encoder.
    FlushEncoder,

    /// Writing the container trailer.
    WriteTrailer,

    /// Closing the encoder.
    ReleaseEncoder,

    /// Releasing the hardware frame pool.
    ReleaseFramePool,

    /// Destroying the GPU compute context.
    ReleaseDevice,
}

impl ShutdownPhase {
    /// Returns the next phase, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::StopCapture => Some(Self::FlushEncoder),
            Self::FlushEncoder => Some(Self::WriteTrailer),
            Self::WriteTrailer => Some(Self::ReleaseEncoder),
            Self::ReleaseEncoder => Some(Self::ReleaseFramePool),
            Self::ReleaseFramePool => Some(Self::ReleaseDevice),
            Self::ReleaseDevice => None,
        }
    }

    /// Returns the display name for this phase.
    pub fn name(self) -> &'static str {
        match self {
            Self::StopCapture => "Stopping capture",
            Self::FlushEncoder => "Flushing encoder",
            Self::WriteTrailer => "Writing container trailer",
            Self::ReleaseEncoder => "Closing encoder",
            Self::ReleaseFramePool => "Releasing frame pool",
            Self::ReleaseDevice => "Releasing GPU context",
        }
    }
}

/// Reason for stopping the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Application requested stop.
    UserRequested,

    /// The encoder reported end of stream.
    EndOfStream,

    /// The frame source went away.
    CaptureLost { message: String },

    /// Encoder error.
    EncoderError { message: String },

    /// Fatal error occurred.
    FatalError { message: String },
}

impl StopReason {
    /// Returns a display message for this reason.
    pub fn message(&self) -> String {
        match self {
            Self::UserRequested => "Session stopped by user".to_string(),
            Self::EndOfStream => "Encoder reached end of stream".to_string(),
            Self::CaptureLost { message } => format!("Capture lost: {message}"),
            Self::EncoderError { message } => format!("Encoder error: {message}"),
            Self::FatalError { message } => format!("Fatal error: {message}"),
        }
    }

    /// Returns true if the session ended because something failed.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::UserRequested | Self::EndOfStream)
    }
}
