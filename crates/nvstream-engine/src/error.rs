//! Error types for the engine.

use thiserror::Error;

use nvstream_capture::CaptureError;
use nvstream_encoder::EncoderError;
use nvstream_gpu::{DriverFault, GpuError};
use nvstream_ipc::{ConfigError, StartupPhase};
use nvstream_mux::MuxError;

/// The component error behind a failed startup phase.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error(transparent)]
    Mux(#[from] MuxError),
}

/// Errors that can occur while running a capture session.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The session configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A startup phase failed. Nothing acquired before it is kept.
    #[error("{phase} failed: {source}")]
    Startup {
        phase: StartupPhase,
        #[source]
        source: StageError,
    },

    /// A native backend could not be loaded.
    #[error("Backend initialization failed: {0}")]
    Backend(#[source] DriverFault),

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error(transparent)]
    Mux(#[from] MuxError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// The frame does not point at usable device memory.
    #[error("Frame {sequence} has no usable surface")]
    InvalidFrame { sequence: u64 },
}

impl EngineError {
    pub(crate) fn startup(phase: StartupPhase, source: impl Into<StageError>) -> Self {
        Self::Startup {
            phase,
            source: source.into(),
        }
    }

    /// Whether the session can keep running after this error.
    ///
    /// Only a single frame is lost: the encoder refused it, or it was
    /// unusable to begin with.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Encoder(err) => err.is_recoverable(),
            Self::InvalidFrame { .. } => true,
            _ => false,
        }
    }

    /// True when the encoder has already delivered its last packet.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::Mux(MuxError::EncoderTerminated))
    }
}
