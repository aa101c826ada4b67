//! Error types for the encoder module.

use thiserror::Error;

use nvstream_gpu::DriverFault;
use nvstream_ipc::CodecFamily;

use crate::PixelFormat;

/// Errors that can occur while configuring, binding or feeding the encoder.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// None of the candidate implementations is registered.
    #[error("No hardware encoder available for {family:?} (tried {tried})")]
    EncoderUnavailable { family: CodecFamily, tried: String },

    /// Geometry or frame rate the encoder cannot work with.
    #[error("Invalid encoder geometry: {width}x{height} at {fps} fps")]
    InvalidGeometry { width: u32, height: u32, fps: u32 },

    /// The device-backed frame pool could not be initialized.
    #[error("Frame pool initialization failed: {0}")]
    FrameContextInitFailed(#[source] DriverFault),

    /// The encoder refused to open.
    #[error("Failed to open encoder {name}: {fault}")]
    EncoderOpenFailed {
        name: &'static str,
        #[source]
        fault: DriverFault,
    },

    /// A frame or pool layout does not match what was negotiated.
    #[error("Pixel format mismatch: expected {expected:?}, got {actual:?}")]
    FormatMismatch {
        expected: PixelFormat,
        actual: PixelFormat,
    },

    /// The source geometry changed after the encoder was opened.
    #[error("Resolution changed from {}x{} to {}x{}", expected.0, expected.1, actual.0, actual.1)]
    ResolutionChanged {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// The encoder rejected a frame.
    #[error("Failed to submit frame: {0}")]
    SendFailed(#[source] DriverFault),

    /// Frames were submitted after end of input was signalled.
    #[error("Encoder already flushed")]
    AlreadyFlushed,
}

impl EncoderError {
    /// Whether the session can keep running after this error.
    ///
    /// Only a rejected frame is survivable; the frame is lost.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SendFailed(_))
    }
}
