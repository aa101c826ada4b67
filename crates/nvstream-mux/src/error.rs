//! Error types for the mux module.

use thiserror::Error;

use nvstream_encoder::Rational;
use nvstream_gpu::DriverFault;

/// Errors that can occur while publishing a stream or moving packets.
#[derive(Debug, Error)]
pub enum MuxError {
    /// The container could not be created.
    #[error("Failed to open output {url}: {fault}")]
    OpenFailed {
        url: String,
        #[source]
        fault: DriverFault,
    },

    /// The container has no room for another stream.
    #[error("Failed to allocate output stream")]
    StreamAllocFailed,

    /// The container assigned an index out of sequence.
    #[error("Output stream got index {actual}, expected {expected}")]
    UnexpectedStreamIndex { expected: usize, actual: usize },

    /// The encoder time base cannot be used for a stream.
    #[error("Invalid stream time base {0}")]
    InvalidTimeBase(Rational),

    /// The container header could not be written.
    #[error("Failed to write container header: {0}")]
    HeaderFailed(#[source] DriverFault),

    /// The container trailer could not be written.
    #[error("Failed to write container trailer: {0}")]
    TrailerFailed(#[source] DriverFault),

    /// The encoder already reported end of stream.
    #[error("Encoder reached end of stream")]
    EncoderTerminated,
}
