//! Container output for encoded video.
//!
//! [`publish`] registers an output stream whose timing mirrors the encoder
//! configuration. [`PacketDrain`] moves finished packets from the encoder
//! into the container after every submitted frame, rescaling timestamps
//! from the encoder time base to the stream time base.

mod container;
mod drain;
mod error;
#[cfg(feature = "ffmpeg")]
mod libav;
mod memory;
mod publisher;

pub use container::{Container, StreamSpec};
pub use drain::{DrainOutcome, DrainReport, DrainState, PacketDrain};
pub use error::MuxError;
#[cfg(feature = "ffmpeg")]
pub use libav::FfmpegContainer;
pub use memory::MemoryContainer;
pub use publisher::{publish, OutputStream};

/// Result type for mux operations.
pub type MuxResult<T> = Result<T, MuxError>;
