//! Hardware video encoding on GPU-resident frames.
//!
//! [`configure`] turns a quality tier, geometry and frame rate into an
//! immutable [`EncoderConfig`]. [`bind`] creates a device-backed frame pool
//! for that configuration and opens the encoder against it, yielding a
//! [`BoundEncoder`] that accepts frames.
//!
//! The native work is behind [`EncodeBackend`]; the `ffmpeg` feature
//! provides one built on libavcodec's CUDA hardware frames and NVENC.

mod backend;
mod binder;
mod config;
mod error;
mod format;
#[cfg(feature = "ffmpeg")]
mod libav;
mod rational;

pub use backend::{
    CodecRegistry, EncodeBackend, EncodedPacket, HardwareEncoder, ReceiveOutcome, SurfaceFrame,
};
pub use binder::{bind, BoundEncoder, FramePool, FramePoolDesc};
pub use config::{
    configure, encoder_candidates, select_encoder, tier_profile, EncoderConfig, EncoderRequest,
    TierProfile, AVC_CANDIDATES, BASE_BIT_RATE, ENCODER_TIME_BASE, HEVC_CANDIDATES,
};
pub use error::EncoderError;
pub use format::{ColorRange, PixelFormat};
#[cfg(feature = "ffmpeg")]
pub use libav::{CudaFramePool, FfmpegBackend, FfmpegEncoder};
pub use rational::Rational;

pub use nvstream_ipc::{CodecFamily, QualityTier};

/// Result type for encoder operations.
pub type EncoderResult<T> = Result<T, EncoderError>;
