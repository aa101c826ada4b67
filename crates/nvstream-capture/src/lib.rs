//! GPU frame source interface.
//!
//! Frame grabbing itself happens elsewhere; this crate defines what a
//! grabbed frame looks like and how the engine pulls frames from a
//! producer. [`channel_source`] adapts any grabber thread into a
//! [`FrameSource`].

mod error;
mod frame;
mod source;

pub use error::CaptureError;
pub use frame::{CaptureTimestamp, CapturedFrame, DeviceSurface, SurfaceFormat};
pub use source::{channel_source, ChannelSource, FrameSender};

use std::time::Duration;

/// Channel capacity for captured frames.
pub const FRAME_CHANNEL_CAPACITY: usize = 3;

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// A producer of GPU-resident frames.
pub trait FrameSource: Send {
    /// Get the source dimensions.
    fn dimensions(&self) -> (u32, u32);

    /// Native layout of the surfaces this source produces.
    fn format(&self) -> SurfaceFormat;

    /// Wait up to `timeout` for the next frame.
    ///
    /// `Ok(None)` means nothing arrived in time. An error means the source
    /// is gone and will not produce again.
    fn next_frame(&mut self, timeout: Duration) -> CaptureResult<Option<CapturedFrame>>;

    /// Stop producing.
    fn stop(&mut self) -> CaptureResult<()>;
}
