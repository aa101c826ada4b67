//! Captured frame types.

use std::time::{Duration, Instant};

/// Timestamp for a captured frame.
#[derive(Debug, Clone, Copy)]
pub struct CaptureTimestamp {
    /// Monotonic timestamp when the frame was captured.
    pub capture_time: Instant,

    /// Time since the capture started.
    pub since_start: Duration,
}

impl CaptureTimestamp {
    /// Create a timestamp for a frame captured now.
    pub fn now(start_time: Instant) -> Self {
        let capture_time = Instant::now();
        Self {
            capture_time,
            since_start: capture_time.duration_since(start_time),
        }
    }

    /// Create a timestamp at a fixed offset from the capture start.
    pub fn at(start_time: Instant, since_start: Duration) -> Self {
        Self {
            capture_time: start_time + since_start,
            since_start,
        }
    }

    /// Presentation time in microseconds.
    pub fn pts_us(&self) -> u64 {
        self.since_start.as_micros() as u64
    }
}

/// Memory layout of a captured surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    /// Packed 8-bit B, G, R, unused.
    Bgra,

    /// 8-bit Y plane followed by interleaved UV at half resolution.
    Nv12,
}

/// Location of a surface in device memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSurface {
    /// Device pointer to the first row.
    pub ptr: u64,

    /// Bytes per row.
    pub pitch: u32,
}

/// A captured video frame living in GPU memory.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Device memory holding the pixels.
    pub surface: DeviceSurface,

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Surface layout.
    pub format: SurfaceFormat,

    /// False when the producer repeated the previous picture.
    pub is_new: bool,

    /// Capture timestamp.
    pub timestamp: CaptureTimestamp,

    /// Monotonically increasing sequence number.
    pub sequence: u64,
}

impl CapturedFrame {
    /// Create a new captured frame.
    pub fn new(
        surface: DeviceSurface,
        width: u32,
        height: u32,
        format: SurfaceFormat,
        timestamp: CaptureTimestamp,
        sequence: u64,
    ) -> Self {
        Self {
            surface,
            width,
            height,
            format,
            is_new: true,
            timestamp,
            sequence,
        }
    }

    /// Mark this frame as a repeat of the previous picture.
    pub fn repeated(mut self) -> Self {
        self.is_new = false;
        self
    }

    /// Smallest pitch that can hold one row of this frame.
    pub fn min_pitch(&self) -> u32 {
        match self.format {
            SurfaceFormat::Bgra => self.width * 4,
            SurfaceFormat::Nv12 => self.width,
        }
    }

    /// Check that the surface is non-null and its pitch can hold a row.
    pub fn is_valid(&self) -> bool {
        self.surface.ptr != 0 && self.surface.pitch >= self.min_pitch()
    }
}
