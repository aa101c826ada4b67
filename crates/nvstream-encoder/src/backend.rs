//! Seams between the pipeline and a native encoding library.

use bytes::Bytes;

use nvstream_gpu::{DeviceContext, DriverFault};

use crate::{EncoderConfig, FramePoolDesc, PixelFormat};

/// A frame ready for submission: a device surface plus its presentation
/// time in the encoder's time base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceFrame {
    /// Device pointer to the first row.
    pub ptr: u64,

    /// Bytes per row.
    pub pitch: u32,

    pub width: u32,
    pub height: u32,

    /// Memory layout of the surface.
    pub format: PixelFormat,

    /// Presentation timestamp in encoder time-base ticks.
    pub pts: i64,
}

/// An encoded bitstream unit.
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    /// Encoded payload.
    pub data: Bytes,

    /// Presentation timestamp.
    pub pts: i64,

    /// Decode timestamp.
    pub dts: i64,

    /// Whether this is a keyframe.
    pub is_keyframe: bool,

    /// Container stream the packet belongs to.
    pub stream_index: usize,
}

/// Result of asking the encoder for its next packet.
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// A finished packet.
    Packet(EncodedPacket),

    /// Nothing more until another frame is submitted.
    Again,

    /// The encoder has been flushed and will produce nothing more.
    EndOfStream,

    /// Any other driver code.
    Failed(DriverFault),
}

/// An opened hardware encoder.
///
/// A value of this type only exists after a successful open, so packets
/// can never be requested from an encoder that is not ready.
pub trait HardwareEncoder: Send {
    /// Implementation name, e.g. `h264_nvenc`.
    fn name(&self) -> &'static str;

    /// Queue one frame.
    fn send_frame(&mut self, frame: &SurfaceFrame) -> Result<(), DriverFault>;

    /// Signal end of input.
    fn send_eof(&mut self) -> Result<(), DriverFault>;

    /// Pull the next finished packet.
    fn receive_packet(&mut self) -> ReceiveOutcome;

    /// Out-of-band codec headers, present when global headers were requested.
    fn extradata(&self) -> Option<Bytes>;
}

/// Lookup of registered encoder implementations by name.
pub trait CodecRegistry {
    fn has_encoder(&self, name: &str) -> bool;
}

/// A native library able to build frame pools and open encoders on them.
pub trait EncodeBackend: CodecRegistry {
    /// Device-backed surface pool.
    type Pool: Send;

    /// Encoder opened against a [`EncodeBackend::Pool`].
    type Encoder: HardwareEncoder;

    /// Create and initialize a pool on `device`.
    fn init_frame_pool(
        &self,
        device: &DeviceContext,
        desc: &FramePoolDesc,
    ) -> Result<Self::Pool, DriverFault>;

    /// Encoder-facing format `pool` was actually initialized with.
    fn pool_format(&self, pool: &Self::Pool) -> PixelFormat;

    /// Open the configured encoder, borrowing `pool` for its input surfaces.
    ///
    /// The encoder may keep its own reference to the pool's frames but never
    /// owns the pool itself.
    fn open_encoder(
        &self,
        config: &EncoderConfig,
        pool: &Self::Pool,
    ) -> Result<Self::Encoder, DriverFault>;
}
