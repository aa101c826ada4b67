//! Container seam.

use bytes::Bytes;

use nvstream_encoder::{CodecFamily, EncodedPacket, Rational};
use nvstream_gpu::DriverFault;

/// Everything a container needs to describe a video stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    pub codec: CodecFamily,

    /// Encoder implementation producing the stream.
    pub encoder_name: &'static str,

    pub width: u32,
    pub height: u32,
    pub bit_rate: u64,
    pub time_base: Rational,
    pub frame_rate: Rational,

    /// Out-of-band codec headers.
    pub extradata: Option<Bytes>,
}

/// A muxer writing one or more streams.
pub trait Container: Send {
    /// Whether codec headers must be carried out of band.
    fn requires_global_header(&self) -> bool;

    /// Streams allocated so far.
    fn stream_count(&self) -> usize;

    /// Allocate a stream. `None` when the container cannot take another.
    fn add_stream(&mut self, spec: &StreamSpec) -> Option<usize>;

    fn write_header(&mut self) -> Result<(), DriverFault>;

    /// Time base the container writes stream `index` in, when it differs
    /// from the one the stream was published with. Muxers may pick their own
    /// while writing the header.
    fn time_base(&self, _index: usize) -> Option<Rational> {
        None
    }

    /// Write a packet, letting the container order it against other streams.
    fn write_interleaved(&mut self, packet: EncodedPacket) -> Result<(), DriverFault>;

    fn write_trailer(&mut self) -> Result<(), DriverFault>;
}

impl<C: Container + ?Sized> Container for Box<C> {
    fn requires_global_header(&self) -> bool {
        (**self).requires_global_header()
    }

    fn stream_count(&self) -> usize {
        (**self).stream_count()
    }

    fn add_stream(&mut self, spec: &StreamSpec) -> Option<usize> {
        (**self).add_stream(spec)
    }

    fn write_header(&mut self) -> Result<(), DriverFault> {
        (**self).write_header()
    }

    fn time_base(&self, index: usize) -> Option<Rational> {
        (**self).time_base(index)
    }

    fn write_interleaved(&mut self, packet: EncodedPacket) -> Result<(), DriverFault> {
        (**self).write_interleaved(packet)
    }

    fn write_trailer(&mut self) -> Result<(), DriverFault> {
        (**self).write_trailer()
    }
}
