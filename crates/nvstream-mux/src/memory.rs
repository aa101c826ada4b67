//! In-memory container.

use std::sync::Arc;

use parking_lot::Mutex;

use nvstream_encoder::{EncodedPacket, Rational};
use nvstream_gpu::DriverFault;

use crate::{Container, StreamSpec};

/// `AVERROR(EINVAL)`, the code libavformat uses for misuse.
const INVALID: i32 = -22;

#[derive(Default)]
struct MemoryInner {
    global_header: bool,
    max_streams: Option<usize>,
    muxer_time_base: Option<Rational>,
    streams: Vec<StreamSpec>,
    last_dts: Vec<Option<i64>>,
    packets: Vec<EncodedPacket>,
    header_written: bool,
    trailer_written: bool,
}

/// A container that keeps every packet in memory.
///
/// Clones share the same buffer, so one handle can be given to a session
/// while another inspects the output. Ordering rules mirror a real muxer:
/// packets need a header first, must name a known stream and must carry
/// strictly increasing decode timestamps.
#[derive(Clone, Default)]
pub struct MemoryContainer {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask encoders for out-of-band codec headers.
    pub fn with_global_header(self, global_header: bool) -> Self {
        self.inner.lock().global_header = global_header;
        self
    }

    /// Refuse streams beyond `max`.
    pub fn with_stream_limit(self, max: usize) -> Self {
        self.inner.lock().max_streams = Some(max);
        self
    }

    /// Switch every stream to `time_base` once the header is written, the
    /// way some muxers do.
    pub fn with_muxer_time_base(self, time_base: Rational) -> Self {
        self.inner.lock().muxer_time_base = Some(time_base);
        self
    }

    /// Specs of the allocated streams.
    pub fn streams(&self) -> Vec<StreamSpec> {
        self.inner.lock().streams.clone()
    }

    /// Packets written so far, in write order.
    pub fn packets(&self) -> Vec<EncodedPacket> {
        self.inner.lock().packets.clone()
    }

    pub fn packet_count(&self) -> usize {
        self.inner.lock().packets.len()
    }

    pub fn header_written(&self) -> bool {
        self.inner.lock().header_written
    }

    pub fn trailer_written(&self) -> bool {
        self.inner.lock().trailer_written
    }
}

impl Container for MemoryContainer {
    fn requires_global_header(&self) -> bool {
        self.inner.lock().global_header
    }

    fn stream_count(&self) -> usize {
        self.inner.lock().streams.len()
    }

    fn add_stream(&mut self, spec: &StreamSpec) -> Option<usize> {
        let mut inner = self.inner.lock();
        if inner.header_written {
            return None;
        }
        if let Some(max) = inner.max_streams {
            if inner.streams.len() >= max {
                return None;
            }
        }
        inner.streams.push(spec.clone());
        inner.last_dts.push(None);
        Some(inner.streams.len() - 1)
    }

    fn write_header(&mut self) -> Result<(), DriverFault> {
        let mut inner = self.inner.lock();
        if inner.streams.is_empty() {
            return Err(DriverFault::new(INVALID, "no streams to write"));
        }
        if inner.header_written {
            return Err(DriverFault::new(INVALID, "header already written"));
        }
        inner.header_written = true;
        Ok(())
    }

    fn time_base(&self, index: usize) -> Option<Rational> {
        let inner = self.inner.lock();
        if !inner.header_written || index >= inner.streams.len() {
            return None;
        }
        inner.muxer_time_base
    }

    fn write_interleaved(&mut self, packet: EncodedPacket) -> Result<(), DriverFault> {
        let mut inner = self.inner.lock();
        if !inner.header_written || inner.trailer_written {
            return Err(DriverFault::new(INVALID, "container is not accepting packets"));
        }

        let index = packet.stream_index;
        let last = *inner
            .last_dts
            .get(index)
            .ok_or_else(|| DriverFault::new(INVALID, format!("no stream {index}")))?;
        if let Some(last) = last {
            if packet.dts <= last {
                return Err(DriverFault::new(
                    INVALID,
                    format!("non monotonically increasing dts: {} <= {last}", packet.dts),
                ));
            }
        }

        inner.last_dts[index] = Some(packet.dts);
        inner.packets.push(packet);
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<(), DriverFault> {
        let mut inner = self.inner.lock();
        if !inner.header_written {
            return Err(DriverFault::new(INVALID, "trailer before header"));
        }
        if inner.trailer_written {
            return Err(DriverFault::new(INVALID, "trailer already written"));
        }
        inner.trailer_written = true;
        Ok(())
    }
}
