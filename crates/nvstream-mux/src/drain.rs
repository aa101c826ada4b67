//! Encoder-to-container packet drain.

use tracing::{info, trace, warn};

use nvstream_encoder::{HardwareEncoder, Rational, ReceiveOutcome};
use nvstream_gpu::DriverFault;

use crate::{Container, MuxError, MuxResult, OutputStream};

/// Persistent state of a [`PacketDrain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DrainState {
    /// Waiting for the next frame.
    #[default]
    Idle,

    /// Pulling packets.
    Draining,

    /// The encoder reported end of stream; no further drains are accepted.
    Terminal,
}

/// Why a drain cycle stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The encoder needs another frame before it can produce more.
    Exhausted,

    /// The encoder is finished.
    EndOfStream,

    /// The encoder returned an unexpected code.
    Stalled(DriverFault),
}

/// What one drain cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Packets the container accepted.
    pub written: u64,

    /// Payload bytes the container accepted.
    pub bytes: u64,

    /// Packets the container refused.
    pub write_failures: u64,

    pub outcome: DrainOutcome,
}

/// Moves finished packets from an encoder into a container.
#[derive(Debug, Default)]
pub struct PacketDrain {
    state: DrainState,
    last_dts: Option<i64>,
    packets_written: u64,
    write_failures: u64,
}

impl PacketDrain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DrainState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state == DrainState::Terminal
    }

    /// Packets written over the drain's lifetime.
    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    /// Write failures over the drain's lifetime.
    pub fn write_failures(&self) -> u64 {
        self.write_failures
    }

    /// Pull every packet the encoder has ready and write it to `stream`.
    ///
    /// Each packet is stamped with `last_frame_pts` (encoder time base)
    /// rescaled to the time base the container writes the stream in, for
    /// both pts and dts. The encoder runs without b-frames, so decode order
    /// is presentation order.
    ///
    /// A packet's pts can therefore differ from its frame's pts: when one
    /// cycle yields several packets (the burst after a flush, typically),
    /// or the rescaled stamp does not pass the previous packet, the packet is
    /// stamped one stream tick after the previous one so decode timestamps
    /// keep increasing.
    ///
    /// Write failures are logged and counted; draining continues.
    pub fn drain<E, C>(
        &mut self,
        encoder: &mut E,
        encoder_time_base: Rational,
        stream: &OutputStream,
        last_frame_pts: i64,
        container: &mut C,
    ) -> MuxResult<DrainReport>
    where
        E: HardwareEncoder + ?Sized,
        C: Container + ?Sized,
    {
        if self.state == DrainState::Terminal {
            return Err(MuxError::EncoderTerminated);
        }
        self.state = DrainState::Draining;

        let time_base = container
            .time_base(stream.index())
            .unwrap_or(stream.time_base());
        let stamp = Rational::rescale(last_frame_pts, encoder_time_base, time_base);
        let mut written = 0u64;
        let mut bytes = 0u64;
        let mut write_failures = 0u64;

        let outcome = loop {
            match encoder.receive_packet() {
                ReceiveOutcome::Packet(mut packet) => {
                    let ts = match self.last_dts {
                        Some(last) if stamp <= last => last + 1,
                        _ => stamp,
                    };
                    packet.stream_index = stream.index();
                    packet.pts = ts;
                    packet.dts = ts;

                    let size = packet.data.len() as u64;
                    let keyframe = packet.is_keyframe;
                    match container.write_interleaved(packet) {
                        Ok(()) => {
                            self.last_dts = Some(ts);
                            written += 1;
                            bytes += size;
                            trace!(ts, size, keyframe, "Packet written");
                        }
                        Err(fault) => {
                            write_failures += 1;
                            warn!(
                                stream = stream.index(),
                                code = fault.code,
                                %fault,
                                "Failed to write packet"
                            );
                        }
                    }
                }
                ReceiveOutcome::Again => break DrainOutcome::Exhausted,
                ReceiveOutcome::EndOfStream => {
                    info!(stream = stream.index(), "Encoder reached end of stream");
                    break DrainOutcome::EndOfStream;
                }
                ReceiveOutcome::Failed(fault) => {
                    warn!(
                        stream = stream.index(),
                        code = fault.code,
                        %fault,
                        "Encoder returned an unexpected code"
                    );
                    break DrainOutcome::Stalled(fault);
                }
            }
        };

        self.state = match outcome {
            DrainOutcome::EndOfStream => DrainState::Terminal,
            DrainOutcome::Exhausted | DrainOutcome::Stalled(_) => DrainState::Idle,
        };
        self.packets_written += written;
        self.write_failures += write_failures;

        Ok(DrainReport {
            written,
            bytes,
            write_failures,
            outcome,
        })
    }
}
