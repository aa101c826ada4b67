//! Output stream registration.

use bytes::Bytes;
use tracing::{error, info, instrument};

use nvstream_encoder::{EncoderConfig, Rational};

use crate::{Container, MuxError, MuxResult, StreamSpec};

/// A stream registered with the container.
///
/// The time base is copied from the encoder configuration when the stream
/// is published and cannot change afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputStream {
    index: usize,
    time_base: Rational,
    frame_rate: Rational,
}

impl OutputStream {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Frame-rate hint given to the container.
    pub fn frame_rate(&self) -> Rational {
        self.frame_rate
    }
}

/// Register a video stream matching `config` with `container`.
#[instrument(name = "publish_stream", skip_all, fields(encoder = config.encoder_name()))]
pub fn publish<C: Container + ?Sized>(
    container: &mut C,
    config: &EncoderConfig,
    extradata: Option<Bytes>,
) -> MuxResult<OutputStream> {
    let time_base = config.time_base();
    if !time_base.is_positive() {
        return Err(MuxError::InvalidTimeBase(time_base));
    }

    let expected = container.stream_count();
    let spec = StreamSpec {
        codec: config.family(),
        encoder_name: config.encoder_name(),
        width: config.width(),
        height: config.height(),
        bit_rate: config.bit_rate(),
        time_base,
        frame_rate: config.frame_rate(),
        extradata,
    };

    let index = container.add_stream(&spec).ok_or_else(|| {
        error!("Container refused a new stream");
        MuxError::StreamAllocFailed
    })?;
    if index != expected {
        return Err(MuxError::UnexpectedStreamIndex {
            expected,
            actual: index,
        });
    }

    info!(
        index,
        time_base = %time_base,
        frame_rate = %spec.frame_rate,
        "Output stream published"
    );

    Ok(OutputStream {
        index,
        time_base,
        frame_rate: spec.frame_rate,
    })
}
