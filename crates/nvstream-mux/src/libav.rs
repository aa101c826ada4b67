//! libavformat container.

use ffmpeg::ffi;
use ffmpeg_next as ffmpeg;
use tracing::{debug, info};

use nvstream_encoder::{CodecFamily, EncodedPacket, Rational};
use nvstream_gpu::DriverFault;

use crate::{Container, MuxError, MuxResult, StreamSpec};

fn fault(err: ffmpeg::Error) -> DriverFault {
    let message = err.to_string();
    DriverFault::new(i32::from(err), message)
}

fn codec_id(codec: CodecFamily) -> ffi::AVCodecID {
    match codec {
        CodecFamily::Avc => ffi::AVCodecID::AV_CODEC_ID_H264,
        CodecFamily::Hevc => ffi::AVCodecID::AV_CODEC_ID_HEVC,
    }
}

/// An output file or network target opened through libavformat.
pub struct FfmpegContainer {
    output: ffmpeg::format::context::Output,
    url: String,
}

impl FfmpegContainer {
    /// Open `url`, guessing the muxer from it unless `format` names one.
    pub fn create(url: &str, format: Option<&str>) -> MuxResult<Self> {
        ffmpeg::init().map_err(|err| MuxError::OpenFailed {
            url: url.to_string(),
            fault: fault(err),
        })?;

        let output = match format {
            Some(name) => ffmpeg::format::output_as(&url, name),
            None => ffmpeg::format::output(&url),
        }
        .map_err(|err| MuxError::OpenFailed {
            url: url.to_string(),
            fault: fault(err),
        })?;

        info!(url, muxer = output.format().name(), "Container opened");

        Ok(Self {
            output,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Container for FfmpegContainer {
    fn requires_global_header(&self) -> bool {
        self.output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER)
    }

    fn stream_count(&self) -> usize {
        self.output.nb_streams() as usize
    }

    fn add_stream(&mut self, spec: &StreamSpec) -> Option<usize> {
        let mut stream = self.output.add_stream(spec.encoder_name).ok()?;
        stream.set_time_base(spec.time_base);
        stream.set_rate(spec.frame_rate);
        stream.set_avg_frame_rate(spec.frame_rate);

        // SAFETY: the stream was just allocated, its codec parameters belong
        // to it and nothing else references them yet.
        unsafe {
            let par = (*stream.as_mut_ptr()).codecpar;
            (*par).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
            (*par).codec_id = codec_id(spec.codec);
            (*par).width = spec.width as i32;
            (*par).height = spec.height as i32;
            (*par).bit_rate = spec.bit_rate as i64;

            if let Some(extradata) = spec.extradata.as_deref().filter(|e| !e.is_empty()) {
                let padded = extradata.len() + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
                let buf = ffi::av_mallocz(padded) as *mut u8;
                if buf.is_null() {
                    return None;
                }
                std::ptr::copy_nonoverlapping(extradata.as_ptr(), buf, extradata.len());
                (*par).extradata = buf;
                (*par).extradata_size = extradata.len() as i32;
            }
        }

        let index = stream.index();
        debug!(index, codec = spec.codec.name(), "Stream allocated");
        Some(index)
    }

    fn write_header(&mut self) -> Result<(), DriverFault> {
        self.output.write_header().map_err(fault)
    }

    fn time_base(&self, index: usize) -> Option<Rational> {
        self.output
            .stream(index)
            .map(|stream| Rational::from(stream.time_base()))
    }

    fn write_interleaved(&mut self, packet: EncodedPacket) -> Result<(), DriverFault> {
        let mut out = ffmpeg::Packet::copy(&packet.data);
        out.set_stream(packet.stream_index);
        out.set_pts(Some(packet.pts));
        out.set_dts(Some(packet.dts));
        if packet.is_keyframe {
            out.set_flags(ffmpeg::packet::Flags::KEY);
        }

        out.write_interleaved(&mut self.output).map_err(fault)
    }

    fn write_trailer(&mut self) -> Result<(), DriverFault> {
        self.output.write_trailer().map_err(fault)
    }
}
