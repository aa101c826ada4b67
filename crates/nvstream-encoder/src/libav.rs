//! libavcodec backend: CUDA hardware frames feeding NVENC.

use std::ffi::c_void;
use std::ptr;

use bytes::Bytes;
use ffmpeg::ffi;
use ffmpeg::format::Pixel;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::Rescale;
use tracing::{debug, warn};

use nvstream_gpu::{DeviceContext, DriverFault};

use crate::{
    CodecRegistry, ColorRange, EncodeBackend, EncodedPacket, EncoderConfig, FramePoolDesc,
    HardwareEncoder, PixelFormat, ReceiveOutcome, Rational, SurfaceFrame,
};

/// `AVERROR(ENOMEM)`.
const OUT_OF_MEMORY: i32 = -12;

/// `AVERROR(EINVAL)`.
const INVALID_ARGUMENT: i32 = -22;

/// Leading field of libavutil's `AVCUDADeviceContext`.
#[repr(C)]
struct CudaDeviceContextHead {
    cuda_ctx: *mut c_void,
}

fn fault(err: ffmpeg::Error) -> DriverFault {
    let message = err.to_string();
    DriverFault::new(i32::from(err), message)
}

fn check(ret: i32, what: &str) -> Result<(), DriverFault> {
    if ret < 0 {
        let err = ffmpeg::Error::from(ret);
        return Err(DriverFault::new(ret, format!("{what}: {err}")));
    }
    Ok(())
}

impl From<PixelFormat> for Pixel {
    fn from(format: PixelFormat) -> Self {
        match format {
            PixelFormat::Cuda => Pixel::CUDA,
            PixelFormat::Bgr0 => Pixel::BGRZ,
            PixelFormat::Nv12 => Pixel::NV12,
        }
    }
}

impl From<Rational> for ffmpeg::Rational {
    fn from(value: Rational) -> Self {
        ffmpeg::Rational::new(value.num, value.den)
    }
}

impl From<ffmpeg::Rational> for Rational {
    fn from(value: ffmpeg::Rational) -> Self {
        Rational::new(value.numerator(), value.denominator())
    }
}

/// `av_rescale_q_rnd` with round-to-nearest, ties away from zero.
pub(crate) fn rescale_ticks(ts: i64, from: Rational, to: Rational) -> i64 {
    ts.rescale_with(from, to, ffmpeg::Rounding::NearestInfinity)
}

impl TryFrom<Pixel> for PixelFormat {
    type Error = Pixel;

    fn try_from(pixel: Pixel) -> Result<Self, Pixel> {
        match pixel {
            Pixel::CUDA => Ok(PixelFormat::Cuda),
            Pixel::BGRZ => Ok(PixelFormat::Bgr0),
            Pixel::NV12 => Ok(PixelFormat::Nv12),
            other => Err(other),
        }
    }
}

/// Encoder backend built on libavcodec.
#[derive(Debug)]
pub struct FfmpegBackend {
    _private: (),
}

impl FfmpegBackend {
    /// Initialize libav* and return the backend.
    pub fn new() -> Result<Self, DriverFault> {
        ffmpeg::init().map_err(fault)?;
        Ok(Self { _private: () })
    }
}

impl CodecRegistry for FfmpegBackend {
    fn has_encoder(&self, name: &str) -> bool {
        ffmpeg::encoder::find_by_name(name).is_some()
    }
}

/// CUDA hardware device and frames contexts.
pub struct CudaFramePool {
    device_ref: *mut ffi::AVBufferRef,
    frames_ref: *mut ffi::AVBufferRef,
    format: PixelFormat,
}

// SAFETY: the buffer references are only used by the thread owning the pool.
unsafe impl Send for CudaFramePool {}

impl Drop for CudaFramePool {
    fn drop(&mut self) {
        // SAFETY: both pointers are either null or references we own.
        unsafe {
            ffi::av_buffer_unref(&mut self.frames_ref);
            ffi::av_buffer_unref(&mut self.device_ref);
        }
    }
}

impl EncodeBackend for FfmpegBackend {
    type Pool = CudaFramePool;
    type Encoder = FfmpegEncoder;

    fn init_frame_pool(
        &self,
        device: &DeviceContext,
        desc: &FramePoolDesc,
    ) -> Result<CudaFramePool, DriverFault> {
        let mut pool = CudaFramePool {
            device_ref: ptr::null_mut(),
            frames_ref: ptr::null_mut(),
            format: desc.format,
        };

        // SAFETY: every pointer is checked before use and `pool` releases
        // whatever was allocated if a later step fails.
        unsafe {
            pool.device_ref =
                ffi::av_hwdevice_ctx_alloc(ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA);
            if pool.device_ref.is_null() {
                return Err(DriverFault::new(OUT_OF_MEMORY, "av_hwdevice_ctx_alloc"));
            }

            let hw_device = (*pool.device_ref).data as *mut ffi::AVHWDeviceContext;
            let cuda = (*hw_device).hwctx as *mut CudaDeviceContextHead;
            (*cuda).cuda_ctx = device.raw().as_ptr();
            check(ffi::av_hwdevice_ctx_init(pool.device_ref), "av_hwdevice_ctx_init")?;

            pool.frames_ref = ffi::av_hwframe_ctx_alloc(pool.device_ref);
            if pool.frames_ref.is_null() {
                return Err(DriverFault::new(OUT_OF_MEMORY, "av_hwframe_ctx_alloc"));
            }

            let frames = (*pool.frames_ref).data as *mut ffi::AVHWFramesContext;
            (*frames).format = Pixel::from(desc.format).into();
            (*frames).sw_format = Pixel::from(desc.sw_format).into();
            (*frames).width = desc.width as i32;
            (*frames).height = desc.height as i32;
            check(ffi::av_hwframe_ctx_init(pool.frames_ref), "av_hwframe_ctx_init")?;

            let initialized = Pixel::from((*frames).format);
            pool.format = PixelFormat::try_from(initialized).map_err(|other| {
                DriverFault::new(
                    INVALID_ARGUMENT,
                    format!("unsupported frames format {other:?}"),
                )
            })?;
        }

        debug!(
            width = desc.width,
            height = desc.height,
            sw_format = desc.sw_format.name(),
            "CUDA frames context ready"
        );
        Ok(pool)
    }

    fn pool_format(&self, pool: &CudaFramePool) -> PixelFormat {
        pool.format
    }

    fn open_encoder(
        &self,
        config: &EncoderConfig,
        pool: &CudaFramePool,
    ) -> Result<FfmpegEncoder, DriverFault> {
        let codec = ffmpeg::encoder::find_by_name(config.encoder_name).ok_or_else(|| {
            DriverFault::new(
                i32::from(ffmpeg::Error::EncoderNotFound),
                format!("{} is not registered", config.encoder_name),
            )
        })?;

        let context = ffmpeg::codec::context::Context::new_with_codec(codec);
        let mut video = context.encoder().video().map_err(fault)?;

        video.set_width(config.width);
        video.set_height(config.height);
        video.set_format(Pixel::from(config.pixel_format));
        video.set_time_base(config.time_base);
        video.set_frame_rate(Some(config.frame_rate));
        video.set_aspect_ratio(config.sample_aspect_ratio);
        video.set_gop(config.gop_size);
        video.set_max_b_frames(config.max_b_frames as usize);
        video.set_bit_rate(config.bit_rate as usize);
        video.set_color_range(match config.color_range {
            ColorRange::Jpeg => ffmpeg::color::Range::JPEG,
            ColorRange::Mpeg => ffmpeg::color::Range::MPEG,
        });
        if config.global_header {
            video.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }

        // SAFETY: the codec context is not opened yet, so its fields are ours
        // to set; the frames reference is a new reference owned by it.
        unsafe {
            let raw = video.as_mut_ptr();
            (*raw).qmin = config.qmin as i32;
            (*raw).qmax = config.qmax as i32;
            (*raw).hw_frames_ctx = ffi::av_buffer_ref(pool.frames_ref);
            if (*raw).hw_frames_ctx.is_null() {
                return Err(DriverFault::new(OUT_OF_MEMORY, "av_buffer_ref"));
            }
        }

        let encoder = video.open().map_err(fault)?;

        let mut frame = ffmpeg::frame::Video::empty();
        // SAFETY: `frame` is freshly allocated and `frames_ref` is initialized.
        unsafe {
            check(
                ffi::av_hwframe_get_buffer(pool.frames_ref, frame.as_mut_ptr(), 0),
                "av_hwframe_get_buffer",
            )?;
        }

        Ok(FfmpegEncoder {
            encoder,
            frame,
            name: config.encoder_name,
        })
    }
}

/// An opened libavcodec hardware encoder.
pub struct FfmpegEncoder {
    encoder: ffmpeg::encoder::video::Encoder,
    frame: ffmpeg::frame::Video,
    name: &'static str,
}

impl HardwareEncoder for FfmpegEncoder {
    fn name(&self) -> &'static str {
        self.name
    }

    fn send_frame(&mut self, frame: &SurfaceFrame) -> Result<(), DriverFault> {
        // The pool surface is only a carrier: point it at the captured memory.
        // SAFETY: the capture side keeps the surface alive until the encoder
        // returns from send_frame.
        unsafe {
            let raw = self.frame.as_mut_ptr();
            (*raw).data[0] = frame.ptr as *mut u8;
            (*raw).linesize[0] = frame.pitch as i32;
            if frame.format == PixelFormat::Nv12 {
                let chroma = frame.ptr + frame.pitch as u64 * frame.height as u64;
                (*raw).data[1] = chroma as *mut u8;
                (*raw).linesize[1] = frame.pitch as i32;
            }
        }
        self.frame.set_pts(Some(frame.pts));

        self.encoder.send_frame(&self.frame).map_err(fault)
    }

    fn send_eof(&mut self) -> Result<(), DriverFault> {
        self.encoder.send_eof().map_err(fault)
    }

    fn receive_packet(&mut self) -> ReceiveOutcome {
        let mut packet = ffmpeg::Packet::empty();

        match self.encoder.receive_packet(&mut packet) {
            Ok(()) => ReceiveOutcome::Packet(EncodedPacket {
                data: Bytes::copy_from_slice(packet.data().unwrap_or_default()),
                pts: packet.pts().unwrap_or(0),
                dts: packet.dts().unwrap_or(0),
                is_keyframe: packet.is_key(),
                stream_index: 0,
            }),
            Err(ffmpeg::Error::Eof) => ReceiveOutcome::EndOfStream,
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => {
                ReceiveOutcome::Again
            }
            Err(err) => {
                warn!(encoder = self.name, %err, "Encoder receive failed");
                ReceiveOutcome::Failed(fault(err))
            }
        }
    }

    fn extradata(&self) -> Option<Bytes> {
        // SAFETY: extradata is owned by the opened context and sized by
        // extradata_size.
        unsafe {
            let raw = self.encoder.as_ptr();
            let data = (*raw).extradata;
            let size = (*raw).extradata_size;
            if data.is_null() || size <= 0 {
                return None;
            }
            Some(Bytes::copy_from_slice(std::slice::from_raw_parts(
                data,
                size as usize,
            )))
        }
    }
}
