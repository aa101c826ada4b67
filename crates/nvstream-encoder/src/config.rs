//! Encoder parameter derivation.

use tracing::{debug, instrument, warn};

use nvstream_ipc::{CodecFamily, QualityTier};

use crate::{CodecRegistry, ColorRange, EncoderError, EncoderResult, PixelFormat, Rational};

/// AVC implementations, most preferred first.
pub const AVC_CANDIDATES: &[&str] = &["h264_nvenc", "nvenc_h264"];

/// HEVC implementations, most preferred first.
pub const HEVC_CANDIDATES: &[&str] = &["hevc_nvenc", "nvenc_hevc"];

/// Microsecond ticks.
pub const ENCODER_TIME_BASE: Rational = Rational::new(1, 1_000_000);

/// Bit-rate floor of the default tier, before the per-pixel share.
pub const BASE_BIT_RATE: u64 = 12_500_000;

/// Candidate implementation names for a codec family.
pub fn encoder_candidates(family: CodecFamily) -> &'static [&'static str] {
    match family {
        CodecFamily::Avc => AVC_CANDIDATES,
        CodecFamily::Hevc => HEVC_CANDIDATES,
    }
}

/// Pick the first registered implementation for `family`.
pub fn select_encoder<R: CodecRegistry + ?Sized>(
    registry: &R,
    family: CodecFamily,
) -> EncoderResult<&'static str> {
    let candidates = encoder_candidates(family);

    for &name in candidates {
        if registry.has_encoder(name) {
            debug!(encoder = name, "Selected encoder implementation");
            return Ok(name);
        }
        debug!(encoder = name, "Encoder implementation not registered");
    }

    warn!(family = family.name(), "No hardware encoder registered");
    Err(EncoderError::EncoderUnavailable {
        family,
        tried: candidates.join(", "),
    })
}

/// Rate control settings of one tier for one codec family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierProfile {
    /// Bit rate before adding half a bit per pixel.
    pub bit_rate_floor: u64,
    pub qmin: u32,
    pub qmax: u32,
}

/// Look up the rate control settings for a tier and family.
pub fn tier_profile(tier: QualityTier, family: CodecFamily) -> TierProfile {
    let (bit_rate_floor, qmin, qmax) = match (tier, family) {
        (QualityTier::Low, CodecFamily::Avc) => (10_000_000, 5, 20),
        (QualityTier::Low, CodecFamily::Hevc) => (10_000_000, 20, 35),
        (QualityTier::Medium, CodecFamily::Avc) => (BASE_BIT_RATE, 5, 15),
        (QualityTier::Medium, CodecFamily::Hevc) => (BASE_BIT_RATE, 17, 30),
        (QualityTier::High, CodecFamily::Avc) => (15_000_000, 3, 13),
        (QualityTier::High, CodecFamily::Hevc) => (15_000_000, 16, 25),
    };

    TierProfile {
        bit_rate_floor,
        qmin,
        qmax,
    }
}

/// Inputs to [`configure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderRequest {
    pub tier: QualityTier,

    /// Source width in pixels.
    pub width: u32,

    /// Source height in pixels.
    pub height: u32,

    pub fps: u32,
    pub family: CodecFamily,

    /// Whether the container wants codec headers out of band.
    pub global_header: bool,
}

/// Immutable encoder parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    pub(crate) encoder_name: &'static str,
    pub(crate) family: CodecFamily,
    pub(crate) tier: QualityTier,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) bit_rate: u64,
    pub(crate) qmin: u32,
    pub(crate) qmax: u32,
    pub(crate) gop_size: u32,
    pub(crate) max_b_frames: u32,
    pub(crate) pixel_format: PixelFormat,
    pub(crate) color_range: ColorRange,
    pub(crate) time_base: Rational,
    pub(crate) frame_rate: Rational,
    pub(crate) sample_aspect_ratio: Rational,
    pub(crate) global_header: bool,
}

impl EncoderConfig {
    pub fn encoder_name(&self) -> &'static str {
        self.encoder_name
    }

    pub fn family(&self) -> CodecFamily {
        self.family
    }

    pub fn tier(&self) -> QualityTier {
        self.tier
    }

    /// Encoded width, always even.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Encoded height, always even.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Target bits per second.
    pub fn bit_rate(&self) -> u64 {
        self.bit_rate
    }

    pub fn qmin(&self) -> u32 {
        self.qmin
    }

    pub fn qmax(&self) -> u32 {
        self.qmax
    }

    /// Frames between keyframes.
    pub fn gop_size(&self) -> u32 {
        self.gop_size
    }

    /// Always 0, so decode order equals presentation order.
    pub fn max_b_frames(&self) -> u32 {
        self.max_b_frames
    }

    /// Format of the frames the encoder accepts.
    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn color_range(&self) -> ColorRange {
        self.color_range
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn frame_rate(&self) -> Rational {
        self.frame_rate
    }

    pub fn sample_aspect_ratio(&self) -> Rational {
        self.sample_aspect_ratio
    }

    pub fn global_header(&self) -> bool {
        self.global_header
    }
}

/// Derive encoder parameters for a session.
#[instrument(
    name = "configure_encoder",
    skip_all,
    fields(tier = request.tier.name(), family = request.family.name())
)]
pub fn configure<R: CodecRegistry + ?Sized>(
    registry: &R,
    request: &EncoderRequest,
) -> EncoderResult<EncoderConfig> {
    let width = request.width & !1;
    let height = request.height & !1;

    let fps = match i32::try_from(request.fps) {
        Ok(fps) if fps > 0 && width > 0 && height > 0 => fps,
        _ => {
            return Err(EncoderError::InvalidGeometry {
                width: request.width,
                height: request.height,
                fps: request.fps,
            })
        }
    };

    let encoder_name = select_encoder(registry, request.family)?;
    let profile = tier_profile(request.tier, request.family);
    let pixels = width as u64 * height as u64;

    let config = EncoderConfig {
        encoder_name,
        family: request.family,
        tier: request.tier,
        width,
        height,
        bit_rate: profile.bit_rate_floor + pixels / 2,
        qmin: profile.qmin,
        qmax: profile.qmax,
        gop_size: request.fps.saturating_mul(2),
        max_b_frames: 0,
        pixel_format: PixelFormat::Cuda,
        color_range: ColorRange::Jpeg,
        time_base: ENCODER_TIME_BASE,
        frame_rate: Rational::new(fps, 1),
        sample_aspect_ratio: Rational::UNSET,
        global_header: request.global_header,
    };

    debug!(
        encoder = config.encoder_name,
        width = config.width,
        height = config.height,
        bit_rate = config.bit_rate,
        qmin = config.qmin,
        qmax = config.qmax,
        gop = config.gop_size,
        global_header = config.global_header,
        "Encoder configured"
    );

    Ok(config)
}
