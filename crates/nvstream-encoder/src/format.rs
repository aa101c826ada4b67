//! Pixel layouts and color metadata.

/// Pixel format tags understood by the frame pool and encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Opaque GPU surface; the real layout is the pool's software format.
    Cuda,

    /// Packed 8-bit B, G, R, unused (0RGB32 on little-endian hosts).
    Bgr0,

    /// 8-bit Y plane followed by interleaved UV at half resolution.
    Nv12,
}

impl PixelFormat {
    /// True for tags that name a device surface rather than a memory layout.
    pub fn is_hardware(self) -> bool {
        matches!(self, Self::Cuda)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Cuda => "cuda",
            Self::Bgr0 => "bgr0",
            Self::Nv12 => "nv12",
        }
    }
}

/// Quantization range of the encoded samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ColorRange {
    /// Full range, 0..=255.
    #[default]
    Jpeg,

    /// Limited range, 16..=235.
    Mpeg,
}
