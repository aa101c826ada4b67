//! Common types used across IPC messages.

use serde::{Deserialize, Serialize};

/// Encoding quality tier.
///
/// Higher tiers trade bit rate for a tighter quantizer range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityTier {
    /// All tiers, lowest first.
    pub const ALL: [QualityTier; 3] = [Self::Low, Self::Medium, Self::High];

    pub fn name(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Compressed video family produced by the hardware encoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecFamily {
    /// H.264 / AVC.
    #[default]
    Avc,

    /// H.265 / HEVC.
    Hevc,
}

impl CodecFamily {
    /// Both families.
    pub const ALL: [CodecFamily; 2] = [Self::Avc, Self::Hevc];

    pub fn name(self) -> &'static str {
        match self {
            Self::Avc => "avc",
            Self::Hevc => "hevc",
        }
    }
}

/// Live session statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Frames handed to the encoder per second since the last report.
    pub fps: f32,

    /// Configured frame rate.
    pub target_fps: f32,

    /// Average output bit rate in kbps since the session started.
    pub bitrate_kbps: u32,

    /// Total frames submitted.
    pub frames_submitted: u64,

    /// Frames the source delivered without new content.
    pub repeated_frames: u64,

    /// Packets handed to the container successfully.
    pub packets_written: u64,

    /// Bytes handed to the container successfully.
    pub bytes_written: u64,

    /// Packets the container refused.
    pub write_failures: u64,

    /// Drain cycles that stopped because the encoder needed more input.
    pub flow_control_stops: u64,

    /// Session uptime in seconds.
    pub uptime_seconds: u64,
}

/// Non-fatal conditions reported to the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WarningType {
    /// The container refused packets since the last report.
    PacketWriteFailures { count: u64 },

    /// The encoder returned an unexpected code and the drain gave up for
    /// this frame.
    EncoderStalled { code: i32 },

    /// Frames are being submitted slower than configured.
    FrameRateBelowTarget { fps: f32, target_fps: f32 },
}
