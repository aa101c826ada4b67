//! Session statistics collection and reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use nvstream_ipc::{SessionStats, WarningType};
use nvstream_mux::{DrainOutcome, DrainReport};

/// Sessions younger than this are not checked against the target rate.
const FRAME_RATE_GRACE: Duration = Duration::from_secs(2);

/// Collects session statistics from the capture loop.
pub struct MetricsCollector {
    start_time: RwLock<Option<Instant>>,
    frames_submitted: AtomicU64,
    repeated_frames: AtomicU64,
    packets_written: AtomicU64,
    bytes_written: AtomicU64,
    write_failures: AtomicU64,
    flow_control_stops: AtomicU64,
    last_stall: RwLock<Option<i32>>,
    last_report_time: RwLock<Instant>,
    last_frame_count: AtomicU64,
    last_failure_count: AtomicU64,
    target_fps: f32,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new(target_fps: f32) -> Self {
        Self {
            start_time: RwLock::new(None),
            frames_submitted: AtomicU64::new(0),
            repeated_frames: AtomicU64::new(0),
            packets_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            flow_control_stops: AtomicU64::new(0),
            last_stall: RwLock::new(None),
            last_report_time: RwLock::new(Instant::now()),
            last_frame_count: AtomicU64::new(0),
            last_failure_count: AtomicU64::new(0),
            target_fps,
        }
    }

    /// Start metrics collection.
    pub fn start(&self) {
        *self.start_time.write() = Some(Instant::now());
        *self.last_report_time.write() = Instant::now();
    }

    /// Stop metrics collection.
    pub fn stop(&self) {
        *self.start_time.write() = None;
    }

    /// Record a frame the source marked as a repeat.
    pub fn record_repeated(&self) {
        self.repeated_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a submitted frame and what its drain cycle did.
    pub fn record_drain(&self, report: &DrainReport) {
        self.frames_submitted.fetch_add(1, Ordering::Relaxed);
        self.record_packets(report);
    }

    /// Record packets drained outside of a frame submission.
    pub fn record_packets(&self, report: &DrainReport) {
        self.packets_written.fetch_add(report.written, Ordering::Relaxed);
        self.bytes_written.fetch_add(report.bytes, Ordering::Relaxed);
        self.write_failures.fetch_add(report.write_failures, Ordering::Relaxed);

        match &report.outcome {
            DrainOutcome::Exhausted => {
                self.flow_control_stops.fetch_add(1, Ordering::Relaxed);
            }
            DrainOutcome::Stalled(fault) => {
                *self.last_stall.write() = Some(fault.code);
            }
            DrainOutcome::EndOfStream => {}
        }
    }

    /// Get current statistics snapshot.
    pub fn snapshot(&self) -> SessionStats {
        let now = Instant::now();

        // Frame rate since the last report
        let last_time = *self.last_report_time.read();
        let elapsed = now.duration_since(last_time);
        let current_frames = self.frames_submitted.load(Ordering::Relaxed);
        let last_frames = self.last_frame_count.load(Ordering::Relaxed);

        let fps = if elapsed.as_secs_f32() > 0.0 {
            current_frames.saturating_sub(last_frames) as f32 / elapsed.as_secs_f32()
        } else {
            0.0
        };

        // Bit rate since start
        let bytes = self.bytes_written.load(Ordering::Relaxed);
        let bitrate_kbps = if let Some(start) = *self.start_time.read() {
            let total_elapsed = now.duration_since(start).as_secs_f32();
            if total_elapsed > 0.0 {
                ((bytes * 8) as f32 / total_elapsed / 1000.0) as u32
            } else {
                0
            }
        } else {
            0
        };

        let uptime_seconds = self
            .start_time
            .read()
            .map(|s| now.duration_since(s).as_secs())
            .unwrap_or(0);

        SessionStats {
            fps,
            target_fps: self.target_fps,
            bitrate_kbps,
            frames_submitted: current_frames,
            repeated_frames: self.repeated_frames.load(Ordering::Relaxed),
            packets_written: self.packets_written.load(Ordering::Relaxed),
            bytes_written: bytes,
            write_failures: self.write_failures.load(Ordering::Relaxed),
            flow_control_stops: self.flow_control_stops.load(Ordering::Relaxed),
            uptime_seconds,
        }
    }

    /// Check for warnings since the last report.
    pub fn check_warnings(&self, stats: &SessionStats) -> Vec<WarningType> {
        let mut warnings = Vec::new();

        let failures = stats
            .write_failures
            .saturating_sub(self.last_failure_count.load(Ordering::Relaxed));
        if failures > 0 {
            warnings.push(WarningType::PacketWriteFailures { count: failures });
        }

        if let Some(code) = self.last_stall.write().take() {
            warnings.push(WarningType::EncoderStalled { code });
        }

        let settled = self
            .start_time
            .read()
            .is_some_and(|s| s.elapsed() >= FRAME_RATE_GRACE);
        if settled && stats.fps < stats.target_fps * 0.9 {
            warnings.push(WarningType::FrameRateBelowTarget {
                fps: stats.fps,
                target_fps: stats.target_fps,
            });
        }

        warnings
    }

    /// Update last report time for rate calculations.
    pub fn mark_reported(&self) {
        *self.last_report_time.write() = Instant::now();
        self.last_frame_count.store(
            self.frames_submitted.load(Ordering::Relaxed),
            Ordering::Relaxed,
        );
        self.last_failure_count.store(
            self.write_failures.load(Ordering::Relaxed),
            Ordering::Relaxed,
        );
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(60.0)
    }
}
