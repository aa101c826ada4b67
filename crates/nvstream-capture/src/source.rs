//! Channel-backed frame source.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, trace};

use crate::{
    CaptureError, CaptureResult, CapturedFrame, FrameSource, SurfaceFormat, FRAME_CHANNEL_CAPACITY,
};

/// Create a bounded frame channel for a producer of the given geometry.
///
/// The producer thread keeps the [`FrameSender`]; the engine consumes the
/// [`ChannelSource`].
pub fn channel_source(
    width: u32,
    height: u32,
    format: SurfaceFormat,
) -> (FrameSender, ChannelSource) {
    let (tx, rx) = crossbeam_channel::bounded(FRAME_CHANNEL_CAPACITY);
    (
        FrameSender { tx },
        ChannelSource {
            rx,
            width,
            height,
            format,
            stopped: false,
        },
    )
}

/// Producer half of [`channel_source`].
#[derive(Clone)]
pub struct FrameSender {
    tx: Sender<CapturedFrame>,
}

impl FrameSender {
    /// Queue a frame without blocking.
    ///
    /// Returns `Ok(false)` when the queue is full and the frame was dropped.
    pub fn send(&self, frame: CapturedFrame) -> CaptureResult<bool> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(frame)) => {
                trace!(sequence = frame.sequence, "Frame queue full, dropping frame");
                Ok(false)
            }
            Err(TrySendError::Disconnected(_)) => Err(CaptureError::ChannelDisconnected),
        }
    }
}

/// Consumer half of [`channel_source`].
pub struct ChannelSource {
    rx: Receiver<CapturedFrame>,
    width: u32,
    height: u32,
    format: SurfaceFormat,
    stopped: bool,
}

impl FrameSource for ChannelSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn format(&self) -> SurfaceFormat {
        self.format
    }

    fn next_frame(&mut self, timeout: Duration) -> CaptureResult<Option<CapturedFrame>> {
        if self.stopped {
            return Err(CaptureError::Stopped);
        }

        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Frame producer disconnected");
                Err(CaptureError::ChannelDisconnected)
            }
        }
    }

    fn stop(&mut self) -> CaptureResult<()> {
        self.stopped = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::{CaptureTimestamp, DeviceSurface};

    fn frame(sequence: u64) -> CapturedFrame {
        CapturedFrame::new(
            DeviceSurface {
                ptr: 0xdead_0000,
                pitch: 5120,
            },
            1280,
            720,
            SurfaceFormat::Bgra,
            CaptureTimestamp::now(Instant::now()),
            sequence,
        )
    }

    #[test]
    fn test_frames_arrive_in_order() {
        let (tx, mut source) = channel_source(1280, 720, SurfaceFormat::Bgra);
        assert!(tx.send(frame(1)).unwrap());
        assert!(tx.send(frame(2)).unwrap());

        let timeout = Duration::from_millis(10);
        assert_eq!(source.next_frame(timeout).unwrap().unwrap().sequence, 1);
        assert_eq!(source.next_frame(timeout).unwrap().unwrap().sequence, 2);
        assert!(source.next_frame(timeout).unwrap().is_none());
    }

    #[test]
    fn test_full_queue_drops_frame() {
        let (tx, _source) = channel_source(1280, 720, SurfaceFormat::Bgra);
        for i in 0..FRAME_CHANNEL_CAPACITY as u64 {
            assert!(tx.send(frame(i)).unwrap());
        }
        assert!(!tx.send(frame(99)).unwrap());
    }

    #[test]
    fn test_disconnected_producer_is_an_error() {
        let (tx, mut source) = channel_source(1280, 720, SurfaceFormat::Bgra);
        drop(tx);
        let err = source.next_frame(Duration::from_millis(1)).unwrap_err();
        assert!(matches!(err, CaptureError::ChannelDisconnected));
    }

    #[test]
    fn test_send_after_consumer_dropped() {
        let (tx, source) = channel_source(1280, 720, SurfaceFormat::Bgra);
        drop(source);
        assert!(matches!(
            tx.send(frame(0)),
            Err(CaptureError::ChannelDisconnected)
        ));
    }

    #[test]
    fn test_stopped_source_refuses_frames() {
        let (tx, mut source) = channel_source(640, 480, SurfaceFormat::Nv12);
        tx.send(frame(0)).unwrap();
        source.stop().unwrap();

        assert_eq!(source.dimensions(), (640, 480));
        assert_eq!(source.format(), SurfaceFormat::Nv12);
        assert!(matches!(
            source.next_frame(Duration::from_millis(1)),
            Err(CaptureError::Stopped)
        ));
    }
}
