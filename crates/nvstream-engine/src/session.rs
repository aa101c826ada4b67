//! One capture session: device, encoder, pool and output stream.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use nvstream_capture::{CapturedFrame, SurfaceFormat};
use nvstream_encoder::{
    bind, configure, BoundEncoder, EncodeBackend, EncoderRequest, HardwareEncoder, PixelFormat,
    SurfaceFrame,
};
use nvstream_gpu::{acquire_context, DeviceDriver};
use nvstream_ipc::{SessionConfig, ShutdownPhase, StartupPhase};
use nvstream_mux::{
    publish, Container, DrainOutcome, DrainReport, MuxError, OutputStream, PacketDrain,
};

use crate::{EngineError, EngineResult};

/// Encoder-side layout of a captured surface.
pub fn native_format(format: SurfaceFormat) -> PixelFormat {
    match format {
        SurfaceFormat::Bgra => PixelFormat::Bgr0,
        SurfaceFormat::Nv12 => PixelFormat::Nv12,
    }
}

/// Totals reported when a session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames_submitted: u64,
    pub packets_written: u64,
    pub write_failures: u64,

    /// Whether the encoder delivered everything it buffered.
    pub reached_end_of_stream: bool,

    pub duration: Duration,
}

/// A running session as the engine sees it.
pub trait Pipeline: Send + Sync {
    /// Encode one frame and write whatever packets it produced.
    fn submit(&self, frame: &CapturedFrame) -> EngineResult<DrainReport>;

    /// Flush, write the trailer and release everything, reporting each
    /// shutdown phase as it begins.
    fn finish(
        self: Box<Self>,
        observer: &mut dyn FnMut(ShutdownPhase),
    ) -> EngineResult<SessionSummary>;
}

/// Collects what a session needs and runs the startup phases.
pub struct SessionBuilder<'a, B, C> {
    driver: Arc<dyn DeviceDriver>,
    backend: &'a B,
    container: C,
    config: SessionConfig,
}

impl<'a, B, C> SessionBuilder<'a, B, C>
where
    B: EncodeBackend,
    C: Container,
{
    pub fn new(
        driver: Arc<dyn DeviceDriver>,
        backend: &'a B,
        container: C,
        config: SessionConfig,
    ) -> Self {
        Self {
            driver,
            backend,
            container,
            config,
        }
    }

    /// Build a session for frames of the given size and layout.
    pub fn start(
        self,
        width: u32,
        height: u32,
        format: SurfaceFormat,
    ) -> EngineResult<PipelineSession<B::Encoder, B::Pool, C>> {
        self.start_observed(width, height, format, &mut |_| {})
    }

    /// Like [`start`](Self::start), reporting each phase as it begins.
    ///
    /// When a phase fails, everything acquired by earlier phases is released
    /// in reverse order before the error is returned.
    #[instrument(
        name = "session_start",
        skip_all,
        fields(
            width = width,
            height = height,
            codec = self.config.codec.name(),
            tier = self.config.quality.name()
        )
    )]
    pub fn start_observed(
        self,
        width: u32,
        height: u32,
        format: SurfaceFormat,
        observer: &mut dyn FnMut(StartupPhase),
    ) -> EngineResult<PipelineSession<B::Encoder, B::Pool, C>> {
        let Self {
            driver,
            backend,
            mut container,
            config,
        } = self;
        config.validate()?;

        let mut phase = StartupPhase::AcquireDevice;
        observer(phase);
        info!(driver = driver.name(), "{phase}");
        let device = acquire_context(driver)
            .map(Arc::new)
            .map_err(|e| EngineError::startup(phase, e))?;

        phase = StartupPhase::ConfigureEncoder;
        observer(phase);
        info!("{phase}");
        let request = EncoderRequest {
            tier: config.quality,
            width,
            height,
            fps: config.fps,
            family: config.codec,
            global_header: container.requires_global_header(),
        };
        let encoder_config =
            configure(backend, &request).map_err(|e| EngineError::startup(phase, e))?;

        phase = StartupPhase::BindFrames;
        observer(phase);
        info!("{phase}");
        let native = native_format(format);
        let mut bound = bind(backend, device, encoder_config, native)
            .map_err(|e| EngineError::startup(phase, e))?;

        phase = StartupPhase::PublishStream;
        observer(phase);
        info!("{phase}");
        let stream = publish(&mut container, bound.config(), bound.extradata())
            .map_err(|e| EngineError::startup(phase, e))?;

        phase = StartupPhase::WriteHeader;
        observer(phase);
        info!("{phase}");
        container
            .write_header()
            .map_err(|fault| EngineError::startup(phase, MuxError::HeaderFailed(fault)))?;

        info!(
            encoder = bound.encoder_mut().name(),
            width = bound.config().width(),
            height = bound.config().height(),
            fps = config.fps,
            "Session started"
        );

        Ok(PipelineSession {
            inner: Mutex::new(SessionInner {
                container,
                stream,
                drain: PacketDrain::new(),
                bound,
                last_pts: None,
            }),
            started: Instant::now(),
        })
    }
}

struct SessionInner<E, P, C> {
    container: C,
    stream: OutputStream,
    drain: PacketDrain,
    bound: BoundEncoder<E, P>,
    last_pts: Option<i64>,
}

/// A started session.
///
/// Submission, draining and writing happen under one lock, so the session
/// can be shared between producer threads.
pub struct PipelineSession<E, P, C> {
    inner: Mutex<SessionInner<E, P, C>>,
    started: Instant,
}

impl<E, P, C> PipelineSession<E, P, C>
where
    E: HardwareEncoder,
    C: Container,
{
    pub fn stream(&self) -> OutputStream {
        self.inner.lock().stream
    }

    /// Frames accepted by the encoder so far.
    pub fn frames_submitted(&self) -> u64 {
        self.inner.lock().bound.frames_sent()
    }

    /// Encode one frame and write the packets it produced.
    ///
    /// The frame is stamped with its capture time in the encoder time base.
    /// A timestamp that does not advance past the previous frame is bumped
    /// by one tick.
    ///
    /// Once the encoder has reported end of stream no frame reaches it
    /// again; every later call fails with [`MuxError::EncoderTerminated`].
    pub fn submit(&self, frame: &CapturedFrame) -> EngineResult<DrainReport> {
        if !frame.is_valid() {
            return Err(EngineError::InvalidFrame {
                sequence: frame.sequence,
            });
        }

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.drain.is_terminal() {
            return Err(MuxError::EncoderTerminated.into());
        }
        let time_base = inner.bound.config().time_base();

        let mut pts = time_base.ticks(frame.timestamp.since_start);
        if let Some(last) = inner.last_pts {
            if pts <= last {
                pts = last + 1;
            }
        }

        let surface = SurfaceFrame {
            ptr: frame.surface.ptr,
            pitch: frame.surface.pitch,
            width: frame.width,
            height: frame.height,
            format: native_format(frame.format),
            pts,
        };
        inner.bound.submit(&surface)?;
        inner.last_pts = Some(pts);

        let report = inner.drain.drain(
            inner.bound.encoder_mut(),
            time_base,
            &inner.stream,
            pts,
            &mut inner.container,
        )?;
        Ok(report)
    }

    /// Flush the encoder, write the trailer and release everything.
    pub fn finish(self) -> EngineResult<SessionSummary> {
        self.finish_observed(&mut |_| {})
    }

    /// Like [`finish`](Self::finish), reporting each phase as it begins.
    ///
    /// Every phase runs even if an earlier one failed; the first error is
    /// returned at the end.
    #[instrument(name = "session_finish", skip_all)]
    pub fn finish_observed(
        self,
        observer: &mut dyn FnMut(ShutdownPhase),
    ) -> EngineResult<SessionSummary> {
        let duration = self.started.elapsed();
        let SessionInner {
            mut container,
            stream,
            mut drain,
            mut bound,
            last_pts,
        } = self.inner.into_inner();
        let mut first_error: Option<EngineError> = None;

        observer(ShutdownPhase::FlushEncoder);
        info!("{}", ShutdownPhase::FlushEncoder.name());
        if !drain.is_terminal() {
            let time_base = bound.config().time_base();
            let flushed = bound.flush().map_err(EngineError::from).and_then(|()| {
                drain
                    .drain(
                        bound.encoder_mut(),
                        time_base,
                        &stream,
                        last_pts.unwrap_or(0),
                        &mut container,
                    )
                    .map_err(EngineError::from)
            });
            match flushed {
                Ok(report) => match report.outcome {
                    DrainOutcome::EndOfStream => {
                        debug!(packets = report.written, "Encoder drained")
                    }
                    DrainOutcome::Exhausted => {
                        warn!("Encoder asked for input after end of input")
                    }
                    DrainOutcome::Stalled(fault) => {
                        warn!(%fault, "Encoder stalled while flushing")
                    }
                },
                Err(err) => {
                    error!(%err, "Failed to flush encoder");
                    first_error.get_or_insert(err);
                }
            }
        }

        observer(ShutdownPhase::WriteTrailer);
        info!("{}", ShutdownPhase::WriteTrailer.name());
        if let Err(fault) = container.write_trailer() {
            error!(%fault, "Failed to write container trailer");
            first_error.get_or_insert(MuxError::TrailerFailed(fault).into());
        }
        drop(container);

        let summary = SessionSummary {
            frames_submitted: bound.frames_sent(),
            packets_written: drain.packets_written(),
            write_failures: drain.write_failures(),
            reached_end_of_stream: drain.is_terminal(),
            duration,
        };

        observer(ShutdownPhase::ReleaseEncoder);
        info!("{}", ShutdownPhase::ReleaseEncoder.name());
        let (encoder, pool) = bound.into_parts();
        drop(encoder);

        observer(ShutdownPhase::ReleaseFramePool);
        info!("{}", ShutdownPhase::ReleaseFramePool.name());
        let device = pool.into_device();

        observer(ShutdownPhase::ReleaseDevice);
        info!("{}", ShutdownPhase::ReleaseDevice.name());
        drop(device);

        info!(
            frames = summary.frames_submitted,
            packets = summary.packets_written,
            write_failures = summary.write_failures,
            duration_secs = summary.duration.as_secs_f32(),
            "Session finished"
        );

        match first_error {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }
}

impl<E, P, C> Pipeline for PipelineSession<E, P, C>
where
    E: HardwareEncoder,
    P: Send,
    C: Container,
{
    fn submit(&self, frame: &CapturedFrame) -> EngineResult<DrainReport> {
        PipelineSession::submit(self, frame)
    }

    fn finish(
        self: Box<Self>,
        observer: &mut dyn FnMut(ShutdownPhase),
    ) -> EngineResult<SessionSummary> {
        (*self).finish_observed(observer)
    }
}
