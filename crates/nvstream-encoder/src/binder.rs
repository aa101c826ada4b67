//! Hardware frame pool creation and encoder binding.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, info, instrument};

use nvstream_gpu::DeviceContext;

use crate::{
    EncodeBackend, EncoderConfig, EncoderError, EncoderResult, HardwareEncoder, PixelFormat,
    ReceiveOutcome, SurfaceFrame,
};

/// Shape of a device-backed surface pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePoolDesc {
    /// Format the encoder sees.
    pub format: PixelFormat,

    /// Memory layout of each surface, as the capture side writes it.
    pub sw_format: PixelFormat,

    pub width: u32,
    pub height: u32,
}

/// A device-backed pool of surfaces sharing one format and size.
///
/// The pool holds the session's reference to the device context.
pub struct FramePool<P> {
    inner: P,
    desc: FramePoolDesc,
    device: Arc<DeviceContext>,
}

impl<P> FramePool<P> {
    pub fn desc(&self) -> &FramePoolDesc {
        &self.desc
    }

    pub fn device(&self) -> &Arc<DeviceContext> {
        &self.device
    }

    /// Backend-specific pool handle.
    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Release the pool, handing back the device reference it held.
    pub fn into_device(self) -> Arc<DeviceContext> {
        let FramePool { inner, device, .. } = self;
        drop(inner);
        device
    }
}

/// An opened encoder together with the pool feeding it.
pub struct BoundEncoder<E, P> {
    // Field order is drop order: the encoder is closed before its pool.
    encoder: E,
    pool: FramePool<P>,
    config: EncoderConfig,
    flushed: bool,
    frames_sent: u64,
}

impl<E: HardwareEncoder, P> BoundEncoder<E, P> {
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn pool(&self) -> &FramePool<P> {
        &self.pool
    }

    /// Number of frames accepted by the encoder.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Out-of-band codec headers.
    pub fn extradata(&self) -> Option<Bytes> {
        self.encoder.extradata()
    }

    /// Hand one frame to the encoder.
    ///
    /// A frame whose even-clamped size differs from the pool is rejected as
    /// a resolution change.
    pub fn submit(&mut self, frame: &SurfaceFrame) -> EncoderResult<()> {
        if self.flushed {
            return Err(EncoderError::AlreadyFlushed);
        }

        let desc = &self.pool.desc;
        let actual = (frame.width & !1, frame.height & !1);
        if actual != (desc.width, desc.height) {
            error!(
                expected_width = desc.width,
                expected_height = desc.height,
                width = frame.width,
                height = frame.height,
                "Source resolution changed"
            );
            return Err(EncoderError::ResolutionChanged {
                expected: (desc.width, desc.height),
                actual: (frame.width, frame.height),
            });
        }
        if frame.format != desc.sw_format {
            return Err(EncoderError::FormatMismatch {
                expected: desc.sw_format,
                actual: frame.format,
            });
        }

        self.encoder
            .send_frame(frame)
            .map_err(EncoderError::SendFailed)?;
        self.frames_sent += 1;
        Ok(())
    }

    /// Signal end of input. Later submissions fail.
    pub fn flush(&mut self) -> EncoderResult<()> {
        if self.flushed {
            return Ok(());
        }
        self.encoder
            .send_eof()
            .map_err(EncoderError::SendFailed)?;
        self.flushed = true;
        debug!(frames = self.frames_sent, "Encoder flushed");
        Ok(())
    }

    /// Pull the next packet.
    pub fn receive(&mut self) -> ReceiveOutcome {
        self.encoder.receive_packet()
    }

    /// The opened encoder, for packet draining.
    pub fn encoder_mut(&mut self) -> &mut E {
        &mut self.encoder
    }

    /// Split into encoder and pool so they can be released one at a time.
    /// Drop the encoder first.
    pub fn into_parts(self) -> (E, FramePool<P>) {
        (self.encoder, self.pool)
    }
}

/// Create the frame pool for `config` and open the encoder against it.
///
/// `native` is the surface layout the capture side produces. On failure
/// everything acquired here is released before returning.
#[instrument(
    name = "bind_encoder",
    skip_all,
    fields(encoder = config.encoder_name(), width = config.width(), height = config.height())
)]
pub fn bind<B: EncodeBackend + ?Sized>(
    backend: &B,
    device: Arc<DeviceContext>,
    config: EncoderConfig,
    native: PixelFormat,
) -> EncoderResult<BoundEncoder<B::Encoder, B::Pool>> {
    if native.is_hardware() {
        return Err(EncoderError::FormatMismatch {
            expected: PixelFormat::Bgr0,
            actual: native,
        });
    }

    let desc = FramePoolDesc {
        format: config.pixel_format,
        sw_format: native,
        width: config.width,
        height: config.height,
    };

    let inner = backend.init_frame_pool(&device, &desc).map_err(|fault| {
        error!(%fault, "Frame pool initialization failed");
        EncoderError::FrameContextInitFailed(fault)
    })?;
    let pool = FramePool {
        inner,
        desc,
        device,
    };

    let initialized = backend.pool_format(&pool.inner);
    if initialized != config.pixel_format {
        error!(
            expected = config.pixel_format.name(),
            actual = initialized.name(),
            "Frame pool format does not match the encoder"
        );
        return Err(EncoderError::FormatMismatch {
            expected: config.pixel_format,
            actual: initialized,
        });
    }
    debug!(sw_format = native.name(), "Frame pool initialized");

    let encoder = backend
        .open_encoder(&config, &pool.inner)
        .map_err(|fault| {
            error!(%fault, "Encoder open failed");
            EncoderError::EncoderOpenFailed {
                name: config.encoder_name,
                fault,
            }
        })?;

    info!(
        encoder = encoder.name(),
        bit_rate = config.bit_rate,
        "Encoder opened"
    );

    Ok(BoundEncoder {
        encoder,
        pool,
        config,
        flushed: false,
        frames_sent: 0,
    })
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use nvstream_gpu::{
        acquire_context, DeviceDriver, DeviceHandle, DriverFault, RawContext, SchedulePolicy,
    };

    use super::*;
    use crate::{configure, CodecFamily, CodecRegistry, EncoderRequest, QualityTier};

    type Log = Arc<Mutex<Vec<&'static str>>>;

    struct LoggingDriver(Log);

    impl DeviceDriver for LoggingDriver {
        fn name(&self) -> &'static str {
            "test"
        }
        fn init(&self) -> Result<(), DriverFault> {
            Ok(())
        }
        fn device_count(&self) -> Result<u32, DriverFault> {
            Ok(1)
        }
        fn device(&self, ordinal: u32) -> Result<DeviceHandle, DriverFault> {
            Ok(DeviceHandle(ordinal as i32))
        }
        fn create_context(
            &self,
            _device: DeviceHandle,
            _policy: SchedulePolicy,
        ) -> Result<RawContext, DriverFault> {
            Ok(RawContext::from_ptr(0x1 as *mut _))
        }
        fn destroy_context(&self, _context: RawContext) -> Result<(), DriverFault> {
            self.0.lock().push("device");
            Ok(())
        }
    }

    struct TestPool {
        log: Log,
        format: PixelFormat,
    }

    impl Drop for TestPool {
        fn drop(&mut self) {
            self.log.lock().push("pool");
        }
    }

    struct TestEncoder {
        log: Log,
        sent: Vec<SurfaceFrame>,
        eof: bool,
    }

    impl Drop for TestEncoder {
        fn drop(&mut self) {
            self.log.lock().push("encoder");
        }
    }

    impl HardwareEncoder for TestEncoder {
        fn name(&self) -> &'static str {
            "h264_nvenc"
        }
        fn send_frame(&mut self, frame: &SurfaceFrame) -> Result<(), DriverFault> {
            self.sent.push(*frame);
            Ok(())
        }
        fn send_eof(&mut self) -> Result<(), DriverFault> {
            self.eof = true;
            Ok(())
        }
        fn receive_packet(&mut self) -> ReceiveOutcome {
            if self.eof {
                ReceiveOutcome::EndOfStream
            } else {
                ReceiveOutcome::Again
            }
        }
        fn extradata(&self) -> Option<Bytes> {
            None
        }
    }

    struct TestBackend {
        log: Log,
        fail_pool: bool,
        fail_open: bool,
        /// Format the pool comes up with instead of the requested one.
        pool_format: Option<PixelFormat>,
        seen_desc: Mutex<Option<FramePoolDesc>>,
    }

    impl TestBackend {
        fn new(log: &Log) -> Self {
            Self {
                log: Arc::clone(log),
                fail_pool: false,
                fail_open: false,
                pool_format: None,
                seen_desc: Mutex::new(None),
            }
        }
    }

    impl CodecRegistry for TestBackend {
        fn has_encoder(&self, name: &str) -> bool {
            name == "h264_nvenc"
        }
    }

    impl EncodeBackend for TestBackend {
        type Pool = TestPool;
        type Encoder = TestEncoder;

        fn init_frame_pool(
            &self,
            _device: &DeviceContext,
            desc: &FramePoolDesc,
        ) -> Result<TestPool, DriverFault> {
            if self.fail_pool {
                return Err(DriverFault::new(-22, "Invalid argument"));
            }
            *self.seen_desc.lock() = Some(*desc);
            Ok(TestPool {
                log: Arc::clone(&self.log),
                format: self.pool_format.unwrap_or(desc.format),
            })
        }

        fn pool_format(&self, pool: &TestPool) -> PixelFormat {
            pool.format
        }

        fn open_encoder(
            &self,
            _config: &EncoderConfig,
            _pool: &TestPool,
        ) -> Result<TestEncoder, DriverFault> {
            if self.fail_open {
                return Err(DriverFault::new(-38, "Function not implemented"));
            }
            Ok(TestEncoder {
                log: Arc::clone(&self.log),
                sent: Vec::new(),
                eof: false,
            })
        }
    }

    fn setup(log: &Log) -> (Arc<DeviceContext>, EncoderConfig) {
        let driver: Arc<dyn DeviceDriver> = Arc::new(LoggingDriver(Arc::clone(log)));
        let device = Arc::new(acquire_context(driver).unwrap());
        let config = configure(
            &TestBackend::new(log),
            &EncoderRequest {
                tier: QualityTier::Medium,
                width: 1921,
                height: 1081,
                fps: 60,
                family: CodecFamily::Avc,
                global_header: false,
            },
        )
        .unwrap();
        (device, config)
    }

    fn frame(width: u32, height: u32) -> SurfaceFrame {
        SurfaceFrame {
            ptr: 0x7f00_0000,
            pitch: width * 4,
            width,
            height,
            format: PixelFormat::Bgr0,
            pts: 0,
        }
    }

    #[test]
    fn test_pool_matches_config() {
        let log = Log::default();
        let (device, config) = setup(&log);
        let backend = TestBackend::new(&log);

        let bound = bind(&backend, device, config.clone(), PixelFormat::Bgr0).unwrap();

        let desc = backend.seen_desc.lock().clone().unwrap();
        assert_eq!(desc.format, config.pixel_format());
        assert_eq!(desc.sw_format, PixelFormat::Bgr0);
        assert_eq!((desc.width, desc.height), (1920, 1080));
        assert_eq!(bound.pool().desc(), &desc);
        assert_eq!(bound.config(), &config);
    }

    #[test]
    fn test_teardown_is_reverse_of_creation() {
        let log = Log::default();
        let (device, config) = setup(&log);
        let backend = TestBackend::new(&log);

        let bound = bind(&backend, device, config, PixelFormat::Bgr0).unwrap();
        drop(bound);

        assert_eq!(*log.lock(), vec!["encoder", "pool", "device"]);
    }

    #[test]
    fn test_staged_release() {
        let log = Log::default();
        let (device, config) = setup(&log);
        let backend = TestBackend::new(&log);

        let bound = bind(&backend, device, config, PixelFormat::Bgr0).unwrap();
        let (encoder, pool) = bound.into_parts();
        drop(encoder);
        assert_eq!(*log.lock(), vec!["encoder"]);

        let device = pool.into_device();
        assert_eq!(*log.lock(), vec!["encoder", "pool"]);
        drop(device);
        assert_eq!(*log.lock(), vec!["encoder", "pool", "device"]);
    }

    #[test]
    fn test_pool_failure_releases_device() {
        let log = Log::default();
        let (device, config) = setup(&log);
        let backend = TestBackend {
            fail_pool: true,
            ..TestBackend::new(&log)
        };

        let err = bind(&backend, device, config, PixelFormat::Bgr0).err().unwrap();
        assert!(matches!(err, EncoderError::FrameContextInitFailed(ref f) if f.code == -22));
        assert_eq!(*log.lock(), vec!["device"]);
    }

    #[test]
    fn test_open_failure_releases_pool_then_device() {
        let log = Log::default();
        let (device, config) = setup(&log);
        let backend = TestBackend {
            fail_open: true,
            ..TestBackend::new(&log)
        };

        let err = bind(&backend, device, config, PixelFormat::Bgr0).err().unwrap();
        assert!(matches!(
            err,
            EncoderError::EncoderOpenFailed {
                name: "h264_nvenc",
                ..
            }
        ));
        assert_eq!(*log.lock(), vec!["pool", "device"]);
    }

    #[test]
    fn test_pool_format_must_match_encoder() {
        let log = Log::default();
        let (device, config) = setup(&log);
        let backend = TestBackend {
            pool_format: Some(PixelFormat::Nv12),
            ..TestBackend::new(&log)
        };

        let err = bind(&backend, device, config, PixelFormat::Bgr0).err().unwrap();
        assert!(matches!(
            err,
            EncoderError::FormatMismatch {
                expected: PixelFormat::Cuda,
                actual: PixelFormat::Nv12,
            }
        ));
        assert_eq!(*log.lock(), vec!["pool", "device"]);
    }

    #[test]
    fn test_hardware_tag_is_not_a_native_layout() {
        let log = Log::default();
        let (device, config) = setup(&log);
        let backend = TestBackend::new(&log);

        let err = bind(&backend, device, config, PixelFormat::Cuda).err().unwrap();
        assert!(matches!(err, EncoderError::FormatMismatch { .. }));
        assert!(backend.seen_desc.lock().is_none());
    }

    #[test]
    fn test_submit_accepts_odd_source_size() {
        let log = Log::default();
        let (device, config) = setup(&log);
        let backend = TestBackend::new(&log);
        let mut bound = bind(&backend, device, config, PixelFormat::Bgr0).unwrap();

        bound.submit(&frame(1921, 1081)).unwrap();
        bound.submit(&frame(1920, 1080)).unwrap();
        assert_eq!(bound.frames_sent(), 2);
        assert_eq!(bound.encoder_mut().sent.len(), 2);
    }

    #[test]
    fn test_resolution_change_is_rejected() {
        let log = Log::default();
        let (device, config) = setup(&log);
        let backend = TestBackend::new(&log);
        let mut bound = bind(&backend, device, config, PixelFormat::Bgr0).unwrap();

        let err = bound.submit(&frame(1280, 720)).unwrap_err();
        assert!(matches!(
            err,
            EncoderError::ResolutionChanged {
                expected: (1920, 1080),
                actual: (1280, 720),
            }
        ));
        assert!(!err.is_recoverable());
        assert_eq!(bound.frames_sent(), 0);
    }

    #[test]
    fn test_format_change_is_rejected() {
        let log = Log::default();
        let (device, config) = setup(&log);
        let backend = TestBackend::new(&log);
        let mut bound = bind(&backend, device, config, PixelFormat::Bgr0).unwrap();

        let nv12 = SurfaceFrame {
            format: PixelFormat::Nv12,
            ..frame(1920, 1080)
        };
        assert!(matches!(
            bound.submit(&nv12),
            Err(EncoderError::FormatMismatch { .. })
        ));
    }

    #[test]
    fn test_flush_blocks_further_frames() {
        let log = Log::default();
        let (device, config) = setup(&log);
        let backend = TestBackend::new(&log);
        let mut bound = bind(&backend, device, config, PixelFormat::Bgr0).unwrap();

        assert!(matches!(bound.receive(), ReceiveOutcome::Again));
        bound.flush().unwrap();
        bound.flush().unwrap();
        assert!(bound.is_flushed());
        assert!(matches!(bound.receive(), ReceiveOutcome::EndOfStream));
        assert!(matches!(
            bound.submit(&frame(1920, 1080)),
            Err(EncoderError::AlreadyFlushed)
        ));
    }
}
