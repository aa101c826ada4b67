//! Fakes shared by the engine tests.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use nvstream_encoder::{
    CodecRegistry, EncodeBackend, EncodedPacket, EncoderConfig, FramePoolDesc, HardwareEncoder,
    PixelFormat, ReceiveOutcome, SurfaceFrame,
};
use nvstream_gpu::{
    DeviceContext, DeviceDriver, DeviceHandle, DriverFault, RawContext, SchedulePolicy,
};

/// Release log shared by the fakes.
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<&'static str>>>);

impl Events {
    fn push(&self, event: &'static str) {
        self.0.lock().push(event);
    }

    /// Everything logged so far, clearing the log.
    pub fn take(&self) -> Vec<&'static str> {
        std::mem::take(&mut *self.0.lock())
    }
}

pub struct FakeDriver {
    events: Events,
    devices: u32,
}

impl FakeDriver {
    pub fn shared(events: &Events) -> Arc<dyn DeviceDriver> {
        Self::shared_with_devices(events, 1)
    }

    pub fn shared_with_devices(events: &Events, devices: u32) -> Arc<dyn DeviceDriver> {
        Arc::new(Self {
            events: events.clone(),
            devices,
        })
    }
}

impl DeviceDriver for FakeDriver {
    fn name(&self) -> &'static str {
        "fake"
    }
    fn init(&self) -> Result<(), DriverFault> {
        Ok(())
    }
    fn device_count(&self) -> Result<u32, DriverFault> {
        Ok(self.devices)
    }
    fn device(&self, ordinal: u32) -> Result<DeviceHandle, DriverFault> {
        Ok(DeviceHandle(ordinal as i32))
    }
    fn create_context(
        &self,
        _device: DeviceHandle,
        _policy: SchedulePolicy,
    ) -> Result<RawContext, DriverFault> {
        Ok(RawContext::from_ptr(0x1000 as *mut _))
    }
    fn destroy_context(&self, _context: RawContext) -> Result<(), DriverFault> {
        self.events.push("device");
        Ok(())
    }
}

pub struct FakePool(Events);

impl Drop for FakePool {
    fn drop(&mut self) {
        self.0.push("pool");
    }
}

/// Produces one packet per frame, and one extra packet once flushed.
pub struct FakeEncoder {
    events: Events,
    sent: Arc<Mutex<Vec<i64>>>,
    extradata: Option<Bytes>,
    pending: u32,
    produced: u64,
    eof: bool,
    tail_sent: bool,
}

impl FakeEncoder {
    fn packet(&mut self) -> ReceiveOutcome {
        self.produced += 1;
        ReceiveOutcome::Packet(EncodedPacket {
            data: Bytes::from_static(&[0, 0, 0, 1, 0x65, 0x88]),
            pts: 0,
            dts: 0,
            is_keyframe: self.produced == 1,
            stream_index: 0,
        })
    }
}

impl Drop for FakeEncoder {
    fn drop(&mut self) {
        self.events.push("encoder");
    }
}

impl HardwareEncoder for FakeEncoder {
    fn name(&self) -> &'static str {
        "h264_nvenc"
    }

    fn send_frame(&mut self, frame: &SurfaceFrame) -> Result<(), DriverFault> {
        self.sent.lock().push(frame.pts);
        self.pending += 1;
        Ok(())
    }

    fn send_eof(&mut self) -> Result<(), DriverFault> {
        self.eof = true;
        Ok(())
    }

    fn receive_packet(&mut self) -> ReceiveOutcome {
        if self.pending > 0 {
            self.pending -= 1;
            return self.packet();
        }
        if self.eof {
            if !self.tail_sent {
                self.tail_sent = true;
                return self.packet();
            }
            return ReceiveOutcome::EndOfStream;
        }
        ReceiveOutcome::Again
    }

    fn extradata(&self) -> Option<Bytes> {
        self.extradata.clone()
    }
}

pub struct FakeBackend {
    pub events: Events,
    pub fail_pool: bool,
    /// Encoders report end of stream once their first frame is drained.
    pub ends_early: bool,
    /// Configuration of the last opened encoder.
    pub opened: Mutex<Option<EncoderConfig>>,
    sent: Arc<Mutex<Vec<i64>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            events: Events::default(),
            fail_pool: false,
            ends_early: false,
            opened: Mutex::new(None),
            sent: Arc::default(),
        }
    }

    /// Timestamps of every frame handed to an encoder from this backend.
    pub fn sent_pts(&self) -> Vec<i64> {
        self.sent.lock().clone()
    }
}

impl CodecRegistry for FakeBackend {
    fn has_encoder(&self, name: &str) -> bool {
        matches!(name, "h264_nvenc" | "hevc_nvenc")
    }
}

impl EncodeBackend for FakeBackend {
    type Pool = FakePool;
    type Encoder = FakeEncoder;

    fn init_frame_pool(
        &self,
        _device: &DeviceContext,
        _desc: &FramePoolDesc,
    ) -> Result<FakePool, DriverFault> {
        if self.fail_pool {
            return Err(DriverFault::new(-22, "Invalid argument"));
        }
        Ok(FakePool(self.events.clone()))
    }

    fn pool_format(&self, _pool: &FakePool) -> PixelFormat {
        PixelFormat::Cuda
    }

    fn open_encoder(
        &self,
        config: &EncoderConfig,
        _pool: &FakePool,
    ) -> Result<FakeEncoder, DriverFault> {
        *self.opened.lock() = Some(config.clone());
        Ok(FakeEncoder {
            events: self.events.clone(),
            sent: Arc::clone(&self.sent),
            extradata: config
                .global_header()
                .then(|| Bytes::from_static(&[0, 0, 0, 1, 0x67])),
            pending: 0,
            produced: 0,
            eof: self.ends_early,
            tail_sent: false,
        })
    }
}
