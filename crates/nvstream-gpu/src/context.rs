//! Compute context acquisition.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::{DeviceDriver, DeviceHandle, GpuError, GpuResult, RawContext, SchedulePolicy};

/// Device the session runs on.
pub const DEVICE_ORDINAL: u32 = 0;

/// Exclusive owner of one driver context.
///
/// Every GPU resource of a session holds this through an `Arc`, so the
/// context is destroyed only after the last of them is gone.
pub struct DeviceContext {
    driver: Arc<dyn DeviceDriver>,
    device: DeviceHandle,
    raw: RawContext,
    ordinal: u32,
}

impl DeviceContext {
    /// Native context pointer.
    pub fn raw(&self) -> RawContext {
        self.raw
    }

    pub fn device(&self) -> DeviceHandle {
        self.device
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub fn driver_name(&self) -> &'static str {
        self.driver.name()
    }
}

impl fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("driver", &self.driver.name())
            .field("device", &self.device)
            .field("raw", &self.raw)
            .field("ordinal", &self.ordinal)
            .finish()
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        match self.driver.destroy_context(self.raw) {
            Ok(()) => debug!(ordinal = self.ordinal, "GPU context destroyed"),
            Err(fault) => warn!(ordinal = self.ordinal, %fault, "Failed to destroy GPU context"),
        }
    }
}

/// Initialize the driver and create a context on device 0.
#[instrument(name = "acquire_context", skip_all, fields(driver = driver.name()))]
pub fn acquire_context(driver: Arc<dyn DeviceDriver>) -> GpuResult<DeviceContext> {
    driver.init().map_err(|fault| {
        error!(%fault, "Driver initialization failed");
        GpuError::Init(fault)
    })?;

    let count = driver.device_count().map_err(GpuError::Enumerate)?;
    if count == 0 {
        error!("No compute device found");
        return Err(GpuError::NoDeviceFound);
    }

    let device = driver
        .device(DEVICE_ORDINAL)
        .map_err(|fault| GpuError::DeviceSelect {
            ordinal: DEVICE_ORDINAL,
            fault,
        })?;

    let raw = driver
        .create_context(device, SchedulePolicy::Auto)
        .map_err(|fault| {
            error!(%fault, "Context creation failed");
            GpuError::ContextCreate(fault)
        })?;

    info!(
        devices = count,
        ordinal = DEVICE_ORDINAL,
        "GPU context created"
    );

    Ok(DeviceContext {
        driver,
        device,
        raw,
        ordinal: DEVICE_ORDINAL,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::DriverFault;

    #[derive(Default)]
    struct FakeDriver {
        devices: u32,
        fail_init: bool,
        fail_create: bool,
        created: AtomicUsize,
        destroyed: AtomicUsize,
    }

    impl DeviceDriver for FakeDriver {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn init(&self) -> Result<(), DriverFault> {
            if self.fail_init {
                return Err(DriverFault::new(100, "no driver"));
            }
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
            policy: SchedulePolicy,
        ) -> Result<RawContext, DriverFault> {
            assert_eq!(policy, SchedulePolicy::Auto);
            if self.fail_create {
                return Err(DriverFault::new(2, "out of memory"));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(RawContext::from_ptr(0x5000 as *mut _))
        }

        fn destroy_context(&self, context: RawContext) -> Result<(), DriverFault> {
            assert!(!context.is_null());
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_acquire_selects_first_device() {
        let driver = Arc::new(FakeDriver {
            devices: 2,
            ..Default::default()
        });

        let context = acquire_context(driver.clone()).unwrap();
        assert_eq!(context.ordinal(), 0);
        assert_eq!(context.device(), DeviceHandle(0));
        assert_eq!(context.driver_name(), "fake");
        assert_eq!(driver.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_destroys_context_once() {
        let driver = Arc::new(FakeDriver {
            devices: 1,
            ..Default::default()
        });

        let context = Arc::new(acquire_context(driver.clone()).unwrap());
        let borrowed = Arc::clone(&context);
        drop(context);
        assert_eq!(driver.destroyed.load(Ordering::SeqCst), 0);

        drop(borrowed);
        assert_eq!(driver.destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_devices() {
        let driver = Arc::new(FakeDriver::default());
        let err = acquire_context(driver.clone()).unwrap_err();

        assert!(matches!(err, GpuError::NoDeviceFound));
        assert!(err.fault().is_none());
        assert_eq!(driver.created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_init_failure_carries_driver_code() {
        let driver = Arc::new(FakeDriver {
            devices: 1,
            fail_init: true,
            ..Default::default()
        });

        let err = acquire_context(driver).unwrap_err();
        assert_eq!(err.fault().map(|f| f.code), Some(100));
        assert!(err.to_string().contains("no driver"));
    }

    #[test]
    fn test_create_failure_leaves_nothing_to_destroy() {
        let driver = Arc::new(FakeDriver {
            devices: 1,
            fail_create: true,
            ..Default::default()
        });

        let err = acquire_context(driver.clone()).unwrap_err();
        assert!(matches!(err, GpuError::ContextCreate(_)));
        assert_eq!(driver.destroyed.load(Ordering::SeqCst), 0);
    }
}
