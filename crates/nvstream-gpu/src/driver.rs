//! Driver capability object.

use std::ffi::c_void;

use crate::DriverFault;

/// Ordinal-resolved device handle as the driver reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHandle(pub i32);

/// Opaque native context pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawContext(usize);

impl RawContext {
    pub fn from_ptr(ptr: *mut c_void) -> Self {
        Self(ptr as usize)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// How the driver waits for GPU work from the host thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchedulePolicy {
    /// Let the driver pick between spinning and yielding.
    #[default]
    Auto,
    Spin,
    Yield,
    BlockingSync,
}

/// The compute-driver entry points a session needs.
///
/// Implementations are constructed once and shared as `Arc<dyn DeviceDriver>`.
pub trait DeviceDriver: Send + Sync {
    /// Short name for diagnostics.
    fn name(&self) -> &'static str;

    /// Initialize the driver. Safe to call more than once.
    fn init(&self) -> Result<(), DriverFault>;

    /// Number of visible devices.
    fn device_count(&self) -> Result<u32, DriverFault>;

    /// Resolve a device ordinal.
    fn device(&self, ordinal: u32) -> Result<DeviceHandle, DriverFault>;

    /// Create a context on `device`.
    fn create_context(
        &self,
        device: DeviceHandle,
        policy: SchedulePolicy,
    ) -> Result<RawContext, DriverFault>;

    /// Destroy a context created by [`DeviceDriver::create_context`].
    fn destroy_context(&self, context: RawContext) -> Result<(), DriverFault>;
}
