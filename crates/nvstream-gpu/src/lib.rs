//! GPU compute context ownership.
//!
//! Driver entry points are reached through a [`DeviceDriver`] capability
//! object that the caller constructs once and passes by reference. The
//! [`DeviceContext`] returned by [`acquire_context`] owns the driver
//! context and destroys it on drop.

mod context;
#[cfg(feature = "cuda")]
mod cuda;
mod driver;
mod error;

pub use context::{acquire_context, DeviceContext, DEVICE_ORDINAL};
#[cfg(feature = "cuda")]
pub use cuda::CudaDriver;
pub use driver::{DeviceDriver, DeviceHandle, RawContext, SchedulePolicy};
pub use error::{DriverFault, GpuError};

/// Result type for GPU operations.
pub type GpuResult<T> = Result<T, GpuError>;
