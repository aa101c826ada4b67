//! CUDA driver API backend.

use std::ffi::c_uint;
use std::panic;

use cudarc::driver::{result, sys, DriverError};

use crate::{DeviceDriver, DeviceHandle, DriverFault, RawContext, SchedulePolicy};

/// CUDA driver reached through `cudarc`'s dynamically loaded bindings.
#[derive(Debug, Default)]
pub struct CudaDriver {
    _private: (),
}

impl CudaDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

fn fault(err: DriverError) -> DriverFault {
    DriverFault::new(err.0 as i32, err.to_string())
}

impl DeviceDriver for CudaDriver {
    fn name(&self) -> &'static str {
        "cuda"
    }

    fn init(&self) -> Result<(), DriverFault> {
        // cudarc panics on first use when libcuda cannot be loaded.
        match panic::catch_unwind(result::init) {
            Ok(outcome) => outcome.map_err(fault),
            Err(_) => Err(DriverFault::new(-1, "CUDA driver library not found")),
        }
    }

    fn device_count(&self) -> Result<u32, DriverFault> {
        let count = result::device::get_count().map_err(fault)?;
        Ok(count.max(0) as u32)
    }

    fn device(&self, ordinal: u32) -> Result<DeviceHandle, DriverFault> {
        result::device::get(ordinal as i32)
            .map(DeviceHandle)
            .map_err(fault)
    }

    fn create_context(
        &self,
        device: DeviceHandle,
        policy: SchedulePolicy,
    ) -> Result<RawContext, DriverFault> {
        let flags = match policy {
            SchedulePolicy::Auto => sys::CUctx_flags_enum::CU_CTX_SCHED_AUTO,
            SchedulePolicy::Spin => sys::CUctx_flags_enum::CU_CTX_SCHED_SPIN,
            SchedulePolicy::Yield => sys::CUctx_flags_enum::CU_CTX_SCHED_YIELD,
            SchedulePolicy::BlockingSync => sys::CUctx_flags_enum::CU_CTX_SCHED_BLOCKING_SYNC,
        } as c_uint;

        let mut ctx: sys::CUcontext = std::ptr::null_mut();
        // SAFETY: `ctx` is a valid out-pointer and `device` came from cuDeviceGet.
        unsafe { sys::cuCtxCreate_v2(&mut ctx, flags, device.0) }
            .result()
            .map_err(fault)?;

        Ok(RawContext::from_ptr(ctx.cast()))
    }

    fn destroy_context(&self, context: RawContext) -> Result<(), DriverFault> {
        // SAFETY: the context was created by `create_context` and is destroyed once.
        unsafe { sys::cuCtxDestroy_v2(context.as_ptr().cast()) }
            .result()
            .map_err(fault)
    }
}
