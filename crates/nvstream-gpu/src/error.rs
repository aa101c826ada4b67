//! Error types for the GPU module.

use thiserror::Error;

/// A failure reported by a native driver: its numeric code and message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {code})")]
pub struct DriverFault {
    /// Native error code.
    pub code: i32,

    /// Driver-provided description.
    pub message: String,
}

impl DriverFault {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Errors that can occur while acquiring a compute context.
///
/// All of them are fatal for the session; nothing is retried.
#[derive(Debug, Error)]
pub enum GpuError {
    /// The driver could not be initialized.
    #[error("Compute driver initialization failed: {0}")]
    Init(#[source] DriverFault),

    /// Device enumeration failed.
    #[error("Device enumeration failed: {0}")]
    Enumerate(#[source] DriverFault),

    /// The driver reports no devices.
    #[error("No compute device found")]
    NoDeviceFound,

    /// The selected device could not be opened.
    #[error("Failed to open device {ordinal}: {fault}")]
    DeviceSelect {
        ordinal: u32,
        #[source]
        fault: DriverFault,
    },

    /// Context creation failed.
    #[error("Context creation failed: {0}")]
    ContextCreate(#[source] DriverFault),
}

impl GpuError {
    /// The underlying driver fault, if the driver reported one.
    pub fn fault(&self) -> Option<&DriverFault> {
        match self {
            Self::Init(fault) | Self::Enumerate(fault) | Self::ContextCreate(fault) => Some(fault),
            Self::DeviceSelect { fault, .. } => Some(fault),
            Self::NoDeviceFound => None,
        }
    }
}
