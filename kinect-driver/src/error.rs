//! Driver error types

use thiserror::Error;

/// Errors reported by a driver backend
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The device index is already held by another handle
    #[error("Device {0} is already open")]
    DeviceBusy(usize),

    #[error("Device handle is closed")]
    Closed,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Not supported by this backend: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
