//! Session error types

use kinect_driver::DriverError;
use thiserror::Error;

/// Errors from session operations
#[derive(Error, Debug)]
pub enum SessionError {
    /// No device at the requested index
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Operation not allowed in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Wrong argument count, type or value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Driver failure on an otherwise valid call
    #[error("Driver error: {0}")]
    Driver(DriverError),

    /// Dispatcher thread could not be spawned
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DriverError> for SessionError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::DeviceNotFound(msg) => SessionError::DeviceNotFound(msg),
            DriverError::DeviceBusy(index) => {
                SessionError::InvalidState(format!("device {} is already open", index))
            }
            DriverError::Closed => SessionError::InvalidState("device handle is closed".into()),
            DriverError::InvalidParameter(msg) => SessionError::InvalidArgument(msg),
            other => SessionError::Driver(other),
        }
    }
}

impl SessionError {
    /// Short kind name, as reported to script callers
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::DeviceNotFound(_) => "DeviceNotFound",
            SessionError::InvalidState(_) => "InvalidState",
            SessionError::InvalidArgument(_) => "InvalidArgument",
            SessionError::Driver(_) => "DriverError",
            SessionError::Io(_) => "IoError",
        }
    }
}

/// Result alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;
