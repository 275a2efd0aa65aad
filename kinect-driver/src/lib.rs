//! Driver abstraction layer for Kinect depth sensors
//!
//! This crate describes the capability surface of the native sensor driver
//! (open device, start/stop stream, frame callbacks, LED, tilt, event
//! processing) as traits, so the session layer never touches a backend
//! directly:
//!
//! - `VirtualDriver` (simulated sensor, streams test patterns)
//! - `MonitorDriver` (middleware that traces every call)

pub mod error;
pub mod frame;
pub mod monitor;
pub mod types;

mod virtual_device;

pub use error::DriverError;
pub use frame::{Frame, FrameCallback};
pub use monitor::{MonitorConfig, MonitorDriver, MonitorFilter};
pub use types::{DeviceInfo, FrameMode, LedOption, StreamKind, TiltRange};
pub use virtual_device::{VirtualConfig, VirtualDevice, VirtualDriver};

use std::sync::Arc;

/// Entry point of a driver backend
///
/// A backend hands out at most one live handle per device index; opening an
/// index that is already open fails with `DriverError::DeviceBusy`.
pub trait Driver: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Number of attached devices
    fn device_count(&self) -> Result<usize, DriverError>;

    /// Describe the device at `index` without opening it
    fn device_info(&self, index: usize) -> Result<DeviceInfo, DriverError>;

    /// Open the device at `index`, taking exclusive ownership of it
    fn open_device(&self, index: usize) -> Result<Box<dyn DeviceHandle>, DriverError>;

    /// Describe every attached device
    fn list_devices(&self) -> Result<Vec<DeviceInfo>, DriverError> {
        (0..self.device_count()?)
            .map(|index| self.device_info(index))
            .collect()
    }
}

/// An open device
///
/// Frames are only produced while a stream is started and event processing
/// is resumed. Callbacks run on the backend's acquisition thread and must not
/// block.
pub trait DeviceHandle: Send + Sync {
    /// Get device information
    fn info(&self) -> &DeviceInfo;

    /// Begin acquisition of a stream
    fn start_stream(&self, kind: StreamKind) -> Result<(), DriverError>;

    /// End acquisition of a stream
    fn stop_stream(&self, kind: StreamKind) -> Result<(), DriverError>;

    /// Install (or clear, with `None`) the frame callback of a stream
    fn set_frame_callback(&self, kind: StreamKind, callback: Option<FrameCallback>);

    /// Set the LED indicator
    fn set_led(&self, option: LedOption) -> Result<(), DriverError>;

    /// Command the tilt motor
    fn set_tilt(&self, degrees: f64) -> Result<(), DriverError>;

    /// Stop processing device events; returns once the acquisition thread is idle
    fn pause_events(&self) -> Result<(), DriverError>;

    /// Start processing device events
    fn resume_events(&self) -> Result<(), DriverError>;

    /// Release the device. Further calls fail with `DriverError::Closed`.
    fn close(&self) -> Result<(), DriverError>;
}

/// Type alias for a shared driver
pub type BoxedDriver = Arc<dyn Driver>;
