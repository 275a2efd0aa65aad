//! MonitorDriver middleware for tracing driver operations
//!
//! Wraps any `Driver` and logs every call passing through it, together with
//! its outcome. Handles opened through the wrapper are wrapped as well.
//!
//! # Example
//!
//! ```ignore
//! use kinect_driver::{MonitorConfig, MonitorDriver, VirtualDriver};
//!
//! let driver = MonitorDriver::wrap(Arc::new(VirtualDriver::default()), MonitorConfig::default());
//! // Every open/start/stop/led/tilt call is now logged
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::{
    DeviceHandle, DeviceInfo, Driver, DriverError, Frame, FrameCallback, LedOption, StreamKind,
};

/// Call categories to log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorFilter {
    #[default]
    All,
    /// open/close/pause/resume
    Lifecycle,
    /// start/stop and frame callbacks
    Streams,
    /// LED and tilt
    Actuators,
}

impl FromStr for MonitorFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" | "" => Ok(Self::All),
            "lifecycle" | "life" => Ok(Self::Lifecycle),
            "streams" | "stream" => Ok(Self::Streams),
            "actuators" | "motor" | "led" => Ok(Self::Actuators),
            _ => Err(format!("Unknown filter: {}", s)),
        }
    }
}

/// Configuration for the MonitorDriver
#[derive(Debug, Clone, Default)]
pub struct MonitorConfig {
    pub filter: MonitorFilter,
    /// Also trace every delivered frame
    pub trace_frames: bool,
}

impl MonitorConfig {
    pub fn with_filter(mut self, filter: MonitorFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_trace_frames(mut self, trace_frames: bool) -> Self {
        self.trace_frames = trace_frames;
        self
    }

    fn shows(&self, category: MonitorFilter) -> bool {
        self.filter == MonitorFilter::All || self.filter == category
    }
}

/// Log the outcome of a call in `category`
fn report<T, A: fmt::Display>(
    config: &MonitorConfig,
    category: MonitorFilter,
    call: &str,
    args: A,
    result: &Result<T, DriverError>,
) {
    match result {
        Err(e) => warn!("{}({}) failed: {}", call, args, e),
        Ok(_) if config.shows(category) => debug!("{}({}) ok", call, args),
        Ok(_) => {}
    }
}

/// Driver middleware that logs all calls
pub struct MonitorDriver {
    inner: Arc<dyn Driver>,
    config: MonitorConfig,
}

impl MonitorDriver {
    /// Wrap a driver with logging middleware
    pub fn wrap(driver: Arc<dyn Driver>, config: MonitorConfig) -> Arc<dyn Driver> {
        Arc::new(Self {
            inner: driver,
            config,
        })
    }
}

impl Driver for MonitorDriver {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn device_count(&self) -> Result<usize, DriverError> {
        let result = self.inner.device_count();
        report(&self.config, MonitorFilter::Lifecycle, "device_count", "", &result);
        result
    }

    fn device_info(&self, index: usize) -> Result<DeviceInfo, DriverError> {
        let result = self.inner.device_info(index);
        report(&self.config, MonitorFilter::Lifecycle, "device_info", index, &result);
        result
    }

    fn open_device(&self, index: usize) -> Result<Box<dyn DeviceHandle>, DriverError> {
        let result = self.inner.open_device(index);
        report(&self.config, MonitorFilter::Lifecycle, "open_device", index, &result);
        let inner = result?;
        Ok(Box::new(MonitoredDevice {
            inner,
            config: self.config.clone(),
        }))
    }
}

/// Handle wrapper produced by `MonitorDriver`
struct MonitoredDevice {
    inner: Box<dyn DeviceHandle>,
    config: MonitorConfig,
}

impl MonitoredDevice {
    fn index(&self) -> usize {
        self.inner.info().index
    }
}

impl DeviceHandle for MonitoredDevice {
    fn info(&self) -> &DeviceInfo {
        self.inner.info()
    }

    fn start_stream(&self, kind: StreamKind) -> Result<(), DriverError> {
        let result = self.inner.start_stream(kind);
        report(&self.config, MonitorFilter::Streams, "start_stream", kind, &result);
        result
    }

    fn stop_stream(&self, kind: StreamKind) -> Result<(), DriverError> {
        let result = self.inner.stop_stream(kind);
        report(&self.config, MonitorFilter::Streams, "stop_stream", kind, &result);
        result
    }

    fn set_frame_callback(&self, kind: StreamKind, callback: Option<FrameCallback>) {
        if self.config.shows(MonitorFilter::Streams) {
            debug!(
                "set_frame_callback({}, {})",
                kind,
                if callback.is_some() { "fn" } else { "none" }
            );
        }

        let callback = match callback {
            Some(cb) if self.config.trace_frames => {
                let index = self.index();
                let traced: FrameCallback = Arc::new(move |frame: Frame| {
                    trace!(
                        index,
                        stream = %frame.kind(),
                        sequence = frame.sequence(),
                        bytes = frame.len(),
                        "frame"
                    );
                    cb(frame)
                });
                Some(traced)
            }
            other => other,
        };

        self.inner.set_frame_callback(kind, callback);
    }

    fn set_led(&self, option: LedOption) -> Result<(), DriverError> {
        let result = self.inner.set_led(option);
        report(&self.config, MonitorFilter::Actuators, "set_led", option, &result);
        result
    }

    fn set_tilt(&self, degrees: f64) -> Result<(), DriverError> {
        let result = self.inner.set_tilt(degrees);
        report(&self.config, MonitorFilter::Actuators, "set_tilt", degrees, &result);
        result
    }

    fn pause_events(&self) -> Result<(), DriverError> {
        let result = self.inner.pause_events();
        report(&self.config, MonitorFilter::Lifecycle, "pause_events", "", &result);
        result
    }

    fn resume_events(&self) -> Result<(), DriverError> {
        let result = self.inner.resume_events();
        report(&self.config, MonitorFilter::Lifecycle, "resume_events", "", &result);
        result
    }

    fn close(&self) -> Result<(), DriverError> {
        let result = self.inner.close();
        report(&self.config, MonitorFilter::Lifecycle, "close", self.index(), &result);
        result
    }
}
