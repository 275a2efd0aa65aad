//! Kinect device sessions
//!
//! A `DeviceSession` owns one sensor opened by index through a
//! `kinect_driver::Driver`. Frames travel from the driver's acquisition
//! thread over a channel to the session's dispatch thread, which hands them
//! to a `FrameSink`: either a plain closure or an `EventEmitter` publishing
//! named `"depth"` / `"video"` events. `ScriptSession` adds a by-name call
//! surface with argument checking.

pub mod config;
pub mod error;
pub mod events;
pub mod script;
pub mod session;
pub mod sink;

mod dispatch;

pub use config::KinectConfig;
pub use dispatch::FRAME_QUEUE_DEPTH;
pub use error::{SessionError, SessionResult};
pub use events::{EventEmitter, EventedSession, ListenerId};
pub use script::{Arg, ScriptSession};
pub use session::{device_count, list_devices, DeviceSession};
pub use sink::{FrameSink, SharedSink};

pub use kinect_driver::{
    BoxedDriver, DeviceInfo, Driver, DriverError, Frame, FrameMode, LedOption, MonitorConfig,
    MonitorDriver, MonitorFilter, StreamKind, TiltRange, VirtualConfig, VirtualDriver,
};
