//! Device session: one open sensor and everything it is doing
//!
//! A session is created by opening a device index and lives until `close()`
//! (or drop). All operations take `&self`, so a session can be shared through
//! an `Arc` and controlled from inside its own frame callbacks.

use std::sync::Arc;

use kinect_driver::{DeviceHandle, DeviceInfo, Driver, DriverError, LedOption, StreamKind};
use parking_lot::MutexGuard;
use tracing::{debug, info, warn};

use crate::dispatch::{Dispatcher, SessionCore, SessionState};
use crate::error::{SessionError, SessionResult};
use crate::sink::{FrameSink, SharedSink};

/// An open sensor
pub struct DeviceSession {
    core: Arc<SessionCore>,
    handle: Box<dyn DeviceHandle>,
    dispatcher: Dispatcher,
    driver_name: String,
}

/// Number of devices the driver can see
pub fn device_count(driver: &dyn Driver) -> SessionResult<usize> {
    Ok(driver.device_count()?)
}

/// Describe every device the driver can see
pub fn list_devices(driver: &dyn Driver) -> SessionResult<Vec<DeviceInfo>> {
    Ok(driver.list_devices()?)
}

impl DeviceSession {
    /// Open the device at `index`
    ///
    /// Fails with `DeviceNotFound` when nothing is attached at that index and
    /// with `InvalidState` when another session already holds it.
    pub fn open(driver: &dyn Driver, index: usize) -> SessionResult<Self> {
        let handle = driver.open_device(index)?;
        let core = Arc::new(SessionCore::new(index));

        let dispatcher = match Dispatcher::spawn(Arc::clone(&core)) {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                if let Err(close_err) = handle.close() {
                    warn!(index, "Releasing device after failed open: {}", close_err);
                }
                return Err(e.into());
            }
        };

        info!(
            index,
            driver = driver.name(),
            name = %handle.info().name,
            "Session opened"
        );

        Ok(Self {
            core,
            handle,
            dispatcher,
            driver_name: driver.name().to_string(),
        })
    }

    pub fn index(&self) -> usize {
        self.core.index
    }

    pub fn info(&self) -> &DeviceInfo {
        self.handle.info()
    }

    /// Name of the backend the session was opened through
    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    pub fn is_open(&self) -> bool {
        self.core.state.lock().open
    }

    /// Whether frame delivery is suspended (true until the first `resume()`)
    pub fn is_paused(&self) -> bool {
        self.core.state.lock().paused
    }

    pub fn is_streaming(&self, kind: StreamKind) -> bool {
        self.core.state.lock().streaming[kind.slot()]
    }

    /// Last LED option set through this session
    pub fn led(&self) -> Option<LedOption> {
        self.core.state.lock().led
    }

    /// Last tilt angle set through this session
    pub fn tilt(&self) -> Option<f64> {
        self.core.state.lock().tilt
    }

    pub fn has_callback(&self, kind: StreamKind) -> bool {
        self.core.sinks.lock()[kind.slot()].is_some()
    }

    // === Streams ===

    pub fn start_depth(&self) -> SessionResult<()> {
        self.start_stream(StreamKind::Depth)
    }

    pub fn stop_depth(&self) -> SessionResult<()> {
        self.stop_stream(StreamKind::Depth)
    }

    pub fn start_video(&self) -> SessionResult<()> {
        self.start_stream(StreamKind::Video)
    }

    pub fn stop_video(&self) -> SessionResult<()> {
        self.stop_stream(StreamKind::Video)
    }

    /// Start acquisition of a stream. Starting a started stream is a no-op.
    pub fn start_stream(&self, kind: StreamKind) -> SessionResult<()> {
        let mut state = self.lock_open()?;
        if state.streaming[kind.slot()] {
            return Ok(());
        }

        self.core.bump_generation(kind);
        self.handle
            .set_frame_callback(kind, Some(self.dispatcher.forwarder(&self.core, kind)));
        if let Err(e) = self.handle.start_stream(kind) {
            self.core.retire_forwarder(kind);
            self.handle.set_frame_callback(kind, None);
            return Err(e.into());
        }

        state.streaming[kind.slot()] = true;
        debug!(index = self.core.index, stream = %kind, "Stream started");
        Ok(())
    }

    /// Stop acquisition of a stream. Stopping a stopped stream is a no-op.
    pub fn stop_stream(&self, kind: StreamKind) -> SessionResult<()> {
        let mut state = self.lock_open()?;
        if !state.streaming[kind.slot()] {
            return Ok(());
        }

        self.handle.stop_stream(kind)?;
        self.core.retire_forwarder(kind);
        self.handle.set_frame_callback(kind, None);
        self.core.bump_generation(kind);
        state.streaming[kind.slot()] = false;
        debug!(index = self.core.index, stream = %kind, "Stream stopped");
        Ok(())
    }

    // === Callbacks ===

    pub fn set_depth_callback<F: FrameSink + 'static>(&self, callback: F) -> SessionResult<()> {
        self.set_callback(StreamKind::Depth, Arc::new(callback))
    }

    pub fn set_video_callback<F: FrameSink + 'static>(&self, callback: F) -> SessionResult<()> {
        self.set_callback(StreamKind::Video, Arc::new(callback))
    }

    pub fn unset_depth_callback(&self) -> SessionResult<()> {
        self.unset_callback(StreamKind::Depth)
    }

    pub fn unset_video_callback(&self) -> SessionResult<()> {
        self.unset_callback(StreamKind::Video)
    }

    /// Install the handler of a stream, replacing the previous one
    ///
    /// Returns after any in-flight invocation of the old handler finished.
    pub fn set_callback(&self, kind: StreamKind, sink: SharedSink) -> SessionResult<()> {
        let _quiet = self.quiesce();
        let _state = self.lock_open()?;
        self.core.sinks.lock()[kind.slot()] = Some(sink);
        Ok(())
    }

    /// Remove the handler of a stream; no invocation follows this call
    pub fn unset_callback(&self, kind: StreamKind) -> SessionResult<()> {
        let _quiet = self.quiesce();
        let _state = self.lock_open()?;
        self.core.sinks.lock()[kind.slot()] = None;
        Ok(())
    }

    // === Actuators ===

    pub fn set_led_option(&self, option: LedOption) -> SessionResult<()> {
        let mut state = self.lock_open()?;
        self.handle.set_led(option)?;
        state.led = Some(option);
        Ok(())
    }

    /// Command the tilt motor; the angle must lie in the device's range
    pub fn set_tilt(&self, degrees: f64) -> SessionResult<()> {
        let mut state = self.lock_open()?;

        let range = self.info().tilt_range;
        if !degrees.is_finite() {
            return Err(SessionError::InvalidArgument(
                "tilt angle must be a finite number".into(),
            ));
        }
        if !range.contains(degrees) {
            return Err(SessionError::InvalidArgument(format!(
                "tilt angle {} outside {}..={} degrees",
                degrees, range.min, range.max
            )));
        }

        self.handle.set_tilt(degrees)?;
        state.tilt = Some(degrees);
        Ok(())
    }

    // === Event processing ===

    /// Suspend frame delivery; no callback starts after this returns
    pub fn pause(&self) -> SessionResult<()> {
        let _quiet = self.quiesce();
        let mut state = self.lock_open()?;
        if state.paused {
            return Ok(());
        }

        self.handle.pause_events()?;
        state.paused = true;
        for kind in StreamKind::ALL {
            self.core.bump_generation(kind);
        }
        debug!(index = self.core.index, "Paused");
        Ok(())
    }

    /// Continue frame delivery with the next newly produced frame
    pub fn resume(&self) -> SessionResult<()> {
        let mut state = self.lock_open()?;
        if !state.paused {
            return Ok(());
        }

        for kind in StreamKind::ALL {
            self.core.bump_generation(kind);
        }
        self.handle.resume_events()?;
        state.paused = false;
        debug!(index = self.core.index, "Resumed");
        Ok(())
    }

    // === Lifecycle ===

    /// Stop all streams and release the device
    ///
    /// Blocks until an in-flight callback returns; no callback fires after.
    /// Closing a closed session fails with `InvalidState`.
    pub fn close(&self) -> SessionResult<()> {
        let streaming = {
            let _quiet = self.quiesce();
            let mut state = self.core.state.lock();
            if !state.open {
                return Err(SessionError::InvalidState(
                    "session is already closed".into(),
                ));
            }
            state.open = false;
            std::mem::take(&mut state.streaming)
        };

        let mut failure: Option<DriverError> = None;
        for kind in StreamKind::ALL {
            if streaming[kind.slot()] {
                if let Err(e) = self.handle.stop_stream(kind) {
                    warn!(index = self.core.index, stream = %kind, "Stopping stream failed: {}", e);
                    failure.get_or_insert(e);
                }
            }
            self.core.retire_forwarder(kind);
            self.handle.set_frame_callback(kind, None);
            self.core.bump_generation(kind);
        }

        if let Err(e) = self.handle.pause_events() {
            warn!(index = self.core.index, "Pausing events failed: {}", e);
            failure.get_or_insert(e);
        }
        if let Err(e) = self.handle.close() {
            warn!(index = self.core.index, "Closing device failed: {}", e);
            failure.get_or_insert(e);
        }

        self.dispatcher.shutdown();
        *self.core.sinks.lock() = [None, None];
        info!(index = self.core.index, "Session closed");

        match failure {
            Some(e) => Err(SessionError::Driver(e)),
            None => Ok(()),
        }
    }

    /// Lock the state, failing if the session is closed
    fn lock_open(&self) -> SessionResult<MutexGuard<'_, SessionState>> {
        let state = self.core.state.lock();
        if !state.open {
            return Err(SessionError::InvalidState("session is closed".into()));
        }
        Ok(state)
    }

    /// Wait for an in-flight callback, unless we are that callback
    fn quiesce(&self) -> Option<MutexGuard<'_, ()>> {
        if self.dispatcher.is_current_thread() {
            None
        } else {
            Some(self.core.delivery.lock())
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(e) = self.close() {
                warn!(index = self.core.index, "Closing dropped session failed: {}", e);
            }
        }
    }
}
