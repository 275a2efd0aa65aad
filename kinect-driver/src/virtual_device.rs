//! Virtual sensor backend
//!
//! Simulates a bank of Kinect devices. Each open device owns one acquisition
//! thread while event processing is resumed; the thread wakes once per frame
//! interval and pushes a freshly generated frame to every started stream that
//! has a callback installed.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::DriverError;
use crate::frame::{Frame, FrameCallback};
use crate::types::{DeviceInfo, LedOption, StreamKind, TiltRange};
use crate::{DeviceHandle, Driver};

/// Roughly 30 frames per second, the sensor's native rate
const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Virtual backend configuration
#[derive(Debug, Clone)]
pub struct VirtualConfig {
    /// Number of simulated devices (indices `0..device_count`)
    pub device_count: usize,
    /// Delay between produced frames
    pub frame_interval: Duration,
    /// Tilt range reported by every device
    pub tilt_range: TiltRange,
}

impl Default for VirtualConfig {
    fn default() -> Self {
        Self {
            device_count: 1,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            tilt_range: TiltRange::KINECT,
        }
    }
}

impl VirtualConfig {
    pub fn with_device_count(mut self, count: usize) -> Self {
        self.device_count = count;
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }
}

/// Driver producing synthetic frames
pub struct VirtualDriver {
    config: VirtualConfig,
    /// Indices with a live handle
    open: Arc<Mutex<HashSet<usize>>>,
}

impl Default for VirtualDriver {
    fn default() -> Self {
        Self::new(VirtualConfig::default())
    }
}

impl VirtualDriver {
    pub fn new(config: VirtualConfig) -> Self {
        Self {
            config,
            open: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Whether a handle for `index` is currently open
    pub fn is_open(&self, index: usize) -> bool {
        self.open.lock().contains(&index)
    }
}

impl Driver for VirtualDriver {
    fn name(&self) -> &str {
        "virtual"
    }

    fn device_count(&self) -> Result<usize, DriverError> {
        Ok(self.config.device_count)
    }

    fn device_info(&self, index: usize) -> Result<DeviceInfo, DriverError> {
        if index >= self.config.device_count {
            return Err(DriverError::DeviceNotFound(format!(
                "no device at index {} ({} attached)",
                index, self.config.device_count
            )));
        }

        Ok(DeviceInfo {
            index,
            name: "Virtual Kinect".to_string(),
            serial: Some(format!("VK{:08}", index)),
            tilt_range: self.config.tilt_range,
        })
    }

    fn open_device(&self, index: usize) -> Result<Box<dyn DeviceHandle>, DriverError> {
        let info = self.device_info(index)?;

        if !self.open.lock().insert(index) {
            return Err(DriverError::DeviceBusy(index));
        }

        info!(index, "Opened virtual device");
        Ok(Box::new(VirtualDevice::new(
            info,
            self.config.frame_interval,
            Arc::clone(&self.open),
        )))
    }
}

#[derive(Default)]
struct StreamSlot {
    running: bool,
    sequence: u64,
    callback: Option<FrameCallback>,
}

/// State shared with the acquisition thread
#[derive(Default)]
struct Acquisition {
    streams: Mutex<[StreamSlot; 2]>,
}

/// A running acquisition thread and its own stop flag
struct Worker {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

/// One open virtual device
pub struct VirtualDevice {
    info: DeviceInfo,
    frame_interval: Duration,
    acquisition: Arc<Acquisition>,
    worker: Mutex<Option<Worker>>,
    led: Mutex<LedOption>,
    tilt: Mutex<f64>,
    closed: AtomicBool,
    opened_at: Instant,
    registry: Arc<Mutex<HashSet<usize>>>,
}

impl VirtualDevice {
    fn new(
        info: DeviceInfo,
        frame_interval: Duration,
        registry: Arc<Mutex<HashSet<usize>>>,
    ) -> Self {
        Self {
            info,
            frame_interval,
            acquisition: Arc::new(Acquisition::default()),
            worker: Mutex::new(None),
            led: Mutex::new(LedOption::Green),
            tilt: Mutex::new(0.0),
            closed: AtomicBool::new(false),
            opened_at: Instant::now(),
            registry,
        }
    }

    /// Last LED option applied
    pub fn led(&self) -> LedOption {
        *self.led.lock()
    }

    /// Last tilt angle applied
    pub fn tilt(&self) -> f64 {
        *self.tilt.lock()
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(DriverError::Closed)
        } else {
            Ok(())
        }
    }

    /// Signal the acquisition thread and wait for it to exit
    fn stop_worker(&self) -> Result<(), DriverError> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };

        worker.stop.store(true, Ordering::SeqCst);

        // A callback pausing its own device cannot wait for itself; the
        // thread exits after the callback returns
        if worker.handle.thread().id() == thread::current().id() {
            return Ok(());
        }

        worker
            .handle
            .join()
            .map_err(|_| DriverError::Internal("acquisition thread panicked".into()))
    }
}

impl DeviceHandle for VirtualDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn start_stream(&self, kind: StreamKind) -> Result<(), DriverError> {
        self.ensure_open()?;
        let mut streams = self.acquisition.streams.lock();
        let slot = &mut streams[kind.slot()];
        if !slot.running {
            slot.running = true;
            slot.sequence = 0;
            debug!(index = self.info.index, stream = %kind, "Stream started");
        }
        Ok(())
    }

    fn stop_stream(&self, kind: StreamKind) -> Result<(), DriverError> {
        self.ensure_open()?;
        let mut streams = self.acquisition.streams.lock();
        streams[kind.slot()].running = false;
        debug!(index = self.info.index, stream = %kind, "Stream stopped");
        Ok(())
    }

    fn set_frame_callback(&self, kind: StreamKind, callback: Option<FrameCallback>) {
        self.acquisition.streams.lock()[kind.slot()].callback = callback;
    }

    fn set_led(&self, option: LedOption) -> Result<(), DriverError> {
        self.ensure_open()?;
        *self.led.lock() = option;
        debug!(index = self.info.index, led = %option, "LED set");
        Ok(())
    }

    fn set_tilt(&self, degrees: f64) -> Result<(), DriverError> {
        self.ensure_open()?;
        let range = self.info.tilt_range;
        if !range.contains(degrees) {
            return Err(DriverError::InvalidParameter(format!(
                "tilt {} outside {}..={} degrees",
                degrees, range.min, range.max
            )));
        }
        *self.tilt.lock() = degrees;
        debug!(index = self.info.index, degrees, "Tilt set");
        Ok(())
    }

    fn pause_events(&self) -> Result<(), DriverError> {
        self.ensure_open()?;
        self.stop_worker()
    }

    fn resume_events(&self) -> Result<(), DriverError> {
        self.ensure_open()?;
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let acquisition = Arc::clone(&self.acquisition);
        let interval = self.frame_interval;
        let opened_at = self.opened_at;
        let thread_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name(format!("kinect-{}-events", self.info.index))
            .spawn(move || run_acquisition_loop(acquisition, thread_stop, interval, opened_at))?;

        *worker = Some(Worker { handle, stop });
        Ok(())
    }

    fn close(&self) -> Result<(), DriverError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }

        let result = self.stop_worker();
        {
            let mut streams = self.acquisition.streams.lock();
            for slot in streams.iter_mut() {
                *slot = StreamSlot::default();
            }
        }
        self.registry.lock().remove(&self.info.index);
        info!(index = self.info.index, "Closed virtual device");
        result
    }
}

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            if let Err(e) = self.close() {
                warn!(index = self.info.index, "Closing dropped device failed: {}", e);
            }
        }
    }
}

/// Acquisition loop, runs until its `stop` flag is set
fn run_acquisition_loop(
    acquisition: Arc<Acquisition>,
    stop: Arc<AtomicBool>,
    interval: Duration,
    opened_at: Instant,
) {
    debug!("Acquisition thread started");

    while !stop.load(Ordering::SeqCst) {
        thread::sleep(interval);
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let timestamp = opened_at.elapsed().as_millis() as u32;
        for kind in StreamKind::ALL {
            let (callback, sequence) = {
                let mut streams = acquisition.streams.lock();
                let slot = &mut streams[kind.slot()];
                if !slot.running {
                    continue;
                }
                let Some(callback) = slot.callback.clone() else {
                    continue;
                };
                let sequence = slot.sequence;
                slot.sequence += 1;
                (callback, sequence)
            };

            // Invoke without the lock so the callback may touch the device
            let data = test_pattern(kind, sequence);
            callback(Frame::new(kind, sequence, timestamp, data));
        }
    }

    debug!("Acquisition thread exiting");
}

/// Deterministic frame content: a horizontal ramp that shifts every frame
fn test_pattern(kind: StreamKind, sequence: u64) -> Vec<u8> {
    let mode = kind.mode();
    let width = mode.width as usize;
    let pixels = (mode.width * mode.height) as usize;
    let mut data = Vec::with_capacity(mode.bytes());

    for pixel in 0..pixels {
        let (x, y) = (pixel % width, pixel / width);
        match kind {
            StreamKind::Depth => {
                // 11-bit samples; 2047 is the driver's "no reading" value
                let raw = ((x as u64 + sequence) % 2047) as u16;
                data.extend_from_slice(&raw.to_le_bytes());
            }
            StreamKind::Video => data.extend_from_slice(&[x as u8, y as u8, sequence as u8]),
        }
    }

    data
}
