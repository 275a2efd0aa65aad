//! Command handlers for the CLI application.
//!
//! - `query`: read-only commands (list)
//! - `set`: actuator commands (led, tilt)
//! - `stream`: frame streaming through the event emitter
//! - `script`: JSON-lines method calls

pub mod query;
pub mod script;
pub mod set;
pub mod stream;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kinect::{
    BoxedDriver, KinectConfig, MonitorConfig, MonitorDriver, MonitorFilter, VirtualDriver,
};

/// Result type for command handlers
pub type CommandResult = anyhow::Result<()>;

/// Build the driver stack: the virtual backend, wrapped for call logging when
/// `--monitor` or the config asks for it
pub fn open_driver(
    config: &KinectConfig,
    monitor: bool,
    filter: Option<&str>,
) -> anyhow::Result<BoxedDriver> {
    let driver: BoxedDriver = Arc::new(VirtualDriver::new(config.virtual_config()));

    let monitor_config = if monitor {
        let filter = match filter {
            Some(f) => f.parse().map_err(anyhow::Error::msg)?,
            None => MonitorFilter::All,
        };
        Some(MonitorConfig::default().with_filter(filter))
    } else {
        config.monitor_config()?
    };

    Ok(match monitor_config {
        Some(monitor_config) => MonitorDriver::wrap(driver, monitor_config),
        None => driver,
    })
}

/// Flag that stays true until Ctrl-C is pressed
pub fn setup_interrupt_handler() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);

    if let Err(e) = ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst)) {
        tracing::warn!("Ctrl-C handler unavailable: {}", e);
    }

    running
}
