//! Query (read-only) command handlers.

use super::CommandResult;
use kinect::Driver;

/// List attached devices
pub fn list(driver: &dyn Driver) -> CommandResult {
    let devices = kinect::list_devices(driver)?;
    if devices.is_empty() {
        println!("No devices found ({} backend)", driver.name());
        return Ok(());
    }

    println!("{} device(s) ({} backend):", devices.len(), driver.name());
    for info in devices {
        println!(
            "  [{}] {}  serial={}  tilt={}..={} deg",
            info.index,
            info.name,
            info.serial.as_deref().unwrap_or("-"),
            info.tilt_range.min,
            info.tilt_range.max
        );
    }
    Ok(())
}
