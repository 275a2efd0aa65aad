//! Actuator command handlers.

use super::CommandResult;
use kinect::{DeviceSession, Driver, LedOption, SessionError};

/// Set the LED indicator
pub fn led(driver: &dyn Driver, index: usize, option: &str) -> CommandResult {
    let option: LedOption = option.parse().map_err(SessionError::InvalidArgument)?;
    let session = DeviceSession::open(driver, index)?;
    session.set_led_option(option)?;
    session.close()?;
    println!("LED: {} (code {})", option, option.code());
    Ok(())
}

/// Set the tilt angle
pub fn tilt(driver: &dyn Driver, index: usize, degrees: f64) -> CommandResult {
    let session = DeviceSession::open(driver, index)?;
    session.set_tilt(degrees)?;
    session.close()?;
    println!("Tilt: {degrees} deg");
    Ok(())
}
