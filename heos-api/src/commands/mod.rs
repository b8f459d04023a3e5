//! HEOS commands organized by command group
//!
//! Each function builds one [`HeosCommand`](crate::HeosCommand). Functions
//! that take user-supplied values validate them and return
//! [`ApiError::InvalidParameter`](crate::ApiError::InvalidParameter) instead of
//! letting the device reject the line.

pub mod browse;
pub mod group;
pub mod player;
pub mod system;

use crate::error::{ApiError, Result};

/// Highest volume level accepted by players and groups
pub const MAX_VOLUME: u8 = 100;

/// Accepted range for relative volume steps
pub const VOLUME_STEP_RANGE: std::ops::RangeInclusive<u8> = 1..=10;

pub(crate) fn check_volume(level: u8) -> Result<u8> {
    if level > MAX_VOLUME {
        return Err(ApiError::InvalidParameter(format!(
            "volume level {level} is out of range [0, {MAX_VOLUME}]"
        )));
    }
    Ok(level)
}

pub(crate) fn check_step(step: u8) -> Result<u8> {
    if !VOLUME_STEP_RANGE.contains(&step) {
        return Err(ApiError::InvalidParameter(format!(
            "volume step {step} is out of range [{}, {}]",
            VOLUME_STEP_RANGE.start(),
            VOLUME_STEP_RANGE.end()
        )));
    }
    Ok(step)
}
