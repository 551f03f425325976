//! Device power state reader.
//!
//! The same reading feeds two consumers: the charging flag contributes
//! to signal fusion, and the full power state drives the backpressure
//! derivation in [`crate::health`].

use serde::{Deserialize, Serialize};

/// Snapshot of the device's power situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePowerState {
    /// Battery charge, 0-100.
    pub battery_pct: u8,
    pub charging: bool,
    /// OS battery-saver / low-power mode.
    pub power_save: bool,
    /// Device-idle ("doze") state; background work is heavily
    /// restricted while set.
    pub idle: bool,
}

impl DevicePowerState {
    /// A neutral state used when the reader is unavailable: full
    /// battery, not charging, no restrictions.
    pub fn unrestricted() -> Self {
        Self {
            battery_pct: 100,
            charging: false,
            power_save: false,
            idle: false,
        }
    }
}

/// Read access to the platform battery/power facilities.
pub trait DeviceStateProvider: Send + Sync {
    fn power_state(
        &self,
    ) -> Result<Option<DevicePowerState>, Box<dyn std::error::Error + Send + Sync>>;
}
