//! Connectivity / network identity signal.

use serde::{Deserialize, Serialize};

/// What the device is currently connected through.
///
/// Wi-Fi identity is an opaque stable identifier (the shells hash the
/// SSID before it crosses into this crate), so a known-network check
/// never stores the raw network name. `None` means the platform would
/// not reveal the identity, which still counts as being on Wi-Fi.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectivityState {
    Wifi { network_id: Option<String> },
    Cellular,
    Offline,
}

impl ConnectivityState {
    pub fn is_wifi(&self) -> bool {
        matches!(self, ConnectivityState::Wifi { .. })
    }
}

/// Read access to the platform connectivity facility.
pub trait ConnectivityProvider: Send + Sync {
    fn current_state(
        &self,
    ) -> Result<Option<ConnectivityState>, Box<dyn std::error::Error + Send + Sync>>;
}
