//! Signal source adapters.
//!
//! Thin readers over the platform sensor facilities. Every adapter
//! reports a last-known value plus the timestamp it was observed at,
//! and every adapter may be unavailable. Absence is "no opinion", not
//! an error: a `SignalSnapshot` with all-`None` signal fields is a
//! valid evaluator input.
//!
//! Providers are trait objects so tests (and the CLI demo path) inject
//! fakes; the production implementations live in the mobile shells and
//! are out of scope here.

mod activity;
mod connectivity;
mod device;
mod location;
mod temporal;

pub use activity::{ActivityKind, ActivityProvider, ActivitySample};
pub use connectivity::{ConnectivityProvider, ConnectivityState};
pub use device::{DevicePowerState, DeviceStateProvider};
pub use location::{LocationFix, LocationProvider};
pub use temporal::TemporalContext;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One cycle's worth of raw signals, produced fresh on every
/// evaluation and owned exclusively by the evaluation call.
///
/// Not persisted as a unit -- only the fused [`crate::ContextSnapshot`]
/// is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub fix: Option<LocationFix>,
    pub activity: Option<ActivitySample>,
    pub device: Option<DevicePowerState>,
    pub connectivity: Option<ConnectivityState>,
    pub temporal: TemporalContext,
    /// When this snapshot was assembled.
    pub gathered_at: DateTime<Utc>,
}

impl SignalSnapshot {
    /// A snapshot with no signals at all (total signal loss).
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            fix: None,
            activity: None,
            device: None,
            connectivity: None,
            temporal: TemporalContext::from_datetime(now),
            gathered_at: now,
        }
    }

    /// True when no sensor contributed anything this cycle.
    ///
    /// Temporal context is always derivable from the wall clock and
    /// does not count as a sensor signal here.
    pub fn is_empty(&self) -> bool {
        self.fix.is_none()
            && self.activity.is_none()
            && self.device.is_none()
            && self.connectivity.is_none()
    }
}

/// The set of signal providers a gather pass reads from.
///
/// Every provider is optional-by-construction: a read that fails is
/// logged at debug level and treated exactly like an unavailable
/// sensor, so one broken adapter never aborts a cycle.
#[derive(Clone, Default)]
pub struct SignalSources {
    pub location: Option<Arc<dyn LocationProvider>>,
    pub activity: Option<Arc<dyn ActivityProvider>>,
    pub device: Option<Arc<dyn DeviceStateProvider>>,
    pub connectivity: Option<Arc<dyn ConnectivityProvider>>,
}

impl SignalSources {
    /// Best-effort read of every adapter.
    ///
    /// Always returns a snapshot; individual failures degrade to
    /// `None` fields.
    pub fn gather(&self, now: DateTime<Utc>) -> SignalSnapshot {
        SignalSnapshot {
            fix: read_adapter("location", self.location.as_deref(), |p| p.last_fix()),
            activity: read_adapter("activity", self.activity.as_deref(), |p| p.last_sample()),
            device: read_adapter("device", self.device.as_deref(), |p| p.power_state()),
            connectivity: read_adapter("connectivity", self.connectivity.as_deref(), |p| {
                p.current_state()
            }),
            temporal: TemporalContext::from_datetime(now),
            gathered_at: now,
        }
    }
}

fn read_adapter<P: ?Sized, T>(
    name: &str,
    provider: Option<&P>,
    read: impl FnOnce(&P) -> Result<Option<T>, Box<dyn std::error::Error + Send + Sync>>,
) -> Option<T> {
    let provider = provider?;
    match read(provider) {
        Ok(value) => value,
        Err(e) => {
            log::debug!("{name} adapter read failed: {e}");
            None
        }
    }
}
