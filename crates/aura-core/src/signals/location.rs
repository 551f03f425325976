//! Location fix type and provider seam.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One GPS/fused-location fix as delivered by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in meters. Larger is worse.
    pub accuracy_m: f64,
    /// Ground speed in meters per second, if the platform reported one.
    pub speed_mps: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl LocationFix {
    /// Age of this fix relative to `now`, in seconds (clamped at 0).
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.timestamp).num_seconds().max(0)
    }

    /// Great-circle distance to a coordinate pair, in meters.
    pub fn distance_m(&self, lat: f64, lng: f64) -> f64 {
        haversine_m(self.latitude, self.longitude, lat, lng)
    }
}

/// Haversine distance between two WGS84 coordinates, in meters.
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_M * c
}

/// Read access to the platform's last-known location.
///
/// Registration of continuous background delivery is a separate
/// concern handled by [`crate::tasks::LocationBackend`]; this trait is
/// only the passive "what was the last fix" read used when assembling
/// a [`super::SignalSnapshot`].
pub trait LocationProvider: Send + Sync {
    /// Last known fix, or `None` when the platform has none cached.
    fn last_fix(&self) -> Result<Option<LocationFix>, Box<dyn std::error::Error + Send + Sync>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_zero_for_identical_points() {
        assert!(haversine_m(52.52, 13.405, 52.52, 13.405) < 1e-6);
    }

    #[test]
    fn haversine_known_distance() {
        // Berlin Alexanderplatz to Brandenburger Tor, roughly 2.5 km.
        let d = haversine_m(52.5219, 13.4132, 52.5163, 13.3777);
        assert!((2300.0..2700.0).contains(&d), "got {d}");
    }

    #[test]
    fn fix_age_clamps_future_timestamps_to_zero() {
        let now = Utc::now();
        let fix = LocationFix {
            latitude: 0.0,
            longitude: 0.0,
            accuracy_m: 10.0,
            speed_mps: None,
            timestamp: now + chrono::Duration::seconds(30),
        };
        assert_eq!(fix.age_secs(now), 0);
    }
}
