//! Coarse activity classification as reported by the platform
//! activity-recognition facility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse motion class. Mirrors what mobile activity-recognition APIs
/// emit; anything the platform cannot classify maps to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Still,
    Walking,
    Running,
    Cycling,
    InVehicle,
    Unknown,
}

impl ActivityKind {
    /// Whether this class implies the user is in motion.
    pub fn is_moving(self) -> bool {
        matches!(
            self,
            ActivityKind::Walking
                | ActivityKind::Running
                | ActivityKind::Cycling
                | ActivityKind::InVehicle
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ActivityKind::Still => "still",
            ActivityKind::Walking => "walking",
            ActivityKind::Running => "running",
            ActivityKind::Cycling => "cycling",
            ActivityKind::InVehicle => "in_vehicle",
            ActivityKind::Unknown => "unknown",
        }
    }
}

/// One activity classification sample: type + classifier confidence +
/// the time it was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySample {
    pub kind: ActivityKind,
    /// Classifier confidence, 0.0 to 1.0.
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl ActivitySample {
    /// Age of this sample relative to `now`, in seconds (clamped at 0).
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.timestamp).num_seconds().max(0)
    }
}

/// Read access to the platform's last activity classification.
pub trait ActivityProvider: Send + Sync {
    fn last_sample(
        &self,
    ) -> Result<Option<ActivitySample>, Box<dyn std::error::Error + Send + Sync>>;
}
