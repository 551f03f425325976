//! Fused context types.
//!
//! A [`ContextSnapshot`] is the single confidence-scored answer to
//! "what is the user doing and where" at one point in time. It is
//! persisted twice: overwritten into the current-snapshot slot and
//! appended to the history log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signals::ActivityKind;

/// Inferred user context state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextState {
    Resting,
    Active,
    Commuting,
    Working,
    Sleeping,
    Unknown,
}

impl ContextState {
    pub fn name(self) -> &'static str {
        match self {
            ContextState::Resting => "resting",
            ContextState::Active => "active",
            ContextState::Commuting => "commuting",
            ContextState::Working => "working",
            ContextState::Sleeping => "sleeping",
            ContextState::Unknown => "unknown",
        }
    }
}

/// Which subsystem triggered the evaluation that produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationSource {
    BackgroundLocation,
    PeriodicFetch,
    Watchdog,
    ManualRefresh,
    Startup,
}

impl EvaluationSource {
    pub fn name(self) -> &'static str {
        match self {
            EvaluationSource::BackgroundLocation => "background_location",
            EvaluationSource::PeriodicFetch => "periodic_fetch",
            EvaluationSource::Watchdog => "watchdog",
            EvaluationSource::ManualRefresh => "manual_refresh",
            EvaluationSource::Startup => "startup",
        }
    }
}

/// Resolved place label for a snapshot.
///
/// `Outside` means a fix existed but matched no saved location within
/// the resolution radius; `Unknown` means no fix has ever resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationLabel {
    Home,
    Work,
    Gym,
    Other { name: String },
    Outside,
    Unknown,
}

impl LocationLabel {
    /// True for labels that refer to a user-saved place.
    pub fn is_saved_place(&self) -> bool {
        matches!(
            self,
            LocationLabel::Home | LocationLabel::Work | LocationLabel::Gym | LocationLabel::Other { .. }
        )
    }

    pub fn display(&self) -> String {
        match self {
            LocationLabel::Home => "home".to_string(),
            LocationLabel::Work => "work".to_string(),
            LocationLabel::Gym => "gym".to_string(),
            LocationLabel::Other { name } => name.clone(),
            LocationLabel::Outside => "outside".to_string(),
            LocationLabel::Unknown => "unknown".to_string(),
        }
    }
}

/// Indoor/outdoor inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Indoor,
    Outdoor,
    Unknown,
}

/// Stationary/moving inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Stationary,
    Moving,
    Unknown,
}

/// Human-readable tag recording one signal disagreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictTag {
    /// Every adapter was unavailable this cycle.
    NoSignals,
    /// Fix speed and activity class disagree about motion
    /// (e.g. GPS says moving, activity says still).
    GpsActivityMismatch,
    /// Sleep override asserted while signals indicate movement.
    SleepOverrideMismatch,
    /// Connectivity suggests a known indoor network while the
    /// environment heuristic inferred outdoor.
    WifiEnvironmentMismatch,
}

impl ConflictTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictTag::NoSignals => "no_signals",
            ConflictTag::GpsActivityMismatch => "gps_activity_mismatch",
            ConflictTag::SleepOverrideMismatch => "sleep_override_mismatch",
            ConflictTag::WifiEnvironmentMismatch => "wifi_environment_mismatch",
        }
    }
}

/// The fused, confidence-scored context result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub state: ContextState,
    pub source: EvaluationSource,
    pub activity: Option<ActivityKind>,
    pub location_label: LocationLabel,
    pub environment: Environment,
    pub movement: MovementType,
    /// 0.0 to 1.0. A missing value deserializes to 0 (least trusted).
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub conflicts: Vec<ConflictTag>,
    pub updated_at: DateTime<Utc>,
    /// Monotonic per-store sequence used for compare-and-swap on the
    /// current-snapshot slot.
    #[serde(default)]
    pub sequence: u64,
    /// Precise coordinates of the evaluated fix. Stripped before
    /// persistence when the privacy mode is `minimal`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
}

impl ContextSnapshot {
    /// The seed snapshot used before any evaluation has run.
    pub fn initial(at: DateTime<Utc>) -> Self {
        Self {
            state: ContextState::Unknown,
            source: EvaluationSource::Startup,
            activity: None,
            location_label: LocationLabel::Unknown,
            environment: Environment::Unknown,
            movement: MovementType::Unknown,
            confidence: 0.0,
            conflicts: Vec::new(),
            updated_at: at,
            sequence: 0,
            latitude: None,
            longitude: None,
            accuracy_m: None,
        }
    }

    /// Confidence with the undefined/NaN case collapsed to 0.
    pub fn effective_confidence(&self) -> f64 {
        if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Whether this snapshot is older than `threshold` relative to `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        now.signed_duration_since(self.updated_at) > threshold
    }

    /// Copy with precise coordinates and accuracy removed, per the
    /// `minimal` privacy mode.
    pub fn redacted(&self) -> Self {
        Self {
            latitude: None,
            longitude: None,
            accuracy_m: None,
            ..self.clone()
        }
    }

    pub fn has_conflict(&self, tag: ConflictTag) -> bool {
        self.conflicts.contains(&tag)
    }
}
