//! Confidence scoring and signal disagreement detection.
//!
//! Confidence is a pure function of what was available this cycle:
//! each present signal contributes its weight scaled by freshness, and
//! every detected conflict subtracts a fixed penalty. No signals means
//! zero confidence.

use crate::context::{ConflictTag, Environment, MovementType};
use crate::signals::SignalSnapshot;

// Weight of each signal family in the base score. The weights sum to
// 1.0 so an all-fresh, all-present snapshot scores exactly 1.0.
const LOCATION_WEIGHT: f64 = 0.45;
const ACTIVITY_WEIGHT: f64 = 0.35;
const DEVICE_WEIGHT: f64 = 0.10;
const CONNECTIVITY_WEIGHT: f64 = 0.10;

// Freshness half-lives. A fix this old contributes half its weight.
const FIX_HALF_LIFE_SECS: f64 = 300.0;
const ACTIVITY_HALF_LIFE_SECS: f64 = 180.0;

const CONFLICT_PENALTY: f64 = 0.15;

/// Exponential decay: 1.0 at age zero, 0.5 at one half-life.
fn freshness(age_secs: i64, half_life_secs: f64) -> f64 {
    let age = age_secs.max(0) as f64;
    0.5f64.powf(age / half_life_secs)
}

/// Base score plus conflict penalty, clamped into `0.0..=1.0`.
pub(super) fn score(signals: &SignalSnapshot, conflicts: &[ConflictTag]) -> f64 {
    if signals.is_empty() {
        return 0.0;
    }
    let now = signals.gathered_at;
    let mut base = 0.0;
    if let Some(fix) = &signals.fix {
        base += LOCATION_WEIGHT * freshness(fix.age_secs(now), FIX_HALF_LIFE_SECS);
    }
    if let Some(activity) = &signals.activity {
        base += ACTIVITY_WEIGHT * freshness(activity.age_secs(now), ACTIVITY_HALF_LIFE_SECS);
    }
    if signals.device.is_some() {
        // Power state is read at gather time, always current.
        base += DEVICE_WEIGHT;
    }
    if signals.connectivity.is_some() {
        base += CONNECTIVITY_WEIGHT;
    }
    let penalty = CONFLICT_PENALTY * conflicts.len() as f64;
    (base - penalty).clamp(0.0, 1.0)
}

/// Every disagreement between this cycle's signals, in a stable order.
pub(super) fn detect_conflicts(
    signals: &SignalSnapshot,
    movement: MovementType,
    environment: Environment,
    sleep_override: bool,
) -> Vec<ConflictTag> {
    let mut tags = Vec::new();
    if signals.is_empty() {
        tags.push(ConflictTag::NoSignals);
        return tags;
    }

    let from_speed = signals
        .fix
        .as_ref()
        .and_then(|f| super::movement_from_speed(f, signals.gathered_at));
    let from_activity = signals
        .activity
        .as_ref()
        .and_then(|a| super::movement_from_activity(a, signals.gathered_at));
    if let (Some(speed_says), Some(activity_says)) = (from_speed, from_activity) {
        if speed_says != activity_says {
            tags.push(ConflictTag::GpsActivityMismatch);
        }
    }

    if sleep_override && movement == MovementType::Moving {
        tags.push(ConflictTag::SleepOverrideMismatch);
    }

    let on_wifi = signals.connectivity.as_ref().is_some_and(|c| c.is_wifi());
    if on_wifi && environment == Environment::Outdoor {
        tags.push(ConflictTag::WifiEnvironmentMismatch);
    }

    tags
}
