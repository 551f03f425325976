//! The context evaluator.
//!
//! [`evaluate`] is a pure function from raw signals plus the previous
//! snapshot to a new [`ContextSnapshot`]. All persistence, scheduling
//! and callback plumbing lives elsewhere; everything in this module is
//! deterministic and side-effect free, which is what makes the fusion
//! logic unit-testable without a device.
//!
//! Pipeline, in order:
//!
//! 1. classify movement (fix speed first, activity class second)
//! 2. classify indoor/outdoor from accuracy and connectivity
//! 3. resolve the place label against saved locations
//! 4. detect signal disagreements
//! 5. pick the state from the ordered rule table
//! 6. score confidence from signal freshness minus conflicts
//!
//! A sleep override short-circuits step 5: the state collapses to
//! `Sleeping` and confidence never drops below 0.7, but disagreeing
//! signals are still recorded as conflicts.

mod confidence;
mod rules;

pub use rules::{LabelPattern, RuleInput, RuleMatch, StateRule, StateRuleTable};

use chrono::{DateTime, Utc};

use crate::context::{
    ContextSnapshot, ContextState, Environment, EvaluationSource, LocationLabel, MovementType,
};
use crate::places::{resolve_label, SavedLocation};
use crate::signals::{ActivitySample, LocationFix, SignalSnapshot};

/// Default radius for matching a fix against a saved place.
pub const DEFAULT_PLACE_RADIUS_M: f64 = 150.0;

/// Confidence floor applied while a sleep override is asserted.
pub const SLEEP_OVERRIDE_MIN_CONFIDENCE: f64 = 0.7;

// Speed above which a fix counts as moving. Slow walking is ~1.0 m/s.
const MOVING_SPEED_MPS: f64 = 0.7;

// Signals older than this no longer drive movement classification.
const SIGNAL_MAX_AGE_SECS: i64 = 600;

// Activity samples below this recognition confidence are ignored.
const MIN_ACTIVITY_CONFIDENCE: f64 = 0.3;

// GPS accuracy bands for the indoor/outdoor heuristic.
const DEGRADED_ACCURACY_M: f64 = 35.0;
const OPEN_SKY_ACCURACY_M: f64 = 15.0;

/// Per-call evaluation inputs beyond the signals themselves.
#[derive(Debug, Clone)]
pub struct EvaluateOptions<'a> {
    pub source: EvaluationSource,
    pub sleep_override: bool,
    pub places: &'a [SavedLocation],
    pub place_radius_m: f64,
    /// Custom rule table; `None` uses [`StateRuleTable::standard`].
    pub table: Option<&'a StateRuleTable>,
}

impl<'a> EvaluateOptions<'a> {
    pub fn new(source: EvaluationSource) -> Self {
        Self {
            source,
            sleep_override: false,
            places: &[],
            place_radius_m: DEFAULT_PLACE_RADIUS_M,
            table: None,
        }
    }

    pub fn with_sleep_override(mut self, on: bool) -> Self {
        self.sleep_override = on;
        self
    }

    pub fn with_places(mut self, places: &'a [SavedLocation]) -> Self {
        self.places = places;
        self
    }

    pub fn with_place_radius(mut self, radius_m: f64) -> Self {
        self.place_radius_m = radius_m.max(1.0);
        self
    }

    pub fn with_rule_table(mut self, table: &'a StateRuleTable) -> Self {
        self.table = Some(table);
        self
    }
}

/// The outcome of one evaluation.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub snapshot: ContextSnapshot,
    /// Name of the decision path that fixed the state: a rule-table
    /// row, `"sleep_override"`, or `None` when the previous state was
    /// carried forward.
    pub rule: Option<&'static str>,
}

/// Fuse one cycle of signals into the next context snapshot.
pub fn evaluate(
    signals: &SignalSnapshot,
    previous: Option<&ContextSnapshot>,
    options: &EvaluateOptions<'_>,
) -> Evaluation {
    let movement = classify_movement(signals);
    let environment = classify_environment(signals, movement);
    let label = match &signals.fix {
        Some(fix) => resolve_label(fix, options.places, options.place_radius_m),
        // The last resolved place stays plausible until a fix says
        // otherwise.
        None => previous
            .map(|p| p.location_label.clone())
            .unwrap_or(LocationLabel::Unknown),
    };
    let conflicts =
        confidence::detect_conflicts(signals, movement, environment, options.sleep_override);
    let activity = signals.activity.as_ref().map(|a| a.kind);
    let previous_state = previous.map(|p| p.state).unwrap_or(ContextState::Unknown);
    let previous_confidence = previous.map(|p| p.effective_confidence()).unwrap_or(0.0);

    let (state, rule, conf) = if options.sleep_override {
        let conf = previous_confidence.max(SLEEP_OVERRIDE_MIN_CONFIDENCE);
        (ContextState::Sleeping, Some("sleep_override"), conf)
    } else if signals.is_empty() {
        // Total signal loss: carry the previous state at zero trust.
        (previous_state, None, 0.0)
    } else {
        let standard;
        let table = match options.table {
            Some(t) => t,
            None => {
                standard = StateRuleTable::standard();
                &standard
            }
        };
        let input = RuleInput {
            label: &label,
            movement,
            activity,
            temporal: signals.temporal,
        };
        let conf = confidence::score(signals, &conflicts);
        match table.apply(&input) {
            Some(m) => (m.state, Some(m.rule), conf),
            None => (previous_state, None, conf),
        }
    };

    // Wall-clock skew between triggers must never move the snapshot
    // backwards in time.
    let updated_at = match previous {
        Some(p) if p.updated_at > signals.gathered_at => p.updated_at,
        _ => signals.gathered_at,
    };
    let sequence = previous.map(|p| p.sequence + 1).unwrap_or(1);

    Evaluation {
        snapshot: ContextSnapshot {
            state,
            source: options.source,
            activity,
            location_label: label,
            environment,
            movement,
            confidence: conf,
            conflicts,
            updated_at,
            sequence,
            latitude: signals.fix.as_ref().map(|f| f.latitude),
            longitude: signals.fix.as_ref().map(|f| f.longitude),
            accuracy_m: signals.fix.as_ref().map(|f| f.accuracy_m),
        },
        rule,
    }
}

/// Fix speed wins when present; activity recognition is the fallback.
fn classify_movement(signals: &SignalSnapshot) -> MovementType {
    let now = signals.gathered_at;
    if let Some(m) = signals.fix.as_ref().and_then(|f| movement_from_speed(f, now)) {
        return m;
    }
    if let Some(m) = signals
        .activity
        .as_ref()
        .and_then(|a| movement_from_activity(a, now))
    {
        return m;
    }
    MovementType::Unknown
}

fn movement_from_speed(fix: &LocationFix, now: DateTime<Utc>) -> Option<MovementType> {
    if fix.age_secs(now) > SIGNAL_MAX_AGE_SECS {
        return None;
    }
    let speed = fix.speed_mps?;
    if !speed.is_finite() {
        return None;
    }
    if speed >= MOVING_SPEED_MPS {
        Some(MovementType::Moving)
    } else {
        Some(MovementType::Stationary)
    }
}

fn movement_from_activity(sample: &ActivitySample, now: DateTime<Utc>) -> Option<MovementType> {
    if sample.age_secs(now) > SIGNAL_MAX_AGE_SECS || sample.confidence < MIN_ACTIVITY_CONFIDENCE {
        return None;
    }
    use crate::signals::ActivityKind;
    match sample.kind {
        ActivityKind::Unknown => None,
        ActivityKind::Still => Some(MovementType::Stationary),
        _ => Some(MovementType::Moving),
    }
}

/// Accuracy-band heuristic: sharp fixes read as open sky, badly
/// degraded ones as indoors, wifi anchors a stationary user indoors.
fn classify_environment(signals: &SignalSnapshot, movement: MovementType) -> Environment {
    let on_wifi = signals.connectivity.as_ref().is_some_and(|c| c.is_wifi());
    let Some(fix) = &signals.fix else {
        return if on_wifi {
            Environment::Indoor
        } else {
            Environment::Unknown
        };
    };
    if on_wifi && movement != MovementType::Moving {
        return Environment::Indoor;
    }
    if fix.accuracy_m > DEGRADED_ACCURACY_M {
        return Environment::Indoor;
    }
    if movement == MovementType::Moving || fix.accuracy_m <= OPEN_SKY_ACCURACY_M {
        return Environment::Outdoor;
    }
    Environment::Unknown
}
