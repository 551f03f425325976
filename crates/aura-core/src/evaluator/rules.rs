//! Ordered rule table mapping (label, movement, activity, hour) to an
//! inferred context state.
//!
//! The table is explicit data with first-match-wins precedence, so the
//! priority between overlapping rules is visible and testable instead
//! of being buried in branch order. A table miss carries the previous
//! state forward.

use crate::context::{ContextState, LocationLabel, MovementType};
use crate::signals::{ActivityKind, TemporalContext};

/// Label pattern for a rule. `Other` matches any named custom place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelPattern {
    Home,
    Work,
    Gym,
    Other,
    Outside,
}

impl LabelPattern {
    fn matches(self, label: &LocationLabel) -> bool {
        matches!(
            (self, label),
            (LabelPattern::Home, LocationLabel::Home)
                | (LabelPattern::Work, LocationLabel::Work)
                | (LabelPattern::Gym, LocationLabel::Gym)
                | (LabelPattern::Other, LocationLabel::Other { .. })
                | (LabelPattern::Outside, LocationLabel::Outside)
        )
    }
}

/// One row of the state table. `None` fields match anything.
#[derive(Debug, Clone)]
pub struct StateRule {
    pub name: &'static str,
    pub label: Option<LabelPattern>,
    pub movement: Option<MovementType>,
    pub activity: Option<ActivityKind>,
    /// Wrapping hour range `[start, end)`; `(22, 7)` covers the night.
    pub hours: Option<(u8, u8)>,
    /// `Some(false)` restricts the rule to weekdays.
    pub weekend: Option<bool>,
    pub state: ContextState,
}

/// Input the table is matched against.
#[derive(Debug, Clone)]
pub struct RuleInput<'a> {
    pub label: &'a LocationLabel,
    pub movement: MovementType,
    pub activity: Option<ActivityKind>,
    pub temporal: TemporalContext,
}

impl StateRule {
    fn matches(&self, input: &RuleInput<'_>) -> bool {
        if let Some(pattern) = self.label {
            if !pattern.matches(input.label) {
                return false;
            }
        }
        if let Some(movement) = self.movement {
            if movement != input.movement {
                return false;
            }
        }
        if let Some(kind) = self.activity {
            if input.activity != Some(kind) {
                return false;
            }
        }
        if let Some((start, end)) = self.hours {
            if !input.temporal.in_hours(start, end) {
                return false;
            }
        }
        if let Some(weekend) = self.weekend {
            if weekend != input.temporal.is_weekend {
                return false;
            }
        }
        true
    }
}

/// A matched rule: the derived state plus the rule name for
/// observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch {
    pub state: ContextState,
    pub rule: &'static str,
}

/// The ordered rule table. First match wins.
#[derive(Debug, Clone)]
pub struct StateRuleTable {
    rules: Vec<StateRule>,
}

impl StateRuleTable {
    /// The built-in policy, ordered most-specific first:
    ///
    /// 1. place-anchored rules (gym, night at home, office hours)
    /// 2. activity-anchored rules (vehicle, running, cycling)
    /// 3. movement + time-of-day fallbacks
    pub fn standard() -> Self {
        Self {
            rules: vec![
                StateRule {
                    name: "gym_session",
                    label: Some(LabelPattern::Gym),
                    movement: None,
                    activity: None,
                    hours: None,
                    weekend: None,
                    state: ContextState::Active,
                },
                StateRule {
                    name: "home_night_rest",
                    label: Some(LabelPattern::Home),
                    movement: Some(MovementType::Stationary),
                    activity: None,
                    hours: Some((22, 7)),
                    weekend: None,
                    state: ContextState::Resting,
                },
                StateRule {
                    name: "office_hours",
                    label: Some(LabelPattern::Work),
                    movement: None,
                    activity: None,
                    hours: Some((7, 20)),
                    weekend: None,
                    state: ContextState::Working,
                },
                StateRule {
                    name: "vehicle_commute",
                    label: None,
                    movement: None,
                    activity: Some(ActivityKind::InVehicle),
                    hours: None,
                    weekend: None,
                    state: ContextState::Commuting,
                },
                StateRule {
                    name: "running_workout",
                    label: None,
                    movement: None,
                    activity: Some(ActivityKind::Running),
                    hours: None,
                    weekend: None,
                    state: ContextState::Active,
                },
                StateRule {
                    name: "cycling_workout",
                    label: None,
                    movement: None,
                    activity: Some(ActivityKind::Cycling),
                    hours: None,
                    weekend: None,
                    state: ContextState::Active,
                },
                StateRule {
                    name: "morning_commute",
                    label: None,
                    movement: Some(MovementType::Moving),
                    activity: None,
                    hours: Some((6, 10)),
                    weekend: Some(false),
                    state: ContextState::Commuting,
                },
                StateRule {
                    name: "evening_commute",
                    label: None,
                    movement: Some(MovementType::Moving),
                    activity: None,
                    hours: Some((16, 20)),
                    weekend: Some(false),
                    state: ContextState::Commuting,
                },
                StateRule {
                    name: "moving_fallback",
                    label: None,
                    movement: Some(MovementType::Moving),
                    activity: None,
                    hours: None,
                    weekend: None,
                    state: ContextState::Active,
                },
                StateRule {
                    name: "home_rest",
                    label: Some(LabelPattern::Home),
                    movement: Some(MovementType::Stationary),
                    activity: None,
                    hours: None,
                    weekend: None,
                    state: ContextState::Resting,
                },
                StateRule {
                    name: "weekday_desk_hours",
                    label: None,
                    movement: Some(MovementType::Stationary),
                    activity: None,
                    hours: Some((9, 18)),
                    weekend: Some(false),
                    state: ContextState::Working,
                },
                StateRule {
                    name: "stationary_rest",
                    label: None,
                    movement: Some(MovementType::Stationary),
                    activity: None,
                    hours: None,
                    weekend: None,
                    state: ContextState::Resting,
                },
            ],
        }
    }

    /// First matching rule, or `None` when the table has no opinion.
    pub fn apply(&self, input: &RuleInput<'_>) -> Option<RuleMatch> {
        self.rules.iter().find(|r| r.matches(input)).map(|r| RuleMatch {
            state: r.state,
            rule: r.name,
        })
    }

    pub fn rules(&self) -> &[StateRule] {
        &self.rules
    }
}

impl Default for StateRuleTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn temporal(hour: u32, day: u32) -> TemporalContext {
        // June 2024: the 17th is a Monday, the 15th a Saturday.
        let at = Utc.with_ymd_and_hms(2024, 6, day, hour, 30, 0).unwrap();
        TemporalContext::from_datetime(at)
    }

    fn input<'a>(
        label: &'a LocationLabel,
        movement: MovementType,
        activity: Option<ActivityKind>,
        hour: u32,
        day: u32,
    ) -> RuleInput<'a> {
        RuleInput {
            label,
            movement,
            activity,
            temporal: temporal(hour, day),
        }
    }

    #[test]
    fn home_night_stationary_is_resting() {
        let table = StateRuleTable::standard();
        let label = LocationLabel::Home;
        let m = table
            .apply(&input(&label, MovementType::Stationary, None, 23, 17))
            .unwrap();
        assert_eq!(m.state, ContextState::Resting);
        assert_eq!(m.rule, "home_night_rest");
    }

    #[test]
    fn gym_beats_time_of_day_rules() {
        let table = StateRuleTable::standard();
        let label = LocationLabel::Gym;
        // Even at 23:00 stationary, gym wins because it is ordered first.
        let m = table
            .apply(&input(&label, MovementType::Stationary, None, 23, 17))
            .unwrap();
        assert_eq!(m.rule, "gym_session");
        assert_eq!(m.state, ContextState::Active);
    }

    #[test]
    fn office_hours_at_work_is_working() {
        let table = StateRuleTable::standard();
        let label = LocationLabel::Work;
        let m = table
            .apply(&input(&label, MovementType::Moving, None, 10, 17))
            .unwrap();
        assert_eq!(m.rule, "office_hours");
        assert_eq!(m.state, ContextState::Working);
    }

    #[test]
    fn vehicle_wins_over_generic_moving() {
        let table = StateRuleTable::standard();
        let label = LocationLabel::Outside;
        let m = table
            .apply(&input(
                &label,
                MovementType::Moving,
                Some(ActivityKind::InVehicle),
                13,
                15,
            ))
            .unwrap();
        assert_eq!(m.rule, "vehicle_commute");
        assert_eq!(m.state, ContextState::Commuting);
    }

    #[test]
    fn weekday_morning_movement_is_commute_but_weekend_is_not() {
        let table = StateRuleTable::standard();
        let label = LocationLabel::Outside;

        let weekday = table
            .apply(&input(&label, MovementType::Moving, None, 8, 17))
            .unwrap();
        assert_eq!(weekday.rule, "morning_commute");

        let weekend = table
            .apply(&input(&label, MovementType::Moving, None, 8, 15))
            .unwrap();
        assert_eq!(weekend.rule, "moving_fallback");
        assert_eq!(weekend.state, ContextState::Active);
    }

    #[test]
    fn home_daytime_stationary_is_resting_not_working() {
        let table = StateRuleTable::standard();
        let label = LocationLabel::Home;
        // home_rest is ordered before weekday_desk_hours.
        let m = table
            .apply(&input(&label, MovementType::Stationary, None, 11, 17))
            .unwrap();
        assert_eq!(m.rule, "home_rest");
        assert_eq!(m.state, ContextState::Resting);
    }

    #[test]
    fn unknown_movement_without_anchors_matches_nothing() {
        let table = StateRuleTable::standard();
        let label = LocationLabel::Unknown;
        assert!(table
            .apply(&input(&label, MovementType::Unknown, None, 11, 17))
            .is_none());
    }

    #[test]
    fn table_order_is_stable() {
        let names: Vec<_> = StateRuleTable::standard()
            .rules()
            .iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names[0], "gym_session");
        assert!(
            names.iter().position(|n| *n == "moving_fallback").unwrap()
                > names.iter().position(|n| *n == "morning_commute").unwrap()
        );
    }
}
