//! Wall-clock temporal context.
//!
//! Always available -- derived from the clock, never from a sensor --
//! so it carries no timestamp/availability of its own.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Hour-of-day / day-of-week descriptor used by the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalContext {
    /// Hour of day, 0-23.
    pub hour: u8,
    /// Day of week, Monday = 1 .. Sunday = 7 (ISO weekday numbering).
    pub weekday: u8,
    pub is_weekend: bool,
}

impl TemporalContext {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        let weekday = at.weekday();
        Self {
            hour: at.hour() as u8,
            weekday: weekday.number_from_monday() as u8,
            is_weekend: matches!(weekday, Weekday::Sat | Weekday::Sun),
        }
    }

    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// True when `hour` falls inside a possibly wrapping range
    /// `[start, end)`, e.g. `in_hours(22, 7)` covers 22:00-06:59.
    pub fn in_hours(&self, start: u8, end: u8) -> bool {
        if start <= end {
            (start..end).contains(&self.hour)
        } else {
            self.hour >= start || self.hour < end
        }
    }
}
