//! User-declared saved locations and place resolution.
//!
//! Saved locations are created and edited by the user only; the engine
//! reads them to resolve a location fix into a [`LocationLabel`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::LocationLabel;
use crate::error::ValidationError;
use crate::signals::LocationFix;

/// The fixed label vocabulary for saved places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceKind {
    Home,
    Work,
    Gym,
    Other,
}

impl PlaceKind {
    pub fn name(self) -> &'static str {
        match self {
            PlaceKind::Home => "home",
            PlaceKind::Work => "work",
            PlaceKind::Gym => "gym",
            PlaceKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "home" => Some(PlaceKind::Home),
            "work" => Some(PlaceKind::Work),
            "gym" => Some(PlaceKind::Gym),
            "other" => Some(PlaceKind::Other),
            _ => None,
        }
    }
}

/// A user-declared place. Read-only input to the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedLocation {
    pub kind: PlaceKind,
    pub latitude: f64,
    pub longitude: f64,
    /// Custom display name; required for `Other`, optional elsewhere.
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SavedLocation {
    pub fn new(kind: PlaceKind, latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::InvalidCoordinate {
                field: "latitude".into(),
                value: latitude,
            });
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::InvalidCoordinate {
                field: "longitude".into(),
                value: longitude,
            });
        }
        Ok(Self {
            kind,
            latitude,
            longitude,
            display_name: None,
            created_at: Utc::now(),
        })
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// The snapshot label this place resolves to.
    pub fn label(&self) -> LocationLabel {
        match self.kind {
            PlaceKind::Home => LocationLabel::Home,
            PlaceKind::Work => LocationLabel::Work,
            PlaceKind::Gym => LocationLabel::Gym,
            PlaceKind::Other => LocationLabel::Other {
                name: self
                    .display_name
                    .clone()
                    .unwrap_or_else(|| "other".to_string()),
            },
        }
    }

    pub fn display(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| self.kind.name().to_string())
    }
}

/// Resolve a fix against the saved-location set.
///
/// Picks the nearest place within `radius_m`. Ties resolve to the
/// earlier entry in `places`; callers pass places in registration
/// order (the storage layer returns them that way), which makes the
/// tie-break first-registered and deterministic.
///
/// Returns `LocationLabel::Outside` when the fix matches nothing.
pub fn resolve_label(fix: &LocationFix, places: &[SavedLocation], radius_m: f64) -> LocationLabel {
    let mut best: Option<(f64, &SavedLocation)> = None;
    for place in places {
        let d = fix.distance_m(place.latitude, place.longitude);
        if d > radius_m {
            continue;
        }
        match best {
            // Strictly-closer wins; an equal distance keeps the earlier entry.
            Some((best_d, _)) if d >= best_d => {}
            _ => best = Some((d, place)),
        }
    }
    match best {
        Some((_, place)) => place.label(),
        None => LocationLabel::Outside,
    }
}
