//! Background health and backpressure model.
//!
//! This module is the pure decision core for background self-regulation:
//! it derives a backpressure level from the device power state, plans
//! which background tasks should be registered, and carries the health
//! status record that diagnostics and the watchdog read. Nothing here
//! touches the OS or the database; the engine applies the plans.
//!
//! ## Usage
//! ```rust,ignore
//! use aura_core::health::{derive_backpressure, reconcile};
//!
//! let level = derive_backpressure(&power);
//! let plan = reconcile(&status, &prefs, grants, Some(&power), Utc::now());
//! for action in &plan.actions {
//!     apply(action);
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signals::DevicePowerState;
use crate::storage::PreferencesConfig;
use crate::tasks::LocationPermissions;

/// Battery percentage below which (uncharged) all non-essential
/// background work stops.
pub const CRITICAL_BATTERY_PCT: u8 = 15;

/// Battery percentage below which (uncharged) background cadence slows.
pub const LOW_BATTERY_PCT: u8 = 30;

/// Operating mode for the background engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// No background activity at all.
    Off,
    /// Notifications-only operation. Sensing registrations stay up;
    /// consumers read this mode to keep richer surfaces dark.
    Light,
    /// Everything on.
    #[default]
    Full,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Off => "off",
            Mode::Light => "light",
            Mode::Full => "full",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(Mode::Off),
            "light" => Some(Mode::Light),
            "full" => Some(Mode::Full),
            _ => None,
        }
    }
}

/// Backpressure severity, ordered so `max()` picks the stricter level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum BackpressureLevel {
    #[default]
    None,
    Light,
    Moderate,
    Severe,
}

impl BackpressureLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            BackpressureLevel::None => "none",
            BackpressureLevel::Light => "light",
            BackpressureLevel::Moderate => "moderate",
            BackpressureLevel::Severe => "severe",
        }
    }

    /// Extra delay injected before the next periodic cycle.
    pub fn recommended_delay_ms(self) -> u64 {
        match self {
            BackpressureLevel::None => 0,
            BackpressureLevel::Light => 60_000,
            BackpressureLevel::Moderate => 300_000,
            BackpressureLevel::Severe => 900_000,
        }
    }

    /// Whether non-essential background work should be skipped
    /// entirely rather than delayed.
    pub fn skip_nonessential(self) -> bool {
        self == BackpressureLevel::Severe
    }
}

/// Derive the backpressure level from the device power state.
///
/// The rules are evaluated top to bottom and the first hit wins;
/// charging neutralizes every restriction.
pub fn derive_backpressure(power: &DevicePowerState) -> BackpressureLevel {
    if power.charging {
        return BackpressureLevel::None;
    }
    if power.battery_pct < CRITICAL_BATTERY_PCT {
        return BackpressureLevel::Severe;
    }
    if power.idle {
        return BackpressureLevel::Severe;
    }
    if power.power_save {
        return BackpressureLevel::Moderate;
    }
    if power.battery_pct < LOW_BATTERY_PCT {
        return BackpressureLevel::Light;
    }
    BackpressureLevel::None
}

/// The live health record for the background engine.
///
/// Written by the engine after every cycle and reconcile pass; read by
/// the watchdog and exported verbatim through diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundHealthStatus {
    pub mode: Mode,
    pub backpressure: BackpressureLevel,
    /// Device power state as of the last signal read; `None` until the
    /// first cycle observes one.
    pub power: Option<DevicePowerState>,
    /// Location grants as of the last reconcile; `None` until the
    /// first pass reads them.
    pub permissions: Option<LocationPermissions>,
    pub location_task_registered: bool,
    pub periodic_task_registered: bool,
    pub last_evaluation_at: Option<DateTime<Utc>>,
    pub last_watchdog_at: Option<DateTime<Utc>>,
    pub last_reconcile_at: Option<DateTime<Utc>>,
    /// Failures since the last successful evaluation.
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl BackgroundHealthStatus {
    pub fn new(mode: Mode, at: DateTime<Utc>) -> Self {
        Self {
            mode,
            backpressure: BackpressureLevel::None,
            power: None,
            permissions: None,
            location_task_registered: false,
            periodic_task_registered: false,
            last_evaluation_at: None,
            last_watchdog_at: None,
            last_reconcile_at: None,
            consecutive_failures: 0,
            last_error: None,
            updated_at: at,
        }
    }

    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.last_evaluation_at = Some(at);
        self.consecutive_failures = 0;
        self.last_error = None;
        self.updated_at = at;
    }

    pub fn record_failure(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error.into());
        self.updated_at = at;
    }
}

/// One registration change the engine must apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    StartLocationTask,
    StopLocationTask,
    StartPeriodicTask,
    StopPeriodicTask,
}

/// Result of one reconcile pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub mode: Mode,
    pub backpressure: BackpressureLevel,
    /// Desired registration state after this pass.
    pub location_should_run: bool,
    pub periodic_should_run: bool,
    /// Changes needed to get from the actual state to the desired one.
    pub actions: Vec<ReconcileAction>,
    pub reconciled_at: DateTime<Utc>,
}

impl ReconcileSummary {
    pub fn has_changes(&self) -> bool {
        !self.actions.is_empty()
    }

    pub fn message(&self) -> String {
        if self.actions.is_empty() {
            format!(
                "Background tasks consistent (mode {}, backpressure {}).",
                self.mode.as_str(),
                self.backpressure.as_str()
            )
        } else {
            let names: Vec<&str> = self
                .actions
                .iter()
                .map(|a| match a {
                    ReconcileAction::StartLocationTask => "start location task",
                    ReconcileAction::StopLocationTask => "stop location task",
                    ReconcileAction::StartPeriodicTask => "start periodic task",
                    ReconcileAction::StopPeriodicTask => "stop periodic task",
                })
                .collect();
            format!(
                "Reconciled background tasks (mode {}, backpressure {}): {}.",
                self.mode.as_str(),
                self.backpressure.as_str(),
                names.join(", ")
            )
        }
    }
}

/// Compute the desired task registrations and the actions needed to
/// reach them.
///
/// Pure: compares the status' registered flags against what mode,
/// preferences, grants and backpressure say should run. A missing
/// power state reads as no backpressure rather than blocking
/// reconciliation.
pub fn reconcile(
    status: &BackgroundHealthStatus,
    prefs: &PreferencesConfig,
    permissions: LocationPermissions,
    power: Option<&DevicePowerState>,
    now: DateTime<Utc>,
) -> ReconcileSummary {
    let backpressure = power.map(derive_backpressure).unwrap_or_default();

    let location_should_run = status.mode != Mode::Off
        && prefs.background_location
        && permissions.complete()
        // The continuous stream is the expensive registration; severe
        // pressure tears it down, the periodic alarm stays.
        && !backpressure.skip_nonessential();
    let periodic_should_run = status.mode != Mode::Off && prefs.periodic_fetch;

    let mut actions = Vec::new();
    if location_should_run && !status.location_task_registered {
        actions.push(ReconcileAction::StartLocationTask);
    }
    if !location_should_run && status.location_task_registered {
        actions.push(ReconcileAction::StopLocationTask);
    }
    if periodic_should_run && !status.periodic_task_registered {
        actions.push(ReconcileAction::StartPeriodicTask);
    }
    if !periodic_should_run && status.periodic_task_registered {
        actions.push(ReconcileAction::StopPeriodicTask);
    }

    ReconcileSummary {
        mode: status.mode,
        backpressure,
        location_should_run,
        periodic_should_run,
        actions,
        reconciled_at: now,
    }
}
