//! Background task plumbing.
//!
//! Three registrations keep context fresh without the app in the
//! foreground: the significant-change location stream, the periodic
//! fetch alarm and the watchdog. This module holds the task-side
//! types and loops; all decisions about WHAT to run live in
//! [`crate::health`] and the engine applies them.

pub mod hooks;
pub mod location;
pub mod periodic;

pub use hooks::{HookSet, PostEvalHook, MAX_HOOKS};
pub use location::{newest_fix, BackgroundLocationTask, LocationBackend, LocationPermissions};
pub use periodic::{periodic_fetch_loop, FetchCycle, FetchOutcome, PeriodicFetchConfig};

use serde::{Deserialize, Serialize};

/// The background registrations the engine manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    BackgroundLocation,
    PeriodicFetch,
    Watchdog,
}

impl TaskKind {
    pub fn name(self) -> &'static str {
        match self {
            TaskKind::BackgroundLocation => "background_location",
            TaskKind::PeriodicFetch => "periodic_fetch",
            TaskKind::Watchdog => "watchdog",
        }
    }
}
