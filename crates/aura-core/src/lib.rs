//! # Aura Core Library
//!
//! This library provides the context sensing and background health
//! engine for Aura. It implements a CLI-first philosophy where all
//! operations are available via a standalone CLI binary, with the
//! mobile shells being thin adapter layers over the same core library.
//!
//! ## Architecture
//!
//! - **Signal Sources**: best-effort adapters over the platform
//!   location, activity, power and connectivity facilities
//! - **Context Evaluator**: a pure, confidence-scored fusion step that
//!   turns one cycle of signals into a [`ContextSnapshot`]
//! - **Storage**: SQLite-backed current-slot, history log and saved
//!   places, plus TOML-based configuration
//! - **Background Tasks**: location delivery handling, the periodic
//!   fetch driver and the self-healing watchdog
//! - **Health**: operating mode, backpressure derivation and task
//!   reconciliation
//!
//! ## Key Components
//!
//! - [`ContextEngine`]: the facade every trigger routes through
//! - [`evaluate`]: the pure evaluation step
//! - [`ContextStore`]: snapshot, history and place persistence
//! - [`BackgroundHealthStatus`]: the live health record

pub mod context;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod health;
pub mod places;
pub mod signals;
pub mod storage;
pub mod tasks;
pub mod watchdog;

pub use context::{
    ConflictTag, ContextSnapshot, ContextState, Environment, EvaluationSource, LocationLabel,
    MovementType,
};
pub use engine::{ContextEngine, CycleOutcome};
pub use error::{ConfigError, CoreError, DatabaseError, RegistrationError, ValidationError};
pub use evaluator::{evaluate, EvaluateOptions, Evaluation, StateRuleTable};
pub use events::{Event, EventLog};
pub use health::{
    derive_backpressure, reconcile, BackgroundHealthStatus, BackpressureLevel, Mode,
    ReconcileAction, ReconcileSummary,
};
pub use places::{resolve_label, PlaceKind, SavedLocation};
pub use signals::{
    ActivityKind, ActivityProvider, ActivitySample, ConnectivityProvider, ConnectivityState,
    DevicePowerState, DeviceStateProvider, LocationFix, LocationProvider, SignalSnapshot,
    SignalSources, TemporalContext,
};
pub use storage::{
    ContextStore, DataResetOptions, DataResetSummary, EngineConfig, HistoryEntry, HistorySummary,
    PrivacyMode,
};
pub use tasks::{
    periodic_fetch_loop, BackgroundLocationTask, FetchCycle, FetchOutcome, HookSet,
    LocationBackend, LocationPermissions, PeriodicFetchConfig, PostEvalHook, TaskKind,
};
pub use watchdog::{watchdog_loop, Inspector, Watchdog, WatchdogAction, WatchdogReport};

pub use error::Result;
