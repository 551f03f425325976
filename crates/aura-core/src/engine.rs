//! Engine facade.
//!
//! [`ContextEngine`] owns the store, the signal sources, the background
//! tasks, the watchdog and the health record, and is the single entry
//! point for every trigger: location deliveries, periodic wakes,
//! watchdog passes and foreground reads all route through here.
//!
//! Concurrency: the store mutex is the read-fuse-write critical
//! section required for the current-snapshot slot. With the mutex held
//! the sequence compare-and-swap cannot fire in-process; it guards
//! against a second process sharing the same database file.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::context::{ContextSnapshot, EvaluationSource};
use crate::error::{CoreError, DatabaseError};
use crate::evaluator::{evaluate, EvaluateOptions, StateRuleTable};
use crate::events::{Event, EventLog};
use crate::health::{
    derive_backpressure, reconcile, BackgroundHealthStatus, BackpressureLevel, Mode,
    ReconcileAction, ReconcileSummary,
};
use crate::places::{PlaceKind, SavedLocation};
use crate::signals::{DevicePowerState, LocationFix, SignalSources};
use crate::storage::{
    ContextStore, EngineConfig, HistoryEntry, HistorySummary, PrivacyMode,
};
use crate::tasks::{
    newest_fix, BackgroundLocationTask, FetchCycle, FetchOutcome, LocationBackend,
    LocationPermissions, PostEvalHook, TaskKind,
};
use crate::watchdog::{Inspector, Watchdog, WatchdogAction, WatchdogReport};
use crate::Result;

/// What one completed evaluation cycle produced.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// The snapshot now in the current slot. When the commit was
    /// discarded this is the newer snapshot that won.
    pub snapshot: ContextSnapshot,
    /// False when the result was discarded instead of persisted.
    pub committed: bool,
    /// True when state or resolved label differ from the previous
    /// snapshot.
    pub changed: bool,
}

/// A poisoned lock still holds valid data for this engine: every
/// critical section leaves the store and status consistent even if a
/// panic interrupts it, so recover the guard instead of propagating.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ContextEngine {
    store: Mutex<ContextStore>,
    config: EngineConfig,
    sources: SignalSources,
    location_task: BackgroundLocationTask,
    rules: StateRuleTable,
    watchdog: Mutex<Watchdog>,
    status: Mutex<BackgroundHealthStatus>,
    hooks: Mutex<crate::tasks::HookSet>,
    events: Mutex<EventLog>,
}

impl ContextEngine {
    /// Assemble an engine over an opened store. The health record is
    /// seeded from the persisted mode.
    pub fn new(
        store: ContextStore,
        config: EngineConfig,
        sources: SignalSources,
        location_backend: Arc<dyn LocationBackend>,
    ) -> Result<Self> {
        let mode = store.background_mode()?;
        let watchdog = Watchdog::from_config(&config.tasks, &config.evaluation);
        Ok(Self {
            store: Mutex::new(store),
            sources,
            location_task: BackgroundLocationTask::new(location_backend),
            rules: StateRuleTable::standard(),
            watchdog: Mutex::new(watchdog),
            status: Mutex::new(BackgroundHealthStatus::new(mode, Utc::now())),
            hooks: Mutex::new(crate::tasks::HookSet::new()),
            events: Mutex::new(EventLog::default()),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- evaluation cycles ----

    /// Run one evaluation cycle right now.
    pub fn evaluate_now(&self, source: EvaluationSource) -> Result<CycleOutcome> {
        self.run_cycle_inner(source, Utc::now(), None)
    }

    /// Best-effort foreground refresh. No-ops under severe
    /// backpressure instead of failing.
    pub fn request_refresh(&self) -> Result<Option<CycleOutcome>> {
        let pressure = self.live_backpressure();
        if pressure.skip_nonessential() {
            log::debug!(
                "refresh request throttled under {} backpressure",
                pressure.as_str()
            );
            return Ok(None);
        }
        self.run_cycle_inner(EvaluationSource::ManualRefresh, Utc::now(), None)
            .map(Some)
    }

    /// Handle one batch of fixes from the OS location facility.
    ///
    /// Only the newest fix is evaluated; earlier ones are logged. After
    /// a committed evaluation the geofence is re-armed around the
    /// resolved place. An empty batch does nothing.
    pub fn handle_location_batch(&self, batch: Vec<LocationFix>) -> Result<Option<CycleOutcome>> {
        let delivered = batch.len();
        let Some(fix) = newest_fix(batch) else {
            log::debug!("empty location batch, nothing to evaluate");
            return Ok(None);
        };
        if delivered > 1 {
            log::debug!("location batch of {delivered} fixes, evaluating the newest");
        }

        let outcome =
            self.run_cycle_inner(EvaluationSource::BackgroundLocation, Utc::now(), Some(fix))?;

        if outcome.committed && outcome.snapshot.location_label.is_saved_place() {
            let places = lock(&self.store).places()?;
            if let Some(place) = places
                .iter()
                .find(|p| p.label() == outcome.snapshot.location_label)
            {
                if let Err(e) = self
                    .location_task
                    .rearm_geofence(place, self.config.evaluation.place_radius_m)
                {
                    log::warn!("geofence re-arm failed: {e}");
                }
            }
        }
        Ok(Some(outcome))
    }

    /// One periodic-wake cycle, mapped to the OS scheduler's tri-state
    /// result. Failures are recorded in the health status and reported
    /// as [`FetchOutcome::Failed`], never propagated.
    pub fn run_fetch_cycle(&self, now: DateTime<Utc>) -> FetchOutcome {
        let mode = match lock(&self.store).background_mode() {
            Ok(mode) => mode,
            Err(e) => {
                log::warn!("periodic fetch could not read mode: {e}");
                return FetchOutcome::Failed;
            }
        };
        if mode == Mode::Off {
            log::debug!("periodic fetch skipped: mode off");
            return FetchOutcome::NoData;
        }

        match self.run_cycle_inner(EvaluationSource::PeriodicFetch, now, None) {
            Ok(outcome) if outcome.committed && outcome.changed => FetchOutcome::NewData,
            Ok(_) => FetchOutcome::NoData,
            Err(e) => {
                log::warn!("periodic fetch cycle failed: {e}");
                FetchOutcome::Failed
            }
        }
    }

    /// Gather, evaluate and persist. The store lock is held from the
    /// previous-snapshot read to the commit, which serializes every
    /// in-process writer of the slot.
    fn run_cycle_inner(
        &self,
        source: EvaluationSource,
        now: DateTime<Utc>,
        injected_fix: Option<LocationFix>,
    ) -> Result<CycleOutcome> {
        let mut signals = self.sources.gather(now);
        if injected_fix.is_some() {
            signals.fix = injected_fix;
        }

        let store = lock(&self.store);
        let previous = store.current_snapshot()?;
        let sleep_override = store.sleep_override()?;
        let ghost = store.sleep_ghost_mode()?;
        let places = store.places()?;
        let privacy = store.privacy_mode(self.config.privacy_mode)?;

        let options = EvaluateOptions::new(source)
            .with_sleep_override(sleep_override)
            .with_places(&places)
            .with_place_radius(self.config.evaluation.place_radius_m)
            .with_rule_table(&self.rules);
        let evaluation = evaluate(&signals, previous.as_ref(), &options);

        // Mode is re-read at the last moment so an emergency stop that
        // raced this cycle wins.
        if store.background_mode()? == Mode::Off {
            let candidate = evaluation.snapshot.sequence;
            drop(store);
            self.push_event(Event::EvaluationDiscarded {
                sequence: candidate,
                reason: "mode off".to_string(),
                at: now,
            });
            return Ok(CycleOutcome {
                snapshot: previous.unwrap_or_else(|| ContextSnapshot::initial(now)),
                committed: false,
                changed: false,
            });
        }

        let commit = if sleep_override && ghost {
            store.commit_snapshot_slot_only(&evaluation.snapshot, privacy)
        } else {
            store.commit_snapshot(&evaluation.snapshot, privacy, &self.config.history)
        };

        match commit {
            Ok(stored) => {
                drop(store);
                let changed = match &previous {
                    Some(prev) => {
                        prev.state != stored.state || prev.location_label != stored.location_label
                    }
                    None => true,
                };
                if let Some(rule) = evaluation.rule {
                    log::debug!(
                        "context {} via rule {} (confidence {:.2})",
                        stored.state.name(),
                        rule,
                        stored.effective_confidence()
                    );
                }
                self.push_event(Event::ContextUpdated {
                    state: stored.state,
                    source,
                    confidence: stored.effective_confidence(),
                    sequence: stored.sequence,
                    at: now,
                });
                {
                    let mut status = lock(&self.status);
                    if signals.device.is_some() {
                        status.power = signals.device;
                    }
                    status.record_success(now);
                }
                let failures = lock(&self.hooks).notify(&stored);
                if failures > 0 {
                    log::warn!("{failures} post-evaluation hook(s) failed");
                }
                Ok(CycleOutcome {
                    snapshot: stored,
                    committed: true,
                    changed,
                })
            }
            Err(CoreError::Database(DatabaseError::StaleWrite { slot, candidate })) => {
                let winner = store.current_snapshot()?;
                drop(store);
                log::debug!("evaluation discarded: slot at {slot}, candidate {candidate}");
                self.push_event(Event::EvaluationDiscarded {
                    sequence: candidate,
                    reason: format!("slot already at sequence {slot}"),
                    at: now,
                });
                Ok(CycleOutcome {
                    snapshot: winner.unwrap_or_else(|| ContextSnapshot::initial(now)),
                    committed: false,
                    changed: false,
                })
            }
            Err(e) => {
                drop(store);
                lock(&self.status).record_failure(e.to_string(), now);
                Err(e)
            }
        }
    }

    // ---- watchdog ----

    /// One watchdog pass: inspect, then run whatever repairs the
    /// inspection decided. Called from the interval loop and from
    /// app-foreground transitions.
    pub fn run_watchdog_pass(&self, now: DateTime<Utc>) -> Result<WatchdogReport> {
        let (snapshot, mode) = {
            let store = lock(&self.store);
            (store.current_snapshot()?, store.background_mode()?)
        };
        let prefs = &self.config.preferences;
        let registered = self.location_task.is_running();

        let report = lock(&self.watchdog).inspect(prefs, snapshot.as_ref(), registered, now);
        match report.actions.first() {
            Some(WatchdogAction::Debounced) => {
                log::trace!("watchdog trigger debounced");
                return Ok(report);
            }
            Some(WatchdogAction::Disabled) => {
                log::trace!("watchdog skipped: context sensing disabled");
                return Ok(report);
            }
            _ => {}
        }

        {
            let mut status = lock(&self.status);
            status.last_watchdog_at = Some(now);
            status.updated_at = now;
        }

        if report.needs_evaluation() {
            self.push_event(Event::WatchdogInspection {
                action: WatchdogAction::ForceEvaluation,
                at: now,
            });
            if let Err(e) = self.run_cycle_inner(EvaluationSource::Watchdog, now, None) {
                log::warn!("watchdog refresh failed: {e}");
            }
        }
        if report.needs_restart() {
            self.push_event(Event::WatchdogInspection {
                action: WatchdogAction::RestartLocationTask,
                at: now,
            });
            self.start_location_task(mode, now);
        }
        Ok(report)
    }

    // ---- health / reconciliation ----

    /// Live backpressure from the device reader; an unavailable reader
    /// reads as no pressure.
    pub fn live_backpressure(&self) -> BackpressureLevel {
        self.read_power()
            .map(|p| derive_backpressure(&p))
            .unwrap_or_default()
    }

    fn read_power(&self) -> Option<DevicePowerState> {
        let provider = self.sources.device.as_deref()?;
        match provider.power_state() {
            Ok(state) => state,
            Err(e) => {
                log::debug!("device adapter read failed: {e}");
                None
            }
        }
    }

    /// Re-derive desired task registrations from mode, preferences and
    /// live power state, and correct drift.
    ///
    /// The location task is started and stopped here directly. The
    /// periodic task's registration is recorded in the health status;
    /// its loop lifecycle belongs to the host, which should apply the
    /// summary's start/stop actions.
    pub fn reconcile(&self) -> Result<ReconcileSummary> {
        let now = Utc::now();
        let power = self.read_power();
        let permissions = self.location_task.permissions();
        let mode = lock(&self.store).background_mode()?;

        let mut pending = Vec::new();
        let summary = {
            let mut status = lock(&self.status);
            status.mode = mode;
            status.permissions = Some(permissions);
            if power.is_some() {
                status.power = power;
            }
            let previous_pressure = status.backpressure;
            let summary = reconcile(
                &status,
                &self.config.preferences,
                permissions,
                power.as_ref(),
                now,
            );

            for action in &summary.actions {
                match action {
                    ReconcileAction::StartLocationTask => {
                        match self.location_task.start(
                            mode,
                            &self.config.preferences,
                            self.config.tasks.min_displacement_m,
                        ) {
                            Ok(()) => {
                                status.location_task_registered = true;
                                pending.push(Event::TaskRegistered {
                                    task: TaskKind::BackgroundLocation,
                                    at: now,
                                });
                            }
                            Err(e) => {
                                status.record_failure(e.to_string(), now);
                                pending.push(Event::RegistrationFailed {
                                    task: TaskKind::BackgroundLocation,
                                    error: e.to_string(),
                                    at: now,
                                });
                            }
                        }
                    }
                    ReconcileAction::StopLocationTask => match self.location_task.stop() {
                        Ok(()) => {
                            status.location_task_registered = false;
                            pending.push(Event::TaskUnregistered {
                                task: TaskKind::BackgroundLocation,
                                reason: "reconcile".to_string(),
                                at: now,
                            });
                        }
                        Err(e) => {
                            status.record_failure(e.to_string(), now);
                            log::warn!("location task stop failed: {e}");
                        }
                    },
                    ReconcileAction::StartPeriodicTask => {
                        status.periodic_task_registered = true;
                        pending.push(Event::TaskRegistered {
                            task: TaskKind::PeriodicFetch,
                            at: now,
                        });
                    }
                    ReconcileAction::StopPeriodicTask => {
                        status.periodic_task_registered = false;
                        pending.push(Event::TaskUnregistered {
                            task: TaskKind::PeriodicFetch,
                            reason: "reconcile".to_string(),
                            at: now,
                        });
                    }
                }
            }

            if previous_pressure != summary.backpressure {
                pending.push(Event::BackpressureChanged {
                    from: previous_pressure,
                    to: summary.backpressure,
                    at: now,
                });
            }
            status.backpressure = summary.backpressure;
            status.last_reconcile_at = Some(now);
            status.updated_at = now;
            summary
        };

        lock(&self.store).set_last_reconcile(&summary)?;
        for event in pending {
            self.push_event(event);
        }
        log::debug!("{}", summary.message());
        Ok(summary)
    }

    /// Switch the operating mode and reconcile immediately.
    pub fn set_mode(&self, mode: Mode) -> Result<ReconcileSummary> {
        let previous = {
            let store = lock(&self.store);
            let previous = store.background_mode()?;
            store.set_background_mode(mode)?;
            previous
        };
        if previous != mode {
            self.push_event(Event::ModeChanged {
                from: previous,
                to: mode,
                at: Utc::now(),
            });
        }
        self.reconcile()
    }

    /// Force mode off and tear down every background registration.
    ///
    /// In-flight cycles re-check the mode before persisting, so after
    /// this returns no further snapshot can be committed.
    pub fn emergency_stop(&self, reason: &str) -> Result<()> {
        let now = Utc::now();
        let previous = {
            let store = lock(&self.store);
            let previous = store.background_mode()?;
            store.set_background_mode(Mode::Off)?;
            previous
        };

        let was_location = self.location_task.is_running();
        if let Err(e) = self.location_task.stop() {
            log::warn!("location task teardown failed during emergency stop: {e}");
        }

        let was_periodic = {
            let mut status = lock(&self.status);
            let was_periodic = status.periodic_task_registered;
            status.mode = Mode::Off;
            status.location_task_registered = false;
            status.periodic_task_registered = false;
            status.updated_at = now;
            was_periodic
        };

        if previous != Mode::Off {
            self.push_event(Event::ModeChanged {
                from: previous,
                to: Mode::Off,
                at: now,
            });
        }
        if was_location {
            self.push_event(Event::TaskUnregistered {
                task: TaskKind::BackgroundLocation,
                reason: "emergency stop".to_string(),
                at: now,
            });
        }
        if was_periodic {
            self.push_event(Event::TaskUnregistered {
                task: TaskKind::PeriodicFetch,
                reason: "emergency stop".to_string(),
                at: now,
            });
        }
        self.push_event(Event::EmergencyStopped {
            reason: reason.to_string(),
            at: now,
        });
        log::warn!("emergency stop: {reason}");
        Ok(())
    }

    fn start_location_task(&self, mode: Mode, now: DateTime<Utc>) {
        match self.location_task.start(
            mode,
            &self.config.preferences,
            self.config.tasks.min_displacement_m,
        ) {
            Ok(()) => {
                lock(&self.status).location_task_registered = true;
                self.push_event(Event::TaskRegistered {
                    task: TaskKind::BackgroundLocation,
                    at: now,
                });
            }
            Err(e) => {
                lock(&self.status).record_failure(e.to_string(), now);
                self.push_event(Event::RegistrationFailed {
                    task: TaskKind::BackgroundLocation,
                    error: e.to_string(),
                    at: now,
                });
            }
        }
    }

    // ---- reads and toggles ----

    pub fn current_context(&self) -> Result<Option<ContextSnapshot>> {
        lock(&self.store).current_snapshot()
    }

    pub fn status(&self) -> BackgroundHealthStatus {
        lock(&self.status).clone()
    }

    pub fn recent_events(&self, limit: usize) -> Vec<Event> {
        lock(&self.events).recent(limit)
    }

    pub fn history(&self, limit: u32) -> Result<Vec<HistoryEntry>> {
        lock(&self.store).history_recent(limit)
    }

    pub fn history_summary(&self, since: DateTime<Utc>) -> Result<HistorySummary> {
        lock(&self.store).summarize_history(since)
    }

    pub fn history_count(&self) -> Result<u64> {
        lock(&self.store).history_count()
    }

    pub fn history_oldest(&self) -> Result<Option<DateTime<Utc>>> {
        lock(&self.store).history_oldest()
    }

    pub fn schema_version(&self) -> i32 {
        lock(&self.store).schema_version()
    }

    /// Full diagnostics bundle for the settings screen and support
    /// exports.
    pub fn diagnostics(&self) -> Result<crate::diagnostics::DiagnosticsBundle> {
        crate::diagnostics::collect(self)
    }

    pub fn places(&self) -> Result<Vec<SavedLocation>> {
        lock(&self.store).places()
    }

    pub fn add_place(&self, place: &SavedLocation) -> Result<i64> {
        lock(&self.store).add_place(place)
    }

    pub fn remove_place(&self, kind: PlaceKind, name: Option<&str>) -> Result<bool> {
        lock(&self.store).remove_place(kind, name)
    }

    pub fn mode(&self) -> Result<Mode> {
        lock(&self.store).background_mode()
    }

    pub fn sleep_override(&self) -> Result<bool> {
        lock(&self.store).sleep_override()
    }

    pub fn set_sleep_override(&self, on: bool) -> Result<()> {
        lock(&self.store).set_sleep_override(on)?;
        self.push_event(Event::SleepOverrideChanged {
            enabled: on,
            at: Utc::now(),
        });
        Ok(())
    }

    pub fn sleep_ghost_mode(&self) -> Result<bool> {
        lock(&self.store).sleep_ghost_mode()
    }

    pub fn set_sleep_ghost_mode(&self, on: bool) -> Result<()> {
        lock(&self.store).set_sleep_ghost_mode(on)
    }

    pub fn privacy_mode(&self) -> Result<PrivacyMode> {
        lock(&self.store).privacy_mode(self.config.privacy_mode)
    }

    pub fn set_privacy_mode(&self, mode: PrivacyMode) -> Result<()> {
        lock(&self.store).set_privacy_mode(mode)
    }

    pub fn last_reconcile(&self) -> Result<Option<ReconcileSummary>> {
        lock(&self.store).last_reconcile()
    }

    pub fn location_task_running(&self) -> bool {
        self.location_task.is_running()
    }

    /// Live grant state from the location backend.
    pub fn location_permissions(&self) -> LocationPermissions {
        self.location_task.permissions()
    }

    pub fn register_hook(&self, hook: Arc<dyn PostEvalHook>) -> Result<()> {
        lock(&self.hooks).register(hook)
    }

    fn push_event(&self, event: Event) {
        lock(&self.events).push(event);
    }
}

impl FetchCycle for ContextEngine {
    fn run_cycle(&self, now: DateTime<Utc>) -> Result<FetchOutcome> {
        Ok(self.run_fetch_cycle(now))
    }

    fn backpressure(&self) -> BackpressureLevel {
        self.live_backpressure()
    }
}

impl Inspector for ContextEngine {
    fn run_inspection(&self, now: DateTime<Utc>) -> Result<WatchdogReport> {
        self.run_watchdog_pass(now)
    }
}
