//! Self-healing liveness check.
//!
//! Background execution guarantees on mobile OSes are unreliable. This
//! module re-asserts liveness opportunistically: inspections fire from
//! a fixed interval timer and from app-foreground transitions, and each
//! one decides which repairs the engine must run. Triggers inside the
//! debounce window are skipped, never queued.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::context::ContextSnapshot;
use crate::storage::{EvaluationConfig, PreferencesConfig, TasksConfig};
use crate::Result;

/// What one inspection decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogAction {
    /// The trigger landed inside the debounce window.
    Debounced,
    /// Context sensing is switched off; nothing was inspected.
    Disabled,
    /// Snapshot fresh, registrations intact.
    Healthy,
    /// The current snapshot is missing or stale; run an out-of-band
    /// evaluation.
    ForceEvaluation,
    /// The OS silently dropped the location registration; re-register.
    RestartLocationTask,
}

impl WatchdogAction {
    pub fn as_str(self) -> &'static str {
        match self {
            WatchdogAction::Debounced => "debounced",
            WatchdogAction::Disabled => "disabled",
            WatchdogAction::Healthy => "healthy",
            WatchdogAction::ForceEvaluation => "force_evaluation",
            WatchdogAction::RestartLocationTask => "restart_location_task",
        }
    }
}

/// Outcome of one inspection. Repairs are ordered: a forced evaluation
/// always precedes a registration restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogReport {
    pub actions: Vec<WatchdogAction>,
    pub inspected_at: DateTime<Utc>,
}

impl WatchdogReport {
    fn single(action: WatchdogAction, at: DateTime<Utc>) -> Self {
        Self {
            actions: vec![action],
            inspected_at: at,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.actions == [WatchdogAction::Healthy]
    }

    pub fn needs_evaluation(&self) -> bool {
        self.actions.contains(&WatchdogAction::ForceEvaluation)
    }

    pub fn needs_restart(&self) -> bool {
        self.actions.contains(&WatchdogAction::RestartLocationTask)
    }

    /// One-line summary for logs and diagnostics.
    pub fn message(&self) -> String {
        let names: Vec<&str> = self.actions.iter().map(|a| a.as_str()).collect();
        format!("watchdog: {}", names.join(", "))
    }
}

/// Decides which repairs are due. Holds only debounce state; the
/// engine owns the repairs themselves.
#[derive(Debug)]
pub struct Watchdog {
    debounce: ChronoDuration,
    staleness: ChronoDuration,
    last_inspection_at: Option<DateTime<Utc>>,
}

impl Watchdog {
    pub fn new(debounce: ChronoDuration, staleness: ChronoDuration) -> Self {
        Self {
            debounce,
            staleness,
            last_inspection_at: None,
        }
    }

    pub fn from_config(tasks: &TasksConfig, evaluation: &EvaluationConfig) -> Self {
        Self::new(
            ChronoDuration::seconds(tasks.watchdog_debounce_secs as i64),
            evaluation.staleness_threshold(),
        )
    }

    /// Run one inspection.
    ///
    /// `location_registered` is the live answer from the OS facility,
    /// not a cached flag. Disabled triggers return without consuming
    /// the debounce window, so re-enabling takes effect immediately.
    pub fn inspect(
        &mut self,
        prefs: &PreferencesConfig,
        snapshot: Option<&ContextSnapshot>,
        location_registered: bool,
        now: DateTime<Utc>,
    ) -> WatchdogReport {
        if let Some(last) = self.last_inspection_at {
            if now.signed_duration_since(last) < self.debounce {
                return WatchdogReport::single(WatchdogAction::Debounced, now);
            }
        }
        if !prefs.context_sensing {
            return WatchdogReport::single(WatchdogAction::Disabled, now);
        }
        self.last_inspection_at = Some(now);

        let mut actions = Vec::new();
        let stale = match snapshot {
            None => true,
            Some(current) => current.is_stale(now, self.staleness),
        };
        if stale {
            actions.push(WatchdogAction::ForceEvaluation);
        }
        if prefs.background_location && !location_registered {
            actions.push(WatchdogAction::RestartLocationTask);
        }
        if actions.is_empty() {
            actions.push(WatchdogAction::Healthy);
        }
        WatchdogReport {
            actions,
            inspected_at: now,
        }
    }
}

/// One timer-driven inspection pass, including its repairs.
pub trait Inspector: Send + Sync {
    fn run_inspection(&self, now: DateTime<Utc>) -> Result<WatchdogReport>;
}

/// Drive interval-triggered inspections until `cancel` fires.
///
/// Foreground-triggered inspections call the inspector directly; this
/// loop only covers the timer leg. Failed passes are logged and the
/// next tick retries.
pub async fn watchdog_loop(
    inspector: Arc<dyn Inspector>,
    interval: Duration,
    budget: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Utc::now();
                let worker = Arc::clone(&inspector);
                let handle = tokio::task::spawn_blocking(move || worker.run_inspection(now));
                match tokio::time::timeout(budget, handle).await {
                    Ok(Ok(Ok(report))) => {
                        if !report.is_healthy() {
                            log::info!("{}", report.message());
                        }
                    }
                    Ok(Ok(Err(err))) => log::warn!("watchdog pass failed: {err}"),
                    Ok(Err(join_err)) => log::warn!("watchdog worker died: {join_err}"),
                    Err(_) => log::warn!(
                        "watchdog pass abandoned after {} ms",
                        budget.as_millis()
                    ),
                }
            }
            _ = cancel.cancelled() => {
                log::info!("watchdog loop shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn watchdog() -> Watchdog {
        Watchdog::new(ChronoDuration::seconds(30), ChronoDuration::seconds(480))
    }

    fn fresh_snapshot(now: DateTime<Utc>) -> ContextSnapshot {
        let mut snap = ContextSnapshot::initial(now - ChronoDuration::seconds(60));
        snap.sequence = 3;
        snap
    }

    #[test]
    fn healthy_when_fresh_and_registered() {
        let mut dog = watchdog();
        let now = Utc::now();
        let snap = fresh_snapshot(now);
        let report = dog.inspect(&PreferencesConfig::default(), Some(&snap), true, now);
        assert!(report.is_healthy());
        assert_eq!(report.inspected_at, now);
    }

    #[test]
    fn back_to_back_triggers_are_debounced() {
        let mut dog = watchdog();
        let now = Utc::now();
        let snap = fresh_snapshot(now);
        let prefs = PreferencesConfig::default();

        let first = dog.inspect(&prefs, Some(&snap), true, now);
        assert!(first.is_healthy());

        let again = dog.inspect(&prefs, Some(&snap), true, now + ChronoDuration::seconds(10));
        assert_eq!(again.actions, vec![WatchdogAction::Debounced]);

        let later = dog.inspect(&prefs, Some(&snap), true, now + ChronoDuration::seconds(31));
        assert!(later.is_healthy());
    }

    #[test]
    fn disabled_preference_skips_and_keeps_debounce_free() {
        let mut dog = watchdog();
        let now = Utc::now();
        let snap = fresh_snapshot(now);
        let off = PreferencesConfig {
            context_sensing: false,
            ..Default::default()
        };

        let report = dog.inspect(&off, Some(&snap), true, now);
        assert_eq!(report.actions, vec![WatchdogAction::Disabled]);

        // Re-enabling takes effect on the very next trigger.
        let report = dog.inspect(&PreferencesConfig::default(), Some(&snap), true, now);
        assert!(report.is_healthy());
    }

    #[test]
    fn missing_snapshot_forces_evaluation() {
        let mut dog = watchdog();
        let report = dog.inspect(&PreferencesConfig::default(), None, true, Utc::now());
        assert_eq!(report.actions, vec![WatchdogAction::ForceEvaluation]);
    }

    #[test]
    fn stale_snapshot_forces_evaluation() {
        let mut dog = watchdog();
        let now = Utc::now();
        let snap = ContextSnapshot::initial(now - ChronoDuration::seconds(481));
        let report = dog.inspect(&PreferencesConfig::default(), Some(&snap), true, now);
        assert_eq!(report.actions, vec![WatchdogAction::ForceEvaluation]);
    }

    #[test]
    fn snapshot_at_threshold_is_still_fresh() {
        let mut dog = watchdog();
        let now = Utc::now();
        let snap = ContextSnapshot::initial(now - ChronoDuration::seconds(480));
        let report = dog.inspect(&PreferencesConfig::default(), Some(&snap), true, now);
        assert!(report.is_healthy());
    }

    #[test]
    fn dropped_registration_restarts_location_task() {
        let mut dog = watchdog();
        let now = Utc::now();
        let snap = fresh_snapshot(now);
        let report = dog.inspect(&PreferencesConfig::default(), Some(&snap), false, now);
        assert_eq!(report.actions, vec![WatchdogAction::RestartLocationTask]);
        assert!(report.needs_restart());
        assert!(!report.needs_evaluation());
    }

    #[test]
    fn stale_and_dropped_reports_both_repairs_in_order() {
        let mut dog = watchdog();
        let now = Utc::now();
        let report = dog.inspect(&PreferencesConfig::default(), None, false, now);
        assert_eq!(
            report.actions,
            vec![
                WatchdogAction::ForceEvaluation,
                WatchdogAction::RestartLocationTask
            ]
        );
    }

    #[test]
    fn no_restart_when_location_preference_off() {
        let mut dog = watchdog();
        let now = Utc::now();
        let snap = fresh_snapshot(now);
        let prefs = PreferencesConfig {
            background_location: false,
            ..Default::default()
        };
        let report = dog.inspect(&prefs, Some(&snap), false, now);
        assert!(report.is_healthy());
    }

    struct CountingInspector {
        runs: AtomicUsize,
    }

    impl Inspector for CountingInspector {
        fn run_inspection(&self, now: DateTime<Utc>) -> Result<WatchdogReport> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(WatchdogReport::single(WatchdogAction::Healthy, now))
        }
    }

    #[tokio::test]
    async fn loop_runs_inspections_until_cancelled() {
        let inspector = Arc::new(CountingInspector {
            runs: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watchdog_loop(
            Arc::clone(&inspector) as Arc<dyn Inspector>,
            Duration::from_millis(20),
            Duration::from_millis(500),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(110)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop must exit on cancel")
            .unwrap();

        assert!(inspector.runs.load(Ordering::SeqCst) >= 2);
    }
}
