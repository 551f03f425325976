//! Periodic fetch driver.
//!
//! The OS periodic-wake facility invokes one evaluation cycle per wake
//! and consumes a tri-state [`FetchOutcome`] to tune future scheduling.
//! [`periodic_fetch_loop`] is the host-side driver for that contract:
//! it ticks on a fixed cadence, re-reads backpressure before every
//! cycle, and bounds each cycle with a time budget. A cycle that
//! overruns the budget is abandoned and logged; the next tick is the
//! retry mechanism.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::health::BackpressureLevel;
use crate::storage::TasksConfig;
use crate::Result;

/// Smallest schedulable tick. A zero interval is not schedulable.
const MIN_TICK_MS: u64 = 10;

/// Result of one fetch cycle, reported back to the OS scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    /// The evaluation produced a snapshot that differs from the
    /// previous one.
    NewData,
    /// The evaluation completed but nothing changed.
    NoData,
    /// The cycle could not complete.
    Failed,
}

impl FetchOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchOutcome::NewData => "new_data",
            FetchOutcome::NoData => "no_data",
            FetchOutcome::Failed => "failed",
        }
    }
}

/// One evaluation cycle, run on every wake.
///
/// `run_cycle` is synchronous; the loop moves it onto a blocking
/// worker. An error is terminal for that cycle only.
pub trait FetchCycle: Send + Sync {
    fn run_cycle(&self, now: DateTime<Utc>) -> Result<FetchOutcome>;

    /// Live backpressure level. Consulted immediately before each
    /// cycle, never cached across ticks.
    fn backpressure(&self) -> BackpressureLevel;
}

/// Timing knobs for [`periodic_fetch_loop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicFetchConfig {
    pub interval: Duration,
    pub cycle_budget: Duration,
}

impl PeriodicFetchConfig {
    pub fn new(interval: Duration, cycle_budget: Duration) -> Self {
        let floor = Duration::from_millis(MIN_TICK_MS);
        Self {
            interval: interval.max(floor),
            cycle_budget: cycle_budget.max(floor),
        }
    }

    pub fn from_tasks(tasks: &TasksConfig) -> Self {
        Self::new(
            Duration::from_secs(tasks.periodic_fetch_interval_secs),
            Duration::from_millis(tasks.cycle_budget_ms),
        )
    }
}

impl Default for PeriodicFetchConfig {
    fn default() -> Self {
        Self::from_tasks(&TasksConfig::default())
    }
}

/// Drive fetch cycles until `cancel` fires.
///
/// Severe backpressure skips the tick outright; lighter levels insert
/// their recommended delay before the cycle runs. Cycle failures and
/// overruns are logged and the loop keeps ticking.
pub async fn periodic_fetch_loop(
    cycle: Arc<dyn FetchCycle>,
    config: PeriodicFetchConfig,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let pressure = cycle.backpressure();
                if pressure.skip_nonessential() {
                    log::debug!(
                        "periodic fetch skipped under {} backpressure",
                        pressure.as_str()
                    );
                    continue;
                }
                let delay_ms = pressure.recommended_delay_ms();
                if delay_ms > 0 {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                        _ = cancel.cancelled() => break,
                    }
                }
                run_one(&cycle, config.cycle_budget).await;
            }
            _ = cancel.cancelled() => {
                log::info!("periodic fetch loop shutting down");
                break;
            }
        }
    }
}

async fn run_one(cycle: &Arc<dyn FetchCycle>, budget: Duration) {
    let now = Utc::now();
    let worker = Arc::clone(cycle);
    let handle = tokio::task::spawn_blocking(move || worker.run_cycle(now));
    match tokio::time::timeout(budget, handle).await {
        Ok(Ok(Ok(outcome))) => {
            log::debug!("periodic fetch cycle finished: {}", outcome.as_str());
        }
        Ok(Ok(Err(err))) => {
            log::warn!("periodic fetch cycle failed: {err}");
        }
        Ok(Err(join_err)) => {
            log::warn!("periodic fetch worker died: {join_err}");
        }
        Err(_) => {
            let err = CoreError::CycleTimeout {
                budget_ms: budget.as_millis() as u64,
            };
            log::warn!("periodic fetch cycle abandoned: {err}");
        }
    }
}
