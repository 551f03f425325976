//! Foreground host for the background loops.
//!
//! Mobile shells hand these loops to the OS task scheduler; on a
//! desktop they run in-process until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use aura_core::tasks::{periodic_fetch_loop, FetchCycle, PeriodicFetchConfig};
use aura_core::watchdog::{watchdog_loop, Inspector};

use super::open_engine;

pub fn run(interval_secs: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Arc::new(open_engine()?);

    let summary = engine.reconcile()?;
    println!("{}", summary.message());

    let mut fetch_config = PeriodicFetchConfig::from_tasks(&engine.config().tasks);
    if let Some(secs) = interval_secs {
        fetch_config =
            PeriodicFetchConfig::new(Duration::from_secs(secs), fetch_config.cycle_budget);
    }
    let watchdog_interval = Duration::from_secs(engine.config().tasks.watchdog_interval_secs);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let cancel = CancellationToken::new();
        let fetch = tokio::spawn(periodic_fetch_loop(
            Arc::clone(&engine) as Arc<dyn FetchCycle>,
            fetch_config,
            cancel.clone(),
        ));
        let watchdog = tokio::spawn(watchdog_loop(
            Arc::clone(&engine) as Arc<dyn Inspector>,
            watchdog_interval,
            fetch_config.cycle_budget,
            cancel.clone(),
        ));

        tokio::signal::ctrl_c().await?;
        println!("shutting down");
        cancel.cancel();
        let _ = fetch.await;
        let _ = watchdog.await;
        Ok::<(), std::io::Error>(())
    })?;

    Ok(())
}
