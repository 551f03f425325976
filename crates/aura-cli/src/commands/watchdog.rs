//! Watchdog inspection command.

use chrono::Utc;
use clap::Subcommand;

use super::open_engine;

#[derive(Subcommand)]
pub enum WatchdogAction {
    /// Run one inspection pass and apply any repairs
    Run,
}

pub fn run(action: WatchdogAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        WatchdogAction::Run => {
            let engine = open_engine()?;
            let report = engine.run_watchdog_pass(Utc::now())?;
            println!("{}", report.message());
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
