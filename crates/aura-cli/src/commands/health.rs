//! Background engine health and mode control commands.

use clap::Subcommand;

use aura_core::Mode;

use super::open_engine;

#[derive(Subcommand)]
pub enum HealthAction {
    /// Show the health record and last reconcile result
    Status,
    /// Show or change the operating mode
    Mode {
        /// New mode: off, light or full; omit to print the current one
        value: Option<String>,
    },
    /// Show the live backpressure level
    Backpressure,
    /// Re-derive desired task registrations and correct drift
    Reconcile,
    /// Halt all background work and force mode off
    EmergencyStop {
        /// Reason recorded in the event log
        #[arg(long, default_value = "cli")]
        reason: String,
    },
}

pub fn run(action: HealthAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;

    match action {
        HealthAction::Status => {
            println!("{}", serde_json::to_string_pretty(&engine.status())?);
            if let Some(summary) = engine.last_reconcile()? {
                println!("{}", summary.message());
            }
        }
        HealthAction::Mode { value } => match value {
            None => println!("{}", engine.mode()?.as_str()),
            Some(value) => {
                let mode = match Mode::parse(&value) {
                    Some(mode) => mode,
                    None => {
                        eprintln!("unknown mode: {value} (expected off, light or full)");
                        std::process::exit(1);
                    }
                };
                let summary = engine.set_mode(mode)?;
                println!("{}", summary.message());
            }
        },
        HealthAction::Backpressure => {
            println!("{}", engine.live_backpressure().as_str());
        }
        HealthAction::Reconcile => {
            let summary = engine.reconcile()?;
            println!("{}", summary.message());
        }
        HealthAction::EmergencyStop { reason } => {
            engine.emergency_stop(&reason)?;
            println!("Background work stopped; mode is off.");
        }
    }
    Ok(())
}
