//! Context inspection and refresh commands.

use chrono::{Duration, Utc};
use clap::Subcommand;

use super::open_engine;

#[derive(Subcommand)]
pub enum ContextAction {
    /// Show the current context snapshot
    Status,
    /// Run a foreground evaluation now
    Refresh,
    /// Show recent history entries, newest first
    History {
        /// Maximum entries to print
        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Aggregate history over a recent window
    Summary {
        /// Window length in days
        #[arg(long, default_value = "7")]
        days: u32,
    },
    /// Toggle the manual sleep override
    Sleep {
        /// "on" or "off"
        state: String,
    },
    /// Toggle sleep ghost mode (slot updates without history rows)
    Ghost {
        /// "on" or "off"
        state: String,
    },
}

pub fn run(action: ContextAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;

    match action {
        ContextAction::Status => match engine.current_context()? {
            Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
            None => println!("No context evaluated yet."),
        },
        ContextAction::Refresh => match engine.request_refresh()? {
            Some(outcome) => {
                println!("{}", serde_json::to_string_pretty(&outcome.snapshot)?);
                if !outcome.committed {
                    println!("Result was not persisted (evaluation discarded).");
                }
            }
            None => println!("Refresh throttled under severe backpressure."),
        },
        ContextAction::History { limit } => {
            let entries = engine.history(limit)?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        ContextAction::Summary { days } => {
            let since = Utc::now() - Duration::days(i64::from(days));
            let summary = engine.history_summary(since)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        ContextAction::Sleep { state } => {
            let on = parse_switch(&state);
            engine.set_sleep_override(on)?;
            println!("sleep override {}", if on { "on" } else { "off" });
        }
        ContextAction::Ghost { state } => {
            let on = parse_switch(&state);
            engine.set_sleep_ghost_mode(on)?;
            println!("sleep ghost mode {}", if on { "on" } else { "off" });
        }
    }
    Ok(())
}

fn parse_switch(s: &str) -> bool {
    match s {
        "on" => true,
        "off" => false,
        other => {
            eprintln!("expected \"on\" or \"off\", got: {other}");
            std::process::exit(1);
        }
    }
}
