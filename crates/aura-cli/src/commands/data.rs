//! Stored data management commands.

use clap::Subcommand;

use aura_core::{ContextStore, DataResetOptions, EngineConfig, PrivacyMode};

#[derive(Subcommand)]
pub enum DataAction {
    /// Delete stored data domains
    Reset {
        /// Delete every history row
        #[arg(long)]
        history: bool,
        /// Delete every saved place
        #[arg(long)]
        places: bool,
        /// Clear runtime engine state (current slot, mode, sleep flags)
        #[arg(long)]
        state: bool,
        /// Delete everything
        #[arg(long)]
        all: bool,
    },
    /// Show or change the runtime privacy mode
    Privacy {
        /// New mode: full or minimal; omit to print the current one
        value: Option<String>,
    },
}

pub fn run(action: DataAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = ContextStore::open()?;

    match action {
        DataAction::Reset {
            history,
            places,
            state,
            all,
        } => {
            let options = if all {
                DataResetOptions::everything()
            } else {
                DataResetOptions {
                    history,
                    places,
                    engine_state: state,
                }
            };
            if !options.history && !options.places && !options.engine_state {
                eprintln!("nothing selected; pass --history, --places, --state or --all");
                std::process::exit(1);
            }
            let summary = store.reset_selected_data(options)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        DataAction::Privacy { value } => match value {
            None => {
                let default = EngineConfig::load_or_default().privacy_mode;
                println!("{}", store.privacy_mode(default)?.as_str());
            }
            Some(value) => {
                let mode = match PrivacyMode::parse(&value) {
                    Some(mode) => mode,
                    None => {
                        eprintln!("unknown privacy mode: {value} (expected full or minimal)");
                        std::process::exit(1);
                    }
                };
                store.set_privacy_mode(mode)?;
                println!("privacy mode {}", mode.as_str());
            }
        },
    }
    Ok(())
}
