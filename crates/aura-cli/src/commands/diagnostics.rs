//! Diagnostics export command for bug reports.

use std::path::PathBuf;

use clap::Subcommand;

use aura_core::storage::data_dir;

use super::open_engine;

#[derive(Subcommand)]
pub enum DiagnosticsAction {
    /// Export a diagnostics bundle for bug reports
    Export {
        /// Output file path (default: ~/.config/aura/diagnostics.json)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the bundle to stdout
    Show,
}

pub fn run(action: DiagnosticsAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let bundle = engine.diagnostics()?;

    match action {
        DiagnosticsAction::Export { output } => {
            let path = match output {
                Some(path) => path,
                None => data_dir()?.join("diagnostics.json"),
            };
            bundle.save_to_file(&path)?;
            println!("Diagnostics bundle written to {}", path.display());
        }
        DiagnosticsAction::Show => {
            println!("{}", bundle.to_json()?);
        }
    }
    Ok(())
}
