//! Saved place management commands.

use clap::Subcommand;

use aura_core::{ContextStore, PlaceKind, SavedLocation};

#[derive(Subcommand)]
pub enum PlaceAction {
    /// Save a place
    Add {
        /// Place kind: home, work, gym or other
        kind: String,
        /// Latitude in degrees
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        /// Longitude in degrees
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
        /// Display name (required for "other")
        #[arg(long)]
        name: Option<String>,
    },
    /// List saved places
    List,
    /// Remove a saved place
    Remove {
        /// Place kind: home, work, gym or other
        kind: String,
        /// Display name to disambiguate "other" places
        #[arg(long)]
        name: Option<String>,
    },
}

pub fn run(action: PlaceAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = ContextStore::open()?;

    match action {
        PlaceAction::Add {
            kind,
            latitude,
            longitude,
            name,
        } => {
            let kind = parse_kind(&kind);
            if kind == PlaceKind::Other && name.is_none() {
                eprintln!("places of kind \"other\" need --name");
                std::process::exit(1);
            }
            let mut place = SavedLocation::new(kind, latitude, longitude)?;
            if let Some(name) = name {
                place = place.with_display_name(name);
            }
            store.add_place(&place)?;
            println!("Place saved: {}", place.display());
            println!("{}", serde_json::to_string_pretty(&place)?);
        }
        PlaceAction::List => {
            let places = store.places()?;
            println!("{}", serde_json::to_string_pretty(&places)?);
        }
        PlaceAction::Remove { kind, name } => {
            let kind = parse_kind(&kind);
            if store.remove_place(kind, name.as_deref())? {
                println!("Place removed: {}", kind.name());
            } else {
                println!("No matching place.");
            }
        }
    }
    Ok(())
}

fn parse_kind(s: &str) -> PlaceKind {
    match PlaceKind::parse(s) {
        Some(kind) => kind,
        None => {
            eprintln!("unknown place kind: {s} (expected home, work, gym or other)");
            std::process::exit(1);
        }
    }
}
