use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "aura-cli", version, about = "Aura context engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Current context and evaluation history
    Context {
        #[command(subcommand)]
        action: commands::context::ContextAction,
    },
    /// Saved place management
    Place {
        #[command(subcommand)]
        action: commands::place::PlaceAction,
    },
    /// Background engine health and mode control
    Health {
        #[command(subcommand)]
        action: commands::health::HealthAction,
    },
    /// Watchdog inspection
    Watchdog {
        #[command(subcommand)]
        action: commands::watchdog::WatchdogAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Stored data management
    Data {
        #[command(subcommand)]
        action: commands::data::DataAction,
    },
    /// Diagnostics export for bug reports
    Diagnostics {
        #[command(subcommand)]
        action: commands::diagnostics::DiagnosticsAction,
    },
    /// Host the background loops in the foreground until Ctrl-C
    Run {
        /// Override the fetch interval in seconds
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Context { action } => commands::context::run(action),
        Commands::Place { action } => commands::place::run(action),
        Commands::Health { action } => commands::health::run(action),
        Commands::Watchdog { action } => commands::watchdog::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Data { action } => commands::data::run(action),
        Commands::Diagnostics { action } => commands::diagnostics::run(action),
        Commands::Run { interval_secs } => commands::run::run(interval_secs),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
