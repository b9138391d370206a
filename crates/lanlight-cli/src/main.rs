//! lanlight - command-line client for LAN lighting devices.
//!
//! Discovers devices on the local network and drives them over the UDP
//! LAN protocol, enabling automation via scripts and headless operation.

mod cli;
mod commands;
mod device;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use device::discovery::NetworkOptions;
use error::{exit_codes, CliError};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(cli).await;

    match result {
        Ok(()) => std::process::exit(exit_codes::SUCCESS),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

/// Log to stderr so JSON on stdout stays parseable. `RUST_LOG` overrides `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "lanlight=debug,lanlight_core=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let options = NetworkOptions::from_cli(&cli)?;

    match cli.command {
        Commands::Discover(args) => {
            commands::run_discover(args, options, cli.json).await
        }
        Commands::Info(args) => {
            commands::run_info(args, options, cli.json, cli.strict).await
        }
        Commands::Power(args) => {
            commands::run_power(args, options, cli.json, cli.strict).await
        }
        Commands::Color(args) => {
            commands::run_color(args, options, cli.json, cli.strict).await
        }
        Commands::Waveform(args) => {
            commands::run_waveform(args, options, cli.json, cli.strict).await
        }
        Commands::Label(args) => {
            commands::run_label(args, options, cli.json).await
        }
    }
}
