//! Discover command implementation.

use std::io::{self, Write};
use std::time::Duration;

use colored::*;

use crate::cli::DiscoverArgs;
use crate::device::discovery::{start_discovery, NetworkOptions};
use crate::error::CliError;
use crate::output::{get_formatter, OutputFormatter};

/// Run the discover command
pub async fn run_discover(args: DiscoverArgs, options: NetworkOptions, json: bool) -> Result<(), CliError> {
    let formatter = get_formatter(json);

    if args.watch {
        run_watch_mode(options, formatter.as_ref(), json).await
    } else {
        run_oneshot_mode(options, Duration::from_secs(args.duration), formatter.as_ref(), json).await
    }
}

async fn run_oneshot_mode(
    options: NetworkOptions,
    duration: Duration,
    formatter: &dyn OutputFormatter,
    json: bool,
) -> Result<(), CliError> {
    if !json {
        println!("Discovering devices for {} seconds...", duration.as_secs());
    }

    let mut discovery = start_discovery(&options, duration).await?;
    let devices = discovery.devices();
    devices.refresh_metadata().await;
    let summaries = devices.summaries();
    discovery.stop().await;

    println!("{}", formatter.format_devices(&summaries));

    if summaries.is_empty() {
        return Err(CliError::NoDevicesFound);
    }

    Ok(())
}

async fn run_watch_mode(
    options: NetworkOptions,
    formatter: &dyn OutputFormatter,
    json: bool,
) -> Result<(), CliError> {
    if !json {
        println!("Watching for devices (press Ctrl+C to stop)...\n");
    }

    let mut discovery = start_discovery(&options, Duration::ZERO).await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = discovery.changed() => {
                if !changed {
                    break;
                }
                let devices = discovery.devices();
                devices.refresh_metadata().await;

                if !json {
                    // Clear screen and print header
                    print!("\x1B[2J\x1B[1;1H");
                    println!("{}", "lanlight device watch".bold());
                    println!("{}", "Press Ctrl+C to stop".dimmed());
                    println!();
                }
                println!("{}", formatter.format_devices(&devices.summaries()));
                io::stdout().flush().ok();
            }
        }
    }

    discovery.stop().await;
    Ok(())
}
