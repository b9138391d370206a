//! Info command implementation.

use tokio::join;
use tracing::warn;

use lanlight_core::DeviceSession;

use crate::cli::InfoArgs;
use crate::device::discovery::{find_targets, NetworkOptions};
use crate::error::CliError;
use crate::output::{get_formatter, DeviceReport};

/// Run the info command
pub async fn run_info(args: InfoArgs, options: NetworkOptions, json: bool, strict: bool) -> Result<(), CliError> {
    let formatter = get_formatter(json);
    let (mut discovery, devices) = find_targets(&options, &args.target, true).await?;

    let mut reports = Vec::new();
    let mut failed = 0;
    for device in devices.iter() {
        match build_report(device, args.extended).await {
            Ok(report) => reports.push(report),
            Err(e) => {
                warn!(device = %device, error = %e, "Failed to query device");
                eprintln!("{}", formatter.format_error(&format!("{}: {}", device, e)));
                failed += 1;
            }
        }
    }
    discovery.stop().await;

    println!("{}", formatter.format_reports(&reports));

    if strict && failed > 0 {
        return Err(CliError::PartialFailure {
            succeeded: reports.len(),
            failed,
        });
    }
    Ok(())
}

/// Refresh live state and render everything known about one device.
async fn build_report(device: &DeviceSession, extended: bool) -> Result<DeviceReport, CliError> {
    device.get_color().await?;

    let (host, wifi) = if extended {
        let (host, wifi) = join!(device.get_host_info(), device.get_wifi_info());
        (Some(host?), Some(wifi?))
    } else {
        (None, None)
    };

    let details = format!(
        "{}  {}  {}",
        device.characteristics_str("  "),
        device.firmware_str("  "),
        device.product_str("  ")
    );

    Ok(DeviceReport {
        summary: device.summary(),
        details,
        host,
        wifi,
    })
}
