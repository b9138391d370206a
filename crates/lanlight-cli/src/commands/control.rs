//! Power, color, waveform and label commands.

use lanlight_core::{FanOutSummary, Hsbk, MacAddr, Power, SendMode, Waveform, WaveformKind};

use crate::cli::{ColorArgs, LabelArgs, PowerArgs, PowerState, TargetArgs, WaveformArg, WaveformArgs};
use crate::device::discovery::{find_targets, NetworkOptions};
use crate::error::{CliError, Result};
use crate::output::get_formatter;

fn send_mode(rapid: bool) -> SendMode {
    if rapid {
        SendMode::Rapid
    } else {
        SendMode::Acknowledged
    }
}

impl From<WaveformArg> for WaveformKind {
    fn from(arg: WaveformArg) -> Self {
        match arg {
            WaveformArg::Saw => WaveformKind::Saw,
            WaveformArg::Sine => WaveformKind::Sine,
            WaveformArg::HalfSine => WaveformKind::HalfSine,
            WaveformArg::Triangle => WaveformKind::Triangle,
            WaveformArg::Pulse => WaveformKind::Pulse,
        }
    }
}

/// Print a fan-out result and turn failures into an exit status.
///
/// Without `--strict` only a total failure is an error.
fn report(action: &str, summary: &FanOutSummary, json: bool, strict: bool) -> Result<()> {
    let formatter = get_formatter(json);
    println!("{}", formatter.format_fan_out(action, summary));

    let failed = summary.total() - summary.succeeded;
    if failed == 0 {
        return Ok(());
    }
    if strict || summary.succeeded == 0 {
        return Err(CliError::PartialFailure {
            succeeded: summary.succeeded,
            failed,
        });
    }
    Ok(())
}

async fn fan_out<F, Fut>(
    options: &NetworkOptions,
    target: &TargetArgs,
    op: F,
) -> Result<FanOutSummary>
where
    F: FnOnce(lanlight_core::DeviceCollection) -> Fut,
    Fut: std::future::Future<Output = FanOutSummary>,
{
    let (mut discovery, devices) = find_targets(options, target, false).await?;
    let summary = op(devices).await;
    discovery.stop().await;
    Ok(summary)
}

/// Run the power command
pub async fn run_power(args: PowerArgs, options: NetworkOptions, json: bool, strict: bool) -> Result<()> {
    let power = match args.state {
        PowerState::On => Power::On,
        PowerState::Off => Power::Off,
    };
    let mode = send_mode(args.rapid);

    let summary = fan_out(&options, &args.target, |devices| async move {
        match args.duration {
            Some(duration) => devices.set_light_power(power, duration, mode).await,
            None => devices.set_power(power, mode).await,
        }
    })
    .await?;

    report(&format!("power {}", power), &summary, json, strict)
}

/// Run the color command
pub async fn run_color(args: ColorArgs, options: NetworkOptions, json: bool, strict: bool) -> Result<()> {
    let color = Hsbk::new(args.hue, args.saturation, args.brightness, args.kelvin);
    let mode = send_mode(args.rapid);

    let summary = fan_out(&options, &args.target, |devices| async move {
        devices.set_color(color, args.duration, mode).await
    })
    .await?;

    report(&format!("color {}", color), &summary, json, strict)
}

/// Run the waveform command
pub async fn run_waveform(args: WaveformArgs, options: NetworkOptions, json: bool, strict: bool) -> Result<()> {
    if !(args.cycles.is_finite() && args.cycles > 0.0) {
        return Err(CliError::InvalidArgument(
            "--cycles must be a positive number".to_string(),
        ));
    }

    let waveform = Waveform {
        color: Hsbk::new(args.hue, args.saturation, args.brightness, args.kelvin),
        transient: !args.persist,
        period_ms: args.period,
        cycles: args.cycles,
        skew_ratio: args.skew,
        kind: args.kind.into(),
    };
    let mode = send_mode(args.rapid);

    let summary = fan_out(&options, &args.target, |devices| async move {
        devices.set_waveform(waveform, mode).await
    })
    .await?;

    report("waveform", &summary, json, strict)
}

/// Run the label command
pub async fn run_label(args: LabelArgs, options: NetworkOptions, json: bool) -> Result<()> {
    let mac: MacAddr = args.mac.parse()?;
    let target = TargetArgs {
        group: None,
        label: None,
        mac: Some(mac.to_string()),
        discovery_duration: args.discovery_duration,
    };

    let (mut discovery, devices) = find_targets(&options, &target, false).await?;
    let result = match devices.iter().next() {
        Some(device) => device.set_label(&args.label).await,
        None => {
            discovery.stop().await;
            return Err(CliError::NoDevicesFound);
        }
    };
    discovery.stop().await;
    result?;

    let formatter = get_formatter(json);
    println!(
        "{}",
        formatter.format_message(&format!("Renamed {} to '{}'", mac, args.label))
    );
    Ok(())
}
