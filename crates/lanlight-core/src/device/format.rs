//! Multi-line human-readable device descriptions.
//!
//! The first line of each block carries no indent; following lines are
//! prefixed with `indent` so blocks can be nested under a heading.

use std::fmt::{Display, Write};

use super::attributes::{nanos_to_datetime, FirmwareInfo, HostInfo, WifiInfo};
use super::session::DeviceSession;

const NANOS_PER_HOUR: f64 = 3_600_000_000_000.0;

fn or_none<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| "None".to_string(), |v| v.to_string())
}

fn utc(nanos: u64) -> String {
    or_none(nanos_to_datetime(nanos).map(|t| t.format("%Y-%m-%d %H:%M:%S")))
}

fn hours(nanos: u64) -> f64 {
    (nanos as f64 / NANOS_PER_HOUR * 100.0).round() / 100.0
}

impl DeviceSession {
    /// Label, addressing, power, location and group.
    pub fn characteristics_str(&self, indent: &str) -> String {
        let state = self.snapshot();
        let power = state
            .power
            .map_or_else(|| "Unknown".to_string(), |p| p.to_string());

        let mut s = String::new();
        let _ = writeln!(s, "{}", or_none(state.label));
        let _ = writeln!(s, "{indent}MAC Address: {}", self.mac());
        let _ = writeln!(s, "{indent}IP Address: {}", state.addr.ip());
        let _ = writeln!(s, "{indent}Port: {}", state.addr.port());
        let _ = writeln!(s, "{indent}Power: {}", power);
        let _ = writeln!(s, "{indent}Location: {}", or_none(state.location));
        let _ = writeln!(s, "{indent}Group: {}", or_none(state.group));
        s
    }

    /// Host and wifi firmware versions with build timestamps.
    pub fn firmware_str(&self, indent: &str) -> String {
        let state = self.snapshot();
        let build = |fw: Option<FirmwareInfo>| match fw {
            Some(fw) => format!("{} ({} UTC)", fw.build, utc(fw.build)),
            None => "None (None UTC)".to_string(),
        };

        let mut s = String::new();
        let _ = writeln!(s, "Host Firmware Build Timestamp: {}", build(state.host_firmware));
        let _ = writeln!(s, "{indent}Host Firmware Build Version: {}", or_none(state.host_firmware));
        let _ = writeln!(s, "{indent}Wifi Firmware Build Timestamp: {}", build(state.wifi_firmware));
        let _ = writeln!(s, "{indent}Wifi Firmware Build Version: {}", or_none(state.wifi_firmware));
        s
    }

    /// Raw vendor, product and hardware version ids.
    pub fn product_str(&self, indent: &str) -> String {
        let product = self.snapshot().product;

        let mut s = String::new();
        let _ = writeln!(s, "Vendor: {}", or_none(product.map(|p| p.vendor)));
        let _ = writeln!(
            s,
            "{indent}Product: {}",
            product.map_or_else(|| "Unknown".to_string(), |p| p.product.to_string())
        );
        let _ = writeln!(s, "{indent}Version: {}", or_none(product.map(|p| p.version)));
        s
    }
}

/// Device clock, uptime and last downtime.
pub fn time_str(info: &HostInfo, indent: &str) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "Current Time: {} ({} UTC)", info.time, utc(info.time));
    let _ = writeln!(s, "{indent}Uptime (ns): {} ({} hours)", info.uptime, hours(info.uptime));
    let _ = writeln!(
        s,
        "{indent}Last Downtime Duration +/-5s (ns): {} ({} hours)",
        info.downtime,
        hours(info.downtime)
    );
    s
}

/// Wifi signal and traffic counters.
pub fn radio_str(info: &WifiInfo, indent: &str) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "Wifi Signal Strength (mW): {}", info.signal);
    let _ = writeln!(s, "{indent}Wifi TX (bytes): {}", info.tx);
    let _ = writeln!(s, "{indent}Wifi RX (bytes): {}", info.rx);
    s
}
