//! Output formatting for CLI results.

pub mod json;
pub mod table;

pub use json::JsonOutput;
pub use table::TableOutput;

use lanlight_core::device::{HostInfo, WifiInfo};
use lanlight_core::{DeviceSummary, FanOutSummary};

/// Everything `info` learned about one device.
#[derive(Debug, Clone)]
pub struct DeviceReport {
    pub summary: DeviceSummary,
    /// Pre-rendered characteristics, firmware and product block.
    pub details: String,
    pub host: Option<HostInfo>,
    pub wifi: Option<WifiInfo>,
}

/// Output formatter trait
pub trait OutputFormatter {
    /// Format device list
    fn format_devices(&self, devices: &[DeviceSummary]) -> String;

    /// Format detailed reports for one or more devices
    fn format_reports(&self, reports: &[DeviceReport]) -> String;

    /// Format the outcome of a command sent to several devices
    fn format_fan_out(&self, action: &str, summary: &FanOutSummary) -> String;

    /// Format a generic message
    fn format_message(&self, message: &str) -> String;

    /// Format an error
    fn format_error(&self, error: &str) -> String;
}

/// Get the appropriate formatter based on JSON flag
pub fn get_formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonOutput::new())
    } else {
        Box::new(TableOutput::new())
    }
}
