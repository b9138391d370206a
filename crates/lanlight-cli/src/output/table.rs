//! Table-formatted output for CLI.

use colored::*;
use comfy_table::{Cell, Color, ContentArrangement, Table};

use lanlight_core::device::{radio_str, time_str};
use lanlight_core::{DeviceSummary, FanOutSummary, MemberStatus, Power};

use super::{DeviceReport, OutputFormatter};

pub struct TableOutput;

impl TableOutput {
    pub fn new() -> Self {
        Self
    }

    fn power_cell(power: Option<Power>) -> Cell {
        match power {
            Some(Power::On) => Cell::new("On").fg(Color::Green),
            Some(Power::Off) => Cell::new("Off").fg(Color::DarkGrey),
            Some(level) => Cell::new(level.to_string()).fg(Color::Yellow),
            None => Cell::new("-"),
        }
    }

    fn status_cell(status: MemberStatus) -> Cell {
        match status {
            MemberStatus::Ok => Cell::new("OK").fg(Color::Green),
            MemberStatus::Unreachable => Cell::new("UNREACHABLE").fg(Color::Yellow),
            MemberStatus::Failed => Cell::new("FAIL").fg(Color::Red),
        }
    }
}

impl Default for TableOutput {
    fn default() -> Self {
        Self::new()
    }
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

impl OutputFormatter for TableOutput {
    fn format_devices(&self, devices: &[DeviceSummary]) -> String {
        if devices.is_empty() {
            return "No devices found.".to_string();
        }

        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["MAC", "Address", "Label", "Group", "Power", "Firmware"]);

        for device in devices {
            table.add_row(vec![
                Cell::new(device.mac),
                Cell::new(format!("{}:{}", device.ip, device.port)),
                Cell::new(or_dash(device.label.as_deref())),
                Cell::new(or_dash(device.group.as_deref())),
                Self::power_cell(device.power),
                Cell::new(or_dash(device.host_firmware.as_deref())),
            ]);
        }

        format!("{}\n\nFound {} device(s)", table, devices.len())
    }

    fn format_reports(&self, reports: &[DeviceReport]) -> String {
        if reports.is_empty() {
            return "No devices found.".to_string();
        }

        let mut blocks = Vec::new();
        for report in reports {
            let mut block = report.details.clone();
            if let Some(host) = &report.host {
                block.push_str("  ");
                block.push_str(&time_str(host, "  "));
            }
            if let Some(wifi) = &report.wifi {
                block.push_str("  ");
                block.push_str(&radio_str(wifi, "  "));
            }
            blocks.push(block.trim_end().to_string());
        }

        blocks.join("\n\n")
    }

    fn format_fan_out(&self, action: &str, summary: &FanOutSummary) -> String {
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["MAC", "Label", "Status", "Error"]);

        for result in &summary.results {
            table.add_row(vec![
                Cell::new(result.mac),
                Cell::new(or_dash(result.label.as_deref())),
                Self::status_cell(result.status),
                Cell::new(result.error.as_deref().unwrap_or("")),
            ]);
        }

        format!(
            "{}\n\n{}: {} succeeded, {} unreachable, {} failed",
            table,
            action,
            summary.succeeded.to_string().green(),
            summary.unreachable.to_string().yellow(),
            summary.failed.to_string().red()
        )
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }

    fn format_error(&self, error: &str) -> String {
        format!("{} {}", "Error:".red().bold(), error)
    }
}
