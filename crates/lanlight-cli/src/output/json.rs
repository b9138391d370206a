//! JSON-formatted output for CLI.

use serde::Serialize;
use serde_json::{json, Value};

use lanlight_core::{DeviceSummary, FanOutSummary};

use super::{DeviceReport, OutputFormatter};

pub struct JsonOutput;

impl JsonOutput {
    pub fn new() -> Self {
        Self
    }

    fn to_json<T: Serialize>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    }

    fn report_value(report: &DeviceReport) -> Value {
        let mut output = serde_json::to_value(&report.summary).unwrap_or(json!({}));

        if let Value::Object(ref mut map) = output {
            if let Some(host) = &report.host {
                map.insert("host".to_string(), json!(host));
            }
            if let Some(wifi) = &report.wifi {
                map.insert("wifi".to_string(), json!(wifi));
            }
        }
        output
    }
}

impl Default for JsonOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFormatter for JsonOutput {
    fn format_devices(&self, devices: &[DeviceSummary]) -> String {
        let output = json!({
            "devices": devices,
            "count": devices.len()
        });
        Self::to_json(&output)
    }

    fn format_reports(&self, reports: &[DeviceReport]) -> String {
        let devices: Vec<Value> = reports.iter().map(Self::report_value).collect();
        Self::to_json(&json!({
            "devices": devices,
            "count": reports.len()
        }))
    }

    fn format_fan_out(&self, action: &str, summary: &FanOutSummary) -> String {
        Self::to_json(&json!({
            "action": action,
            "total": summary.total(),
            "succeeded": summary.succeeded,
            "unreachable": summary.unreachable,
            "failed": summary.failed,
            "results": summary.results
        }))
    }

    fn format_message(&self, message: &str) -> String {
        Self::to_json(&json!({ "message": message }))
    }

    fn format_error(&self, error: &str) -> String {
        Self::to_json(&json!({ "error": error }))
    }
}
