//! Filterable device sets and concurrent fan-out.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::device::{DeviceSession, SendMode};
use crate::error::Result;
use crate::types::{DeviceSummary, Hsbk, MacAddr, Power, Waveform};

/// How one member fared in a fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Ok,
    Unreachable,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberResult {
    pub mac: MacAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub status: MemberStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate result of [`DeviceCollection::for_each`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct FanOutSummary {
    pub succeeded: usize,
    pub unreachable: usize,
    pub failed: usize,
    pub results: Vec<MemberResult>,
}

impl FanOutSummary {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total()
    }
}

/// An immutable ordered set of device sessions.
#[derive(Clone, Default)]
pub struct DeviceCollection {
    devices: Vec<Arc<DeviceSession>>,
}

impl DeviceCollection {
    pub fn new(devices: Vec<Arc<DeviceSession>>) -> Self {
        Self { devices }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DeviceSession>> {
        self.devices.iter()
    }

    fn filter(&self, keep: impl Fn(&DeviceSession) -> bool) -> Self {
        Self::new(
            self.devices
                .iter()
                .filter(|device| keep(device))
                .cloned()
                .collect(),
        )
    }

    /// Members whose cached group name is `group`.
    pub fn by_group(&self, group: &str) -> Self {
        self.filter(|device| device.group().as_deref() == Some(group))
    }

    /// Members whose cached label is `label`.
    pub fn by_label(&self, label: &str) -> Self {
        self.filter(|device| device.label().as_deref() == Some(label))
    }

    pub fn by_mac(&self, mac: MacAddr) -> Self {
        self.filter(|device| device.mac() == mac)
    }

    pub fn summaries(&self) -> Vec<DeviceSummary> {
        self.devices.iter().map(|device| device.summary()).collect()
    }

    /// Run `op` on every member concurrently and wait for all of them.
    ///
    /// Failures are logged and counted, never propagated.
    pub async fn for_each<F, Fut>(&self, op: F) -> FanOutSummary
    where
        F: Fn(Arc<DeviceSession>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let calls = self.devices.iter().map(|device| {
            let call = op(Arc::clone(device));
            async move { (device, call.await) }
        });

        let mut summary = FanOutSummary::default();
        for (device, outcome) in join_all(calls).await {
            let (status, error) = match outcome {
                Ok(()) => {
                    summary.succeeded += 1;
                    (MemberStatus::Ok, None)
                }
                Err(e) if e.is_unreachable() => {
                    info!(device = %device, "Device unreachable");
                    summary.unreachable += 1;
                    (MemberStatus::Unreachable, Some(e.to_string()))
                }
                Err(e) => {
                    warn!(device = %device, error = %e, "Device operation failed");
                    summary.failed += 1;
                    (MemberStatus::Failed, Some(e.to_string()))
                }
            };
            summary.results.push(MemberResult {
                mac: device.mac(),
                label: device.label(),
                status,
                error,
            });
        }
        summary
    }

    pub async fn set_power(&self, power: Power, mode: SendMode) -> FanOutSummary {
        self.for_each(|device| async move { device.set_power(power, mode).await })
            .await
    }

    pub async fn set_light_power(&self, power: Power, duration_ms: u32, mode: SendMode) -> FanOutSummary {
        self.for_each(|device| async move { device.set_light_power(power, duration_ms, mode).await })
            .await
    }

    pub async fn set_color(&self, color: Hsbk, duration_ms: u32, mode: SendMode) -> FanOutSummary {
        self.for_each(|device| async move { device.set_color(color, duration_ms, mode).await })
            .await
    }

    pub async fn set_waveform(&self, waveform: Waveform, mode: SendMode) -> FanOutSummary {
        self.for_each(|device| async move { device.set_waveform(waveform, mode).await })
            .await
    }

    /// Fetch cached metadata (label, group, firmware...) for every member.
    pub async fn refresh_metadata(&self) -> FanOutSummary {
        self.for_each(|device| async move { device.get_metadata().await })
            .await
    }
}

impl FromIterator<Arc<DeviceSession>> for DeviceCollection {
    fn from_iter<I: IntoIterator<Item = Arc<DeviceSession>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for DeviceCollection {
    type Item = Arc<DeviceSession>;
    type IntoIter = std::vec::IntoIter<Arc<DeviceSession>>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.into_iter()
    }
}

impl fmt::Display for DeviceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, device) in self.devices.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", device)?;
        }
        Ok(())
    }
}

impl fmt::Debug for DeviceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.devices.iter()).finish()
    }
}
