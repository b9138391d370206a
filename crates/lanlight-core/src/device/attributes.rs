//! Typed device attributes on top of the session's request primitives.
//!
//! Identity-like attributes (label, location, group, version, firmware) are
//! fetched once and served from the cache afterwards. Live state (power,
//! color, infrared, zones) is queried on every call.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::session::DeviceSession;
use crate::error::{CoreError, DeviceError, Result};
use crate::protocol::codec::truncate_label;
use crate::protocol::{Message, MessageKind, Payload};
use crate::types::{Hsbk, Power, Waveform};

/// Zones requested by [`DeviceSession::get_color_zones`] when no end index is given.
const DEFAULT_ZONE_SPAN: u8 = 8;

/// Firmware version word plus build timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FirmwareInfo {
    pub version: u32,
    /// Build time in nanoseconds since the Unix epoch.
    pub build: u64,
}

impl FirmwareInfo {
    pub fn major(&self) -> u16 {
        (self.version >> 16) as u16
    }

    pub fn minor(&self) -> u16 {
        (self.version & 0xffff) as u16
    }

    pub fn build_time(&self) -> Option<DateTime<Utc>> {
        nanos_to_datetime(self.build)
    }
}

impl fmt::Display for FirmwareInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

/// Raw product identifiers reported by `StateVersion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProductInfo {
    pub vendor: u32,
    pub product: u32,
    pub version: u32,
}

/// Device clock readings, all in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    pub time: u64,
    pub uptime: u64,
    pub downtime: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WifiInfo {
    /// Signal strength in mW.
    pub signal: f32,
    pub tx: u32,
    pub rx: u32,
}

/// How a setter delivers its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMode {
    /// Wait for the device's acknowledgement, with retries.
    #[default]
    Acknowledged,
    /// Send once without waiting.
    Rapid,
}

pub(crate) fn nanos_to_datetime(nanos: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(nanos / 1_000_000_000).ok()?;
    DateTime::from_timestamp(secs, (nanos % 1_000_000_000) as u32)
}

pub(crate) fn infrared_to_percent(raw: u16) -> u8 {
    (u32::from(raw) * 100 / u32::from(u16::MAX)) as u8
}

pub(crate) fn percent_to_infrared(percent: u8) -> u16 {
    (u32::from(percent.min(100)) * u32::from(u16::MAX) / 100) as u16
}

impl DeviceSession {
    fn unexpected(&self, expected: MessageKind, reply: &Message) -> CoreError {
        DeviceError::UnexpectedResponse {
            mac: self.mac(),
            expected,
            got: reply.kind(),
        }
        .into()
    }

    async fn deliver(&self, payload: Payload, mode: SendMode) -> Result<()> {
        match mode {
            SendMode::Acknowledged => self.request_ack(payload).await.map(|_| ()),
            SendMode::Rapid => self.send_fire_and_forget(payload, 1).await,
        }
    }

    // Cached attributes

    pub async fn get_label(&self) -> Result<String> {
        if let Some(label) = self.read_state(|s| s.label.clone()) {
            return Ok(label);
        }
        let reply = self.request(Payload::GetLabel, MessageKind::StateLabel).await?;
        match reply.payload {
            Payload::StateLabel { label } => {
                self.update_state(|s| s.label = Some(label.clone()));
                Ok(label)
            }
            _ => Err(self.unexpected(MessageKind::StateLabel, &reply)),
        }
    }

    pub async fn get_location(&self) -> Result<String> {
        if let Some(location) = self.read_state(|s| s.location.clone()) {
            return Ok(location);
        }
        let reply = self
            .request(Payload::GetLocation, MessageKind::StateLocation)
            .await?;
        match reply.payload {
            Payload::StateLocation { label, .. } => {
                self.update_state(|s| s.location = Some(label.clone()));
                Ok(label)
            }
            _ => Err(self.unexpected(MessageKind::StateLocation, &reply)),
        }
    }

    pub async fn get_group(&self) -> Result<String> {
        if let Some(group) = self.read_state(|s| s.group.clone()) {
            return Ok(group);
        }
        let reply = self.request(Payload::GetGroup, MessageKind::StateGroup).await?;
        match reply.payload {
            Payload::StateGroup { label, .. } => {
                self.update_state(|s| s.group = Some(label.clone()));
                Ok(label)
            }
            _ => Err(self.unexpected(MessageKind::StateGroup, &reply)),
        }
    }

    pub async fn get_version(&self) -> Result<ProductInfo> {
        if let Some(product) = self.read_state(|s| s.product) {
            return Ok(product);
        }
        let reply = self
            .request(Payload::GetVersion, MessageKind::StateVersion)
            .await?;
        match reply.payload {
            Payload::StateVersion {
                vendor,
                product,
                version,
            } => {
                let info = ProductInfo {
                    vendor,
                    product,
                    version,
                };
                self.update_state(|s| s.product = Some(info));
                Ok(info)
            }
            _ => Err(self.unexpected(MessageKind::StateVersion, &reply)),
        }
    }

    pub async fn get_host_firmware(&self) -> Result<FirmwareInfo> {
        if let Some(firmware) = self.read_state(|s| s.host_firmware) {
            return Ok(firmware);
        }
        let reply = self
            .request(Payload::GetHostFirmware, MessageKind::StateHostFirmware)
            .await?;
        match reply.payload {
            Payload::StateHostFirmware { build, version } => {
                let info = FirmwareInfo { version, build };
                self.update_state(|s| s.host_firmware = Some(info));
                Ok(info)
            }
            _ => Err(self.unexpected(MessageKind::StateHostFirmware, &reply)),
        }
    }

    pub async fn get_wifi_firmware(&self) -> Result<FirmwareInfo> {
        if let Some(firmware) = self.read_state(|s| s.wifi_firmware) {
            return Ok(firmware);
        }
        let reply = self
            .request(Payload::GetWifiFirmware, MessageKind::StateWifiFirmware)
            .await?;
        match reply.payload {
            Payload::StateWifiFirmware { build, version } => {
                let info = FirmwareInfo { version, build };
                self.update_state(|s| s.wifi_firmware = Some(info));
                Ok(info)
            }
            _ => Err(self.unexpected(MessageKind::StateWifiFirmware, &reply)),
        }
    }

    /// Fetch label, location, version, group and both firmware versions
    /// concurrently. Every getter runs to completion; the first error is
    /// returned.
    pub async fn get_metadata(&self) -> Result<()> {
        let (label, location, version, group, wifi, host) = tokio::join!(
            self.get_label(),
            self.get_location(),
            self.get_version(),
            self.get_group(),
            self.get_wifi_firmware(),
            self.get_host_firmware(),
        );
        label?;
        location?;
        version?;
        group?;
        wifi?;
        host?;
        Ok(())
    }

    // Live state

    pub async fn get_power(&self) -> Result<Power> {
        let reply = self.request(Payload::GetPower, MessageKind::StatePower).await?;
        match reply.payload {
            Payload::StatePower { level } => {
                let power = Power::from_raw(level);
                self.update_state(|s| s.power = Some(power));
                Ok(power)
            }
            _ => Err(self.unexpected(MessageKind::StatePower, &reply)),
        }
    }

    pub async fn get_light_power(&self) -> Result<Power> {
        let reply = self
            .request(Payload::LightGetPower, MessageKind::LightStatePower)
            .await?;
        match reply.payload {
            Payload::LightStatePower { level } => {
                let power = Power::from_raw(level);
                self.update_state(|s| s.power = Some(power));
                Ok(power)
            }
            _ => Err(self.unexpected(MessageKind::LightStatePower, &reply)),
        }
    }

    /// Query the light state. Power and label are refreshed from the same reply.
    pub async fn get_color(&self) -> Result<Hsbk> {
        let reply = self.request(Payload::LightGet, MessageKind::LightState).await?;
        match reply.payload {
            Payload::LightState {
                color,
                power,
                label,
            } => {
                self.update_state(|s| {
                    s.color = Some(color);
                    s.power = Some(Power::from_raw(power));
                    s.label = Some(label);
                });
                Ok(color)
            }
            _ => Err(self.unexpected(MessageKind::LightState, &reply)),
        }
    }

    /// Infrared brightness in percent.
    pub async fn get_infrared(&self) -> Result<u8> {
        let reply = self
            .request(Payload::LightGetInfrared, MessageKind::LightStateInfrared)
            .await?;
        match reply.payload {
            Payload::LightStateInfrared { brightness } => {
                let percent = infrared_to_percent(brightness);
                self.update_state(|s| s.infrared = Some(percent));
                Ok(percent)
            }
            _ => Err(self.unexpected(MessageKind::LightStateInfrared, &reply)),
        }
    }

    /// Colors of zones `start..=end`; `end` defaults to `start + 8`.
    pub async fn get_color_zones(&self, start: u8, end: Option<u8>) -> Result<Vec<Hsbk>> {
        let end = end.unwrap_or_else(|| start.saturating_add(DEFAULT_ZONE_SPAN));
        let reply = self
            .request(
                Payload::MultiZoneGetColorZones {
                    start_index: start,
                    end_index: end,
                },
                MessageKind::MultiZoneStateMultiZone,
            )
            .await?;
        match reply.payload {
            Payload::MultiZoneStateMultiZone { colors, .. } => {
                self.update_state(|s| s.color_zones = colors.clone());
                Ok(colors)
            }
            _ => Err(self.unexpected(MessageKind::MultiZoneStateMultiZone, &reply)),
        }
    }

    // Uncached queries

    pub async fn get_host_info(&self) -> Result<HostInfo> {
        let reply = self.request(Payload::GetInfo, MessageKind::StateInfo).await?;
        match reply.payload {
            Payload::StateInfo {
                time,
                uptime,
                downtime,
            } => Ok(HostInfo {
                time,
                uptime,
                downtime,
            }),
            _ => Err(self.unexpected(MessageKind::StateInfo, &reply)),
        }
    }

    pub async fn get_wifi_info(&self) -> Result<WifiInfo> {
        let reply = self
            .request(Payload::GetWifiInfo, MessageKind::StateWifiInfo)
            .await?;
        match reply.payload {
            Payload::StateWifiInfo { signal, tx, rx } => Ok(WifiInfo { signal, tx, rx }),
            _ => Err(self.unexpected(MessageKind::StateWifiInfo, &reply)),
        }
    }

    // Cached accessors, no I/O

    pub fn label(&self) -> Option<String> {
        self.read_state(|s| s.label.clone())
    }

    pub fn group(&self) -> Option<String> {
        self.read_state(|s| s.group.clone())
    }

    pub fn location(&self) -> Option<String> {
        self.read_state(|s| s.location.clone())
    }

    pub fn power(&self) -> Option<Power> {
        self.read_state(|s| s.power)
    }

    pub fn color(&self) -> Option<Hsbk> {
        self.read_state(|s| s.color)
    }

    pub fn infrared(&self) -> Option<u8> {
        self.read_state(|s| s.infrared)
    }

    pub fn color_zones(&self) -> Vec<Hsbk> {
        self.read_state(|s| s.color_zones.clone())
    }

    // Setters

    /// Set the label, truncated to 32 bytes. Always acknowledged.
    pub async fn set_label(&self, label: &str) -> Result<()> {
        let label = truncate_label(label).to_string();
        self.request_ack(Payload::SetLabel {
            label: label.clone(),
        })
        .await?;
        self.update_state(|s| s.label = Some(label));
        Ok(())
    }

    pub async fn set_power(&self, power: Power, mode: SendMode) -> Result<()> {
        self.deliver(
            Payload::SetPower {
                level: power.to_raw(),
            },
            mode,
        )
        .await?;
        self.update_state(|s| s.power = Some(power));
        Ok(())
    }

    pub async fn set_light_power(&self, power: Power, duration_ms: u32, mode: SendMode) -> Result<()> {
        self.deliver(
            Payload::LightSetPower {
                level: power.to_raw(),
                duration: duration_ms,
            },
            mode,
        )
        .await?;
        self.update_state(|s| s.power = Some(power));
        Ok(())
    }

    pub async fn set_color(&self, color: Hsbk, duration_ms: u32, mode: SendMode) -> Result<()> {
        self.deliver(
            Payload::LightSetColor {
                color,
                duration: duration_ms,
            },
            mode,
        )
        .await?;
        self.update_state(|s| s.color = Some(color));
        Ok(())
    }

    pub async fn set_color_zones(
        &self,
        start: u8,
        end: u8,
        color: Hsbk,
        duration_ms: u32,
        apply: u8,
        mode: SendMode,
    ) -> Result<()> {
        self.deliver(
            Payload::MultiZoneSetColorZones {
                start_index: start,
                end_index: end,
                color,
                duration: duration_ms,
                apply,
            },
            mode,
        )
        .await?;
        self.update_state(|s| {
            let upper = usize::from(end).min(s.color_zones.len().saturating_sub(1));
            for zone in s.color_zones.iter_mut().take(upper + 1).skip(usize::from(start)) {
                *zone = color;
            }
        });
        Ok(())
    }

    /// Run a waveform effect. A non-transient effect leaves the light at
    /// the waveform color.
    pub async fn set_waveform(&self, waveform: Waveform, mode: SendMode) -> Result<()> {
        self.deliver(
            Payload::LightSetWaveform {
                transient: waveform.transient,
                color: waveform.color,
                period: waveform.period_ms,
                cycles: waveform.cycles,
                skew_ratio: waveform.skew_ratio,
                waveform: waveform.kind as u8,
            },
            mode,
        )
        .await?;
        if !waveform.transient {
            self.update_state(|s| s.color = Some(waveform.color));
        }
        Ok(())
    }

    /// Set infrared brightness from a 0-100 percentage.
    pub async fn set_infrared(&self, percent: u8, mode: SendMode) -> Result<()> {
        let percent = percent.min(100);
        self.deliver(
            Payload::LightSetInfrared {
                brightness: percent_to_infrared(percent),
            },
            mode,
        )
        .await?;
        self.update_state(|s| s.infrared = Some(percent));
        Ok(())
    }
}
