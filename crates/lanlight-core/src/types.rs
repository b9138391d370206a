//! Shared domain types.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::ConfigError;

/// 48-bit hardware address identifying a device.
///
/// Displayed in canonical lowercase colon-hex form (`d0:73:d5:01:02:03`).
/// Parsing accepts colon, dash, dot or space separators, or bare hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// All-zero placeholder used as the target of broadcast messages.
    pub const BROADCAST: MacAddr = MacAddr([0; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// The address as a 48-bit integer, most significant octet first.
    pub fn to_u64(&self) -> u64 {
        self.0.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '.' | ':' | '-'))
            .collect();

        if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ConfigError::InvalidMacAddress(s.to_string()));
        }

        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16)
                .map_err(|_| ConfigError::InvalidMacAddress(s.to_string()))?;
        }
        Ok(Self(octets))
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Raw device color: hue, saturation, brightness and kelvin, each as the
/// full 16-bit value sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Hsbk {
    pub hue: u16,
    pub saturation: u16,
    pub brightness: u16,
    pub kelvin: u16,
}

impl Hsbk {
    pub const fn new(hue: u16, saturation: u16, brightness: u16, kelvin: u16) -> Self {
        Self {
            hue,
            saturation,
            brightness,
            kelvin,
        }
    }
}

impl fmt::Display for Hsbk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "H:{} S:{} B:{} K:{}",
            self.hue, self.saturation, self.brightness, self.kelvin
        )
    }
}

/// Device power level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Power {
    On,
    Off,
    /// Any raw level other than fully on (65535) or off (0).
    Level(u16),
}

impl Power {
    pub const RAW_ON: u16 = u16::MAX;
    pub const RAW_OFF: u16 = 0;

    pub fn from_raw(level: u16) -> Self {
        match level {
            Self::RAW_ON => Power::On,
            Self::RAW_OFF => Power::Off,
            other => Power::Level(other),
        }
    }

    pub fn to_raw(self) -> u16 {
        match self {
            Power::On => Self::RAW_ON,
            Power::Off => Self::RAW_OFF,
            Power::Level(level) => level,
        }
    }
}

impl From<bool> for Power {
    fn from(on: bool) -> Self {
        if on {
            Power::On
        } else {
            Power::Off
        }
    }
}

impl fmt::Display for Power {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Power::On => write!(f, "On"),
            Power::Off => write!(f, "Off"),
            Power::Level(level) => write!(f, "Unknown ({})", level),
        }
    }
}

/// Waveform shape for `LightSetWaveform`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveformKind {
    Saw = 0,
    Sine = 1,
    HalfSine = 2,
    Triangle = 3,
    Pulse = 4,
}

/// Parameters of a waveform effect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Waveform {
    pub color: Hsbk,
    /// Return to the original color when the effect finishes.
    pub transient: bool,
    pub period_ms: u32,
    pub cycles: f32,
    pub skew_ratio: i16,
    pub kind: WaveformKind,
}

/// Serializable snapshot of what a session knows about its device.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    pub mac: MacAddr,
    pub ip: IpAddr,
    pub port: u16,
    pub alive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<Power>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Hsbk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_firmware: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wifi_firmware: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_parse_formats() {
        let expected = MacAddr::new([0xd0, 0x73, 0xd5, 0x01, 0x02, 0x03]);
        for raw in [
            "d0:73:d5:01:02:03",
            "D0-73-D5-01-02-03",
            "d073.d501.0203",
            "d073d5010203",
            "d0 73 d5 01 02 03",
        ] {
            assert_eq!(raw.parse::<MacAddr>().unwrap(), expected, "Failed for {}", raw);
        }
    }

    #[test]
    fn test_mac_parse_invalid() {
        assert!("d0:73:d5:01:02".parse::<MacAddr>().is_err());
        assert!("zz:73:d5:01:02:03".parse::<MacAddr>().is_err());
        assert!("".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_mac_display_is_lowercase() {
        let mac: MacAddr = "AA:BB:CC:DD:EE:0F".parse().unwrap();
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:0f");
        assert_eq!(mac.to_u64(), 0xaabb_ccdd_ee0f);
    }

    #[test]
    fn test_mac_serializes_as_string() {
        let mac: MacAddr = "01:23:45:67:89:ab".parse().unwrap();
        assert_eq!(serde_json::to_string(&mac).unwrap(), "\"01:23:45:67:89:ab\"");
    }

    #[test]
    fn test_power_raw_mapping() {
        assert_eq!(Power::from_raw(0), Power::Off);
        assert_eq!(Power::from_raw(65535), Power::On);
        assert_eq!(Power::from_raw(1234), Power::Level(1234));
        assert_eq!(Power::from(true).to_raw(), 65535);
        assert_eq!(Power::Off.to_string(), "Off");
        assert_eq!(Power::Level(7).to_string(), "Unknown (7)");
    }
}
