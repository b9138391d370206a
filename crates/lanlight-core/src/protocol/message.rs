//! Typed protocol messages.

use crate::types::{Hsbk, MacAddr};

/// Message types understood by the session layer.
///
/// The discriminant is the wire type id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageKind {
    GetService = 2,
    StateService = 3,
    GetHostFirmware = 14,
    StateHostFirmware = 15,
    GetWifiInfo = 16,
    StateWifiInfo = 17,
    GetWifiFirmware = 18,
    StateWifiFirmware = 19,
    GetPower = 20,
    SetPower = 21,
    StatePower = 22,
    GetLabel = 23,
    SetLabel = 24,
    StateLabel = 25,
    GetVersion = 32,
    StateVersion = 33,
    GetInfo = 34,
    StateInfo = 35,
    Acknowledgement = 45,
    GetLocation = 48,
    StateLocation = 50,
    GetGroup = 51,
    StateGroup = 53,
    LightGet = 101,
    LightSetColor = 102,
    LightSetWaveform = 103,
    LightState = 107,
    LightGetPower = 116,
    LightSetPower = 117,
    LightStatePower = 118,
    LightGetInfrared = 120,
    LightStateInfrared = 121,
    LightSetInfrared = 122,
    MultiZoneSetColorZones = 501,
    MultiZoneGetColorZones = 502,
    MultiZoneStateZone = 503,
    MultiZoneStateMultiZone = 506,
}

impl MessageKind {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        use MessageKind::*;

        let kind = match code {
            2 => GetService,
            3 => StateService,
            14 => GetHostFirmware,
            15 => StateHostFirmware,
            16 => GetWifiInfo,
            17 => StateWifiInfo,
            18 => GetWifiFirmware,
            19 => StateWifiFirmware,
            20 => GetPower,
            21 => SetPower,
            22 => StatePower,
            23 => GetLabel,
            24 => SetLabel,
            25 => StateLabel,
            32 => GetVersion,
            33 => StateVersion,
            34 => GetInfo,
            35 => StateInfo,
            45 => Acknowledgement,
            48 => GetLocation,
            50 => StateLocation,
            51 => GetGroup,
            53 => StateGroup,
            101 => LightGet,
            102 => LightSetColor,
            103 => LightSetWaveform,
            107 => LightState,
            116 => LightGetPower,
            117 => LightSetPower,
            118 => LightStatePower,
            120 => LightGetInfrared,
            121 => LightStateInfrared,
            122 => LightSetInfrared,
            501 => MultiZoneSetColorZones,
            502 => MultiZoneGetColorZones,
            503 => MultiZoneStateZone,
            506 => MultiZoneStateMultiZone,
            _ => return None,
        };
        Some(kind)
    }
}

/// Service id advertised in `StateService` for the UDP transport.
pub const SERVICE_UDP: u8 = 1;

/// Kind-specific message fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    GetService,
    StateService { service: u8, port: u32 },
    GetHostFirmware,
    StateHostFirmware { build: u64, version: u32 },
    GetWifiInfo,
    StateWifiInfo { signal: f32, tx: u32, rx: u32 },
    GetWifiFirmware,
    StateWifiFirmware { build: u64, version: u32 },
    GetPower,
    SetPower { level: u16 },
    StatePower { level: u16 },
    GetLabel,
    SetLabel { label: String },
    StateLabel { label: String },
    GetVersion,
    StateVersion { vendor: u32, product: u32, version: u32 },
    GetInfo,
    StateInfo { time: u64, uptime: u64, downtime: u64 },
    Acknowledgement,
    GetLocation,
    StateLocation { location: [u8; 16], label: String, updated_at: u64 },
    GetGroup,
    StateGroup { group: [u8; 16], label: String, updated_at: u64 },
    LightGet,
    LightSetColor { color: Hsbk, duration: u32 },
    LightSetWaveform {
        transient: bool,
        color: Hsbk,
        period: u32,
        cycles: f32,
        skew_ratio: i16,
        waveform: u8,
    },
    LightState { color: Hsbk, power: u16, label: String },
    LightGetPower,
    LightSetPower { level: u16, duration: u32 },
    LightStatePower { level: u16 },
    LightGetInfrared,
    LightStateInfrared { brightness: u16 },
    LightSetInfrared { brightness: u16 },
    MultiZoneSetColorZones {
        start_index: u8,
        end_index: u8,
        color: Hsbk,
        duration: u32,
        apply: u8,
    },
    MultiZoneGetColorZones { start_index: u8, end_index: u8 },
    MultiZoneStateZone { count: u8, index: u8, color: Hsbk },
    MultiZoneStateMultiZone { count: u8, index: u8, colors: Vec<Hsbk> },
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::GetService => MessageKind::GetService,
            Payload::StateService { .. } => MessageKind::StateService,
            Payload::GetHostFirmware => MessageKind::GetHostFirmware,
            Payload::StateHostFirmware { .. } => MessageKind::StateHostFirmware,
            Payload::GetWifiInfo => MessageKind::GetWifiInfo,
            Payload::StateWifiInfo { .. } => MessageKind::StateWifiInfo,
            Payload::GetWifiFirmware => MessageKind::GetWifiFirmware,
            Payload::StateWifiFirmware { .. } => MessageKind::StateWifiFirmware,
            Payload::GetPower => MessageKind::GetPower,
            Payload::SetPower { .. } => MessageKind::SetPower,
            Payload::StatePower { .. } => MessageKind::StatePower,
            Payload::GetLabel => MessageKind::GetLabel,
            Payload::SetLabel { .. } => MessageKind::SetLabel,
            Payload::StateLabel { .. } => MessageKind::StateLabel,
            Payload::GetVersion => MessageKind::GetVersion,
            Payload::StateVersion { .. } => MessageKind::StateVersion,
            Payload::GetInfo => MessageKind::GetInfo,
            Payload::StateInfo { .. } => MessageKind::StateInfo,
            Payload::Acknowledgement => MessageKind::Acknowledgement,
            Payload::GetLocation => MessageKind::GetLocation,
            Payload::StateLocation { .. } => MessageKind::StateLocation,
            Payload::GetGroup => MessageKind::GetGroup,
            Payload::StateGroup { .. } => MessageKind::StateGroup,
            Payload::LightGet => MessageKind::LightGet,
            Payload::LightSetColor { .. } => MessageKind::LightSetColor,
            Payload::LightSetWaveform { .. } => MessageKind::LightSetWaveform,
            Payload::LightState { .. } => MessageKind::LightState,
            Payload::LightGetPower => MessageKind::LightGetPower,
            Payload::LightSetPower { .. } => MessageKind::LightSetPower,
            Payload::LightStatePower { .. } => MessageKind::LightStatePower,
            Payload::LightGetInfrared => MessageKind::LightGetInfrared,
            Payload::LightStateInfrared { .. } => MessageKind::LightStateInfrared,
            Payload::LightSetInfrared { .. } => MessageKind::LightSetInfrared,
            Payload::MultiZoneSetColorZones { .. } => MessageKind::MultiZoneSetColorZones,
            Payload::MultiZoneGetColorZones { .. } => MessageKind::MultiZoneGetColorZones,
            Payload::MultiZoneStateZone { .. } => MessageKind::MultiZoneStateZone,
            Payload::MultiZoneStateMultiZone { .. } => MessageKind::MultiZoneStateMultiZone,
        }
    }
}

/// A complete protocol message: addressing header plus payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub target: MacAddr,
    pub source: u32,
    pub sequence: u8,
    pub ack_required: bool,
    pub res_required: bool,
    pub payload: Payload,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    /// Discovery probe addressed to every device on the segment.
    pub fn discovery_probe(source: u32) -> Self {
        Self {
            target: MacAddr::BROADCAST,
            source,
            sequence: 0,
            ack_required: false,
            res_required: true,
            payload: Payload::GetService,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_code_lookup() {
        for kind in [
            MessageKind::GetService,
            MessageKind::Acknowledgement,
            MessageKind::LightState,
            MessageKind::MultiZoneStateMultiZone,
        ] {
            assert_eq!(MessageKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(MessageKind::from_code(9999), None);
    }

    #[test]
    fn test_discovery_probe_shape() {
        let probe = Message::discovery_probe(42);
        assert!(probe.target.is_broadcast());
        assert!(probe.res_required);
        assert!(!probe.ack_required);
        assert_eq!(probe.kind(), MessageKind::GetService);
    }
}
