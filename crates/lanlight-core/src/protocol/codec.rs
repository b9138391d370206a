//! Binary wire codec.
//!
//! Every datagram starts with a 36-byte little-endian header:
//!
//! | bytes  | field                                                        |
//! |--------|--------------------------------------------------------------|
//! | 0..2   | total size                                                   |
//! | 2..4   | protocol (1024) \| addressable \| tagged                     |
//! | 4..8   | source id                                                    |
//! | 8..16  | target (6-byte MAC + 2 zero bytes)                           |
//! | 16..22 | reserved                                                     |
//! | 22     | flags: bit 0 response required, bit 1 ack required          |
//! | 23     | sequence number                                              |
//! | 24..32 | reserved                                                     |
//! | 32..34 | message type                                                 |
//! | 34..36 | reserved                                                     |

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::message::{Message, MessageKind, Payload};
use crate::error::ProtocolError;
use crate::types::{Hsbk, MacAddr};

pub const HEADER_SIZE: usize = 36;
pub const PROTOCOL_NUMBER: u16 = 1024;
const ADDRESSABLE: u16 = 1 << 12;
const TAGGED: u16 = 1 << 13;
const RES_REQUIRED: u8 = 1 << 0;
const ACK_REQUIRED: u8 = 1 << 1;
const LABEL_SIZE: usize = 32;
const ZONES_PER_MESSAGE: usize = 8;

/// Serializes and deserializes protocol messages.
pub trait Codec: Send + Sync {
    fn encode(&self, message: &Message) -> Bytes;

    fn decode(&self, datagram: &[u8]) -> Result<Message, ProtocolError>;
}

/// Codec for the LAN binary protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct LanCodec;

impl Codec for LanCodec {
    fn encode(&self, message: &Message) -> Bytes {
        let mut payload = BytesMut::new();
        encode_payload(&message.payload, &mut payload);

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());

        // Frame
        buf.put_u16_le((HEADER_SIZE + payload.len()) as u16);
        let mut protocol = PROTOCOL_NUMBER | ADDRESSABLE;
        if message.target.is_broadcast() {
            protocol |= TAGGED;
        }
        buf.put_u16_le(protocol);
        buf.put_u32_le(message.source);

        // Frame address
        buf.put_slice(&message.target.octets());
        buf.put_bytes(0, 2);
        buf.put_bytes(0, 6);
        let mut flags = 0u8;
        if message.res_required {
            flags |= RES_REQUIRED;
        }
        if message.ack_required {
            flags |= ACK_REQUIRED;
        }
        buf.put_u8(flags);
        buf.put_u8(message.sequence);

        // Protocol header
        buf.put_u64_le(0);
        buf.put_u16_le(message.kind().code());
        buf.put_u16_le(0);

        buf.put_slice(&payload);
        buf.freeze()
    }

    fn decode(&self, datagram: &[u8]) -> Result<Message, ProtocolError> {
        if datagram.len() < HEADER_SIZE {
            return Err(ProtocolError::Malformed(format!(
                "datagram of {} bytes is shorter than the header",
                datagram.len()
            )));
        }

        let mut buf = datagram;
        let size = buf.get_u16_le() as usize;
        if size != datagram.len() {
            return Err(ProtocolError::Malformed(format!(
                "declared size {} does not match datagram length {}",
                size,
                datagram.len()
            )));
        }

        let protocol = buf.get_u16_le();
        if protocol & 0x0fff != PROTOCOL_NUMBER {
            return Err(ProtocolError::Malformed(format!(
                "unsupported protocol number {}",
                protocol & 0x0fff
            )));
        }
        let source = buf.get_u32_le();

        let mut target = [0u8; 6];
        buf.copy_to_slice(&mut target);
        buf.advance(2 + 6);
        let flags = buf.get_u8();
        let sequence = buf.get_u8();

        buf.advance(8);
        let code = buf.get_u16_le();
        buf.advance(2);

        let kind = MessageKind::from_code(code).ok_or(ProtocolError::UnknownKind(code))?;
        let payload = decode_payload(kind, &mut buf)?;

        Ok(Message {
            target: MacAddr::new(target),
            source,
            sequence,
            ack_required: flags & ACK_REQUIRED != 0,
            res_required: flags & RES_REQUIRED != 0,
            payload,
        })
    }
}

fn put_hsbk(buf: &mut BytesMut, color: &Hsbk) {
    buf.put_u16_le(color.hue);
    buf.put_u16_le(color.saturation);
    buf.put_u16_le(color.brightness);
    buf.put_u16_le(color.kelvin);
}

fn get_hsbk(buf: &mut &[u8]) -> Hsbk {
    Hsbk {
        hue: buf.get_u16_le(),
        saturation: buf.get_u16_le(),
        brightness: buf.get_u16_le(),
        kelvin: buf.get_u16_le(),
    }
}

/// Writes a label as exactly 32 bytes, truncating on a char boundary and
/// padding with NULs.
fn put_label(buf: &mut BytesMut, label: &str) {
    let truncated = truncate_label(label);
    buf.put_slice(truncated.as_bytes());
    buf.put_bytes(0, LABEL_SIZE - truncated.len());
}

fn get_label(buf: &mut &[u8]) -> String {
    let raw = &buf[..LABEL_SIZE];
    let label = String::from_utf8_lossy(raw).replace('\0', "");
    buf.advance(LABEL_SIZE);
    label
}

/// Longest prefix of `label` that fits the 32-byte label field.
pub fn truncate_label(label: &str) -> &str {
    if label.len() <= LABEL_SIZE {
        return label;
    }
    let mut end = LABEL_SIZE;
    while !label.is_char_boundary(end) {
        end -= 1;
    }
    &label[..end]
}

fn encode_payload(payload: &Payload, buf: &mut BytesMut) {
    match payload {
        Payload::GetService
        | Payload::GetHostFirmware
        | Payload::GetWifiInfo
        | Payload::GetWifiFirmware
        | Payload::GetPower
        | Payload::GetLabel
        | Payload::GetVersion
        | Payload::GetInfo
        | Payload::Acknowledgement
        | Payload::GetLocation
        | Payload::GetGroup
        | Payload::LightGet
        | Payload::LightGetPower
        | Payload::LightGetInfrared => {}
        Payload::StateService { service, port } => {
            buf.put_u8(*service);
            buf.put_u32_le(*port);
        }
        Payload::StateHostFirmware { build, version }
        | Payload::StateWifiFirmware { build, version } => {
            buf.put_u64_le(*build);
            buf.put_u64_le(0);
            buf.put_u32_le(*version);
        }
        Payload::StateWifiInfo { signal, tx, rx } => {
            buf.put_f32_le(*signal);
            buf.put_u32_le(*tx);
            buf.put_u32_le(*rx);
            buf.put_i16_le(0);
        }
        Payload::SetPower { level }
        | Payload::StatePower { level }
        | Payload::LightStatePower { level } => buf.put_u16_le(*level),
        Payload::SetLabel { label } | Payload::StateLabel { label } => put_label(buf, label),
        Payload::StateVersion {
            vendor,
            product,
            version,
        } => {
            buf.put_u32_le(*vendor);
            buf.put_u32_le(*product);
            buf.put_u32_le(*version);
        }
        Payload::StateInfo {
            time,
            uptime,
            downtime,
        } => {
            buf.put_u64_le(*time);
            buf.put_u64_le(*uptime);
            buf.put_u64_le(*downtime);
        }
        Payload::StateLocation {
            location: id,
            label,
            updated_at,
        }
        | Payload::StateGroup {
            group: id,
            label,
            updated_at,
        } => {
            buf.put_slice(id);
            put_label(buf, label);
            buf.put_u64_le(*updated_at);
        }
        Payload::LightSetColor { color, duration } => {
            buf.put_u8(0);
            put_hsbk(buf, color);
            buf.put_u32_le(*duration);
        }
        Payload::LightSetWaveform {
            transient,
            color,
            period,
            cycles,
            skew_ratio,
            waveform,
        } => {
            buf.put_u8(0);
            buf.put_u8(u8::from(*transient));
            put_hsbk(buf, color);
            buf.put_u32_le(*period);
            buf.put_f32_le(*cycles);
            buf.put_i16_le(*skew_ratio);
            buf.put_u8(*waveform);
        }
        Payload::LightState {
            color,
            power,
            label,
        } => {
            put_hsbk(buf, color);
            buf.put_i16_le(0);
            buf.put_u16_le(*power);
            put_label(buf, label);
            buf.put_u64_le(0);
        }
        Payload::LightSetPower { level, duration } => {
            buf.put_u16_le(*level);
            buf.put_u32_le(*duration);
        }
        Payload::LightStateInfrared { brightness } | Payload::LightSetInfrared { brightness } => {
            buf.put_u16_le(*brightness)
        }
        Payload::MultiZoneSetColorZones {
            start_index,
            end_index,
            color,
            duration,
            apply,
        } => {
            buf.put_u8(*start_index);
            buf.put_u8(*end_index);
            put_hsbk(buf, color);
            buf.put_u32_le(*duration);
            buf.put_u8(*apply);
        }
        Payload::MultiZoneGetColorZones {
            start_index,
            end_index,
        } => {
            buf.put_u8(*start_index);
            buf.put_u8(*end_index);
        }
        Payload::MultiZoneStateZone {
            count,
            index,
            color,
        } => {
            buf.put_u8(*count);
            buf.put_u8(*index);
            put_hsbk(buf, color);
        }
        Payload::MultiZoneStateMultiZone {
            count,
            index,
            colors,
        } => {
            buf.put_u8(*count);
            buf.put_u8(*index);
            for i in 0..ZONES_PER_MESSAGE {
                put_hsbk(buf, &colors.get(i).copied().unwrap_or_default());
            }
        }
    }
}

/// Fixed payload size of each kind.
fn payload_size(kind: MessageKind) -> usize {
    match kind {
        MessageKind::StateService => 5,
        MessageKind::StateHostFirmware | MessageKind::StateWifiFirmware => 20,
        MessageKind::StateWifiInfo => 14,
        MessageKind::SetPower | MessageKind::StatePower | MessageKind::LightStatePower => 2,
        MessageKind::SetLabel | MessageKind::StateLabel => LABEL_SIZE,
        MessageKind::StateVersion => 12,
        MessageKind::StateInfo => 24,
        MessageKind::StateLocation | MessageKind::StateGroup => 16 + LABEL_SIZE + 8,
        MessageKind::LightSetColor => 13,
        MessageKind::LightSetWaveform => 21,
        MessageKind::LightState => 8 + 2 + 2 + LABEL_SIZE + 8,
        MessageKind::LightSetPower => 6,
        MessageKind::LightStateInfrared | MessageKind::LightSetInfrared => 2,
        MessageKind::MultiZoneSetColorZones => 15,
        MessageKind::MultiZoneGetColorZones => 2,
        MessageKind::MultiZoneStateZone => 10,
        MessageKind::MultiZoneStateMultiZone => 2 + 8 * ZONES_PER_MESSAGE,
        _ => 0,
    }
}

fn decode_payload(kind: MessageKind, buf: &mut &[u8]) -> Result<Payload, ProtocolError> {
    let expected = payload_size(kind);
    if buf.remaining() < expected {
        return Err(ProtocolError::Malformed(format!(
            "{:?} payload needs {} bytes, got {}",
            kind,
            expected,
            buf.remaining()
        )));
    }

    let payload = match kind {
        MessageKind::GetService => Payload::GetService,
        MessageKind::StateService => Payload::StateService {
            service: buf.get_u8(),
            port: buf.get_u32_le(),
        },
        MessageKind::GetHostFirmware => Payload::GetHostFirmware,
        MessageKind::StateHostFirmware => {
            let build = buf.get_u64_le();
            buf.advance(8);
            Payload::StateHostFirmware {
                build,
                version: buf.get_u32_le(),
            }
        }
        MessageKind::GetWifiInfo => Payload::GetWifiInfo,
        MessageKind::StateWifiInfo => Payload::StateWifiInfo {
            signal: buf.get_f32_le(),
            tx: buf.get_u32_le(),
            rx: buf.get_u32_le(),
        },
        MessageKind::GetWifiFirmware => Payload::GetWifiFirmware,
        MessageKind::StateWifiFirmware => {
            let build = buf.get_u64_le();
            buf.advance(8);
            Payload::StateWifiFirmware {
                build,
                version: buf.get_u32_le(),
            }
        }
        MessageKind::GetPower => Payload::GetPower,
        MessageKind::SetPower => Payload::SetPower {
            level: buf.get_u16_le(),
        },
        MessageKind::StatePower => Payload::StatePower {
            level: buf.get_u16_le(),
        },
        MessageKind::GetLabel => Payload::GetLabel,
        MessageKind::SetLabel => Payload::SetLabel {
            label: get_label(buf),
        },
        MessageKind::StateLabel => Payload::StateLabel {
            label: get_label(buf),
        },
        MessageKind::GetVersion => Payload::GetVersion,
        MessageKind::StateVersion => Payload::StateVersion {
            vendor: buf.get_u32_le(),
            product: buf.get_u32_le(),
            version: buf.get_u32_le(),
        },
        MessageKind::GetInfo => Payload::GetInfo,
        MessageKind::StateInfo => Payload::StateInfo {
            time: buf.get_u64_le(),
            uptime: buf.get_u64_le(),
            downtime: buf.get_u64_le(),
        },
        MessageKind::Acknowledgement => Payload::Acknowledgement,
        MessageKind::GetLocation => Payload::GetLocation,
        MessageKind::StateLocation => {
            let mut location = [0u8; 16];
            buf.copy_to_slice(&mut location);
            Payload::StateLocation {
                location,
                label: get_label(buf),
                updated_at: buf.get_u64_le(),
            }
        }
        MessageKind::GetGroup => Payload::GetGroup,
        MessageKind::StateGroup => {
            let mut group = [0u8; 16];
            buf.copy_to_slice(&mut group);
            Payload::StateGroup {
                group,
                label: get_label(buf),
                updated_at: buf.get_u64_le(),
            }
        }
        MessageKind::LightGet => Payload::LightGet,
        MessageKind::LightSetColor => {
            buf.advance(1);
            Payload::LightSetColor {
                color: get_hsbk(buf),
                duration: buf.get_u32_le(),
            }
        }
        MessageKind::LightSetWaveform => {
            buf.advance(1);
            Payload::LightSetWaveform {
                transient: buf.get_u8() != 0,
                color: get_hsbk(buf),
                period: buf.get_u32_le(),
                cycles: buf.get_f32_le(),
                skew_ratio: buf.get_i16_le(),
                waveform: buf.get_u8(),
            }
        }
        MessageKind::LightState => {
            let color = get_hsbk(buf);
            buf.advance(2);
            let power = buf.get_u16_le();
            let label = get_label(buf);
            buf.advance(8);
            Payload::LightState {
                color,
                power,
                label,
            }
        }
        MessageKind::LightGetPower => Payload::LightGetPower,
        MessageKind::LightSetPower => Payload::LightSetPower {
            level: buf.get_u16_le(),
            duration: buf.get_u32_le(),
        },
        MessageKind::LightStatePower => Payload::LightStatePower {
            level: buf.get_u16_le(),
        },
        MessageKind::LightGetInfrared => Payload::LightGetInfrared,
        MessageKind::LightStateInfrared => Payload::LightStateInfrared {
            brightness: buf.get_u16_le(),
        },
        MessageKind::LightSetInfrared => Payload::LightSetInfrared {
            brightness: buf.get_u16_le(),
        },
        MessageKind::MultiZoneSetColorZones => Payload::MultiZoneSetColorZones {
            start_index: buf.get_u8(),
            end_index: buf.get_u8(),
            color: get_hsbk(buf),
            duration: buf.get_u32_le(),
            apply: buf.get_u8(),
        },
        MessageKind::MultiZoneGetColorZones => Payload::MultiZoneGetColorZones {
            start_index: buf.get_u8(),
            end_index: buf.get_u8(),
        },
        MessageKind::MultiZoneStateZone => Payload::MultiZoneStateZone {
            count: buf.get_u8(),
            index: buf.get_u8(),
            color: get_hsbk(buf),
        },
        MessageKind::MultiZoneStateMultiZone => {
            let count = buf.get_u8();
            let index = buf.get_u8();
            let colors = (0..ZONES_PER_MESSAGE).map(|_| get_hsbk(buf)).collect();
            Payload::MultiZoneStateMultiZone {
                count,
                index,
                colors,
            }
        }
    };
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac() -> MacAddr {
        "d0:73:d5:01:02:03".parse().unwrap()
    }

    fn message(payload: Payload) -> Message {
        Message {
            target: mac(),
            source: 0xdead_beef,
            sequence: 17,
            ack_required: true,
            res_required: false,
            payload,
        }
    }

    #[test]
    fn test_header_layout() {
        let bytes = LanCodec.encode(&message(Payload::SetPower { level: 65535 }));

        assert_eq!(bytes.len(), HEADER_SIZE + 2);
        assert_eq!(&bytes[0..2], &38u16.to_le_bytes());
        assert_eq!(&bytes[2..4], &0x1400u16.to_le_bytes());
        assert_eq!(&bytes[4..8], &0xdead_beefu32.to_le_bytes());
        assert_eq!(&bytes[8..14], &[0xd0, 0x73, 0xd5, 0x01, 0x02, 0x03]);
        assert_eq!(&bytes[14..22], &[0u8; 8]);
        assert_eq!(bytes[22], ACK_REQUIRED);
        assert_eq!(bytes[23], 17);
        assert_eq!(&bytes[32..34], &21u16.to_le_bytes());
        assert_eq!(&bytes[36..38], &[0xff, 0xff]);
    }

    #[test]
    fn test_broadcast_probe_is_tagged() {
        let bytes = LanCodec.encode(&Message::discovery_probe(7));

        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[2..4], &0x3400u16.to_le_bytes());
        assert_eq!(bytes[22], RES_REQUIRED);
        assert_eq!(&bytes[32..34], &2u16.to_le_bytes());
    }

    #[test]
    fn test_decode_state_service() {
        let original = message(Payload::StateService {
            service: 1,
            port: 56700,
        });
        let decoded = LanCodec.decode(&LanCodec.encode(&original)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_light_state_strips_label_padding() {
        let original = message(Payload::LightState {
            color: Hsbk::new(1000, 2000, 3000, 3500),
            power: 65535,
            label: "Kitchen".to_string(),
        });
        let bytes = LanCodec.encode(&original);
        assert_eq!(bytes.len(), HEADER_SIZE + 52);

        match LanCodec.decode(&bytes).unwrap().payload {
            Payload::LightState { label, power, .. } => {
                assert_eq!(label, "Kitchen");
                assert_eq!(power, 65535);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_long_label_is_truncated() {
        let long = "é".repeat(20);
        let bytes = LanCodec.encode(&message(Payload::SetLabel { label: long.clone() }));
        assert_eq!(bytes.len(), HEADER_SIZE + 32);

        match LanCodec.decode(&bytes).unwrap().payload {
            Payload::SetLabel { label } => assert_eq!(label, "é".repeat(16)),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_short_datagram() {
        let result = LanCodec.decode(&[0u8; 10]);
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_size_mismatch() {
        let mut bytes = LanCodec.encode(&message(Payload::GetLabel)).to_vec();
        bytes.push(0);
        assert!(matches!(
            LanCodec.decode(&bytes),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_payload() {
        let mut bytes = LanCodec.encode(&message(Payload::GetLabel)).to_vec();
        // Relabel the header as StateLabel, which needs 32 payload bytes.
        bytes[32..34].copy_from_slice(&25u16.to_le_bytes());
        assert!(matches!(
            LanCodec.decode(&bytes),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_unknown_kind() {
        let mut bytes = LanCodec.encode(&message(Payload::GetLabel)).to_vec();
        bytes[32..34].copy_from_slice(&9999u16.to_le_bytes());
        assert!(matches!(
            LanCodec.decode(&bytes),
            Err(ProtocolError::UnknownKind(9999))
        ));
    }
}
