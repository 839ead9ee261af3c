//! Wire parser and encoder for coordinator packets
//!
//! Layout (payload bytes, multi-byte fields high byte first):
//! - byte 0: source address
//! - byte 1: packet type
//! - AdcSensor: bytes 2-3 ADC value
//! - DualModeSensor: bytes 2-3 ADC value, 4-5 battery, 6-9 uptime, 10 button,
//!   11-12 reserved, 13-14 ancillary bytes
//! - Ack: header only

use super::types::{
    AckPacket, AdcSensorPacket, CoordinatorPacket, DualModeSensorPacket, PacketHeader, PacketType,
};

pub const HEADER_LEN: usize = 2;
pub const ADC_SENSOR_PACKET_LEN: usize = 4;
pub const DUAL_MODE_SENSOR_PACKET_LEN: usize = 11;
pub const ACK_PACKET_LEN: usize = HEADER_LEN;

/// Raw payload offset of the ancillary temperature byte in dual-mode frames
pub const AMBIENT_TEMPERATURE_OFFSET: usize = 13;
/// Raw payload offset of the ancillary humidity byte in dual-mode frames
pub const AMBIENT_HUMIDITY_OFFSET: usize = 14;

/// Parse error types
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty payload")]
    Empty,
    #[error("{kind} packet needs {expected} bytes, got {actual}")]
    Truncated {
        kind: PacketType,
        expected: usize,
        actual: usize,
    },
    #[error("unknown packet type {0:#04x}")]
    UnknownPacketType(u8),
}

/// Parse a frame payload into a packet
pub fn parse_packet(payload: &[u8]) -> Result<CoordinatorPacket, ParseError> {
    if payload.is_empty() {
        return Err(ParseError::Empty);
    }
    if payload.len() < HEADER_LEN {
        // Not enough for a type byte; report against the shortest kind
        return Err(ParseError::Truncated {
            kind: PacketType::Ack,
            expected: HEADER_LEN,
            actual: payload.len(),
        });
    }

    let header = PacketHeader {
        source_address: payload[0],
        packet_type: PacketType::try_from(payload[1])?,
    };
    ensure_len(header.packet_type, payload.len())?;

    let packet = match header.packet_type {
        PacketType::AdcSensor => CoordinatorPacket::AdcSensor(AdcSensorPacket {
            header,
            adc_value: u16::from_be_bytes([payload[2], payload[3]]),
        }),
        PacketType::DualModeSensor => CoordinatorPacket::DualModeSensor(DualModeSensorPacket {
            header,
            adc_value: u16::from_be_bytes([payload[2], payload[3]]),
            battery_mv: u16::from_be_bytes([payload[4], payload[5]]),
            time_100ms: u32::from_be_bytes([payload[6], payload[7], payload[8], payload[9]]),
            button: payload[10],
        }),
        PacketType::Ack => CoordinatorPacket::Ack(AckPacket { header }),
    };

    Ok(packet)
}

fn ensure_len(kind: PacketType, actual: usize) -> Result<(), ParseError> {
    let expected = min_len(kind);
    if actual < expected {
        return Err(ParseError::Truncated {
            kind,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Minimum payload length for a packet kind
pub fn min_len(kind: PacketType) -> usize {
    match kind {
        PacketType::AdcSensor => ADC_SENSOR_PACKET_LEN,
        PacketType::DualModeSensor => DUAL_MODE_SENSOR_PACKET_LEN,
        PacketType::Ack => ACK_PACKET_LEN,
    }
}

/// Ancillary (temperature, humidity) bytes of a raw dual-mode payload.
///
/// Taken by fixed offset from the raw frame, not from any declared field.
/// A zero byte, or one past the end of the frame, reads as absent.
pub fn ambient_bytes(payload: &[u8]) -> (Option<u8>, Option<u8>) {
    let at = |offset: usize| payload.get(offset).copied().filter(|b| *b != 0);
    (at(AMBIENT_TEMPERATURE_OFFSET), at(AMBIENT_HUMIDITY_OFFSET))
}

/// Encode a packet into its wire payload
pub fn encode_packet(packet: &CoordinatorPacket) -> Vec<u8> {
    let header = packet.header();
    let mut out = Vec::with_capacity(min_len(header.packet_type));
    out.push(header.source_address);
    out.push(header.packet_type as u8);

    match packet {
        CoordinatorPacket::AdcSensor(p) => {
            out.extend_from_slice(&p.adc_value.to_be_bytes());
        }
        CoordinatorPacket::DualModeSensor(p) => {
            out.extend_from_slice(&p.adc_value.to_be_bytes());
            out.extend_from_slice(&p.battery_mv.to_be_bytes());
            out.extend_from_slice(&p.time_100ms.to_be_bytes());
            out.push(p.button);
        }
        CoordinatorPacket::Ack(_) => {}
    }

    out
}

/// Extend an encoded dual-mode payload with the ancillary bytes at 13 and 14
pub fn append_ambient(payload: &mut Vec<u8>, temperature: u8, humidity: u8) {
    if payload.len() <= AMBIENT_HUMIDITY_OFFSET {
        payload.resize(AMBIENT_HUMIDITY_OFFSET + 1, 0);
    }
    payload[AMBIENT_TEMPERATURE_OFFSET] = temperature;
    payload[AMBIENT_HUMIDITY_OFFSET] = humidity;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_adc_sensor() {
        let msg = hex::decode("0500012C").unwrap();
        let packet = parse_packet(&msg).unwrap();

        match packet {
            CoordinatorPacket::AdcSensor(p) => {
                assert_eq!(p.header.source_address, 0x05);
                assert_eq!(p.adc_value, 300);
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_parse_dual_mode_sensor() {
        let msg = hex::decode("070102580BB800000064010000").unwrap();
        let packet = parse_packet(&msg).unwrap();

        match packet {
            CoordinatorPacket::DualModeSensor(p) => {
                assert_eq!(p.header.source_address, 0x07);
                assert_eq!(p.adc_value, 600);
                assert_eq!(p.battery_mv, 3000);
                assert_eq!(p.time_100ms, 100);
                assert_eq!(p.button, 1);
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_parse_ack() {
        let packet = parse_packet(&[0x00, 0x02]).unwrap();
        assert_eq!(packet, CoordinatorPacket::Ack(AckPacket::from_coordinator(0x00)));
    }

    #[test]
    fn test_unknown_packet_type() {
        assert_eq!(
            parse_packet(&[0x05, 0x09, 0x00, 0x00]),
            Err(ParseError::UnknownPacketType(0x09))
        );
    }

    #[test]
    fn test_truncated_frames() {
        assert_eq!(parse_packet(&[]), Err(ParseError::Empty));
        assert!(matches!(
            parse_packet(&[0x05]),
            Err(ParseError::Truncated { actual: 1, .. })
        ));
        assert_eq!(
            parse_packet(&[0x05, 0x00, 0x01]),
            Err(ParseError::Truncated {
                kind: PacketType::AdcSensor,
                expected: 4,
                actual: 3
            })
        );
        assert!(matches!(
            parse_packet(&hex::decode("050100010000").unwrap()),
            Err(ParseError::Truncated {
                kind: PacketType::DualModeSensor,
                ..
            })
        ));
    }

    #[test]
    fn test_encode_ack_is_header_only() {
        let ack = CoordinatorPacket::Ack(AckPacket::from_coordinator(0x00));
        assert_eq!(encode_packet(&ack), vec![0x00, 0x02]);
    }

    #[test]
    fn test_encode_matches_wire_layout() {
        let packet = CoordinatorPacket::DualModeSensor(DualModeSensorPacket {
            header: PacketHeader {
                source_address: 0x07,
                packet_type: PacketType::DualModeSensor,
            },
            adc_value: 600,
            battery_mv: 3000,
            time_100ms: 100,
            button: 1,
        });
        assert_eq!(hex::encode_upper(encode_packet(&packet)), "070102580BB80000006401");
    }

    #[test]
    fn test_ambient_bytes_by_offset() {
        let mut payload = hex::decode("070102580BB80000006401").unwrap();
        assert_eq!(ambient_bytes(&payload), (None, None));

        append_ambient(&mut payload, 72, 0);
        assert_eq!(payload.len(), 15);
        assert_eq!(ambient_bytes(&payload), (Some(72), None));

        payload[AMBIENT_HUMIDITY_OFFSET] = 45;
        assert_eq!(ambient_bytes(&payload), (Some(72), Some(45)));
    }
}
