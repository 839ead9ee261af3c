//! Coordinator radio protocol: packet types and wire format

pub mod parser;
mod types;

pub use parser::{ambient_bytes, append_ambient, encode_packet, parse_packet, ParseError};
pub use types::{
    AckPacket, AdcSensorPacket, CoordinatorPacket, DualModeSensorPacket, PacketHeader, PacketType,
    ReceivedPacket,
};

/// The coordinator's own radio address
pub const COORDINATOR_ADDRESS: u8 = 0x00;
