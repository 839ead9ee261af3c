//! Radio packet types shared by the coordinator and its sensor nodes

use super::parser::ParseError;

/// Packet type identifiers (byte 1 of every frame)
///
/// The numeric values are agreed with the remote nodes and must match on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    AdcSensor = 0,
    DualModeSensor = 1,
    Ack = 2,
}

impl TryFrom<u8> for PacketType {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::AdcSensor),
            1 => Ok(Self::DualModeSensor),
            2 => Ok(Self::Ack),
            other => Err(ParseError::UnknownPacketType(other)),
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AdcSensor => "adc-sensor",
            Self::DualModeSensor => "dual-mode-sensor",
            Self::Ack => "ack",
        };
        f.write_str(name)
    }
}

/// Two-byte header leading every packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Address of the node that sent the packet
    pub source_address: u8,
    pub packet_type: PacketType,
}

/// Legacy single-value sensor report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcSensorPacket {
    pub header: PacketHeader,
    pub adc_value: u16,
}

/// Sensor report carrying the button state and node housekeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DualModeSensorPacket {
    pub header: PacketHeader,
    pub adc_value: u16,
    /// Node supply voltage in millivolts
    pub battery_mv: u16,
    /// Node uptime in 100 ms units
    pub time_100ms: u32,
    pub button: u8,
}

/// Header-only acknowledgment sent by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPacket {
    pub header: PacketHeader,
}

impl AckPacket {
    /// Ack template originating from `own_address`
    pub fn from_coordinator(own_address: u8) -> Self {
        Self {
            header: PacketHeader {
                source_address: own_address,
                packet_type: PacketType::Ack,
            },
        }
    }
}

/// Application-level view of a frame payload, discriminated by packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPacket {
    AdcSensor(AdcSensorPacket),
    DualModeSensor(DualModeSensorPacket),
    Ack(AckPacket),
}

impl CoordinatorPacket {
    pub fn header(&self) -> &PacketHeader {
        match self {
            Self::AdcSensor(p) => &p.header,
            Self::DualModeSensor(p) => &p.header,
            Self::Ack(p) => &p.header,
        }
    }

    pub fn source_address(&self) -> u8 {
        self.header().source_address
    }

    pub fn packet_type(&self) -> PacketType {
        self.header().packet_type
    }
}

/// A classified packet together with the signal strength it arrived with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedPacket {
    pub packet: CoordinatorPacket,
    /// Received signal strength in dBm
    pub rssi: i8,
}
