//! Radio Link Adapter seam
//!
//! The coordinator talks to its transceiver only through [`RadioLink`]:
//! 1. `init` with a modulation scheme
//! 2. `set_address_filter` so only frames for this node are delivered
//! 3. `receive_async` arms exactly one outstanding receive; the completion
//!    callback fires once, possibly from a context that must not block
//! 4. `transmit` sends a frame synchronously

pub mod bridge;
pub mod loopback;
pub mod simulator;

pub use bridge::BridgeRadio;
pub use loopback::LoopbackRadio;
pub use simulator::NodeSimulator;

use std::str::FromStr;

/// Modulation schemes supported by the transceiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Modulation {
    /// 2-GFSK at 50 kbps (sub-1 GHz)
    #[default]
    Gfsk50Kbps,
    /// Long range mode, 625 bps
    LongRange625Bps,
    /// SimpleLink long range, 5 kbps
    SimpleLinkLongRange5Kbps,
    /// 2-GFSK at 200 kbps (2.4 GHz)
    Gfsk200Kbps2G4,
}

impl Modulation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gfsk50Kbps => "2gfsk-50kbps",
            Self::LongRange625Bps => "lrm-625bps",
            Self::SimpleLinkLongRange5Kbps => "sl-lr-5kbps",
            Self::Gfsk200Kbps2G4 => "2gfsk-200kbps-2g4",
        }
    }
}

impl FromStr for Modulation {
    type Err = RadioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "2gfsk-50kbps" => Ok(Self::Gfsk50Kbps),
            "lrm-625bps" => Ok(Self::LongRange625Bps),
            "sl-lr-5kbps" => Ok(Self::SimpleLinkLongRange5Kbps),
            "2gfsk-200kbps-2g4" => Ok(Self::Gfsk200Kbps2G4),
            other => Err(RadioError::Rejected(format!("unknown modulation '{}'", other))),
        }
    }
}

impl std::fmt::Display for Modulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame handed over by the adapter when a receive completes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxFrame {
    pub dst_address: u8,
    pub payload: Vec<u8>,
    /// Received signal strength in dBm
    pub rssi: i8,
}

impl RxFrame {
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.payload)
    }
}

/// Frame to transmit; the adapter adds length and destination on air
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxFrame {
    pub dst_address: u8,
    pub payload: Vec<u8>,
}

/// Failure status reported by a receive completion
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RxError {
    #[error("receive timed out")]
    Timeout,
    #[error("receive aborted")]
    Aborted,
    #[error("receive failed: {0}")]
    Device(String),
}

/// Result delivered to the receive completion callback
pub type RxResult = Result<RxFrame, RxError>;

/// Receive completion callback, invoked at most once per arm
pub type RxCallback = Box<dyn FnOnce(RxResult) + Send + 'static>;

/// Adapter-level errors
#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    #[error("radio not initialized")]
    NotInitialized,
    #[error("a receive request is already outstanding")]
    AlreadyArmed,
    #[error("radio rejected request: {0}")]
    Rejected(String),
    #[error("radio link closed")]
    Closed,
    #[error("radio I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Narrow request/callback interface to the transceiver
pub trait RadioLink: Send + Sync {
    fn init(&self, modulation: Modulation) -> Result<(), RadioError>;

    fn set_address_filter(&self, addresses: &[u8]) -> Result<(), RadioError>;

    /// Arm a single asynchronous receive
    fn receive_async(&self, on_complete: RxCallback) -> Result<(), RadioError>;

    fn transmit(&self, frame: &TxFrame) -> Result<(), RadioError>;
}
