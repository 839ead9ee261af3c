//! Ambient environment readings
//!
//! Dual-mode frames may carry two ancillary bytes (temperature, humidity)
//! that are routed here rather than into the node registry. The sink is
//! written from the radio completion path, so it must never block.

pub mod htu21d;

pub use htu21d::{relative_humidity, temperature_f, Htu21d};

use std::sync::atomic::{AtomicU16, Ordering};

/// Destination for ancillary environment bytes
pub trait EnvironmentSink: Send + Sync {
    fn record_temperature(&self, value: u8);
    fn record_humidity(&self, value: u8);
}

/// Latest ambient values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AmbientSnapshot {
    pub temperature: Option<u8>,
    pub humidity: Option<u8>,
}

// Bit 8 marks a stored value; the low byte holds it
const PRESENT: u16 = 0x100;

/// Lock-free sink keeping the most recent value of each reading
#[derive(Debug, Default)]
pub struct AmbientReadings {
    temperature: AtomicU16,
    humidity: AtomicU16,
}

impl AmbientReadings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> AmbientSnapshot {
        AmbientSnapshot {
            temperature: decode(self.temperature.load(Ordering::Acquire)),
            humidity: decode(self.humidity.load(Ordering::Acquire)),
        }
    }
}

fn decode(raw: u16) -> Option<u8> {
    (raw & PRESENT != 0).then_some((raw & 0xFF) as u8)
}

impl EnvironmentSink for AmbientReadings {
    fn record_temperature(&self, value: u8) {
        self.temperature.store(PRESENT | value as u16, Ordering::Release);
    }

    fn record_humidity(&self, value: u8) {
        self.humidity.store(PRESENT | value as u16, Ordering::Release);
    }
}
