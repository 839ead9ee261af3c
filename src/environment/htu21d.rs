//! HTU21D temperature/humidity sensor on a two-wire bus
//!
//! Each measurement is a single write-read transaction: one command byte out,
//! two bytes back (high byte first).

use embedded_hal::i2c::I2c;
use tracing::trace;

use super::EnvironmentSink;

/// Bus address of the HTU21D(F)
pub const HTU21D_ADDRESS: u8 = 0x40;

/// Trigger temperature measurement, hold master
pub const CMD_TRIGGER_TEMPERATURE: u8 = 0xE3;
/// Trigger humidity measurement, hold master
pub const CMD_TRIGGER_HUMIDITY: u8 = 0xE5;

const TEMP_OFFSET: f32 = -46.84;
const TEMP_SCALE: f32 = 175.72;
const RAW_FULL_SCALE: f32 = 65536.0;

/// Convert a raw temperature reading to degrees Fahrenheit
pub fn temperature_f(raw: [u8; 2]) -> f32 {
    let value = u16::from_be_bytes(raw) as f32;
    let celsius = TEMP_OFFSET + TEMP_SCALE * (value / RAW_FULL_SCALE);
    celsius * 1.8 + 32.0
}

/// Convert a raw humidity reading to percent relative humidity
pub fn relative_humidity(raw: [u8; 2]) -> f32 {
    let value = u16::from_be_bytes(raw) as f32;
    -6.0 + 125.0 * (value / RAW_FULL_SCALE)
}

/// HTU21D driver over any `embedded-hal` I2C bus
pub struct Htu21d<I2C> {
    i2c: I2C,
}

impl<I2C: I2c> Htu21d<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    fn measure(&mut self, command: u8) -> Result<[u8; 2], I2C::Error> {
        let mut raw = [0u8; 2];
        self.i2c.write_read(HTU21D_ADDRESS, &[command], &mut raw)?;
        trace!("HTU21D {:#04x} -> {:02X}{:02X}", command, raw[0], raw[1]);
        Ok(raw)
    }

    pub fn read_temperature_f(&mut self) -> Result<f32, I2C::Error> {
        self.measure(CMD_TRIGGER_TEMPERATURE).map(temperature_f)
    }

    pub fn read_humidity(&mut self) -> Result<f32, I2C::Error> {
        self.measure(CMD_TRIGGER_HUMIDITY).map(relative_humidity)
    }

    /// Take one temperature and one humidity reading and store them,
    /// truncated to whole units, in `sink`
    pub fn sample_into(&mut self, sink: &dyn EnvironmentSink) -> Result<(), I2C::Error> {
        let temperature = self.read_temperature_f()?;
        sink.record_temperature(temperature as u8);
        let humidity = self.read_humidity()?;
        sink.record_humidity(humidity as u8);
        Ok(())
    }

    pub fn release(self) -> I2C {
        self.i2c
    }
}
