//! Virtual sensor nodes feeding a loopback radio

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::{LoopbackRadio, RxFrame};
use crate::protocol::{
    append_ambient, encode_packet, AdcSensorPacket, CoordinatorPacket, DualModeSensorPacket,
    PacketHeader, PacketType, COORDINATOR_ADDRESS,
};

/// Every Nth frame carries an unknown packet type
const GARBAGE_EVERY: u64 = 17;

/// Background generator of sensor node traffic
pub struct NodeSimulator {
    radio: Arc<LoopbackRadio>,
    nodes: u8,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl NodeSimulator {
    pub fn new(radio: Arc<LoopbackRadio>, nodes: u8, interval: Duration) -> Self {
        Self {
            radio,
            nodes: nodes.clamp(1, 254),
            interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start injecting frames on a dedicated thread
    pub fn start(&self) -> Result<()> {
        info!(
            "Starting node simulator: {} nodes, one frame every {} ms",
            self.nodes,
            self.interval.as_millis()
        );

        let radio = self.radio.clone();
        let running = self.running.clone();
        let nodes = self.nodes;
        let interval = self.interval;

        running.store(true, Ordering::SeqCst);

        thread::Builder::new()
            .name("node-sim".to_string())
            .spawn(move || {
                let mut tick = 0u64;
                while running.load(Ordering::SeqCst) {
                    thread::sleep(interval);
                    let address = (tick % nodes as u64) as u8 + 1;
                    let frame = simulated_frame(tick, address);
                    debug!("Simulated node {:#04x} -> {}", address, frame.to_hex());
                    if !radio.inject(frame) {
                        debug!("Simulated frame from {:#04x} not delivered", address);
                    }
                    tick += 1;
                }
            })
            .context("Failed to spawn node simulator thread")?;

        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for NodeSimulator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Frame that virtual node `address` sends on `tick`
pub fn simulated_frame(tick: u64, address: u8) -> RxFrame {
    let adc_value = ((tick * 37 + address as u64 * 101) % 4096) as u16;
    let rssi = -40 - (address % 50) as i8;

    let payload = if tick > 0 && tick % GARBAGE_EVERY == 0 {
        vec![address, 0x7F, 0x00, 0x00]
    } else if tick % 2 == 0 {
        encode_packet(&CoordinatorPacket::AdcSensor(AdcSensorPacket {
            header: PacketHeader {
                source_address: address,
                packet_type: PacketType::AdcSensor,
            },
            adc_value,
        }))
    } else {
        let mut payload = encode_packet(&CoordinatorPacket::DualModeSensor(DualModeSensorPacket {
            header: PacketHeader {
                source_address: address,
                packet_type: PacketType::DualModeSensor,
            },
            adc_value,
            battery_mv: 3300 - (tick % 300) as u16,
            time_100ms: (tick * 10) as u32,
            button: ((tick / 2) % 2) as u8,
        }));
        append_ambient(&mut payload, 68 + (tick % 8) as u8, 40 + (tick % 20) as u8);
        payload
    };

    RxFrame {
        dst_address: COORDINATOR_ADDRESS,
        payload,
        rssi,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ambient_bytes, parse_packet, ParseError};

    #[test]
    fn test_simulated_frames_alternate_kinds() {
        let even = simulated_frame(0, 3);
        assert!(matches!(parse_packet(&even.payload), Ok(CoordinatorPacket::AdcSensor(_))));

        let odd = simulated_frame(1, 3);
        assert!(matches!(
            parse_packet(&odd.payload),
            Ok(CoordinatorPacket::DualModeSensor(_))
        ));
        assert_eq!(ambient_bytes(&odd.payload), (Some(69), Some(41)));
        assert_eq!(odd.dst_address, COORDINATOR_ADDRESS);
    }

    #[test]
    fn test_simulator_start_stop() {
        let radio = Arc::new(LoopbackRadio::new());
        let sim = NodeSimulator::new(radio.clone(), 2, Duration::from_millis(5));
        assert!(!sim.is_running());

        sim.start().unwrap();
        assert!(sim.is_running());
        for _ in 0..100 {
            if radio.pending() > 0 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(radio.pending() > 0);

        sim.stop();
        assert!(!sim.is_running());
    }

    #[test]
    fn test_simulated_garbage_frame() {
        let frame = simulated_frame(GARBAGE_EVERY, 2);
        assert_eq!(parse_packet(&frame.payload), Err(ParseError::UnknownPacketType(0x7F)));
    }
}
