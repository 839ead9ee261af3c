//! Radio Ingestion Unit
//!
//! Owns the single outstanding receive request. Each completion is classified
//! inside the radio callback and handed to the unit's loop as one
//! [`RadioEvent`] over a channel of depth one. The loop acknowledges valid
//! packets, notifies the registered consumer and only then re-arms, so at
//! most one frame is ever in flight end to end.

mod indicator;
mod stats;

pub use indicator::ActivityIndicator;
pub use stats::{IngestStats, IngestSummary};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use crate::environment::EnvironmentSink;
use crate::error::{CoordinatorError, Result};
use crate::protocol::{
    ambient_bytes, encode_packet, parse_packet, AckPacket, CoordinatorPacket, ParseError,
    ReceivedPacket, COORDINATOR_ADDRESS,
};
use crate::radio::{Modulation, RadioLink, RxError, RxResult, TxFrame};

/// How long the loop waits for a signal before checking the running flag
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Periodic stats logging interval
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Why a completion was not accepted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidReason {
    #[error("{0}")]
    ReceiveFailed(RxError),
    #[error("malformed packet: {0}")]
    Malformed(ParseError),
    #[error("unexpected ack from {sender:#04x}")]
    UnexpectedAck { sender: u8 },
}

/// Outcome of one receive completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    ValidPacketReceived(ReceivedPacket),
    InvalidPacketReceived(InvalidReason),
}

/// Consumer of classified packets: the packet by value and its RSSI
pub type PacketCallback = Box<dyn FnMut(CoordinatorPacket, i8) + Send + 'static>;

/// Classify a receive completion.
///
/// Runs inside the radio callback: bounded work only, no blocking. Ancillary
/// bytes of dual-mode frames are forwarded to `environment` when non-zero.
pub fn classify_completion(result: RxResult, environment: &dyn EnvironmentSink) -> RadioEvent {
    let frame = match result {
        Ok(frame) => frame,
        Err(e) => return RadioEvent::InvalidPacketReceived(InvalidReason::ReceiveFailed(e)),
    };

    match parse_packet(&frame.payload) {
        Ok(packet @ CoordinatorPacket::AdcSensor(_)) => {
            RadioEvent::ValidPacketReceived(ReceivedPacket {
                packet,
                rssi: frame.rssi,
            })
        }
        Ok(packet @ CoordinatorPacket::DualModeSensor(_)) => {
            let (temperature, humidity) = ambient_bytes(&frame.payload);
            if let Some(t) = temperature {
                environment.record_temperature(t);
            }
            if let Some(h) = humidity {
                environment.record_humidity(h);
            }
            RadioEvent::ValidPacketReceived(ReceivedPacket {
                packet,
                rssi: frame.rssi,
            })
        }
        Ok(CoordinatorPacket::Ack(ack)) => RadioEvent::InvalidPacketReceived(InvalidReason::UnexpectedAck {
            sender: ack.header.source_address,
        }),
        Err(e) => RadioEvent::InvalidPacketReceived(InvalidReason::Malformed(e)),
    }
}

/// Radio ingestion unit
pub struct RadioIngestion {
    radio: Arc<dyn RadioLink>,
    modulation: Modulation,
    own_address: u8,
    ack: AckPacket,
    events_tx: Sender<RadioEvent>,
    events_rx: Receiver<RadioEvent>,
    callback: Option<PacketCallback>,
    environment: Arc<dyn EnvironmentSink>,
    stats: Arc<IngestStats>,
    indicator: ActivityIndicator,
}

impl RadioIngestion {
    pub fn new(
        radio: Arc<dyn RadioLink>,
        environment: Arc<dyn EnvironmentSink>,
        modulation: Modulation,
    ) -> Self {
        // Depth one: the completion never has to wait, and a second frame
        // cannot arrive before the first is consumed
        let (events_tx, events_rx) = bounded::<RadioEvent>(1);

        Self {
            radio,
            modulation,
            own_address: COORDINATOR_ADDRESS,
            ack: AckPacket::from_coordinator(COORDINATOR_ADDRESS),
            events_tx,
            events_rx,
            callback: None,
            environment,
            stats: Arc::new(IngestStats::new()),
            indicator: ActivityIndicator::new(),
        }
    }

    /// Install the consumer of classified packets, replacing any previous one
    pub fn register_notification_callback<F>(&mut self, callback: F)
    where
        F: FnMut(CoordinatorPacket, i8) + Send + 'static,
    {
        if self.callback.is_some() {
            warn!("Replacing registered packet callback");
        }
        self.callback = Some(Box::new(callback));
    }

    /// Bring the radio up and arm the first receive
    pub fn start(&mut self) -> Result<()> {
        info!("Initializing radio: modulation {}", self.modulation);
        self.radio
            .init(self.modulation)
            .map_err(CoordinatorError::RadioInit)?;

        info!("Address filter: {:#04x}", self.own_address);
        self.radio
            .set_address_filter(&[self.own_address])
            .map_err(CoordinatorError::AddressFilter)?;

        self.ack = AckPacket::from_coordinator(self.own_address);

        self.arm()?;
        info!("Radio listening");
        Ok(())
    }

    fn arm(&self) -> Result<()> {
        let events_tx = self.events_tx.clone();
        let environment = self.environment.clone();
        let stats = self.stats.clone();

        self.radio
            .receive_async(Box::new(move |result| {
                stats.record_frame();
                let event = classify_completion(result, environment.as_ref());
                if events_tx.try_send(event).is_err() {
                    // Only possible if a second receive was armed early
                    error!("Radio event slot occupied, completion dropped");
                }
            }))
            .map_err(CoordinatorError::ArmReceive)
    }

    fn rearm(&self) -> Result<()> {
        self.arm()?;
        self.stats.record_rearm();
        Ok(())
    }

    /// Wait up to `timeout` for one signal and handle it.
    ///
    /// Returns whether a signal was handled. Re-arm failures are fatal.
    pub fn poll(&mut self, timeout: Duration) -> Result<bool> {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle(event)?;
                Ok(true)
            }
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => Ok(false),
        }
    }

    fn handle(&mut self, event: RadioEvent) -> Result<()> {
        match event {
            RadioEvent::ValidPacketReceived(received) => {
                self.stats.record_valid();
                debug!(
                    "Valid {} packet from {:#04x} (rssi {} dBm)",
                    received.packet.packet_type(),
                    received.packet.source_address(),
                    received.rssi
                );

                self.send_ack(received.packet.source_address());
                self.notify(received);
                self.rearm()?;
                self.indicator.toggle();
            }
            RadioEvent::InvalidPacketReceived(reason) => {
                self.stats.record_invalid();
                debug!("Invalid packet: {}", reason);
                self.rearm()?;
            }
        }
        Ok(())
    }

    fn send_ack(&self, destination: u8) {
        let frame = TxFrame {
            dst_address: destination,
            payload: encode_packet(&CoordinatorPacket::Ack(self.ack)),
        };

        match self.radio.transmit(&frame) {
            Ok(()) => self.stats.record_ack(),
            Err(e) => {
                // A lost ack is not fatal; the node's report is still stored
                self.stats.record_ack_failure();
                warn!("Failed to send ack to {:#04x}: {}", destination, e);
            }
        }
    }

    fn notify(&mut self, received: ReceivedPacket) {
        if let Some(callback) = self.callback.as_mut() {
            callback(received.packet, received.rssi);
            self.stats.record_notification();
        }
    }

    /// Run until `running` is cleared or a fatal error occurs
    pub fn run(mut self, running: Arc<AtomicBool>) -> Result<IngestSummary> {
        info!("Radio ingestion loop started");
        let mut last_stats_log = Instant::now();

        while running.load(Ordering::SeqCst) {
            self.poll(POLL_INTERVAL)?;

            if last_stats_log.elapsed() >= STATS_LOG_INTERVAL {
                info!("[Radio] {}", self.stats.summary());
                last_stats_log = Instant::now();
            }
        }

        let summary = self.stats.summary();
        info!("Radio ingestion stopped. {}", summary);
        Ok(summary)
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        self.stats.clone()
    }

    pub fn indicator(&self) -> &ActivityIndicator {
        &self.indicator
    }
}
