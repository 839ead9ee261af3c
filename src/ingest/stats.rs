//! Ingestion counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for the radio ingestion path (atomic for thread-safe access)
#[derive(Debug, Default)]
pub struct IngestStats {
    pub frames_received: AtomicU64,
    pub valid_packets: AtomicU64,
    pub invalid_packets: AtomicU64,
    pub acks_sent: AtomicU64,
    pub ack_failures: AtomicU64,
    pub notifications: AtomicU64,
    pub rearms: AtomicU64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_valid(&self) {
        self.valid_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid(&self) {
        self.invalid_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack(&self) {
        self.acks_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack_failure(&self) {
        self.ack_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rearm(&self) {
        self.rearms.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> IngestSummary {
        IngestSummary {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            valid_packets: self.valid_packets.load(Ordering::Relaxed),
            invalid_packets: self.invalid_packets.load(Ordering::Relaxed),
            acks_sent: self.acks_sent.load(Ordering::Relaxed),
            ack_failures: self.ack_failures.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            rearms: self.rearms.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`IngestStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestSummary {
    pub frames_received: u64,
    pub valid_packets: u64,
    pub invalid_packets: u64,
    pub acks_sent: u64,
    pub ack_failures: u64,
    pub notifications: u64,
    pub rearms: u64,
}

impl std::fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Frames: {} ({} valid, {} invalid) | Acks: {} (failed: {}) | Notified: {} | Re-armed: {}",
            self.frames_received,
            self.valid_packets,
            self.invalid_packets,
            self.acks_sent,
            self.ack_failures,
            self.notifications,
            self.rearms
        )
    }
}
