//! Sensor node registry
//!
//! A fixed table of [`REGISTRY_CAPACITY`] slots with a ring insertion cursor.
//! Known addresses are updated in place; new addresses overwrite the slot
//! under the cursor, so eviction follows insertion order and is unaffected
//! by later updates.
//!
//! Slots start zero-valued and lookup always scans all of them, so address
//! `0x00` is found before anything has been stored.

mod task;

pub use task::{RegistryHandle, RegistryUnit, NODE_QUEUE_DEPTH};

use chrono::{DateTime, Utc};
use tracing::debug;

/// Number of node slots
pub const REGISTRY_CAPACITY: usize = 7;

/// Last-known state reported by one remote node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorNode {
    pub address: u8,
    pub latest_adc_value: u16,
    pub button: u8,
    pub latest_rssi: i8,
}

/// One registry slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeSlot {
    pub node: SensorNode,
    /// When this slot was last written, `None` while still zero-initialized
    pub updated_at: Option<DateTime<Utc>>,
    /// Reports folded into this slot since its node was inserted
    pub reports: u64,
}

impl NodeSlot {
    pub fn is_occupied(&self) -> bool {
        self.updated_at.is_some()
    }
}

/// Effect of one [`NodeRegistry::observe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Known address, slot updated in place
    Updated { slot: usize },
    /// New address written under the cursor; `evicted` is the previous
    /// occupant if that slot had ever been written
    Inserted {
        slot: usize,
        evicted: Option<SensorNode>,
    },
}

/// Copy of the registry contents at one point in time
pub type RegistrySnapshot = [NodeSlot; REGISTRY_CAPACITY];

#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    slots: RegistrySnapshot,
    cursor: usize,
    evictions: u64,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the first slot holding `address`
    pub fn lookup(&self, address: u8) -> Option<usize> {
        self.slots.iter().position(|s| s.node.address == address)
    }

    pub fn get(&self, address: u8) -> Option<&SensorNode> {
        self.lookup(address).map(|i| &self.slots[i].node)
    }

    /// Fold one reported node into the table
    pub fn observe(&mut self, node: SensorNode) -> Observation {
        let now = Utc::now();

        if let Some(index) = self.lookup(node.address) {
            let slot = &mut self.slots[index];
            slot.node.latest_adc_value = node.latest_adc_value;
            slot.node.button = node.button;
            slot.node.latest_rssi = node.latest_rssi;
            slot.updated_at = Some(now);
            slot.reports += 1;
            return Observation::Updated { slot: index };
        }

        let index = self.cursor;
        let previous = self.slots[index];
        let evicted = previous.is_occupied().then_some(previous.node);
        if let Some(old) = evicted {
            self.evictions += 1;
            debug!(
                "Slot {} reused: node {:#04x} evicted by {:#04x}",
                index, old.address, node.address
            );
        }

        self.slots[index] = NodeSlot {
            node,
            updated_at: Some(now),
            reports: 1,
        };
        self.cursor = (self.cursor + 1) % REGISTRY_CAPACITY;

        Observation::Inserted {
            slot: index,
            evicted,
        }
    }

    pub fn slots(&self) -> &RegistrySnapshot {
        &self.slots
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.slots
    }

    /// Slot the next new address will be written to
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn stats_summary(&self) -> RegistryStats {
        RegistryStats {
            occupied: self.slots.iter().filter(|s| s.is_occupied()).count(),
            total_reports: self.slots.iter().map(|s| s.reports).sum(),
            evictions: self.evictions,
        }
    }
}

/// Registry statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub occupied: usize,
    pub total_reports: u64,
    pub evictions: u64,
}

impl std::fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Nodes: {}/{} slots, {} reports, {} evictions",
            self.occupied, REGISTRY_CAPACITY, self.total_reports, self.evictions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(address: u8, adc: u16, button: u8, rssi: i8) -> SensorNode {
        SensorNode {
            address,
            latest_adc_value: adc,
            button,
            latest_rssi: rssi,
        }
    }

    #[test]
    fn test_last_write_wins() {
        let mut registry = NodeRegistry::new();
        assert_eq!(
            registry.observe(node(0x05, 300, 0, -60)),
            Observation::Inserted {
                slot: 0,
                evicted: None
            }
        );
        assert_eq!(
            registry.observe(node(0x05, 512, 1, -48)),
            Observation::Updated { slot: 0 }
        );

        assert_eq!(registry.get(0x05), Some(&node(0x05, 512, 1, -48)));
        assert_eq!(registry.slots()[0].reports, 2);
        assert_eq!(registry.cursor(), 1);
    }

    #[test]
    fn test_ring_eviction_follows_insertion_order() {
        let mut registry = NodeRegistry::new();
        for address in 1..=7u8 {
            registry.observe(node(address, address as u16 * 10, 0, -50));
        }
        // Updating the oldest entry does not protect it from eviction
        registry.observe(node(1, 999, 1, -40));
        assert_eq!(registry.cursor(), 0);

        let result = registry.observe(node(8, 80, 0, -50));
        assert_eq!(
            result,
            Observation::Inserted {
                slot: 0,
                evicted: Some(node(1, 999, 1, -40))
            }
        );

        assert_eq!(registry.lookup(1), None);
        for address in 2..=7u8 {
            assert!(registry.lookup(address).is_some(), "lost {}", address);
        }
        assert_eq!(registry.lookup(8), Some(0));

        let stats = registry.stats_summary();
        assert_eq!(stats.occupied, REGISTRY_CAPACITY);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.total_reports, 7);
    }

    #[test]
    fn test_cursor_wraps() {
        let mut registry = NodeRegistry::new();
        for address in 1..=15u8 {
            registry.observe(node(address, 0, 0, 0));
        }
        // Second lap holds 8..=14, then 15 replaces 8 at slot 0
        assert_eq!(registry.lookup(15), Some(0));
        assert_eq!(registry.lookup(14), Some(6));
        assert_eq!(registry.lookup(7), None);
        assert_eq!(registry.cursor(), 1);
    }

    #[test]
    fn test_zero_address_found_before_any_report() {
        let registry = NodeRegistry::new();
        assert_eq!(registry.lookup(0x00), Some(0));
        assert_eq!(registry.get(0x00), Some(&SensorNode::default()));
        assert_eq!(registry.lookup(0x01), None);
        assert_eq!(registry.stats_summary().occupied, 0);
    }

    #[test]
    fn test_zero_address_updates_default_slot() {
        let mut registry = NodeRegistry::new();
        assert_eq!(
            registry.observe(node(0x00, 42, 1, -70)),
            Observation::Updated { slot: 0 }
        );
        // Cursor untouched, so the next new node lands on the same slot
        assert_eq!(registry.cursor(), 0);
        assert_eq!(
            registry.observe(node(0x03, 1, 0, -70)),
            Observation::Inserted {
                slot: 0,
                evicted: Some(node(0x00, 42, 1, -70))
            }
        );
    }

    #[test]
    fn test_stats_display() {
        let mut registry = NodeRegistry::new();
        registry.observe(node(0x05, 300, 0, -60));
        assert_eq!(
            registry.stats_summary().to_string(),
            "Nodes: 1/7 slots, 1 reports, 0 evictions"
        );
    }
}
