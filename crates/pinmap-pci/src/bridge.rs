//! PCI-to-PCI bridge topology.
//!
//! Built once by scanning the live bus: a device is a bridge when its class
//! is 0x06 and its header type (multi-function bit excluded) is 0x01. The
//! secondary/subordinate bus numbers define the range of buses reachable
//! behind it, which is what resolves "which routing table owns this device".

use crate::{for_each_device, PciBdf, PciSession};

const CLASS_BRIDGE: u32 = 0x06;
const HEADER_TYPE_PCI_BRIDGE: u32 = 0x01;

/// One PCI-to-PCI bridge and its downstream bus-number range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciBridge {
    pub bdf: PciBdf,
    pub secondary_bus: u8,
    pub subordinate_bus: u8,
}

impl PciBridge {
    /// Whether `bus` lives behind this bridge.
    pub fn spans(&self, bus: u8) -> bool {
        self.secondary_bus <= bus && bus <= self.subordinate_bus
    }
}

/// Checks class code and header type for PCI-to-PCI bridge-ness.
pub fn is_bridge<S: PciSession>(session: &mut S, device: &S::Device) -> bool {
    if session.class_code(device) >> 16 != CLASS_BRIDGE {
        return false;
    }
    let header_type = session.read_config(device, 0x0E, 1) & 0x3F;
    header_type == HEADER_TYPE_PCI_BRIDGE
}

/// Enumerates the bus and records every bridge's bus-number range.
pub fn scan_bridges<S: PciSession>(session: &mut S) -> Vec<PciBridge> {
    let mut bridges = Vec::new();
    for_each_device(session, |session, device| {
        if !is_bridge(session, device) {
            return;
        }
        let bdf = session.bus_address(device);
        // Bus-number register: primary / secondary / subordinate / latency.
        let bus_numbers = session.read_config(device, 0x18, 4);
        let bridge = PciBridge {
            bdf,
            secondary_bus: ((bus_numbers >> 8) & 0xFF) as u8,
            subordinate_bus: ((bus_numbers >> 16) & 0xFF) as u8,
        };
        tracing::debug!(%bdf, bridge.secondary_bus, bridge.subordinate_bus, "found PCI bridge");
        bridges.push(bridge);
    });
    bridges
}

/// The bridge owning `bus`, first registered match wins. `None` means the
/// bus hangs directly off the root.
pub fn owning_bridge(bridges: &[PciBridge], bus: u8) -> Option<&PciBridge> {
    bridges.iter().find(|bridge| bridge.spans(bus))
}
