//! The ACPI-driven interrupt-line rewrite engine.
//!
//! Construction runs table discovery and parsing exactly once; the engine
//! then owns every registry (AML namespace, MADT overrides) for the life of
//! the driver. Discovery failure is not fatal to the driver: the engine
//! degrades to an empty state in which `rewrite_irq` leaves config space
//! untouched and `irq_override` returns legacy IRQs unchanged.

use pinmap_acpi::{AcpiScanConfig, AcpiTables, Namespace, OverrideFlags, PhysMemory};

use crate::bridge::{is_bridge, owning_bridge, scan_bridges};
use crate::{for_each_device, PciSession};

/// Config-space offset of the interrupt-line / interrupt-pin register pair.
const PCI_INTERRUPT_REG: u16 = 0x3C;

pub struct IrqRoutingEngine {
    tables: AcpiTables,
}

impl IrqRoutingEngine {
    /// Discovers and parses the ACPI tables. Runs the full sequence exactly
    /// once; on discovery failure the engine comes up empty and every later
    /// operation degrades to a no-op.
    pub fn new<M: PhysMemory>(mem: &M, config: &AcpiScanConfig) -> Self {
        let tables = match AcpiTables::discover(mem, config) {
            Ok(tables) => tables,
            Err(err) => {
                tracing::warn!("ACPI discovery failed, interrupt lines left as-is: {err}");
                AcpiTables::default()
            }
        };
        Self { tables }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.tables.namespace
    }

    /// Remaps a client's legacy IRQ number through the MADT override table.
    /// Returns the IRQ unchanged with empty flags when no override exists.
    pub fn irq_override(&self, irq: u32) -> (u32, OverrideFlags) {
        self.tables.overrides.remap(irq)
    }

    /// Rewrites the interrupt-line register of every non-bridge device to
    /// its GSI, resolved via the device's owning bridge and the extracted
    /// `_PRT` entries. Devices without a matching entry are skipped.
    ///
    /// Safe to call more than once: rewriting an already-rewritten device
    /// writes the same GSI again.
    pub fn rewrite_irq<S: PciSession>(&self, session: &mut S) {
        if !self.tables.namespace.has_pic() {
            tracing::info!("ACPI table format not supported, interrupt lines left as-is");
            return;
        }
        tracing::info!("ACPI table format supported, rewriting PCI interrupt lines");

        let bridges = scan_bridges(session);
        for_each_device(session, |session, device| {
            if is_bridge(session, device) {
                return;
            }

            let bdf = session.bus_address(device);
            let bridge_bdf = owning_bridge(&bridges, bdf.bus)
                .map(|bridge| bridge.bdf.pack())
                .unwrap_or(0);

            let irq_reg = session.read_config(device, PCI_INTERRUPT_REG, 4);
            let pin = (irq_reg >> 8) & 0xFF;
            if pin == 0 {
                // INTx pin 0: the function uses no legacy interrupt.
                return;
            }

            match self
                .tables
                .namespace
                .search_gsi(bdf.pack(), bridge_bdf, pin - 1)
            {
                Ok(gsi) => {
                    tracing::info!("rewriting {bdf} IRQ: {} -> GSI: {gsi}", irq_reg & 0xFF);
                    session.write_config(device, PCI_INTERRUPT_REG, 1, gsi);
                }
                Err(err) => {
                    tracing::debug!("leaving {bdf} untouched: {err}");
                }
            }
        });
    }
}
