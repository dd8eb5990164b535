//! MADT interrupt-source-override extraction.
//!
//! The MADT body is a chain of variable-length sub-structures; each carries
//! its own length byte, which is the only way to step to the next one.
//! Iteration is bounded by the table's declared end so a malformed length
//! cannot walk past the mapping.

use bitflags::bitflags;

use crate::sdt::SdtTable;

/// Fixed MADT body fields (local APIC address + flags) before the first
/// sub-structure.
const MADT_FIXED_BODY_LEN: usize = 8;

/// Sub-structure type code for interrupt source overrides.
const TYPE_INTERRUPT_OVERRIDE: u8 = 2;

bitflags! {
    /// MPS INTI flags carried by an interrupt source override: polarity in
    /// bits 0-1, trigger mode in bits 2-3.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OverrideFlags: u16 {
        const POLARITY_HIGH = 0b0001;
        const POLARITY_LOW = 0b0011;
        const TRIGGER_EDGE = 0b0100;
        const TRIGGER_LEVEL = 0b1100;
    }
}

/// A legacy-IRQ-to-GSI override entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqOverride {
    pub irq: u8,
    pub gsi: u32,
    pub flags: OverrideFlags,
}

/// Walks the MADT and collects all interrupt source overrides in table
/// order.
pub fn parse_overrides(table: &SdtTable) -> Vec<IrqOverride> {
    let body = table.body();
    let mut overrides = Vec::new();

    let mut offset = MADT_FIXED_BODY_LEN;
    while offset + 2 <= body.len() {
        let ty = body[offset];
        let len = body[offset + 1] as usize;
        if len < 2 || offset + len > body.len() {
            tracing::warn!(offset, len, "malformed MADT sub-structure, stopping walk");
            break;
        }

        if ty == TYPE_INTERRUPT_OVERRIDE && len >= 10 {
            let entry = &body[offset..offset + len];
            overrides.push(IrqOverride {
                irq: entry[3],
                gsi: u32::from_le_bytes(entry[4..8].try_into().expect("slice is 4 bytes")),
                flags: OverrideFlags::from_bits_retain(u16::from_le_bytes(
                    entry[8..10].try_into().expect("slice is 2 bytes"),
                )),
            });
        }

        offset += len;
    }

    overrides
}

/// The process-wide override list: built once at startup, read-only after.
#[derive(Debug, Default)]
pub struct IrqOverrideTable {
    entries: Vec<IrqOverride>,
}

impl IrqOverrideTable {
    pub fn extend(&mut self, entries: Vec<IrqOverride>) {
        self.entries.extend(entries);
    }

    pub fn entries(&self) -> &[IrqOverride] {
        &self.entries
    }

    /// Remaps a legacy IRQ to its override GSI and flags. Without a matching
    /// entry the IRQ is returned unchanged with empty flags, meaning "use
    /// the legacy number with default trigger/polarity". First inserted
    /// entry wins.
    pub fn remap(&self, irq: u32) -> (u32, OverrideFlags) {
        self.entries
            .iter()
            .find(|entry| u32::from(entry.irq) == irq)
            .map(|entry| (entry.gsi, entry.flags))
            .unwrap_or((irq, OverrideFlags::empty()))
    }
}
