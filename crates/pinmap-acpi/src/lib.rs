//! ACPI table discovery and best-effort AML structure extraction.
//!
//! This crate locates the firmware's ACPI root tables in physical memory
//! (RSDP scan, RSDT/XSDT walk), validates and wraps individual system
//! description tables, pulls legacy-IRQ-to-GSI override entries out of the
//! MADT, and runs a flat, opportunistic scan over DSDT/SSDT bytecode to
//! recover Device/Scope/Method/Name structure and PCI `_PRT` interrupt
//! routing packages.
//!
//! It is deliberately *not* an AML interpreter: only the handful of opcodes
//! needed to extract static namespace and routing structure are recognized,
//! and malformed byte sequences simply fail the candidate at that offset
//! while the scan moves on. The flat-scan approach trades formal correctness
//! for coverage of real firmware tables.

pub mod aml;
pub mod checksum;
pub mod madt;
pub mod mem;
pub mod namespace;
pub mod rsdp;
pub mod sdt;

mod error;

pub use error::AcpiError;
pub use madt::{IrqOverride, IrqOverrideTable, OverrideFlags};
pub use mem::{PhysMemory, PhysMemoryError, VecMemory};
pub use namespace::{Element, ElementKind, Namespace, PciRouting, RoutingLookupError};
pub use rsdp::AcpiScanConfig;
pub use sdt::SdtTable;

/// Parsed ACPI state needed by the IRQ rewrite step: the AML namespace built
/// from the DSDT and all SSDTs, plus the MADT override table.
#[derive(Debug, Default)]
pub struct AcpiTables {
    pub namespace: Namespace,
    pub overrides: IrqOverrideTable,
}

impl AcpiTables {
    /// Runs the full discovery-and-parse sequence: locate the RSDP, walk the
    /// root table, and feed every MADT and DSDT/SSDT into the respective
    /// parsers. The DSDT is reached through the FADT's DSDT pointer since it
    /// is not listed in the root table itself.
    ///
    /// Fails only on RSDP/root-table discovery errors; an individual table
    /// that cannot be mapped or fails its checksum is logged and skipped.
    pub fn discover<M: PhysMemory>(mem: &M, config: &AcpiScanConfig) -> Result<Self, AcpiError> {
        let entries = rsdp::locate_root_tables(mem, config)?;

        let mut tables = AcpiTables::default();
        for paddr in entries {
            let table = match SdtTable::map(mem, paddr) {
                Ok(table) => table,
                Err(err) => {
                    tracing::warn!(paddr, "skipping unmappable ACPI table: {err}");
                    continue;
                }
            };

            if table.is_fadt() {
                if let Some(dsdt_addr) = table.dsdt_address() {
                    match SdtTable::map(mem, u64::from(dsdt_addr)) {
                        Ok(dsdt) if dsdt.is_searched() => tables.namespace.parse(&dsdt),
                        Ok(dsdt) => {
                            tracing::warn!(signature = %dsdt.signature(), "FADT DSDT pointer does not reference a DSDT")
                        }
                        Err(err) => tracing::warn!("skipping unmappable DSDT: {err}"),
                    }
                }
            } else if table.is_madt() {
                tables.overrides.extend(madt::parse_overrides(&table));
            } else if table.is_searched() {
                tables.namespace.parse(&table);
            }
        }

        tables.namespace.resolve_devices();
        Ok(tables)
    }
}
