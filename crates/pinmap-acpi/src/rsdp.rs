//! RSDP discovery and root-table enumeration.
//!
//! The RSDP lives either in the conventional BIOS read-only region
//! (0xE0000-0xFFFFF) or in the first kilobyte of the EBDA, whose segment is
//! published in the BIOS data area. The signature is aligned on 16-byte
//! boundaries, and the first 20 bytes checksum to zero.

use core::ops::Range;

use crate::checksum;
use crate::mem::PhysMemory;
use crate::sdt::SdtTable;
use crate::AcpiError;

const RSDP_SIGNATURE: &[u8; 8] = b"RSD PTR ";

/// Length of the ACPI 1.0 RSDP, covered by the primary checksum.
const RSDP_V1_LEN: usize = 20;

/// Length of the ACPI 2.0+ RSDP, covered by the extended checksum.
const RSDP_V2_LEN: usize = 36;

/// Knobs for root-table discovery. Defaults match PC-compatible firmware.
#[derive(Debug, Clone)]
pub struct AcpiScanConfig {
    /// Physical window scanned for the RSDP signature.
    pub bios_window: Range<u64>,
    /// BIOS data area location of the EBDA segment pointer.
    pub ebda_pointer: u64,
    /// Bytes of the EBDA scanned for the RSDP signature.
    pub ebda_scan_len: usize,
    /// Upper bound on copied-out RSDT/XSDT entries.
    pub max_root_entries: usize,
}

impl Default for AcpiScanConfig {
    fn default() -> Self {
        Self {
            bios_window: 0xE0000..0x100000,
            ebda_pointer: 0x40E,
            ebda_scan_len: 0x400,
            max_root_entries: 36,
        }
    }
}

fn scan_for_rsdp(region: &[u8], region_base: u64) -> Option<u64> {
    let mut offset = 0;
    while offset + RSDP_V1_LEN <= region.len() {
        if &region[offset..offset + 8] == RSDP_SIGNATURE
            && checksum::acpi_checksum(&region[offset..offset + RSDP_V1_LEN]) == 0
        {
            return Some(region_base + offset as u64);
        }
        offset += 16;
    }
    None
}

/// Finds the RSDP in the BIOS window, falling back to the EBDA.
pub fn find_rsdp<M: PhysMemory>(mem: &M, config: &AcpiScanConfig) -> Result<u64, AcpiError> {
    let window_len = (config.bios_window.end - config.bios_window.start) as usize;
    if let Ok(region) = mem.map(config.bios_window.start, window_len) {
        if let Some(paddr) = scan_for_rsdp(&region, config.bios_window.start) {
            return Ok(paddr);
        }
    }

    // EBDA fallback: real-mode segment, shifted to a physical address.
    let ebda_segment = mem.read_u16(config.ebda_pointer)?;
    let ebda_base = u64::from(ebda_segment) << 4;
    if ebda_base != 0 {
        if let Ok(region) = mem.map(ebda_base, config.ebda_scan_len) {
            if let Some(paddr) = scan_for_rsdp(&region, ebda_base) {
                return Ok(paddr);
            }
        }
    }

    Err(AcpiError::RsdpNotFound)
}

/// Reads the root table referenced by the RSDP and copies out its entry
/// array of table physical addresses.
///
/// An ACPI 2.0+ RSDP with a valid extended checksum and a non-zero XSDT
/// pointer is followed through the XSDT (8-byte entries); everything else
/// goes through the 32-bit RSDT pointer at RSDP offset 0x10.
pub fn locate_root_tables<M: PhysMemory>(
    mem: &M,
    config: &AcpiScanConfig,
) -> Result<Vec<u64>, AcpiError> {
    let rsdp_addr = find_rsdp(mem, config)?;
    tracing::debug!(rsdp_addr, "found RSDP");

    let v1 = mem.map(rsdp_addr, RSDP_V1_LEN)?;
    let revision = v1[15];
    let rsdt_addr = u32::from_le_bytes(v1[16..20].try_into().expect("slice is 4 bytes"));

    if revision >= 2 {
        if let Ok(v2) = mem.map(rsdp_addr, RSDP_V2_LEN) {
            if checksum::acpi_checksum(&v2) == 0 {
                let xsdt_addr =
                    u64::from_le_bytes(v2[24..32].try_into().expect("slice is 8 bytes"));
                if xsdt_addr != 0 {
                    let xsdt = SdtTable::map(mem, xsdt_addr)?;
                    return Ok(xsdt.entries(8, config.max_root_entries));
                }
            }
        }
    }

    let rsdt = SdtTable::map(mem, u64::from(rsdt_addr))?;
    Ok(rsdt.entries(4, config.max_root_entries))
}
