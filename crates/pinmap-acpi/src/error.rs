use thiserror::Error;

use crate::mem::PhysMemoryError;

/// Errors surfaced by ACPI table discovery and mapping.
///
/// These are fatal to the ACPI subsystem only: callers degrade to running
/// without interrupt-line rewriting rather than failing the whole driver.
#[derive(Debug, Error)]
pub enum AcpiError {
    #[error("RSDP signature not found in BIOS region or EBDA")]
    RsdpNotFound,

    #[error("table checksum mismatch for {signature:?} at {paddr:#x}")]
    TableChecksumMismatch { signature: [u8; 4], paddr: u64 },

    #[error("table at {paddr:#x} is truncated: declared length {declared}")]
    TruncatedTable { paddr: u64, declared: u32 },

    #[error(transparent)]
    PhysMemory(#[from] PhysMemoryError),
}
