//! System description table wrapper.
//!
//! A table is mapped in two phases: one page at the (rounded-down) physical
//! base first, because the authoritative length lives in the header and is
//! only known after that minimal mapping, then again with the declared
//! length if the table crosses the first page. The full-table checksum is
//! the acceptance gate; a table that does not sum to zero is rejected.

use core::fmt;

use crate::checksum;
use crate::mem::PhysMemory;
use crate::AcpiError;

/// Length of the common ACPI system description table header.
pub const SDT_HEADER_LEN: usize = 36;

const PAGE_SIZE: u64 = 0x1000;

/// Four-byte table signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 4]);

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// A mapped, checksum-validated system description table.
///
/// Owns a copy of the table bytes, so it stays usable after the underlying
/// mapping would have been released.
#[derive(Debug, Clone)]
pub struct SdtTable {
    paddr: u64,
    bytes: Vec<u8>,
}

impl SdtTable {
    /// Maps and validates the table at `paddr`.
    pub fn map<M: PhysMemory>(mem: &M, paddr: u64) -> Result<Self, AcpiError> {
        let base = paddr & !(PAGE_SIZE - 1);
        let offset = (paddr - base) as usize;

        // Minimal mapping; extended if the header itself straddles the page.
        let mut mapped = mem.map(base, PAGE_SIZE as usize)?;
        if offset + SDT_HEADER_LEN > mapped.len() {
            mapped = mem.map(base, offset + SDT_HEADER_LEN)?;
        }

        let declared = u32::from_le_bytes(
            mapped[offset + 4..offset + 8]
                .try_into()
                .expect("header slice is 4 bytes"),
        );
        if (declared as usize) < SDT_HEADER_LEN {
            return Err(AcpiError::TruncatedTable { paddr, declared });
        }

        let total = offset + declared as usize;
        if total > mapped.len() {
            mapped = mem.map(base, total)?;
        }

        let bytes = mapped[offset..total].to_vec();
        if checksum::acpi_checksum(&bytes) != 0 {
            let mut signature = [0u8; 4];
            signature.copy_from_slice(&bytes[0..4]);
            return Err(AcpiError::TableChecksumMismatch { signature, paddr });
        }

        Ok(Self { paddr, bytes })
    }

    pub fn paddr(&self) -> u64 {
        self.paddr
    }

    pub fn signature(&self) -> Signature {
        let mut sig = [0u8; 4];
        sig.copy_from_slice(&self.bytes[0..4]);
        Signature(sig)
    }

    pub fn revision(&self) -> u8 {
        self.bytes[8]
    }

    /// Full table bytes, header included.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Table bytes after the common header.
    pub fn body(&self) -> &[u8] {
        &self.bytes[SDT_HEADER_LEN..]
    }

    pub fn is_fadt(&self) -> bool {
        self.signature().0 == *b"FACP"
    }

    pub fn is_madt(&self) -> bool {
        self.signature().0 == *b"APIC"
    }

    /// Tables whose body is AML bytecode the namespace scanner consumes.
    pub fn is_searched(&self) -> bool {
        matches!(&self.signature().0, b"DSDT" | b"SSDT")
    }

    /// Copies out the RSDT/XSDT entry array: `width`-byte little-endian
    /// physical pointers, bounded by `max` entries.
    pub fn entries(&self, width: usize, max: usize) -> Vec<u64> {
        debug_assert!(width == 4 || width == 8);
        self.body()
            .chunks_exact(width)
            .take(max)
            .map(|chunk| {
                let mut raw = [0u8; 8];
                raw[..width].copy_from_slice(chunk);
                u64::from_le_bytes(raw)
            })
            .collect()
    }

    /// The FADT's 32-bit DSDT pointer (table offset 40), if this is a FADT
    /// large enough to carry one.
    pub fn dsdt_address(&self) -> Option<u32> {
        if !self.is_fadt() || self.bytes.len() < 44 {
            return None;
        }
        let addr = u32::from_le_bytes(self.bytes[40..44].try_into().expect("slice is 4 bytes"));
        (addr != 0).then_some(addr)
    }
}
