//! Physical-memory access seam.
//!
//! The driver never touches hardware directly; the platform hands it a
//! mapping primitive. Mapping here follows a map-and-copy-out model: the
//! returned bytes are an owned snapshot of the requested range, so tables
//! can outlive the underlying mapping without lifetime plumbing.

use thiserror::Error;

/// Errors returned by [`PhysMemory`] implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhysMemoryError {
    /// The requested range is not backed by mappable memory.
    #[error("physical range not mappable: paddr={paddr:#x} len={len}")]
    OutOfRange { paddr: u64, len: usize },

    /// The requested size cannot be represented on this platform.
    #[error("physical mapping of {len} bytes too large")]
    SizeTooLarge { len: u64 },
}

pub type PhysMemoryResult<T> = Result<T, PhysMemoryError>;

/// Read access to physical memory for table discovery.
pub trait PhysMemory {
    /// Maps `len` bytes of physical memory at `paddr` and returns a copy.
    fn map(&self, paddr: u64, len: usize) -> PhysMemoryResult<Vec<u8>>;

    fn read_u8(&self, paddr: u64) -> PhysMemoryResult<u8> {
        Ok(self.map(paddr, 1)?[0])
    }

    fn read_u16(&self, paddr: u64) -> PhysMemoryResult<u16> {
        let bytes = self.map(paddr, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&self, paddr: u64) -> PhysMemoryResult<u32> {
        let bytes = self.map(paddr, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&self, paddr: u64) -> PhysMemoryResult<u64> {
        let bytes = self.map(paddr, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(raw))
    }
}

/// Flat in-RAM physical memory, used by tests and host-side validation.
#[derive(Debug, Clone)]
pub struct VecMemory {
    data: Vec<u8>,
}

impl VecMemory {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
        }
    }

    pub fn write_physical(&mut self, paddr: u64, bytes: &[u8]) {
        let start = paddr as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
    }
}

impl PhysMemory for VecMemory {
    fn map(&self, paddr: u64, len: usize) -> PhysMemoryResult<Vec<u8>> {
        let start = usize::try_from(paddr)
            .map_err(|_| PhysMemoryError::OutOfRange { paddr, len })?;
        let end = start
            .checked_add(len)
            .ok_or(PhysMemoryError::SizeTooLarge { len: len as u64 })?;
        if end > self.data.len() {
            return Err(PhysMemoryError::OutOfRange { paddr, len });
        }
        Ok(self.data[start..end].to_vec())
    }
}
