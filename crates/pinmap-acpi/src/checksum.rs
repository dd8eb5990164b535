//! ACPI byte-sum checksums.
//!
//! Every ACPI structure checksums to zero: the sum of all bytes (including
//! the checksum byte itself) modulo 256 must be 0.

/// Sums `bytes` modulo 256. A valid ACPI structure sums to 0.
pub fn acpi_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Returns the byte that makes `bytes` (with its checksum field zeroed)
/// checksum to 0. Used by test-table builders.
pub fn generate_checksum_byte(bytes: &[u8]) -> u8 {
    acpi_checksum(bytes).wrapping_neg()
}
