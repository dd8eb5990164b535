//! PCI session seam and the ACPI-driven interrupt-line rewrite.
//!
//! The platform's PCI service is consumed through [`PciSession`]: a stateful
//! first/next enumeration cursor plus config-space accessors. The rewrite
//! engine walks every function the session reports, resolves its routing
//! through the parsed ACPI namespace, and writes the platform GSI into the
//! interrupt-line register so clients read real interrupt numbers instead of
//! firmware-programmed legacy IRQ lines.

pub mod bridge;
pub mod rewrite;

pub use bridge::{scan_bridges, PciBridge};
pub use rewrite::IrqRoutingEngine;

/// PCI bus/device/function identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct PciBdf {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl PciBdf {
    /// Creates a new BDF. The caller is responsible for keeping the values
    /// within the PCI ranges: bus < 256, device < 32, function < 8.
    pub const fn new(bus: u8, device: u8, function: u8) -> Self {
        Self {
            bus,
            device,
            function,
        }
    }

    /// Packs this BDF into the standard PCI config-address bit layout:
    /// function in bits 0-2, device in bits 3-7, bus in bits 8-15.
    pub const fn pack(self) -> u32 {
        ((self.bus as u32) << 8) | ((self.device as u32) << 3) | (self.function as u32)
    }

    pub const fn unpack(v: u32) -> Self {
        Self {
            bus: ((v >> 8) & 0xFF) as u8,
            device: ((v >> 3) & 0x1F) as u8,
            function: (v & 0x7) as u8,
        }
    }
}

impl core::fmt::Display for PciBdf {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02x}:{:02x}.{:x}", self.bus, self.device, self.function)
    }
}

/// Enumeration cursor and config-space access to the live PCI bus.
///
/// The underlying service hands out one device capability at a time;
/// `next_device` takes the previous handle by value so the
/// acquire-then-release discipline is enforced by ownership rather than by
/// convention.
pub trait PciSession {
    type Device;

    fn first_device(&mut self) -> Option<Self::Device>;
    fn next_device(&mut self, prev: Self::Device) -> Option<Self::Device>;
    /// Releases a handle without advancing the cursor.
    fn release_device(&mut self, device: Self::Device);

    fn bus_address(&self, device: &Self::Device) -> PciBdf;
    /// 24-bit class code: class in the top byte, then subclass and prog-if.
    fn class_code(&self, device: &Self::Device) -> u32;

    fn read_config(&mut self, device: &Self::Device, offset: u16, width: u8) -> u32;
    fn write_config(&mut self, device: &Self::Device, offset: u16, width: u8, value: u32);
}

/// Runs `f` for every device on the bus, holding exactly one handle at a
/// time.
pub fn for_each_device<S: PciSession>(
    session: &mut S,
    mut f: impl FnMut(&mut S, &S::Device),
) {
    let mut current = session.first_device();
    while let Some(device) = current {
        f(session, &device);
        current = session.next_device(device);
    }
}
