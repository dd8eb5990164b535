//! Flat AML namespace scan and PCI routing extraction.
//!
//! The scanner walks DSDT/SSDT bytes offset-by-offset and opportunistically
//! constructs elements for the few opcodes it knows (Device, Scope, Method,
//! Name declarations). Structure is re-derived from byte-range containment
//! instead of a parse tree: every element records its span, and "parent of
//! X" is answered by an innermost-containing-range query over the arena.
//! False starts at one offset never poison the scan; the candidate is simply
//! dropped and scanning resumes at the next byte.

use thiserror::Error;

use crate::aml::{self, NameString, NAME_SEG_LEN};
use crate::sdt::{SdtTable, SDT_HEADER_LEN};

/// Element flavors recognized by the scanner. `Name` covers bare name
/// declarations (`_ADR`, `_PRT` as a named package, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Device,
    Scope,
    Method,
    Name,
}

/// One `_PRT` package entry: `_ADR`-style address (device number in bits
/// 16-20, function in the low word), 0-based INTx pin, and target GSI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciRouting {
    pub address: u32,
    pub pin: u32,
    pub gsi: u32,
}

impl PciRouting {
    /// `_PRT` entries route per device, not per function: only the device
    /// number portion of the address is compared against the BDF.
    pub fn matches(&self, device_bdf: u32, pin: u32) -> bool {
        (self.address >> 16) & 0x1F == (device_bdf >> 3) & 0x1F && self.pin == pin
    }
}

/// A named element discovered by the flat scan.
///
/// Elements do not own table bytes; they record offsets into the table copy
/// held by the [`Namespace`]. The absolute name is owned: 4-byte segments
/// concatenated without separators.
#[derive(Debug)]
pub struct Element {
    kind: ElementKind,
    table: usize,
    start: usize,
    /// Declared PkgLength (counted from the PkgLength field); 0 for name
    /// declarations.
    size: usize,
    /// Exclusive end of the element's byte range. `None` until a sibling
    /// proves where an unsized element must have ended.
    end: Option<usize>,
    /// Offset of the first byte after the name (inline data for `Name`
    /// declarations, flags byte for methods).
    data: usize,
    name: Vec<u8>,
    bdf: u32,
    routed: bool,
    routings: Vec<PciRouting>,
}

impl Element {
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Absolute name as concatenated 4-byte segments.
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Display form: `\SEG0.SEG1...`, for logs and tests.
    pub fn path(&self) -> String {
        let mut out = String::from("\\");
        for (i, seg) in self.name.chunks_exact(NAME_SEG_LEN).enumerate() {
            if i > 0 {
                out.push('.');
            }
            out.extend(seg.iter().map(|&b| b as char));
        }
        out
    }

    /// Bus/device/function resolved from `_SEG`/`_BBN`/`_ADR`; 0 until
    /// [`Namespace::resolve_devices`] has run.
    pub fn bdf(&self) -> u32 {
        self.bdf
    }

    pub fn routings(&self) -> &[PciRouting] {
        &self.routings
    }

    fn contains(&self, pos: usize) -> bool {
        self.start < pos && self.end.map_or(true, |end| pos < end)
    }
}

/// No `_PRT` entry matched a (device, bridge, pin) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no routing entry for device {device_bdf:#x} behind bridge {bridge_bdf:#x} pin {pin}")]
pub struct RoutingLookupError {
    pub device_bdf: u32,
    pub bridge_bdf: u32,
    pub pin: u32,
}

/// The element registry: every table copy plus the arena of elements parsed
/// out of them. Built once at startup, read-only afterwards.
#[derive(Debug, Default)]
pub struct Namespace {
    tables: Vec<Vec<u8>>,
    elements: Vec<Element>,
}

impl Namespace {
    /// Scans one DSDT/SSDT and registers every valid element.
    pub fn parse(&mut self, table: &SdtTable) {
        let table_idx = self.tables.len();
        let bytes = table.bytes().to_vec();

        let mut i = SDT_HEADER_LEN;
        while i < bytes.len() {
            match self.try_element(&bytes, table_idx, i) {
                Some((element, advance)) => {
                    self.elements.push(element);
                    i += advance;
                }
                None => i += 1,
            }
        }

        tracing::debug!(
            signature = %table.signature(),
            elements = self.elements.len(),
            "scanned ACPI table"
        );
        self.tables.push(bytes);
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn find(&self, name: &[u8]) -> Option<&Element> {
        self.elements.iter().find(|e| e.name == name)
    }

    /// True when the namespace carries a `_PIC` method, the capability probe
    /// present on ACPI platforms whose tables this scanner understands.
    pub fn has_pic(&self) -> bool {
        self.elements
            .iter()
            .any(|e| e.name.len() >= NAME_SEG_LEN && e.name.ends_with(b"_PIC"))
    }

    /// Attempts to construct an element at `i`. Returns the element and the
    /// number of bytes the outer scan advances: only the header (opcode +
    /// size encoding), since the body may contain further elements.
    fn try_element(
        &mut self,
        bytes: &[u8],
        table_idx: usize,
        i: usize,
    ) -> Option<(Element, usize)> {
        let (kind, opcode_len) = match bytes[i] {
            aml::AML_EXT_OP_PREFIX if bytes.get(i + 1) == Some(&aml::AML_EXT_OP_DEVICE) => {
                (ElementKind::Device, 2)
            }
            aml::AML_OP_SCOPE => (ElementKind::Scope, 1),
            aml::AML_OP_METHOD => (ElementKind::Method, 1),
            aml::AML_OP_NAME => (ElementKind::Name, 1),
            _ => return None,
        };

        let (size, size_len) = if kind == ElementKind::Name {
            (0, 0)
        } else {
            let (size, size_len) = aml::parse_pkg_length(bytes, i + opcode_len)?;
            // PkgLength counts itself, so it can never be smaller than its
            // own encoding, and the body must stay inside the table.
            if size < size_len || i + opcode_len + size > bytes.len() {
                return None;
            }
            (size, size_len)
        };

        // A later element can never be larger than its true parent: a
        // candidate bigger than any enclosing element is a false positive
        // inside some sibling's body.
        if size != 0 {
            let oversized = self.elements.iter().any(|e| {
                e.table == table_idx && e.contains(i) && e.size != 0 && e.size < size
            });
            if oversized {
                return None;
            }
        }

        let name_off = i + opcode_len + size_len;
        let name = aml::parse_name_string(bytes, name_off)?;
        let absolute = self.resolve_name(table_idx, i, &name)?;

        let end = (size != 0).then(|| i + opcode_len + size);
        let element = Element {
            kind,
            table: table_idx,
            start: i,
            size,
            end,
            data: name_off + name.encoded_len,
            name: absolute,
            bdf: 0,
            routed: false,
            routings: Vec::new(),
        };

        Some((element, (opcode_len + size_len).max(1)))
    }

    /// Computes the absolute name of an element at `pos` from its decoded
    /// NameString and the nearest lexically enclosing parent.
    fn resolve_name(&mut self, table_idx: usize, pos: usize, name: &NameString) -> Option<Vec<u8>> {
        let flat: Vec<u8> = name.segments.iter().flatten().copied().collect();
        if name.absolute {
            return Some(flat);
        }

        let Some(parent_idx) = self.innermost_parent(table_idx, pos) else {
            return Some(flat);
        };

        let parent_name = &self.elements[parent_idx].name;
        let keep = parent_name
            .len()
            .checked_sub(name.parent_hops * NAME_SEG_LEN)?;
        let mut absolute = parent_name[..keep].to_vec();
        absolute.extend_from_slice(&flat);
        Some(absolute)
    }

    /// Innermost element whose byte range contains `pos`.
    ///
    /// An element still carrying an elided (zero) size cannot actually
    /// contain a sibling that starts after it: finding one proves the
    /// unsized element ended before `pos`, so its end is backfilled and the
    /// search continues upward.
    fn innermost_parent(&mut self, table_idx: usize, pos: usize) -> Option<usize> {
        loop {
            let mut best: Option<usize> = None;
            for (idx, e) in self.elements.iter().enumerate() {
                if e.table != table_idx || !e.contains(pos) {
                    continue;
                }
                if best.map_or(true, |b| self.elements[b].start < e.start) {
                    best = Some(idx);
                }
            }

            let idx = best?;
            if self.elements[idx].end.is_none() {
                self.elements[idx].end = Some(pos);
                continue;
            }
            return Some(idx);
        }
    }

    /// Resolves `_ADR`/`_BBN`/`_SEG` into a BDF and extracts `_PRT` routing
    /// packages for every device element not yet processed.
    pub fn resolve_devices(&mut self) {
        for idx in 0..self.elements.len() {
            if self.elements[idx].kind != ElementKind::Device || self.elements[idx].routed {
                continue;
            }

            let name = self.elements[idx].name.clone();
            let adr = self.named_value(&name, b"_ADR").unwrap_or(0);
            let bbn = self.named_value(&name, b"_BBN").unwrap_or(0);
            let seg = self.named_value(&name, b"_SEG").unwrap_or(0);
            self.elements[idx].bdf = pack_bdf(seg, bbn, adr);

            let mut prt_name = name.clone();
            prt_name.extend_from_slice(b"_PRT");
            if self.find(&prt_name).is_some() {
                let routings = self.extract_prt(idx);
                tracing::debug!(
                    device = %self.elements[idx].path(),
                    bdf = self.elements[idx].bdf,
                    entries = routings.len(),
                    "extracted PCI routing table"
                );
                self.elements[idx].routings = routings;
            }
            self.elements[idx].routed = true;
        }
    }

    /// Value of the `Name` element `base + suffix`, if declared.
    fn named_value(&self, base: &[u8], suffix: &[u8; 4]) -> Option<u64> {
        let mut full = base.to_vec();
        full.extend_from_slice(suffix);
        let element = self
            .elements
            .iter()
            .find(|e| e.kind == ElementKind::Name && e.name == full)?;
        Some(aml::data_value(&self.tables[element.table], element.data).0)
    }

    /// Direct plus indirect `_PRT` package search for one device.
    fn extract_prt(&self, dev_idx: usize) -> Vec<PciRouting> {
        let dev = &self.elements[dev_idx];
        let Some(dev_end) = dev.end else {
            return Vec::new();
        };

        let mut routings = Vec::new();
        self.scan_packages(dev.table, dev.start, dev_end, &mut routings);

        // Indirect: name references inside the device body that resolve (by
        // stripping trailing segments off the device's own name) to an
        // element elsewhere; that element's range is searched on behalf of
        // the original device.
        let bytes = &self.tables[dev.table];
        'scan: for j in dev.start..dev_end {
            let Some(reference) = aml::parse_name_string(bytes, j) else {
                continue;
            };
            let flat: Vec<u8> = reference.segments.iter().flatten().copied().collect();

            let max_strip = if reference.absolute {
                0
            } else {
                dev.name.len() / NAME_SEG_LEN
            };
            for strip in 0..=max_strip {
                let mut candidate = if reference.absolute {
                    Vec::new()
                } else {
                    dev.name[..dev.name.len() - strip * NAME_SEG_LEN].to_vec()
                };
                candidate.extend_from_slice(&flat);

                let Some(target) = self
                    .elements
                    .iter()
                    .find(|e| e.name == candidate)
                else {
                    continue;
                };
                let Some(target_end) = target.end else {
                    continue;
                };
                // Only references that leave the device's own range count.
                if target.table == dev.table && target.start >= dev.start && target.start < dev_end
                {
                    continue;
                }

                let before = routings.len();
                self.scan_packages(target.table, target.start, target_end, &mut routings);
                if routings.len() > before {
                    break 'scan;
                }
            }
        }

        routings
    }

    /// Scans `[start, end)` of a table for four-value packages and decodes
    /// each as a routing entry: (`_ADR` address, pin, source, GSI), with the
    /// third value unused.
    fn scan_packages(&self, table_idx: usize, start: usize, end: usize, out: &mut Vec<PciRouting>) {
        let bytes = &self.tables[table_idx];
        for j in start..end.min(bytes.len()) {
            if bytes[j] != aml::AML_OP_PACKAGE {
                continue;
            }
            let Some((len, len_bytes)) = aml::parse_pkg_length(bytes, j + 1) else {
                continue;
            };
            if j + 1 + len > end {
                continue;
            }
            if bytes.get(j + 1 + len_bytes) != Some(&4) {
                continue;
            }

            let mut offset = j + 1 + len_bytes + 1;
            let mut values = [0u64; 4];
            for value in &mut values {
                let (v, consumed) = aml::data_value(bytes, offset);
                *value = v;
                offset += consumed;
            }

            out.push(PciRouting {
                address: values[0] as u32,
                pin: values[1] as u32,
                gsi: values[3] as u32,
            });
        }
    }

    /// Looks up the GSI for a device behind a given bridge: the routing
    /// table is owned by the element whose BDF equals the bridge's (the root
    /// bridge has BDF 0), and entries match on device number and pin.
    pub fn search_gsi(
        &self,
        device_bdf: u32,
        bridge_bdf: u32,
        pin: u32,
    ) -> Result<u32, RoutingLookupError> {
        for element in &self.elements {
            if element.routings.is_empty() || element.bdf != bridge_bdf {
                continue;
            }
            for routing in &element.routings {
                if routing.matches(device_bdf, pin) {
                    return Ok(routing.gsi);
                }
            }
        }
        Err(RoutingLookupError {
            device_bdf,
            bridge_bdf,
            pin,
        })
    }
}

/// Packs `_SEG`/`_BBN`/`_ADR` into a BDF: the `_ADR` high word carries the
/// device number, the low word the function.
fn pack_bdf(seg: u64, bbn: u64, adr: u64) -> u32 {
    ((seg as u32) << 16) | ((bbn as u32) << 8) | ((((adr >> 16) & 0x1F) as u32) << 3)
        | (adr as u32 & 0xFFFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aml::{op_device, op_integer, op_method, op_name, op_package, op_scope};
    use crate::checksum;
    use crate::mem::VecMemory;
    use crate::sdt::SdtTable;

    fn wrap_dsdt(body: Vec<u8>) -> SdtTable {
        let mut table = vec![0u8; SDT_HEADER_LEN];
        table[0..4].copy_from_slice(b"DSDT");
        table.extend_from_slice(&body);
        let len = table.len() as u32;
        table[4..8].copy_from_slice(&len.to_le_bytes());
        table[8] = 2;
        table[9] = checksum::generate_checksum_byte(&table);

        let mut mem = VecMemory::new(0x40000);
        mem.write_physical(0x10000, &table);
        SdtTable::map(&mem, 0x10000).unwrap()
    }

    fn prt_entry(address: u32, pin: u32, gsi: u32) -> Vec<u8> {
        op_package(vec![
            op_integer(u64::from(address)),
            op_integer(u64::from(pin)),
            op_integer(0),
            op_integer(u64::from(gsi)),
        ])
    }

    fn parsed(body: Vec<u8>) -> Namespace {
        let mut ns = Namespace::default();
        ns.parse(&wrap_dsdt(body));
        ns.resolve_devices();
        ns
    }

    #[test]
    fn resolves_nested_absolute_names() {
        let gfx = op_device("GFX0", Vec::new());
        let pci = op_device("PCI0", gfx);
        let body = op_scope("\\_SB", pci);

        let ns = parsed(body);
        let paths: Vec<String> = ns.elements().iter().map(Element::path).collect();
        assert!(paths.contains(&"\\_SB".to_string()));
        assert!(paths.contains(&"\\_SB.PCI0".to_string()));
        assert!(paths.contains(&"\\_SB.PCI0.GFX0".to_string()));
    }

    #[test]
    fn sibling_after_name_declaration_stays_under_device() {
        // _ADR has no size; _BBN must still resolve against PCI0, not _ADR.
        let mut inner = op_name("_ADR", op_integer(0));
        inner.extend(op_name("_BBN", op_integer(0)));
        let body = op_scope("\\_SB", op_device("PCI0", inner));

        let ns = parsed(body);
        assert!(ns.find(b"_SB_PCI0_ADR").is_some());
        assert!(ns.find(b"_SB_PCI0_BBN").is_some());
    }

    #[test]
    fn parent_prefix_strips_segments() {
        let dev = op_device("GFX0", op_name("^ADDR", op_integer(1)));
        let body = op_scope("\\_SB", dev);

        let ns = parsed(body);
        // ^ADDR inside \_SB.GFX0 resolves to \_SB.ADDR.
        assert!(ns.find(b"_SB_ADDR").is_some());
    }

    #[test]
    fn device_bdf_packing() {
        let mut inner = op_name("_ADR", op_integer(0x0003_0000));
        inner.extend(op_name("_BBN", op_integer(0)));
        inner.extend(op_name("_SEG", op_integer(0)));
        let body = op_scope("\\_SB", op_device("PCI0", inner));

        let ns = parsed(body);
        let dev = ns.find(b"_SB_PCI0").unwrap();
        assert_eq!(dev.bdf(), 0x18);
    }

    #[test]
    fn direct_prt_extraction_and_gsi_lookup() {
        let mut inner = op_name("_ADR", op_integer(0));
        inner.extend(op_name("_BBN", op_integer(0)));
        inner.extend(op_name("_SEG", op_integer(0)));
        inner.extend(op_name("_PRT", op_package(vec![prt_entry(0x0003_FFFF, 0, 9)])));
        let mut body = op_scope("\\_SB", op_device("PCI0", inner));
        body.extend(op_method("\\_PIC", 1, Vec::new()));

        let ns = parsed(body);
        assert!(ns.has_pic());

        // Device 3, any function, pin 0 routes to GSI 9 behind the root.
        assert_eq!(ns.search_gsi(0x18, 0, 0), Ok(9));
        assert_eq!(ns.search_gsi(0x19, 0, 0), Ok(9), "function must be ignored");
        assert_eq!(
            ns.search_gsi(0x18, 0, 1),
            Err(RoutingLookupError {
                device_bdf: 0x18,
                bridge_bdf: 0,
                pin: 1
            })
        );
        assert!(ns.search_gsi(0x20, 0, 0).is_err(), "device 4 has no entry");
    }

    #[test]
    fn indirect_prt_through_named_method() {
        // _PRT method references a package-building method declared outside
        // the device; the routing must be attributed to the device.
        let helper = op_method("PRTM", 0, op_package(vec![prt_entry(0x0005_FFFF, 1, 17)]));

        let mut inner = op_name("_ADR", op_integer(0));
        inner.extend(op_method("_PRT", 0, aml::name_string("PRTM")));
        let mut scope_body = helper;
        scope_body.extend(op_device("PCI0", inner));
        let body = op_scope("\\_SB", scope_body);

        let ns = parsed(body);
        let dev = ns.find(b"_SB_PCI0").unwrap();
        assert_eq!(
            dev.routings(),
            &[PciRouting {
                address: 0x0005_FFFF,
                pin: 1,
                gsi: 17
            }]
        );
        assert_eq!(ns.search_gsi(5 << 3, 0, 1), Ok(17));
    }

    #[test]
    fn oversized_candidate_inside_parent_is_rejected() {
        // Hand-craft a Scope whose body contains a fake Device opcode whose
        // package length exceeds the scope itself.
        let mut fake = vec![aml::AML_EXT_OP_PREFIX, aml::AML_EXT_OP_DEVICE];
        fake.extend(aml::encode_pkg_length(0x200));
        fake.extend(aml::name_seg("BAD_"));
        let mut body = op_scope("\\_SB", fake);
        // Padding keeps the fake length inside the table, so only the
        // ancestor-size check can reject it.
        body.extend(vec![0u8; 0x300]);

        let ns = parsed(body);
        assert!(ns.find(b"_SB_BAD_").is_none());
    }

    #[test]
    fn search_gsi_without_tables_fails() {
        let ns = Namespace::default();
        assert!(ns.search_gsi(0x18, 0, 0).is_err());
    }
}
