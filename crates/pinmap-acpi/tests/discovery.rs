//! End-to-end discovery against a synthetic firmware memory image:
//! RSDP -> RSDT/XSDT -> FACP -> DSDT, plus a MADT with overrides.

use pinmap_acpi::aml::{self, op_device, op_integer, op_method, op_name, op_package, op_scope};
use pinmap_acpi::{checksum, AcpiError, AcpiScanConfig, AcpiTables, OverrideFlags, VecMemory};

const RSDP_ADDR: u64 = 0xE0000;
const RSDT_ADDR: u64 = 0x8000;
const XSDT_ADDR: u64 = 0x8800;
const FACP_ADDR: u64 = 0x9000;
const MADT_ADDR: u64 = 0xA000;
const DSDT_ADDR: u64 = 0xB000;

fn sdt(signature: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut table = vec![0u8; 36];
    table[0..4].copy_from_slice(signature);
    table.extend_from_slice(body);
    let len = table.len() as u32;
    table[4..8].copy_from_slice(&len.to_le_bytes());
    table[8] = 1;
    table[9] = checksum::generate_checksum_byte(&table);
    table
}

fn rsdp_v1(rsdt_addr: u32) -> [u8; 20] {
    let mut rsdp = [0u8; 20];
    rsdp[0..8].copy_from_slice(b"RSD PTR ");
    rsdp[9..15].copy_from_slice(b"PINMAP");
    rsdp[16..20].copy_from_slice(&rsdt_addr.to_le_bytes());
    rsdp[8] = checksum::generate_checksum_byte(&rsdp);
    rsdp
}

fn rsdp_v2(rsdt_addr: u32, xsdt_addr: u64) -> [u8; 36] {
    let mut rsdp = [0u8; 36];
    rsdp[0..8].copy_from_slice(b"RSD PTR ");
    rsdp[9..15].copy_from_slice(b"PINMAP");
    rsdp[15] = 2;
    rsdp[16..20].copy_from_slice(&rsdt_addr.to_le_bytes());
    rsdp[20..24].copy_from_slice(&36u32.to_le_bytes());
    rsdp[24..32].copy_from_slice(&xsdt_addr.to_le_bytes());
    rsdp[8] = checksum::generate_checksum_byte(&rsdp[0..20]);
    rsdp[32] = checksum::generate_checksum_byte(&rsdp);
    rsdp
}

fn facp(dsdt_addr: u32) -> Vec<u8> {
    let mut body = vec![0u8; 208];
    body[4..8].copy_from_slice(&dsdt_addr.to_le_bytes());
    sdt(b"FACP", &body)
}

fn madt_with_override(irq: u8, gsi: u32, flags: u16) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&0xFEE0_0000u32.to_le_bytes());
    body.extend_from_slice(&1u32.to_le_bytes());
    body.extend_from_slice(&[2, 10, 0, irq]);
    body.extend_from_slice(&gsi.to_le_bytes());
    body.extend_from_slice(&flags.to_le_bytes());
    sdt(b"APIC", &body)
}

fn prt_entry(address: u32, pin: u32, gsi: u32) -> Vec<u8> {
    op_package(vec![
        op_integer(u64::from(address)),
        op_integer(u64::from(pin)),
        op_integer(0),
        op_integer(u64::from(gsi)),
    ])
}

fn dsdt() -> Vec<u8> {
    let mut inner = op_name("_ADR", op_integer(0));
    inner.extend(op_name("_BBN", op_integer(0)));
    inner.extend(op_name("_SEG", op_integer(0)));
    inner.extend(op_name(
        "_PRT",
        op_package(vec![
            prt_entry(0x0003_FFFF, 0, 9),
            prt_entry(0x0002_FFFF, 1, 11),
        ]),
    ));
    let mut body = op_scope("\\_SB", op_device("PCI0", inner));
    body.extend(op_method("\\_PIC", 1, Vec::new()));
    sdt(b"DSDT", &body)
}

fn build_image(rsdp: &[u8]) -> VecMemory {
    let mut mem = VecMemory::new(0x110000);
    mem.write_physical(RSDP_ADDR, rsdp);

    let mut rsdt_body = Vec::new();
    rsdt_body.extend_from_slice(&(FACP_ADDR as u32).to_le_bytes());
    rsdt_body.extend_from_slice(&(MADT_ADDR as u32).to_le_bytes());
    mem.write_physical(RSDT_ADDR, &sdt(b"RSDT", &rsdt_body));

    let mut xsdt_body = Vec::new();
    xsdt_body.extend_from_slice(&FACP_ADDR.to_le_bytes());
    xsdt_body.extend_from_slice(&MADT_ADDR.to_le_bytes());
    mem.write_physical(XSDT_ADDR, &sdt(b"XSDT", &xsdt_body));

    mem.write_physical(FACP_ADDR, &facp(DSDT_ADDR as u32));
    mem.write_physical(MADT_ADDR, &madt_with_override(9, 21, 0b1101));
    mem.write_physical(DSDT_ADDR, &dsdt());
    mem
}

#[test]
fn discovers_parses_and_routes() {
    let mem = build_image(&rsdp_v1(RSDT_ADDR as u32));
    let tables = AcpiTables::discover(&mem, &AcpiScanConfig::default()).unwrap();

    assert!(tables.namespace.has_pic());
    let device = tables.namespace.find(b"_SB_PCI0").expect("PCI0 missing");
    assert_eq!(device.path(), "\\_SB.PCI0");
    assert_eq!(device.bdf(), 0);
    assert_eq!(device.routings().len(), 2);

    assert_eq!(tables.namespace.search_gsi(3 << 3, 0, 0), Ok(9));
    assert_eq!(tables.namespace.search_gsi(2 << 3, 0, 1), Ok(11));
    assert!(tables.namespace.search_gsi(3 << 3, 0, 1).is_err());

    assert_eq!(
        tables.overrides.remap(9),
        (21, OverrideFlags::from_bits_retain(0b1101))
    );
    assert_eq!(tables.overrides.remap(4), (4, OverrideFlags::empty()));
}

#[test]
fn v2_rsdp_goes_through_the_xsdt() {
    let mut mem = build_image(&rsdp_v2(RSDT_ADDR as u32, XSDT_ADDR));
    // Corrupt the RSDT: discovery must not touch it when the XSDT is valid.
    mem.write_physical(RSDT_ADDR + 9, &[0xFF]);

    let tables = AcpiTables::discover(&mem, &AcpiScanConfig::default()).unwrap();
    assert_eq!(tables.namespace.search_gsi(3 << 3, 0, 0), Ok(9));
}

#[test]
fn missing_rsdp_is_a_discovery_failure() {
    let mem = VecMemory::new(0x110000);
    match AcpiTables::discover(&mem, &AcpiScanConfig::default()) {
        Err(AcpiError::RsdpNotFound) => {}
        other => panic!("expected RsdpNotFound, got {other:?}"),
    }
}

#[test]
fn broken_secondary_table_is_skipped() {
    let mem = {
        let mut mem = build_image(&rsdp_v1(RSDT_ADDR as u32));
        // Corrupt the MADT checksum; the DSDT must still be parsed.
        mem.write_physical(MADT_ADDR + 9, &[0x55]);
        mem
    };

    let tables = AcpiTables::discover(&mem, &AcpiScanConfig::default()).unwrap();
    assert!(tables.overrides.entries().is_empty());
    assert_eq!(tables.namespace.search_gsi(3 << 3, 0, 0), Ok(9));
}

#[test]
fn name_string_helpers_agree_with_scanner() {
    // Guard the encoder/decoder pair the image builder relies on.
    let encoded = aml::name_string("\\_SB.PCI0");
    let decoded = aml::parse_name_string(&encoded, 0).unwrap();
    assert!(decoded.absolute);
    assert_eq!(decoded.segments, vec![*b"_SB_", *b"PCI0"]);
}
