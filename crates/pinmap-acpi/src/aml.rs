//! AML encoding primitives: opcodes, package lengths, name strings, and
//! inline data values.
//!
//! The decode half implements only what the flat namespace scanner needs.
//! The encode half exists so tests can synthesize firmware-shaped DSDT
//! images instead of carrying opaque binary fixtures.

pub const AML_OP_NAME: u8 = 0x08;
pub const AML_OP_SCOPE: u8 = 0x10;
pub const AML_OP_BUFFER: u8 = 0x11;
pub const AML_OP_PACKAGE: u8 = 0x12;
pub const AML_OP_METHOD: u8 = 0x14;

pub const AML_EXT_OP_PREFIX: u8 = 0x5B;
pub const AML_EXT_OP_DEVICE: u8 = 0x82;

pub const AML_OP_ZERO: u8 = 0x00;
pub const AML_OP_ONE: u8 = 0x01;
pub const AML_OP_ONES: u8 = 0xFF;

pub const AML_OP_BYTE_PREFIX: u8 = 0x0A;
pub const AML_OP_WORD_PREFIX: u8 = 0x0B;
pub const AML_OP_DWORD_PREFIX: u8 = 0x0C;
pub const AML_OP_QWORD_PREFIX: u8 = 0x0E;

pub const AML_NAME_DUAL_PREFIX: u8 = 0x2E;
pub const AML_NAME_MULTI_PREFIX: u8 = 0x2F;
pub const AML_NAME_ROOT_PREFIX: u8 = 0x5C;
pub const AML_NAME_PARENT_PREFIX: u8 = 0x5E;

/// Bytes of one name segment.
pub const NAME_SEG_LEN: usize = 4;

/// Checks the NameSeg character rules: a lead character in `[A-Za-z_]` and
/// three trailing characters in `[A-Za-z_0-9]`.
pub fn valid_name_seg(seg: &[u8; 4]) -> bool {
    fn lead(c: u8) -> bool {
        c.is_ascii_alphabetic() || c == b'_'
    }
    fn trail(c: u8) -> bool {
        c.is_ascii_alphanumeric() || c == b'_'
    }
    lead(seg[0]) && trail(seg[1]) && trail(seg[2]) && trail(seg[3])
}

/// Decodes a PkgLength field.
///
/// The top two bits of the first byte give the number of follow bytes. With
/// follow bytes present, only the low nibble of the first byte contributes
/// (bits 4-5 are reserved and must be clear), and each follow byte shifts in
/// at bit `4 + 8*i`. Returns `(length, encoded_len)`.
pub fn parse_pkg_length(bytes: &[u8], offset: usize) -> Option<(usize, usize)> {
    let b0 = *bytes.get(offset)?;
    let follow_bytes = (b0 >> 6) as usize;
    if follow_bytes == 0 {
        return Some(((b0 & 0x3F) as usize, 1));
    }
    if b0 & 0x30 != 0 {
        // Reserved bits set alongside a multi-byte encoding.
        return None;
    }
    let mut len = (b0 & 0x0F) as usize;
    for i in 0..follow_bytes {
        let b = *bytes.get(offset + 1 + i)?;
        len |= (b as usize) << (4 + i * 8);
    }
    Some((len, 1 + follow_bytes))
}

pub fn encode_pkg_length(len: usize) -> Vec<u8> {
    assert!(len <= 0x0FFF_FFFF, "PkgLength too large: {len}");

    if len <= 0x3F {
        return vec![len as u8];
    }

    if len <= 0x0FFF {
        let b0 = 0x40 | (len as u8 & 0x0F);
        let b1 = (len >> 4) as u8;
        return vec![b0, b1];
    }

    if len <= 0x000F_FFFF {
        let b0 = 0x80 | (len as u8 & 0x0F);
        let b1 = (len >> 4) as u8;
        let b2 = (len >> 12) as u8;
        return vec![b0, b1, b2];
    }

    let b0 = 0xC0 | (len as u8 & 0x0F);
    let b1 = (len >> 4) as u8;
    let b2 = (len >> 12) as u8;
    let b3 = (len >> 20) as u8;
    vec![b0, b1, b2, b3]
}

/// A decoded NameString.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameString {
    /// Started with the root prefix `\`.
    pub absolute: bool,
    /// Number of leading `^` parent prefixes.
    pub parent_hops: usize,
    /// Name segments, 4 bytes each.
    pub segments: Vec<[u8; 4]>,
    /// Bytes consumed by the encoding.
    pub encoded_len: usize,
}

fn read_seg(bytes: &[u8], offset: usize) -> Option<[u8; 4]> {
    let seg: [u8; 4] = bytes.get(offset..offset + 4)?.try_into().ok()?;
    valid_name_seg(&seg).then_some(seg)
}

/// Decodes a NameString at `offset`: optional root prefix or run of parent
/// prefixes, then a single segment, a dual-name, or a multi-name. Returns
/// `None` when no valid segment sequence follows the prefixes.
pub fn parse_name_string(bytes: &[u8], offset: usize) -> Option<NameString> {
    let mut pos = offset;
    let mut absolute = false;
    let mut parent_hops = 0;

    match *bytes.get(pos)? {
        AML_NAME_ROOT_PREFIX => {
            absolute = true;
            pos += 1;
        }
        AML_NAME_PARENT_PREFIX => {
            while *bytes.get(pos)? == AML_NAME_PARENT_PREFIX {
                parent_hops += 1;
                pos += 1;
            }
        }
        _ => {}
    }

    let mut segments = Vec::new();
    match *bytes.get(pos)? {
        AML_NAME_DUAL_PREFIX => {
            pos += 1;
            for _ in 0..2 {
                segments.push(read_seg(bytes, pos)?);
                pos += NAME_SEG_LEN;
            }
        }
        AML_NAME_MULTI_PREFIX => {
            let count = *bytes.get(pos + 1)? as usize;
            if count == 0 {
                return None;
            }
            pos += 2;
            for _ in 0..count {
                segments.push(read_seg(bytes, pos)?);
                pos += NAME_SEG_LEN;
            }
        }
        _ => {
            segments.push(read_seg(bytes, pos)?);
            pos += NAME_SEG_LEN;
        }
    }

    Some(NameString {
        absolute,
        parent_hops,
        segments,
        encoded_len: pos - offset,
    })
}

/// Decodes a tagged inline data value (ConstObj or Byte/Word/DWord prefix).
///
/// Unrecognized tags and truncated encodings decode as value 0 with zero
/// bytes consumed; callers relying on positional reads inherit the
/// reference behavior of re-reading the same byte.
pub fn data_value(bytes: &[u8], offset: usize) -> (u64, usize) {
    let Some(&tag) = bytes.get(offset) else {
        return (0, 0);
    };
    match tag {
        AML_OP_ZERO => (0, 1),
        AML_OP_ONE => (1, 1),
        AML_OP_ONES => (0xFFFF_FFFF, 1),
        AML_OP_BYTE_PREFIX => match bytes.get(offset + 1) {
            Some(&b) => (u64::from(b), 2),
            None => (0, 0),
        },
        AML_OP_WORD_PREFIX => match bytes.get(offset + 1..offset + 3) {
            Some(raw) => (
                u64::from(u16::from_le_bytes(raw.try_into().expect("slice is 2 bytes"))),
                3,
            ),
            None => (0, 0),
        },
        AML_OP_DWORD_PREFIX => match bytes.get(offset + 1..offset + 5) {
            Some(raw) => (
                u64::from(u32::from_le_bytes(raw.try_into().expect("slice is 4 bytes"))),
                5,
            ),
            None => (0, 0),
        },
        _ => (0, 0),
    }
}

// --- Encoding helpers (test-table synthesis) ---

pub fn name_seg(name: &str) -> [u8; 4] {
    let bytes = name.as_bytes();
    assert!(
        bytes.len() <= 4,
        "AML name segment must be <= 4 bytes, got {name:?}"
    );
    let mut out = [b'_'; 4];
    out[..bytes.len()].copy_from_slice(bytes);
    out
}

pub fn name_string(path: &str) -> Vec<u8> {
    let mut out = Vec::new();
    let mut rest = path;
    if let Some(stripped) = rest.strip_prefix('\\') {
        out.push(AML_NAME_ROOT_PREFIX);
        rest = stripped;
    }
    while let Some(stripped) = rest.strip_prefix('^') {
        out.push(AML_NAME_PARENT_PREFIX);
        rest = stripped;
    }

    let segs: Vec<&str> = rest.split('.').filter(|s| !s.is_empty()).collect();
    assert!(!segs.is_empty(), "invalid AML name string: {path:?}");

    match segs.len() {
        1 => out.extend_from_slice(&name_seg(segs[0])),
        2 => {
            out.push(AML_NAME_DUAL_PREFIX);
            out.extend_from_slice(&name_seg(segs[0]));
            out.extend_from_slice(&name_seg(segs[1]));
        }
        n => {
            assert!(n <= 255, "too many name segments");
            out.push(AML_NAME_MULTI_PREFIX);
            out.push(n as u8);
            for seg in segs {
                out.extend_from_slice(&name_seg(seg));
            }
        }
    }

    out
}

pub fn op_scope(name: &str, body: Vec<u8>) -> Vec<u8> {
    let mut content = name_string(name);
    content.extend_from_slice(&body);

    let mut out = vec![AML_OP_SCOPE];
    out.extend_from_slice(&encode_pkg_length(content.len() + pkg_length_self_len(content.len())));
    out.extend_from_slice(&content);
    out
}

pub fn op_device(name: &str, body: Vec<u8>) -> Vec<u8> {
    let mut content = name_string(name);
    content.extend_from_slice(&body);

    let mut out = vec![AML_EXT_OP_PREFIX, AML_EXT_OP_DEVICE];
    out.extend_from_slice(&encode_pkg_length(content.len() + pkg_length_self_len(content.len())));
    out.extend_from_slice(&content);
    out
}

pub fn op_method(name: &str, arg_count: u8, body: Vec<u8>) -> Vec<u8> {
    assert!(arg_count <= 7);
    let mut content = name_string(name);
    content.push(arg_count & 0x07);
    content.extend_from_slice(&body);

    let mut out = vec![AML_OP_METHOD];
    out.extend_from_slice(&encode_pkg_length(content.len() + pkg_length_self_len(content.len())));
    out.extend_from_slice(&content);
    out
}

pub fn op_name(name: &str, value: Vec<u8>) -> Vec<u8> {
    let mut out = vec![AML_OP_NAME];
    out.extend_from_slice(&name_string(name));
    out.extend_from_slice(&value);
    out
}

pub fn op_package(elements: Vec<Vec<u8>>) -> Vec<u8> {
    assert!(elements.len() <= 255);
    let mut content = vec![elements.len() as u8];
    for el in elements {
        content.extend_from_slice(&el);
    }

    let mut out = vec![AML_OP_PACKAGE];
    out.extend_from_slice(&encode_pkg_length(content.len() + pkg_length_self_len(content.len())));
    out.extend_from_slice(&content);
    out
}

pub fn op_integer(value: u64) -> Vec<u8> {
    match value {
        0 => vec![AML_OP_ZERO],
        1 => vec![AML_OP_ONE],
        0..=0xFF => vec![AML_OP_BYTE_PREFIX, value as u8],
        0..=0xFFFF => {
            let mut out = vec![AML_OP_WORD_PREFIX];
            out.extend_from_slice(&(value as u16).to_le_bytes());
            out
        }
        0..=0xFFFF_FFFF => {
            let mut out = vec![AML_OP_DWORD_PREFIX];
            out.extend_from_slice(&(value as u32).to_le_bytes());
            out
        }
        _ => {
            let mut out = vec![AML_OP_QWORD_PREFIX];
            out.extend_from_slice(&value.to_le_bytes());
            out
        }
    }
}

/// Bytes the PkgLength field itself occupies once `content_len` content
/// bytes are included in the count. PkgLength counts itself, so the field
/// width must be fixed-pointed against the total.
fn pkg_length_self_len(content_len: usize) -> usize {
    for width in 1..=4usize {
        let total = content_len + width;
        let fits = match width {
            1 => total <= 0x3F,
            2 => total <= 0x0FFF,
            3 => total <= 0x000F_FFFF,
            _ => total <= 0x0FFF_FFFF,
        };
        if fits && encode_pkg_length(total).len() == width {
            return width;
        }
    }
    panic!("PkgLength content too large: {content_len}");
}
