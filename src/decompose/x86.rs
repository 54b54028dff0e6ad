//! x86 decomposition: prefixes, REX and opcode bytes.

use serde::Serialize;

use crate::{DecodeSlot, Mode};

const LEGACY_PREFIXES: [u8; 11] = [
    0xf0, 0xf2, 0xf3, // lock / repne / rep
    0x2e, 0x36, 0x3e, 0x26, 0x64, 0x65, // segment overrides
    0x66, 0x67, // operand / address size
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum X86Encoding {
    Legacy,
    Vex,
    Evex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct X86Detail {
    /// Legacy prefixes in encoding order
    pub prefixes: Vec<u8>,
    /// REX prefix (64-bit mode only)
    pub rex: Option<u8>,
    pub encoding: X86Encoding,
    /// Opcode bytes with the map escape spelled out (`0f`, `0f 38`, `0f 3a`)
    pub opcode: Vec<u8>,
}

impl X86Detail {
    pub fn has_lock(&self) -> bool {
        self.prefixes.contains(&0xf0)
    }

    pub fn operand_size_override(&self) -> bool {
        self.prefixes.contains(&0x66)
    }

    /// REX.W: 64-bit operand size.
    pub fn rex_w(&self) -> bool {
        self.rex.is_some_and(|rex| rex & 0x08 != 0)
    }
}

pub(super) fn decompose(slot: &DecodeSlot) -> X86Detail {
    let bytes = slot.bytes();
    let long_mode = slot.mode() == Some(Mode::Mode64);

    let mut pos = 0;
    let mut prefixes = Vec::new();
    while let Some(&b) = bytes.get(pos) {
        if !LEGACY_PREFIXES.contains(&b) {
            break;
        }
        prefixes.push(b);
        pos += 1;
    }

    let mut rex = None;
    if long_mode {
        if let Some(&b) = bytes.get(pos).filter(|b| (0x40..=0x4f).contains(*b)) {
            rex = Some(b);
            pos += 1;
        }
    }

    // Outside long mode C4/C5/62 are only VEX/EVEX when the next byte has mod == 11.
    let escape_ok = |at: usize| long_mode || bytes.get(at).is_some_and(|b| b & 0xc0 == 0xc0);
    let (encoding, opcode) = match bytes.get(pos) {
        Some(0xc5) if escape_ok(pos + 1) => (X86Encoding::Vex, vex_opcode(bytes, pos + 2, 1)),
        Some(0xc4) if escape_ok(pos + 1) => {
            let map = bytes.get(pos + 1).map_or(1, |b| b & 0x1f);
            (X86Encoding::Vex, vex_opcode(bytes, pos + 3, map))
        }
        Some(0x62) if escape_ok(pos + 1) => {
            let map = bytes.get(pos + 1).map_or(1, |b| b & 0x07);
            (X86Encoding::Evex, vex_opcode(bytes, pos + 4, map))
        }
        _ => (X86Encoding::Legacy, legacy_opcode(bytes, pos)),
    };

    X86Detail {
        prefixes,
        rex,
        encoding,
        opcode,
    }
}

fn legacy_opcode(bytes: &[u8], pos: usize) -> Vec<u8> {
    let len = match (bytes.get(pos), bytes.get(pos + 1)) {
        (Some(0x0f), Some(0x38 | 0x3a)) => 3,
        (Some(0x0f), _) => 2,
        _ => 1,
    };
    bytes.iter().skip(pos).take(len).copied().collect()
}

fn vex_opcode(bytes: &[u8], pos: usize, map: u8) -> Vec<u8> {
    let mut opcode = match map {
        2 => vec![0x0f, 0x38],
        3 => vec![0x0f, 0x3a],
        _ => vec![0x0f],
    };
    opcode.extend(bytes.get(pos).copied());
    opcode
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Endian;

    fn detail(bytes: &[u8], mode: Mode) -> X86Detail {
        let mut slot = DecodeSlot::new();
        slot.fill(0, bytes, 0, "", "", mode, Endian::Little);
        decompose(&slot)
    }

    #[test]
    fn test_rex_only_in_long_mode() {
        // mov rbp, rsp
        let d = detail(&[0x48, 0x89, 0xe5], Mode::Mode64);
        assert_eq!(d.rex, Some(0x48));
        assert!(d.rex_w());
        assert_eq!(d.opcode, vec![0x89]);

        // dec eax
        let d = detail(&[0x48], Mode::Mode32);
        assert_eq!(d.rex, None);
        assert_eq!(d.opcode, vec![0x48]);
    }

    #[test]
    fn test_prefixes_and_escape() {
        // lock cmpxchg [rcx], edx
        let d = detail(&[0xf0, 0x0f, 0xb1, 0x11], Mode::Mode64);
        assert!(d.has_lock());
        assert_eq!(d.opcode, vec![0x0f, 0xb1]);

        // pshufb xmm0, xmm1
        let d = detail(&[0x66, 0x0f, 0x38, 0x00, 0xc1], Mode::Mode64);
        assert!(d.operand_size_override());
        assert_eq!(d.opcode, vec![0x0f, 0x38, 0x00]);
    }

    #[test]
    fn test_vex() {
        // vzeroupper
        let d = detail(&[0xc5, 0xf8, 0x77], Mode::Mode64);
        assert_eq!(d.encoding, X86Encoding::Vex);
        assert_eq!(d.opcode, vec![0x0f, 0x77]);

        // les eax, [eax] in 32-bit mode is not VEX
        let d = detail(&[0xc4, 0x00], Mode::Mode32);
        assert_eq!(d.encoding, X86Encoding::Legacy);
        assert_eq!(d.opcode, vec![0xc4]);
    }
}
