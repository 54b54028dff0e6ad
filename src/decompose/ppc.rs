//! PowerPC decomposition.

use serde::Serialize;

use crate::DecodeSlot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PpcDetail {
    pub word: u32,
    /// Bits 0..5 (IBM numbering)
    pub primary_opcode: u8,
    /// XO field for primary opcodes 19 and 31
    pub extended_opcode: Option<u16>,
    /// LK bit of a branch
    pub link: bool,
}

pub(super) fn decompose(slot: &DecodeSlot) -> PpcDetail {
    let word = slot.word_at(0).unwrap_or_default();
    let primary_opcode = (word >> 26) as u8;
    let extended_opcode = matches!(primary_opcode, 19 | 31).then_some(((word >> 1) & 0x3ff) as u16);
    let is_branch = match (primary_opcode, extended_opcode) {
        (16 | 18, _) => true,
        // bclr / bcctr
        (19, Some(16 | 528)) => true,
        _ => false,
    };

    PpcDetail {
        word,
        primary_opcode,
        extended_opcode,
        link: is_branch && word & 1 != 0,
    }
}
