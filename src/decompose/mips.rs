//! MIPS decomposition.

use serde::Serialize;

use crate::DecodeSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MipsFormat {
    /// Register (`SPECIAL`, opcode 0)
    R,
    /// Immediate
    I,
    /// Jump (`j` / `jal`)
    J,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MipsDetail {
    pub word: u32,
    pub opcode: u8,
    pub format: MipsFormat,
    pub rs: u8,
    pub rt: u8,
    /// R-type only
    pub rd: Option<u8>,
    /// R-type only
    pub funct: Option<u8>,
}

pub(super) fn decompose(slot: &DecodeSlot) -> MipsDetail {
    let word = slot.word_at(0).unwrap_or_default();
    let opcode = (word >> 26) as u8;
    let format = match opcode {
        0 => MipsFormat::R,
        2 | 3 => MipsFormat::J,
        _ => MipsFormat::I,
    };
    let r_type = format == MipsFormat::R;

    MipsDetail {
        word,
        opcode,
        format,
        rs: ((word >> 21) & 0x1f) as u8,
        rt: ((word >> 16) & 0x1f) as u8,
        rd: r_type.then_some(((word >> 11) & 0x1f) as u8),
        funct: r_type.then_some((word & 0x3f) as u8),
    }
}
