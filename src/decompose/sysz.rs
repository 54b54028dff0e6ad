//! SystemZ decomposition.

use serde::Serialize;

use crate::DecodeSlot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SysZDetail {
    /// First opcode byte
    pub opcode: u8,
    /// Instruction length code: the top two bits of the first byte
    pub ilc: u8,
}

impl SysZDetail {
    /// Length in bytes implied by the ILC.
    pub fn encoded_len(&self) -> usize {
        match self.ilc {
            0 => 2,
            1 | 2 => 4,
            _ => 6,
        }
    }
}

pub(super) fn decompose(slot: &DecodeSlot) -> SysZDetail {
    let opcode = slot.bytes().first().copied().unwrap_or_default();
    SysZDetail {
        opcode,
        ilc: opcode >> 6,
    }
}
