//! AArch64 decomposition.

use serde::Serialize;

use crate::DecodeSlot;

/// Top-level encoding group selected by bits 28..25.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Arm64Group {
    Reserved,
    Unallocated,
    Sve,
    DataProcessingImmediate,
    BranchExceptionSystem,
    LoadStore,
    DataProcessingRegister,
    DataProcessingSimdFp,
}

impl Arm64Group {
    pub fn from_word(word: u32) -> Self {
        match (word >> 25) & 0xf {
            0b0000 => Arm64Group::Reserved,
            0b0010 => Arm64Group::Sve,
            0b1000 | 0b1001 => Arm64Group::DataProcessingImmediate,
            0b1010 | 0b1011 => Arm64Group::BranchExceptionSystem,
            0b0100 | 0b0110 | 0b1100 | 0b1110 => Arm64Group::LoadStore,
            0b0101 | 0b1101 => Arm64Group::DataProcessingRegister,
            0b0111 | 0b1111 => Arm64Group::DataProcessingSimdFp,
            _ => Arm64Group::Unallocated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Arm64Detail {
    pub word: u32,
    pub group: Arm64Group,
}

pub(super) fn decompose(slot: &DecodeSlot) -> Arm64Detail {
    let word = slot.word_at(0).unwrap_or_default();
    Arm64Detail {
        word,
        group: Arm64Group::from_word(word),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups() {
        assert_eq!(Arm64Group::from_word(0xd503_201f), Arm64Group::BranchExceptionSystem); // nop
        assert_eq!(Arm64Group::from_word(0xd65f_03c0), Arm64Group::BranchExceptionSystem); // ret
        assert_eq!(Arm64Group::from_word(0xd280_0020), Arm64Group::DataProcessingImmediate); // mov x0, #1
        assert_eq!(Arm64Group::from_word(0xf940_0020), Arm64Group::LoadStore); // ldr x0, [x1]
        assert_eq!(Arm64Group::from_word(0x8b02_0020), Arm64Group::DataProcessingRegister); // add x0, x1, x2
        assert_eq!(Arm64Group::from_word(0x1e22_2820), Arm64Group::DataProcessingSimdFp); // fadd s0, s1, s2
    }
}
