//! ARM (A32 and Thumb) decomposition.

use serde::Serialize;

use crate::{DecodeSlot, Mode};

/// Condition field of an ARM instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArmCondition {
    Eq,
    Ne,
    Hs,
    Lo,
    Mi,
    Pl,
    Vs,
    Vc,
    Hi,
    Ls,
    Ge,
    Lt,
    Gt,
    Le,
    Al,
    /// `0b1111`: the unconditional instruction space
    Unconditional,
}

impl ArmCondition {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0xf {
            0x0 => ArmCondition::Eq,
            0x1 => ArmCondition::Ne,
            0x2 => ArmCondition::Hs,
            0x3 => ArmCondition::Lo,
            0x4 => ArmCondition::Mi,
            0x5 => ArmCondition::Pl,
            0x6 => ArmCondition::Vs,
            0x7 => ArmCondition::Vc,
            0x8 => ArmCondition::Hi,
            0x9 => ArmCondition::Ls,
            0xa => ArmCondition::Ge,
            0xb => ArmCondition::Lt,
            0xc => ArmCondition::Gt,
            0xd => ArmCondition::Le,
            0xe => ArmCondition::Al,
            _ => ArmCondition::Unconditional,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArmDetail {
    /// Full encoding; Thumb-2 pairs put the first half-word in the top 16 bits.
    pub word: u32,
    pub condition: ArmCondition,
    pub thumb: bool,
}

pub(super) fn decompose(slot: &DecodeSlot) -> ArmDetail {
    if slot.mode() != Some(Mode::Thumb) {
        let word = slot.word_at(0).unwrap_or_default();
        return ArmDetail {
            word,
            condition: ArmCondition::from_bits(word >> 28),
            thumb: false,
        };
    }

    let first = slot.half_at(0).unwrap_or_default();
    let word = match slot.half_at(2) {
        Some(second) if slot.size() == 4 => (u32::from(first) << 16) | u32::from(second),
        _ => u32::from(first),
    };
    // Only the 16-bit `b<cond>` carries its own condition; IT blocks are not tracked.
    let cond = u32::from(first >> 8) & 0xf;
    let condition = if slot.size() == 2 && first & 0xf000 == 0xd000 && cond < 0xe {
        ArmCondition::from_bits(cond)
    } else {
        ArmCondition::Al
    };

    ArmDetail {
        word,
        condition,
        thumb: true,
    }
}
