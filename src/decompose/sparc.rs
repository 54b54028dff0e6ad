//! SPARC decomposition.

use serde::Serialize;

use crate::DecodeSlot;

/// Instruction format selected by the `op` field (bits 31..30).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SparcFormat {
    /// op = 0: branches and `sethi`
    BranchSethi,
    /// op = 1
    Call,
    /// op = 2
    Arithmetic,
    /// op = 3
    LoadStore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SparcDetail {
    pub word: u32,
    pub format: SparcFormat,
    /// Destination register; not present for `call`
    pub rd: Option<u8>,
    /// Format 2 only
    pub op2: Option<u8>,
    /// Format 3 only
    pub op3: Option<u8>,
}

pub(super) fn decompose(slot: &DecodeSlot) -> SparcDetail {
    let word = slot.word_at(0).unwrap_or_default();
    let format = match word >> 30 {
        0 => SparcFormat::BranchSethi,
        1 => SparcFormat::Call,
        2 => SparcFormat::Arithmetic,
        _ => SparcFormat::LoadStore,
    };
    let rd = ((word >> 25) & 0x1f) as u8;

    let (rd, op2, op3) = match format {
        SparcFormat::Call => (None, None, None),
        SparcFormat::BranchSethi => (Some(rd), Some(((word >> 22) & 0x7) as u8), None),
        SparcFormat::Arithmetic | SparcFormat::LoadStore => {
            (Some(rd), None, Some(((word >> 19) & 0x3f) as u8))
        }
    };

    SparcDetail {
        word,
        format,
        rd,
        op2,
        op3,
    }
}
