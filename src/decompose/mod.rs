//! Per-architecture decomposition of raw decoded instructions.
//!
//! [`decompose`] is the single dispatch point both iterators use. It turns the
//! current contents of a [`DecodeSlot`] into an owned [`Instruction`] whose
//! [`ArchDetail`] carries fields pulled straight from the encoding.

mod arm;
mod arm64;
mod mips;
mod ppc;
mod sparc;
mod sysz;
mod x86;
mod xcore;

pub use self::arm::{ArmCondition, ArmDetail};
pub use self::arm64::{Arm64Detail, Arm64Group};
pub use self::mips::{MipsDetail, MipsFormat};
pub use self::ppc::PpcDetail;
pub use self::sparc::{SparcDetail, SparcFormat};
pub use self::sysz::SysZDetail;
pub use self::x86::{X86Detail, X86Encoding};
pub use self::xcore::XCoreDetail;

use std::fmt;

use serde::Serialize;

use crate::{Address, Architecture, DecodeError, DecodeSlot, MAX_INSTRUCTION_SIZE};

/// One decoded, architecture-tagged instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    /// Address of the instruction
    pub address: Address,
    /// Size of the instruction in bytes
    pub size: u8,
    /// Raw bytes of the instruction (up to MAX_INSTRUCTION_SIZE), 0-padded
    pub bytes: [u8; MAX_INSTRUCTION_SIZE],
    /// Engine-specific instruction id
    pub id: u32,
    /// Instruction mnemonic (e.g., "mov", "add")
    pub mnemonic: String,
    /// Instruction operands as string representation
    pub op_str: String,
    /// Fields decoded from the encoding
    pub detail: ArchDetail,
}

impl Instruction {
    /// Returns the instruction bytes, up to the actual instruction size.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.size as usize]
    }

    /// Address of the byte following this instruction.
    pub fn end_address(&self) -> Address {
        self.address.wrapping_add(self.size as Address)
    }

    pub fn architecture(&self) -> Architecture {
        self.detail.architecture()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.op_str.is_empty() {
            write!(f, "{}", self.mnemonic)
        } else {
            write!(f, "{}\t{}", self.mnemonic, self.op_str)
        }
    }
}

/// Architecture-specific view of an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "arch", rename_all = "lowercase")]
pub enum ArchDetail {
    Arm(ArmDetail),
    Arm64(Arm64Detail),
    Mips(MipsDetail),
    X86(X86Detail),
    Ppc(PpcDetail),
    SystemZ(SysZDetail),
    Sparc(SparcDetail),
    XCore(XCoreDetail),
}

impl ArchDetail {
    pub fn architecture(&self) -> Architecture {
        match self {
            ArchDetail::Arm(_) => Architecture::Arm,
            ArchDetail::Arm64(_) => Architecture::Arm64,
            ArchDetail::Mips(_) => Architecture::Mips,
            ArchDetail::X86(_) => Architecture::X86,
            ArchDetail::Ppc(_) => Architecture::Ppc,
            ArchDetail::SystemZ(_) => Architecture::SystemZ,
            ArchDetail::Sparc(_) => Architecture::Sparc,
            ArchDetail::XCore(_) => Architecture::XCore,
        }
    }
}

/// True if [`decompose`] has a decomposer for `arch`.
pub fn is_supported(arch: Architecture) -> bool {
    !matches!(arch, Architecture::Unknown)
}

/// Turn the slot's current instruction into an [`Instruction`] for `arch`.
///
/// Pure: the result depends only on `arch` and the slot contents.
pub fn decompose(arch: Architecture, slot: &DecodeSlot) -> Result<Instruction, DecodeError> {
    let detail = match arch {
        Architecture::Arm => ArchDetail::Arm(arm::decompose(slot)),
        Architecture::Arm64 => ArchDetail::Arm64(arm64::decompose(slot)),
        Architecture::Mips => ArchDetail::Mips(mips::decompose(slot)),
        Architecture::X86 => ArchDetail::X86(x86::decompose(slot)),
        Architecture::Ppc => ArchDetail::Ppc(ppc::decompose(slot)),
        Architecture::SystemZ => ArchDetail::SystemZ(sysz::decompose(slot)),
        Architecture::Sparc => ArchDetail::Sparc(sparc::decompose(slot)),
        Architecture::XCore => ArchDetail::XCore(xcore::decompose(slot)),
        Architecture::Unknown => return Err(DecodeError::UnsupportedArchitecture(arch)),
    };

    Ok(Instruction {
        address: slot.address(),
        size: slot.size() as u8,
        bytes: slot.raw_bytes(),
        id: slot.id(),
        mnemonic: slot.mnemonic().to_string(),
        op_str: slot.op_str().to_string(),
        detail,
    })
}
