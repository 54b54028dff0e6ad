//! Incremental, multi-architecture instruction decoding for the Nuclide toolkit.
//!
//! The crate advances a cursor through machine code one instruction at a time,
//! reusing a single decode slot for the whole session, and hands each decoded
//! instruction to a per-architecture decomposer. Two front-ends are provided:
//!
//! * [`DisasmIter`] walks a fully materialised byte buffer.
//! * [`StreamIter`] pulls fixed-size chunks from any [`std::io::Read`] and
//!   carries undecoded tail bytes over to the next chunk.
//!
//! Both are plain [`Iterator`]s. When a sequence ends, [`StopReason`] tells the
//! caller *why* it ended.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use nuclide_iter::{decoder::CapstoneDecoder, disasm_iter, Architecture, StopReason};
//!
//! let decoder = CapstoneDecoder::for_architecture(Architecture::X86).unwrap();
//! let code = [0x55, 0x48, 0x89, 0xe5, 0xc3];
//!
//! let mut insns = disasm_iter(&decoder, &code, 0x1000);
//! for insn in insns.by_ref() {
//!     println!("0x{:x}: {}", insn.address, insn);
//! }
//! assert_eq!(insns.stop_reason(), Some(&StopReason::Exhausted));
//! ```

pub mod config;
pub mod cursor;
pub mod decoder;
pub mod decompose;
pub mod handoff;
pub mod iter;
pub mod slot;
pub mod stream;
#[cfg(test)]
mod testutil;

use std::fmt;
use std::io;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use crate::config::DecoderConfig;
pub use crate::cursor::Cursor;
pub use crate::decompose::{decompose, ArchDetail, Instruction};
pub use crate::iter::{disasm_iter, DisasmIter};
pub use crate::slot::{DecodeSlot, SlotGuard};
pub use crate::stream::{disasm_stream, StreamIter, StreamOptions};

/// Represents an address in memory
pub type Address = u64;

/// Maximum instruction size in bytes
pub const MAX_INSTRUCTION_SIZE: usize = 16;

/// Supported instruction-set architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Architecture {
    /// ARM (32-bit, ARM or Thumb encoding)
    Arm,
    /// AArch64
    #[serde(alias = "aarch64")]
    #[value(alias = "aarch64")]
    Arm64,
    /// MIPS
    Mips,
    /// x86 (16, 32 or 64-bit)
    #[serde(alias = "x86_64", alias = "amd64")]
    #[value(alias = "x86_64")]
    X86,
    /// PowerPC
    #[serde(alias = "powerpc")]
    #[value(alias = "powerpc")]
    Ppc,
    /// IBM System z
    #[serde(alias = "sysz", alias = "s390x")]
    #[value(name = "systemz", alias = "sysz")]
    SystemZ,
    /// SPARC
    Sparc,
    /// XMOS XCore
    #[value(name = "xcore")]
    XCore,
    /// Unknown architecture
    #[value(skip)]
    Unknown,
}

impl Architecture {
    /// All architectures the decomposition table covers.
    pub fn supported() -> &'static [Architecture] {
        &[
            Architecture::Arm,
            Architecture::Arm64,
            Architecture::Mips,
            Architecture::X86,
            Architecture::Ppc,
            Architecture::SystemZ,
            Architecture::Sparc,
            Architecture::XCore,
        ]
    }

    /// Upper bound on the byte length of a single encoded instruction.
    ///
    /// The streaming window is sized from this so that an instruction split
    /// across two chunks always fits once the next chunk arrives.
    pub fn max_instruction_len(&self) -> usize {
        match self {
            Architecture::X86 => 15,
            Architecture::SystemZ => 6,
            Architecture::Arm
            | Architecture::Arm64
            | Architecture::Mips
            | Architecture::Ppc
            | Architecture::Sparc
            | Architecture::XCore => 4,
            Architecture::Unknown => MAX_INSTRUCTION_SIZE,
        }
    }

    /// Mode used when none is configured.
    pub fn default_mode(&self) -> Mode {
        match self {
            Architecture::Arm => Mode::Arm,
            Architecture::Arm64 => Mode::Arm,
            Architecture::Mips => Mode::Mips32,
            Architecture::X86 => Mode::Mode64,
            Architecture::Ppc => Mode::Mode32,
            Architecture::SystemZ
            | Architecture::Sparc
            | Architecture::XCore
            | Architecture::Unknown => Mode::Default,
        }
    }

    /// Byte order used when none is configured.
    pub fn default_endian(&self) -> Endian {
        match self {
            Architecture::Ppc | Architecture::SystemZ | Architecture::Sparc => Endian::Big,
            _ => Endian::Little,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::Arm => write!(f, "ARM"),
            Architecture::Arm64 => write!(f, "ARM64"),
            Architecture::Mips => write!(f, "MIPS"),
            Architecture::X86 => write!(f, "x86"),
            Architecture::Ppc => write!(f, "PowerPC"),
            Architecture::SystemZ => write!(f, "SystemZ"),
            Architecture::Sparc => write!(f, "SPARC"),
            Architecture::XCore => write!(f, "XCore"),
            Architecture::Unknown => write!(f, "Unknown"),
        }
    }
}

impl FromStr for Architecture {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "arm" | "armv7" => Architecture::Arm,
            "arm64" | "aarch64" => Architecture::Arm64,
            "mips" | "mips32" | "mips64" => Architecture::Mips,
            "x86" | "i386" | "x86_64" | "amd64" => Architecture::X86,
            "ppc" | "powerpc" | "ppc32" | "ppc64" => Architecture::Ppc,
            "systemz" | "sysz" | "s390x" => Architecture::SystemZ,
            "sparc" | "sparcv9" => Architecture::Sparc,
            "xcore" => Architecture::XCore,
            _ => return Err(DecodeError::Config(format!("unknown architecture: {}", s))),
        })
    }
}

/// Decoding mode within an architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The architecture's only (or default) mode
    Default,
    /// 32-bit ARM encoding (also the AArch64 mode)
    Arm,
    /// Thumb / Thumb-2 encoding
    Thumb,
    /// 16-bit x86
    Mode16,
    /// 32-bit x86 / PowerPC
    Mode32,
    /// 64-bit x86 / PowerPC
    Mode64,
    /// MIPS32
    Mips32,
    /// MIPS64
    Mips64,
    /// SPARC V9
    V9,
}

/// Byte order of the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// The decode primitive: one instruction at the cursor, or nothing.
///
/// Implementations are bound to a single [`Architecture`] for their whole
/// lifetime. On success the slot holds exactly one instruction and the cursor
/// has moved past it; on failure neither is touched and the caller must stop.
pub trait Decoder {
    /// Architecture tag used to pick a decomposer.
    fn architecture(&self) -> Architecture;

    /// Acquire the slot a session reuses for every decode call.
    fn new_slot(&self) -> DecodeSlot {
        DecodeSlot::new()
    }

    /// Decode one instruction at `cursor` into `slot`.
    fn decode(&self, cursor: &mut Cursor<'_>, slot: &mut DecodeSlot) -> bool;

    /// Called exactly once per acquired slot when its session ends.
    fn release(&self, _slot: &mut DecodeSlot) {}
}

/// Why an instruction sequence ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Every byte was consumed by a decoded instruction.
    Exhausted,
    /// Bytes remain at `address` that the decoder would not accept, either
    /// because they are invalid or because there are too few of them.
    Malformed { address: Address, remaining: usize },
    /// The architecture tag has no decomposer.
    UnsupportedArchitecture(Architecture),
    /// The byte source failed.
    SourceError { kind: io::ErrorKind, message: String },
}

impl StopReason {
    /// True for the clean end-of-input case.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, StopReason::Exhausted)
    }

    pub(crate) fn from_io(err: &io::Error) -> Self {
        StopReason::SourceError {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Exhausted => write!(f, "input exhausted"),
            StopReason::Malformed { address, remaining } => {
                write!(f, "{} undecodable byte(s) at 0x{:x}", remaining, address)
            }
            StopReason::UnsupportedArchitecture(arch) => {
                write!(f, "unsupported architecture: {}", arch)
            }
            StopReason::SourceError { message, .. } => write!(f, "byte source failed: {}", message),
        }
    }
}

/// Error type for decoder construction and configuration
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Capstone error
    #[error("Capstone error: {0}")]
    Capstone(#[from] capstone::Error),

    /// Unsupported architecture
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(Architecture),

    /// Stream chunk size of zero
    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    /// Bad configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
