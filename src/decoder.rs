//! Capstone-backed decode primitive for all supported ISAs.

use std::ffi::CStr;
use std::fmt;
use std::ptr::NonNull;

use capstone::Arch;
use capstone_sys::{
    cs_close, cs_disasm_iter, cs_err, cs_free, cs_insn, cs_malloc, cs_mode, cs_open, csh,
};

use crate::{
    Architecture, Cursor, DecodeError, DecodeSlot, Decoder, DecoderConfig, Endian, Mode,
};

/// An open engine handle plus the one instruction buffer it decodes into.
struct Engine {
    handle: csh,
    insn: NonNull<cs_insn>,
}

impl Engine {
    fn open(arch: Arch, mode: capstone::Mode, endian: capstone::Endian) -> Result<Self, DecodeError> {
        let mut handle: csh = 0;
        let mode = cs_mode::from(mode) | cs_mode::from(endian);
        let err = unsafe { cs_open(arch.into(), mode, &mut handle) };
        if err != cs_err::CS_ERR_OK {
            return Err(capstone::Error::from(err).into());
        }

        match NonNull::new(unsafe { cs_malloc(handle) }) {
            Some(insn) => Ok(Self { handle, insn }),
            None => {
                unsafe { cs_close(&mut handle) };
                Err(capstone::Error::OutOfMemory.into())
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        unsafe {
            cs_free(self.insn.as_ptr(), 1);
            cs_close(&mut self.handle);
        }
    }
}

/// A Capstone handle bound to one architecture, mode and byte order.
///
/// The instruction buffer is allocated once when the decoder is opened and
/// overwritten by every [`Decoder::decode`] call, so decoding itself never
/// allocates.
pub struct CapstoneDecoder {
    engine: Engine,
    arch: Architecture,
    tag: Architecture,
    mode: Mode,
    endian: Endian,
}

// SAFETY: the decoder exclusively owns its engine handle and instruction
// buffer and is never shared between threads (it is not `Sync`), so moving it
// to a worker thread is fine.
unsafe impl Send for CapstoneDecoder {}

impl CapstoneDecoder {
    /// Create a decoder for `arch` using its default mode and byte order.
    pub fn for_architecture(arch: Architecture) -> Result<Self, DecodeError> {
        Self::new(arch, arch.default_mode(), arch.default_endian())
    }

    /// Create a decoder for an explicit architecture, mode and byte order.
    pub fn new(arch: Architecture, mode: Mode, endian: Endian) -> Result<Self, DecodeError> {
        let cs_arch = cs_arch(arch).ok_or(DecodeError::UnsupportedArchitecture(arch))?;
        let cs_endian = match endian {
            Endian::Little => capstone::Endian::Little,
            Endian::Big => capstone::Endian::Big,
        };
        let engine = Engine::open(cs_arch, cs_mode_of(mode), cs_endian)?;
        log::debug!("Opened Capstone handle for {} ({:?}, {:?})", arch, mode, endian);

        Ok(Self {
            engine,
            arch,
            tag: arch,
            mode,
            endian,
        })
    }

    /// Build from configuration, falling back to per-architecture defaults.
    pub fn from_config(config: &DecoderConfig) -> Result<Self, DecodeError> {
        Self::new(config.arch, config.mode(), config.endian())
    }

    /// Report `tag` to the decomposer instead of the engine's own architecture.
    ///
    /// Decoding still uses the underlying engine. Useful for routing the
    /// output of a live engine through a different (or no) decomposer.
    pub fn with_tag(mut self, tag: Architecture) -> Self {
        self.tag = tag;
        self
    }

    /// Architecture the engine was opened for.
    pub fn engine_architecture(&self) -> Architecture {
        self.arch
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }
}

impl fmt::Debug for CapstoneDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapstoneDecoder")
            .field("arch", &self.arch)
            .field("tag", &self.tag)
            .field("mode", &self.mode)
            .field("endian", &self.endian)
            .finish()
    }
}

impl fmt::Display for CapstoneDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapstoneDecoder::{}", self.arch)
    }
}

impl Decoder for CapstoneDecoder {
    fn architecture(&self) -> Architecture {
        self.tag
    }

    fn decode(&self, cursor: &mut Cursor<'_>, slot: &mut DecodeSlot) -> bool {
        if cursor.is_empty() {
            return false;
        }

        let window = cursor.window();
        let mut code = window.as_ptr();
        let mut size = window.len();
        let mut address = cursor.address();
        // SAFETY: `code`/`size` describe the live window and the buffer came
        // from `cs_malloc` on this handle; the engine is only driven from one
        // thread at a time because the decoder is not `Sync`.
        let decoded = unsafe {
            cs_disasm_iter(
                self.engine.handle,
                &mut code,
                &mut size,
                &mut address,
                self.engine.insn.as_ptr(),
            )
        };
        if !decoded {
            log::trace!("Capstone rejected bytes at 0x{:x}", cursor.address());
            return false;
        }

        // SAFETY: a successful `cs_disasm_iter` leaves a fully written
        // instruction in the buffer, which nothing else touches until the
        // next decode on this decoder.
        let insn = unsafe { self.engine.insn.as_ref() };
        let len = insn.size as usize;
        // Capstone only ever starts at the address it was given.
        if insn.address != cursor.address()
            || len == 0
            || len > window.len()
            || len > insn.bytes.len()
        {
            return false;
        }

        let mnemonic = unsafe { CStr::from_ptr(insn.mnemonic.as_ptr()) };
        let op_str = unsafe { CStr::from_ptr(insn.op_str.as_ptr()) };
        slot.fill(
            insn.address,
            &insn.bytes[..len],
            insn.id,
            mnemonic.to_str().unwrap_or(""),
            op_str.to_str().unwrap_or(""),
            self.mode,
            self.endian,
        );
        cursor.advance(len);
        true
    }
}

fn cs_arch(arch: Architecture) -> Option<Arch> {
    Some(match arch {
        Architecture::Arm => Arch::ARM,
        Architecture::Arm64 => Arch::ARM64,
        Architecture::Mips => Arch::MIPS,
        Architecture::X86 => Arch::X86,
        Architecture::Ppc => Arch::PPC,
        Architecture::SystemZ => Arch::SYSZ,
        Architecture::Sparc => Arch::SPARC,
        Architecture::XCore => Arch::XCORE,
        Architecture::Unknown => return None,
    })
}

fn cs_mode_of(mode: Mode) -> capstone::Mode {
    match mode {
        Mode::Default => capstone::Mode::Default,
        Mode::Arm => capstone::Mode::Arm,
        Mode::Thumb => capstone::Mode::Thumb,
        Mode::Mode16 => capstone::Mode::Mode16,
        Mode::Mode32 => capstone::Mode::Mode32,
        Mode::Mode64 => capstone::Mode::Mode64,
        Mode::Mips32 => capstone::Mode::Mips32,
        Mode::Mips64 => capstone::Mode::Mips64,
        Mode::V9 => capstone::Mode::V9,
    }
}
