//! The reusable decode slot and its scoped owner.

use std::fmt;

use crate::{Address, Decoder, Endian, Mode, MAX_INSTRUCTION_SIZE};

/// Space for one raw decoded instruction.
///
/// A session acquires one slot and overwrites it on every successful decode.
/// The string buffers are cleared and refilled rather than replaced, so once
/// they have grown to fit the longest mnemonic no further allocation happens.
#[derive(Debug, Clone, Default)]
pub struct DecodeSlot {
    address: Address,
    size: u8,
    bytes: [u8; MAX_INSTRUCTION_SIZE],
    id: u32,
    mnemonic: String,
    op_str: String,
    mode: Option<Mode>,
    endian: Endian,
}

impl DecodeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the slot with a freshly decoded instruction.
    ///
    /// Encodings longer than [`MAX_INSTRUCTION_SIZE`] are truncated.
    #[allow(clippy::too_many_arguments)]
    pub fn fill(
        &mut self,
        address: Address,
        encoding: &[u8],
        id: u32,
        mnemonic: &str,
        op_str: &str,
        mode: Mode,
        endian: Endian,
    ) {
        let len = encoding.len().min(MAX_INSTRUCTION_SIZE);
        self.address = address;
        self.size = len as u8;
        self.bytes = [0; MAX_INSTRUCTION_SIZE];
        self.bytes[..len].copy_from_slice(&encoding[..len]);
        self.id = id;
        self.mnemonic.clear();
        self.mnemonic.push_str(mnemonic);
        self.op_str.clear();
        self.op_str.push_str(op_str);
        self.mode = Some(mode);
        self.endian = endian;
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Encoded length in bytes.
    pub fn size(&self) -> usize {
        self.size as usize
    }

    /// The instruction's encoding.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.size as usize]
    }

    /// Zero-padded copy of the encoding.
    pub fn raw_bytes(&self) -> [u8; MAX_INSTRUCTION_SIZE] {
        self.bytes
    }

    /// Engine-specific instruction id.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn op_str(&self) -> &str {
        &self.op_str
    }

    /// Mode of the last decode; `None` if the slot was never filled.
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// True until the first successful decode.
    pub fn is_empty(&self) -> bool {
        self.mode.is_none()
    }

    /// Read a 16-bit value at `offset` in the slot's byte order.
    pub fn half_at(&self, offset: usize) -> Option<u16> {
        let raw: [u8; 2] = self.bytes().get(offset..offset + 2)?.try_into().ok()?;
        Some(match self.endian {
            Endian::Little => u16::from_le_bytes(raw),
            Endian::Big => u16::from_be_bytes(raw),
        })
    }

    /// Read a 32-bit value at `offset` in the slot's byte order.
    pub fn word_at(&self, offset: usize) -> Option<u32> {
        let raw: [u8; 4] = self.bytes().get(offset..offset + 4)?.try_into().ok()?;
        Some(match self.endian {
            Endian::Little => u32::from_le_bytes(raw),
            Endian::Big => u32::from_be_bytes(raw),
        })
    }
}

/// Owns a session's slot and hands it back to the decoder exactly once.
///
/// [`SlotGuard::release`] may be called as soon as a sequence ends; whatever
/// has not been released by then is released on drop.
pub struct SlotGuard<'d, D: Decoder + ?Sized> {
    decoder: &'d D,
    slot: Option<DecodeSlot>,
}

impl<'d, D: Decoder + ?Sized> SlotGuard<'d, D> {
    /// Acquire a slot from `decoder`.
    pub fn acquire(decoder: &'d D) -> Self {
        Self {
            decoder,
            slot: Some(decoder.new_slot()),
        }
    }

    pub fn decoder(&self) -> &'d D {
        self.decoder
    }

    /// The slot, or `None` once released.
    pub fn slot(&self) -> Option<&DecodeSlot> {
        self.slot.as_ref()
    }

    pub fn slot_mut(&mut self) -> Option<&mut DecodeSlot> {
        self.slot.as_mut()
    }

    pub fn is_released(&self) -> bool {
        self.slot.is_none()
    }

    /// Give the slot back to the decoder. Later calls do nothing.
    pub fn release(&mut self) {
        if let Some(mut slot) = self.slot.take() {
            self.decoder.release(&mut slot);
            log::trace!("Released decode slot for {}", self.decoder.architecture());
        }
    }
}

impl<D: Decoder + ?Sized> Drop for SlotGuard<'_, D> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<D: Decoder + ?Sized> fmt::Debug for SlotGuard<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotGuard")
            .field("architecture", &self.decoder.architecture())
            .field("released", &self.is_released())
            .finish()
    }
}
