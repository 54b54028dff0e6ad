//! Buffer-mode iteration: decode a fully materialised byte buffer.

use crate::decompose::{self, Instruction};
use crate::{Address, Cursor, Decoder, SlotGuard, StopReason};

/// Lazily decodes instructions from an owned copy of a byte buffer.
///
/// Single pass: once [`Iterator::next`] has returned `None` it keeps doing so
/// and [`DisasmIter::stop_reason`] says why. The decode slot is released as
/// soon as the sequence ends, or when the iterator is dropped.
#[derive(Debug)]
pub struct DisasmIter<'d, D: Decoder + ?Sized> {
    guard: SlotGuard<'d, D>,
    buf: Box<[u8]>,
    pos: usize,
    address: Address,
    yielded: usize,
    stop: Option<StopReason>,
}

/// Start decoding `bytes` as if they were loaded at `address`.
pub fn disasm_iter<'d, D: Decoder + ?Sized>(
    decoder: &'d D,
    bytes: &[u8],
    address: Address,
) -> DisasmIter<'d, D> {
    DisasmIter::new(decoder, bytes, address)
}

impl<'d, D: Decoder + ?Sized> DisasmIter<'d, D> {
    /// Copy `bytes` and acquire a decode slot from `decoder`.
    pub fn new(decoder: &'d D, bytes: &[u8], address: Address) -> Self {
        log::debug!(
            "Starting {} buffer iteration over {} bytes at 0x{:x}",
            decoder.architecture(),
            bytes.len(),
            address
        );
        Self {
            guard: SlotGuard::acquire(decoder),
            buf: bytes.into(),
            pos: 0,
            address,
            yielded: 0,
            stop: None,
        }
    }

    /// Address of the next byte to decode.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Bytes not yet consumed by a decoded instruction.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Why the sequence ended, or `None` while it is still live.
    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stop.as_ref()
    }

    fn finish(&mut self, reason: StopReason) -> Option<Instruction> {
        log::debug!(
            "Buffer iteration stopped after {} instructions: {}",
            self.yielded,
            reason
        );
        self.stop = Some(reason);
        self.guard.release();
        None
    }
}

impl<D: Decoder + ?Sized> Iterator for DisasmIter<'_, D> {
    type Item = Instruction;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stop.is_some() {
            return None;
        }

        let decoder = self.guard.decoder();
        let arch = decoder.architecture();
        if !decompose::is_supported(arch) {
            return self.finish(StopReason::UnsupportedArchitecture(arch));
        }
        if self.pos == self.buf.len() {
            return self.finish(StopReason::Exhausted);
        }

        let Some(slot) = self.guard.slot_mut() else {
            return None;
        };
        let mut cursor = Cursor::new(&self.buf[self.pos..], self.address);
        let before = cursor.len();
        if !decoder.decode(&mut cursor, slot) || cursor.len() == before {
            let reason = StopReason::Malformed {
                address: self.address,
                remaining: self.remaining(),
            };
            return self.finish(reason);
        }

        self.pos += before - cursor.len();
        self.address = cursor.address();

        match decompose::decompose(arch, slot) {
            Ok(insn) => {
                log::trace!("0x{:x}: {}", insn.address, insn);
                self.yielded += 1;
                Some(insn)
            }
            Err(_) => self.finish(StopReason::UnsupportedArchitecture(arch)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{words, FixedWidthDecoder, INVALID_WORD};
    use crate::Architecture;

    #[test]
    fn test_yields_every_word_then_exhausts() {
        let decoder = FixedWidthDecoder::new();
        let bytes = words(3);
        let mut it = disasm_iter(&decoder, &bytes, 0x1000);

        let addrs: Vec<_> = it.by_ref().map(|i| i.address).collect();
        assert_eq!(addrs, vec![0x1000, 0x1004, 0x1008]);
        assert_eq!(it.stop_reason(), Some(&StopReason::Exhausted));
        assert_eq!(it.address(), 0x100c);
        assert_eq!(it.remaining(), 0);
        assert!(it.next().is_none());
    }

    #[test]
    fn test_stops_at_invalid_bytes() {
        let decoder = FixedWidthDecoder::new();
        let mut bytes = words(2);
        bytes.extend_from_slice(&INVALID_WORD);
        bytes.extend(words(1));

        let mut it = disasm_iter(&decoder, &bytes, 0);
        assert_eq!(it.by_ref().count(), 2);
        assert_eq!(
            it.stop_reason(),
            Some(&StopReason::Malformed { address: 8, remaining: 8 })
        );
    }

    #[test]
    fn test_trailing_partial_instruction() {
        let decoder = FixedWidthDecoder::new();
        let mut bytes = words(1);
        bytes.extend_from_slice(&[0x01, 0x02]);

        let mut it = disasm_iter(&decoder, &bytes, 0x40);
        assert_eq!(it.by_ref().count(), 1);
        assert_eq!(
            it.stop_reason(),
            Some(&StopReason::Malformed { address: 0x44, remaining: 2 })
        );
    }

    #[test]
    fn test_unknown_architecture_yields_nothing() {
        let decoder = FixedWidthDecoder::with_architecture(Architecture::Unknown);
        let bytes = words(4);
        let mut it = disasm_iter(&decoder, &bytes, 0);

        assert!(it.next().is_none());
        assert_eq!(
            it.stop_reason(),
            Some(&StopReason::UnsupportedArchitecture(Architecture::Unknown))
        );
        assert_eq!(decoder.decodes(), 0);
        assert_eq!(decoder.released(), 1);
    }

    #[test]
    fn test_empty_buffer() {
        let decoder = FixedWidthDecoder::new();
        let mut it = disasm_iter(&decoder, &[], 0);
        assert!(it.next().is_none());
        assert_eq!(it.stop_reason(), Some(&StopReason::Exhausted));
    }

    #[test]
    fn test_caller_buffer_can_change_after_start() {
        let decoder = FixedWidthDecoder::new();
        let mut bytes = words(2);
        let mut it = disasm_iter(&decoder, &bytes, 0);
        bytes.fill(0xff);

        assert_eq!(it.next().unwrap().bytes(), &[0x00, 0x11, 0x22, 0x33]);
        assert_eq!(it.next().unwrap().bytes(), &[0x01, 0x11, 0x22, 0x33]);
    }

    #[test]
    fn test_slot_released_once_on_exhaustion() {
        let decoder = FixedWidthDecoder::new();
        let bytes = words(2);
        {
            let mut it = disasm_iter(&decoder, &bytes, 0);
            assert_eq!(it.by_ref().count(), 2);
            assert_eq!(decoder.released(), 1);
        }
        assert_eq!(decoder.acquired(), 1);
        assert_eq!(decoder.released(), 1);
    }

    #[test]
    fn test_slot_released_on_abandon() {
        let decoder = FixedWidthDecoder::new();
        let bytes = words(8);
        let mut it = disasm_iter(&decoder, &bytes, 0);

        assert!(it.next().is_some());
        assert_eq!(decoder.released(), 0);
        drop(it);
        assert_eq!(decoder.released(), 1);
    }
}
