//! Stream-mode iteration: decode from a byte source read in fixed-size chunks.
//!
//! The source is read into a rolling [`Window`]. Each pass decodes as many
//! instructions as the filled region holds; whatever is left (an instruction
//! split across a chunk boundary) moves to the front of the window and the
//! next chunk is appended after it.

use std::io::{self, Read};

use serde::{Deserialize, Serialize};

use crate::decompose::{self, Instruction};
use crate::{Address, Architecture, Cursor, DecodeError, Decoder, SlotGuard, StopReason};

/// Default number of bytes requested from the source per refill.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Knobs for [`StreamIter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    /// Bytes requested per read; must be non-zero.
    pub chunk_size: usize,
    /// Drop an undecodable window and keep going instead of stopping.
    pub skip_undecodable: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            skip_undecodable: false,
        }
    }
}

impl StreamOptions {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.chunk_size == 0 {
            return Err(DecodeError::InvalidChunkSize(self.chunk_size));
        }
        Ok(())
    }
}

/// Fixed-capacity byte buffer whose first `filled` bytes are valid.
#[derive(Debug)]
pub struct Window {
    buf: Box<[u8]>,
    filled: usize,
}

impl Window {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity].into_boxed_slice(),
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of valid bytes, starting at offset 0.
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// The valid bytes.
    pub fn data(&self) -> &[u8] {
        &self.buf[..self.filled]
    }

    /// Up to `len` bytes of free space directly after the valid bytes.
    pub fn spare_mut(&mut self, len: usize) -> &mut [u8] {
        let end = (self.filled + len).min(self.buf.len());
        &mut self.buf[self.filled..end]
    }

    /// Mark `count` bytes of spare space as valid.
    pub fn commit(&mut self, count: usize) {
        assert!(self.filled + count <= self.buf.len(), "window overfilled");
        self.filled += count;
    }

    /// Move the bytes from `consumed` onwards to the front; returns how many moved.
    pub fn carry_over(&mut self, consumed: usize) -> usize {
        let consumed = consumed.min(self.filled);
        self.buf.copy_within(consumed..self.filled, 0);
        self.filled -= consumed;
        self.filled
    }

    pub fn clear(&mut self) {
        self.filled = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Refilling,
    Decoding,
    Terminated,
}

/// Lazily decodes instructions pulled from a [`Read`] source.
///
/// Bytes are requested `chunk_size` at a time. A read that comes back short
/// (end of source) or fails still has its bytes decoded, after which the
/// sequence ends and [`StreamIter::stop_reason`] records why.
pub struct StreamIter<'d, D: Decoder + ?Sized, R: Read> {
    guard: SlotGuard<'d, D>,
    source: R,
    window: Window,
    options: StreamOptions,
    max_insn_len: usize,
    /// Offset in the window of the next byte to decode.
    pos: usize,
    /// Address of the byte at `pos`.
    address: Address,
    state: State,
    /// Set once the source has stopped delivering full chunks.
    source_end: Option<StopReason>,
    yielded: usize,
    skipped: u64,
    stop: Option<StopReason>,
}

/// Start decoding `source` as if its first byte were loaded at `address`.
pub fn disasm_stream<'d, D: Decoder + ?Sized, R: Read>(
    decoder: &'d D,
    source: R,
    address: Address,
    options: StreamOptions,
) -> Result<StreamIter<'d, D, R>, DecodeError> {
    StreamIter::new(decoder, source, address, options)
}

impl<'d, D: Decoder + ?Sized, R: Read> StreamIter<'d, D, R> {
    /// Acquire a slot and size the window for the decoder's architecture.
    pub fn new(
        decoder: &'d D,
        source: R,
        address: Address,
        options: StreamOptions,
    ) -> Result<Self, DecodeError> {
        options.validate()?;
        Ok(Self::with_valid_options(decoder, source, address, options))
    }

    /// Same as [`StreamIter::new`] for options that already passed validation.
    pub(crate) fn with_valid_options(
        decoder: &'d D,
        source: R,
        address: Address,
        options: StreamOptions,
    ) -> Self {
        debug_assert!(options.validate().is_ok());
        let arch = decoder.architecture();
        let max_insn_len = arch.max_instruction_len();
        let window = Window::with_capacity(options.chunk_size + max_insn_len);
        log::debug!(
            "Starting {} stream iteration at 0x{:x} (chunk {} bytes, window {} bytes)",
            arch,
            address,
            options.chunk_size,
            window.capacity()
        );

        Self {
            guard: SlotGuard::acquire(decoder),
            source,
            window,
            options,
            max_insn_len,
            pos: 0,
            address,
            state: State::Refilling,
            source_end: None,
            yielded: 0,
            skipped: 0,
            stop: None,
        }
    }

    /// Address of the next byte to decode.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Why the sequence ended, or `None` while it is still live.
    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stop.as_ref()
    }

    /// Bytes dropped by `skip_undecodable` window resets.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped
    }

    pub fn window_capacity(&self) -> usize {
        self.window.capacity()
    }

    fn architecture(&self) -> Architecture {
        self.guard.decoder().architecture()
    }

    fn finish(&mut self, reason: StopReason) -> Option<Instruction> {
        log::debug!(
            "Stream iteration stopped after {} instructions at 0x{:x}: {}",
            self.yielded,
            self.address,
            reason
        );
        self.state = State::Terminated;
        self.stop = Some(reason);
        self.guard.release();
        None
    }

    fn refill(&mut self) {
        debug_assert!(self.window.filled() < self.window.capacity());
        let spare = self.window.spare_mut(self.options.chunk_size);
        let wanted = spare.len();
        let (read, err) = read_full(&mut self.source, spare);
        self.window.commit(read);
        self.pos = 0;

        if let Some(err) = err {
            log::warn!("Byte source failed at 0x{:x}: {}", self.address, err);
            self.source_end = Some(StopReason::from_io(&err));
        } else if read < wanted {
            self.source_end = Some(StopReason::Exhausted);
        }
        log::trace!(
            "Refilled window with {} bytes ({} carried over)",
            read,
            self.window.filled() - read
        );
        self.state = State::Decoding;
    }

    /// Decode failed with `leftover` bytes still in the window.
    fn end_of_pass(&mut self) {
        let leftover = self.window.filled() - self.pos;

        if let Some(end) = self.source_end.take() {
            let reason = match end {
                StopReason::Exhausted if leftover > 0 => StopReason::Malformed {
                    address: self.address,
                    remaining: leftover,
                },
                other => other,
            };
            self.finish(reason);
            return;
        }

        if leftover >= self.max_insn_len {
            if !self.options.skip_undecodable {
                let reason = StopReason::Malformed {
                    address: self.address,
                    remaining: leftover,
                };
                self.finish(reason);
                return;
            }
            log::warn!("Skipping {} undecodable bytes at 0x{:x}", leftover, self.address);
            self.address = self.address.wrapping_add(leftover as Address);
            self.skipped += leftover as u64;
            self.window.clear();
        } else {
            self.window.carry_over(self.pos);
        }
        self.pos = 0;
        self.state = State::Refilling;
    }
}

impl<D: Decoder + ?Sized, R: Read> Iterator for StreamIter<'_, D, R> {
    type Item = Instruction;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                State::Terminated => return None,
                State::Refilling => {
                    let arch = self.architecture();
                    if !decompose::is_supported(arch) {
                        return self.finish(StopReason::UnsupportedArchitecture(arch));
                    }
                    self.refill();
                }
                State::Decoding => {
                    if let Some(insn) = self.decode_next() {
                        return Some(insn);
                    }
                    if self.state == State::Decoding {
                        self.end_of_pass();
                    }
                }
            }
        }
    }
}

impl<D: Decoder + ?Sized, R: Read> StreamIter<'_, D, R> {
    /// One decode within the current window. `None` means this pass is over
    /// (or the sequence terminated).
    fn decode_next(&mut self) -> Option<Instruction> {
        let decoder = self.guard.decoder();
        let arch = decoder.architecture();
        let slot = self.guard.slot_mut()?;

        let mut cursor = Cursor::new(&self.window.data()[self.pos..], self.address);
        let before = cursor.len();
        if before == 0 || !decoder.decode(&mut cursor, slot) || cursor.len() == before {
            return None;
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

/// Read until `buf` is full, the source ends, or it fails.
///
/// Returns the byte count and the error, if any; `Interrupted` is retried.
fn read_full<R: Read>(source: &mut R, buf: &mut [u8]) -> (usize, Option<io::Error>) {
    let mut read = 0;
    while read < buf.len() {
        match source.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return (read, Some(err)),
        }
    }
    (read, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{words, FixedWidthDecoder, ScriptedReader, INVALID_WORD};
    use crate::disasm_iter;

    fn addresses<D: Decoder + ?Sized, R: Read>(it: &mut StreamIter<'_, D, R>) -> Vec<Address> {
        it.by_ref().map(|i| i.address).collect()
    }

    #[test]
    fn test_window_carry_over() {
        let mut window = Window::with_capacity(8);
        window.spare_mut(6).copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        window.commit(6);

        assert_eq!(window.carry_over(4), 2);
        assert_eq!(window.data(), &[5, 6]);
        assert_eq!(window.spare_mut(16).len(), 6);
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let decoder = FixedWidthDecoder::new();
        let err = disasm_stream(&decoder, io::empty(), 0, StreamOptions::with_chunk_size(0));
        assert!(matches!(err, Err(DecodeError::InvalidChunkSize(0))));
        assert_eq!(decoder.acquired(), 0);
    }

    #[test]
    fn test_window_sized_from_architecture() {
        let decoder = FixedWidthDecoder::with_architecture(Architecture::X86);
        let it = disasm_stream(&decoder, io::empty(), 0, StreamOptions::with_chunk_size(16)).unwrap();
        assert_eq!(it.window_capacity(), 16 + 15);
    }

    #[test]
    fn test_instruction_split_across_chunks() {
        let decoder = FixedWidthDecoder::new();
        // 6-byte chunks: every other word straddles a boundary.
        let mut it = disasm_stream(
            &decoder,
            ScriptedReader::new(words(6)),
            0x1000,
            StreamOptions::with_chunk_size(6),
        )
        .unwrap();

        assert_eq!(
            addresses(&mut it),
            vec![0x1000, 0x1004, 0x1008, 0x100c, 0x1010, 0x1014]
        );
        assert_eq!(it.stop_reason(), Some(&StopReason::Exhausted));
        assert_eq!(it.address(), 0x1018);
    }

    #[test]
    fn test_matches_buffer_mode() {
        let decoder = FixedWidthDecoder::new();
        let bytes = words(25);
        let expected: Vec<_> = disasm_iter(&decoder, &bytes, 0x8000).collect();

        for chunk in [4, 5, 7, 16, 100, 4096] {
            let got: Vec<_> = disasm_stream(
                &decoder,
                ScriptedReader::new(bytes.clone()).trickle(3),
                0x8000,
                StreamOptions::with_chunk_size(chunk),
            )
            .unwrap()
            .collect();
            assert_eq!(got, expected, "chunk size {}", chunk);
        }
    }

    #[test]
    fn test_trailing_partial_at_end_of_source() {
        let decoder = FixedWidthDecoder::new();
        let mut bytes = words(3);
        bytes.extend_from_slice(&[0xaa, 0xbb]);

        let mut it = disasm_stream(
            &decoder,
            ScriptedReader::new(bytes),
            0,
            StreamOptions::with_chunk_size(8),
        )
        .unwrap();

        assert_eq!(addresses(&mut it), vec![0, 4, 8]);
        assert_eq!(
            it.stop_reason(),
            Some(&StopReason::Malformed { address: 12, remaining: 2 })
        );
    }

    #[test]
    fn test_source_error_on_third_read() {
        let decoder = FixedWidthDecoder::new();
        let mut it = disasm_stream(
            &decoder,
            ScriptedReader::new(words(10)).fail_on(3),
            0,
            StreamOptions::with_chunk_size(8),
        )
        .unwrap();

        // Two full chunks of two words each, then the failing read.
        assert_eq!(addresses(&mut it), vec![0, 4, 8, 12]);
        match it.stop_reason() {
            Some(StopReason::SourceError { kind, .. }) => {
                assert_eq!(*kind, io::ErrorKind::BrokenPipe)
            }
            other => panic!("unexpected stop reason: {:?}", other),
        }
        assert_eq!(decoder.released(), 1);
    }

    #[test]
    fn test_partial_chunk_before_error_is_decoded() {
        let decoder = FixedWidthDecoder::new();
        // 8-byte chunks served 4 bytes at a time: the 4th read fails halfway
        // through the second chunk.
        let mut it = disasm_stream(
            &decoder,
            ScriptedReader::new(words(10)).trickle(4).fail_on(4),
            0,
            StreamOptions::with_chunk_size(8),
        )
        .unwrap();

        assert_eq!(addresses(&mut it), vec![0, 4, 8]);
        assert!(matches!(it.stop_reason(), Some(StopReason::SourceError { .. })));
    }

    #[test]
    fn test_malformed_window_stops_by_default() {
        let decoder = FixedWidthDecoder::new();
        let mut bytes = words(2);
        bytes.extend_from_slice(&INVALID_WORD);
        bytes.extend(words(2));

        let mut it = disasm_stream(
            &decoder,
            ScriptedReader::new(bytes),
            0,
            StreamOptions::with_chunk_size(4),
        )
        .unwrap();

        assert_eq!(addresses(&mut it), vec![0, 4]);
        assert_eq!(
            it.stop_reason(),
            Some(&StopReason::Malformed { address: 8, remaining: 4 })
        );
    }

    #[test]
    fn test_skip_undecodable_resets_window() {
        let decoder = FixedWidthDecoder::new();
        let mut bytes = words(2);
        bytes.extend_from_slice(&INVALID_WORD);
        bytes.extend(words(2));

        let options = StreamOptions {
            chunk_size: 4,
            skip_undecodable: true,
        };
        let mut it = disasm_stream(&decoder, ScriptedReader::new(bytes), 0, options).unwrap();

        assert_eq!(addresses(&mut it), vec![0, 4, 12, 16]);
        assert_eq!(it.skipped_bytes(), 4);
        assert_eq!(it.stop_reason(), Some(&StopReason::Exhausted));
    }

    #[test]
    fn test_unknown_architecture_reads_nothing() {
        let decoder = FixedWidthDecoder::with_architecture(Architecture::Unknown);
        let mut it = disasm_stream(
            &decoder,
            ScriptedReader::new(words(4)).fail_on(1),
            0,
            StreamOptions::default(),
        )
        .unwrap();

        assert!(it.next().is_none());
        assert_eq!(
            it.stop_reason(),
            Some(&StopReason::UnsupportedArchitecture(Architecture::Unknown))
        );
    }

    #[test]
    fn test_abandoned_stream_releases_slot() {
        let decoder = FixedWidthDecoder::new();
        let mut it = disasm_stream(
            &decoder,
            ScriptedReader::new(words(100)),
            0,
            StreamOptions::with_chunk_size(16),
        )
        .unwrap();

        assert!(it.next().is_some());
        drop(it);
        assert_eq!(decoder.acquired(), 1);
        assert_eq!(decoder.released(), 1);
    }
}
