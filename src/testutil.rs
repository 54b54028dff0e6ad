//! Deterministic decoders and byte sources for tests.

use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::{Architecture, Cursor, DecodeSlot, Decoder, Endian};

/// Encoding the fixed-width decoder refuses.
pub const INVALID_WORD: [u8; 4] = [0xff, 0xff, 0xff, 0xff];

/// Decodes little-endian 4-byte words; rejects [`INVALID_WORD`] and short tails.
///
/// Counters are shared so clones moved to other threads still report back.
#[derive(Debug, Clone)]
pub struct FixedWidthDecoder {
    arch: Architecture,
    acquired: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
    decodes: Arc<AtomicUsize>,
}

impl FixedWidthDecoder {
    pub fn new() -> Self {
        Self::with_architecture(Architecture::Mips)
    }

    pub fn with_architecture(arch: Architecture) -> Self {
        Self {
            arch,
            acquired: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
            decodes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

impl Decoder for FixedWidthDecoder {
    fn architecture(&self) -> Architecture {
        self.arch
    }

    fn new_slot(&self) -> DecodeSlot {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        DecodeSlot::new()
    }

    fn decode(&self, cursor: &mut Cursor<'_>, slot: &mut DecodeSlot) -> bool {
        let Some(word) = cursor.window().get(..4) else {
            return false;
        };
        if word == INVALID_WORD {
            return false;
        }
        self.decodes.fetch_add(1, Ordering::SeqCst);
        slot.fill(
            cursor.address(),
            word,
            u32::from(word[0]),
            "word",
            "",
            self.arch.default_mode(),
            Endian::Little,
        );
        cursor.advance(4);
        true
    }

    fn release(&self, _slot: &mut DecodeSlot) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// `count` valid words with distinct first bytes.
pub fn words(count: usize) -> Vec<u8> {
    (0..count)
        .flat_map(|i| [i as u8, 0x11, 0x22, 0x33])
        .collect()
}

/// Serves `data` at most `max_read` bytes per call and fails on read number
/// `fail_on` (1-based), if set.
pub struct ScriptedReader {
    data: Vec<u8>,
    pos: usize,
    max_read: usize,
    reads: usize,
    fail_on: Option<usize>,
}

impl ScriptedReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            max_read: usize::MAX,
            reads: 0,
            fail_on: None,
        }
    }

    pub fn trickle(mut self, max_read: usize) -> Self {
        self.max_read = max_read;
        self
    }

    pub fn fail_on(mut self, read: usize) -> Self {
        self.fail_on = Some(read);
        self
    }
}

impl Read for ScriptedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads += 1;
        if self.fail_on == Some(self.reads) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted failure"));
        }
        let n = buf.len().min(self.max_read).min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
