//! Decode cursor: a byte window plus the address of its first byte.

use crate::Address;

/// The `(window, address)` pair a decoder advances in place.
///
/// The window always starts at the next byte to decode and `address` is that
/// byte's address, so after `n` bytes are consumed the window is `n` shorter
/// and the address `n` higher.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    window: &'a [u8],
    address: Address,
}

impl<'a> Cursor<'a> {
    /// Create a cursor over `window` whose first byte lives at `address`.
    pub fn new(window: &'a [u8], address: Address) -> Self {
        Self { window, address }
    }

    /// Bytes not yet consumed.
    pub fn window(&self) -> &'a [u8] {
        self.window
    }

    /// Address of the next byte.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Move past `count` bytes. Clamped to the window length.
    pub fn advance(&mut self, count: usize) {
        let count = count.min(self.window.len());
        self.window = &self.window[count..];
        self.address = self.address.wrapping_add(count as Address);
    }
}
