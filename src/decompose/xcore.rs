//! XCore decomposition.

use serde::Serialize;

use crate::DecodeSlot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XCoreDetail {
    /// First 16-bit half-word
    pub head: u16,
    /// Second half-word of a 32-bit instruction
    pub tail: Option<u16>,
}

impl XCoreDetail {
    pub fn is_long(&self) -> bool {
        self.tail.is_some()
    }
}

pub(super) fn decompose(slot: &DecodeSlot) -> XCoreDetail {
    XCoreDetail {
        head: slot.half_at(0).unwrap_or_default(),
        tail: if slot.size() == 4 { slot.half_at(2) } else { None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Endian, Mode};

    #[test]
    fn test_short_and_long() {
        let mut slot = DecodeSlot::new();
        slot.fill(0, &[0x34, 0x12], 0, "", "", Mode::Default, Endian::Little);
        let d = decompose(&slot);
        assert_eq!(d.head, 0x1234);
        assert!(!d.is_long());

        slot.fill(0, &[0x34, 0x12, 0x78, 0x56], 0, "", "", Mode::Default, Endian::Little);
        let d = decompose(&slot);
        assert_eq!(d.tail, Some(0x5678));
        assert!(d.is_long());
    }
}
