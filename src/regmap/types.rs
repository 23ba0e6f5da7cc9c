//! Register type classifications handed over by the type-flow pass.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Abstract type of one register at one address.
///
/// Only the split between reference-shaped and everything else matters for
/// register maps, but the classification is kept at the granularity the
/// type-flow pass works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegType {
    /// Never written on any path reaching this address.
    Unknown,
    /// Paths disagree about the type.
    Conflict,
    /// The constant zero, which can be either an int or a null reference.
    Zero,
    One,
    Boolean,
    Byte,
    Short,
    Char,
    Integer,
    Float,
    ConstLo,
    ConstHi,
    LongLo,
    LongHi,
    DoubleLo,
    DoubleHi,
    /// Result of `new-instance` before the constructor has run.
    Uninit,
    Reference,
}

impl RegType {
    /// Whether the register must be scanned by the GC.
    ///
    /// Uninitialized references are objects too; `Zero` is not, since it
    /// cannot point at anything.
    pub fn is_reference(self) -> bool {
        matches!(self, RegType::Reference | RegType::Uninit)
    }
}

/// Per-address register types, as produced by the type-flow pass.
pub trait RegisterLines {
    /// The type of every register at `addr`, or `None` if no line was kept
    /// for that address.
    fn line(&self, addr: usize) -> Option<&[RegType]>;
}

impl RegisterLines for BTreeMap<usize, Vec<RegType>> {
    fn line(&self, addr: usize) -> Option<&[RegType]> {
        self.get(&addr).map(Vec::as_slice)
    }
}

/// Packs a line into a bit vector, register 0 in the low bit of byte 0.
pub fn reference_bits(regs: &[RegType], reg_width: usize) -> Vec<u8> {
    let mut bits = vec![0u8; reg_width];
    for (i, reg) in regs.iter().enumerate().take(reg_width * 8) {
        if reg.is_reference() {
            bits[i >> 3] |= 1 << (i & 0x07);
        }
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_shapes() {
        assert!(RegType::Reference.is_reference());
        assert!(RegType::Uninit.is_reference());
        for t in [RegType::Zero, RegType::Conflict, RegType::Unknown, RegType::Integer, RegType::LongHi] {
            assert!(!t.is_reference(), "{:?}", t);
        }
    }

    #[test]
    fn packs_low_bit_first() {
        let mut regs = vec![RegType::Integer; 10];
        regs[0] = RegType::Reference;
        regs[3] = RegType::Uninit;
        regs[9] = RegType::Reference;
        assert_eq!(reference_bits(&regs, 2), vec![0b0000_1001, 0b0000_0010]);
    }

    #[test]
    fn lines_from_map() {
        let mut lines = BTreeMap::new();
        lines.insert(4usize, vec![RegType::Zero, RegType::Reference]);
        assert_eq!(lines.line(4), Some(&[RegType::Zero, RegType::Reference][..]));
        assert_eq!(lines.line(5), None);
    }
}
