//! Address decoders (§4.3): the active mapping `[as_begin, as_end] -> (chip,
//! chip_begin)`, plus the two specializations — the bank switcher and the
//! bit-bander.

use crate::chip::ChipId;
use crate::{Addr, Word};

/// Arena index for a decoder, owned by the [`crate::Mcu`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecoderId(pub usize);

/// A decoder's specialization. Re-expressed as a sum type (§9 "Deep
/// inheritance") rather than a `Decoder -> Banker, BitBander` class
/// hierarchy.
#[derive(Debug, Clone)]
pub enum DecoderKind {
    /// Linear mapping straight onto a chip.
    Plain,
    /// Chip selection is controlled at run time by a banker cell.
    Banker(Banker),
    /// Maps each addressed word onto one bit of a target chip slot.
    BitBander(BitBander),
}

/// An active (or formerly-active) decoder covering `[as_begin, as_end]` of
/// its space.
#[derive(Debug, Clone)]
pub struct Decoder {
    pub as_begin: Addr,
    pub as_end: Addr,
    /// `None` only for a banker decoder before its first `activate`.
    pub chip: Option<ChipId>,
    pub chip_begin: Addr,
    pub active: bool,
    pub kind: DecoderKind,
}

impl Decoder {
    #[must_use]
    pub fn plain(as_begin: Addr, as_end: Addr, chip: ChipId, chip_begin: Addr) -> Self {
        Self {
            as_begin,
            as_end,
            chip: Some(chip),
            chip_begin,
            active: true,
            kind: DecoderKind::Plain,
        }
    }

    #[must_use]
    pub fn as_to_chip(&self, addr: Addr) -> Addr {
        addr - self.as_begin + self.chip_begin
    }

    #[must_use]
    pub fn chip_to_as(&self, addr: Addr) -> Addr {
        addr - self.chip_begin + self.as_begin
    }

    #[must_use]
    pub fn is_banker(&self) -> bool {
        matches!(self.kind, DecoderKind::Banker(_))
    }

    #[must_use]
    pub fn is_bitbander(&self) -> bool {
        matches!(self.kind, DecoderKind::BitBander(_))
    }

    /// §8 invariant 1/2 helpers: does `[begin,end]` overlap this decoder at all?
    #[must_use]
    pub fn overlaps(&self, begin: Addr, end: Addr) -> bool {
        self.as_begin <= end && begin <= self.as_end
    }

    /// True if `self` is entirely inside `[begin,end]` (so it is retired
    /// when `[begin,end]` activates).
    #[must_use]
    pub fn fully_covered_by(&self, begin: Addr, end: Addr) -> bool {
        begin <= self.as_begin && self.as_end <= end
    }

    /// True if `self` strictly contains `[begin,end]` with room on both
    /// sides, i.e. activating `[begin,end]` punches a hole requiring a
    /// split.
    #[must_use]
    pub fn covers(&self, begin: Addr, end: Addr) -> bool {
        self.as_begin < begin && end < self.as_end
    }
}

/// Per-bank chip binding for a [`Banker`] decoder.
#[derive(Debug, Clone, Copy)]
pub struct BankTarget {
    pub chip: ChipId,
    pub chip_begin: Addr,
}

/// Bank-switch configuration for a banker decoder (§4.3, §4.6-style
/// register-driven bank selection).
#[derive(Debug, Clone)]
pub struct Banker {
    /// The control cell whose value selects the active bank.
    pub banker_cell: crate::cell::CellRef,
    pub mask: Word,
    pub shift: u32,
    pub banks: Vec<Option<BankTarget>>,
    pub active_bank: Option<usize>,
}

impl Banker {
    #[must_use]
    pub fn new(banker_cell: crate::cell::CellRef, mask: Word, shift: u32, nuof_banks: usize) -> Self {
        Self {
            banker_cell,
            mask,
            shift,
            banks: vec![None; nuof_banks],
            active_bank: None,
        }
    }

    pub fn add_bank(&mut self, bank_nr: usize, chip: ChipId, chip_begin: Addr) {
        self.banks[bank_nr] = Some(BankTarget { chip, chip_begin });
    }

    #[must_use]
    pub fn bank_of(&self, register_value: Word) -> usize {
        ((register_value & self.mask) >> self.shift) as usize
    }
}

/// Bit-bander configuration (§4.3): maps each word of the decoded range
/// onto one bit of a target chip slot.
#[derive(Debug, Clone, Copy)]
pub struct BitBander {
    pub target_chip: ChipId,
    pub target_begin: Addr,
    /// Bits packed per target chip cell before moving to the next one.
    pub bits_per_chip_cell: u32,
    /// Address distance between consecutive target chip cells.
    pub distance: Addr,
}

impl BitBander {
    /// Resolve a decoded-range offset (`addr - as_begin`) to the target
    /// chip slot and bit position within it.
    #[must_use]
    pub fn locate(&self, offset: Addr) -> (Addr, u32) {
        let cell_index = offset / self.bits_per_chip_cell;
        let bit = offset % self.bits_per_chip_cell;
        (self.target_begin + cell_index * self.distance, bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fully_covered_by_matches_equal_range() {
        let d = Decoder::plain(0x1000, 0x1FFF, ChipId(0), 0);
        assert!(d.fully_covered_by(0x1000, 0x1FFF));
        assert!(d.fully_covered_by(0x0F00, 0x20FF));
        assert!(!d.fully_covered_by(0x1000, 0x1FFE));
    }

    #[test]
    fn covers_requires_strict_interior() {
        let d = Decoder::plain(0x1000, 0x1FFF, ChipId(0), 0);
        assert!(d.covers(0x1400, 0x17FF));
        assert!(!d.covers(0x1000, 0x17FF)); // touches left edge -> shrink case
        assert!(!d.covers(0x1400, 0x1FFF)); // touches right edge -> shrink case
    }

    #[test]
    fn as_to_chip_and_back_round_trip() {
        let d = Decoder::plain(0x1000, 0x1FFF, ChipId(0), 0x800);
        for a in [0x1000, 0x1234, 0x1FFF] {
            assert_eq!(d.chip_to_as(d.as_to_chip(a)), a);
        }
    }

    #[test]
    fn bitbander_locates_bit_within_cell() {
        let bb = BitBander {
            target_chip: ChipId(0),
            target_begin: 0x10,
            bits_per_chip_cell: 8,
            distance: 1,
        };
        assert_eq!(bb.locate(0), (0x10, 0));
        assert_eq!(bb.locate(7), (0x10, 7));
        assert_eq!(bb.locate(8), (0x11, 0));
    }
}
