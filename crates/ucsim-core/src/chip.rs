//! The storage chip (§4.1): a flat backing array with per-slot flags, plus
//! the lazily-instantiated operator chains attached to its cells (§4.2).

use std::collections::HashMap;

use rand::RngCore;

use crate::cell::{CellFlags, Operator};
use crate::{Addr, Word};

/// Arena index for a chip, owned by the [`crate::Mcu`] that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChipId(pub usize);

/// How a chip's slots are initialised at construction time.
#[derive(Debug, Clone, Copy)]
pub enum Fill {
    /// Every slot starts at this constant value.
    Constant(Word),
    /// Every slot starts at a pseudo-random value (the standard choice for
    /// RAM, so uninitialised reads are visibly garbage rather than a
    /// deceptive zero).
    PseudoRandom { seed: u64 },
}

pub struct Chip {
    name: String,
    size: usize,
    width: u32,
    mask: Word,
    data: Vec<Word>,
    flags: Vec<u8>,
    operators: HashMap<Addr, Vec<Operator>>,
}

impl Chip {
    #[must_use]
    pub fn new(name: impl Into<String>, size: usize, width: u32, fill: Fill) -> Self {
        assert!(width >= 1 && width <= 32, "chip word width must be 1..=32 bits");
        let mask: Word = if width == 32 { u32::MAX } else { (1u32 << width) - 1 };
        let data = match fill {
            Fill::Constant(v) => vec![v & mask; size],
            Fill::PseudoRandom { seed } => {
                let mut rng = stdrng_from_seed(seed);
                (0..size).map(|_| rng.next_u32() & mask).collect()
            }
        };
        Self {
            name: name.into(),
            size,
            width,
            mask,
            data,
            flags: vec![0; size],
            operators: HashMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn mask(&self) -> Word {
        self.mask
    }

    fn check(&self, addr: Addr) {
        assert!(
            (addr as usize) < self.size,
            "chip \"{}\": address {addr:#x} out of range (size {})",
            self.name,
            self.size
        );
    }

    /// Raw read: masked slot value, no side effects, no RO check.
    #[must_use]
    pub fn get(&self, addr: Addr) -> Word {
        self.check(addr);
        self.data[addr as usize] & self.mask
    }

    /// Raw write respecting the read-only flag (§8 invariant 4).
    pub fn set(&mut self, addr: Addr, value: Word) {
        self.check(addr);
        if self.get_flag(addr, CellFlags::READ_ONLY) {
            return;
        }
        self.data[addr as usize] = value & self.mask;
    }

    /// Raw write that bypasses the read-only flag: used by firmware
    /// loaders and by [`Self::force_write`]'s RO bypass pattern.
    pub fn download(&mut self, addr: Addr, value: Word) {
        self.check(addr);
        self.data[addr as usize] = value & self.mask;
    }

    /// Add a signed delta to a slot, bypassing RO (used by relocating
    /// firmware loaders). Matches the original's `wadd`.
    pub fn wadd(&mut self, addr: Addr, delta: i64) {
        self.check(addr);
        let cur = i64::from(self.data[addr as usize]);
        self.data[addr as usize] = ((cur + delta) as u32) & self.mask;
    }

    pub fn set_bit1(&mut self, addr: Addr, bits: Word) {
        self.check(addr);
        if self.get_flag(addr, CellFlags::READ_ONLY) {
            return;
        }
        self.data[addr as usize] = (self.data[addr as usize] | bits) & self.mask;
    }

    pub fn set_bit0(&mut self, addr: Addr, bits: Word) {
        self.check(addr);
        if self.get_flag(addr, CellFlags::READ_ONLY) {
            return;
        }
        self.data[addr as usize] = (self.data[addr as usize] & !bits) & self.mask;
    }

    pub fn toggle_bits(&mut self, addr: Addr, bits: Word) {
        self.check(addr);
        if self.get_flag(addr, CellFlags::READ_ONLY) {
            return;
        }
        self.data[addr as usize] = (self.data[addr as usize] ^ bits) & self.mask;
    }

    #[must_use]
    pub fn get_flags(&self, addr: Addr) -> u8 {
        self.check(addr);
        self.flags[addr as usize]
    }

    #[must_use]
    pub fn get_flag(&self, addr: Addr, flag: u8) -> bool {
        self.get_flags(addr) & flag != 0
    }

    pub fn set_flag(&mut self, addr: Addr, flag: u8, value: bool) {
        self.check(addr);
        if value {
            self.flags[addr as usize] |= flag;
        } else {
            self.flags[addr as usize] &= !flag;
        }
    }

    pub fn set_flag_range(&mut self, begin: Addr, end: Addr, flag: u8, value: bool) {
        for addr in begin..=end {
            self.set_flag(addr, flag, value);
        }
    }

    /// Whether this slot has an operator chain materialised. Matches
    /// "lazily instantiated on first access" — an empty chain is
    /// equivalent to no cell ever having been touched.
    #[must_use]
    pub fn has_operators(&self, addr: Addr) -> bool {
        self.operators.get(&addr).is_some_and(|v| !v.is_empty())
    }

    #[must_use]
    pub fn operators(&self, addr: Addr) -> &[Operator] {
        self.operators.get(&addr).map_or(&[], Vec::as_slice)
    }

    /// Append an operator (the default policy: hw-callbacks observe values
    /// after earlier transforms in the chain).
    pub fn append_operator(&mut self, addr: Addr, op: Operator) {
        self.operators.entry(addr).or_default().push(op);
    }

    /// Prepend an operator. Reserved for bank-switchers, which must see
    /// the raw selector write before anything else in the chain.
    pub fn prepend_operator(&mut self, addr: Addr, op: Operator) {
        self.operators.entry(addr).or_default().insert(0, op);
    }

    pub fn remove_operators(&mut self, addr: Addr, mut matches: impl FnMut(&Operator) -> bool) {
        if let Some(chain) = self.operators.get_mut(&addr) {
            chain.retain(|op| !matches(op));
        }
    }
}

// `StdRng` requires a 32-byte seed; stretch the u64 deterministically so a
// given seed always reproduces the same fill pattern.
fn stdrng_from_seed(seed: u64) -> rand::rngs::StdRng {
    use rand::SeedableRng;
    let mut bytes = [0u8; 32];
    for (i, chunk) in bytes.chunks_mut(8).enumerate() {
        let v = seed.wrapping_add(i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        chunk.copy_from_slice(&v.to_le_bytes());
    }
    rand::rngs::StdRng::from_seed(bytes)
}
