//! Address space (§4.4): a logical memory region of the MCU, covered by a
//! sorted, non-overlapping list of active decoders.

use crate::decoder::DecoderId;
use crate::Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpaceId(pub usize);

pub struct AddressSpace {
    name: String,
    start: Addr,
    size: usize,
    addr_bits: u32,
    /// Sorted by `as_begin`; linear scan is fine at the decoder counts
    /// (typically under 16) a real MCU space has.
    decoders: Vec<DecoderId>,
}

impl AddressSpace {
    #[must_use]
    pub fn new(name: impl Into<String>, start: Addr, size: usize, addr_bits: u32) -> Self {
        Self {
            name: name.into(),
            start,
            size,
            addr_bits,
            decoders: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn start(&self) -> Addr {
        self.start
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn addr_bits(&self) -> u32 {
        self.addr_bits
    }

    #[must_use]
    pub fn valid_address(&self, addr: Addr) -> bool {
        addr >= self.start && (addr as usize - self.start as usize) < self.size
    }

    #[must_use]
    pub fn decoders(&self) -> &[DecoderId] {
        &self.decoders
    }

    /// Insert `id` and re-sort by `as_begin`. The decoder arena (owned by
    /// `Mcu`) is the source of truth for ranges, so sorting is driven by
    /// the `begins` closure rather than data duplicated here.
    pub(crate) fn insert(&mut self, id: DecoderId, begins: impl Fn(DecoderId) -> Addr) {
        self.decoders.push(id);
        self.sort_by_begin(begins);
    }

    pub(crate) fn remove(&mut self, id: DecoderId) {
        self.decoders.retain(|d| *d != id);
    }

    pub(crate) fn clear(&mut self) {
        self.decoders.clear();
    }

    pub(crate) fn sort_by_begin(&mut self, begins: impl Fn(DecoderId) -> Addr) {
        self.decoders.sort_by_key(|id| begins(*id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_address_respects_start_and_size() {
        let space = AddressSpace::new("code", 0x8000, 0x1000, 16);
        assert!(space.valid_address(0x8000));
        assert!(space.valid_address(0x8FFF));
        assert!(!space.valid_address(0x9000));
        assert!(!space.valid_address(0x7FFF));
    }
}
