//! Interrupt sources (§3 Data Model "Interrupt source"): a static binding
//! from a peripheral's enable/flag register bits to a vector address and
//! priority, plus the sweep §4.10 describes ("sweeps the interrupt
//! controller for newly-pending sources"). Redirecting the CPU's program
//! counter to the resolved vector is the excluded CPU core's job; this
//! module only identifies what is pending and in what priority order.

use crate::cell::CellRef;
use crate::hw::PeripheralId;
use crate::mcu::Mcu;
use crate::Word;

/// Arena index for an interrupt source, owned by the [`Mcu`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterruptSourceId(pub usize);

/// `owning peripheral; enable cell+mask; flag cell+mask; vector address;
/// priority` (§3). Static after boot: nothing here is mutated once added.
#[derive(Debug, Clone, Copy)]
pub struct InterruptSource {
    pub peripheral: PeripheralId,
    pub enable: CellRef,
    pub enable_mask: Word,
    pub flag: CellRef,
    pub flag_mask: Word,
    pub vector: u32,
    pub priority: u8,
}

impl InterruptSource {
    #[must_use]
    pub fn new(peripheral: PeripheralId, enable: CellRef, enable_mask: Word, flag: CellRef, flag_mask: Word, vector: u32, priority: u8) -> Self {
        Self {
            peripheral,
            enable,
            enable_mask,
            flag,
            flag_mask,
            vector,
            priority,
        }
    }
}

/// The static table of [`InterruptSource`]s declared at MCU construction
/// (§3: "static after boot"). Kept as a table read by [`Mcu::pending_interrupts`]
/// rather than, e.g., a callback, so the priority sweep in §4.10 is a plain
/// scan over owned data with no re-entrancy concerns.
#[derive(Debug, Default)]
pub struct InterruptTable {
    sources: Vec<InterruptSource>,
}

impl InterruptTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, source: InterruptSource) -> InterruptSourceId {
        let id = InterruptSourceId(self.sources.len());
        self.sources.push(source);
        id
    }

    #[must_use]
    pub fn get(&self, id: InterruptSourceId) -> &InterruptSource {
        &self.sources[id.0]
    }

    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = (InterruptSourceId, &InterruptSource)> {
        self.sources.iter().enumerate().map(|(i, s)| (InterruptSourceId(i), s))
    }
}

impl Mcu {
    /// §3 invariant: `pending iff (enable & mask) != 0 && (flag & mask) != 0`.
    /// Reads use [`Mcu::space_get`]-equivalent raw chip access (no operator
    /// chain) since the enable/flag bits are plain state, not side-effecting
    /// registers, and re-entering the chain here would be observable from
    /// inside a peripheral's own `tick`.
    #[must_use]
    pub fn is_interrupt_pending(&self, source: &InterruptSource) -> bool {
        let enable = self.chip(source.enable.chip).get(source.enable.addr);
        let flag = self.chip(source.flag.chip).get(source.flag.addr);
        (enable & source.enable_mask) != 0 && (flag & source.flag_mask) != 0
    }

    /// §4.10 "sweeps the interrupt controller for newly-pending sources":
    /// every pending source in the table, highest priority (lowest number)
    /// first, ties broken by declaration order. Redirecting the program
    /// counter to `vector` is the excluded CPU core's responsibility.
    #[must_use]
    pub fn pending_interrupts(&self) -> Vec<InterruptSourceId> {
        let mut pending: Vec<(InterruptSourceId, u8)> = self
            .interrupts()
            .iter()
            .filter(|(_, s)| self.is_interrupt_pending(s))
            .map(|(id, s)| (id, s.priority))
            .collect();
        pending.sort_by(|a, b| a.1.cmp(&b.1).then(a.0 .0.cmp(&b.0 .0)));
        pending.into_iter().map(|(id, _)| id).collect()
    }

    /// The highest-priority currently-pending source, if any.
    #[must_use]
    pub fn highest_pending_interrupt(&self) -> Option<InterruptSourceId> {
        self.pending_interrupts().into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::{Chip, Fill};
    use crate::hw::PeripheralId;
    use crate::Mcu;

    #[test]
    fn pending_requires_both_enable_and_flag_bits() {
        let mut mcu = Mcu::new(16_000_000.0, 1);
        let sfr = mcu.add_chip(Chip::new("sfr", 0x10, 8, Fill::Constant(0)));
        let enable = CellRef::new(sfr, 0);
        let flag = CellRef::new(sfr, 1);
        let src = InterruptSource::new(PeripheralId(0), enable, 0x01, flag, 0x01, 0x10, 5);

        assert!(!mcu.is_interrupt_pending(&src));
        mcu.chip_mut(sfr).set(0, 0x01);
        assert!(!mcu.is_interrupt_pending(&src));
        mcu.chip_mut(sfr).set(1, 0x01);
        assert!(mcu.is_interrupt_pending(&src));
    }

    #[test]
    fn pending_interrupts_sorted_by_priority() {
        let mut mcu = Mcu::new(16_000_000.0, 1);
        let sfr = mcu.add_chip(Chip::new("sfr", 0x10, 8, Fill::Constant(0xFF)));
        let low = InterruptSource::new(PeripheralId(0), CellRef::new(sfr, 0), 0xFF, CellRef::new(sfr, 0), 0xFF, 0x10, 10);
        let high = InterruptSource::new(PeripheralId(1), CellRef::new(sfr, 1), 0xFF, CellRef::new(sfr, 1), 0xFF, 0x20, 1);
        mcu.interrupts_mut().add(low);
        mcu.interrupts_mut().add(high);

        let order = mcu.pending_interrupts();
        assert_eq!(order, vec![InterruptSourceId(1), InterruptSourceId(0)]);
    }
}
