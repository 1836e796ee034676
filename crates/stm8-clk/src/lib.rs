//! STM8 clock tree peripheral (§4.6): oscillator selection, the
//! `SWR`/`SWCR` clock-switch protocol, `CKDIVR` prescaling and the
//! `PCKENR1..3` peripheral clock gates broadcast to partner peripherals.

use ucsim_core::cell::WriteOrigin;
use ucsim_core::hw::{ConfigReg, Event, Hw, HwCategory, PeripheralId};
use ucsim_core::mcu::Mcu;
use ucsim_core::{Addr, CellRef, ChipId, Word};

/// Register offsets from the clock tree's base address, matching the
/// reference manual's `CLK_*` layout.
pub mod reg {
    pub const ICKR: u32 = 0x00;
    pub const ECKR: u32 = 0x01;
    pub const CMSR: u32 = 0x03;
    pub const SWR: u32 = 0x04;
    pub const SWCR: u32 = 0x05;
    pub const CKDIVR: u32 = 0x06;
    pub const PCKENR1: u32 = 0x07;
    pub const PCKENR2: u32 = 0x08;
    pub const PCKENR3: u32 = 0x09;
    pub const COUNT: u32 = 0x0A;
}

/// `ICKR` bit positions.
mod ickr_bit {
    pub const HSIEN: u8 = 0x01;
    pub const HSIRDY: u8 = 0x02;
    pub const LSIEN: u8 = 0x08;
    pub const LSIRDY: u8 = 0x10;
}
mod eckr_bit {
    pub const HSEEN: u8 = 0x01;
    pub const HSERDY: u8 = 0x02;
}
mod swcr_bit {
    pub const SWBSY: u8 = 0x01;
    pub const SWEN: u8 = 0x02;
    pub const SWIEN: u8 = 0x04;
    pub const SWIF: u8 = 0x08;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscSource {
    Hsi,
    Lsi,
    Hse,
    Lse,
}

impl OscSource {
    /// `CMSR`/`SWR` source codes, matching the reference manual's
    /// one-hot-ish encoding (chosen for human-readability in a debugger
    /// dump, not for any bit-level hardware meaning).
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            OscSource::Hsi => 0xE1,
            OscSource::Hse => 0xB4,
            OscSource::Lsi => 0xD2,
            OscSource::Lse => 0x8B,
        }
    }

    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0xE1 => Some(OscSource::Hsi),
            0xB4 => Some(OscSource::Hse),
            0xD2 => Some(OscSource::Lsi),
            0x8B => Some(OscSource::Lse),
            _ => None,
        }
    }

    #[must_use]
    pub fn default_hz(self) -> f64 {
        match self {
            OscSource::Hsi => 16_000_000.0,
            OscSource::Hse => 16_000_000.0,
            OscSource::Lsi => 128_000.0,
            OscSource::Lse => 32_768.0,
        }
    }
}

/// A partner bound to one bit of `PCKENR{1,2,3}` (§4.6 "Writing
/// PCKENR{1,2,3} recomputes ... whether that peripheral is clocked").
struct PckenBinding {
    reg_index: usize, // 0, 1 or 2
    bit: u8,
    partner: PeripheralId,
}

pub struct Clk {
    base: Addr,
    sfr: ChipId,
    instance: u32,
    /// Set by [`Self::install`]; needed to notify partners from `write`,
    /// which the `Hw` trait does not hand a self id.
    id: PeripheralId,
    source: OscSource,
    hsi_en: bool,
    hsi_rdy: bool,
    lsi_en: bool,
    lsi_rdy: bool,
    hse_en: bool,
    hse_rdy: bool,
    swr: u8,
    swbsy: bool,
    swen: bool,
    swien: bool,
    swif: bool,
    ckdivr: u8,
    pcken: [u8; 3],
    bindings: Vec<PckenBinding>,
}

impl Clk {
    #[must_use]
    pub fn new(sfr: ChipId, base: Addr, instance: u32, initial: OscSource) -> Self {
        Self {
            base,
            sfr,
            instance,
            id: PeripheralId(usize::MAX),
            source: initial,
            hsi_en: matches!(initial, OscSource::Hsi),
            hsi_rdy: matches!(initial, OscSource::Hsi),
            lsi_en: matches!(initial, OscSource::Lsi),
            lsi_rdy: matches!(initial, OscSource::Lsi),
            hse_en: matches!(initial, OscSource::Hse),
            hse_rdy: matches!(initial, OscSource::Hse),
            swr: initial.code(),
            swbsy: false,
            swen: false,
            swien: false,
            swif: false,
            ckdivr: 0,
            pcken: [0; 3],
            bindings: Vec::new(),
        }
    }

    #[must_use]
    pub fn cell(&self, offset: u32) -> CellRef {
        CellRef::new(self.sfr, self.base + offset)
    }

    pub fn bind_pcken(&mut self, reg_index: usize, bit_mask: u8, partner: PeripheralId) {
        self.bindings.push(PckenBinding {
            reg_index,
            bit: bit_mask,
            partner,
        });
    }

    /// Registers every `CLK_*` cell onto this peripheral's operator chain
    /// and sets `CMSR`'s read-only flag (§4.1 data model: `CMSR` is
    /// documented as status/read-only).
    pub fn install(&mut self, mcu: &mut Mcu, id: PeripheralId) {
        self.id = id;
        for offset in 0..reg::COUNT {
            mcu.hook_cell(id, self.cell(offset));
        }
        mcu.chip_mut(self.sfr).set_flag(self.base + reg::CMSR, ucsim_core::CellFlags::READ_ONLY, true);
    }

    fn is_ready(&self, src: OscSource) -> bool {
        match src {
            OscSource::Hsi => self.hsi_rdy,
            OscSource::Lsi => self.lsi_rdy,
            OscSource::Hse => self.hse_rdy,
            OscSource::Lse => false, // not modeled on this family; never selectable
        }
    }

    /// Runs the clock-switch protocol (§4.6 "Protocol -- clock switch")
    /// after any write to `SWR`/`SWCR` might have changed its inputs.
    fn reconsider_switch(&mut self, mcu: &mut Mcu, id: PeripheralId) {
        if !self.swbsy {
            return;
        }
        if !self.swen {
            return;
        }
        let Some(desired) = OscSource::from_code(self.swr) else {
            return;
        };
        if !self.is_ready(desired) {
            return;
        }
        self.source = desired;
        let cmsr = self.cell(reg::CMSR);
        mcu.force_write(cmsr, Word::from(desired.code()));
        mcu.scheduler.set_xtal_hz(desired.default_hz());
        self.swbsy = false;
        self.broadcast(mcu, id, Event::ClockOn);
    }

    fn broadcast(&self, mcu: &mut Mcu, id: PeripheralId, event: Event) {
        for binding in &self.bindings {
            mcu.notify_peripheral(binding.partner, id, event);
        }
    }

    fn recompute_gating(&mut self, mcu: &mut Mcu, id: PeripheralId, reg_index: usize, old: u8, new: u8) {
        let changed = old ^ new;
        for binding in &self.bindings {
            if binding.reg_index != reg_index || binding.bit & changed == 0 {
                continue;
            }
            let now_on = new & binding.bit != 0;
            let event = if now_on { Event::ClockOn } else { Event::ClockOff };
            mcu.notify_peripheral(binding.partner, id, event);
        }
    }
}

impl Hw for Clk {
    fn category(&self) -> HwCategory {
        HwCategory::Clock
    }

    fn instance(&self) -> u32 {
        self.instance
    }

    fn reset(&mut self, _mcu: &mut Mcu) {
        self.hsi_en = matches!(self.source, OscSource::Hsi);
        self.hsi_rdy = self.hsi_en;
        self.lsi_en = matches!(self.source, OscSource::Lsi);
        self.lsi_rdy = self.lsi_en;
        self.hse_en = matches!(self.source, OscSource::Hse);
        self.hse_rdy = self.hse_en;
        self.swr = self.source.code();
        self.swbsy = false;
        self.swen = false;
        self.swien = false;
        self.swif = false;
        self.ckdivr = 0;
        self.pcken = [0; 3];
    }

    fn read(&mut self, _mcu: &mut Mcu, cell: CellRef) -> Word {
        let offset = cell.addr - self.base;
        match offset {
            reg::ICKR => {
                let mut v = 0u8;
                if self.hsi_en {
                    v |= ickr_bit::HSIEN;
                }
                if self.hsi_rdy {
                    v |= ickr_bit::HSIRDY;
                }
                if self.lsi_en {
                    v |= ickr_bit::LSIEN;
                }
                if self.lsi_rdy {
                    v |= ickr_bit::LSIRDY;
                }
                Word::from(v)
            }
            reg::ECKR => {
                let mut v = 0u8;
                if self.hse_en {
                    v |= eckr_bit::HSEEN;
                }
                if self.hse_rdy {
                    v |= eckr_bit::HSERDY;
                }
                Word::from(v)
            }
            reg::CMSR => Word::from(self.source.code()),
            reg::SWR => Word::from(self.swr),
            reg::SWCR => {
                let mut v = 0u8;
                if self.swbsy {
                    v |= swcr_bit::SWBSY;
                }
                if self.swen {
                    v |= swcr_bit::SWEN;
                }
                if self.swien {
                    v |= swcr_bit::SWIEN;
                }
                if self.swif {
                    v |= swcr_bit::SWIF;
                }
                Word::from(v)
            }
            reg::CKDIVR => Word::from(self.ckdivr),
            reg::PCKENR1 => Word::from(self.pcken[0]),
            reg::PCKENR2 => Word::from(self.pcken[1]),
            reg::PCKENR3 => Word::from(self.pcken[2]),
            _ => 0,
        }
    }

    fn write(&mut self, mcu: &mut Mcu, cell: CellRef, value: Word, _origin: WriteOrigin) -> Word {
        let offset = cell.addr - self.base;
        let v8 = (value & 0xFF) as u8;
        match offset {
            reg::ICKR => {
                // §4.6 "Register-field preservation": HSIRDY/LSIRDY are
                // hardware-managed and the currently-selected source's
                // enable bit cannot be cleared while in use.
                let mut enable = v8 & (ickr_bit::HSIEN | ickr_bit::LSIEN);
                if self.source == OscSource::Hsi {
                    enable |= ickr_bit::HSIEN;
                }
                if self.source == OscSource::Lsi {
                    enable |= ickr_bit::LSIEN;
                }
                self.hsi_en = enable & ickr_bit::HSIEN != 0;
                self.lsi_en = enable & ickr_bit::LSIEN != 0;
                if self.hsi_en {
                    self.hsi_rdy = true;
                }
                if self.lsi_en {
                    self.lsi_rdy = true;
                }
                self.reconsider_switch(mcu, self.id);
            }
            reg::ECKR => {
                let mut enable = v8 & eckr_bit::HSEEN;
                if self.source == OscSource::Hse {
                    enable |= eckr_bit::HSEEN;
                }
                self.hse_en = enable & eckr_bit::HSEEN != 0;
                if self.hse_en {
                    self.hse_rdy = true;
                }
            }
            reg::SWR => {
                self.swr = v8;
                self.swbsy = true;
            }
            reg::SWCR => {
                let requested_busy = v8 & swcr_bit::SWBSY != 0;
                if self.swbsy && !requested_busy {
                    self.swbsy = false; // manual clear cancels a pending switch
                }
                self.swen = v8 & swcr_bit::SWEN != 0;
                self.swien = v8 & swcr_bit::SWIEN != 0;
                if v8 & swcr_bit::SWIF == 0 {
                    self.swif = false; // W1C
                }
            }
            reg::CKDIVR => self.ckdivr = v8 & 0x1F,
            reg::PCKENR1 | reg::PCKENR2 | reg::PCKENR3 => {
                let idx = (offset - reg::PCKENR1) as usize;
                let old = self.pcken[idx];
                self.pcken[idx] = v8;
                self.recompute_gating(mcu, self.id, idx, old, v8);
            }
            _ => {}
        }
        value
    }

    fn tick(&mut self, _mcu: &mut Mcu, _cycles: u64) {}

    fn happen(&mut self, _mcu: &mut Mcu, _source: PeripheralId, _event: Event) {}

    fn config_registers(&self) -> &'static [ConfigReg] {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ucsim_core::chip::{Chip, Fill};

    fn setup() -> (Mcu, ChipId) {
        let mut mcu = Mcu::new(16_000_000.0, 1);
        let sfr = mcu.add_chip(Chip::new("sfr", 0x400, 8, Fill::Constant(0)));
        (mcu, sfr)
    }

    #[test]
    fn initial_cmsr_reflects_boot_source() {
        let (mut mcu, sfr) = setup();
        let mut clk = Clk::new(sfr, 0x00, 0, OscSource::Hsi);
        let cell = clk.cell(reg::CMSR);
        assert_eq!(clk.read(&mut mcu, cell), Word::from(OscSource::Hsi.code()));
    }

    #[test]
    fn cmsr_is_read_only_to_software() {
        let (mut mcu, sfr) = setup();
        let mut clk = Clk::new(sfr, 0x00, 0, OscSource::Hsi);
        clk.install(&mut mcu, PeripheralId(0));
        mcu.space_set(ucsim_core::SpaceId(0), 0, 0); // no-op smoke: space not wired here
        let cmsr = clk.cell(reg::CMSR);
        mcu.chip_mut(sfr).set(cmsr.addr, 0xFF);
        assert_eq!(mcu.chip(sfr).get(cmsr.addr), OscSource::Hsi.code() as u32);
    }
}
