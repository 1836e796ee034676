//! STM8 up/up-down timer (§4.8): a generic counter parameterized by class
//! (basic/general/advanced), bit width and prescaler form, shared by every
//! concrete STM8 timer instance (TIM1..TIM6-style).
//!
//! The register *layout* (which offsets exist, whether the prescaler and
//! counter are one or two bytes) is computed once from [`TimerConfig`] at
//! construction time rather than hard-coded per instance, matching §4.8's
//! "parameterized by feature set ... and bit-width" framing.

use ucsim_core::cell::WriteOrigin;
use ucsim_core::hw::{ConfigReg, Event, Hw, HwCategory, PeripheralId};
use ucsim_core::mcu::Mcu;
use ucsim_core::{Addr, CellRef, ChipId, Word};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerClass {
    Basic,
    General,
    Advanced,
}

/// §4.8: "Prescaler form is either a straight preload ... or a power-of-two
/// encoding (3- or 4-bit field)".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrescalerForm {
    /// `prescaler_cycles = preload + 1`, register is as wide as the counter.
    Preload,
    /// `prescaler_cycles = 1 << field`, register is a single byte.
    PowerOfTwo { bits: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct TimerConfig {
    pub class: TimerClass,
    /// 8 or 16.
    pub bit_width: u32,
    pub prescaler_form: PrescalerForm,
    /// Number of capture/compare channels, 0..=4.
    pub channels: u8,
    /// Centre-aligned up-down counting (advanced timers only in practice).
    pub bidirectional: bool,
    pub has_slave_mode: bool,
    pub irq_vector: u32,
}

impl TimerConfig {
    #[must_use]
    pub fn basic_8bit(irq_vector: u32) -> Self {
        Self {
            class: TimerClass::Basic,
            bit_width: 8,
            prescaler_form: PrescalerForm::PowerOfTwo { bits: 3 },
            channels: 0,
            bidirectional: false,
            has_slave_mode: false,
            irq_vector,
        }
    }

    #[must_use]
    pub fn general_16bit(channels: u8, irq_vector: u32) -> Self {
        Self {
            class: TimerClass::General,
            bit_width: 16,
            prescaler_form: PrescalerForm::Preload,
            channels,
            bidirectional: false,
            has_slave_mode: true,
            irq_vector,
        }
    }

    #[must_use]
    pub fn advanced_16bit(irq_vector: u32) -> Self {
        Self {
            class: TimerClass::Advanced,
            bit_width: 16,
            prescaler_form: PrescalerForm::PowerOfTwo { bits: 4 },
            channels: 4,
            bidirectional: true,
            has_slave_mode: true,
            irq_vector,
        }
    }
}

mod cr1_bit {
    pub const CEN: u8 = 0x01;
    pub const UDIS: u8 = 0x02;
    pub const URS: u8 = 0x04;
    pub const OPM: u8 = 0x08;
    pub const DIR: u8 = 0x10; // 0 = up, 1 = down; meaningless unless bidirectional
    pub const ARPE: u8 = 0x80;
}

mod egr_bit {
    pub const UG: u8 = 0x01;
}

/// Register offsets computed from [`TimerConfig`] at construction. Absent
/// registers (e.g. `cr2`/`smcr` on a basic timer, or the high byte of an
/// 8-bit counter) are `None` and read as zero / ignore writes.
struct Layout {
    cr1: Addr,
    smcr: Option<Addr>,
    ier: Addr,
    sr1: Addr,
    egr: Addr,
    ccmr: Vec<Addr>,
    ccer: Vec<Addr>,
    cntr_h: Option<Addr>,
    cntr_l: Addr,
    psc_h: Option<Addr>,
    psc_l: Addr,
    arr_h: Option<Addr>,
    arr_l: Addr,
    ccr_h: Vec<Option<Addr>>,
    ccr_l: Vec<Addr>,
    count: Addr,
}

impl Layout {
    fn build(config: &TimerConfig) -> Self {
        let mut cursor: Addr = 0;
        let mut next = |width: Addr| {
            let at = cursor;
            cursor += width;
            at
        };
        let cr1 = next(1);
        let smcr = config.has_slave_mode.then(|| next(1));
        let ier = next(1);
        let sr1 = next(1);
        let egr = next(1);
        let ccmr: Vec<Addr> = (0..config.channels).map(|_| next(1)).collect();
        let ccer: Vec<Addr> = (0..config.channels).map(|_| next(1)).collect();
        let wide = config.bit_width == 16;
        let cntr_h = wide.then(|| next(1));
        let cntr_l = next(1);
        let psc_wide = matches!(config.prescaler_form, PrescalerForm::Preload) && wide;
        let psc_h = psc_wide.then(|| next(1));
        let psc_l = next(1);
        let arr_h = wide.then(|| next(1));
        let arr_l = next(1);
        let mut ccr_h = Vec::new();
        let mut ccr_l = Vec::new();
        for _ in 0..config.channels {
            ccr_h.push(wide.then(|| next(1)));
            ccr_l.push(next(1));
        }
        Self {
            cr1,
            smcr,
            ier,
            sr1,
            egr,
            ccmr,
            ccer,
            cntr_h,
            cntr_l,
            psc_h,
            psc_l,
            arr_h,
            arr_l,
            ccr_h,
            ccr_l,
            count: cursor,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Channel {
    ccr: u32,
    ccr_preload_high: Option<u8>,
    enabled: bool,
    irq_enabled: bool,
    pending: bool,
    ccmr: u8,
}

pub struct Timer {
    base: Addr,
    sfr: ChipId,
    instance: u32,
    id: PeripheralId,
    config: TimerConfig,
    layout: Layout,
    mask: u32,

    cen: bool,
    opm: bool,
    urs: bool,
    udis: bool,
    arpe: bool,
    counting_down: bool,
    smcr: u8,

    cnt: u32,
    cnt_high_latch: Option<u8>,

    arr: u32,
    arr_preload: u32,
    arr_high_buffer: Option<u8>,

    psc_preload: u32,
    psc_high_buffer: Option<u8>,
    psc_counter: u32,

    uie: bool,
    uif: bool,

    channels: Vec<Channel>,

    clock_enabled: bool,
}

impl Timer {
    #[must_use]
    pub fn new(sfr: ChipId, base: Addr, instance: u32, config: TimerConfig) -> Self {
        let layout = Layout::build(&config);
        let mask = if config.bit_width == 32 { u32::MAX } else { (1u32 << config.bit_width) - 1 };
        let channels = vec![Channel::default(); config.channels as usize];
        Self {
            base,
            sfr,
            instance,
            id: PeripheralId(usize::MAX),
            config,
            layout,
            mask,
            cen: false,
            opm: false,
            urs: false,
            udis: false,
            arpe: false,
            counting_down: false,
            smcr: 0,
            cnt: 0,
            cnt_high_latch: None,
            arr: mask,
            arr_preload: mask,
            arr_high_buffer: None,
            psc_preload: 0,
            psc_high_buffer: None,
            psc_counter: 0,
            uie: false,
            uif: false,
            channels,
            clock_enabled: true,
        }
    }

    #[must_use]
    pub fn cell(&self, offset: Addr) -> CellRef {
        CellRef::new(self.sfr, self.base + offset)
    }

    #[must_use]
    pub fn irq_vector(&self) -> u32 {
        self.config.irq_vector
    }

    #[must_use]
    pub fn cnt(&self) -> u32 {
        self.cnt
    }

    #[must_use]
    pub fn arr(&self) -> u32 {
        self.arr
    }

    #[must_use]
    pub fn uif(&self) -> bool {
        self.uif
    }

    #[must_use]
    pub fn irq_pending(&self) -> bool {
        (self.uie && self.uif) || self.channels.iter().any(|c| c.irq_enabled && c.pending)
    }

    /// The interrupt-enable register's cell, for binding an
    /// [`ucsim_core::InterruptSource`] without exposing the layout.
    #[must_use]
    pub fn ier_cell(&self) -> CellRef {
        self.cell(self.layout.ier)
    }

    /// The status register's cell, for binding an
    /// [`ucsim_core::InterruptSource`]'s flag bits.
    #[must_use]
    pub fn sr1_cell(&self) -> CellRef {
        self.cell(self.layout.sr1)
    }

    pub fn install(&mut self, mcu: &mut Mcu, id: PeripheralId) {
        self.id = id;
        for offset in 0..self.layout.count {
            mcu.hook_cell(id, self.cell(offset));
        }
    }

    /// §4.8 "Software-driven event generation": writing `UG` forces an
    /// update event and reloads the prescaler; no interrupt if URS is set.
    fn force_update(&mut self, suppress_irq_if_urs: bool) {
        self.psc_counter = self.prescaler_cycles();
        self.cnt = if self.counting_down { self.arr } else { 0 };
        self.reload_from_preload();
        if !(suppress_irq_if_urs && self.urs) {
            self.uif = true;
        }
    }

    /// An update event always flushes the preload register into the active
    /// one; `arpe` only gates whether a *write* to ARR takes effect
    /// immediately (see the `arr_l` write handler) or waits for this call.
    fn reload_from_preload(&mut self) {
        self.arr = self.arr_preload;
    }

    fn prescaler_cycles(&self) -> u32 {
        match self.config.prescaler_form {
            PrescalerForm::Preload => self.psc_preload + 1,
            PrescalerForm::PowerOfTwo { .. } => 1u32 << self.psc_preload,
        }
    }

    /// §4.8 tick algorithm: decrement the prescaler every virtual cycle;
    /// at zero, reload it and advance the main counter one step.
    fn advance_one_cycle(&mut self, mcu: &mut Mcu) {
        if self.psc_counter == 0 {
            self.psc_counter = self.prescaler_cycles().saturating_sub(1);
        } else {
            self.psc_counter -= 1;
            return;
        }
        self.step_counter(mcu);
    }

    fn step_counter(&mut self, _mcu: &mut Mcu) {
        let rolled_over = if self.config.bidirectional {
            self.step_centre_aligned()
        } else {
            self.step_up()
        };
        self.check_compares();
        if rolled_over && !self.udis {
            self.reload_from_preload();
            self.uif = true;
            if self.opm {
                self.cen = false;
            }
        }
    }

    fn step_up(&mut self) -> bool {
        if self.cnt >= self.arr {
            self.cnt = 0;
            true
        } else {
            self.cnt += 1;
            false
        }
    }

    /// Centre-aligned up-down counting: counts up to `arr`, reverses, counts
    /// back down to 0, reverses again. An update event fires at each
    /// turnaround (§4.8 "rollover or centre-turnaround").
    fn step_centre_aligned(&mut self) -> bool {
        if !self.counting_down {
            if self.cnt >= self.arr {
                self.counting_down = true;
                if self.arr == 0 {
                    return true;
                }
                self.cnt = self.cnt.saturating_sub(1);
                false
            } else {
                self.cnt += 1;
                self.cnt >= self.arr
            }
        } else if self.cnt == 0 {
            self.counting_down = false;
            self.cnt += 1;
            false
        } else {
            self.cnt -= 1;
            self.cnt == 0
        }
    }

    fn check_compares(&mut self) {
        for ch in &mut self.channels {
            if ch.enabled && ch.ccr == self.cnt {
                ch.pending = true;
            }
        }
    }

}

impl Hw for Timer {
    fn category(&self) -> HwCategory {
        HwCategory::Timer
    }

    fn instance(&self) -> u32 {
        self.instance
    }

    fn reset(&mut self, _mcu: &mut Mcu) {
        self.cen = false;
        self.opm = false;
        self.urs = false;
        self.udis = false;
        self.arpe = false;
        self.counting_down = false;
        self.smcr = 0;
        self.cnt = 0;
        self.cnt_high_latch = None;
        self.arr = self.mask;
        self.arr_preload = self.mask;
        self.arr_high_buffer = None;
        self.psc_preload = 0;
        self.psc_high_buffer = None;
        self.psc_counter = 0;
        self.uie = false;
        self.uif = false;
        for ch in &mut self.channels {
            *ch = Channel::default();
        }
    }

    fn read(&mut self, _mcu: &mut Mcu, cell: CellRef) -> Word {
        let offset = cell.addr - self.base;
        let l = &self.layout;
        if offset == l.cr1 {
            let mut v = 0u8;
            if self.cen {
                v |= cr1_bit::CEN;
            }
            if self.udis {
                v |= cr1_bit::UDIS;
            }
            if self.urs {
                v |= cr1_bit::URS;
            }
            if self.opm {
                v |= cr1_bit::OPM;
            }
            if self.counting_down {
                v |= cr1_bit::DIR;
            }
            if self.arpe {
                v |= cr1_bit::ARPE;
            }
            return Word::from(v);
        }
        if Some(offset) == l.smcr {
            return Word::from(self.smcr);
        }
        if offset == l.ier {
            let mut v = 0u8;
            if self.uie {
                v |= 0x01;
            }
            for (i, ch) in self.channels.iter().enumerate() {
                if ch.irq_enabled {
                    v |= 1 << (i + 1);
                }
            }
            return Word::from(v);
        }
        if offset == l.sr1 {
            let mut v = 0u8;
            if self.uif {
                v |= 0x01;
            }
            for (i, ch) in self.channels.iter().enumerate() {
                if ch.pending {
                    v |= 1 << (i + 1);
                }
            }
            return Word::from(v);
        }
        if offset == l.egr {
            return 0; // write-only in practice, reads as 0
        }
        for (i, &o) in l.ccmr.iter().enumerate() {
            if offset == o {
                return Word::from(self.channels[i].ccmr);
            }
        }
        for (i, &o) in l.ccer.iter().enumerate() {
            if offset == o {
                return Word::from(u8::from(self.channels[i].enabled));
            }
        }
        if Some(offset) == l.cntr_h {
            // §4.8: "reading the high byte first snapshots the low byte."
            self.cnt_high_latch = Some((self.cnt & 0xFF) as u8);
            return Word::from(((self.cnt >> 8) & 0xFF) as u8);
        }
        if offset == l.cntr_l {
            if let Some(low) = self.cnt_high_latch.take() {
                return Word::from(low);
            }
            return Word::from((self.cnt & 0xFF) as u8);
        }
        if Some(offset) == l.psc_h {
            return Word::from(((self.psc_preload >> 8) & 0xFF) as u8);
        }
        if offset == l.psc_l {
            return Word::from((self.psc_preload & 0xFF) as u8);
        }
        if Some(offset) == l.arr_h {
            return Word::from(((self.arr_preload >> 8) & 0xFF) as u8);
        }
        if offset == l.arr_l {
            return Word::from((self.arr_preload & 0xFF) as u8);
        }
        for (i, &maybe_h) in l.ccr_h.iter().enumerate() {
            if Some(offset) == maybe_h {
                return Word::from(((self.channels[i].ccr >> 8) & 0xFF) as u8);
            }
        }
        for (i, &o) in l.ccr_l.iter().enumerate() {
            if offset == o {
                return Word::from((self.channels[i].ccr & 0xFF) as u8);
            }
        }
        0
    }

    fn write(&mut self, mcu: &mut Mcu, cell: CellRef, value: Word, _origin: WriteOrigin) -> Word {
        let offset = cell.addr - self.base;
        let v8 = (value & 0xFF) as u8;
        let l_cr1 = self.layout.cr1;
        let l_smcr = self.layout.smcr;
        let l_ier = self.layout.ier;
        let l_sr1 = self.layout.sr1;
        let l_egr = self.layout.egr;

        if offset == l_cr1 {
            self.cen = v8 & cr1_bit::CEN != 0;
            self.udis = v8 & cr1_bit::UDIS != 0;
            self.urs = v8 & cr1_bit::URS != 0;
            self.opm = v8 & cr1_bit::OPM != 0;
            if self.config.bidirectional {
                self.counting_down = v8 & cr1_bit::DIR != 0;
            }
            self.arpe = v8 & cr1_bit::ARPE != 0;
        } else if Some(offset) == l_smcr {
            self.smcr = v8;
        } else if offset == l_ier {
            self.uie = v8 & 0x01 != 0;
            for (i, ch) in self.channels.iter_mut().enumerate() {
                ch.irq_enabled = v8 & (1 << (i + 1)) != 0;
            }
        } else if offset == l_sr1 {
            // W1C: software may only clear bits, never set them.
            if v8 & 0x01 == 0 {
                self.uif = false;
            }
            for (i, ch) in self.channels.iter_mut().enumerate() {
                if v8 & (1 << (i + 1)) == 0 {
                    ch.pending = false;
                }
            }
        } else if offset == l_egr {
            if v8 & egr_bit::UG != 0 {
                self.force_update(true);
            }
            for (i, ch) in self.channels.iter_mut().enumerate() {
                if v8 & (1 << (i + 1)) != 0 {
                    ch.pending = true;
                }
            }
        } else {
            self.write_channel_registers(offset, v8);
        }

        let _ = mcu;
        value
    }

    fn tick(&mut self, mcu: &mut Mcu, cycles: u64) {
        if !self.cen || !self.clock_enabled {
            return;
        }
        for _ in 0..cycles {
            self.advance_one_cycle(mcu);
            if !self.cen {
                break; // one-pulse mode stopped the timer mid-burst
            }
        }
    }

    /// §4.6: `PCKENR` gating stops the clock this timer counts on without
    /// touching `CEN`, so a re-enabled timer resumes where it left off.
    fn happen(&mut self, _mcu: &mut Mcu, _source: PeripheralId, event: Event) {
        match event {
            Event::ClockOn => self.clock_enabled = true,
            Event::ClockOff => self.clock_enabled = false,
            _ => {}
        }
    }

    fn config_registers(&self) -> &'static [ConfigReg] {
        &[]
    }
}

impl Timer {
    fn write_channel_registers(&mut self, offset: Addr, v8: u8) {
        let l = &self.layout;
        for (i, &o) in l.ccmr.iter().enumerate() {
            if offset == o {
                self.channels[i].ccmr = v8;
                return;
            }
        }
        for (i, &o) in l.ccer.iter().enumerate() {
            if offset == o {
                self.channels[i].enabled = v8 & 0x01 != 0;
                return;
            }
        }
        if Some(offset) == l.cntr_h {
            self.cnt = (self.cnt & 0xFF) | (u32::from(v8) << 8);
            return;
        }
        if offset == l.cntr_l {
            self.cnt = (self.cnt & 0xFF00) | u32::from(v8);
            return;
        }
        if Some(offset) == l.psc_h {
            self.psc_high_buffer = Some(v8);
            return;
        }
        if offset == l.psc_l {
            let high = self.psc_high_buffer.take().unwrap_or((self.psc_preload >> 8) as u8);
            self.psc_preload = (u32::from(high) << 8) | u32::from(v8);
            if l.psc_h.is_none() {
                self.psc_preload = u32::from(v8);
            }
            return;
        }
        if Some(offset) == l.arr_h {
            // §4.8 "a high-byte write is buffered; the actual 16-bit update
            // happens on the matching low-byte write."
            self.arr_high_buffer = Some(v8);
            return;
        }
        if offset == l.arr_l {
            let high = self.arr_high_buffer.take().unwrap_or((self.arr_preload >> 8) as u8);
            self.arr_preload = if l.arr_h.is_some() {
                (u32::from(high) << 8) | u32::from(v8)
            } else {
                u32::from(v8)
            };
            if !self.arpe {
                self.arr = self.arr_preload;
            }
            return;
        }
        for (i, &maybe_h) in l.ccr_h.iter().enumerate() {
            if Some(offset) == maybe_h {
                self.channels[i].ccr_preload_high = Some(v8);
                return;
            }
        }
        for (i, &o) in l.ccr_l.iter().enumerate() {
            if offset == o {
                let high = self.channels[i].ccr_preload_high.take().unwrap_or((self.channels[i].ccr >> 8) as u8);
                self.channels[i].ccr = if l.ccr_h[i].is_some() {
                    (u32::from(high) << 8) | u32::from(v8)
                } else {
                    u32::from(v8)
                };
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ucsim_core::chip::{Chip, Fill};
    use ucsim_core::space::AddressSpace;

    fn setup(config: TimerConfig) -> (Mcu, Timer, ucsim_core::SpaceId) {
        let mut mcu = Mcu::new(16_000_000.0, 1);
        let sfr = mcu.add_chip(Chip::new("sfr", 0x100, 8, Fill::Constant(0)));
        let space = mcu.add_space(AddressSpace::new("sfr", 0, 0x100, 16));
        mcu.activate_plain(space, 0, 0xFF, sfr, 0);
        let mut timer = Timer::new(sfr, 0x00, 0, config);
        timer.install(&mut mcu, PeripheralId(0));
        (mcu, timer, space)
    }

    /// §8 scenario 3: general 16-bit timer, PSCR=3 (period 4 cycles),
    /// ARR=9, CEN=1, UIE=1. After 40 bus cycles, UIF=1, CNT=0.
    #[test]
    fn update_event_fires_on_rollover() {
        let (mut mcu, mut timer, space) = setup(TimerConfig::general_16bit(0, 0x10));
        let psc_l = timer.cell(timer.layout.psc_l);
        let arr_l = timer.cell(timer.layout.arr_l);
        let ier = timer.cell(timer.layout.ier);
        let cr1 = timer.cell(timer.layout.cr1);

        timer.write(&mut mcu, psc_l, 3, WriteOrigin::Software);
        timer.write(&mut mcu, arr_l, 9, WriteOrigin::Software);
        timer.write(&mut mcu, ier, 0x01, WriteOrigin::Software);
        timer.write(&mut mcu, cr1, cr1_bit::CEN.into(), WriteOrigin::Software);

        for _ in 0..40 {
            timer.tick(&mut mcu, 1);
        }
        let _ = space;
        assert!(timer.uif());
        assert_eq!(timer.cnt(), 0);
    }

    #[test]
    fn power_of_two_prescaler_matches_field() {
        let (_mcu, timer, _space) = setup(TimerConfig::basic_8bit(0x20));
        assert_eq!(timer.prescaler_cycles(), 1); // field 0 -> 2^0
    }

    #[test]
    fn high_byte_write_is_buffered_until_low_byte() {
        let (mut mcu, mut timer, _space) = setup(TimerConfig::general_16bit(0, 0x10));
        let arr_h = timer.layout.arr_h.unwrap();
        let arr_l = timer.layout.arr_l;
        timer.write(&mut mcu, timer.cell(arr_h), 0x01, WriteOrigin::Software);
        assert_eq!(timer.arr_preload, timer.mask); // not yet applied
        timer.write(&mut mcu, timer.cell(arr_l), 0x02, WriteOrigin::Software);
        assert_eq!(timer.arr_preload, 0x0102);
    }

    #[test]
    fn one_pulse_mode_clears_cen_on_update() {
        let (mut mcu, mut timer, _space) = setup(TimerConfig::general_16bit(0, 0x10));
        timer.arr_preload = 2;
        timer.arr = 2;
        timer.opm = true;
        timer.cen = true;
        timer.psc_preload = 0; // prescaler period 1
        timer.tick(&mut mcu, 3); // rolls over once at cnt==2
        assert!(!timer.cen);
    }

    #[test]
    fn w1c_uif_only_clears_not_sets() {
        let (mut mcu, mut timer, _space) = setup(TimerConfig::general_16bit(0, 0x10));
        timer.uif = true;
        let sr1 = timer.cell(timer.layout.sr1);
        timer.write(&mut mcu, sr1, 0xFF, WriteOrigin::Software);
        assert!(timer.uif); // writing 1 leaves it set
        timer.write(&mut mcu, sr1, 0x00, WriteOrigin::Software);
        assert!(!timer.uif); // writing 0 clears it
    }
}
