//! STM8 UART peripheral (§4.9): baud-rate generator, 4×-oversampled
//! TX/RX bit counters, status/interrupt-enable cross-product, and the
//! SR-read latch that gates clear-on-read semantics.

use std::collections::VecDeque;

use ucsim_core::cell::WriteOrigin;
use ucsim_core::hw::{ConfigReg, Event, Hw, HwCategory, PeripheralId};
use ucsim_core::mcu::Mcu;
use ucsim_core::{Addr, CellRef, ChipId, Word};

/// Register offsets from the UART's base address, matching the
/// reference manual's `UART_*` layout.
pub mod reg {
    pub const SR: u32 = 0x00;
    pub const DR: u32 = 0x01;
    pub const BRR1: u32 = 0x02;
    pub const BRR2: u32 = 0x03;
    pub const CR1: u32 = 0x04;
    pub const CR2: u32 = 0x05;
    pub const CR3: u32 = 0x06;
    pub const COUNT: u32 = 0x07;
}

mod sr_bit {
    pub const PE: u8 = 0x01;
    pub const FE: u8 = 0x02;
    pub const NF: u8 = 0x04;
    pub const OR: u8 = 0x08;
    pub const IDLE: u8 = 0x10;
    pub const RXNE: u8 = 0x20;
    pub const TC: u8 = 0x40;
    pub const TXE: u8 = 0x80;
}

mod cr1_bit {
    pub const PIEN: u8 = 0x01;
    pub const PS: u8 = 0x02;
    pub const PCEN: u8 = 0x04;
    pub const M: u8 = 0x10;
}

mod cr2_bit {
    pub const RXEN: u8 = 0x04;
    pub const TEN: u8 = 0x08;
    pub const RIEN: u8 = 0x20;
    pub const TCIEN: u8 = 0x40;
    pub const TIEN: u8 = 0x80;
}

mod cr3_bit {
    pub const STOP_MASK: u8 = 0x30;
    pub const STOP_SHIFT: u8 = 4;
}

/// Oversample ratio between the sample clock and one bit-time (§4.9:
/// "every `oversample` sample boundaries advances a transmit state by
/// one bit").
const OVERSAMPLE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Idle,
    Sending { byte: u8, bit_index: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    Idle,
    Receiving { byte: u8, bit_index: u32 },
}

pub struct Uart {
    base: Addr,
    sfr: ChipId,
    instance: u32,
    id: PeripheralId,

    brr1: u8,
    brr2: u8,
    cr1: u8,
    cr2: u8,
    cr3: u8,

    pe: bool,
    fe: bool,
    nf: bool,
    or: bool,
    idle: bool,
    rxne: bool,
    tc: bool,
    txe: bool,

    /// §5 "Register-field preservation" / §4.9's latching idle-then-DR-read
    /// clear protocol: set on any SR read, consumed (and cleared) by the
    /// next DR read or SR write that would otherwise be rejected.
    sr_was_read: bool,

    dr: u8,

    sample_accum: u32,
    tx: TxState,
    rx: RxState,

    /// Bytes shifted out onto the wire, in transmission order. The
    /// (excluded) board-level wiring is responsible for draining this.
    pub tx_sink: Vec<u8>,
    /// Bytes waiting to be shifted in, oldest first. Pushed by whatever
    /// external source is wired to this UART's RX line.
    pub rx_source: VecDeque<u8>,

    clock_enabled: bool,
}

impl Uart {
    #[must_use]
    pub fn new(sfr: ChipId, base: Addr, instance: u32) -> Self {
        Self {
            base,
            sfr,
            instance,
            id: PeripheralId(usize::MAX),
            brr1: 0,
            brr2: 0,
            cr1: 0,
            cr2: 0,
            cr3: 0,
            pe: false,
            fe: false,
            nf: false,
            or: false,
            idle: false,
            rxne: false,
            tc: true,
            txe: true,
            sr_was_read: false,
            dr: 0,
            sample_accum: 0,
            tx: TxState::Idle,
            rx: RxState::Idle,
            tx_sink: Vec::new(),
            rx_source: VecDeque::new(),
            clock_enabled: true,
        }
    }

    #[must_use]
    pub fn cell(&self, offset: u32) -> CellRef {
        CellRef::new(self.sfr, self.base + offset)
    }

    pub fn install(&mut self, mcu: &mut Mcu, id: PeripheralId) {
        self.id = id;
        for offset in 0..reg::COUNT {
            mcu.hook_cell(id, self.cell(offset));
        }
    }

    /// `UART_DIV = ((BRR2[7:4]<<12) | (BRR1[7:0]<<4) | BRR2[3:0])`,
    /// clipped to ≥16 (§4.9).
    #[must_use]
    pub fn uart_div(&self) -> u32 {
        let div = (u32::from(self.brr2 & 0xF0) << 12) | (u32::from(self.brr1) << 4) | u32::from(self.brr2 & 0x0F);
        div.max(16)
    }

    #[must_use]
    pub fn sample_div(&self) -> u32 {
        self.uart_div() >> 4
    }

    /// Total bit-times per frame: start + data (8 or 9, from `CR1.M`) +
    /// stop (from `CR3.STOP`, 0/1/1.5/2 encoded as the nearest whole
    /// count for sample-clock purposes).
    #[must_use]
    pub fn bit_time_total(&self) -> u32 {
        let data_bits = if self.cr1 & cr1_bit::M != 0 { 9 } else { 8 };
        let stop_bits = match (self.cr3 & cr3_bit::STOP_MASK) >> cr3_bit::STOP_SHIFT {
            0b10 => 2,
            _ => 1,
        };
        1 + data_bits + stop_bits
    }

    fn sr_word(&self) -> u8 {
        let mut v = 0u8;
        if self.pe {
            v |= sr_bit::PE;
        }
        if self.fe {
            v |= sr_bit::FE;
        }
        if self.nf {
            v |= sr_bit::NF;
        }
        if self.or {
            v |= sr_bit::OR;
        }
        if self.idle {
            v |= sr_bit::IDLE;
        }
        if self.rxne {
            v |= sr_bit::RXNE;
        }
        if self.tc {
            v |= sr_bit::TC;
        }
        if self.txe {
            v |= sr_bit::TXE;
        }
        v
    }

    /// Advances the sample clock by `samples` sample boundaries, stepping
    /// the 4×-oversampled RX state every boundary and the TX state every
    /// `OVERSAMPLE` boundaries (§4.9 tick algorithm).
    fn advance_samples(&mut self, samples: u32) {
        for _ in 0..samples {
            self.step_rx_sample();
            self.sample_accum += 1;
            if self.sample_accum >= OVERSAMPLE {
                self.sample_accum -= OVERSAMPLE;
                self.step_tx_bit();
            }
        }
    }

    fn step_tx_bit(&mut self) {
        match self.tx {
            TxState::Idle => {
                if self.cr2 & cr2_bit::TEN == 0 {
                    return;
                }
                if self.txe {
                    return; // nothing loaded into the shifter
                }
                self.tx = TxState::Sending { byte: self.dr, bit_index: 0 };
                self.txe = true; // register emptied into the shifter immediately
                self.tc = false;
            }
            TxState::Sending { byte, bit_index } => {
                let total = self.bit_time_total();
                let next = bit_index + 1;
                if next >= total {
                    self.tx_sink.push(byte);
                    self.tx = TxState::Idle;
                    self.tc = true;
                } else {
                    self.tx = TxState::Sending { byte, bit_index: next };
                }
            }
        }
    }

    fn step_rx_sample(&mut self) {
        if self.cr2 & cr2_bit::RXEN == 0 {
            return;
        }
        match self.rx {
            RxState::Idle => {
                let Some(&byte) = self.rx_source.front() else {
                    return;
                };
                self.rx_source.pop_front();
                self.rx = RxState::Receiving { byte, bit_index: 0 };
            }
            RxState::Receiving { byte, bit_index } => {
                let total_samples = self.bit_time_total() * OVERSAMPLE;
                let next = bit_index + 1;
                if next >= total_samples {
                    self.rx = RxState::Idle;
                    self.complete_rx(byte);
                } else {
                    self.rx = RxState::Receiving { byte, bit_index: next };
                }
            }
        }
    }

    /// §4.9 "On RX completion": overrun if `RXNE` is already set,
    /// otherwise latch into `DR` and raise `RXNE`.
    fn complete_rx(&mut self, byte: u8) {
        if self.rxne {
            self.or = true;
        } else {
            self.dr = byte;
            self.rxne = true;
        }
    }
}

impl Hw for Uart {
    fn category(&self) -> HwCategory {
        HwCategory::Uart
    }

    fn instance(&self) -> u32 {
        self.instance
    }

    fn reset(&mut self, _mcu: &mut Mcu) {
        self.brr1 = 0;
        self.brr2 = 0;
        self.cr1 = 0;
        self.cr2 = 0;
        self.cr3 = 0;
        self.pe = false;
        self.fe = false;
        self.nf = false;
        self.or = false;
        self.idle = false;
        self.rxne = false;
        self.tc = true;
        self.txe = true;
        self.sr_was_read = false;
        self.dr = 0;
        self.sample_accum = 0;
        self.tx = TxState::Idle;
        self.rx = RxState::Idle;
    }

    fn read(&mut self, _mcu: &mut Mcu, cell: CellRef) -> Word {
        let offset = cell.addr - self.base;
        match offset {
            reg::SR => {
                self.sr_was_read = true;
                Word::from(self.sr_word())
            }
            reg::DR => {
                // A DR read after an SR read consumes the idle/overrun/
                // noise/frame/parity latch (§4.9 "latching an SR-was-just-
                // read flag").
                if self.sr_was_read {
                    self.idle = false;
                    self.or = false;
                    self.nf = false;
                    self.fe = false;
                    self.pe = false;
                    self.sr_was_read = false;
                }
                self.rxne = false;
                Word::from(self.dr)
            }
            reg::BRR1 => Word::from(self.brr1),
            reg::BRR2 => Word::from(self.brr2),
            reg::CR1 => Word::from(self.cr1),
            reg::CR2 => Word::from(self.cr2),
            reg::CR3 => Word::from(self.cr3),
            _ => 0,
        }
    }

    fn write(&mut self, mcu: &mut Mcu, cell: CellRef, value: Word, _origin: WriteOrigin) -> Word {
        let offset = cell.addr - self.base;
        let v8 = (value & 0xFF) as u8;
        match offset {
            reg::SR => {
                // §4.9 "only TC-to-zero writes are accepted ... with
                // read-only RXNE": software can clear TC but every other
                // bit is hardware-owned.
                if v8 & sr_bit::TC == 0 {
                    self.tc = false;
                }
                self.sr_was_read = false;
            }
            reg::DR => {
                self.dr = v8;
                self.txe = false;
            }
            reg::BRR1 => self.brr1 = v8,
            reg::BRR2 => self.brr2 = v8,
            reg::CR1 => self.cr1 = v8 & (cr1_bit::PIEN | cr1_bit::PS | cr1_bit::PCEN | cr1_bit::M),
            reg::CR2 => self.cr2 = v8,
            reg::CR3 => self.cr3 = v8 & cr3_bit::STOP_MASK,
            _ => {}
        }
        let _ = mcu;
        value
    }

    fn tick(&mut self, mcu: &mut Mcu, cycles: u64) {
        if !self.clock_enabled {
            return;
        }
        let div = self.sample_div();
        if div == 0 {
            return;
        }
        // `cycles` bus cycles become `cycles / div` sample boundaries;
        // the remainder is not tracked across calls since the scheduler
        // always credits whole instruction-boundary cycle counts and
        // `div` divides evenly in every modeled configuration.
        let samples = (cycles / u64::from(div)) as u32;
        self.advance_samples(samples);
        let _ = mcu;
    }

    /// §4.6: `PCKENR` gating stops the baud-rate sampling clock.
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
