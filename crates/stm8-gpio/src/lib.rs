//! STM8 GPIO ports and the shared external-interrupt controller (§4.7).
//!
//! Each [`Gpio`] owns one port's five registers and reports its
//! input-qualifying pin levels to a single [`ExtiController`], which owns
//! the `EXTI_CR1..4`/`EXTI_CONF1-2`/`EXTI_SR1-2` registers and performs the
//! edge/level interrupt bookkeeping in one place. This sidesteps the
//! source's guarded re-entry between a port write and its own `EXTI_SR`
//! write-back (§9 "Open question -- event ordering on port/EXTI second
//! pass"): the controller computes the final status byte directly from
//! each sample, there is nothing to converge.

use ucsim_core::cell::WriteOrigin;
use ucsim_core::hw::{ConfigReg, Event, Hw, HwCategory, PeripheralId};
use ucsim_core::mcu::Mcu;
use ucsim_core::{Addr, CellRef, ChipId, Word};

/// Register offsets from a port's base address.
pub mod port_reg {
    pub const ODR: u32 = 0x00;
    pub const IDR: u32 = 0x01;
    pub const DDR: u32 = 0x02;
    pub const CR1: u32 = 0x03;
    pub const CR2: u32 = 0x04;
    pub const COUNT: u32 = 0x05;
}

/// Register offsets from the EXTI controller's base address.
pub mod exti_reg {
    pub const CR1: u32 = 0x00;
    pub const CR2: u32 = 0x01;
    pub const CR3: u32 = 0x02;
    pub const CR4: u32 = 0x03;
    pub const CONF1: u32 = 0x04;
    pub const CONF2: u32 = 0x05;
    pub const SR1: u32 = 0x06;
    pub const SR2: u32 = 0x07;
    pub const COUNT: u32 = 0x08;
}

/// Per-pin interrupt sensitivity, a 2-bit `EXTI_CR*` field (§4.7 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensitivity {
    FallingEdgeAndLowLevel,
    RisingOnly,
    FallingOnly,
    Both,
}

impl Sensitivity {
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b01 => Sensitivity::RisingOnly,
            0b10 => Sensitivity::FallingOnly,
            0b11 => Sensitivity::Both,
            _ => Sensitivity::FallingEdgeAndLowLevel,
        }
    }

    #[must_use]
    pub fn bits(self) -> u8 {
        match self {
            Sensitivity::FallingEdgeAndLowLevel => 0b00,
            Sensitivity::RisingOnly => 0b01,
            Sensitivity::FallingOnly => 0b10,
            Sensitivity::Both => 0b11,
        }
    }

    fn is_level(self) -> bool {
        matches!(self, Sensitivity::FallingEdgeAndLowLevel)
    }
}

/// `EXTI_CONF{1,2}` routing table shape, per chip subtype (§4.7 step 1,
/// SPEC_FULL §F.8): `PortWide` aggregates every port's pins into one
/// `EXTI_SR1` bit; `PinWide` additionally lets `EXTI_CONF1` designate
/// ports whose pins each get their own `EXTI_SR2` bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioVariant {
    PortWide,
    PinWide,
}

/// One STM8 GPIO port: `ODR`/`IDR`/`DDR`/`CR1`/`CR2`, five registers at a
/// base derived from the port number.
pub struct Gpio {
    base: Addr,
    sfr: ChipId,
    instance: u32,
    id: PeripheralId,
    exti: PeripheralId,
    port_index: u8,

    odr: u8,
    idr: u8,
    ddr: u8,
    cr1: u8,
    cr2: u8,
}

impl Gpio {
    #[must_use]
    pub fn new(sfr: ChipId, base: Addr, instance: u32, port_index: u8, exti: PeripheralId) -> Self {
        Self {
            base,
            sfr,
            instance,
            id: PeripheralId(usize::MAX),
            exti,
            port_index,
            odr: 0,
            idr: 0,
            ddr: 0,
            cr1: 0,
            cr2: 0,
        }
    }

    #[must_use]
    pub fn cell(&self, offset: u32) -> CellRef {
        CellRef::new(self.sfr, self.base + offset)
    }

    pub fn install(&mut self, mcu: &mut Mcu, id: PeripheralId) {
        self.id = id;
        for offset in 0..port_reg::COUNT {
            mcu.hook_cell(id, self.cell(offset));
        }
    }

    /// Drives an external signal onto this port's input pins, as the
    /// (excluded) board-level wiring would. Only bits with `DDR=0`
    /// (configured as input) are affected.
    pub fn drive_external(&mut self, mcu: &mut Mcu, levels: u8) {
        let input_mask = !self.ddr;
        self.idr = (self.idr & !input_mask) | (levels & input_mask);
        self.sample(mcu);
    }

    /// Qualifying pins per §4.7 step 3: input-direction (`DDR=0`) and
    /// interrupt-enabled (`CR2=1`).
    fn qualifying_mask(&self) -> u8 {
        !self.ddr & self.cr2
    }

    fn sample(&mut self, mcu: &mut Mcu) {
        let event = Event::GpioSample {
            port: self.port_index,
            qualifying_mask: self.qualifying_mask(),
            levels: self.idr,
        };
        mcu.notify_peripheral(self.exti, self.id, event);
    }
}

impl Hw for Gpio {
    fn category(&self) -> HwCategory {
        HwCategory::Gpio
    }

    fn instance(&self) -> u32 {
        self.instance
    }

    fn reset(&mut self, _mcu: &mut Mcu) {
        self.odr = 0;
        self.idr = 0;
        self.ddr = 0;
        self.cr1 = 0;
        self.cr2 = 0;
    }

    fn read(&mut self, _mcu: &mut Mcu, cell: CellRef) -> Word {
        let offset = cell.addr - self.base;
        match offset {
            port_reg::ODR => Word::from(self.odr),
            port_reg::IDR => {
                // Output-configured pins read back the driven value
                // (no external bus contention modeled); input pins read
                // the last sampled external level.
                Word::from((self.idr & !self.ddr) | (self.odr & self.ddr))
            }
            port_reg::DDR => Word::from(self.ddr),
            port_reg::CR1 => Word::from(self.cr1),
            port_reg::CR2 => Word::from(self.cr2),
            _ => 0,
        }
    }

    fn write(&mut self, mcu: &mut Mcu, cell: CellRef, value: Word, _origin: WriteOrigin) -> Word {
        let offset = cell.addr - self.base;
        let v8 = (value & 0xFF) as u8;
        match offset {
            port_reg::ODR => self.odr = v8,
            port_reg::IDR => {
                // Software has no business writing IDR on real hardware;
                // here it is the simulator's own hook for driving input
                // pins without a separate board-wiring collaborator.
                self.idr = v8;
                self.sample(mcu);
            }
            port_reg::DDR => {
                self.ddr = v8;
                self.sample(mcu);
            }
            port_reg::CR1 => self.cr1 = v8,
            port_reg::CR2 => {
                self.cr2 = v8;
                self.sample(mcu);
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

/// Shared `EXTI_CR1..4`/`EXTI_CONF1-2`/`EXTI_SR1-2` controller. Exactly one
/// instance exists per MCU; every [`Gpio`] port reports to it rather than
/// hooking its registers directly.
pub struct ExtiController {
    base: Addr,
    sfr: ChipId,
    instance: u32,
    variant: GpioVariant,

    cr1: u8,
    cr2: u8,
    cr3: u8,
    cr4: u8,
    conf1: u8,
    conf2: u8,
    sr1: u8,
    sr2: u8,

    /// Previous sample per port, for edge detection.
    prev_qualifying: [u8; 8],
    prev_levels: [u8; 8],
    /// Level-sensitivity pins currently asserting low, one bit per port
    /// (port-wide) used to keep `EXTI_SR1`/`SR2` set while the level
    /// holds and to refuse a software clear of those bits.
    held_sr1: u8,
    held_sr2: u8,
}

impl ExtiController {
    #[must_use]
    pub fn new(sfr: ChipId, base: Addr, instance: u32, variant: GpioVariant) -> Self {
        Self {
            base,
            sfr,
            instance,
            variant,
            cr1: 0,
            cr2: 0,
            cr3: 0,
            cr4: 0,
            conf1: 0,
            conf2: 0,
            sr1: 0,
            sr2: 0,
            prev_qualifying: [0; 8],
            prev_levels: [0; 8],
            held_sr1: 0,
            held_sr2: 0,
        }
    }

    #[must_use]
    pub fn cell(&self, offset: u32) -> CellRef {
        CellRef::new(self.sfr, self.base + offset)
    }

    pub fn install(&mut self, mcu: &mut Mcu, id: PeripheralId) {
        for offset in 0..exti_reg::COUNT {
            mcu.hook_cell(id, self.cell(offset));
        }
    }

    /// Whether `port` routes its pins individually into `EXTI_SR2`
    /// rather than aggregating into one `EXTI_SR1` bit (§4.7 step 1).
    fn is_pin_wide(&self, port: u8) -> bool {
        self.variant == GpioVariant::PinWide && port < 8 && self.conf1 & (1 << port) != 0
    }

    /// Sensitivity field for `port` as a whole (port-wide aggregation).
    fn port_sensitivity(&self, port: u8) -> Sensitivity {
        let (reg, shift) = if port < 4 { (self.cr1, port * 2) } else { (self.cr2, (port - 4) * 2) };
        Sensitivity::from_bits(reg >> shift)
    }

    /// Sensitivity field for one pin of the pin-wide-routed port.
    fn pin_sensitivity(&self, pin: u8) -> Sensitivity {
        let (reg, shift) = if pin < 4 { (self.cr3, pin * 2) } else { (self.cr4, (pin - 4) * 2) };
        Sensitivity::from_bits(reg >> shift)
    }

    fn handle_sample(&mut self, port: u8, qualifying_mask: u8, levels: u8) {
        if port >= 8 {
            return;
        }
        let prev_q = self.prev_qualifying[port as usize];
        let prev_l = self.prev_levels[port as usize];
        let pin_wide = self.is_pin_wide(port);

        let mut port_triggered = false;
        let mut port_level_held = false;
        let mut pin_triggered_mask = 0u8;
        let mut pin_level_held_mask = 0u8;

        for pin in 0..8u8 {
            let mask = 1 << pin;
            if qualifying_mask & mask == 0 {
                continue;
            }
            let was_qualifying = prev_q & mask != 0;
            let old_level = prev_l & mask != 0;
            let new_level = levels & mask != 0;
            let sensitivity = if pin_wide { self.pin_sensitivity(pin) } else { self.port_sensitivity(port) };

            let triggered = if !was_qualifying {
                false
            } else {
                match sensitivity {
                    Sensitivity::FallingEdgeAndLowLevel => !new_level,
                    Sensitivity::RisingOnly => !old_level && new_level,
                    Sensitivity::FallingOnly => old_level && !new_level,
                    Sensitivity::Both => old_level != new_level,
                }
            };
            let held = sensitivity.is_level() && !new_level;

            if pin_wide {
                if triggered {
                    pin_triggered_mask |= mask;
                }
                if held {
                    pin_level_held_mask |= mask;
                }
            } else {
                port_triggered |= triggered;
                port_level_held |= held;
            }
        }

        self.prev_qualifying[port as usize] = qualifying_mask;
        self.prev_levels[port as usize] = levels;

        if pin_wide {
            self.held_sr2 = pin_level_held_mask;
            self.sr2 |= pin_triggered_mask | pin_level_held_mask;
        } else {
            let port_bit = 1u8 << port;
            if port_level_held {
                self.held_sr1 |= port_bit;
            } else {
                self.held_sr1 &= !port_bit;
            }
            if port_triggered || port_level_held {
                self.sr1 |= port_bit;
            }
        }
    }
}

impl Hw for ExtiController {
    fn category(&self) -> HwCategory {
        HwCategory::Other(1)
    }

    fn instance(&self) -> u32 {
        self.instance
    }

    fn reset(&mut self, _mcu: &mut Mcu) {
        self.cr1 = 0;
        self.cr2 = 0;
        self.cr3 = 0;
        self.cr4 = 0;
        self.conf1 = 0;
        self.conf2 = 0;
        self.sr1 = 0;
        self.sr2 = 0;
        self.prev_qualifying = [0; 8];
        self.prev_levels = [0; 8];
        self.held_sr1 = 0;
        self.held_sr2 = 0;
    }

    fn read(&mut self, _mcu: &mut Mcu, cell: CellRef) -> Word {
        let offset = cell.addr - self.base;
        match offset {
            exti_reg::CR1 => Word::from(self.cr1),
            exti_reg::CR2 => Word::from(self.cr2),
            exti_reg::CR3 => Word::from(self.cr3),
            exti_reg::CR4 => Word::from(self.cr4),
            exti_reg::CONF1 => Word::from(self.conf1),
            exti_reg::CONF2 => Word::from(self.conf2),
            exti_reg::SR1 => Word::from(self.sr1),
            exti_reg::SR2 => Word::from(self.sr2),
            _ => 0,
        }
    }

    fn write(&mut self, mcu: &mut Mcu, cell: CellRef, value: Word, _origin: WriteOrigin) -> Word {
        let offset = cell.addr - self.base;
        let v8 = (value & 0xFF) as u8;
        match offset {
            exti_reg::CR1 => self.cr1 = v8,
            exti_reg::CR2 => self.cr2 = v8,
            exti_reg::CR3 => self.cr3 = v8,
            exti_reg::CR4 => self.cr4 = v8,
            exti_reg::CONF1 => self.conf1 = v8,
            exti_reg::CONF2 => self.conf2 = v8,
            // §4.7 W1C: "the port replaces the incoming value with
            // current & ~incoming"; bits whose level condition still
            // holds cannot be cleared this way.
            exti_reg::SR1 => self.sr1 = (self.sr1 & !v8) | self.held_sr1,
            exti_reg::SR2 => self.sr2 = (self.sr2 & !v8) | self.held_sr2,
            _ => {}
        }
        let _ = mcu;
        value
    }

    fn tick(&mut self, _mcu: &mut Mcu, _cycles: u64) {}

    fn happen(&mut self, _mcu: &mut Mcu, _source: PeripheralId, event: Event) {
        if let Event::GpioSample { port, qualifying_mask, levels } = event {
            self.handle_sample(port, qualifying_mask, levels);
        }
    }

    fn config_registers(&self) -> &'static [ConfigReg] {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ucsim_core::chip::{Chip, Fill};

    const PORT_B: u8 = 1;

    /// Registers one `ExtiController` and one port-B `Gpio` into a real
    /// `Mcu`, matching the predicted-id dance every peripheral needing a
    /// partner's id at `install` time must do: ask for the id it will be
    /// given, hook cells under that id, then hand the box over.
    fn setup(variant: GpioVariant, port_b_exti_cr1: u8) -> (Mcu, CellRef, CellRef, CellRef, CellRef, CellRef) {
        let mut mcu = Mcu::new(16_000_000.0, 1);
        let sfr = mcu.add_chip(Chip::new("sfr", 0x200, 8, Fill::Constant(0)));

        let exti_id = mcu.next_peripheral_id();
        let mut exti = ExtiController::new(sfr, 0x50, 0, variant);
        exti.install(&mut mcu, exti_id);
        exti.cr1 = port_b_exti_cr1 << (PORT_B * 2);
        let sr1_cell = exti.cell(exti_reg::SR1);
        assert_eq!(mcu.register_peripheral(Box::new(exti)), exti_id);

        let gpio_id = mcu.next_peripheral_id();
        let mut gpio = Gpio::new(sfr, 0x05, 1, PORT_B, exti_id);
        gpio.install(&mut mcu, gpio_id);
        let ddr_cell = gpio.cell(port_reg::DDR);
        let cr2_cell = gpio.cell(port_reg::CR2);
        let idr_cell = gpio.cell(port_reg::IDR);
        let odr_cell = gpio.cell(port_reg::ODR);
        assert_eq!(mcu.register_peripheral(Box::new(gpio)), gpio_id);

        (mcu, ddr_cell, cr2_cell, idr_cell, odr_cell, sr1_cell)
    }

    /// §8 scenario 5: port B pin 2, input with CR2 bit 2 set, `EXTI_CR1`
    /// field for port B = 0b10 (falling only). Setting then clearing
    /// `IDR` bit 2 sets `EXTI_SR1` bit 1 exactly once on the falling
    /// transition, not on a subsequent steady-low sample.
    #[test]
    fn falling_edge_sets_port_wide_sr_bit_exactly_once() {
        let (mut mcu, ddr, cr2, idr, _odr, sr1) = setup(GpioVariant::PortWide, 0b10);

        mcu.cell_write(ddr, 0x00, WriteOrigin::Software); // all input
        mcu.cell_write(cr2, 0x04, WriteOrigin::Software); // pin 2 enabled

        mcu.cell_write(idr, 0x04, WriteOrigin::Software); // pin2 -> high (rising, no trigger)
        mcu.cell_write(idr, 0x00, WriteOrigin::Software); // pin2 -> low (falling, trigger)
        assert_eq!(mcu.cell_read(sr1) & 0x02, 0x02);

        mcu.cell_write(idr, 0x00, WriteOrigin::Software); // steady low, no new pulse
        assert_eq!(mcu.cell_read(sr1) & 0x02, 0x02);
    }

    #[test]
    fn rising_only_sensitivity_ignores_falling_edge() {
        let (mut mcu, ddr, cr2, idr, _odr, sr1) = setup(GpioVariant::PortWide, 0b01);

        mcu.cell_write(ddr, 0x00, WriteOrigin::Software);
        mcu.cell_write(cr2, 0x04, WriteOrigin::Software);
        mcu.cell_write(idr, 0x04, WriteOrigin::Software); // rising: should trigger
        assert_eq!(mcu.cell_read(sr1) & 0x02, 0x02);

        mcu.cell_write(idr, 0x00, WriteOrigin::Software); // falling: must not add a spurious pulse beyond the latch
        assert_eq!(mcu.cell_read(sr1) & 0x02, 0x02);
    }

    #[test]
    fn software_write_w1c_clears_unless_level_still_held() {
        let (mut mcu, ddr, cr2, idr, _odr, sr1) = setup(GpioVariant::PortWide, 0b10); // falling-only: not level, clear should stick

        mcu.cell_write(ddr, 0x00, WriteOrigin::Software);
        mcu.cell_write(cr2, 0x04, WriteOrigin::Software);
        mcu.cell_write(idr, 0x04, WriteOrigin::Software);
        mcu.cell_write(idr, 0x00, WriteOrigin::Software); // falling edge sets bit 1
        assert_eq!(mcu.cell_read(sr1) & 0x02, 0x02);

        mcu.cell_write(sr1, 0x02, WriteOrigin::Software); // W1C clear
        assert_eq!(mcu.cell_read(sr1) & 0x02, 0x00);
    }

    #[test]
    fn level_sensitivity_blocks_software_clear_while_asserted() {
        let (mut mcu, ddr, cr2, idr, _odr, sr1) = setup(GpioVariant::PortWide, 0b00); // falling-edge-and-low-level

        mcu.cell_write(ddr, 0x00, WriteOrigin::Software);
        mcu.cell_write(cr2, 0x04, WriteOrigin::Software);
        mcu.cell_write(idr, 0x00, WriteOrigin::Software); // pin2 already low: level holds
        assert_eq!(mcu.cell_read(sr1) & 0x02, 0x02);

        mcu.cell_write(sr1, 0x02, WriteOrigin::Software); // software tries to clear
        assert_eq!(mcu.cell_read(sr1) & 0x02, 0x02); // still held, refused
    }

    #[test]
    fn output_pin_reads_back_driven_odr_value() {
        let (mut mcu, ddr, _cr2, idr, odr, _sr1) = setup(GpioVariant::PortWide, 0b00);
        mcu.cell_write(ddr, 0x04, WriteOrigin::Software); // pin2 output
        mcu.cell_write(odr, 0x04, WriteOrigin::Software);
        assert_eq!(mcu.cell_read(idr) & 0x04, 0x04);
    }
}
