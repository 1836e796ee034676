//! The peripheral base (§4.5): every simulated on-chip device implements
//! [`Hw`], registers on cells through the [`crate::Mcu`] it is installed
//! into, and is notified on tick/read/write/partner events.

use crate::cell::{CellRef, WriteOrigin};
use crate::mcu::Mcu;
use crate::Word;

/// Arena index for a peripheral instance, owned by the [`Mcu`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeripheralId(pub usize);

/// What kind of device a peripheral is — used by the VCD recorder's
/// category-skipping read and by partner bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwCategory {
    Clock,
    Timer,
    Uart,
    Gpio,
    Vcd,
    Other(u16),
}

/// A lifecycle/clock event a peripheral can broadcast to its partners
/// (§4.6 "broadcasts clock-on/off events", §9 glossary "Partner").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    ClockOn,
    ClockOff,
    Reset,
    BankChanged { bank: usize },
    /// A GPIO port's input-qualifying pins sampled a new level (§4.7).
    /// `qualifying_mask` has a bit set for every pin with `DDR=0` (input)
    /// and `CR2=1` (interrupt enabled); `levels` carries the pins'
    /// current input values. Consumed by the EXTI controller, which
    /// tracks the prior sample per port to detect edges.
    GpioSample { port: u8, qualifying_mask: u8, levels: u8 },
}

/// Metadata for one out-of-band configuration pseudo-register (§4.5
/// "Configuration").
#[derive(Debug, Clone, Copy)]
pub struct ConfigReg {
    pub name: &'static str,
    pub description: &'static str,
}

/// Base contract every peripheral implements (§4.5).
///
/// Methods take `&mut Mcu` rather than returning an event list because a
/// peripheral's `tick`/`happen`/`write` may itself need to read/write
/// sibling cells or emit further events — exactly the "inter-peripheral
/// events" §2 describes. [`Mcu`] guards re-entrancy by temporarily taking
/// ownership of the callee out of its arena for the duration of the call
/// (see `Mcu::with_peripheral`), so a peripheral can never observe itself
/// mid-call through this pointer.
pub trait Hw {
    fn category(&self) -> HwCategory;
    fn instance(&self) -> u32;

    /// Restore power-on register values, bit-exact with the reference
    /// manual for the modeled device.
    fn reset(&mut self, mcu: &mut Mcu);

    /// Invoked when a registered cell is read through its operator chain.
    fn read(&mut self, mcu: &mut Mcu, cell: CellRef) -> Word;

    /// Invoked when a registered cell is written through its operator
    /// chain. Returns the (possibly rewritten) value that continues down
    /// the chain.
    fn write(&mut self, mcu: &mut Mcu, cell: CellRef, value: Word, origin: WriteOrigin) -> Word;

    /// Advance internal state by `cycles` virtual cycles.
    fn tick(&mut self, mcu: &mut Mcu, cycles: u64);

    /// A partner's lifecycle/clock event arrived.
    fn happen(&mut self, mcu: &mut Mcu, source: PeripheralId, event: Event);

    /// Out-of-band configuration pseudo-registers this peripheral
    /// exposes (e.g. "turn off simulation"). Empty by default.
    fn config_registers(&self) -> &'static [ConfigReg] {
        &[]
    }

    fn config_read(&mut self, _index: usize) -> Word {
        0
    }

    fn config_write(&mut self, _mcu: &mut Mcu, _index: usize, _value: Word) {}

    /// Text output the peripheral has accumulated for the debugger console
    /// to print (e.g. a VCD recorder's buffered trace) and now hands off,
    /// clearing its own copy. `None` for peripherals with nothing to say.
    /// Exists on the trait rather than on a concrete type so the console
    /// can drain any peripheral by id alone (§6 "`set hardware vcd[<id>]
    /// output <file>`").
    fn take_text_output(&mut self) -> Option<String> {
        None
    }
}
