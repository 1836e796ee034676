//! The memory-and-peripheral substrate shared by every ucsim machine
//! binding: storage chips, addressable cells with their operator chains,
//! address decoders/spaces (including run-time bank switching and bit
//! banding), the `Hw` peripheral trait, the tick scheduler with its
//! named-ticker debugger facility, the variable table, Intel-HEX writing
//! and memory-dump formatting, and the error taxonomy every one of the
//! above reports through.
//!
//! Everything here is owned by one [`Mcu`] arena (§9 "Cyclic /
//! back-referenced graphs"): chips, decoders and peripherals are indexed
//! by small `Copy` ids rather than linked by pointer or `Rc`, so the whole
//! graph can be mutated through a single `&mut Mcu` without fighting the
//! borrow checker.

pub mod cell;
pub mod chip;
pub mod decoder;
pub mod dump;
pub mod error;
pub mod fmt;
pub mod hexwrite;
pub mod hw;
pub mod irq;
pub mod mcu;
pub mod scheduler;
pub mod space;
pub mod variable;

pub use cell::{BreakpointId, CellFlags, CellRef, Operator, WriteOrigin};
pub use chip::{Chip, ChipId, Fill};
pub use decoder::{BankTarget, Banker, BitBander, Decoder, DecoderId, DecoderKind};
pub use error::{ConfigError, ErrorSink, MemError, MemErrorKind, RecordingErrorSink, ResourceError};
pub use hw::{ConfigReg, Event, Hw, HwCategory, PeripheralId};
pub use irq::{InterruptSource, InterruptSourceId, InterruptTable};
pub use mcu::{BreakpointGate, Mcu};
pub use scheduler::{Ticker, TickerDirection, TickerFilter, TickerSpec, TickScheduler};
pub use space::{AddressSpace, SpaceId};
pub use variable::{Variable, VariableTable};

/// An address within a chip or an address space. MCUs in scope here have
/// at most 24-bit address buses (STM8's largest), so `u32` is ample and
/// keeps arithmetic free of awkward `usize`/`u16` casts at call sites.
pub type Addr = u32;

/// A cell's value. Widths in scope (1..=32 bits, overwhelmingly 8 or 16)
/// all fit comfortably; the chip's mask enforces the narrower width.
pub type Word = u32;
