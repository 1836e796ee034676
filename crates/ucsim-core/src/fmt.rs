//! Shared address/value formatting helpers.
//!
//! Centralised so the dump formatter and the error `Display` impls agree on
//! width and case, instead of each call site re-deriving it.

use crate::{Addr, Word};

/// Format an address as a `0x`-prefixed hex string, zero-padded to the
/// number of hex digits needed for `addr_bits`.
#[must_use]
pub fn hex_addr(addr: Addr, addr_bits: u32) -> String {
    let digits = addr_bits.div_ceil(4).max(1) as usize;
    format!("0x{addr:0digits$X}")
}

/// Format a cell value as a `0x`-prefixed hex string, zero-padded to the
/// number of hex digits needed for `width_bits`.
#[must_use]
pub fn hex_word(value: Word, width_bits: u32) -> String {
    let digits = width_bits.div_ceil(4).max(1) as usize;
    format!("0x{value:0digits$X}")
}
