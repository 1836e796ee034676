//! Memory dump formatting (§6 "Memory dump"): address, aligned variable
//! name (if any), raw hex bytes, a decoded bit view, and a printable
//! character view. `smart` additionally flags bytes marked as instruction
//! opcodes (§F.4's `CELL_INST`); actual disassembly is the excluded
//! CPU/debugger layer's job, so `smart` here only marks the boundary.

use crate::cell::CellFlags;
use crate::fmt::hex_addr;
use crate::mcu::Mcu;
use crate::space::SpaceId;
use crate::Addr;

#[derive(Debug, Clone, Copy)]
pub struct DumpOptions {
    pub bits_per_row: u32,
    pub smart: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            bits_per_row: 128,
            smart: false,
        }
    }
}

/// Renders `[start, stop]` of `space` as one line per row of
/// `bits_per_row / 8` cells. Uses [`Mcu::space_get`] (the raw, no-side-effect
/// read) so dumping memory never triggers hw-callbacks or VCD watchpoints.
#[must_use]
pub fn dump(mcu: &mut Mcu, space: SpaceId, start: Addr, stop: Addr, opts: DumpOptions) -> String {
    let addr_bits = mcu.space(space).addr_bits();
    let per_row = (opts.bits_per_row / 8).max(1);
    let mut out = String::new();
    let mut addr = start;
    loop {
        let row_end = addr.saturating_add(per_row - 1).min(stop);
        write_row(mcu, space, addr, row_end, addr_bits, opts.smart, &mut out);
        if row_end >= stop {
            break;
        }
        addr = row_end + 1;
    }
    out
}

fn write_row(mcu: &mut Mcu, space: SpaceId, begin: Addr, end: Addr, addr_bits: u32, smart: bool, out: &mut String) {
    out.push_str(&hex_addr(begin, addr_bits));

    let cell = mcu.get_cell(space, begin);
    match mcu.variables().by_address(cell).first() {
        Some((name, _)) => out.push_str(&format!(" {name:<12}")),
        None => out.push_str(&" ".repeat(13)),
    }
    out.push_str(": ");

    let bytes: Vec<u32> = (begin..=end).map(|a| mcu.space_get(space, a)).collect();

    for b in &bytes {
        out.push_str(&format!("{:02X} ", b & 0xFF));
    }
    out.push(' ');
    for b in &bytes {
        out.push_str(&format!("{:08b} ", b & 0xFF));
    }
    out.push(' ');
    for b in &bytes {
        let c = (*b & 0xFF) as u8;
        out.push(if c.is_ascii_graphic() || c == b' ' { c as char } else { '.' });
    }

    if smart {
        let instr_cell = mcu.chip(cell.chip).get_flag(cell.addr, CellFlags::INST);
        if instr_cell {
            out.push_str("  <instr>");
        }
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::{Chip, Fill};
    use crate::space::AddressSpace;

    #[test]
    fn dump_row_contains_hex_and_ascii() {
        let mut mcu = Mcu::new(1.0, 1);
        let space = mcu.add_space(AddressSpace::new("mem", 0, 16, 8));
        let chip = mcu.add_chip(Chip::new("ram", 16, 8, Fill::Constant(0)));
        mcu.activate_plain(space, 0, 15, chip, 0);
        mcu.space_write(space, 0, b'A' as u32);
        mcu.space_write(space, 1, 0x00);

        let out = dump(&mut mcu, space, 0, 7, DumpOptions { bits_per_row: 64, smart: false });
        assert!(out.contains("41 "));
        assert!(out.contains('A'));
        assert!(out.contains('.'));
    }

    #[test]
    fn dump_covers_full_range_across_multiple_rows() {
        let mut mcu = Mcu::new(1.0, 1);
        let space = mcu.add_space(AddressSpace::new("mem", 0, 32, 8));
        let chip = mcu.add_chip(Chip::new("ram", 32, 8, Fill::Constant(0)));
        mcu.activate_plain(space, 0, 31, chip, 0);

        let out = dump(&mut mcu, space, 0, 31, DumpOptions { bits_per_row: 64, smart: false });
        assert_eq!(out.lines().count(), 4);
    }
}
