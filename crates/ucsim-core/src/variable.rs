//! Symbol table binding a name to a cell and optional bit range (§3 Data
//! Model "Variable", §F.2). Added at symbol load, never modified.

use std::collections::HashMap;

use crate::cell::CellRef;

/// A named binding to a cell, optionally restricted to `[high, low]` bits
/// (`-1`/`None` meaning the whole word).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variable {
    pub cell: CellRef,
    pub bit_range: Option<(u8, u8)>,
}

#[derive(Debug, Default)]
pub struct VariableTable {
    by_name: HashMap<String, Variable>,
    /// Sorted by `(chip, addr, bit-range)`, rebuilt on every `define` — the
    /// table only grows at symbol-load time, so this stays cheap.
    by_address: Vec<(String, Variable)>,
}

impl VariableTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `cell` (whole word). Returns `false` if the name is
    /// already taken — names must be unique, matching §3's invariant.
    pub fn define(&mut self, name: impl Into<String>, cell: CellRef) -> bool {
        self.define_bits(name, cell, None)
    }

    pub fn define_bits(
        &mut self,
        name: impl Into<String>,
        cell: CellRef,
        bit_range: Option<(u8, u8)>,
    ) -> bool {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return false;
        }
        let var = Variable { cell, bit_range };
        self.by_name.insert(name.clone(), var);
        self.by_address.push((name, var));
        self.by_address.sort_by_key(|(_, v)| {
            (
                v.cell.chip.0,
                v.cell.addr,
                v.bit_range.map_or(-1i16, |(h, _)| i16::from(h)),
            )
        });
        true
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Variable> {
        self.by_name.get(name)
    }

    /// All variables bound to `cell`, in `by_address` order.
    #[must_use]
    pub fn by_address(&self, cell: CellRef) -> Vec<(&str, &Variable)> {
        self.by_address
            .iter()
            .filter(|(_, v)| v.cell == cell)
            .map(|(n, v)| (n.as_str(), v))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::ChipId;

    #[test]
    fn names_are_unique() {
        let mut table = VariableTable::new();
        let cell = CellRef::new(ChipId(0), 0x10);
        assert!(table.define("flag", cell));
        assert!(!table.define("flag", CellRef::new(ChipId(0), 0x20)));
    }

    #[test]
    fn lookup_by_address_returns_all_bindings() {
        let mut table = VariableTable::new();
        let cell = CellRef::new(ChipId(0), 0x10);
        table.define_bits("lo_bit", cell, Some((0, 0)));
        table.define_bits("whole", cell, None);
        assert_eq!(table.by_address(cell).len(), 2);
    }
}
