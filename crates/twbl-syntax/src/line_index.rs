//! Line-number lookup for symbols.

use crate::symbol::{SymbolData, SymbolId};
use slotmap::SlotMap;

/// Maps each line number to the symbols starting on or intersecting it.
/// Derived data: it must be rebuilt whenever the symbol tree changes.
#[derive(Debug, Clone, Default)]
pub struct LineIndex {
    map: crate::HashMap<u32, Vec<SymbolId>>,
}

impl LineIndex {
    #[must_use]
    pub fn build(symbols: &SlotMap<SymbolId, SymbolData>) -> Self {
        let mut map: crate::HashMap<u32, Vec<SymbolId>> = Default::default();

        for (id, data) in symbols.iter() {
            for line in data.range.start.line..=data.range.end.line {
                map.entry(line).or_default().push(id);
            }
        }

        Self { map }
    }

    #[must_use]
    pub fn symbols_on(&self, line: u32) -> &[SymbolId] {
        self.map.get(&line).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.map.len()
    }
}
