//! Symbol table for shape-dimension variables
//!
//! A symbol names an integer dimension that must take the same value at
//! every pattern position referencing it. Bindings are scoped to one match
//! attempt; `Or` alternatives snapshot and restore the table so a failed
//! alternative leaks nothing.

/// Identifier of a symbol declared on a pattern tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub(crate) usize);

/// Per-match-attempt symbol bindings
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    values: Vec<Option<i64>>,
}

impl SymbolTable {
    /// Table for `count` symbols, all unbound
    pub fn new(count: usize) -> Self {
        SymbolTable {
            values: vec![None; count],
        }
    }

    /// Bind on first observation, check equality on later ones
    ///
    /// Returns `false` on a symbol conflict (two different observed values
    /// within one attempt) — treated as a match failure, never an error.
    pub fn bind_or_check(&mut self, symbol: SymbolId, observed: i64) -> bool {
        match self.values.get_mut(symbol.0) {
            Some(slot) => match slot {
                Some(bound) => *bound == observed,
                None => {
                    *slot = Some(observed);
                    true
                }
            },
            None => false,
        }
    }

    /// Current binding of a symbol
    pub fn get(&self, symbol: SymbolId) -> Option<i64> {
        self.values.get(symbol.0).copied().flatten()
    }

    /// Snapshot for backtracking across `Or` alternatives
    pub fn snapshot(&self) -> Vec<Option<i64>> {
        self.values.clone()
    }

    /// Restore a snapshot taken before a failed alternative
    pub fn restore(&mut self, snapshot: Vec<Option<i64>>) {
        self.values = snapshot;
    }

    /// Clear all bindings between independent match attempts
    pub fn reset(&mut self) {
        for slot in &mut self.values {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_then_check() {
        let mut table = SymbolTable::new(1);
        let s = SymbolId(0);

        assert!(table.bind_or_check(s, 8192));
        assert_eq!(table.get(s), Some(8192));
        assert!(table.bind_or_check(s, 8192));
        // Conflict is a failure, not an error
        assert!(!table.bind_or_check(s, 4096));
    }

    #[test]
    fn test_snapshot_restore() {
        let mut table = SymbolTable::new(2);
        let a = SymbolId(0);
        let b = SymbolId(1);

        assert!(table.bind_or_check(a, 3));
        let snap = table.snapshot();

        assert!(table.bind_or_check(b, 7));
        table.restore(snap);

        assert_eq!(table.get(a), Some(3));
        assert_eq!(table.get(b), None);
    }

    #[test]
    fn test_reset() {
        let mut table = SymbolTable::new(1);
        assert!(table.bind_or_check(SymbolId(0), 5));
        table.reset();
        assert_eq!(table.get(SymbolId(0)), None);
        assert!(table.bind_or_check(SymbolId(0), 6));
    }
}
