//! The resolver's output: a whole program with one merged namespace.
//!
//! Files and symbols are plain vectors addressed by integer ids — two
//! passes (collect, then link) build the structure without any recursive
//! ownership between files.

use crate::ast::SourceUnit;
use crate::Span;
use std::collections::HashMap;
use std::fmt;

/// Index into [`ResolvedProgram::symbols`].
pub type SymbolId = usize;

/// Where a symbol was declared, for error messages and layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolLocation {
    /// Declaring file, or [`SymbolLocation::RESOURCE_TABLE`] for symbols
    /// implied by the project's resource table.
    pub file: String,
    pub span: Span,
}

impl SymbolLocation {
    /// Pseudo-file for resource-table symbols, which have no source span.
    pub const RESOURCE_TABLE: &'static str = "(resource table)";

    pub fn new(file: impl Into<String>, span: Span) -> Self {
        Self {
            file: file.into(),
            span,
        }
    }

    pub fn resource_table() -> Self {
        Self {
            file: Self::RESOURCE_TABLE.to_string(),
            span: Span::point(0, 0),
        }
    }
}

impl fmt::Display for SymbolLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.span.line == 0 {
            write!(f, "{}", self.file)
        } else {
            write!(f, "{}:{}:{}", self.file, self.span.line, self.span.column)
        }
    }
}

/// What a resolved symbol is. Source symbols carry their position in
/// [`ResolvedProgram::units`]; resource symbols index the project's
/// resource table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Sub { unit: usize, decl: usize },
    Const { unit: usize, decl: usize },
    Global { unit: usize, decl: usize },
    Resource { index: usize },
}

/// One entry in the merged namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub location: SymbolLocation,
    /// Transitively referenced from the entry symbol.
    pub reachable: bool,
}

/// A fully resolved program, ready for code generation.
///
/// `units` and `symbols` are in the canonical layout order the code
/// generator (and tests) depend on: entry file first, remaining files in
/// project insertion order, declarations in source order within a file.
#[derive(Debug, Clone)]
pub struct ResolvedProgram {
    pub units: Vec<SourceUnit>,
    pub symbols: Vec<Symbol>,
    /// The entry symbol (`Main` in the entry file).
    pub entry: SymbolId,
    /// Project resource indices in order of first reference.
    pub resource_order: Vec<usize>,
    index: HashMap<String, SymbolId>,
}

impl ResolvedProgram {
    pub fn new(
        units: Vec<SourceUnit>,
        symbols: Vec<Symbol>,
        entry: SymbolId,
        resource_order: Vec<usize>,
    ) -> Self {
        let index = symbols
            .iter()
            .enumerate()
            .map(|(id, sym)| (sym.name.clone(), id))
            .collect();
        Self {
            units,
            symbols,
            entry,
            resource_order,
            index,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.index.get(name).copied()
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display() {
        let loc = SymbolLocation::new("lib.swiss", Span::point(4, 2));
        assert_eq!(format!("{loc}"), "lib.swiss:4:2");
        assert_eq!(
            format!("{}", SymbolLocation::resource_table()),
            "(resource table)"
        );
    }

    #[test]
    fn test_lookup_by_name() {
        let symbols = vec![Symbol {
            name: "Main".to_string(),
            kind: SymbolKind::Sub { unit: 0, decl: 0 },
            location: SymbolLocation::new("main.swiss", Span::point(1, 1)),
            reachable: true,
        }];
        let program = ResolvedProgram::new(Vec::new(), symbols, 0, Vec::new());
        assert_eq!(program.lookup("Main"), Some(0));
        assert_eq!(program.lookup("Other"), None);
        assert_eq!(program.symbol(0).name, "Main");
    }
}
