//! Symbol resolution: merges every file's declarations into one namespace,
//! links every reference, and fixes the canonical layout order.
//!
//! Two passes over an integer-indexed symbol table: collect all
//! declarations first, then walk references against the finished
//! namespace. Resolution errors are fatal to the compile; all of them are
//! reported together and no partial program escapes.

use std::collections::{HashMap, HashSet, VecDeque};
use swiss_types::ast::*;
use swiss_types::{
    Diagnostic, Resource, ResolvedProgram, Span, Stage, Symbol, SymbolId, SymbolKind,
    SymbolLocation,
};
use thiserror::Error;

/// A fatal, whole-program resolution failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("duplicate symbol '{symbol}': declared at {first} and at {second}")]
    DuplicateSymbol {
        symbol: String,
        first: SymbolLocation,
        second: SymbolLocation,
    },

    #[error("undefined symbol '{symbol}' referenced at {location}")]
    UndefinedSymbol {
        symbol: String,
        location: SymbolLocation,
    },
}

impl ResolveError {
    /// The primary location: where the mistake is visible to the user.
    pub fn location(&self) -> &SymbolLocation {
        match self {
            Self::DuplicateSymbol { second, .. } => second,
            Self::UndefinedSymbol { location, .. } => location,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let loc = self.location();
        Diagnostic::new(&loc.file, loc.span, Stage::Resolve, self.to_string())
    }
}

/// Resolve a parsed project into a [`ResolvedProgram`].
///
/// `units` arrive in project file order; the entry unit is moved to the
/// front. `resources` contribute implicit resource-reference declarations
/// to the namespace.
pub fn resolve(
    entry_file: &str,
    mut units: Vec<SourceUnit>,
    resources: &[Resource],
) -> Result<ResolvedProgram, Vec<ResolveError>> {
    // Entry file first; remaining files keep their insertion order.
    if let Some(at) = units.iter().position(|u| u.file == entry_file) {
        let entry_unit = units.remove(at);
        units.insert(0, entry_unit);
    }

    let mut errors = Vec::new();

    // ── Pass 1: collect declarations ─────────────────────────────────
    let mut symbols: Vec<Symbol> = Vec::new();
    let mut index: HashMap<String, SymbolId> = HashMap::new();

    for (unit_idx, unit) in units.iter().enumerate() {
        for (decl_idx, decl) in unit.decls.iter().enumerate() {
            let kind = match decl.kind {
                DeclKind::Sub { .. } => SymbolKind::Sub {
                    unit: unit_idx,
                    decl: decl_idx,
                },
                DeclKind::Const { .. } => SymbolKind::Const {
                    unit: unit_idx,
                    decl: decl_idx,
                },
                DeclKind::Global => SymbolKind::Global {
                    unit: unit_idx,
                    decl: decl_idx,
                },
            };
            let location = SymbolLocation::new(&unit.file, decl.name.span);
            if let Some(&existing) = index.get(&decl.name.name) {
                errors.push(ResolveError::DuplicateSymbol {
                    symbol: decl.name.name.clone(),
                    first: symbols[existing].location.clone(),
                    second: location,
                });
                continue;
            }
            index.insert(decl.name.name.clone(), symbols.len());
            symbols.push(Symbol {
                name: decl.name.name.clone(),
                kind,
                location,
                reachable: false,
            });
        }
    }

    // Resource names are implicit declarations; colliding with a source
    // symbol is a duplicate like any other.
    for (res_idx, resource) in resources.iter().enumerate() {
        let location = SymbolLocation::resource_table();
        if let Some(&existing) = index.get(&resource.name) {
            errors.push(ResolveError::DuplicateSymbol {
                symbol: resource.name.clone(),
                first: symbols[existing].location.clone(),
                second: location,
            });
            continue;
        }
        index.insert(resource.name.clone(), symbols.len());
        symbols.push(Symbol {
            name: resource.name.clone(),
            kind: SymbolKind::Resource { index: res_idx },
            location,
            reachable: false,
        });
    }

    // ── Pass 2: link references ──────────────────────────────────────
    // Edges between symbols drive the reachability closure.
    let mut edges: HashMap<SymbolId, Vec<SymbolId>> = HashMap::new();

    for unit in &units {
        for decl in &unit.decls {
            // Duplicate declarations were dropped from the namespace but
            // still get their references checked, attributed to the
            // surviving symbol of the same name.
            let from = index.get(&decl.name.name).copied();

            let mut walker = RefWalker {
                file: &unit.file,
                index: &index,
                params: &[],
                errors: &mut errors,
                refs: Vec::new(),
            };
            match &decl.kind {
                DeclKind::Const { value } => walker.walk_expr(value),
                DeclKind::Sub { params, body } => {
                    walker.params = params;
                    walker.walk_body(body);
                }
                DeclKind::Global => {}
            }
            let refs = walker.refs;
            if let Some(from) = from {
                edges.entry(from).or_default().extend(refs);
            }
        }
    }

    // ── Entry symbol ─────────────────────────────────────────────────
    let entry = match index.get("Main") {
        Some(&id)
            if matches!(symbols[id].kind, SymbolKind::Sub { .. })
                && symbols[id].location.file == entry_file =>
        {
            Some(id)
        }
        _ => {
            errors.push(ResolveError::UndefinedSymbol {
                symbol: "Main".to_string(),
                location: SymbolLocation::new(entry_file, Span::point(1, 1)),
            });
            None
        }
    };

    if !errors.is_empty() {
        return Err(errors);
    }
    let entry = entry.expect("entry present when no errors");

    // ── Reachability closure from the entry symbol ───────────────────
    let mut queue = VecDeque::from([entry]);
    let mut seen = HashSet::from([entry]);
    while let Some(id) = queue.pop_front() {
        symbols[id].reachable = true;
        for &next in edges.get(&id).into_iter().flatten() {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }

    // ── Resource embedding order: first reference in layout order ────
    let mut resource_order = Vec::new();
    let mut seen_resources = HashSet::new();
    for unit in &units {
        for decl in &unit.decls {
            if let DeclKind::Sub { body, .. } = &decl.kind {
                collect_resource_refs(body, &index, &symbols, &mut |res_idx| {
                    if seen_resources.insert(res_idx) {
                        resource_order.push(res_idx);
                    }
                });
            }
        }
    }

    Ok(ResolvedProgram::new(units, symbols, entry, resource_order))
}

/// Walks one declaration's references, collecting undefined-symbol errors
/// and the symbol ids it touches.
struct RefWalker<'a> {
    file: &'a str,
    index: &'a HashMap<String, SymbolId>,
    params: &'a [Ident],
    errors: &'a mut Vec<ResolveError>,
    refs: Vec<SymbolId>,
}

impl RefWalker<'_> {
    fn reference(&mut self, name: &Ident) {
        if self.params.iter().any(|p| p.name == name.name) {
            return;
        }
        match self.index.get(&name.name) {
            Some(&id) => self.refs.push(id),
            None => self.errors.push(ResolveError::UndefinedSymbol {
                symbol: name.name.clone(),
                location: SymbolLocation::new(self.file, name.span),
            }),
        }
    }

    fn walk_body(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.walk_stmt(stmt);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Let { target, value } => {
                self.reference(target);
                self.walk_expr(value);
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.walk_expr(cond);
                self.walk_body(then_body);
                self.walk_body(else_body);
            }
            StmtKind::While { cond, body } => {
                self.walk_expr(cond);
                self.walk_body(body);
            }
            StmtKind::Return { value } => {
                if let Some(value) = value {
                    self.walk_expr(value);
                }
            }
            StmtKind::Call { target, args } => {
                self.reference(target);
                for arg in args {
                    self.walk_expr(arg);
                }
            }
            StmtKind::Print { parts } => {
                for part in parts {
                    if let PrintPart::Value(expr) = part {
                        self.walk_expr(expr);
                    }
                }
            }
            StmtKind::Poke { addr, value } => {
                self.walk_expr(addr);
                self.walk_expr(value);
            }
            StmtKind::Sleep | StmtKind::Halt => {}
        }
    }

    fn walk_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Int(_) => {}
            ExprKind::Name(name) | ExprKind::Resource(name) => self.reference(name),
            ExprKind::Call { target, args } => {
                self.reference(target);
                for arg in args {
                    self.walk_expr(arg);
                }
            }
            ExprKind::Peek(addr) => self.walk_expr(addr),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.walk_expr(lhs);
                self.walk_expr(rhs);
            }
            ExprKind::Unary { operand, .. } => self.walk_expr(operand),
        }
    }
}

fn collect_resource_refs(
    body: &[Stmt],
    index: &HashMap<String, SymbolId>,
    symbols: &[Symbol],
    found: &mut impl FnMut(usize),
) {
    fn expr(
        e: &Expr,
        index: &HashMap<String, SymbolId>,
        symbols: &[Symbol],
        found: &mut impl FnMut(usize),
    ) {
        match &e.kind {
            ExprKind::Resource(name) => {
                if let Some(&id) = index.get(&name.name) {
                    if let SymbolKind::Resource { index: res_idx } = symbols[id].kind {
                        found(res_idx);
                    }
                }
            }
            ExprKind::Call { args, .. } => {
                for arg in args {
                    expr(arg, index, symbols, found);
                }
            }
            ExprKind::Peek(inner) => expr(inner, index, symbols, found),
            ExprKind::Binary { lhs, rhs, .. } => {
                expr(lhs, index, symbols, found);
                expr(rhs, index, symbols, found);
            }
            ExprKind::Unary { operand, .. } => expr(operand, index, symbols, found),
            ExprKind::Int(_) | ExprKind::Name(_) => {}
        }
    }

    for stmt in body {
        match &stmt.kind {
            StmtKind::Let { value, .. } => expr(value, index, symbols, found),
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                expr(cond, index, symbols, found);
                collect_resource_refs(then_body, index, symbols, found);
                collect_resource_refs(else_body, index, symbols, found);
            }
            StmtKind::While { cond, body } => {
                expr(cond, index, symbols, found);
                collect_resource_refs(body, index, symbols, found);
            }
            StmtKind::Return { value: Some(value) } => expr(value, index, symbols, found),
            StmtKind::Call { args, .. } => {
                for arg in args {
                    expr(arg, index, symbols, found);
                }
            }
            StmtKind::Print { parts } => {
                for part in parts {
                    if let PrintPart::Value(value) = part {
                        expr(value, index, symbols, found);
                    }
                }
            }
            StmtKind::Poke { addr, value } => {
                expr(addr, index, symbols, found);
                expr(value, index, symbols, found);
            }
            StmtKind::Return { value: None } | StmtKind::Sleep | StmtKind::Halt => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swiss_parser::parse_source;
    use swiss_types::{ResourceKind, SourceFile};

    fn unit(name: &str, source: &str) -> SourceUnit {
        let result = parse_source(&SourceFile::new(name, source));
        assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
        result.unit.unwrap()
    }

    #[test]
    fn test_single_file_resolves() {
        let program = resolve(
            "main.swiss",
            vec![unit("main.swiss", "SUB Main()\nHALT\nEND SUB\n")],
            &[],
        )
        .unwrap();
        assert_eq!(program.symbols.len(), 1);
        assert_eq!(program.symbol(program.entry).name, "Main");
        assert!(program.symbol(program.entry).reachable);
    }

    #[test]
    fn test_entry_file_ordered_first() {
        let program = resolve(
            "main.swiss",
            vec![
                unit("lib.swiss", "SUB Helper()\nEND SUB\n"),
                unit("main.swiss", "SUB Main()\nCALL Helper()\nEND SUB\n"),
            ],
            &[],
        )
        .unwrap();
        assert_eq!(program.units[0].file, "main.swiss");
        assert_eq!(program.units[1].file, "lib.swiss");
        // Layout order follows the reordered files.
        assert_eq!(program.symbols[0].name, "Main");
        assert_eq!(program.symbols[1].name, "Helper");
    }

    #[test]
    fn test_duplicate_symbol_reports_both_locations() {
        let errors = resolve(
            "main.swiss",
            vec![
                unit("main.swiss", "SUB Main()\nEND SUB\nDIM X\n"),
                unit("lib.swiss", "CONST X = 1\n"),
            ],
            &[],
        )
        .unwrap_err();
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            ResolveError::DuplicateSymbol {
                symbol,
                first,
                second,
            } => {
                assert_eq!(symbol, "X");
                assert_eq!(first.file, "main.swiss");
                assert_eq!(second.file, "lib.swiss");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_undefined_symbol_names_symbol_and_file() {
        let errors = resolve(
            "main.swiss",
            vec![unit("main.swiss", "SUB Main()\nLET Y = 1\nEND SUB\n")],
            &[],
        )
        .unwrap_err();
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            ResolveError::UndefinedSymbol { symbol, location } => {
                assert_eq!(symbol, "Y");
                assert_eq!(location.file, "main.swiss");
                assert_eq!(location.span.line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_forward_reference_across_files() {
        let program = resolve(
            "main.swiss",
            vec![
                unit("main.swiss", "SUB Main()\nCALL Draw()\nEND SUB\n"),
                unit("lib.swiss", "SUB Draw()\nSLEEP\nEND SUB\n"),
            ],
            &[],
        )
        .unwrap();
        let draw = program.lookup("Draw").unwrap();
        assert!(program.symbol(draw).reachable);
    }

    #[test]
    fn test_unreachable_symbols_kept_but_marked() {
        let program = resolve(
            "main.swiss",
            vec![unit(
                "main.swiss",
                "SUB Main()\nEND SUB\nSUB Unused()\nEND SUB\n",
            )],
            &[],
        )
        .unwrap();
        let unused = program.lookup("Unused").unwrap();
        assert!(!program.symbol(unused).reachable);
        // Still present: dead-code elimination is a non-goal.
        assert_eq!(program.symbols.len(), 2);
    }

    #[test]
    fn test_missing_entry_symbol() {
        let errors = resolve(
            "main.swiss",
            vec![unit("main.swiss", "SUB Start()\nEND SUB\n")],
            &[],
        )
        .unwrap_err();
        assert!(matches!(
            &errors[0],
            ResolveError::UndefinedSymbol { symbol, .. } if symbol == "Main"
        ));
    }

    #[test]
    fn test_entry_symbol_must_live_in_entry_file() {
        let errors = resolve(
            "main.swiss",
            vec![
                unit("main.swiss", "DIM x\n"),
                unit("lib.swiss", "SUB Main()\nEND SUB\n"),
            ],
            &[],
        )
        .unwrap_err();
        assert!(matches!(
            &errors[0],
            ResolveError::UndefinedSymbol { symbol, .. } if symbol == "Main"
        ));
    }

    #[test]
    fn test_resource_reference_resolves() {
        let tiles = Resource::new("hero_tiles", ResourceKind::TileSet, vec![0; 4096]).unwrap();
        let program = resolve(
            "main.swiss",
            vec![unit(
                "main.swiss",
                "DIM x\nSUB Main()\nLET x = RESOURCE(hero_tiles)\nEND SUB\n",
            )],
            &[tiles],
        )
        .unwrap();
        assert_eq!(program.resource_order, vec![0]);
    }

    #[test]
    fn test_resource_name_collision_is_duplicate() {
        let tiles = Resource::new("x", ResourceKind::TileSet, vec![0; 4096]).unwrap();
        let errors = resolve(
            "main.swiss",
            vec![unit("main.swiss", "DIM x\nSUB Main()\nEND SUB\n")],
            &[tiles],
        )
        .unwrap_err();
        match &errors[0] {
            ResolveError::DuplicateSymbol { second, .. } => {
                assert_eq!(second.file, SymbolLocation::RESOURCE_TABLE);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resource_order_is_first_reference() {
        let a = Resource::new("pat_a", ResourceKind::AudioPattern, vec![1]).unwrap();
        let b = Resource::new("pat_b", ResourceKind::AudioPattern, vec![2]).unwrap();
        let program = resolve(
            "main.swiss",
            vec![unit(
                "main.swiss",
                "DIM x\nSUB Main()\nLET x = RESOURCE(pat_b)\nLET x = RESOURCE(pat_a)\nLET x = RESOURCE(pat_b)\nEND SUB\n",
            )],
            &[a, b],
        )
        .unwrap();
        // pat_b first (first referenced), each resource once.
        assert_eq!(program.resource_order, vec![1, 0]);
    }

    #[test]
    fn test_unreferenced_resource_not_embedded() {
        let a = Resource::new("unused", ResourceKind::AudioPattern, vec![1]).unwrap();
        let program = resolve(
            "main.swiss",
            vec![unit("main.swiss", "SUB Main()\nEND SUB\n")],
            &[a],
        )
        .unwrap();
        assert!(program.resource_order.is_empty());
    }

    #[test]
    fn test_params_shadow_namespace() {
        let program = resolve(
            "main.swiss",
            vec![unit(
                "main.swiss",
                "SUB Scale(amount)\nRETURN amount * 2\nEND SUB\nSUB Main()\nCALL Scale(3)\nEND SUB\n",
            )],
            &[],
        )
        .unwrap();
        assert_eq!(program.symbols.len(), 2);
    }

    #[test]
    fn test_all_errors_reported_together() {
        let errors = resolve(
            "main.swiss",
            vec![unit(
                "main.swiss",
                "SUB Main()\nLET a = 1\nLET b = 2\nEND SUB\n",
            )],
            &[],
        )
        .unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
