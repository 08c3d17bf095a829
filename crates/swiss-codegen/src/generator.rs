//! The two-pass generator: assign addresses, lower every subroutine,
//! patch call sites.

use std::collections::{HashMap, HashSet};

use swiss_types::ast::*;
use swiss_types::{
    CartridgeImage, Op, Resource, ResolvedProgram, Span, SymbolId, SymbolKind, GLOBAL_BASE,
    MEMORY_SIZE, RESOURCE_BASE,
};

use crate::error::CodegenError;

/// Generate a cartridge image from a resolved program.
///
/// `resources` is the project's full resource table; only the entries in
/// [`ResolvedProgram::resource_order`] are embedded.
pub fn generate(
    program: &ResolvedProgram,
    resources: &[Resource],
) -> Result<CartridgeImage, CodegenError> {
    let mut generator = Generator::new(program, resources);
    generator.assign_addresses()?;
    generator.fold_consts()?;
    generator.emit_subs()?;
    generator.finish()
}

struct Generator<'a> {
    program: &'a ResolvedProgram,
    resources: &'a [Resource],

    const_values: HashMap<SymbolId, u16>,
    global_addrs: HashMap<SymbolId, u16>,
    /// Parameter word slots, keyed by owning sub and parameter name.
    param_addrs: HashMap<(SymbolId, String), u16>,
    /// Memory-mapped address per embedded resource (project index).
    resource_addrs: HashMap<usize, u16>,

    code: Vec<u8>,
    sub_offsets: HashMap<SymbolId, u32>,
    /// Call operand sites awaiting a target offset.
    call_patches: Vec<(usize, SymbolId)>,
    /// Print operand sites awaiting the pool base.
    print_patches: Vec<(usize, u32)>,
    strings: Vec<u8>,
    string_index: HashMap<String, u32>,

    /// Emission context: the sub currently being lowered.
    cur_file: String,
    cur_sub: SymbolId,
}

impl<'a> Generator<'a> {
    fn new(program: &'a ResolvedProgram, resources: &'a [Resource]) -> Self {
        Self {
            program,
            resources,
            const_values: HashMap::new(),
            global_addrs: HashMap::new(),
            param_addrs: HashMap::new(),
            resource_addrs: HashMap::new(),
            code: Vec::new(),
            sub_offsets: HashMap::new(),
            call_patches: Vec::new(),
            print_patches: Vec::new(),
            strings: Vec::new(),
            string_index: HashMap::new(),
            cur_file: String::new(),
            cur_sub: 0,
        }
    }

    fn err(&self, symbol: &str, reason: impl Into<String>, span: Span) -> CodegenError {
        CodegenError::new(symbol, reason, &self.cur_file, span)
    }

    // ── Pass 1: address assignment ───────────────────────────────────

    fn assign_addresses(&mut self) -> Result<(), CodegenError> {
        let mut next_word = GLOBAL_BASE;
        let mut alloc_word = |sym: &str, file: &str, span: Span| -> Result<u16, CodegenError> {
            if next_word + 2 > RESOURCE_BASE {
                return Err(CodegenError::new(
                    sym,
                    "out of global memory",
                    file,
                    span,
                ));
            }
            let addr = next_word;
            next_word += 2;
            Ok(addr)
        };

        for (id, symbol) in self.program.symbols.iter().enumerate() {
            match symbol.kind {
                SymbolKind::Global { .. } => {
                    let addr =
                        alloc_word(&symbol.name, &symbol.location.file, symbol.location.span)?;
                    self.global_addrs.insert(id, addr);
                }
                SymbolKind::Sub { unit, decl } => {
                    let DeclKind::Sub { params, .. } = &self.program.units[unit].decls[decl].kind
                    else {
                        unreachable!("sub symbol points at a sub decl");
                    };
                    for param in params {
                        let addr =
                            alloc_word(&param.name, &symbol.location.file, param.span)?;
                        self.param_addrs.insert((id, param.name.clone()), addr);
                    }
                }
                _ => {}
            }
        }

        let window = MEMORY_SIZE - RESOURCE_BASE as usize;
        let mut offset = 0usize;
        for &res_idx in &self.program.resource_order {
            let res = &self.resources[res_idx];
            if offset + res.payload.len() > window {
                return Err(CodegenError::new(
                    &res.name,
                    format!(
                        "resources exceed the {window}-byte window at {RESOURCE_BASE:#06x}"
                    ),
                    swiss_types::SymbolLocation::RESOURCE_TABLE,
                    Span::point(0, 0),
                ));
            }
            self.resource_addrs
                .insert(res_idx, RESOURCE_BASE + offset as u16);
            offset += res.payload.len();
        }
        Ok(())
    }

    // ── Pass 1b: constant folding ────────────────────────────────────

    fn fold_consts(&mut self) -> Result<(), CodegenError> {
        let const_ids: Vec<SymbolId> = self
            .program
            .symbols
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s.kind, SymbolKind::Const { .. }))
            .map(|(id, _)| id)
            .collect();
        let mut in_progress = HashSet::new();
        for id in const_ids {
            self.fold_const(id, &mut in_progress)?;
        }
        Ok(())
    }

    fn fold_const(
        &mut self,
        id: SymbolId,
        in_progress: &mut HashSet<SymbolId>,
    ) -> Result<u16, CodegenError> {
        if let Some(&value) = self.const_values.get(&id) {
            return Ok(value);
        }
        let symbol = self.program.symbol(id);
        if !in_progress.insert(id) {
            return Err(CodegenError::new(
                &symbol.name,
                "circular constant definition",
                &symbol.location.file,
                symbol.location.span,
            ));
        }
        let SymbolKind::Const { unit, decl } = symbol.kind else {
            unreachable!("fold_const called on a constant");
        };
        let DeclKind::Const { value } = &self.program.units[unit].decls[decl].kind else {
            unreachable!("const symbol points at a const decl");
        };
        let folded = self.fold_expr(value, &symbol.name, &symbol.location.file, in_progress)?;
        in_progress.remove(&id);
        self.const_values.insert(id, folded);
        Ok(folded)
    }

    fn fold_expr(
        &mut self,
        expr: &Expr,
        const_name: &str,
        file: &str,
        in_progress: &mut HashSet<SymbolId>,
    ) -> Result<u16, CodegenError> {
        let fail = |reason: &str, span: Span| -> CodegenError {
            CodegenError::new(const_name, reason, file, span)
        };
        match &expr.kind {
            ExprKind::Int(v) => Ok(wrap(*v)),
            ExprKind::Name(name) => {
                let id = self
                    .program
                    .lookup(&name.name)
                    .expect("resolver checked every reference");
                match self.program.symbol(id).kind {
                    SymbolKind::Const { .. } => self.fold_const(id, in_progress),
                    _ => Err(fail(
                        &format!("'{}' is not a compile-time constant", name.name),
                        name.span,
                    )),
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let a = self.fold_expr(lhs, const_name, file, in_progress)? as i16;
                let b = self.fold_expr(rhs, const_name, file, in_progress)? as i16;
                let value: i16 = match op {
                    BinOp::Add => a.wrapping_add(b),
                    BinOp::Sub => a.wrapping_sub(b),
                    BinOp::Mul => a.wrapping_mul(b),
                    BinOp::Div => match b {
                        0 => return Err(fail("division by zero in constant", expr.span)),
                        _ => a.wrapping_div(b),
                    },
                    BinOp::Mod => match b {
                        0 => return Err(fail("division by zero in constant", expr.span)),
                        _ => a.wrapping_rem(b),
                    },
                    BinOp::Eq => (a == b) as i16,
                    BinOp::Ne => (a != b) as i16,
                    BinOp::Lt => (a < b) as i16,
                    BinOp::Gt => (a > b) as i16,
                    BinOp::Le => (a <= b) as i16,
                    BinOp::Ge => (a >= b) as i16,
                    BinOp::And => (a != 0 && b != 0) as i16,
                    BinOp::Or => (a != 0 || b != 0) as i16,
                };
                Ok(value as u16)
            }
            ExprKind::Unary { op, operand } => {
                let v = self.fold_expr(operand, const_name, file, in_progress)? as i16;
                let value = match op {
                    UnOp::Neg => v.wrapping_neg(),
                    UnOp::Not => (v == 0) as i16,
                };
                Ok(value as u16)
            }
            ExprKind::Peek(_) | ExprKind::Call { .. } | ExprKind::Resource(_) => Err(fail(
                "constants must fold to a compile-time integer",
                expr.span,
            )),
        }
    }

    // ── Pass 2: lowering ─────────────────────────────────────────────

    fn emit_subs(&mut self) -> Result<(), CodegenError> {
        for (id, symbol) in self.program.symbols.iter().enumerate() {
            let SymbolKind::Sub { unit, decl } = symbol.kind else {
                continue;
            };
            let DeclKind::Sub { params, body } = &self.program.units[unit].decls[decl].kind else {
                unreachable!("sub symbol points at a sub decl");
            };
            self.cur_file = self.program.units[unit].file.clone();
            self.cur_sub = id;
            self.sub_offsets.insert(id, self.code.len() as u32);
            self.emit_body(body, params)?;
            // Implicit return: a sub falling off its end yields 0.
            self.emit_op(Op::Push);
            self.emit_u16(0);
            self.emit_op(Op::Ret);
        }
        Ok(())
    }

    fn emit_body(&mut self, body: &[Stmt], params: &[Ident]) -> Result<(), CodegenError> {
        for stmt in body {
            self.emit_stmt(stmt, params)?;
        }
        Ok(())
    }

    fn emit_stmt(&mut self, stmt: &Stmt, params: &[Ident]) -> Result<(), CodegenError> {
        match &stmt.kind {
            StmtKind::Let { target, value } => {
                self.emit_expr(value, params)?;
                let addr = self.word_slot(target, params)?;
                self.emit_op(Op::StoreGlobal);
                self.emit_u16(addr);
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.emit_expr(cond, params)?;
                self.emit_op(Op::JumpIfZero);
                let to_else = self.emit_placeholder_u32();
                self.emit_body(then_body, params)?;
                if else_body.is_empty() {
                    self.patch_u32(to_else, self.code.len() as u32);
                } else {
                    self.emit_op(Op::Jump);
                    let to_end = self.emit_placeholder_u32();
                    self.patch_u32(to_else, self.code.len() as u32);
                    self.emit_body(else_body, params)?;
                    self.patch_u32(to_end, self.code.len() as u32);
                }
            }
            StmtKind::While { cond, body } => {
                let loop_start = self.code.len() as u32;
                self.emit_expr(cond, params)?;
                self.emit_op(Op::JumpIfZero);
                let to_end = self.emit_placeholder_u32();
                self.emit_body(body, params)?;
                self.emit_op(Op::Jump);
                self.emit_u32(loop_start);
                self.patch_u32(to_end, self.code.len() as u32);
            }
            StmtKind::Return { value } => {
                match value {
                    Some(value) => self.emit_expr(value, params)?,
                    None => {
                        self.emit_op(Op::Push);
                        self.emit_u16(0);
                    }
                }
                self.emit_op(Op::Ret);
            }
            StmtKind::Call { target, args } => {
                self.emit_call(target, args, params)?;
                self.emit_op(Op::Pop);
            }
            StmtKind::Print { parts } => self.emit_print(parts, params, stmt.span)?,
            StmtKind::Poke { addr, value } => {
                self.emit_expr(addr, params)?;
                self.emit_expr(value, params)?;
                self.emit_op(Op::Poke);
            }
            StmtKind::Sleep => self.emit_op(Op::Sleep),
            StmtKind::Halt => self.emit_op(Op::Halt),
        }
        Ok(())
    }

    fn emit_expr(&mut self, expr: &Expr, params: &[Ident]) -> Result<(), CodegenError> {
        match &expr.kind {
            ExprKind::Int(v) => {
                self.emit_op(Op::Push);
                self.emit_u16(wrap(*v));
            }
            ExprKind::Name(name) => {
                if params.iter().any(|p| p.name == name.name) {
                    let addr = self.param_addrs[&(self.cur_sub, name.name.clone())];
                    self.emit_op(Op::LoadGlobal);
                    self.emit_u16(addr);
                    return Ok(());
                }
                let id = self
                    .program
                    .lookup(&name.name)
                    .expect("resolver checked every reference");
                match self.program.symbol(id).kind {
                    SymbolKind::Const { .. } => {
                        let value = self.const_values[&id];
                        self.emit_op(Op::Push);
                        self.emit_u16(value);
                    }
                    SymbolKind::Global { .. } => {
                        let addr = self.global_addrs[&id];
                        self.emit_op(Op::LoadGlobal);
                        self.emit_u16(addr);
                    }
                    SymbolKind::Sub { .. } => {
                        return Err(self.err(
                            &name.name,
                            "subroutine used as a value",
                            name.span,
                        ));
                    }
                    SymbolKind::Resource { .. } => {
                        return Err(self.err(
                            &name.name,
                            "resource used as a value; use RESOURCE(name)",
                            name.span,
                        ));
                    }
                }
            }
            ExprKind::Call { target, args } => self.emit_call(target, args, params)?,
            ExprKind::Peek(addr) => {
                self.emit_expr(addr, params)?;
                self.emit_op(Op::Peek);
            }
            ExprKind::Resource(name) => {
                let id = self
                    .program
                    .lookup(&name.name)
                    .expect("resolver checked every reference");
                let SymbolKind::Resource { index } = self.program.symbol(id).kind else {
                    return Err(self.err(
                        &name.name,
                        "RESOURCE() names a symbol that is not a project resource",
                        name.span,
                    ));
                };
                let addr = self.resource_addrs[&index];
                self.emit_op(Op::Push);
                self.emit_u16(addr);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.emit_expr(lhs, params)?;
                self.emit_expr(rhs, params)?;
                self.emit_op(match op {
                    BinOp::Add => Op::Add,
                    BinOp::Sub => Op::Sub,
                    BinOp::Mul => Op::Mul,
                    BinOp::Div => Op::Div,
                    BinOp::Mod => Op::Mod,
                    BinOp::Eq => Op::Eq,
                    BinOp::Ne => Op::Ne,
                    BinOp::Lt => Op::Lt,
                    BinOp::Gt => Op::Gt,
                    BinOp::Le => Op::Le,
                    BinOp::Ge => Op::Ge,
                    BinOp::And => Op::And,
                    BinOp::Or => Op::Or,
                });
            }
            ExprKind::Unary { op, operand } => {
                self.emit_expr(operand, params)?;
                self.emit_op(match op {
                    UnOp::Neg => Op::Neg,
                    UnOp::Not => Op::Not,
                });
            }
        }
        Ok(())
    }

    /// Lower a call: arguments into the callee's parameter slots, then a
    /// patched `Call`. Every call leaves exactly one word on the stack.
    fn emit_call(
        &mut self,
        target: &Ident,
        args: &[Expr],
        params: &[Ident],
    ) -> Result<(), CodegenError> {
        let id = self
            .program
            .lookup(&target.name)
            .expect("resolver checked every reference");
        let SymbolKind::Sub { unit, decl } = self.program.symbol(id).kind else {
            return Err(self.err(&target.name, "call target is not a SUB", target.span));
        };
        let DeclKind::Sub {
            params: callee_params,
            ..
        } = &self.program.units[unit].decls[decl].kind
        else {
            unreachable!("sub symbol points at a sub decl");
        };
        if args.len() != callee_params.len() {
            return Err(self.err(
                &target.name,
                format!(
                    "expects {} argument(s), got {}",
                    callee_params.len(),
                    args.len()
                ),
                target.span,
            ));
        }
        for arg in args {
            self.emit_expr(arg, params)?;
        }
        // Pop into slots in reverse so the last-pushed value lands in the
        // last parameter.
        let slots: Vec<u16> = callee_params
            .iter()
            .map(|p| self.param_addrs[&(id, p.name.clone())])
            .collect();
        for &slot in slots.iter().rev() {
            self.emit_op(Op::StoreGlobal);
            self.emit_u16(slot);
        }
        self.emit_op(Op::Call);
        let site = self.emit_placeholder_u32();
        self.call_patches.push((site, id));
        Ok(())
    }

    fn emit_print(
        &mut self,
        parts: &[PrintPart],
        params: &[Ident],
        span: Span,
    ) -> Result<(), CodegenError> {
        let message = parts
            .iter()
            .filter_map(|p| match p {
                PrintPart::Text(text) => Some(text.as_str()),
                PrintPart::Value(_) => None,
            })
            .collect::<Vec<_>>()
            .join(" ");
        let values: Vec<&Expr> = parts
            .iter()
            .filter_map(|p| match p {
                PrintPart::Value(expr) => Some(expr),
                PrintPart::Text(_) => None,
            })
            .collect();
        let sub_name = self.program.symbol(self.cur_sub).name.clone();
        if values.len() > u8::MAX as usize {
            return Err(self.err(&sub_name, "PRINT takes at most 255 values", span));
        }
        if message.len() > u16::MAX as usize {
            return Err(self.err(&sub_name, "PRINT message too long", span));
        }
        for value in &values {
            self.emit_expr(value, params)?;
        }
        let rel = self.intern(&message);
        self.emit_op(Op::Print);
        let site = self.emit_placeholder_u32();
        self.print_patches.push((site, rel));
        self.emit_u16(message.len() as u16);
        self.code.push(values.len() as u8);
        Ok(())
    }

    fn intern(&mut self, message: &str) -> u32 {
        if let Some(&rel) = self.string_index.get(message) {
            return rel;
        }
        let rel = self.strings.len() as u32;
        self.strings.extend_from_slice(message.as_bytes());
        self.string_index.insert(message.to_string(), rel);
        rel
    }

    /// The word slot a `LET` may assign to: a parameter of the current
    /// sub or a global.
    fn word_slot(&self, target: &Ident, params: &[Ident]) -> Result<u16, CodegenError> {
        if params.iter().any(|p| p.name == target.name) {
            return Ok(self.param_addrs[&(self.cur_sub, target.name.clone())]);
        }
        let id = self
            .program
            .lookup(&target.name)
            .expect("resolver checked every reference");
        match self.program.symbol(id).kind {
            SymbolKind::Global { .. } => Ok(self.global_addrs[&id]),
            SymbolKind::Const { .. } => {
                Err(self.err(&target.name, "cannot assign to a constant", target.span))
            }
            SymbolKind::Sub { .. } => {
                Err(self.err(&target.name, "cannot assign to a subroutine", target.span))
            }
            SymbolKind::Resource { .. } => {
                Err(self.err(&target.name, "cannot assign to a resource", target.span))
            }
        }
    }

    // ── Pass 3: patching and assembly ────────────────────────────────

    fn finish(mut self) -> Result<CartridgeImage, CodegenError> {
        let pool_base = self.code.len() as u32;
        self.code.extend_from_slice(&self.strings);
        for &(site, rel) in &self.print_patches {
            let value = pool_base + rel;
            self.code[site..site + 4].copy_from_slice(&value.to_le_bytes());
        }
        for &(site, target) in &self.call_patches {
            let offset = self.sub_offsets[&target];
            self.code[site..site + 4].copy_from_slice(&offset.to_le_bytes());
        }

        let entry_offset = self.sub_offsets[&self.program.entry];
        let embedded: Vec<&Resource> = self
            .program
            .resource_order
            .iter()
            .map(|&i| &self.resources[i])
            .collect();
        Ok(CartridgeImage::assemble(entry_offset, self.code, &embedded))
    }

    // ── Byte emission helpers ────────────────────────────────────────

    fn emit_op(&mut self, op: Op) {
        self.code.push(op as u8);
    }

    fn emit_u16(&mut self, value: u16) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    fn emit_u32(&mut self, value: u32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    fn emit_placeholder_u32(&mut self) -> usize {
        let site = self.code.len();
        self.emit_u32(0);
        site
    }

    fn patch_u32(&mut self, site: usize, value: u32) {
        self.code[site..site + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// Truncate a literal to the machine's 16-bit word.
fn wrap(value: i64) -> u16 {
    (value as u64 & 0xffff) as u16
}
