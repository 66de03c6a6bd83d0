//! Expression and statement translator
//!
//! One [`FunctionTranslator`] lowers one source function into a VIL procedure.
//! Instructions are visited in source order with a single exhaustive match;
//! every instruction kind either produces an expression bound to its result
//! local, emits statements into the current block, or both.
//!
//! Lowering never fails on a well-formed program. Operations without an exact
//! encoding degrade to an unconstrained (`havoc`) result or an uninterpreted
//! function and raise a precision warning. Errors are reserved for
//! structurally invalid input such as unknown layouts or dangling symbols.
//!
//! # Control flow
//!
//! ```text
//! $bb.entry:   ...; goto $bb.entry$then, $bb.entry$else;
//! $bb.entry$then: assume c;  <phi moves>; goto $bb.loop;
//! $bb.entry$else: assume !c; <phi moves>; goto $bb.exit;
//! ```
//!
//! Phi nodes become parallel assignments on the edge that enters their block.

use super::address::Index;
use super::context::{UnitContext, INIT_FUNCS, RETURN_VAR, STATIC_INIT};
use super::options::DivisionPolicy;
use crate::ir::{
    BasicBlock, BinOp, Callee, CastOp, Constant, DebugLoc, Function, InstKind, Instruction, Terminator,
    Type, Value,
};
use crate::vil::{Attribute, Binding, Block, Expr, Lhs, ProcDecl, Stmt, VilType};
use crate::warnings::{Flag, FlagRelation};
use crate::{Error, Result};
use std::collections::BTreeMap;
use tracing::{debug, trace};

impl UnitContext<'_> {
    fn is_symbol(&self, name: &str) -> bool {
        self.module.global(name).is_some()
            || self.module.function(name).is_some()
            || self.module.declaration(name).is_some()
    }

    fn symbol(&self, name: &str, context: &str) -> Result<Expr> {
        if !self.is_symbol(name) {
            return Err(Error::invalid_operand(context, format!("unknown symbol {}", name)));
        }
        Ok(Expr::var(self.naming.global(name)))
    }

    /// Encode a scalar constant
    pub fn constant(&mut self, c: &Constant, context: &str) -> Result<Expr> {
        match c {
            Constant::Int { width, value } => Ok(self.encoder.literal(*value, *width)),
            Constant::Float { value, .. } => Ok(self.encoder.float_literal(*value)),
            Constant::Null => Ok(self.encoder.null()),
            Constant::Undef(ty) | Constant::Zero(ty) => {
                let vty = self.encoder.encode(self.layout, ty)?;
                Ok(self.encoder.literal_of(0, &vty))
            }
            Constant::GlobalRef(name) => self.symbol(name, context),
            Constant::ElementPtr { base, source, indices } => {
                let base = self.symbol(base, context)?;
                let offset = self.address.constant_offset(self.layout, source, indices)?;
                Ok(self.address.add_offset(&mut self.encoder, base, offset))
            }
            Constant::Cast { op, value, to } => {
                let inner = self.constant(value, context)?;
                let from = self.encoder.encode(self.layout, &value.ty())?;
                let to = self.encoder.encode(self.layout, to)?;
                Ok(match op {
                    CastOp::PtrToInt => self.address.pointer_to_integer(&mut self.encoder, inner, &to),
                    CastOp::IntToPtr => self.address.integer_to_pointer(&mut self.encoder, inner, &from),
                    _ => match self.encoder.convert(*op, &from, &to, inner.clone()) {
                        Some(e) => e,
                        None => self.coerce(inner, &from, &to),
                    },
                })
            }
            Constant::Array { .. } | Constant::Struct { .. } => Err(Error::invalid_operand(
                context,
                "aggregate constant used as a scalar operand",
            )),
        }
    }
}

fn kind_name(kind: &InstKind) -> &'static str {
    match kind {
        InstKind::Binary { .. } => "binary",
        InstKind::FNeg(_) => "fneg",
        InstKind::Compare { .. } => "compare",
        InstKind::Cast { .. } => "cast",
        InstKind::Load { .. } => "load",
        InstKind::Store { .. } => "store",
        InstKind::Alloca { .. } => "alloca",
        InstKind::ElementPtr { .. } => "element-ptr",
        InstKind::Select { .. } => "select",
        InstKind::Phi { .. } => "phi",
        InstKind::Call { .. } => "call",
        InstKind::MemCpy { .. } => "memcpy",
        InstKind::MemSet { .. } => "memset",
        InstKind::Other { .. } => "other",
    }
}

/// Lowers one function into a procedure
pub struct FunctionTranslator<'c, 'a> {
    pub(super) ctx: &'c mut UnitContext<'a>,
    pub(super) function: &'a Function,
    locals: BTreeMap<String, VilType>,
    pub(super) current: Vec<Stmt>,
    blocks: Vec<Block>,
    call_temps: usize,
}

impl<'c, 'a> FunctionTranslator<'c, 'a> {
    pub fn new(ctx: &'c mut UnitContext<'a>, function: &'a Function) -> Self {
        Self {
            ctx,
            function,
            locals: BTreeMap::new(),
            current: vec![],
            blocks: vec![],
            call_temps: 0,
        }
    }

    /// Translate the whole function
    pub fn translate(mut self) -> Result<ProcDecl> {
        let f = self.function;
        debug!(function = %f.name, blocks = f.blocks.len(), "translating function");

        let mut proc = ProcDecl::new(self.ctx.naming.global(&f.name));
        for param in &f.params {
            let ty = self.encode(&param.ty)?;
            proc.params.push(Binding::new(self.ctx.naming.local(&f.name, &param.name), ty));
        }
        if f.ret != Type::Void {
            proc.returns.push(Binding::new(RETURN_VAR, self.encode(&f.ret)?));
        }
        let entry_point = self.ctx.options.is_entry_point(&f.name);
        if entry_point {
            proc.attrs.push(Attribute::flag("entrypoint"));
        }

        for (i, bb) in f.blocks.iter().enumerate() {
            if i == 0 && entry_point {
                self.current.push(Stmt::call(vec![], STATIC_INIT, vec![]));
                self.current.push(Stmt::call(vec![], INIT_FUNCS, vec![]));
            }
            for inst in &bb.instructions {
                self.instruction(inst)?;
            }
            self.terminator(bb)?;
        }

        proc.locals = self
            .locals
            .into_iter()
            .map(|(name, ty)| Binding::new(name, ty))
            .collect();
        proc.blocks = self.blocks;
        Ok(proc)
    }

    pub(super) fn encode(&self, ty: &Type) -> Result<VilType> {
        self.ctx.encoder.encode(self.ctx.layout, ty)
    }

    fn local(&self, name: &str) -> String {
        self.ctx.naming.local(&self.function.name, name)
    }

    fn label(&self, block: &str) -> String {
        self.ctx.naming.block(&self.function.name, block)
    }

    /// Encoded expression and type of an operand
    pub(super) fn operand(&mut self, value: &Value) -> Result<(Expr, VilType)> {
        match value {
            Value::Local { name, ty } => Ok((Expr::var(self.local(name)), self.encode(ty)?)),
            Value::Global { name } => Ok((self.ctx.symbol(name, &self.function.name)?, VilType::Pointer)),
            Value::Const(c) => {
                let ty = self.encode(&c.ty())?;
                Ok((self.ctx.constant(c, &self.function.name)?, ty))
            }
        }
    }

    /// Operand converted to `want`
    pub(super) fn operand_as(&mut self, value: &Value, want: &VilType) -> Result<Expr> {
        let (e, ty) = self.operand(value)?;
        Ok(self.ctx.coerce(e, &ty, want))
    }

    fn declare_result(&mut self, inst: &Instruction, ty: VilType) -> Option<String> {
        let name = self.local(inst.result.as_deref()?);
        self.locals.insert(name.clone(), ty);
        Some(name)
    }

    /// Local receiving a call result: the instruction's own, or a fresh temporary
    pub(super) fn call_target(&mut self, inst: &Instruction, ty: VilType) -> String {
        match self.declare_result(inst, ty.clone()) {
            Some(name) => name,
            None => self.temp(ty),
        }
    }

    fn temp(&mut self, ty: VilType) -> String {
        let temp = self.local(&format!("call.{}", self.call_temps));
        self.call_temps += 1;
        self.locals.insert(temp.clone(), ty);
        temp
    }

    fn assign_result(&mut self, inst: &Instruction, ty: VilType, value: Expr) {
        if let Some(name) = self.declare_result(inst, ty) {
            self.current.push(Stmt::assign(name, value));
        }
    }

    /// Leave the result unconstrained
    fn havoc_result(&mut self, inst: &Instruction, ty: VilType) {
        if let Some(name) = self.declare_result(inst, ty) {
            self.current.push(Stmt::Havoc(vec![name]));
        }
    }

    fn unmodeled(&mut self, name: &str, loc: Option<&DebugLoc>) {
        self.ctx.reporter.warn_unmodeled(name, Some(&mut self.current), loc);
    }

    fn instruction(&mut self, inst: &Instruction) -> Result<()> {
        trace!(function = %self.function.name, kind = kind_name(&inst.kind), result = ?inst.result, "instruction");
        let loc = inst.loc.as_ref();
        match &inst.kind {
            InstKind::Binary { op, lhs, rhs } => self.binary(inst, *op, lhs, rhs, loc),
            InstKind::FNeg(v) => {
                let (e, ty) = self.operand(v)?;
                self.ctx.warn_float(&mut self.current, loc);
                let value = self.ctx.encoder.float_negate(e);
                self.assign_result(inst, ty, value);
                Ok(())
            }
            InstKind::Compare { predicate, lhs, rhs } => {
                let (l, ty) = self.operand(lhs)?;
                let r = self.operand_as(rhs, &ty)?;
                if predicate.is_float() {
                    self.ctx.warn_float(&mut self.current, loc);
                }
                match self.ctx.encoder.compare(*predicate, &ty, l, r) {
                    Some(value) => self.assign_result(inst, VilType::Bool, value),
                    None => {
                        self.unmodeled(&format!("{} on {}", predicate.mnemonic(), ty), loc);
                        self.havoc_result(inst, VilType::Bool);
                    }
                }
                Ok(())
            }
            InstKind::Cast { op, value, to } => self.cast(inst, *op, value, to, loc),
            InstKind::Load { ty, ptr } => {
                let (addr, _) = self.operand(ptr)?;
                let region = self.ctx.region_for(&self.function.name, ptr)?;
                let want = self.encode(ty)?;
                let size = self.ctx.layout.store_size(ty)?;
                let value = self.ctx.read(region, addr, &want, size, &mut self.current, loc)?;
                self.assign_result(inst, want, value);
                Ok(())
            }
            InstKind::Store { value, ptr } => self.store(value, ptr, loc),
            InstKind::Alloca { ty, count } => self.alloca(inst, ty, count),
            InstKind::ElementPtr { source, base, indices } => {
                let (base, _) = self.operand(base)?;
                let mut path = Vec::with_capacity(indices.len());
                for index in indices {
                    path.push(match index.as_int() {
                        Some(i) => Index::Literal(i),
                        None => {
                            let (e, ty) = self.operand(index)?;
                            Index::Symbolic(e, ty)
                        }
                    });
                }
                let ctx = &mut *self.ctx;
                let addr = ctx.address.element_ptr(&mut ctx.encoder, ctx.layout, base, source, path)?;
                self.assign_result(inst, VilType::Pointer, addr);
                Ok(())
            }
            InstKind::Select { cond, on_true, on_false } => {
                let c = self.operand_as(cond, &VilType::Bool)?;
                let (t, ty) = self.operand(on_true)?;
                let f = self.operand_as(on_false, &ty)?;
                self.assign_result(inst, ty, Expr::ite(c, t, f));
                Ok(())
            }
            InstKind::Phi { ty, .. } => {
                let ty = self.encode(ty)?;
                self.declare_result(inst, ty);
                Ok(())
            }
            InstKind::Call { callee, args, ret } => self.call(inst, callee, args, ret, loc),
            InstKind::MemCpy { dst, src, len } => self.memcpy(dst, src, len, loc),
            InstKind::MemSet { dst, byte, len } => self.memset(dst, byte, len, loc),
            InstKind::Other { opcode, ty } => {
                self.unmodeled(opcode, loc);
                if *ty != Type::Void {
                    let ty = self.encode(ty)?;
                    self.havoc_result(inst, ty);
                }
                Ok(())
            }
        }
    }

    fn binary(&mut self, inst: &Instruction, op: BinOp, lhs: &Value, rhs: &Value, loc: Option<&DebugLoc>) -> Result<()> {
        let (l, ty) = self.operand(lhs)?;
        let r = self.operand_as(rhs, &ty)?;
        if op.is_float() {
            self.ctx.warn_float(&mut self.current, loc);
        } else if matches!(ty, VilType::Int(_)) {
            self.ctx.reporter.warn_if_incomplete(
                op.mnemonic(),
                &[Flag::BitPrecise],
                Some(&mut self.current),
                loc,
                FlagRelation::And,
            );
        }
        if op.is_division() && ty.is_integer() {
            self.guard_divisor(&r, &ty);
        }
        match self.ctx.encoder.binary(op, &ty, l, r) {
            Some(value) => self.assign_result(inst, ty, value),
            None => {
                self.unmodeled(&format!("{} on {}", op.mnemonic(), ty), loc);
                self.havoc_result(inst, ty);
            }
        }
        Ok(())
    }

    /// Non-zero divisor precondition, unless the divisor is a non-zero literal
    fn guard_divisor(&mut self, divisor: &Expr, ty: &VilType) {
        if divisor.as_literal().is_some_and(|v| v != 0) {
            return;
        }
        let zero = self.ctx.encoder.literal_of(0, ty);
        let expr = Expr::neq(divisor.clone(), zero);
        let attrs = vec![Attribute::flag("nonzero_divisor")];
        self.current.push(match self.ctx.options.division {
            DivisionPolicy::Assume => Stmt::Assume { expr, attrs },
            DivisionPolicy::Assert => Stmt::Assert { expr, attrs },
        });
    }

    fn cast(&mut self, inst: &Instruction, op: CastOp, value: &Value, to: &Type, loc: Option<&DebugLoc>) -> Result<()> {
        let (e, from) = self.operand(value)?;
        let to = self.encode(to)?;
        let encodings_differ = self.ctx.encoder.integer_encoding() != self.ctx.encoder.pointer_encoding();
        let result = match op {
            CastOp::PtrToInt | CastOp::IntToPtr => {
                if encodings_differ {
                    self.ctx.reporter.warn_if_incomplete(
                        op.mnemonic(),
                        &[Flag::BitPrecise, Flag::BitPrecisePointers],
                        Some(&mut self.current),
                        loc,
                        FlagRelation::And,
                    );
                }
                let ctx = &mut *self.ctx;
                Some(if op == CastOp::PtrToInt {
                    ctx.address.pointer_to_integer(&mut ctx.encoder, e, &to)
                } else {
                    ctx.address.integer_to_pointer(&mut ctx.encoder, e, &from)
                })
            }
            _ => {
                if op.is_float() {
                    self.ctx.warn_float(&mut self.current, loc);
                } else if matches!(op, CastOp::Trunc | CastOp::ZExt) && matches!(from, VilType::Int(_)) {
                    self.ctx.reporter.warn_if_incomplete(
                        op.mnemonic(),
                        &[Flag::BitPrecise],
                        Some(&mut self.current),
                        loc,
                        FlagRelation::And,
                    );
                }
                self.ctx.encoder.convert(op, &from, &to, e)
            }
        };
        match result {
            Some(value) => self.assign_result(inst, to, value),
            None => {
                self.unmodeled(&format!("{} from {} to {}", op.mnemonic(), from, to), loc);
                self.havoc_result(inst, to);
            }
        }
        Ok(())
    }

    fn store(&mut self, value: &Value, ptr: &Value, loc: Option<&DebugLoc>) -> Result<()> {
        let (v, vty) = self.operand(value)?;
        let (addr, _) = self.operand(ptr)?;
        let region = self.ctx.region_for(&self.function.name, ptr)?;
        let external = self.ctx.regions.region(region).is_some_and(|r| r.external);
        if external {
            let guard = self.ctx.declare_is_external(addr);
            self.current.push(if self.ctx.options.memory_safety {
                Stmt::assert(guard)
            } else {
                Stmt::assume(guard)
            });
            self.ctx.reporter.warn_if_incomplete(
                "store to external memory",
                &[Flag::MemorySafety],
                Some(&mut self.current),
                loc,
                FlagRelation::And,
            );
            return Ok(());
        }
        let size = self.ctx.layout.store_size(&value.ty())?;
        self.ctx.write(region, addr, v, &vty, size, &mut self.current, loc)?;
        Ok(())
    }

    fn call(
        &mut self,
        inst: &Instruction,
        callee: &Callee,
        args: &[Value],
        ret: &Type,
        loc: Option<&DebugLoc>,
    ) -> Result<()> {
        let name = match callee {
            Callee::Direct(name) => name,
            Callee::Indirect(_) => {
                self.unmodeled("indirect call", loc);
                let mut havoc: Vec<String> = vec![];
                if *ret != Type::Void {
                    let ty = self.encode(ret)?;
                    havoc.extend(self.declare_result(inst, ty));
                }
                havoc.extend(self.ctx.regions.all_regions().iter().map(|r| r.var()));
                if !havoc.is_empty() {
                    self.current.push(Stmt::Havoc(havoc));
                }
                return Ok(());
            }
        };
        let signature = self
            .ctx
            .module
            .signature(name)
            .ok_or_else(|| Error::UnknownFunction { name: name.clone() })?;
        if args.len() < signature.params.len() {
            return Err(Error::invalid_operand(
                self.function.name.clone(),
                format!("call to {} passes {} of {} arguments", name, args.len(), signature.params.len()),
            ));
        }
        let void_callee = signature.ret == Type::Void;
        if void_callee != (*ret == Type::Void) || (void_callee && inst.result.is_some()) {
            return Err(Error::invalid_operand(
                self.function.name.clone(),
                format!("call to {} returning {} used as {}", name, signature.ret, ret),
            ));
        }
        if signature.external && signature.params.len() == 1 {
            if self.ctx.options.is_allocator(name) && signature.ret == Type::Pointer && *ret == Type::Pointer {
                return self.malloc(inst, &args[0]);
            }
            if self.ctx.options.is_deallocator(name) && void_callee {
                return self.free(&args[0]);
            }
        }
        let procedure = if signature.external {
            self.ctx.declare_external(name)?
        } else {
            self.ctx.naming.global(name)
        };
        if args.len() > signature.params.len() {
            self.unmodeled(&format!("variadic arguments to {}", name), loc);
        }
        let mut actuals = Vec::with_capacity(signature.params.len());
        for (arg, param) in args.iter().zip(&signature.params) {
            let want = self.encode(param)?;
            actuals.push(self.operand_as(arg, &want)?);
        }

        if void_callee {
            self.current.push(Stmt::call(vec![], procedure, actuals));
            return Ok(());
        }
        let returned = self.encode(&signature.ret)?;
        let expected = self.encode(ret)?;
        let target = if returned == expected {
            self.call_target(inst, expected.clone())
        } else {
            self.temp(returned.clone())
        };
        self.current.push(Stmt::call(vec![target.clone()], procedure, actuals));
        if signature.external && returned == VilType::Pointer {
            let guard = self.ctx.declare_is_external(Expr::var(&target));
            self.current.push(Stmt::assume(guard));
        }
        if inst.result.is_some() && returned != expected {
            let value = self.ctx.coerce(Expr::var(&target), &returned, &expected);
            self.assign_result(inst, expected, value);
        }
        Ok(())
    }

    /// Parallel assignment realizing the phis of `to` on the edge from `from`
    fn phi_moves(&mut self, from: &str, to: &str) -> Result<Option<Stmt>> {
        let function = self.function;
        let Some(target) = function.blocks.iter().find(|b| b.label == to) else {
            return Err(Error::invalid_operand(
                function.name.clone(),
                format!("branch to unknown block {}", to),
            ));
        };
        let mut targets = vec![];
        let mut values = vec![];
        for inst in &target.instructions {
            let InstKind::Phi { ty, incoming } = &inst.kind else {
                continue;
            };
            let Some(result) = &inst.result else {
                continue;
            };
            let Some((value, _)) = incoming.iter().find(|(_, label)| label == from) else {
                return Err(Error::invalid_operand(
                    function.name.clone(),
                    format!("phi {} has no value for predecessor {}", result, from),
                ));
            };
            let want = self.encode(ty)?;
            values.push(self.operand_as(value, &want)?);
            targets.push(Lhs::Var(self.local(result)));
        }
        Ok((!targets.is_empty()).then_some(Stmt::Assign { targets, values }))
    }

    /// Edge block: assumption, phi moves, jump to the destination
    fn edge(&mut self, label: String, guard: Expr, from: &str, to: &str) -> Result<String> {
        let mut stmts = vec![Stmt::assume(guard)];
        stmts.extend(self.phi_moves(from, to)?);
        stmts.push(Stmt::goto(vec![self.label(to)]));
        self.blocks.push(Block::new(label.clone(), stmts));
        Ok(label)
    }

    fn terminator(&mut self, bb: &BasicBlock) -> Result<()> {
        let label = self.label(&bb.label);
        let mut stmts = std::mem::take(&mut self.current);
        let first_edge = self.blocks.len();
        match &bb.terminator {
            Terminator::Ret(value) => {
                if let Some(value) = value {
                    let want = self.encode(&self.function.ret)?;
                    let e = self.operand_as(value, &want)?;
                    stmts.push(Stmt::assign(RETURN_VAR, e));
                }
                stmts.push(Stmt::Return);
            }
            Terminator::Br(dest) => {
                stmts.extend(self.phi_moves(&bb.label, dest)?);
                stmts.push(Stmt::goto(vec![self.label(dest)]));
            }
            Terminator::CondBr {
                cond,
                then_dest,
                else_dest,
            } => {
                let c = self.operand_as(cond, &VilType::Bool)?;
                let then_label = format!("{}$then", label);
                let else_label = format!("{}$else", label);
                let t = self.edge(then_label, c.clone(), &bb.label, then_dest)?;
                let e = self.edge(else_label, Expr::not(c), &bb.label, else_dest)?;
                stmts.push(Stmt::goto(vec![t, e]));
            }
            Terminator::Switch { value, default, cases } => {
                let (v, ty) = self.operand(value)?;
                let mut targets = vec![];
                for (k, (case, dest)) in cases.iter().enumerate() {
                    let guard = Expr::eq(v.clone(), self.ctx.encoder.literal_of(*case, &ty));
                    targets.push(self.edge(format!("{}$case{}", label, k), guard, &bb.label, dest)?);
                }
                let others = cases
                    .iter()
                    .map(|(case, _)| Expr::neq(v.clone(), self.ctx.encoder.literal_of(*case, &ty)))
                    .collect::<Vec<_>>();
                let guard = Expr::conjunction(others);
                targets.push(self.edge(format!("{}$default", label), guard, &bb.label, default)?);
                stmts.push(Stmt::goto(targets));
            }
            Terminator::Unreachable => {
                stmts.push(Stmt::assume(Expr::Bool(false)));
                stmts.push(Stmt::Return);
            }
        }
        let edges = self.blocks.split_off(first_edge);
        self.blocks.push(Block::new(label, stmts));
        self.blocks.extend(edges);
        Ok(())
    }
}
