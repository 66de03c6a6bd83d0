//! Stack and heap allocation
//!
//! Addresses are never reused. Two counters carve fresh objects at run time:
//!
//! ```text
//!   $STACK_BASE ... $CurrAddr ->      $HEAP_BASE ... $HeapAddr ->
//! ```
//!
//! `alloca` calls `$alloc` with the object size rounded up to
//! [`ALLOC_ALIGN`], so every activation of a function gets its own frame,
//! recursive ones included. Calls to the configured allocators become calls
//! to `$malloc`, which returns a fresh address at or above `$HEAP_BASE`.
//! Deallocators become calls to `$free`, which releases nothing; under memory
//! safety it requires a heap or null pointer.
//!
//! The procedures are specified by contract only:
//!
//! ```text
//! procedure $alloc(n: ref) returns ($r: ref);
//!   modifies $CurrAddr;
//!   ensures $r == old($CurrAddr);
//!   ensures $CurrAddr == $add.ref(old($CurrAddr), n);
//!   ensures $sle.ref($STACK_BASE, $r) && $sle.ref($r, $CurrAddr);
//!   ensures $sle.ref($CurrAddr, $HEAP_BASE);
//!
//! procedure $malloc(n: ref) returns ($r: ref);
//!   modifies $HeapAddr;
//!   ensures $r == old($HeapAddr);
//!   ensures $sle.ref($HEAP_BASE, $r) && $sle.ref($r, $add.ref($r, n));
//!   ensures $sle.ref($add.ref($r, n), $HeapAddr);
//! ```
//!
//! Both counters start at their base in `$static_init`.

use super::context::{HelperKey, UnitContext, HEAP_BASE, HEAP_TOP, RETURN_VAR, STACK_BASE, STACK_TOP};
use super::instr::FunctionTranslator;
use crate::ir::{round_up, BinOp, Instruction, Predicate, Type, Value};
use crate::vil::{Binding, Expr, ProcDecl, Stmt, VilType};
use crate::{Error, Result};

/// Alignment of every stack object
pub const ALLOC_ALIGN: u64 = 16;

const SIZE: &str = "n";
const PTR: &str = "p";

fn sle(ctx: &mut UnitContext<'_>, lhs: Expr, rhs: Expr) -> Expr {
    ctx.encoder
        .compare(Predicate::Sle, &VilType::Pointer, lhs, rhs)
        .unwrap_or(Expr::Bool(false))
}

fn allocator(name: &str, counter: &str) -> ProcDecl {
    let mut proc = ProcDecl::new(name);
    proc.params = vec![Binding::new(SIZE, VilType::Pointer)];
    proc.returns = vec![Binding::new(RETURN_VAR, VilType::Pointer)];
    proc.modifies = vec![counter.to_string()];
    proc.ensures.push(Expr::eq(Expr::var(RETURN_VAR), Expr::old(Expr::var(counter))));
    proc
}

fn alloc_helper(ctx: &mut UnitContext<'_>, name: &str) -> ProcDecl {
    let mut proc = allocator(name, STACK_TOP);
    let bumped = ctx
        .encoder
        .pointer_binary(BinOp::Add, Expr::old(Expr::var(STACK_TOP)), Expr::var(SIZE));
    proc.ensures.push(Expr::eq(Expr::var(STACK_TOP), bumped));
    let above_base = sle(ctx, Expr::var(STACK_BASE), Expr::var(RETURN_VAR));
    let below_top = sle(ctx, Expr::var(RETURN_VAR), Expr::var(STACK_TOP));
    proc.ensures.push(Expr::and(above_base, below_top));
    let below_heap = sle(ctx, Expr::var(STACK_TOP), Expr::var(HEAP_BASE));
    proc.ensures.push(below_heap);
    proc
}

fn malloc_helper(ctx: &mut UnitContext<'_>, name: &str) -> ProcDecl {
    let mut proc = allocator(name, HEAP_TOP);
    let end = ctx
        .encoder
        .pointer_binary(BinOp::Add, Expr::var(RETURN_VAR), Expr::var(SIZE));
    let above_base = sle(ctx, Expr::var(HEAP_BASE), Expr::var(RETURN_VAR));
    let no_wrap = sle(ctx, Expr::var(RETURN_VAR), end.clone());
    proc.ensures.push(Expr::and(above_base, no_wrap));
    let fresh = sle(ctx, end, Expr::var(HEAP_TOP));
    proc.ensures.push(fresh);
    proc
}

fn free_helper(ctx: &mut UnitContext<'_>, name: &str) -> ProcDecl {
    let mut proc = ProcDecl::new(name);
    proc.params = vec![Binding::new(PTR, VilType::Pointer)];
    if ctx.options.memory_safety {
        let null = Expr::eq(Expr::var(PTR), ctx.encoder.null());
        let heap = sle(ctx, Expr::var(HEAP_BASE), Expr::var(PTR));
        proc.requires.push(Expr::or(null, heap));
    }
    proc
}

impl FunctionTranslator<'_, '_> {
    /// Stack object of `count` elements of `ty`, fresh for every activation
    pub(super) fn alloca(&mut self, inst: &Instruction, ty: &Type, count: &Value) -> Result<()> {
        let size = self.ctx.layout.size_of(ty)?;
        let bytes = match count.as_int() {
            Some(n) => {
                let n = u64::try_from(n).unwrap_or(0);
                let total = size
                    .checked_mul(n)
                    .filter(|total| i128::from(*total) <= self.ctx.sentinels.stack_capacity())
                    .ok_or(Error::AddressSpaceExhausted {
                        range: "stack",
                        limit: self.ctx.sentinels.heap_base(),
                    })?;
                let bytes = round_up(total.max(1), ALLOC_ALIGN);
                self.ctx.encoder.pointer_literal(i128::from(bytes))
            }
            None => {
                let count = self.operand_as(count, &VilType::Pointer)?;
                let stride = round_up(size.max(1), ALLOC_ALIGN);
                let stride = self.ctx.encoder.pointer_literal(i128::from(stride));
                self.ctx.encoder.pointer_binary(BinOp::Mul, count, stride)
            }
        };
        let procedure = self.ctx.helper(HelperKey::Alloc, alloc_helper);
        let target = self.call_target(inst, VilType::Pointer);
        self.current.push(Stmt::call(vec![target], procedure, vec![bytes]));
        Ok(())
    }

    /// Call to a configured allocator
    pub(super) fn malloc(&mut self, inst: &Instruction, size: &Value) -> Result<()> {
        let bytes = self.operand_as(size, &VilType::Pointer)?;
        let procedure = self.ctx.helper(HelperKey::Malloc, malloc_helper);
        let target = self.call_target(inst, VilType::Pointer);
        self.current.push(Stmt::call(vec![target], procedure, vec![bytes]));
        Ok(())
    }

    /// Call to a configured deallocator
    pub(super) fn free(&mut self, ptr: &Value) -> Result<()> {
        let p = self.operand_as(ptr, &VilType::Pointer)?;
        let procedure = self.ctx.helper(HelperKey::Free, free_helper);
        self.current.push(Stmt::call(vec![], procedure, vec![p]));
        Ok(())
    }
}
