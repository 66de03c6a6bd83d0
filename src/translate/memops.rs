//! Block copy and fill
//!
//! A copy or fill with a literal length over regions of matching cells is
//! unrolled into one map write per cell, as long as the cell width is one of
//! [`MEMORY_ACCESS_SIZES`] and the number of writes stays within
//! `max_unroll`. Everything else calls a helper procedure specified only by
//! its contract:
//!
//! ```text
//! procedure $memcpy.1.0(dest: ref, src: ref, len: ref);
//!   modifies $M.1;
//!   ensures (forall x: ref :: dest <= x && x < dest + len ==> $M.1[x] == old($M.0)[src + (x - dest)]);
//!   ensures (forall x: ref :: !(dest <= x && x < dest + len) ==> $M.1[x] == old($M.1)[x]);
//! ```
//!
//! Helpers are memoized per destination/source region pair, so one helper
//! serves every call site with the same regions.

use super::context::{HelperKey, UnitContext};
use super::encoder::{mask, to_signed};
use super::instr::FunctionTranslator;
use super::region::{RegionId, MEMORY_ACCESS_SIZES};
use crate::ir::{BinOp, DebugLoc, Predicate, Value};
use crate::vil::{Binding, Expr, ProcDecl, Stmt, VilType};
use crate::Result;

const DEST: &str = "dest";
const SRC: &str = "src";
const VAL: &str = "val";
const LEN: &str = "len";
const X: &str = "x";

/// `base <= x && x < base + len`, with signed pointer comparisons
fn in_range(ctx: &mut UnitContext<'_>, base: &str) -> Expr {
    let end = ctx.encoder.pointer_binary(BinOp::Add, Expr::var(base), Expr::var(LEN));
    let lower = ctx
        .encoder
        .compare(Predicate::Sle, &VilType::Pointer, Expr::var(base), Expr::var(X))
        .unwrap_or(Expr::Bool(false));
    let upper = ctx
        .encoder
        .compare(Predicate::Slt, &VilType::Pointer, Expr::var(X), end)
        .unwrap_or(Expr::Bool(false));
    Expr::and(lower, upper)
}

/// Cells outside the written range keep their old value
fn frame(ctx: &mut UnitContext<'_>, map: &str) -> Expr {
    let range = in_range(ctx, DEST);
    let unchanged = Expr::eq(
        Expr::select(Expr::var(map), Expr::var(X)),
        Expr::select(Expr::old(Expr::var(map)), Expr::var(X)),
    );
    Expr::forall(
        vec![Binding::new(X, VilType::Pointer)],
        Expr::implies(Expr::not(range), unchanged),
    )
}

fn copy_helper(ctx: &mut UnitContext<'_>, name: &str, dst: RegionId, src: RegionId) -> ProcDecl {
    let (dmap, dty) = ctx.region_map(dst);
    let (smap, sty) = ctx.region_map(src);
    let mut proc = ProcDecl::new(name);
    proc.params = vec![
        Binding::new(DEST, VilType::Pointer),
        Binding::new(SRC, VilType::Pointer),
        Binding::new(LEN, VilType::Pointer),
    ];
    proc.modifies = vec![dmap.clone()];
    if dty == sty {
        let range = in_range(ctx, DEST);
        let delta = ctx.encoder.pointer_binary(BinOp::Sub, Expr::var(X), Expr::var(DEST));
        let from = ctx.encoder.pointer_binary(BinOp::Add, Expr::var(SRC), delta);
        let copied = Expr::eq(
            Expr::select(Expr::var(&dmap), Expr::var(X)),
            Expr::select(Expr::old(Expr::var(&smap)), from),
        );
        proc.ensures.push(Expr::forall(
            vec![Binding::new(X, VilType::Pointer)],
            Expr::implies(range, copied),
        ));
    }
    proc.ensures.push(frame(ctx, &dmap));
    proc
}

fn fill_helper(ctx: &mut UnitContext<'_>, name: &str, dst: RegionId) -> ProcDecl {
    let (dmap, _) = ctx.region_map(dst);
    let (_, cell, width) = ctx.cell(dst);
    let mut proc = ProcDecl::new(name);
    proc.params = vec![
        Binding::new(DEST, VilType::Pointer),
        Binding::new(VAL, ctx.encoder.int_type(8)),
        Binding::new(LEN, VilType::Pointer),
    ];
    proc.modifies = vec![dmap.clone()];
    if width == 1 && cell == ctx.encoder.int_type(8) {
        let range = in_range(ctx, DEST);
        let filled = Expr::eq(Expr::select(Expr::var(&dmap), Expr::var(X)), Expr::var(VAL));
        proc.ensures.push(Expr::forall(
            vec![Binding::new(X, VilType::Pointer)],
            Expr::implies(range, filled),
        ));
    }
    proc.ensures.push(frame(ctx, &dmap));
    proc
}

/// Number of cell writes for a literal length, if it can be unrolled
fn unroll_count(len: Option<i128>, width: u64, max_unroll: u64) -> Option<u64> {
    let len = u64::try_from(len?).ok()?;
    if !MEMORY_ACCESS_SIZES.contains(&width) || len % width != 0 {
        return None;
    }
    let count = len / width;
    (count <= max_unroll).then_some(count)
}

impl FunctionTranslator<'_, '_> {
    pub(super) fn memcpy(&mut self, dst: &Value, src: &Value, len: &Value, loc: Option<&DebugLoc>) -> Result<()> {
        let (d, _) = self.operand(dst)?;
        let (s, _) = self.operand(src)?;
        let rd = self.ctx.region_for(&self.function.name, dst)?;
        let rs = self.ctx.region_for(&self.function.name, src)?;
        let (dmap, dcell, dwidth) = self.ctx.cell(rd);
        let (smap, scell, swidth) = self.ctx.cell(rs);
        let matching = dcell == scell && dwidth == swidth;
        if !matching {
            self.ctx.reporter.warn_unmodeled(
                &format!("memcpy from {} to {} with different cell types", smap, dmap),
                Some(&mut self.current),
                loc,
            );
        }

        if let Some(count) = unroll_count(len.as_int(), dwidth, self.ctx.options.max_unroll).filter(|_| matching) {
            for k in 0..count {
                let offset = (k * dwidth) as i128;
                let ctx = &mut *self.ctx;
                let at_dst = ctx.address.add_offset(&mut ctx.encoder, d.clone(), offset);
                let at_src = ctx.address.add_offset(&mut ctx.encoder, s.clone(), offset);
                self.current
                    .push(Stmt::store(dmap.clone(), at_dst, Expr::select(Expr::var(&smap), at_src)));
            }
            return Ok(());
        }

        let (n, nty) = self.operand(len)?;
        let n = self.ctx.coerce(n, &nty, &VilType::Pointer);
        let helper = self
            .ctx
            .helper(HelperKey::Copy { dst: rd, src: rs }, |ctx, name| copy_helper(ctx, name, rd, rs));
        self.current.push(Stmt::call(vec![], helper, vec![d, s, n]));
        Ok(())
    }

    pub(super) fn memset(&mut self, dst: &Value, byte: &Value, len: &Value, loc: Option<&DebugLoc>) -> Result<()> {
        let (d, _) = self.operand(dst)?;
        let (b, bty) = self.operand(byte)?;
        let rd = self.ctx.region_for(&self.function.name, dst)?;
        let (dmap, dcell, dwidth) = self.ctx.cell(rd);

        let count = unroll_count(len.as_int(), dwidth, self.ctx.options.max_unroll);
        let value = match (count, byte.as_int()) {
            (Some(_), Some(byte)) => self.fill_literal(byte, &dcell, dwidth),
            (Some(_), None) if dwidth == 1 => Some(self.ctx.coerce(b.clone(), &bty, &dcell)),
            _ => None,
        };
        if let (Some(count), Some(value)) = (count, value) {
            for k in 0..count {
                let ctx = &mut *self.ctx;
                let at = ctx.address.add_offset(&mut ctx.encoder, d.clone(), (k * dwidth) as i128);
                self.current.push(Stmt::store(dmap.clone(), at, value.clone()));
            }
            return Ok(());
        }

        if dwidth != 1 {
            self.ctx.reporter.warn_unmodeled(
                &format!("memset of {} with {}-byte cells", dmap, dwidth),
                Some(&mut self.current),
                loc,
            );
        }
        let byte_ty = self.ctx.encoder.int_type(8);
        let val = self.ctx.coerce(b, &bty, &byte_ty);
        let (n, nty) = self.operand(len)?;
        let n = self.ctx.coerce(n, &nty, &VilType::Pointer);
        let helper = self
            .ctx
            .helper(HelperKey::Fill { dst: rd }, |ctx, name| fill_helper(ctx, name, rd));
        self.current.push(Stmt::call(vec![], helper, vec![d, val, n]));
        Ok(())
    }

    /// Cell value whose every byte is `byte`
    fn fill_literal(&self, byte: i128, cell: &VilType, width: u64) -> Option<Expr> {
        let byte = mask(byte, 8);
        let pattern = (0..width).fold(0u128, |acc, k| acc | (byte << (8 * k)));
        let bits = (width * 8) as u32;
        match cell {
            VilType::Float if pattern != 0 => None,
            VilType::Map { .. } => None,
            _ => Some(self.ctx.encoder.literal_of(to_signed(pattern, bits), cell)),
        }
    }
}
