//! Scalar memory accesses
//!
//! Lowers a typed read or write of `size` bytes at an address onto the map
//! backing a region. When the access width matches the map cell this is a
//! plain `M[p]` / `M[p] := v`. Byte-granular maps are read and written one
//! byte at a time, little-endian:
//!
//! - bit-vector integers reassemble exactly with concatenation and extraction,
//! - idealized integers use positional arithmetic on byte values, which loses
//!   the sign and is reported as unmodeled.
//!
//! Positional weights are built by repeated multiplication or division by 256,
//! so accesses of any width stay within literal range.

use super::context::UnitContext;
use super::encoder::{byte_width, op_name};
use super::region::{AccessSite, RegionId};
use crate::ir::{CastOp, Constant, DebugLoc, Value};
use crate::vil::{BinaryOp, Binding, Expr, FunctionDef, Stmt, VilType};
use crate::{Error, Result};

const BYTE: i128 = 256;

/// Site key for pointers that are not named values (null, integer addresses)
pub const CONSTANT_SITE: &str = "$constant";

impl UnitContext<'_> {
    /// Access site of a pointer operand inside `function`
    pub fn site_for<'v>(&mut self, function: &'v str, ptr: &'v Value) -> Result<AccessSite<'v>> {
        Ok(match ptr {
            Value::Local { name, .. } => AccessSite::local(function, name),
            Value::Global { name } | Value::Const(Constant::GlobalRef(name)) => AccessSite::global(name, 0),
            Value::Const(Constant::ElementPtr { base, source, indices }) => {
                let offset = self.address.constant_offset(self.layout, source, indices)?;
                AccessSite::global(base, u64::try_from(offset).unwrap_or(0))
            }
            Value::Const(_) => AccessSite::local(function, CONSTANT_SITE),
        })
    }

    /// Region accessed through a pointer operand
    pub fn region_for(&mut self, function: &str, ptr: &Value) -> Result<RegionId> {
        let site = self.site_for(function, ptr)?;
        self.regions.region_of(&site)
    }

    /// Map name, cell type and cell width of a region
    pub fn cell(&self, region: RegionId) -> (String, VilType, u64) {
        let (map, map_ty) = self.region_map(region);
        let cell = match map_ty {
            VilType::Map { value, .. } => *value,
            other => other,
        };
        let width = self.regions.region(region).map(|r| r.element_size()).unwrap_or(1);
        (map, cell, width)
    }

    /// Convert a value between encoded types
    pub fn coerce(&mut self, e: Expr, from: &VilType, to: &VilType) -> Expr {
        if from == to {
            return e;
        }
        match (from, to) {
            (VilType::Pointer, _) if to.width().is_some() => self.address.pointer_to_integer(&mut self.encoder, e, to),
            (_, VilType::Pointer) if from.width().is_some() => self.address.integer_to_pointer(&mut self.encoder, e, from),
            (VilType::Bool, _) if to.is_integer() => {
                let one = self.encoder.literal_of(1, to);
                let zero = self.encoder.literal_of(0, to);
                Expr::ite(e, one, zero)
            }
            (_, VilType::Bool) if from.is_integer() => Expr::neq(e, self.encoder.literal_of(0, from)),
            (VilType::Int(a) | VilType::BitVector(a), VilType::Int(b) | VilType::BitVector(b)) => {
                let op = if a > b { CastOp::Trunc } else { CastOp::ZExt };
                self.convert_or_opaque(op, from, to, e)
            }
            (VilType::Float, VilType::Pointer) => {
                let int = self.encoder.int_type(self.encoder.pointer_width());
                let bits = self.convert_or_opaque(CastOp::BitCast, from, &int, e);
                self.coerce(bits, &int, to)
            }
            (VilType::Pointer, VilType::Float) => {
                let int = self.encoder.int_type(self.encoder.pointer_width());
                let bits = self.coerce(e, from, &int);
                self.convert_or_opaque(CastOp::BitCast, &int, to, bits)
            }
            _ => self.convert_or_opaque(CastOp::BitCast, from, to, e),
        }
    }

    fn convert_or_opaque(&mut self, op: CastOp, from: &VilType, to: &VilType, e: Expr) -> Expr {
        match self.encoder.convert(op, from, to, e.clone()) {
            Some(converted) => converted,
            None => {
                let def = FunctionDef::uninterpreted(
                    op_name("coerce", &[from, to]),
                    vec![Binding::new("i", from.clone())],
                    to.clone(),
                );
                let name = self.encoder.declare(def);
                Expr::apply(name, vec![e])
            }
        }
    }

    /// Read `size` bytes at `addr` as a value of type `want`
    pub fn read(
        &mut self,
        region: RegionId,
        addr: Expr,
        want: &VilType,
        size: u64,
        block: &mut Vec<Stmt>,
        loc: Option<&DebugLoc>,
    ) -> Result<Expr> {
        let (map, cell, width) = self.cell(region);
        if size == width {
            let value = Expr::select(Expr::var(&map), addr);
            return Ok(self.coerce(value, &cell, want));
        }
        if width == 1 {
            let mut bytes = Vec::with_capacity(size as usize);
            for k in 0..size {
                let at = self.address.add_offset(&mut self.encoder, addr.clone(), k as i128);
                bytes.push(Expr::select(Expr::var(&map), at));
            }
            let wide = self.encoder.int_type(access_width(size)?);
            let value = if self.encoder.is_bit_vector() {
                bytes
                    .into_iter()
                    .reduce(|lo, hi| Expr::concat(hi, lo))
                    .unwrap_or(Expr::BitVector { value: 0, width: 8 })
            } else {
                self.reporter.warn_unmodeled(
                    &format!("{}-byte load from byte-granular region {}", size, map),
                    Some(block),
                    loc,
                );
                // b0 + 256 * (b1 + 256 * (b2 + ...))
                bytes
                    .into_iter()
                    .rev()
                    .reduce(|high, b| {
                        Expr::binary(BinaryOp::Add, b, Expr::binary(BinaryOp::Mul, high, Expr::Int(BYTE)))
                    })
                    .unwrap_or(Expr::Int(0))
            };
            return Ok(self.coerce(value, &wide, want));
        }
        self.reporter.warn_unmodeled(
            &format!("{}-byte load from region {} of {}-byte cells", size, map, width),
            Some(block),
            loc,
        );
        let (_, map_ty) = self.region_map(region);
        let def = FunctionDef::uninterpreted(
            op_name("load", &[&map_ty, want]),
            vec![Binding::new("M", map_ty.clone()), Binding::new("p", VilType::Pointer)],
            want.clone(),
        );
        let name = self.encoder.declare(def);
        Ok(Expr::apply(name, vec![Expr::var(map), addr]))
    }

    /// Write `value` of type `value_ty` as `size` bytes at `addr`
    #[allow(clippy::too_many_arguments)]
    pub fn write(
        &mut self,
        region: RegionId,
        addr: Expr,
        value: Expr,
        value_ty: &VilType,
        size: u64,
        block: &mut Vec<Stmt>,
        loc: Option<&DebugLoc>,
    ) -> Result<()> {
        let (map, cell, width) = self.cell(region);
        if size == width {
            let value = self.coerce(value, value_ty, &cell);
            block.push(Stmt::store(map, addr, value));
            return Ok(());
        }
        if width == 1 {
            let wide = self.encoder.int_type(access_width(size)?);
            let value = self.coerce(value, value_ty, &wide);
            let bit_vector = self.encoder.is_bit_vector();
            if !bit_vector {
                self.reporter.warn_unmodeled(
                    &format!("{}-byte store to byte-granular region {}", size, map),
                    Some(block),
                    loc,
                );
            }
            let mut shifted = value.clone();
            for k in 0..size {
                let at = self.address.add_offset(&mut self.encoder, addr.clone(), k as i128);
                let byte = if bit_vector {
                    let low = access_width(k)?;
                    Expr::extract(value.clone(), low + 8, low)
                } else {
                    if k > 0 {
                        shifted = Expr::binary(BinaryOp::Div, shifted, Expr::Int(BYTE));
                    }
                    Expr::binary(BinaryOp::Mod, shifted.clone(), Expr::Int(BYTE))
                };
                block.push(Stmt::store(map.clone(), at, byte));
            }
            return Ok(());
        }
        self.reporter.warn_unmodeled(
            &format!("{}-byte store to region {} of {}-byte cells", size, map, width),
            Some(block),
            loc,
        );
        let (_, map_ty) = self.region_map(region);
        let def = FunctionDef::uninterpreted(
            op_name("store", &[&map_ty, value_ty]),
            vec![
                Binding::new("M", map_ty.clone()),
                Binding::new("p", VilType::Pointer),
                Binding::new("v", value_ty.clone()),
            ],
            map_ty,
        );
        let name = self.encoder.declare(def);
        block.push(Stmt::assign(
            map.clone(),
            Expr::apply(name, vec![Expr::var(map), addr, value]),
        ));
        Ok(())
    }
}

fn access_width(bytes: u64) -> Result<u32> {
    byte_width(bytes).ok_or_else(|| Error::UnknownLayout {
        ty: format!("{}-byte access", bytes),
    })
}
