//! Address arithmetic engine
//!
//! Builds `base + offset` pointer expressions. Offsets come from the
//! [`DataLayout`] and are cached per (type, index) pair, so repeated accesses
//! into the same aggregate shape ask the layout once.
//!
//! Literal offsets fold: `$add.ref($add.ref(p, 8), 4)` is built as
//! `$add.ref(p, 12)`, and a literal base absorbs the offset entirely.

use super::encoder::{op_name, NumericEncoder};
use crate::ir::{BinOp, DataLayout, StructType, Type};
use crate::vil::{Expr, VilType};
use crate::{Error, Result};
use std::collections::HashMap;

/// An element index: a literal or an encoded expression of the given VIL type
#[derive(Debug, Clone, PartialEq)]
pub enum Index {
    Literal(i128),
    Symbolic(Expr, VilType),
}

/// Offset and stride cache
#[derive(Debug, Default, Clone)]
pub struct AddressEngine {
    field_offsets: HashMap<(StructType, usize), u64>,
    strides: HashMap<Type, u64>,
    layout_queries: usize,
}

impl AddressEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the layout was consulted; cached hits do not count
    pub fn layout_queries(&self) -> usize {
        self.layout_queries
    }

    /// Byte offset of a struct field
    pub fn field_offset(&mut self, layout: &dyn DataLayout, st: &StructType, field: usize) -> Result<u64> {
        if let Some(&off) = self.field_offsets.get(&(st.clone(), field)) {
            return Ok(off);
        }
        self.layout_queries += 1;
        let off = layout.field_offset(st, field)?;
        self.field_offsets.insert((st.clone(), field), off);
        Ok(off)
    }

    /// Distance between consecutive elements of `ty`
    pub fn stride(&mut self, layout: &dyn DataLayout, ty: &Type) -> Result<u64> {
        if let Some(&size) = self.strides.get(ty) {
            return Ok(size);
        }
        self.layout_queries += 1;
        let size = layout.element_stride(ty)?;
        self.strides.insert(ty.clone(), size);
        Ok(size)
    }

    /// `base + offset` with literal folding
    pub fn add_offset(&self, enc: &mut NumericEncoder, base: Expr, offset: i128) -> Expr {
        if offset == 0 {
            return base;
        }
        if let Some(value) = enc.pointer_value(&base) {
            return enc.pointer_literal(value + offset);
        }
        let add = op_name("add", &[&VilType::Pointer]);
        if let Expr::Apply { function, args } = &base {
            if *function == add && args.len() == 2 {
                if let Some(inner) = enc.pointer_value(&args[1]) {
                    let folded = enc.pointer_literal(inner + offset);
                    return enc.pointer_binary(BinOp::Add, args[0].clone(), folded);
                }
            }
        }
        let lit = enc.pointer_literal(offset);
        enc.pointer_binary(BinOp::Add, base, lit)
    }

    /// `base + index * size`
    pub fn element_address(&self, enc: &mut NumericEncoder, base: Expr, index: Index, size: u64) -> Expr {
        match index {
            Index::Literal(i) => self.add_offset(enc, base, i * size as i128),
            Index::Symbolic(e, ty) => {
                let offset = match ty {
                    VilType::Pointer => e,
                    other => self.integer_to_pointer(enc, e, &other),
                };
                let scaled = if size == 1 {
                    offset
                } else {
                    let size = enc.pointer_literal(size as i128);
                    enc.pointer_binary(BinOp::Mul, offset, size)
                };
                enc.pointer_binary(BinOp::Add, base, scaled)
            }
        }
    }

    /// `base + offsetof(st, field)`
    pub fn field_address(
        &mut self,
        enc: &mut NumericEncoder,
        layout: &dyn DataLayout,
        base: Expr,
        st: &StructType,
        field: usize,
    ) -> Result<Expr> {
        let off = self.field_offset(layout, st, field)?;
        Ok(self.add_offset(enc, base, off as i128))
    }

    /// Full element-address walk: the first index scales by `source`, the
    /// rest step into arrays and structs
    pub fn element_ptr(
        &mut self,
        enc: &mut NumericEncoder,
        layout: &dyn DataLayout,
        base: Expr,
        source: &Type,
        indices: Vec<Index>,
    ) -> Result<Expr> {
        let mut addr = base;
        let mut current = source.clone();
        for (position, index) in indices.into_iter().enumerate() {
            if position == 0 {
                let size = self.stride(layout, &current)?;
                addr = self.element_address(enc, addr, index, size);
                continue;
            }
            current = match current {
                Type::Array { element, .. } => {
                    let size = self.stride(layout, &element)?;
                    addr = self.element_address(enc, addr, index, size);
                    *element
                }
                Type::Struct(st) => {
                    let field = match index {
                        Index::Literal(i) if i >= 0 => i as usize,
                        _ => {
                            return Err(Error::invalid_operand(
                                Type::Struct(st).to_string(),
                                "struct field index must be a non-negative literal",
                            ))
                        }
                    };
                    addr = self.field_address(enc, layout, addr, &st, field)?;
                    st.fields
                        .get(field)
                        .cloned()
                        .ok_or_else(|| Error::invalid_operand(Type::Struct(st.clone()).to_string(), "field index out of range"))?
                }
                other => {
                    return Err(Error::invalid_operand(
                        other.to_string(),
                        "cannot index into a non-aggregate type",
                    ))
                }
            };
        }
        Ok(addr)
    }

    /// Constant byte offset of an index path with literal indices
    pub fn constant_offset(&mut self, layout: &dyn DataLayout, source: &Type, indices: &[i64]) -> Result<i128> {
        let mut offset = 0i128;
        let mut current = source.clone();
        for (position, &index) in indices.iter().enumerate() {
            if position == 0 {
                offset += i128::from(index) * self.stride(layout, &current)? as i128;
                continue;
            }
            current = match current {
                Type::Array { element, .. } => {
                    offset += i128::from(index) * self.stride(layout, &element)? as i128;
                    *element
                }
                Type::Struct(st) => {
                    let field = usize::try_from(index)
                        .map_err(|_| Error::invalid_operand(Type::Struct(st.clone()).to_string(), "negative field index"))?;
                    offset += self.field_offset(layout, &st, field)? as i128;
                    st.fields.get(field).cloned().ok_or_else(|| {
                        Error::invalid_operand(Type::Struct(st.clone()).to_string(), "field index out of range")
                    })?
                }
                other => {
                    return Err(Error::invalid_operand(
                        other.to_string(),
                        "cannot index into a non-aggregate type",
                    ))
                }
            };
        }
        Ok(offset)
    }

    /// Pointer to integer of type `to`; undoes a matching integer-to-pointer
    pub fn pointer_to_integer(&self, enc: &mut NumericEncoder, e: Expr, to: &VilType) -> Expr {
        let inverse = enc.i2p_name(to);
        if let Some((name, args)) = e.applied() {
            if name == inverse && args.len() == 1 && self.lossless_into_pointer(enc, to) {
                return args[0].clone();
            }
        }
        enc.pointer_to_int(e, to)
    }

    /// Integer of type `from` to pointer; undoes a matching pointer-to-integer
    pub fn integer_to_pointer(&self, enc: &mut NumericEncoder, e: Expr, from: &VilType) -> Expr {
        let inverse = enc.p2i_name(from);
        if let Some((name, args)) = e.applied() {
            if name == inverse && args.len() == 1 && self.lossless_from_pointer(enc, from) {
                return args[0].clone();
            }
        }
        enc.int_to_pointer(e, from)
    }

    // An integer of this type survives a trip through a pointer
    fn lossless_into_pointer(&self, enc: &NumericEncoder, ty: &VilType) -> bool {
        ty.width().is_some_and(|w| w <= enc.pointer_width())
    }

    // A pointer survives a trip through an integer of this type
    fn lossless_from_pointer(&self, enc: &NumericEncoder, ty: &VilType) -> bool {
        ty.width().is_some_and(|w| w >= enc.pointer_width())
    }
}
