//! Target data layout
//!
//! The translator never hard-codes sizes: every byte offset it emits comes from
//! a [`DataLayout`]. [`TargetLayout`] models a little-endian target with natural
//! alignment, which matches the common 64-bit ABIs.
//!
//! | Type | Store size | Alignment |
//! |------|-----------|-----------|
//! | `iN` | `ceil(N/8)` | next power of two, capped at 16 |
//! | `float` / `double` | 4 / 8 | 4 / 8 |
//! | `x86_fp80` | 10 | 16 |
//! | `ptr` | pointer width / 8 | same |
//! | `[n x T]` | `n * alloc(T)` | `align(T)` |
//! | struct | padded fields | max field alignment (1 if packed) |

use super::types::{FloatKind, StructType, Type};
use crate::{Error, Result};

/// Size, alignment and offset queries for source types
pub trait DataLayout {
    /// Pointer width in bits
    fn pointer_width(&self) -> u32;

    /// Bytes written by a store of this type
    fn store_size(&self, ty: &Type) -> Result<u64>;

    /// Alignment in bytes
    fn align_of(&self, ty: &Type) -> Result<u64>;

    /// Byte offset of a struct field
    fn field_offset(&self, st: &StructType, index: usize) -> Result<u64>;

    /// Allocation size: store size rounded up to the alignment
    fn size_of(&self, ty: &Type) -> Result<u64> {
        let store = self.store_size(ty)?;
        let align = self.align_of(ty)?;
        Ok(round_up(store, align))
    }

    /// Distance between consecutive array elements
    fn element_stride(&self, element: &Type) -> Result<u64> {
        self.size_of(element)
    }
}

/// Round `value` up to a multiple of `align`
pub fn round_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

fn unknown(ty: &Type) -> Error {
    Error::UnknownLayout { ty: ty.to_string() }
}

/// Natural-alignment little-endian layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetLayout {
    pointer_bits: u32,
}

impl Default for TargetLayout {
    fn default() -> Self {
        Self::new(64)
    }
}

impl TargetLayout {
    pub fn new(pointer_bits: u32) -> Self {
        Self { pointer_bits }
    }

    fn struct_layout(&self, st: &StructType) -> Result<(Vec<u64>, u64, u64)> {
        let mut offsets = Vec::with_capacity(st.fields.len());
        let mut offset = 0u64;
        let mut max_align = 1u64;
        for field in &st.fields {
            let align = if st.packed { 1 } else { self.align_of(field)? };
            max_align = max_align.max(align);
            offset = round_up(offset, align);
            offsets.push(offset);
            offset += self.size_of(field)?;
        }
        let size = round_up(offset, max_align);
        Ok((offsets, size, max_align))
    }
}

impl DataLayout for TargetLayout {
    fn pointer_width(&self) -> u32 {
        self.pointer_bits
    }

    fn store_size(&self, ty: &Type) -> Result<u64> {
        match ty {
            Type::Int(w) => Ok(u64::from(*w).div_ceil(8).max(1)),
            Type::Float(FloatKind::X86Fp80) => Ok(10),
            Type::Float(kind) => Ok(u64::from(kind.bits() / 8)),
            Type::Pointer => Ok(u64::from(self.pointer_bits / 8)),
            Type::Array { element, count } => Ok(self.element_stride(element)? * count),
            Type::Struct(st) => Ok(self.struct_layout(st)?.1),
            Type::Void | Type::Function | Type::Opaque(_) => Err(unknown(ty)),
        }
    }

    fn align_of(&self, ty: &Type) -> Result<u64> {
        match ty {
            Type::Int(_) => Ok(self.store_size(ty)?.next_power_of_two().min(16)),
            Type::Float(FloatKind::X86Fp80) | Type::Float(FloatKind::Fp128) => Ok(16),
            Type::Float(kind) => Ok(u64::from(kind.bits() / 8)),
            Type::Pointer => Ok(u64::from(self.pointer_bits / 8)),
            Type::Array { element, .. } => self.align_of(element),
            Type::Struct(st) => Ok(self.struct_layout(st)?.2),
            Type::Void | Type::Function | Type::Opaque(_) => Err(unknown(ty)),
        }
    }

    fn field_offset(&self, st: &StructType, index: usize) -> Result<u64> {
        let (offsets, _, _) = self.struct_layout(st)?;
        offsets.get(index).copied().ok_or_else(|| {
            Error::invalid_operand(
                Type::Struct(st.clone()).to_string(),
                format!("field index {} out of range", index),
            )
        })
    }
}
