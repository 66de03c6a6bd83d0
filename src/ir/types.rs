//! Source-level types of the SSA input
//!
//! Types are structural: two `{i32, ptr}` structs are the same type. Named
//! types without a body are kept as [`Type::Opaque`] and have no layout.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Floating point formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatKind {
    /// IEEE half precision
    Half,
    /// IEEE single precision
    Float,
    /// IEEE double precision
    Double,
    /// x87 extended precision
    X86Fp80,
    /// IEEE quad precision
    Fp128,
}

impl FloatKind {
    /// Width of the value in bits
    pub fn bits(&self) -> u32 {
        match self {
            FloatKind::Half => 16,
            FloatKind::Float => 32,
            FloatKind::Double => 64,
            FloatKind::X86Fp80 => 80,
            FloatKind::Fp128 => 128,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FloatKind::Half => "half",
            FloatKind::Float => "float",
            FloatKind::Double => "double",
            FloatKind::X86Fp80 => "x86_fp80",
            FloatKind::Fp128 => "fp128",
        }
    }
}

/// Struct type with ordered fields
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructType {
    pub fields: Vec<Type>,
    /// Packed structs have no inter-field padding
    pub packed: bool,
}

impl StructType {
    pub fn new(fields: Vec<Type>) -> Self {
        Self {
            fields,
            packed: false,
        }
    }

    pub fn packed(fields: Vec<Type>) -> Self {
        Self {
            fields,
            packed: true,
        }
    }
}

/// A source type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void,
    /// Integer of the given bit width; `Int(1)` is the boolean type
    Int(u32),
    Float(FloatKind),
    /// Opaque pointer
    Pointer,
    Array {
        element: Box<Type>,
        count: u64,
    },
    Struct(StructType),
    /// Function type, only meaningful behind a pointer
    Function,
    /// Named type without a body
    Opaque(String),
}

impl Type {
    pub fn i1() -> Self {
        Type::Int(1)
    }

    pub fn i8() -> Self {
        Type::Int(8)
    }

    pub fn i32() -> Self {
        Type::Int(32)
    }

    pub fn i64() -> Self {
        Type::Int(64)
    }

    pub fn double() -> Self {
        Type::Float(FloatKind::Double)
    }

    pub fn array(element: Type, count: u64) -> Self {
        Type::Array {
            element: Box::new(element),
            count,
        }
    }

    pub fn structure(fields: Vec<Type>) -> Self {
        Type::Struct(StructType::new(fields))
    }

    /// Bit width if this is an integer type
    pub fn int_width(&self) -> Option<u32> {
        match self {
            Type::Int(w) => Some(*w),
            _ => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer)
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Type::Array { .. } | Type::Struct(_))
    }

    /// Whether the type occupies memory at all
    pub fn is_sized(&self) -> bool {
        match self {
            Type::Void | Type::Function | Type::Opaque(_) => false,
            Type::Array { element, .. } => element.is_sized(),
            Type::Struct(st) => st.fields.iter().all(Type::is_sized),
            _ => true,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int(w) => write!(f, "i{}", w),
            Type::Float(kind) => write!(f, "{}", kind.name()),
            Type::Pointer => write!(f, "ptr"),
            Type::Array { element, count } => write!(f, "[{} x {}]", count, element),
            Type::Struct(st) => {
                if st.packed {
                    write!(f, "<")?;
                }
                write!(f, "{{")?;
                for (i, field) in st.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, "}}")?;
                if st.packed {
                    write!(f, ">")?;
                }
                Ok(())
            }
            Type::Function => write!(f, "fn"),
            Type::Opaque(name) => write!(f, "%{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let ty = Type::structure(vec![Type::i32(), Type::array(Type::Pointer, 2)]);
        assert_eq!(ty.to_string(), "{i32, [2 x ptr]}");
        let packed = Type::Struct(StructType::packed(vec![Type::i8(), Type::i64()]));
        assert_eq!(packed.to_string(), "<{i8, i64}>");
    }

    #[test]
    fn test_sized() {
        assert!(Type::array(Type::i32(), 4).is_sized());
        assert!(!Type::Void.is_sized());
        assert!(!Type::structure(vec![Type::i8(), Type::Opaque("T".into())]).is_sized());
    }
}
