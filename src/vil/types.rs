//! VIL types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of a VIL expression, variable or map
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VilType {
    Bool,
    /// Pointer of the target width, printed as the `ref` synonym
    Pointer,
    /// Unbounded mathematical integer tagged with its source width
    Int(u32),
    /// Fixed-width bit-vector with modular arithmetic
    BitVector(u32),
    Float,
    /// Total map from keys to values
    Map {
        key: Box<VilType>,
        value: Box<VilType>,
    },
}

impl VilType {
    pub fn map(key: VilType, value: VilType) -> Self {
        VilType::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    /// Bit width of integer-like types
    pub fn width(&self) -> Option<u32> {
        match self {
            VilType::Int(w) | VilType::BitVector(w) => Some(*w),
            VilType::Bool => Some(1),
            _ => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, VilType::Int(_) | VilType::BitVector(_))
    }

    /// Short type tag used in synthesized operator names
    pub fn suffix(&self) -> String {
        match self {
            VilType::Bool => "bool".to_string(),
            VilType::Pointer => "ref".to_string(),
            VilType::Int(w) => format!("i{}", w),
            VilType::BitVector(w) => format!("bv{}", w),
            VilType::Float => "float".to_string(),
            VilType::Map { key, value } => format!("M.{}.{}", key.suffix(), value.suffix()),
        }
    }
}

impl fmt::Display for VilType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VilType::Map { key, value } => write!(f, "[{}]{}", key, value),
            other => write!(f, "{}", other.suffix()),
        }
    }
}
