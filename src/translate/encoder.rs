//! Type and numeric encoder
//!
//! Decides once per unit how source integers, pointers and floats are
//! represented, and synthesizes the VIL functions that implement every
//! operator the translator uses.
//!
//! # Encodings
//!
//! | Source | Idealized | Bit-vector |
//! |--------|-----------|------------|
//! | `i1` | `bool` | `bool` |
//! | `iN` | `iN` (unbounded `int`) | `bvN` |
//! | `ptr` | `ref` = `int` | `ref` = `bv64` |
//! | `float`, `double` | `float` | `float` |
//!
//! Pointers follow their own switch (`bit_precise_pointers`), independent of
//! the integer encoding.
//!
//! # Operator registry
//!
//! Operators are applied by name (`$add.i32`, `$slt.bv8`, `$zext.bv8.bv32`,
//! `$p2i.ref.i64`, `$fadd.float`). The first use of a name records its
//! declaration:
//!
//! - exact idealized operators get an inline body,
//! - bit-vector operators map onto solver builtins,
//! - everything else is left uninterpreted.
//!
//! [`NumericEncoder::declarations`] returns them sorted by name.

use super::options::{IntegerEncoding, TranslateOptions};
use super::region::{ElementKind, Region};
use crate::ir::{BinOp, CastOp, DataLayout, Predicate, Type};
use crate::vil::{BinaryOp, Binding, Decl, Expr, FunctionDef, VilType};
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Truncate a two's complement value to `width` bits
pub fn mask(value: i128, width: u32) -> u128 {
    if width >= 128 {
        value as u128
    } else {
        (value as u128) & ((1u128 << width) - 1)
    }
}

/// Read a `width`-bit pattern as a signed value
pub fn to_signed(bits: u128, width: u32) -> i128 {
    if width == 0 || width >= 128 {
        return bits as i128;
    }
    let sign = 1u128 << (width - 1);
    if bits & sign != 0 {
        (bits | !((1u128 << width) - 1)) as i128
    } else {
        bits as i128
    }
}

/// Width in bits of `bytes` bytes, if it fits a type width
pub fn byte_width(bytes: u64) -> Option<u32> {
    bytes.checked_mul(8).and_then(|bits| u32::try_from(bits).ok())
}

/// Operator name from a mnemonic and operand/result types
pub fn op_name(op: &str, types: &[&VilType]) -> String {
    let mut name = format!("${}", op);
    for ty in types {
        name.push('.');
        name.push_str(&ty.suffix());
    }
    name
}

fn bv_builtin(op: BinOp) -> Option<&'static str> {
    Some(match op {
        BinOp::Add => "bvadd",
        BinOp::Sub => "bvsub",
        BinOp::Mul => "bvmul",
        BinOp::SDiv => "bvsdiv",
        BinOp::UDiv => "bvudiv",
        BinOp::SRem => "bvsrem",
        BinOp::URem => "bvurem",
        BinOp::Shl => "bvshl",
        BinOp::LShr => "bvlshr",
        BinOp::AShr => "bvashr",
        BinOp::And => "bvand",
        BinOp::Or => "bvor",
        BinOp::Xor => "bvxor",
        _ => return None,
    })
}

fn bv_compare_builtin(pred: Predicate) -> Option<&'static str> {
    Some(match pred {
        Predicate::Slt => "bvslt",
        Predicate::Sle => "bvsle",
        Predicate::Sgt => "bvsgt",
        Predicate::Sge => "bvsge",
        Predicate::Ult => "bvult",
        Predicate::Ule => "bvule",
        Predicate::Ugt => "bvugt",
        Predicate::Uge => "bvuge",
        _ => return None,
    })
}

fn int_compare_op(pred: Predicate) -> Option<BinaryOp> {
    Some(match pred {
        Predicate::Slt | Predicate::Ult => BinaryOp::Lt,
        Predicate::Sle | Predicate::Ule => BinaryOp::Le,
        Predicate::Sgt | Predicate::Ugt => BinaryOp::Gt,
        Predicate::Sge | Predicate::Uge => BinaryOp::Ge,
        _ => return None,
    })
}

fn fp_builtin(op: BinOp) -> Option<&'static str> {
    Some(match op {
        BinOp::FAdd => "fp.add RNE",
        BinOp::FSub => "fp.sub RNE",
        BinOp::FMul => "fp.mul RNE",
        BinOp::FDiv => "fp.div RNE",
        BinOp::FRem => "fp.rem",
        _ => return None,
    })
}

fn fp_compare_builtin(pred: Predicate) -> Option<&'static str> {
    Some(match pred {
        Predicate::FOeq => "fp.eq",
        Predicate::FOlt => "fp.lt",
        Predicate::FOle => "fp.leq",
        Predicate::FOgt => "fp.gt",
        Predicate::FOge => "fp.geq",
        _ => return None,
    })
}

fn pair(ty: &VilType) -> Vec<Binding> {
    vec![Binding::new("i1", ty.clone()), Binding::new("i2", ty.clone())]
}

/// Numeric encoding policy plus the operator registry
#[derive(Debug, Clone)]
pub struct NumericEncoder {
    ints: IntegerEncoding,
    pointers: IntegerEncoding,
    pointer_width: u32,
    float_builtins: bool,
    ops: BTreeMap<String, FunctionDef>,
}

impl NumericEncoder {
    pub fn new(options: &TranslateOptions, pointer_width: u32) -> Self {
        Self {
            ints: options.integer_encoding(),
            pointers: options.pointer_encoding(),
            pointer_width,
            float_builtins: options.float,
            ops: BTreeMap::new(),
        }
    }

    pub fn integer_encoding(&self) -> IntegerEncoding {
        self.ints
    }

    pub fn pointer_encoding(&self) -> IntegerEncoding {
        self.pointers
    }

    pub fn pointer_width(&self) -> u32 {
        self.pointer_width
    }

    pub fn is_bit_vector(&self) -> bool {
        self.ints == IntegerEncoding::BitVector
    }

    /// Integer type of a width; width 1 is `bool`
    pub fn int_type(&self, width: u32) -> VilType {
        if width == 1 {
            return VilType::Bool;
        }
        match self.ints {
            IntegerEncoding::Idealized => VilType::Int(width),
            IntegerEncoding::BitVector => VilType::BitVector(width),
        }
    }

    /// Integer type that `ref` is a synonym of
    pub fn pointer_repr(&self) -> VilType {
        match self.pointers {
            IntegerEncoding::Idealized => VilType::Int(self.pointer_width),
            IntegerEncoding::BitVector => VilType::BitVector(self.pointer_width),
        }
    }

    /// Encode a source type
    pub fn encode(&self, layout: &dyn DataLayout, ty: &Type) -> Result<VilType> {
        match ty {
            Type::Int(w) => Ok(self.int_type(*w)),
            Type::Float(_) => Ok(VilType::Float),
            Type::Pointer => Ok(VilType::Pointer),
            Type::Array { .. } | Type::Struct(_) => {
                let bytes = layout.size_of(ty)?;
                let bits = byte_width(bytes.max(1)).ok_or_else(|| Error::UnknownLayout { ty: ty.to_string() })?;
                Ok(self.int_type(bits))
            }
            Type::Void | Type::Function | Type::Opaque(_) => Err(Error::UnknownLayout { ty: ty.to_string() }),
        }
    }

    /// Map cell type for a region element
    pub fn element_type(&self, kind: ElementKind) -> VilType {
        match kind {
            ElementKind::Bytes => self.int_type(8),
            ElementKind::Pointer => VilType::Pointer,
            ElementKind::Float => VilType::Float,
            // access widths are checked when sites are collected
            ElementKind::Integer(bytes) => self.int_type(byte_width(bytes).unwrap_or(u32::MAX)),
        }
    }

    /// `[ref]T` map type backing a region
    pub fn region_map_type(&self, region: &Region) -> VilType {
        VilType::map(VilType::Pointer, self.element_type(region.element_kind()))
    }

    /// Integer literal of a width
    pub fn literal(&self, value: i128, width: u32) -> Expr {
        self.literal_of(value, &self.int_type(width))
    }

    /// Literal of an encoded type
    pub fn literal_of(&self, value: i128, ty: &VilType) -> Expr {
        match ty {
            VilType::Bool => Expr::Bool(value & 1 != 0),
            VilType::Int(_) => Expr::Int(value),
            VilType::BitVector(w) => Expr::BitVector {
                value: mask(value, *w),
                width: *w,
            },
            VilType::Pointer => self.pointer_literal(value),
            VilType::Float => Expr::Float {
                bits: (value as f64).to_bits(),
            },
            VilType::Map { .. } => Expr::Int(value),
        }
    }

    /// Pointer literal, always in pointer width
    pub fn pointer_literal(&self, value: i128) -> Expr {
        match self.pointers {
            IntegerEncoding::Idealized => Expr::Int(value),
            IntegerEncoding::BitVector => Expr::BitVector {
                value: mask(value, self.pointer_width),
                width: self.pointer_width,
            },
        }
    }

    pub fn null(&self) -> Expr {
        self.pointer_literal(0)
    }

    /// Signed value of a pointer literal
    pub fn pointer_value(&self, e: &Expr) -> Option<i128> {
        match e {
            Expr::Int(v) => Some(*v),
            Expr::BitVector { value, width } => Some(to_signed(*value, *width)),
            _ => None,
        }
    }

    pub fn float_literal(&self, value: f64) -> Expr {
        Expr::Float { bits: value.to_bits() }
    }

    /// Record a function declaration; the first definition of a name wins
    pub fn declare(&mut self, def: FunctionDef) -> String {
        let name = def.name.clone();
        self.ops.entry(name.clone()).or_insert(def);
        name
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    /// Declarations of every operator used so far, sorted by name
    pub fn declarations(&self) -> Vec<Decl> {
        self.ops.values().cloned().map(Decl::Function).collect()
    }

    fn apply(&mut self, def: FunctionDef, args: Vec<Expr>) -> Expr {
        let name = self.declare(def);
        Expr::apply(name, args)
    }

    fn int_binary_def(&self, op: BinOp, ty: &VilType, repr: &VilType) -> Option<FunctionDef> {
        let name = op_name(op.mnemonic(), &[ty]);
        let inline = |bop| {
            Some(FunctionDef::inline(
                name.clone(),
                pair(ty),
                ty.clone(),
                Expr::binary(bop, Expr::var("i1"), Expr::var("i2")),
            ))
        };
        match repr {
            VilType::Int(_) => match op {
                BinOp::Add => inline(BinaryOp::Add),
                BinOp::Sub => inline(BinaryOp::Sub),
                BinOp::Mul => inline(BinaryOp::Mul),
                BinOp::SDiv | BinOp::UDiv => inline(BinaryOp::Div),
                BinOp::SRem | BinOp::URem => inline(BinaryOp::Mod),
                BinOp::Shl | BinOp::LShr | BinOp::AShr | BinOp::And | BinOp::Or | BinOp::Xor => {
                    Some(FunctionDef::uninterpreted(name.clone(), pair(ty), ty.clone()))
                }
                _ => None,
            },
            VilType::BitVector(_) => {
                bv_builtin(op).map(|b| FunctionDef::builtin(name.clone(), pair(ty), ty.clone(), "bvbuiltin", b))
            }
            _ => None,
        }
    }

    /// Binary operator on operands of type `ty`; `None` when the combination has no encoding
    pub fn binary(&mut self, op: BinOp, ty: &VilType, lhs: Expr, rhs: Expr) -> Option<Expr> {
        match ty {
            VilType::Bool => match op {
                BinOp::And | BinOp::Mul => Some(Expr::binary(BinaryOp::And, lhs, rhs)),
                BinOp::Or => Some(Expr::binary(BinaryOp::Or, lhs, rhs)),
                BinOp::Xor | BinOp::Add | BinOp::Sub => Some(Expr::neq(lhs, rhs)),
                _ => None,
            },
            VilType::Int(_) | VilType::BitVector(_) => {
                let def = self.int_binary_def(op, ty, ty)?;
                Some(self.apply(def, vec![lhs, rhs]))
            }
            VilType::Float => {
                if !op.is_float() {
                    return None;
                }
                let name = op_name(op.mnemonic(), &[ty]);
                let def = match fp_builtin(op) {
                    Some(b) if self.float_builtins => FunctionDef::builtin(name, pair(ty), VilType::Float, "builtin", b),
                    _ => FunctionDef::uninterpreted(name, pair(ty), VilType::Float),
                };
                Some(self.apply(def, vec![lhs, rhs]))
            }
            VilType::Pointer | VilType::Map { .. } => None,
        }
    }

    /// Pointer arithmetic (`$add.ref`, `$sub.ref`, `$mul.ref`)
    pub fn pointer_binary(&mut self, op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        let repr = self.pointer_repr();
        match self.int_binary_def(op, &VilType::Pointer, &repr) {
            Some(def) => self.apply(def, vec![lhs, rhs]),
            None => {
                let name = op_name(op.mnemonic(), &[&VilType::Pointer]);
                let def = FunctionDef::uninterpreted(name, pair(&VilType::Pointer), VilType::Pointer);
                self.apply(def, vec![lhs, rhs])
            }
        }
    }

    /// Float negation
    pub fn float_negate(&mut self, e: Expr) -> Expr {
        let name = op_name("fneg", &[&VilType::Float]);
        let params = vec![Binding::new("f", VilType::Float)];
        let def = if self.float_builtins {
            FunctionDef::builtin(name, params, VilType::Float, "builtin", "fp.neg")
        } else {
            FunctionDef::uninterpreted(name, params, VilType::Float)
        };
        self.apply(def, vec![e])
    }

    /// Comparison of operands of type `ty`, producing `bool`
    pub fn compare(&mut self, pred: Predicate, ty: &VilType, lhs: Expr, rhs: Expr) -> Option<Expr> {
        match pred {
            Predicate::Eq => return Some(Expr::eq(lhs, rhs)),
            Predicate::Ne => return Some(Expr::neq(lhs, rhs)),
            Predicate::FFalse => return Some(Expr::Bool(false)),
            Predicate::FTrue => return Some(Expr::Bool(true)),
            _ => {}
        }
        let name = op_name(pred.mnemonic(), &[ty]);
        if pred.is_float() {
            if *ty != VilType::Float {
                return None;
            }
            let def = match fp_compare_builtin(pred) {
                Some(b) if self.float_builtins => FunctionDef::builtin(name, pair(ty), VilType::Bool, "builtin", b),
                _ => FunctionDef::uninterpreted(name, pair(ty), VilType::Bool),
            };
            return Some(self.apply(def, vec![lhs, rhs]));
        }
        let repr = match ty {
            VilType::Pointer => self.pointer_repr(),
            VilType::Int(_) | VilType::BitVector(_) => ty.clone(),
            _ => return None,
        };
        let def = match repr {
            VilType::Int(_) => FunctionDef::inline(
                name,
                pair(ty),
                VilType::Bool,
                Expr::binary(int_compare_op(pred)?, Expr::var("i1"), Expr::var("i2")),
            ),
            _ => FunctionDef::builtin(name, pair(ty), VilType::Bool, "bvbuiltin", bv_compare_builtin(pred)?),
        };
        Some(self.apply(def, vec![lhs, rhs]))
    }

    fn unary_def(&self, op: &str, from: &VilType, to: &VilType, builtin: Option<(&str, String)>) -> FunctionDef {
        let name = op_name(op, &[from, to]);
        let params = vec![Binding::new("i", from.clone())];
        match builtin {
            Some((attr, b)) => FunctionDef::builtin(name, params, to.clone(), attr, b),
            None => FunctionDef::uninterpreted(name, params, to.clone()),
        }
    }

    /// Value conversion between encoded types; `None` when unsupported
    pub fn convert(&mut self, op: CastOp, from: &VilType, to: &VilType, e: Expr) -> Option<Expr> {
        match op {
            CastOp::PtrToInt => return Some(self.pointer_to_int(e, to)),
            CastOp::IntToPtr => return Some(self.int_to_pointer(e, from)),
            CastOp::FpTrunc | CastOp::FpExt => return Some(e),
            _ => {}
        }
        if from == to {
            return Some(e);
        }
        match (op, from, to) {
            (CastOp::Trunc, VilType::Int(_), VilType::Bool) => Some(Expr::neq(
                Expr::binary(BinaryOp::Mod, e, Expr::Int(2)),
                Expr::Int(0),
            )),
            (CastOp::Trunc, VilType::BitVector(_), VilType::Bool) => Some(Expr::eq(
                Expr::extract(e, 1, 0),
                Expr::BitVector { value: 1, width: 1 },
            )),
            (CastOp::Trunc, VilType::BitVector(a), VilType::BitVector(b)) if b < a => Some(Expr::extract(e, *b, 0)),
            (CastOp::Trunc | CastOp::ZExt | CastOp::SExt, VilType::Int(_), VilType::Int(_)) => Some(e),
            (CastOp::ZExt | CastOp::SExt, VilType::Bool, _) if to.is_integer() => {
                let one = if op == CastOp::SExt { -1 } else { 1 };
                Some(Expr::ite(e, self.literal_of(one, to), self.literal_of(0, to)))
            }
            (CastOp::ZExt | CastOp::SExt, VilType::BitVector(a), VilType::BitVector(b)) if b > a => {
                let (mnemonic, builtin) = if op == CastOp::ZExt {
                    ("zext", "zero_extend")
                } else {
                    ("sext", "sign_extend")
                };
                let def = self.unary_def(mnemonic, from, to, Some(("bvbuiltin", format!("{} {}", builtin, b - a))));
                Some(self.apply(def, vec![e]))
            }
            (CastOp::FpToSi | CastOp::FpToUi, VilType::Float, _) if to.is_integer() || *to == VilType::Bool => {
                let builtin = match (to, self.float_builtins) {
                    (VilType::BitVector(w), true) => {
                        let conv = if op == CastOp::FpToSi { "fp.to_sbv" } else { "fp.to_ubv" };
                        Some(("builtin", format!("(_ {} {}) RTZ", conv, w)))
                    }
                    _ => None,
                };
                let def = self.unary_def(op.mnemonic(), from, to, builtin);
                Some(self.apply(def, vec![e]))
            }
            (CastOp::SiToFp | CastOp::UiToFp, _, VilType::Float) if from.is_integer() || *from == VilType::Bool => {
                let def = self.unary_def(op.mnemonic(), from, to, None);
                Some(self.apply(def, vec![e]))
            }
            (CastOp::BitCast, VilType::Int(_) | VilType::BitVector(_), VilType::Float)
            | (CastOp::BitCast, VilType::Float, VilType::Int(_) | VilType::BitVector(_)) => {
                let def = self.unary_def("bitcast", from, to, None);
                Some(self.apply(def, vec![e]))
            }
            _ => None,
        }
    }

    /// Name of the pointer-to-integer operator for a target type
    pub fn p2i_name(&self, to: &VilType) -> String {
        op_name("p2i", &[&VilType::Pointer, to])
    }

    /// Name of the integer-to-pointer operator for a source type
    pub fn i2p_name(&self, from: &VilType) -> String {
        op_name("i2p", &[from, &VilType::Pointer])
    }

    /// Reinterpret a pointer as an integer of type `to`
    pub fn pointer_to_int(&mut self, e: Expr, to: &VilType) -> Expr {
        if *to == VilType::Bool {
            return Expr::neq(e, self.null());
        }
        let repr = self.pointer_repr();
        let name = self.p2i_name(to);
        let params = vec![Binding::new("p", VilType::Pointer)];
        let def = match (&repr, to) {
            (VilType::Int(_), VilType::Int(_)) => return e,
            (VilType::BitVector(pw), VilType::BitVector(w)) => {
                if w == pw {
                    FunctionDef::inline(name, params, to.clone(), Expr::var("p"))
                } else if w < pw {
                    FunctionDef::inline(name, params, to.clone(), Expr::extract(Expr::var("p"), *w, 0))
                } else {
                    FunctionDef::builtin(name, params, to.clone(), "bvbuiltin", format!("zero_extend {}", w - pw))
                }
            }
            _ => FunctionDef::uninterpreted(name, params, to.clone()),
        };
        self.apply(def, vec![e])
    }

    /// Reinterpret an integer of type `from` as a pointer
    pub fn int_to_pointer(&mut self, e: Expr, from: &VilType) -> Expr {
        if *from == VilType::Bool {
            let one = self.pointer_literal(1);
            return Expr::ite(e, one, self.null());
        }
        let repr = self.pointer_repr();
        let name = self.i2p_name(from);
        let params = vec![Binding::new("i", from.clone())];
        let def = match (&repr, from) {
            (VilType::Int(_), VilType::Int(_)) => return e,
            (VilType::BitVector(pw), VilType::BitVector(w)) => {
                if w == pw {
                    FunctionDef::inline(name, params, VilType::Pointer, Expr::var("i"))
                } else if w > pw {
                    FunctionDef::inline(name, params, VilType::Pointer, Expr::extract(Expr::var("i"), *pw, 0))
                } else {
                    FunctionDef::builtin(name, params, VilType::Pointer, "bvbuiltin", format!("zero_extend {}", pw - w))
                }
            }
            _ => FunctionDef::uninterpreted(name, params, VilType::Pointer),
        };
        self.apply(def, vec![e])
    }
}
