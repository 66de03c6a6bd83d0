//! Instructions, operands and constants of the SSA input

use super::program::DebugLoc;
use super::types::{FloatKind, StructType, Type};
use serde::{Deserialize, Serialize};

/// Binary arithmetic and bitwise operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

impl BinOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::UDiv => "udiv",
            BinOp::SRem => "srem",
            BinOp::URem => "urem",
            BinOp::Shl => "shl",
            BinOp::LShr => "lshr",
            BinOp::AShr => "ashr",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::FAdd => "fadd",
            BinOp::FSub => "fsub",
            BinOp::FMul => "fmul",
            BinOp::FDiv => "fdiv",
            BinOp::FRem => "frem",
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv | BinOp::FRem
        )
    }

    /// Integer division or remainder, which needs a non-zero divisor
    pub fn is_division(&self) -> bool {
        matches!(self, BinOp::SDiv | BinOp::UDiv | BinOp::SRem | BinOp::URem)
    }
}

/// Comparison predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Predicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
    FFalse,
    FOeq,
    FOgt,
    FOge,
    FOlt,
    FOle,
    FOne,
    FOrd,
    FUno,
    FUeq,
    FUgt,
    FUge,
    FUlt,
    FUle,
    FUne,
    FTrue,
}

impl Predicate {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Predicate::Eq => "eq",
            Predicate::Ne => "ne",
            Predicate::Slt => "slt",
            Predicate::Sle => "sle",
            Predicate::Sgt => "sgt",
            Predicate::Sge => "sge",
            Predicate::Ult => "ult",
            Predicate::Ule => "ule",
            Predicate::Ugt => "ugt",
            Predicate::Uge => "uge",
            Predicate::FFalse => "ffalse",
            Predicate::FOeq => "foeq",
            Predicate::FOgt => "fogt",
            Predicate::FOge => "foge",
            Predicate::FOlt => "folt",
            Predicate::FOle => "fole",
            Predicate::FOne => "fone",
            Predicate::FOrd => "ford",
            Predicate::FUno => "funo",
            Predicate::FUeq => "fueq",
            Predicate::FUgt => "fugt",
            Predicate::FUge => "fuge",
            Predicate::FUlt => "fult",
            Predicate::FUle => "fule",
            Predicate::FUne => "fune",
            Predicate::FTrue => "ftrue",
        }
    }

    pub fn is_float(&self) -> bool {
        !matches!(
            self,
            Predicate::Eq
                | Predicate::Ne
                | Predicate::Slt
                | Predicate::Sle
                | Predicate::Sgt
                | Predicate::Sge
                | Predicate::Ult
                | Predicate::Ule
                | Predicate::Ugt
                | Predicate::Uge
        )
    }
}

/// Conversion operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    FpToUi,
    FpToSi,
    UiToFp,
    SiToFp,
    FpTrunc,
    FpExt,
    PtrToInt,
    IntToPtr,
    BitCast,
}

impl CastOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            CastOp::Trunc => "trunc",
            CastOp::ZExt => "zext",
            CastOp::SExt => "sext",
            CastOp::FpToUi => "fp2ui",
            CastOp::FpToSi => "fp2si",
            CastOp::UiToFp => "ui2fp",
            CastOp::SiToFp => "si2fp",
            CastOp::FpTrunc => "fptrunc",
            CastOp::FpExt => "fpext",
            CastOp::PtrToInt => "p2i",
            CastOp::IntToPtr => "i2p",
            CastOp::BitCast => "bitcast",
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            CastOp::FpToUi
                | CastOp::FpToSi
                | CastOp::UiToFp
                | CastOp::SiToFp
                | CastOp::FpTrunc
                | CastOp::FpExt
        )
    }
}

/// Compile-time constants, including aggregate initializers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Int {
        width: u32,
        value: i128,
    },
    Float {
        kind: FloatKind,
        value: f64,
    },
    Null,
    /// Unspecified value; translated as zero
    Undef(Type),
    /// All-zero value of any type
    Zero(Type),
    Array {
        element: Type,
        elements: Vec<Constant>,
    },
    Struct {
        ty: StructType,
        fields: Vec<Constant>,
    },
    /// Address of a global variable or function
    GlobalRef(String),
    /// Constant element address into a global
    ElementPtr {
        base: String,
        source: Type,
        indices: Vec<i64>,
    },
    /// Constant conversion such as `ptrtoint (ptr @g to i64)`
    Cast {
        op: CastOp,
        value: Box<Constant>,
        to: Type,
    },
}

impl Constant {
    pub fn int(width: u32, value: i128) -> Self {
        Constant::Int { width, value }
    }

    pub fn ty(&self) -> Type {
        match self {
            Constant::Int { width, .. } => Type::Int(*width),
            Constant::Float { kind, .. } => Type::Float(*kind),
            Constant::Null | Constant::GlobalRef(_) | Constant::ElementPtr { .. } => Type::Pointer,
            Constant::Undef(ty) | Constant::Zero(ty) => ty.clone(),
            Constant::Array { element, elements } => Type::array(element.clone(), elements.len() as u64),
            Constant::Struct { ty, .. } => Type::Struct(ty.clone()),
            Constant::Cast { to, .. } => to.clone(),
        }
    }

    /// Whether every byte of the value is zero
    pub fn is_zero(&self) -> bool {
        match self {
            Constant::Int { value, .. } => *value == 0,
            Constant::Float { value, .. } => value.to_bits() == 0,
            Constant::Null | Constant::Undef(_) | Constant::Zero(_) => true,
            Constant::Array { elements, .. } => elements.iter().all(Constant::is_zero),
            Constant::Struct { fields, .. } => fields.iter().all(Constant::is_zero),
            Constant::GlobalRef(_) | Constant::ElementPtr { .. } => false,
            Constant::Cast { value, .. } => value.is_zero(),
        }
    }
}

/// An instruction operand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Function-local SSA value or parameter
    Local { name: String, ty: Type },
    /// Address of a global variable or function
    Global { name: String },
    Const(Constant),
}

impl Value {
    pub fn local(name: impl Into<String>, ty: Type) -> Self {
        Value::Local {
            name: name.into(),
            ty,
        }
    }

    pub fn global(name: impl Into<String>) -> Self {
        Value::Global { name: name.into() }
    }

    pub fn int(width: u32, value: i128) -> Self {
        Value::Const(Constant::int(width, value))
    }

    pub fn null() -> Self {
        Value::Const(Constant::Null)
    }

    pub fn ty(&self) -> Type {
        match self {
            Value::Local { ty, .. } => ty.clone(),
            Value::Global { .. } => Type::Pointer,
            Value::Const(c) => c.ty(),
        }
    }

    /// Integer literal value, if the operand is one
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Const(Constant::Int { value, .. }) => Some(*value),
            _ => None,
        }
    }
}

/// Call target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Callee {
    Direct(String),
    Indirect(Value),
}

/// Instruction payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstKind {
    Binary {
        op: BinOp,
        lhs: Value,
        rhs: Value,
    },
    FNeg(Value),
    Compare {
        predicate: Predicate,
        lhs: Value,
        rhs: Value,
    },
    Cast {
        op: CastOp,
        value: Value,
        to: Type,
    },
    Load {
        ty: Type,
        ptr: Value,
    },
    Store {
        value: Value,
        ptr: Value,
    },
    /// Stack allocation of `count` elements of `ty`
    Alloca {
        ty: Type,
        count: Value,
    },
    /// Address computation: first index scales by `source`, the rest walk into it
    ElementPtr {
        source: Type,
        base: Value,
        indices: Vec<Value>,
    },
    Select {
        cond: Value,
        on_true: Value,
        on_false: Value,
    },
    /// Incoming values keyed by predecessor block label
    Phi {
        ty: Type,
        incoming: Vec<(Value, String)>,
    },
    Call {
        callee: Callee,
        args: Vec<Value>,
        ret: Type,
    },
    MemCpy {
        dst: Value,
        src: Value,
        len: Value,
    },
    MemSet {
        dst: Value,
        byte: Value,
        len: Value,
    },
    /// Any operation the loader does not model
    Other {
        opcode: String,
        ty: Type,
    },
}

/// An instruction with its optional result name and source location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub result: Option<String>,
    pub kind: InstKind,
    pub loc: Option<DebugLoc>,
}

impl Instruction {
    /// Instruction producing a named value
    pub fn assign(result: impl Into<String>, kind: InstKind) -> Self {
        Self {
            result: Some(result.into()),
            kind,
            loc: None,
        }
    }

    /// Instruction without a result
    pub fn effect(kind: InstKind) -> Self {
        Self {
            result: None,
            kind,
            loc: None,
        }
    }

    pub fn at(mut self, loc: DebugLoc) -> Self {
        self.loc = Some(loc);
        self
    }

    /// Type of the produced value
    pub fn result_type(&self) -> Type {
        match &self.kind {
            InstKind::Binary { lhs, .. } => lhs.ty(),
            InstKind::FNeg(v) => v.ty(),
            InstKind::Compare { .. } => Type::i1(),
            InstKind::Cast { to, .. } => to.clone(),
            InstKind::Load { ty, .. } => ty.clone(),
            InstKind::Alloca { .. } | InstKind::ElementPtr { .. } => Type::Pointer,
            InstKind::Select { on_true, .. } => on_true.ty(),
            InstKind::Phi { ty, .. } => ty.clone(),
            InstKind::Call { ret, .. } => ret.clone(),
            InstKind::Other { ty, .. } => ty.clone(),
            InstKind::Store { .. } | InstKind::MemCpy { .. } | InstKind::MemSet { .. } => Type::Void,
        }
    }
}

/// Block terminators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Terminator {
    Ret(Option<Value>),
    Br(String),
    CondBr {
        cond: Value,
        then_dest: String,
        else_dest: String,
    },
    Switch {
        value: Value,
        default: String,
        cases: Vec<(i128, String)>,
    },
    Unreachable,
}

impl Terminator {
    /// Successor labels in branch order
    pub fn successors(&self) -> Vec<&str> {
        match self {
            Terminator::Ret(_) | Terminator::Unreachable => vec![],
            Terminator::Br(dest) => vec![dest.as_str()],
            Terminator::CondBr {
                then_dest,
                else_dest,
                ..
            } => vec![then_dest.as_str(), else_dest.as_str()],
            Terminator::Switch { default, cases, .. } => {
                let mut out: Vec<&str> = cases.iter().map(|(_, l)| l.as_str()).collect();
                out.push(default.as_str());
                out
            }
        }
    }
}
