//! Side-effect-free VIL expressions

use super::types::VilType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    And,
    Or,
    Implies,
    Iff,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    /// Concrete operator symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Implies => "==>",
            BinaryOp::Iff => "<==>",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
        }
    }
}

/// A typed bound variable of a quantifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    pub ty: VilType,
}

impl Binding {
    pub fn new(name: impl Into<String>, ty: VilType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Expression tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    Bool(bool),
    Int(i128),
    BitVector {
        value: u128,
        width: u32,
    },
    /// Float literal carried as raw IEEE double bits
    Float {
        bits: u64,
    },
    Var(String),
    Old(Box<Expr>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Apply {
        function: String,
        args: Vec<Expr>,
    },
    Select {
        map: Box<Expr>,
        index: Box<Expr>,
    },
    Update {
        map: Box<Expr>,
        index: Box<Expr>,
        value: Box<Expr>,
    },
    Ite {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// Bits `[lo, hi)` of a bit-vector
    Extract {
        expr: Box<Expr>,
        hi: u32,
        lo: u32,
    },
    /// `hi ++ lo`
    Concat {
        hi: Box<Expr>,
        lo: Box<Expr>,
    },
    Forall {
        vars: Vec<Binding>,
        body: Box<Expr>,
    },
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn apply(function: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Apply {
            function: function.into(),
            args,
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn not(expr: Expr) -> Self {
        match expr {
            Expr::Bool(b) => Expr::Bool(!b),
            other => Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(other),
            },
        }
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Eq, lhs, rhs)
    }

    pub fn neq(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Neq, lhs, rhs)
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        match (lhs, rhs) {
            (Expr::Bool(true), e) | (e, Expr::Bool(true)) => e,
            (l, r) => Self::binary(BinaryOp::And, l, r),
        }
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Self {
        match (lhs, rhs) {
            (Expr::Bool(false), e) | (e, Expr::Bool(false)) => e,
            (l, r) => Self::binary(BinaryOp::Or, l, r),
        }
    }

    pub fn implies(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Implies, lhs, rhs)
    }

    /// Conjunction of a sequence; `true` when empty
    pub fn conjunction(exprs: impl IntoIterator<Item = Expr>) -> Self {
        exprs.into_iter().fold(Expr::Bool(true), Expr::and)
    }

    pub fn select(map: Expr, index: Expr) -> Self {
        Expr::Select {
            map: Box::new(map),
            index: Box::new(index),
        }
    }

    pub fn update(map: Expr, index: Expr, value: Expr) -> Self {
        Expr::Update {
            map: Box::new(map),
            index: Box::new(index),
            value: Box::new(value),
        }
    }

    pub fn ite(cond: Expr, then_expr: Expr, else_expr: Expr) -> Self {
        Expr::Ite {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        }
    }

    pub fn extract(expr: Expr, hi: u32, lo: u32) -> Self {
        Expr::Extract {
            expr: Box::new(expr),
            hi,
            lo,
        }
    }

    pub fn concat(hi: Expr, lo: Expr) -> Self {
        Expr::Concat {
            hi: Box::new(hi),
            lo: Box::new(lo),
        }
    }

    pub fn old(expr: Expr) -> Self {
        Expr::Old(Box::new(expr))
    }

    pub fn forall(vars: Vec<Binding>, body: Expr) -> Self {
        Expr::Forall {
            vars,
            body: Box::new(body),
        }
    }

    /// Literal integer value of an `Int` or `BitVector` node (bit-vectors read unsigned)
    pub fn as_literal(&self) -> Option<i128> {
        match self {
            Expr::Int(v) => Some(*v),
            Expr::BitVector { value, .. } => i128::try_from(*value).ok(),
            _ => None,
        }
    }

    /// Name of the applied function, if this is an application
    pub fn applied(&self) -> Option<(&str, &[Expr])> {
        match self {
            Expr::Apply { function, args } => Some((function.as_str(), args.as_slice())),
            _ => None,
        }
    }

    /// Number of nodes in the tree
    pub fn size(&self) -> usize {
        1 + match self {
            Expr::Bool(_)
            | Expr::Int(_)
            | Expr::BitVector { .. }
            | Expr::Float { .. }
            | Expr::Var(_) => 0,
            Expr::Old(e) | Expr::Unary { expr: e, .. } | Expr::Extract { expr: e, .. } => e.size(),
            Expr::Binary { lhs, rhs, .. } | Expr::Concat { hi: lhs, lo: rhs } => lhs.size() + rhs.size(),
            Expr::Apply { args, .. } => args.iter().map(Expr::size).sum(),
            Expr::Select { map, index } => map.size() + index.size(),
            Expr::Update { map, index, value } => map.size() + index.size() + value.size(),
            Expr::Ite {
                cond,
                then_expr,
                else_expr,
            } => cond.size() + then_expr.size() + else_expr.size(),
            Expr::Forall { body, .. } => body.size(),
        }
    }
}
