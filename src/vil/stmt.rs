//! VIL statements and blocks

use super::expr::Expr;
use serde::{Deserialize, Serialize};

/// Key/value annotation such as `{:nonzero_divisor}` or `{:bvbuiltin "bvadd"}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: Option<String>,
}

impl Attribute {
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

/// Assignment target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lhs {
    Var(String),
    /// `map[index] := ...`
    MapIndex { map: String, index: Expr },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stmt {
    /// Parallel assignment, `targets.len() == values.len()`
    Assign { targets: Vec<Lhs>, values: Vec<Expr> },
    Assume { expr: Expr, attrs: Vec<Attribute> },
    Assert { expr: Expr, attrs: Vec<Attribute> },
    Havoc(Vec<String>),
    Call {
        returns: Vec<String>,
        procedure: String,
        args: Vec<Expr>,
    },
    Goto(Vec<String>),
    Return,
    Comment(String),
}

impl Stmt {
    pub fn assign(target: impl Into<String>, value: Expr) -> Self {
        Stmt::Assign {
            targets: vec![Lhs::Var(target.into())],
            values: vec![value],
        }
    }

    /// Single map-cell write
    pub fn store(map: impl Into<String>, index: Expr, value: Expr) -> Self {
        Stmt::Assign {
            targets: vec![Lhs::MapIndex {
                map: map.into(),
                index,
            }],
            values: vec![value],
        }
    }

    pub fn assume(expr: Expr) -> Self {
        Stmt::Assume { expr, attrs: vec![] }
    }

    pub fn assert(expr: Expr) -> Self {
        Stmt::Assert { expr, attrs: vec![] }
    }

    pub fn call(returns: Vec<String>, procedure: impl Into<String>, args: Vec<Expr>) -> Self {
        Stmt::Call {
            returns,
            procedure: procedure.into(),
            args,
        }
    }

    pub fn goto(labels: Vec<String>) -> Self {
        Stmt::Goto(labels)
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Stmt::Comment(text.into())
    }

    /// Whether the statement ends a block
    pub fn is_terminator(&self) -> bool {
        matches!(self, Stmt::Goto(_) | Stmt::Return)
    }

    /// Variables written by an assignment or havoc (map writes report the map)
    pub fn written_vars(&self) -> Vec<&str> {
        match self {
            Stmt::Assign { targets, .. } => targets
                .iter()
                .map(|t| match t {
                    Lhs::Var(v) => v.as_str(),
                    Lhs::MapIndex { map, .. } => map.as_str(),
                })
                .collect(),
            Stmt::Havoc(vars) => vars.iter().map(String::as_str).collect(),
            Stmt::Call { returns, .. } => returns.iter().map(String::as_str).collect(),
            _ => vec![],
        }
    }
}

/// Labelled statement sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub label: String,
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn new(label: impl Into<String>, stmts: Vec<Stmt>) -> Self {
        Self {
            label: label.into(),
            stmts,
        }
    }
}
