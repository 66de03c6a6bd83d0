//! Declarations and the generated program

use super::expr::{Binding, Expr};
use super::stmt::{Attribute, Block, Stmt};
use super::types::VilType;
use serde::{Deserialize, Serialize};

/// Function declaration; `body == None` means uninterpreted or builtin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Binding>,
    pub ret: VilType,
    pub body: Option<Expr>,
    pub attrs: Vec<Attribute>,
}

impl FunctionDef {
    /// Function without a body
    pub fn uninterpreted(name: impl Into<String>, params: Vec<Binding>, ret: VilType) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
            body: None,
            attrs: vec![],
        }
    }

    /// Function defined by an inline expression
    pub fn inline(name: impl Into<String>, params: Vec<Binding>, ret: VilType, body: Expr) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
            body: Some(body),
            attrs: vec![Attribute::flag("inline")],
        }
    }

    /// Function mapped onto a solver builtin under the given attribute (`bvbuiltin`, `builtin`)
    pub fn builtin(
        name: impl Into<String>,
        params: Vec<Binding>,
        ret: VilType,
        attr: &str,
        builtin: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
            body: None,
            attrs: vec![Attribute::with_value(attr, builtin)],
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.attrs
            .iter()
            .any(|a| a.name == "bvbuiltin" || a.name == "builtin")
    }
}

/// Procedure; an empty block list makes it a body-less declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcDecl {
    pub name: String,
    pub params: Vec<Binding>,
    pub returns: Vec<Binding>,
    pub locals: Vec<Binding>,
    pub requires: Vec<Expr>,
    pub ensures: Vec<Expr>,
    /// Region maps the procedure may write
    pub modifies: Vec<String>,
    pub blocks: Vec<Block>,
    pub attrs: Vec<Attribute>,
}

impl ProcDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: vec![],
            returns: vec![],
            locals: vec![],
            requires: vec![],
            ensures: vec![],
            modifies: vec![],
            blocks: vec![],
            attrs: vec![],
        }
    }

    pub fn has_body(&self) -> bool {
        !self.blocks.is_empty()
    }

    /// All statements in block order
    pub fn stmts(&self) -> impl Iterator<Item = &Stmt> {
        self.blocks.iter().flat_map(|b| b.stmts.iter())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|a| a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decl {
    /// `type name;` or `type name = ty;`
    Type { name: String, synonym: Option<VilType> },
    Const { name: String, ty: VilType, unique: bool },
    Axiom(Expr),
    Var(Binding),
    Function(FunctionDef),
    Procedure(ProcDecl),
    Comment(String),
}

/// The generated program, an ordered declaration sequence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub decls: Vec<Decl>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, decl: Decl) {
        self.decls.push(decl);
    }

    pub fn procedures(&self) -> impl Iterator<Item = &ProcDecl> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Procedure(p) => Some(p),
            _ => None,
        })
    }

    pub fn procedure(&self, name: &str) -> Option<&ProcDecl> {
        self.procedures().find(|p| p.name == name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions().find(|f| f.name == name)
    }

    /// Global variables, in declaration order
    pub fn vars(&self) -> impl Iterator<Item = &Binding> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Var(b) => Some(b),
            _ => None,
        })
    }

    pub fn axioms(&self) -> impl Iterator<Item = &Expr> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Axiom(e) => Some(e),
            _ => None,
        })
    }

    /// Serialize for external printers and golden tests
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
