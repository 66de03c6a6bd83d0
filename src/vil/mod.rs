//! Verification intermediate language (VIL) abstract syntax
//!
//! The translator's output: a simply-typed program of declarations, typed
//! maps, guarded statements and side-effect-free expressions. Printing the
//! concrete syntax is left to the consumer; the tree is `serde`-serializable
//! so it can be handed across process boundaries as JSON.
//!
//! # Node kinds
//!
//! | Node | Type | Notes |
//! |------|------|-------|
//! | declaration | [`Decl`] | ordered; maps are declared before use |
//! | statement | [`Stmt`] | sequential within a [`Block`] |
//! | expression | [`Expr`] | pure trees, no sharing across programs |

pub mod expr;
pub mod program;
pub mod stmt;
pub mod types;

pub use expr::{BinaryOp, Binding, Expr, UnaryOp};
pub use program::{Decl, FunctionDef, ProcDecl, Program};
pub use stmt::{Attribute, Block, Lhs, Stmt};
pub use types::VilType;
