//! # ssa2vil - SSA to verification language translation
//!
//! Translates a typed SSA program (functions of basic blocks, globals with
//! constant initializers) into a program in a simply-typed verification
//! intermediate language (VIL) of typed maps, guarded statements and pure
//! expressions, ready to be printed for an automated prover.
//!
//! ## Quick Start
//!
//! ```rust
//! use ssa2vil::ir::{BasicBlock, Function, InstKind, Instruction, Module, Param, Terminator, Type, Value};
//! use ssa2vil::translate::{AliasClasses, TranslateOptions, Translator};
//! use ssa2vil::warnings::MemorySink;
//!
//! # fn main() -> ssa2vil::Result<()> {
//! // void set(int *p) { *p = 7; }
//! let mut module = Module::new("demo");
//! module.functions.push(Function {
//!     name: "set".into(),
//!     params: vec![Param::new("p", Type::Pointer)],
//!     ret: Type::Void,
//!     blocks: vec![BasicBlock::new(
//!         "entry",
//!         vec![Instruction::effect(InstKind::Store {
//!             value: Value::int(32, 7),
//!             ptr: Value::local("p", Type::Pointer),
//!         })],
//!         Terminator::Ret(None),
//!     )],
//! });
//!
//! let oracle = AliasClasses::new().add("set::p");
//! let translation = Translator::new(TranslateOptions::bit_precise(), Box::new(oracle))
//!     .with_sink(Box::new(MemorySink::new()))
//!     .translate(&module)?;
//!
//! assert_eq!(translation.regions.len(), 1);
//! assert_eq!(translation.modifies["set"], vec!["$M.0".to_string()]);
//! assert_eq!(translation.warnings, 0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Module → collect regions → lay out symbols → lower functions → Program + modifies sets
//! ```
//!
//! ### Main Components
//!
//! - [`ir`] - The SSA input and the [`DataLayout`](ir::DataLayout) provider
//! - [`vil`] - The generated program tree
//! - [`translate`] - Region model, numeric encoder, address engine and the
//!   instruction translator, driven by [`Translator`]
//! - [`warnings`] - Precision diagnostics
//!
//! ## Precision
//!
//! Translation never silently drops semantics. Whenever an operation is
//! over-approximated because a precision flag is off, a comment is placed in
//! the generated block and a line is written to the diagnostic sink naming
//! the flag that would remove the approximation:
//!
//! ```text
//! ssa2vil: a.c:4:9: warning: over-approximating mul; try adding all the flag(s) in: { --integer-encoding=bit-vector }
//! ```
//!
//! Structural problems (unknown layouts, missing regions, malformed
//! initializers) and inconsistent options are fatal [`Error`]s.

#![allow(clippy::too_many_arguments)]

/// Version of the translator
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod error;
pub mod ir;
pub mod translate;
pub mod vil;
pub mod warnings;

// Re-export main types
pub use error::{Error, ErrorKind, Result};
pub use translate::{TranslateOptions, Translation, Translator};
pub use vil::Program;
pub use warnings::{Flag, FlagRelation, Reporter, WarningLevel};
