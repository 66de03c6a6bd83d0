//! SSA input representation
//!
//! A typed, block-structured program: the read-only input of the translator.
//!
//! ```text
//! Module
//!  ├── globals       (name, type, optional constant initializer)
//!  ├── functions     (params, blocks of instructions, terminators)
//!  ├── declarations  (external functions)
//!  └── init_functions
//! ```
//!
//! Sizes and offsets are answered by a [`DataLayout`], never by the types
//! themselves.

pub mod instruction;
pub mod layout;
pub mod program;
pub mod types;

pub use instruction::{BinOp, Callee, CastOp, Constant, InstKind, Instruction, Predicate, Terminator, Value};
pub use layout::{round_up, DataLayout, TargetLayout};
pub use program::{BasicBlock, DebugLoc, Function, FunctionDecl, GlobalVariable, Module, Param, Signature};
pub use types::{FloatKind, StructType, Type};
