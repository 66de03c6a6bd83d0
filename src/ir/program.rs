//! Functions, globals and the translation unit

use super::instruction::{Constant, Instruction, Terminator};
use super::types::Type;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location attached to an instruction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DebugLoc {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl DebugLoc {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for DebugLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A labelled straight-line sequence ending in a terminator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>, instructions: Vec<Instruction>, terminator: Terminator) -> Self {
        Self {
            label: label.into(),
            instructions,
            terminator,
        }
    }
}

/// Formal parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A function with a body. The first block is the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Type,
    pub blocks: Vec<BasicBlock>,
}

/// A function declared but not defined in this unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
    pub variadic: bool,
}

/// Global variable. Globals without an initializer are external.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub name: String,
    pub ty: Type,
    pub initializer: Option<Constant>,
    pub constant: bool,
}

impl GlobalVariable {
    pub fn is_external(&self) -> bool {
        self.initializer.is_none()
    }
}

/// Callee signature resolved from a module
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<Type>,
    pub ret: Type,
    pub external: bool,
    pub variadic: bool,
}

/// A translation unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub globals: Vec<GlobalVariable>,
    pub functions: Vec<Function>,
    pub declarations: Vec<FunctionDecl>,
    /// Static constructors, run in order before any entry point
    pub init_functions: Vec<String>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn declaration(&self, name: &str) -> Option<&FunctionDecl> {
        self.declarations.iter().find(|d| d.name == name)
    }

    pub fn global(&self, name: &str) -> Option<&GlobalVariable> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// Resolve a callee, preferring a definition over a declaration
    pub fn signature(&self, name: &str) -> Option<Signature> {
        if let Some(f) = self.function(name) {
            return Some(Signature {
                params: f.params.iter().map(|p| p.ty.clone()).collect(),
                ret: f.ret.clone(),
                external: false,
                variadic: false,
            });
        }
        self.declaration(name).map(|d| Signature {
            params: d.params.clone(),
            ret: d.ret.clone(),
            external: true,
            variadic: d.variadic,
        })
    }
}
