//! Translation options
//!
//! Options are fixed for a whole translation unit. They can be built in code
//! or loaded from JSON:
//!
//! ```json
//! {
//!   "bit_precise": true,
//!   "memory_safety": true,
//!   "entry_points": ["main"],
//!   "allocators": ["malloc", "xmalloc"],
//!   "warning_level": "imprecise"
//! }
//! ```
//!
//! Every field has a default, so `{}` is a valid configuration.

use crate::warnings::{Flag, FlagSet, WarningLevel};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Encoding of machine integers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntegerEncoding {
    /// Unbounded integers; overflow is not modeled
    Idealized,
    /// Fixed-width bit-vectors with modular arithmetic
    BitVector,
}

/// Treatment of divisors that are not known to be non-zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DivisionPolicy {
    /// `assume d != 0` before the division
    #[default]
    Assume,
    /// `assert d != 0`, a verification obligation
    Assert,
}

fn default_true() -> bool {
    true
}

fn default_max_unroll() -> u64 {
    64
}

fn default_entry_points() -> Vec<String> {
    vec!["main".to_string()]
}

fn default_allocators() -> Vec<String> {
    vec!["malloc".to_string()]
}

fn default_deallocators() -> Vec<String> {
    vec!["free".to_string()]
}

fn default_warning_level() -> WarningLevel {
    WarningLevel::Imprecise
}

/// Translation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslateOptions {
    /// Shorthand for `integer_encoding = bit-vector`
    #[serde(default)]
    pub bit_precise: bool,

    /// Explicit integer encoding
    #[serde(default)]
    pub integer_encoding: Option<IntegerEncoding>,

    /// Encode pointers as bit-vectors
    #[serde(default)]
    pub bit_precise_pointers: bool,

    /// Use SMT floating point builtins
    #[serde(default)]
    pub float: bool,

    /// Check stores to external memory instead of assuming them away
    #[serde(default)]
    pub memory_safety: bool,

    /// Split memory into alias-oracle regions; `false` uses a single region
    #[serde(default = "default_true")]
    pub memory_splitting: bool,

    /// Largest number of element writes a constant block copy or fill is unrolled into
    #[serde(default = "default_max_unroll")]
    pub max_unroll: u64,

    #[serde(default)]
    pub division: DivisionPolicy,

    /// Procedures that run the static initializers first
    #[serde(default = "default_entry_points")]
    pub entry_points: Vec<String>,

    /// External functions that return fresh heap memory of the size given by their one argument
    #[serde(default = "default_allocators")]
    pub allocators: Vec<String>,

    /// External functions that release heap memory
    #[serde(default = "default_deallocators")]
    pub deallocators: Vec<String>,

    #[serde(default = "default_warning_level")]
    pub warning_level: WarningLevel,

    #[serde(default)]
    pub colored_warnings: bool,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            bit_precise: false,
            integer_encoding: None,
            bit_precise_pointers: false,
            float: false,
            memory_safety: false,
            memory_splitting: true,
            max_unroll: default_max_unroll(),
            division: DivisionPolicy::default(),
            entry_points: default_entry_points(),
            allocators: default_allocators(),
            deallocators: default_deallocators(),
            warning_level: default_warning_level(),
            colored_warnings: false,
        }
    }
}

impl TranslateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sound configuration: bit-vector integers and pointers
    pub fn bit_precise() -> Self {
        Self {
            bit_precise: true,
            bit_precise_pointers: true,
            ..Self::default()
        }
    }

    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Reject inconsistent combinations before anything is translated
    pub fn validate(&self) -> Result<()> {
        if self.bit_precise && self.integer_encoding == Some(IntegerEncoding::Idealized) {
            return Err(Error::ConfigConflict(
                "bit_precise requires the bit-vector integer encoding, but idealized was requested".into(),
            ));
        }
        if self.float && self.integer_encoding() != IntegerEncoding::BitVector {
            return Err(Error::ConfigConflict(
                "float builtins reinterpret bits and need the bit-vector integer encoding".into(),
            ));
        }
        if let Some(both) = self.allocators.iter().find(|a| self.is_deallocator(a)) {
            return Err(Error::ConfigConflict(format!(
                "{} is listed as both an allocator and a deallocator",
                both
            )));
        }
        if self.entry_points.is_empty() {
            return Err(Error::ConfigConflict("no entry points given".into()));
        }
        if let Some(dup) = self
            .entry_points
            .iter()
            .enumerate()
            .find(|(i, e)| self.entry_points[..*i].contains(e))
            .map(|(_, e)| e)
        {
            return Err(Error::ConfigConflict(format!("entry point {} listed twice", dup)));
        }
        Ok(())
    }

    /// Resolved integer encoding
    pub fn integer_encoding(&self) -> IntegerEncoding {
        match (self.bit_precise, self.integer_encoding) {
            (true, _) => IntegerEncoding::BitVector,
            (false, Some(enc)) => enc,
            (false, None) => IntegerEncoding::Idealized,
        }
    }

    pub fn pointer_encoding(&self) -> IntegerEncoding {
        if self.bit_precise_pointers {
            IntegerEncoding::BitVector
        } else {
            IntegerEncoding::Idealized
        }
    }

    /// Flags consulted by the reporter
    pub fn flags(&self) -> FlagSet {
        let mut flags = FlagSet::new();
        if self.integer_encoding() == IntegerEncoding::BitVector {
            flags.insert(Flag::BitPrecise);
        }
        if self.bit_precise_pointers {
            flags.insert(Flag::BitPrecisePointers);
        }
        if self.float {
            flags.insert(Flag::Float);
        }
        if self.memory_safety {
            flags.insert(Flag::MemorySafety);
        }
        flags
    }

    pub fn is_entry_point(&self, name: &str) -> bool {
        self.entry_points.iter().any(|e| e == name)
    }

    pub fn is_allocator(&self, name: &str) -> bool {
        self.allocators.iter().any(|a| a == name)
    }

    pub fn is_deallocator(&self, name: &str) -> bool {
        self.deallocators.iter().any(|d| d == name)
    }
}
