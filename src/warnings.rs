//! Soundness and precision reporter
//!
//! Whenever the translator picks an over-approximating encoding it asks the
//! [`Reporter`] whether the configuration flags that would make the encoding
//! precise are set. If they are not, the reporter
//!
//! 1. inserts a comment statement into the current block, carrying the source
//!    location when one is known, and
//! 2. writes a line to the [`DiagnosticSink`] naming the flags that would
//!    remove the over-approximation.
//!
//! # Flag relations
//!
//! | Relation | Fires when |
//! |----------|------------|
//! | `And` | at least one required flag is unset |
//! | `Or` | every required flag is unset |
//!
//! Messages below the configured [`WarningLevel`] are suppressed entirely.
//! Repeated calls fire repeatedly: each call site carries its own location.

use crate::ir::DebugLoc;
use crate::vil::Stmt;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use tracing::debug;

/// Prefix of every console line and generated comment
pub const TOOL_PREFIX: &str = "ssa2vil";

const MAGENTA: &str = "\x1b[1;35m";
const RESET: &str = "\x1b[0m";

/// Configuration switch whose absence forces an over-approximation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Flag {
    /// Bit-vector integer encoding
    BitPrecise,
    /// Bit-vector pointer encoding
    BitPrecisePointers,
    /// SMT floating point semantics
    Float,
    /// Memory-safety checking
    MemorySafety,
}

impl Flag {
    /// Command-line spelling shown in hints
    pub fn option_name(&self) -> &'static str {
        match self {
            Flag::BitPrecise => "--integer-encoding=bit-vector",
            Flag::BitPrecisePointers => "--bit-precise-pointers",
            Flag::Float => "--float",
            Flag::MemorySafety => "--memory-safety",
        }
    }
}

/// The set of flags that are switched on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet {
    set: BTreeSet<Flag>,
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, flag: Flag) -> Self {
        self.set.insert(flag);
        self
    }

    pub fn insert(&mut self, flag: Flag) {
        self.set.insert(flag);
    }

    pub fn is_set(&self, flag: Flag) -> bool {
        self.set.contains(&flag)
    }
}

/// How a list of required flags combines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagRelation {
    /// Every flag is needed
    And,
    /// Any one flag is enough
    Or,
}

/// Verbosity threshold; a message is shown when the configured level is at least its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningLevel {
    Silent,
    Info,
    Imprecise,
}

/// Destination of diagnostic lines
pub trait DiagnosticSink {
    fn write_line(&mut self, line: &str);
}

/// Writes each line to standard error immediately
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn write_line(&mut self, line: &str) {
        eprintln!("{}", line);
    }
}

/// Collects lines in memory; clones share the same buffer
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Rc<RefCell<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.lines.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.borrow().is_empty()
    }

    /// Lines containing `needle`
    pub fn count_matching(&self, needle: &str) -> usize {
        self.lines.borrow().iter().filter(|l| l.contains(needle)).count()
    }
}

impl DiagnosticSink for MemorySink {
    fn write_line(&mut self, line: &str) {
        self.lines.borrow_mut().push(line.to_string());
    }
}

/// Emits precision diagnostics
pub struct Reporter {
    flags: FlagSet,
    level: WarningLevel,
    colored: bool,
    sink: Box<dyn DiagnosticSink>,
    fired: usize,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("flags", &self.flags)
            .field("level", &self.level)
            .field("colored", &self.colored)
            .field("fired", &self.fired)
            .finish()
    }
}

impl Reporter {
    pub fn new(flags: FlagSet, level: WarningLevel, colored: bool, sink: Box<dyn DiagnosticSink>) -> Self {
        Self {
            flags,
            level,
            colored,
            sink,
            fired: 0,
        }
    }

    /// Number of warnings that passed the level gate so far
    pub fn fired(&self) -> usize {
        self.fired
    }

    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    pub fn is_sufficient_level(&self, level: WarningLevel) -> bool {
        self.level >= level
    }

    /// Required flags that are not set, in the given order
    pub fn unset_flags(&self, required: &[Flag]) -> Vec<Flag> {
        required.iter().copied().filter(|f| !self.flags.is_set(*f)).collect()
    }

    pub fn is_satisfied(&self, required: &[Flag], relation: FlagRelation) -> bool {
        let unset = self.unset_flags(required);
        match relation {
            FlagRelation::And => unset.is_empty(),
            FlagRelation::Or => unset.len() < required.len(),
        }
    }

    /// Report an operation that has no model at all
    pub fn warn_unmodeled(&mut self, name: &str, block: Option<&mut Vec<Stmt>>, loc: Option<&DebugLoc>) {
        self.warn_imprecise(&format!("unmodeled operation {}", name), "", &[], block, loc, FlagRelation::And);
    }

    /// Report `name` as over-approximated unless `required` is satisfied; returns whether it fired
    pub fn warn_if_incomplete(
        &mut self,
        name: &str,
        required: &[Flag],
        block: Option<&mut Vec<Stmt>>,
        loc: Option<&DebugLoc>,
        relation: FlagRelation,
    ) -> bool {
        if self.is_satisfied(required, relation) {
            return false;
        }
        let unset = self.unset_flags(required);
        self.warn_imprecise(name, "over-approximating", &unset, block, loc, relation)
    }

    /// Emit an imprecision warning; returns whether it passed the level gate
    pub fn warn_imprecise(
        &mut self,
        name: &str,
        description: &str,
        unset: &[Flag],
        block: Option<&mut Vec<Stmt>>,
        loc: Option<&DebugLoc>,
        relation: FlagRelation,
    ) -> bool {
        if !self.is_sufficient_level(WarningLevel::Imprecise) {
            return false;
        }
        let beginning = match loc {
            Some(loc) => format!("{}: {}: ", TOOL_PREFIX, loc),
            None => format!("{}: ", TOOL_PREFIX),
        };
        let end = if description.is_empty() {
            format!("{};", name)
        } else {
            format!("{} {};", description, name)
        };
        if let Some(block) = block {
            block.push(Stmt::comment(format!("{}warning: {}", beginning, end)));
        }
        let hint = if unset.is_empty() {
            String::new()
        } else {
            let quantifier = match relation {
                FlagRelation::And => "all the ",
                FlagRelation::Or => "any ",
            };
            let names: Vec<&str> = unset.iter().map(Flag::option_name).collect();
            format!(" try adding {}flag(s) in: {{ {} }}", quantifier, names.join(" "))
        };
        debug!(name, flags = ?unset, "precision warning");
        let line = format!("{}{}{}", beginning, self.paint("warning: "), end) + &hint;
        self.sink.write_line(&line);
        self.fired += 1;
        true
    }

    /// Informational message, shown at level `Info` and above
    pub fn warn_info(&mut self, info: &str) {
        if !self.is_sufficient_level(WarningLevel::Info) {
            return;
        }
        let line = format!("{}{}", self.paint("warning: "), info);
        self.sink.write_line(&line);
    }

    fn paint(&self, text: &str) -> String {
        if self.colored {
            format!("{}{}{}", MAGENTA, text, RESET)
        } else {
            text.to_string()
        }
    }
}
