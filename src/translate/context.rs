//! Translation-unit context
//!
//! All state shared by the components of one translation lives here and is
//! passed by `&mut` to whoever needs it:
//!
//! - the region table,
//! - the address-space sentinels,
//! - the memo table of synthesized block-operation helpers,
//! - declarations accumulated for the final program.
//!
//! # Address space
//!
//! ```text
//!   extern limit        externs start        0          stack base        heap base
//!  ----|-------------------|-------------------|-----------|-------------------|---->
//!      <- externs_bottom   <- globals_bottom                $CurrAddr ->        $HeapAddr ->
//! ```
//!
//! Globals and functions defined in the unit are carved downward from zero
//! and external symbols downward from the externs start, both at translation
//! time. Stack and heap objects are carved at run time by the allocation
//! procedures of [`alloc`](super::alloc), which bump the `$CurrAddr` and
//! `$HeapAddr` counters upward from the stack and heap bases.

use super::encoder::NumericEncoder;
use super::naming::Naming;
use super::options::TranslateOptions;
use super::region::{RegionId, RegionModel};
use super::address::AddressEngine;
use crate::ir::{DataLayout, DebugLoc, Module, Predicate};
use crate::vil::{Binding, Expr, FunctionDef, ProcDecl, Stmt, VilType};
use crate::warnings::{Flag, FlagRelation, Reporter};
use crate::{Error, Result};
use std::collections::BTreeMap;

pub const GLOBALS_BOTTOM: &str = "$GLOBALS_BOTTOM";
pub const EXTERNS_BOTTOM: &str = "$EXTERNS_BOTTOM";
pub const STACK_BASE: &str = "$STACK_BASE";
pub const HEAP_BASE: &str = "$HEAP_BASE";
pub const IS_EXTERNAL: &str = "$isExternal";
pub const STATIC_INIT: &str = "$static_init";
pub const INIT_FUNCS: &str = "$init_funcs";
pub const RETURN_VAR: &str = "$r";
pub const STACK_TOP: &str = "$CurrAddr";
pub const HEAP_TOP: &str = "$HeapAddr";

fn align_down(value: i128, align: u64) -> i128 {
    let align = i128::from(align.max(1));
    value.div_euclid(align) * align
}

/// Monotonic counters carving disjoint address ranges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinels {
    pointer_width: u32,
    globals_bottom: i128,
    externs_bottom: i128,
}

impl Sentinels {
    pub fn new(pointer_width: u32) -> Self {
        let mut s = Self {
            pointer_width,
            globals_bottom: 0,
            externs_bottom: 0,
        };
        s.externs_bottom = s.externs_start();
        s
    }

    /// Upper end of the external-symbol range
    pub fn externs_start(&self) -> i128 {
        -(1i128 << (self.pointer_width - 8))
    }

    /// Lowest address the external range may reach
    pub fn extern_limit(&self) -> i128 {
        -(1i128 << (self.pointer_width - 1))
    }

    pub fn stack_base(&self) -> i128 {
        1 << 12
    }

    pub fn heap_base(&self) -> i128 {
        1i128 << (self.pointer_width - 2)
    }

    pub fn globals_bottom(&self) -> i128 {
        self.globals_bottom
    }

    pub fn externs_bottom(&self) -> i128 {
        self.externs_bottom
    }

    /// Bytes between the stack base and the heap base
    pub fn stack_capacity(&self) -> i128 {
        self.heap_base() - self.stack_base()
    }

    /// Address for a global or function defined in the unit
    pub fn allocate_global(&mut self, size: u64, align: u64) -> Result<i128> {
        let bottom = align_down(self.globals_bottom - i128::from(size.max(1)), align);
        if bottom <= self.externs_start() {
            return Err(Error::AddressSpaceExhausted {
                range: "globals",
                limit: self.externs_start(),
            });
        }
        self.globals_bottom = bottom;
        Ok(bottom)
    }

    /// Address for a symbol owned outside the unit
    pub fn allocate_extern(&mut self, size: u64) -> Result<i128> {
        let bottom = align_down(self.externs_bottom - i128::from(size.max(1)), 8);
        if bottom < self.extern_limit() {
            return Err(Error::AddressSpaceExhausted {
                range: "externs",
                limit: self.extern_limit(),
            });
        }
        self.externs_bottom = bottom;
        Ok(bottom)
    }
}

/// Memo key of a synthesized helper procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HelperKey {
    Copy { dst: RegionId, src: RegionId },
    Fill { dst: RegionId },
    Alloc,
    Malloc,
    Free,
}

impl HelperKey {
    /// Deterministic procedure name
    pub fn name(&self) -> String {
        match self {
            HelperKey::Copy { dst, src } => format!("$memcpy.{}.{}", dst, src),
            HelperKey::Fill { dst } => format!("$memset.{}", dst),
            HelperKey::Alloc => "$alloc".to_string(),
            HelperKey::Malloc => "$malloc".to_string(),
            HelperKey::Free => "$free".to_string(),
        }
    }
}

/// State of one translation unit
pub struct UnitContext<'a> {
    pub options: &'a TranslateOptions,
    pub layout: &'a dyn DataLayout,
    pub naming: &'a dyn Naming,
    pub module: &'a Module,
    pub regions: RegionModel,
    pub encoder: NumericEncoder,
    pub address: AddressEngine,
    pub reporter: Reporter,
    pub sentinels: Sentinels,
    /// Statements of the static-initialization procedure, in order
    pub static_init: Vec<Stmt>,
    helpers: BTreeMap<HelperKey, String>,
    helper_procs: Vec<ProcDecl>,
    externals: BTreeMap<String, ProcDecl>,
    float_warned: bool,
}

impl<'a> UnitContext<'a> {
    pub fn new(
        options: &'a TranslateOptions,
        layout: &'a dyn DataLayout,
        naming: &'a dyn Naming,
        module: &'a Module,
        regions: RegionModel,
        reporter: Reporter,
    ) -> Self {
        let pointer_width = layout.pointer_width();
        Self {
            options,
            layout,
            naming,
            module,
            regions,
            encoder: NumericEncoder::new(options, pointer_width),
            address: AddressEngine::new(),
            reporter,
            sentinels: Sentinels::new(pointer_width),
            static_init: vec![],
            helpers: BTreeMap::new(),
            helper_procs: vec![],
            externals: BTreeMap::new(),
            float_warned: false,
        }
    }

    /// Name of the helper for `key`, building it on first request
    pub fn helper(&mut self, key: HelperKey, build: impl FnOnce(&mut Self, &str) -> ProcDecl) -> String {
        if let Some(name) = self.helpers.get(&key) {
            return name.clone();
        }
        let name = key.name();
        let proc = build(self, &name);
        tracing::debug!(helper = %name, "synthesized helper procedure");
        self.helper_procs.push(proc);
        self.helpers.insert(key, name.clone());
        name
    }

    pub fn helper_procs(&self) -> &[ProcDecl] {
        &self.helper_procs
    }

    /// Allocation counters in use, each with the base it starts from
    pub fn allocation_counters(&self) -> Vec<(&'static str, &'static str)> {
        let mut counters = vec![];
        if self.helpers.contains_key(&HelperKey::Alloc) {
            counters.push((STACK_TOP, STACK_BASE));
        }
        if self.helpers.contains_key(&HelperKey::Malloc) {
            counters.push((HEAP_TOP, HEAP_BASE));
        }
        counters
    }

    /// `$isExternal(e)`, declaring the predicate on first use
    pub fn declare_is_external(&mut self, e: Expr) -> Expr {
        if !self.encoder.is_declared(IS_EXTERNAL) {
            let body = self
                .encoder
                .compare(Predicate::Slt, &VilType::Pointer, Expr::var("p"), Expr::var(EXTERNS_BOTTOM))
                .unwrap_or(Expr::Bool(false));
            self.encoder.declare(FunctionDef::inline(
                IS_EXTERNAL,
                vec![Binding::new("p", VilType::Pointer)],
                VilType::Bool,
                body,
            ));
        }
        Expr::apply(IS_EXTERNAL, vec![e])
    }

    /// Body-less procedure for a function defined outside the unit
    pub fn declare_external(&mut self, name: &str) -> Result<String> {
        let proc_name = self.naming.global(name);
        if self.externals.contains_key(&proc_name) {
            return Ok(proc_name);
        }
        let decl = self
            .module
            .declaration(name)
            .ok_or_else(|| Error::UnknownFunction { name: name.to_string() })?;
        let mut proc = ProcDecl::new(proc_name.clone());
        for (i, ty) in decl.params.iter().enumerate() {
            let vty = self.encoder.encode(self.layout, ty)?;
            proc.params.push(Binding::new(format!("p{}", i), vty));
        }
        if decl.ret != crate::ir::Type::Void {
            let vty = self.encoder.encode(self.layout, &decl.ret)?;
            proc.returns.push(Binding::new(RETURN_VAR, vty));
        }
        tracing::debug!(procedure = %proc_name, "declared external procedure");
        self.externals.insert(proc_name.clone(), proc);
        Ok(proc_name)
    }

    pub fn external_procs(&self) -> impl Iterator<Item = &ProcDecl> {
        self.externals.values()
    }

    pub fn is_external_proc(&self, name: &str) -> bool {
        self.externals.contains_key(name)
    }

    /// Float imprecision warning, raised at most once per unit
    pub fn warn_float(&mut self, block: &mut Vec<Stmt>, loc: Option<&DebugLoc>) {
        if self.float_warned {
            return;
        }
        self.float_warned = true;
        self.reporter
            .warn_if_incomplete("floating-point arithmetic", &[Flag::Float], Some(block), loc, FlagRelation::And);
    }

    /// Map variable name and type of a region
    pub fn region_map(&self, id: RegionId) -> (String, VilType) {
        match self.regions.region(id) {
            Some(region) => (region.var(), self.encoder.region_map_type(region)),
            None => (
                super::region::region_var(id),
                VilType::map(VilType::Pointer, self.encoder.int_type(8)),
            ),
        }
    }
}
