//! SSA-to-VIL translation
//!
//! The [`Translator`] drives one translation unit through four passes:
//!
//! 1. **Collection**: every memory access site is resolved to a region in
//!    source order (static initializers first), recording element types and
//!    sizes so each region's cell type is fixed before anything is emitted.
//! 2. **Layout**: globals, functions and external symbols receive addresses
//!    from the sentinel counters and are declared as constants with axioms.
//! 3. **Lowering**: static initializers, then every function in module order.
//! 4. **Assembly**: modifies sets are closed over the call graph and the
//!    program is assembled in a fixed declaration order.
//!
//! # Example
//!
//! ```rust
//! use ssa2vil::ir::{BasicBlock, Function, Module, Terminator, Type};
//! use ssa2vil::translate::{Translator, TranslateOptions};
//! use ssa2vil::translate::region::UnifiedOracle;
//! use ssa2vil::warnings::MemorySink;
//!
//! let mut module = Module::new("demo");
//! module.functions.push(Function {
//!     name: "main".into(),
//!     params: vec![],
//!     ret: Type::Void,
//!     blocks: vec![BasicBlock::new("entry", vec![], Terminator::Ret(None))],
//! });
//!
//! let translation = Translator::new(TranslateOptions::default(), Box::new(UnifiedOracle))
//!     .with_sink(Box::new(MemorySink::new()))
//!     .translate(&module)
//!     .unwrap();
//! assert!(translation.program.procedure("main").is_some());
//! ```

pub mod access;
pub mod address;
pub mod alloc;
pub mod context;
pub mod encoder;
pub mod instr;
pub mod memops;
pub mod naming;
pub mod options;
pub mod region;
pub mod static_init;

pub use context::{HelperKey, Sentinels, UnitContext};
pub use encoder::NumericEncoder;
pub use instr::FunctionTranslator;
pub use naming::{DefaultNaming, Naming};
pub use options::{DivisionPolicy, IntegerEncoding, TranslateOptions};
pub use region::{AccessSite, AliasClasses, AliasOracle, Partition, Region, RegionId, RegionModel, UnifiedOracle};

use crate::ir::{DataLayout, InstKind, Module, TargetLayout};
use crate::vil::{Binding, Block, Decl, Expr, ProcDecl, Program, Stmt, VilType};
use crate::warnings::{DiagnosticSink, Reporter, StderrSink};
use crate::{Error, Result};
use context::{EXTERNS_BOTTOM, GLOBALS_BOTTOM, HEAP_BASE, INIT_FUNCS, STACK_BASE, STATIC_INIT};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Result of translating one unit
#[derive(Debug, Clone)]
pub struct Translation {
    pub program: Program,
    /// Region maps each procedure may write, keyed by procedure name
    pub modifies: BTreeMap<String, Vec<String>>,
    pub regions: Vec<Region>,
    /// Number of precision warnings emitted
    pub warnings: usize,
}

/// Translation driver
pub struct Translator {
    options: TranslateOptions,
    layout: Box<dyn DataLayout>,
    naming: Box<dyn Naming>,
    oracle: Box<dyn AliasOracle>,
    sink: Box<dyn DiagnosticSink>,
}

impl Translator {
    pub fn new(options: TranslateOptions, oracle: Box<dyn AliasOracle>) -> Self {
        Self {
            options,
            layout: Box::new(TargetLayout::default()),
            naming: Box::new(DefaultNaming),
            oracle,
            sink: Box::new(StderrSink),
        }
    }

    pub fn with_layout(mut self, layout: Box<dyn DataLayout>) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_naming(mut self, naming: Box<dyn Naming>) -> Self {
        self.naming = naming;
        self
    }

    /// Destination of warning lines (stderr by default)
    pub fn with_sink(mut self, sink: Box<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Translate a module into a program
    pub fn translate(self, module: &Module) -> Result<Translation> {
        let Translator {
            options,
            layout,
            naming,
            oracle,
            sink,
        } = self;
        options.validate()?;

        let oracle: Box<dyn AliasOracle> = if options.memory_splitting {
            oracle
        } else {
            Box::new(UnifiedOracle)
        };
        let reporter = Reporter::new(options.flags(), options.warning_level, options.colored_warnings, sink);
        let mut ctx = UnitContext::new(
            &options,
            layout.as_ref(),
            naming.as_ref(),
            module,
            RegionModel::new(oracle),
            reporter,
        );

        for entry in &options.entry_points {
            if module.function(entry).is_none() {
                ctx.reporter
                    .warn_info(&format!("entry point {} is not defined in {}", entry, module.name));
            }
        }
        if !options.memory_splitting {
            ctx.reporter.warn_info("memory splitting disabled; every access uses one region");
        }

        collect(&mut ctx)?;
        let symbols = layout_symbols(&mut ctx)?;

        for global in &module.globals {
            if let Some(init) = &global.initializer {
                let stmts = ctx.build_init(global, init)?;
                ctx.static_init.extend(stmts);
            }
        }

        let mut procs = vec![];
        for function in &module.functions {
            procs.push(FunctionTranslator::new(&mut ctx, function).translate()?);
        }

        let counters = ctx.allocation_counters();
        let mut init_stmts: Vec<Stmt> = counters
            .iter()
            .map(|(var, base)| Stmt::assign(*var, Expr::var(*base)))
            .collect();
        init_stmts.append(&mut ctx.static_init);
        let static_init = init_procedure(STATIC_INIT, init_stmts);
        let mut calls = vec![];
        for name in &module.init_functions {
            if module.function(name).is_none() {
                return Err(Error::UnknownFunction { name: name.clone() });
            }
            calls.push(Stmt::call(vec![], ctx.naming.global(name), vec![]));
        }
        let init_funcs = init_procedure(INIT_FUNCS, calls);

        let init_writes = static_init.stmts().filter(|s| !matches!(s, Stmt::Return)).count();
        let mut all_procs = vec![static_init, init_funcs];
        all_procs.append(&mut procs);
        all_procs.extend(ctx.helper_procs().iter().cloned());
        all_procs.extend(ctx.external_procs().cloned());

        let region_vars: Vec<String> = ctx.regions.all_regions().iter().map(Region::var).collect();
        let counter_vars: Vec<String> = counters.iter().map(|(var, _)| var.to_string()).collect();
        let modifies = modifies_sets(&mut all_procs, &region_vars, &counter_vars, |name| {
            ctx.is_external_proc(name)
        });

        let mut program = Program::new();
        program.push(Decl::Type {
            name: "ref".into(),
            synonym: Some(ctx.encoder.pointer_repr()),
        });
        program.push(Decl::Type {
            name: "float".into(),
            synonym: None,
        });
        let sentinels = [
            (GLOBALS_BOTTOM, ctx.sentinels.globals_bottom()),
            (EXTERNS_BOTTOM, ctx.sentinels.externs_bottom()),
            (STACK_BASE, ctx.sentinels.stack_base()),
            (HEAP_BASE, ctx.sentinels.heap_base()),
        ];
        for (name, value) in sentinels {
            declare_address(&mut program, &ctx, name, value, false);
        }
        for region in ctx.regions.all_regions() {
            program.push(Decl::Var(Binding::new(region.var(), ctx.encoder.region_map_type(region))));
        }
        for (var, _) in &counters {
            program.push(Decl::Var(Binding::new(*var, VilType::Pointer)));
        }
        for decl in ctx.encoder.declarations() {
            program.push(decl);
        }
        for (name, address) in &symbols {
            declare_address(&mut program, &ctx, name, *address, true);
        }
        let helpers = ctx.helper_procs().len();
        for proc in all_procs {
            program.push(Decl::Procedure(proc));
        }

        let translation = Translation {
            program,
            modifies,
            regions: ctx.regions.all_regions().to_vec(),
            warnings: ctx.reporter.fired(),
        };
        info!(
            module = %module.name,
            functions = module.functions.len(),
            regions = translation.regions.len(),
            helpers,
            static_init_writes = init_writes,
            warnings = translation.warnings,
            "translation complete"
        );
        Ok(translation)
    }
}

/// Resolve every access site and record what it stores
fn collect(ctx: &mut UnitContext<'_>) -> Result<()> {
    let module = ctx.module;
    for global in &module.globals {
        let Some(init) = &global.initializer else {
            continue;
        };
        for leaf in ctx.initializer_leaves(global, init)? {
            let region = ctx.regions.region_of(&AccessSite::global(&global.name, leaf.offset))?;
            ctx.regions.record_typed(region, &leaf.ty, ctx.layout)?;
        }
    }
    for function in &module.functions {
        let name = function.name.as_str();
        for inst in function.blocks.iter().flat_map(|b| &b.instructions) {
            match &inst.kind {
                InstKind::Load { ty, ptr } => {
                    ctx.encoder.encode(ctx.layout, ty)?;
                    let region = ctx.region_for(name, ptr)?;
                    ctx.regions.record_typed(region, ty, ctx.layout)?;
                }
                InstKind::Store { value, ptr } => {
                    ctx.encoder.encode(ctx.layout, &value.ty())?;
                    let region = ctx.region_for(name, ptr)?;
                    ctx.regions.record_typed(region, &value.ty(), ctx.layout)?;
                }
                InstKind::MemCpy { dst, src, .. } => {
                    ctx.region_for(name, dst)?;
                    ctx.region_for(name, src)?;
                }
                InstKind::MemSet { dst, .. } => {
                    ctx.region_for(name, dst)?;
                }
                _ => {}
            }
        }
    }
    debug!(regions = ctx.regions.len(), "collected access sites");
    Ok(())
}

/// Addresses of every global, function and external symbol, in module order
fn layout_symbols(ctx: &mut UnitContext<'_>) -> Result<Vec<(String, i128)>> {
    let module = ctx.module;
    let mut symbols = vec![];
    for global in &module.globals {
        let (size, align) = if global.ty.is_sized() {
            (ctx.layout.size_of(&global.ty)?, ctx.layout.align_of(&global.ty)?)
        } else {
            (1, 1)
        };
        let address = if global.is_external() {
            ctx.sentinels.allocate_extern(size)?
        } else {
            ctx.sentinels.allocate_global(size, align)?
        };
        symbols.push((global.name.clone(), address));
    }
    for function in &module.functions {
        symbols.push((function.name.clone(), ctx.sentinels.allocate_global(1, 1)?));
    }
    for decl in &module.declarations {
        if module.function(&decl.name).is_none() {
            symbols.push((decl.name.clone(), ctx.sentinels.allocate_extern(1)?));
        }
    }
    Ok(symbols)
}

fn declare_address(program: &mut Program, ctx: &UnitContext<'_>, name: &str, address: i128, source: bool) {
    let name = if source {
        ctx.naming.global(name)
    } else {
        name.to_string()
    };
    program.push(Decl::Const {
        name: name.clone(),
        ty: VilType::Pointer,
        unique: source,
    });
    program.push(Decl::Axiom(Expr::eq(Expr::var(name), ctx.encoder.pointer_literal(address))));
}

fn init_procedure(name: &str, mut stmts: Vec<Stmt>) -> ProcDecl {
    stmts.push(Stmt::Return);
    let mut proc = ProcDecl::new(name);
    proc.blocks.push(Block::new("$bb0", stmts));
    proc
}

/// Close modifies sets over the call graph and store them on each procedure.
/// External procedures may write any region but none of `counter_vars`.
fn modifies_sets(
    procs: &mut [ProcDecl],
    region_vars: &[String],
    counter_vars: &[String],
    is_external: impl Fn(&str) -> bool,
) -> BTreeMap<String, Vec<String>> {
    let regions: BTreeSet<&str> = region_vars.iter().chain(counter_vars).map(String::as_str).collect();
    let mut sets: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut callees: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for proc in procs.iter() {
        let mut written: BTreeSet<String> = proc.modifies.iter().cloned().collect();
        if is_external(&proc.name) {
            written.extend(region_vars.iter().cloned());
        }
        let mut called = BTreeSet::new();
        for stmt in proc.stmts() {
            if let Stmt::Call { procedure, .. } = stmt {
                called.insert(procedure.clone());
            }
            for var in stmt.written_vars() {
                if regions.contains(var) {
                    written.insert(var.to_string());
                }
            }
        }
        sets.insert(proc.name.clone(), written);
        callees.insert(proc.name.clone(), called);
    }

    let mut changed = true;
    while changed {
        changed = false;
        for (caller, called) in &callees {
            let inherited: BTreeSet<String> = called
                .iter()
                .filter_map(|c| sets.get(c))
                .flatten()
                .cloned()
                .collect();
            if let Some(set) = sets.get_mut(caller) {
                let before = set.len();
                set.extend(inherited);
                changed |= set.len() != before;
            }
        }
    }

    let modifies: BTreeMap<String, Vec<String>> = sets
        .into_iter()
        .map(|(name, set)| (name, set.into_iter().collect()))
        .collect();
    for proc in procs.iter_mut() {
        if let Some(set) = modifies.get(&proc.name) {
            proc.modifies = set.clone();
        }
    }
    modifies
}
