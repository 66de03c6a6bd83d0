//! Memory model integration tests
//!
//! Region assignment, byte-granular regions, stack and heap allocation,
//! external memory and block copy/fill lowering, exercised through the full
//! translator with hand-built modules and alias oracles.

use ssa2vil::ir::{
    BasicBlock, Callee, Constant, Function, FunctionDecl, InstKind, Instruction, Module, Param, Terminator, Type, Value,
};
use ssa2vil::translate::{AliasClasses, AliasOracle, TranslateOptions, Translation, Translator, UnifiedOracle};
use ssa2vil::vil::{BinaryOp, Binding, Expr, Lhs, ProcDecl, Stmt, VilType};
use ssa2vil::warnings::MemorySink;
use ssa2vil::Error;

fn module_with(params: Vec<Param>, instructions: Vec<Instruction>) -> Module {
    let mut module = Module::new("m");
    module.functions.push(Function {
        name: "f".into(),
        params,
        ret: Type::Void,
        blocks: vec![BasicBlock::new("entry", instructions, Terminator::Ret(None))],
    });
    module
}

fn run(options: TranslateOptions, oracle: impl AliasOracle + 'static, module: &Module) -> (Translation, MemorySink) {
    let sink = MemorySink::new();
    let translation = Translator::new(options, Box::new(oracle))
        .with_sink(Box::new(sink.clone()))
        .translate(module)
        .unwrap();
    (translation, sink)
}

fn proc<'t>(translation: &'t Translation, name: &str) -> &'t ProcDecl {
    translation.program.procedure(name).unwrap()
}

fn ptr(name: &str) -> Value {
    Value::local(name, Type::Pointer)
}

fn store(value: Value, to: &str) -> Instruction {
    Instruction::effect(InstKind::Store { value, ptr: ptr(to) })
}

fn map_writes<'p>(proc: &'p ProcDecl, map: &str) -> Vec<&'p Expr> {
    proc.stmts()
        .filter_map(|s| match s {
            Stmt::Assign { targets, values } => match &targets[0] {
                Lhs::MapIndex { map: m, .. } if m == map => Some(&values[0]),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

fn call(callee: &str, args: Vec<Value>, ret: Type) -> InstKind {
    InstKind::Call {
        callee: Callee::Direct(callee.into()),
        args,
        ret,
    }
}

fn loaded<'p>(proc: &'p ProcDecl, local: &str) -> &'p Expr {
    proc.stmts()
        .find_map(|s| match s {
            Stmt::Assign { targets, values } if targets[0] == Lhs::Var(local.into()) => Some(&values[0]),
            _ => None,
        })
        .unwrap()
}

#[test]
fn test_consecutive_allocations_are_disjoint() {
    let alloca = |name: &str| {
        Instruction::assign(
            name,
            InstKind::Alloca {
                ty: Type::i64(),
                count: Value::int(32, 1),
            },
        )
    };
    let module = module_with(vec![], vec![alloca("a"), alloca("b")]);
    let (translation, _) = run(TranslateOptions::default(), UnifiedOracle, &module);
    let f = proc(&translation, "f");
    let stmts: Vec<&Stmt> = f.stmts().collect();
    assert_eq!(*stmts[0], Stmt::call(vec!["$l.a".into()], "$alloc", vec![Expr::Int(16)]));
    assert_eq!(*stmts[1], Stmt::call(vec!["$l.b".into()], "$alloc", vec![Expr::Int(16)]));
    assert_eq!(translation.modifies["f"], vec!["$CurrAddr".to_string()]);

    let alloc = proc(&translation, "$alloc");
    assert!(!alloc.has_body());
    assert_eq!(alloc.ensures.len(), 4);
    assert_eq!(
        alloc.ensures[0],
        Expr::eq(Expr::var("$r"), Expr::old(Expr::var("$CurrAddr")))
    );
    assert!(format!("{:?}", alloc.ensures[3]).contains("\"$HEAP_BASE\""));

    let init = proc(&translation, "$static_init");
    assert_eq!(
        *init.stmts().next().unwrap(),
        Stmt::assign("$CurrAddr", Expr::var("$STACK_BASE"))
    );
    assert!(translation
        .program
        .vars()
        .any(|v| *v == Binding::new("$CurrAddr", VilType::Pointer)));
}

#[test]
fn test_recursive_activations_get_fresh_frames() {
    let mut module = Module::new("m");
    module.functions.push(Function {
        name: "f".into(),
        params: vec![Param::new("n", Type::i32())],
        ret: Type::Void,
        blocks: vec![BasicBlock::new(
            "entry",
            vec![
                Instruction::assign(
                    "x",
                    InstKind::Alloca {
                        ty: Type::i32(),
                        count: Value::int(32, 1),
                    },
                ),
                store(Value::local("n", Type::i32()), "x"),
                Instruction::effect(call("f", vec![Value::local("n", Type::i32())], Type::Void)),
            ],
            Terminator::Ret(None),
        )],
    });
    let (translation, _) = run(TranslateOptions::default(), AliasClasses::new().add("f::x"), &module);

    let f = proc(&translation, "f");
    assert!(f
        .stmts()
        .any(|s| *s == Stmt::call(vec!["$l.x".into()], "$alloc", vec![Expr::Int(16)])));
    assert!(!f.stmts().any(|s| matches!(s, Stmt::Assign { targets, .. } if targets[0] == Lhs::Var("$l.x".into()))));
    assert!(f.stmts().any(|s| *s == Stmt::call(vec![], "f", vec![Expr::var("$l.n")])));
    assert_eq!(
        translation.modifies["f"],
        vec!["$CurrAddr".to_string(), "$M.0".to_string()]
    );
}

#[test]
fn test_oversized_allocation_exhausts_stack() {
    let module = module_with(
        vec![],
        vec![Instruction::assign(
            "a",
            InstKind::Alloca {
                ty: Type::i64(),
                count: Value::int(64, 1 << 60),
            },
        )],
    );
    let err = Translator::new(TranslateOptions::default(), Box::new(UnifiedOracle))
        .with_sink(Box::new(MemorySink::new()))
        .translate(&module)
        .unwrap_err();
    assert!(matches!(err, Error::AddressSpaceExhausted { range: "stack", .. }));
}

fn heap_module() -> Module {
    let mut module = module_with(
        vec![],
        vec![
            Instruction::assign("p", call("malloc", vec![Value::int(64, 16)], Type::Pointer)),
            Instruction::assign("q", call("malloc", vec![Value::int(64, 16)], Type::Pointer)),
            Instruction::effect(call("free", vec![ptr("p")], Type::Void)),
        ],
    );
    module.declarations.push(FunctionDecl {
        name: "malloc".into(),
        params: vec![Type::i64()],
        ret: Type::Pointer,
        variadic: false,
    });
    module.declarations.push(FunctionDecl {
        name: "free".into(),
        params: vec![Type::Pointer],
        ret: Type::Void,
        variadic: false,
    });
    module
}

#[test]
fn test_heap_allocations_come_from_heap_range() {
    let (translation, _) = run(TranslateOptions::default(), UnifiedOracle, &heap_module());

    let f = proc(&translation, "f");
    let stmts: Vec<&Stmt> = f.stmts().collect();
    assert_eq!(*stmts[0], Stmt::call(vec!["$l.p".into()], "$malloc", vec![Expr::Int(16)]));
    assert_eq!(*stmts[1], Stmt::call(vec!["$l.q".into()], "$malloc", vec![Expr::Int(16)]));
    assert_eq!(*stmts[2], Stmt::call(vec![], "$free", vec![Expr::var("$l.p")]));
    assert!(!f.stmts().any(|s| matches!(s, Stmt::Assume { .. })));
    assert!(translation.program.procedure("malloc").is_none());
    assert!(translation.program.function("$isExternal").is_none());
    assert_eq!(translation.modifies["f"], vec!["$HeapAddr".to_string()]);

    let malloc = proc(&translation, "$malloc");
    assert_eq!(malloc.modifies, vec!["$HeapAddr".to_string()]);
    assert!(format!("{:?}", malloc.ensures[1]).contains("\"$HEAP_BASE\""));
    assert!(proc(&translation, "$free").requires.is_empty());
    let init = proc(&translation, "$static_init");
    assert!(init
        .stmts()
        .any(|s| *s == Stmt::assign("$HeapAddr", Expr::var("$HEAP_BASE"))));

    let options = TranslateOptions {
        memory_safety: true,
        ..TranslateOptions::default()
    };
    let (translation, _) = run(options, UnifiedOracle, &heap_module());
    assert_eq!(proc(&translation, "$free").requires.len(), 1);

    let options = TranslateOptions {
        allocators: vec![],
        deallocators: vec![],
        ..TranslateOptions::default()
    };
    let (translation, _) = run(options, UnifiedOracle, &heap_module());
    let f = proc(&translation, "f");
    assert!(f
        .stmts()
        .any(|s| *s == Stmt::call(vec!["$l.p".into()], "malloc", vec![Expr::Int(16)])));
    assert!(translation.program.procedure("$malloc").is_none());
}

#[test]
fn test_wide_load_from_byte_region_warns_once() {
    let module = module_with(
        vec![Param::new("p", Type::Pointer)],
        vec![
            store(Value::int(8, 1), "p"),
            Instruction::assign(
                "v",
                InstKind::Load {
                    ty: Type::i32(),
                    ptr: ptr("p"),
                },
            ),
        ],
    );
    let oracle = AliasClasses::new().add("f::p");
    let (translation, sink) = run(TranslateOptions::default(), oracle.clone(), &module);

    assert!(translation.regions[0].bytewise);
    assert_eq!(sink.count_matching("unmodeled operation"), 1);
    let f = proc(&translation, "f");
    assert!(f.locals.contains(&Binding::new("$l.v", VilType::Int(32))));

    let (translation, sink) = run(TranslateOptions::bit_precise(), oracle, &module);
    assert_eq!(sink.count_matching("unmodeled operation"), 0);
    let f = proc(&translation, "f");
    assert!(matches!(loaded(f, "$l.v"), Expr::Concat { .. }));
}

#[test]
fn test_wide_aggregate_store_to_byte_region() {
    let module = module_with(
        vec![Param::new("p", Type::Pointer)],
        vec![
            store(Value::int(8, 1), "p"),
            store(Value::Const(Constant::Zero(Type::array(Type::i8(), 32))), "p"),
        ],
    );
    let oracle = AliasClasses::new().add("f::p");
    let (translation, sink) = run(TranslateOptions::default(), oracle.clone(), &module);
    assert!(translation.regions[0].bytewise);
    assert_eq!(map_writes(proc(&translation, "f"), "$M.0").len(), 33);
    assert_eq!(sink.count_matching("unmodeled operation"), 1);

    let (translation, sink) = run(TranslateOptions::bit_precise(), oracle, &module);
    let f = proc(&translation, "f");
    let writes = map_writes(f, "$M.0");
    assert_eq!(writes.len(), 33);
    assert!(matches!(writes[32], Expr::Extract { hi: 256, lo: 248, .. }));
    assert_eq!(sink.count_matching("unmodeled operation"), 0);
}

#[test]
fn test_wide_aggregate_load_from_byte_region() {
    let module = module_with(
        vec![Param::new("p", Type::Pointer)],
        vec![
            store(Value::int(8, 1), "p"),
            Instruction::assign(
                "v",
                InstKind::Load {
                    ty: Type::array(Type::i8(), 24),
                    ptr: ptr("p"),
                },
            ),
        ],
    );
    let oracle = AliasClasses::new().add("f::p");
    let (translation, _) = run(TranslateOptions::default(), oracle.clone(), &module);
    let f = proc(&translation, "f");
    assert!(f.locals.contains(&Binding::new("$l.v", VilType::Int(192))));
    assert!(matches!(loaded(f, "$l.v"), Expr::Binary { op: BinaryOp::Add, .. }));

    let (translation, _) = run(TranslateOptions::bit_precise(), oracle, &module);
    let f = proc(&translation, "f");
    assert!(f.locals.contains(&Binding::new("$l.v", VilType::BitVector(192))));
    assert!(matches!(loaded(f, "$l.v"), Expr::Concat { .. }));
}

#[test]
fn test_store_to_external_region() {
    let module = module_with(vec![Param::new("p", Type::Pointer)], vec![store(Value::int(32, 7), "p")]);
    let oracle = AliasClasses::new().add("f::p").external("f::p");
    let (translation, sink) = run(TranslateOptions::default(), oracle.clone(), &module);

    let guard = Expr::apply("$isExternal", vec![Expr::var("$l.p")]);
    let f = proc(&translation, "f");
    assert!(f.stmts().any(|s| *s == Stmt::assume(guard.clone())));
    assert!(map_writes(f, "$M.0").is_empty());
    assert_eq!(sink.count_matching("store to external memory"), 1);
    assert!(translation.program.function("$isExternal").is_some());

    let options = TranslateOptions {
        memory_safety: true,
        ..TranslateOptions::default()
    };
    let (translation, sink) = run(options, oracle, &module);
    let f = proc(&translation, "f");
    assert!(f.stmts().any(|s| *s == Stmt::assert(guard.clone())));
    assert_eq!(sink.count_matching("store to external memory"), 0);
}

#[test]
fn test_symbolic_copy_helper_is_memoized() {
    let copy = || {
        Instruction::effect(InstKind::MemCpy {
            dst: ptr("d"),
            src: ptr("s"),
            len: Value::local("n", Type::i64()),
        })
    };
    let module = module_with(
        vec![
            Param::new("d", Type::Pointer),
            Param::new("s", Type::Pointer),
            Param::new("n", Type::i64()),
        ],
        vec![copy(), copy()],
    );
    let oracle = AliasClasses::new().add("f::d").add("f::s");
    let (translation, _) = run(TranslateOptions::default(), oracle, &module);

    let helpers: Vec<&ProcDecl> = translation
        .program
        .procedures()
        .filter(|p| p.name.starts_with("$memcpy"))
        .collect();
    assert_eq!(helpers.len(), 1);
    assert_eq!(helpers[0].name, "$memcpy.0.1");
    assert_eq!(helpers[0].modifies, vec!["$M.0".to_string()]);
    assert_eq!(helpers[0].ensures.len(), 2);
    assert!(!helpers[0].has_body());

    let f = proc(&translation, "f");
    let calls = f
        .stmts()
        .filter(|s| matches!(s, Stmt::Call { procedure, .. } if procedure == "$memcpy.0.1"))
        .count();
    assert_eq!(calls, 2);
    assert_eq!(translation.modifies["f"], vec!["$M.0".to_string()]);
}

#[test]
fn test_constant_copy_is_unrolled() {
    let module = module_with(
        vec![Param::new("d", Type::Pointer), Param::new("s", Type::Pointer)],
        vec![
            store(Value::int(32, 0), "d"),
            store(Value::int(32, 0), "s"),
            Instruction::effect(InstKind::MemCpy {
                dst: ptr("d"),
                src: ptr("s"),
                len: Value::int(64, 8),
            }),
        ],
    );
    let oracle = AliasClasses::new().add("f::d").add("f::s");
    let (translation, _) = run(TranslateOptions::default(), oracle, &module);

    let f = proc(&translation, "f");
    let copied: Vec<&Expr> = map_writes(f, "$M.0")
        .into_iter()
        .filter(|v| matches!(v, Expr::Select { .. }))
        .collect();
    assert_eq!(copied.len(), 2);
    assert_eq!(*copied[0], Expr::select(Expr::var("$M.1"), Expr::var("$l.s")));
    assert!(translation.program.procedures().all(|p| !p.name.starts_with("$memcpy")));
}

#[test]
fn test_constant_fill_replicates_byte() {
    let module = module_with(
        vec![Param::new("d", Type::Pointer)],
        vec![
            store(Value::int(8, 0), "d"),
            Instruction::effect(InstKind::MemSet {
                dst: ptr("d"),
                byte: Value::int(8, 0xab),
                len: Value::int(64, 4),
            }),
        ],
    );
    let oracle = AliasClasses::new().add("f::d");
    let (translation, sink) = run(TranslateOptions::bit_precise(), oracle, &module);

    let f = proc(&translation, "f");
    let fills: Vec<&Expr> = map_writes(f, "$M.0")
        .into_iter()
        .filter(|v| **v == Expr::BitVector { value: 0xab, width: 8 })
        .collect();
    assert_eq!(fills.len(), 4);
    assert_eq!(sink.count_matching("unmodeled"), 0);
}

#[test]
fn test_symbolic_fill_uses_helper() {
    let module = module_with(
        vec![Param::new("d", Type::Pointer), Param::new("n", Type::i64())],
        vec![Instruction::effect(InstKind::MemSet {
            dst: ptr("d"),
            byte: Value::int(8, 0),
            len: Value::local("n", Type::i64()),
        })],
    );
    let (translation, _) = run(TranslateOptions::default(), AliasClasses::new().add("f::d"), &module);
    let helper = proc(&translation, "$memset.0");
    assert_eq!(helper.params.len(), 3);
    assert_eq!(helper.ensures.len(), 2);
}

#[test]
fn test_disabled_splitting_uses_one_region() {
    let module = module_with(
        vec![Param::new("a", Type::Pointer), Param::new("b", Type::Pointer)],
        vec![store(Value::int(32, 1), "a"), store(Value::int(32, 2), "b")],
    );
    let options = TranslateOptions {
        memory_splitting: false,
        ..TranslateOptions::default()
    };
    // The empty oracle would fail on every site if it were consulted.
    let (translation, _) = run(options, AliasClasses::new(), &module);
    assert_eq!(translation.regions.len(), 1);
    assert_eq!(map_writes(proc(&translation, "f"), "$M.0").len(), 2);
}

#[test]
fn test_missing_region_is_fatal() {
    let module = module_with(
        vec![Param::new("p", Type::Pointer)],
        vec![Instruction::assign(
            "v",
            InstKind::Load {
                ty: Type::i32(),
                ptr: ptr("p"),
            },
        )],
    );
    let err = Translator::new(TranslateOptions::default(), Box::new(AliasClasses::new()))
        .with_sink(Box::new(MemorySink::new()))
        .translate(&module)
        .unwrap_err();
    assert!(matches!(err, Error::RegionOracleFailure { ref site } if site == "f::p"));
}

#[test]
fn test_aliasing_pointers_share_a_map() {
    let module = module_with(
        vec![Param::new("p", Type::Pointer), Param::new("q", Type::Pointer)],
        vec![store(Value::int(32, 1), "p"), store(Value::int(32, 2), "q")],
    );
    let oracle = AliasClasses::new().add("f::p").alias("f::q", "f::p");
    let (translation, _) = run(TranslateOptions::default(), oracle, &module);
    assert_eq!(translation.regions.len(), 1);

    let oracle = AliasClasses::new().add("f::p").add("f::q");
    let (translation, _) = run(TranslateOptions::default(), oracle, &module);
    assert_eq!(translation.regions.len(), 2);
    assert_eq!(map_writes(proc(&translation, "f"), "$M.1"), vec![&Expr::Int(2)]);
}
