//! End-to-end translation tests
//!
//! Whole modules through [`Translator`]: program layout, control flow,
//! calls, configuration errors and modifies sets.

use ssa2vil::ir::{
    BasicBlock, BinOp, Callee, Constant, Function, FunctionDecl, GlobalVariable, InstKind, Instruction, Module,
    Param, Predicate, Terminator, Type, Value,
};
use ssa2vil::translate::{AliasClasses, TranslateOptions, Translation, Translator, UnifiedOracle};
use ssa2vil::vil::{Attribute, Decl, Expr, ProcDecl, Stmt, VilType};
use ssa2vil::warnings::MemorySink;
use ssa2vil::{Error, ErrorKind};

fn function(name: &str, params: Vec<Param>, ret: Type, blocks: Vec<BasicBlock>) -> Function {
    Function {
        name: name.into(),
        params,
        ret,
        blocks,
    }
}

fn ret_block(label: &str, instructions: Vec<Instruction>) -> BasicBlock {
    BasicBlock::new(label, instructions, Terminator::Ret(None))
}

fn run(options: TranslateOptions, module: &Module) -> ssa2vil::Result<Translation> {
    Translator::new(options, Box::new(UnifiedOracle))
        .with_sink(Box::new(MemorySink::new()))
        .translate(module)
}

fn proc<'t>(translation: &'t Translation, name: &str) -> &'t ProcDecl {
    translation.program.procedure(name).unwrap()
}

fn labels(proc: &ProcDecl) -> Vec<&str> {
    proc.blocks.iter().map(|b| b.label.as_str()).collect()
}

fn x32() -> Value {
    Value::local("x", Type::i32())
}

// ============================================================================
// Program layout
// ============================================================================

#[test]
fn test_declaration_order() {
    let mut module = Module::new("m");
    module.functions.push(function("main", vec![], Type::Void, vec![ret_block("entry", vec![])]));
    let translation = run(TranslateOptions::default(), &module).unwrap();
    let decls = &translation.program.decls;

    assert_eq!(
        decls[0],
        Decl::Type {
            name: "ref".into(),
            synonym: Some(VilType::Int(64)),
        }
    );
    assert_eq!(
        decls[1],
        Decl::Type {
            name: "float".into(),
            synonym: None,
        }
    );
    assert_eq!(
        decls[2],
        Decl::Const {
            name: "$GLOBALS_BOTTOM".into(),
            ty: VilType::Pointer,
            unique: false,
        }
    );
    assert!(translation
        .program
        .axioms()
        .any(|a| *a == Expr::eq(Expr::var("$STACK_BASE"), Expr::Int(4096))));
    assert!(translation
        .program
        .axioms()
        .any(|a| *a == Expr::eq(Expr::var("$HEAP_BASE"), Expr::Int(1 << 62))));

    let order: Vec<&str> = translation.program.procedures().map(|p| p.name.as_str()).collect();
    assert_eq!(order, vec!["$static_init", "$init_funcs", "main"]);
}

#[test]
fn test_bit_precise_pointer_type() {
    let mut module = Module::new("m");
    module.functions.push(function("main", vec![], Type::Void, vec![ret_block("entry", vec![])]));
    let translation = run(TranslateOptions::bit_precise(), &module).unwrap();
    assert_eq!(
        translation.program.decls[0],
        Decl::Type {
            name: "ref".into(),
            synonym: Some(VilType::BitVector(64)),
        }
    );
}

#[test]
fn test_entry_point_attribute_and_init_calls() {
    let mut module = Module::new("m");
    module.functions.push(function("main", vec![], Type::Void, vec![ret_block("entry", vec![])]));
    module.functions.push(function("ctor", vec![], Type::Void, vec![ret_block("entry", vec![])]));
    module.init_functions.push("ctor".into());
    let translation = run(TranslateOptions::default(), &module).unwrap();

    let main = proc(&translation, "main");
    assert!(main.has_attr("entrypoint"));
    let calls: Vec<&Stmt> = main.stmts().take(2).collect();
    assert_eq!(*calls[0], Stmt::call(vec![], "$static_init", vec![]));
    assert_eq!(*calls[1], Stmt::call(vec![], "$init_funcs", vec![]));
    assert!(!proc(&translation, "ctor").has_attr("entrypoint"));

    let init_funcs = proc(&translation, "$init_funcs");
    assert_eq!(
        init_funcs.stmts().cloned().collect::<Vec<_>>(),
        vec![Stmt::call(vec![], "ctor", vec![]), Stmt::Return]
    );
}

#[test]
fn test_unknown_init_function() {
    let mut module = Module::new("m");
    module.init_functions.push("missing".into());
    let err = run(TranslateOptions::default(), &module).unwrap_err();
    assert!(matches!(err, Error::UnknownFunction { ref name } if name == "missing"));
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_conflicting_options_fail_before_output() {
    let mut module = Module::new("m");
    module.functions.push(function("f", vec![], Type::Void, vec![ret_block("entry", vec![])]));
    let sink = MemorySink::new();
    let options = TranslateOptions {
        float: true,
        ..TranslateOptions::default()
    };
    let err = Translator::new(options, Box::new(UnifiedOracle))
        .with_sink(Box::new(sink.clone()))
        .translate(&module)
        .unwrap_err();
    assert!(matches!(err, Error::ConfigConflict(_)));
    assert_eq!(err.classify(), ErrorKind::Configuration);
    // Not even the missing-entry-point notice is written
    assert!(sink.is_empty());
}

#[test]
fn test_options_from_json() {
    let options = TranslateOptions::from_json(r#"{"division": "assert", "max_unroll": 4}"#).unwrap();
    let mut module = Module::new("m");
    module.functions.push(function(
        "main",
        vec![Param::new("x", Type::i32())],
        Type::Void,
        vec![ret_block(
            "entry",
            vec![Instruction::assign(
                "q",
                InstKind::Binary {
                    op: BinOp::SDiv,
                    lhs: Value::int(32, 10),
                    rhs: x32(),
                },
            )],
        )],
    ));
    let translation = run(options, &module).unwrap();
    let main = proc(&translation, "main");
    assert!(main.stmts().any(|s| *s
        == Stmt::Assert {
            expr: Expr::neq(Expr::var("$l.x"), Expr::Int(0)),
            attrs: vec![Attribute::flag("nonzero_divisor")],
        }));

    let err = TranslateOptions::from_json("{\"division\": 3}").unwrap_err();
    assert_eq!(err.classify(), ErrorKind::Configuration);
}

// ============================================================================
// Control flow
// ============================================================================

#[test]
fn test_switch_edges() {
    let mut module = Module::new("m");
    module.functions.push(function(
        "main",
        vec![Param::new("x", Type::i32())],
        Type::Void,
        vec![
            BasicBlock::new(
                "entry",
                vec![],
                Terminator::Switch {
                    value: x32(),
                    default: "c".into(),
                    cases: vec![(1, "a".into()), (2, "b".into())],
                },
            ),
            ret_block("a", vec![]),
            ret_block("b", vec![]),
            ret_block("c", vec![]),
        ],
    ));
    let translation = run(TranslateOptions::default(), &module).unwrap();
    let main = proc(&translation, "main");
    assert_eq!(
        labels(main),
        vec![
            "$bb.entry",
            "$bb.entry$case0",
            "$bb.entry$case1",
            "$bb.entry$default",
            "$bb.a",
            "$bb.b",
            "$bb.c",
        ]
    );
    let default_guard = Expr::and(
        Expr::neq(Expr::var("$l.x"), Expr::Int(1)),
        Expr::neq(Expr::var("$l.x"), Expr::Int(2)),
    );
    assert_eq!(main.blocks[3].stmts[0], Stmt::assume(default_guard));
    assert_eq!(main.blocks[3].stmts[1], Stmt::goto(vec!["$bb.c".into()]));
}

#[test]
fn test_unreachable_and_return_value() {
    let mut module = Module::new("m");
    module.functions.push(function(
        "f",
        vec![Param::new("x", Type::i32())],
        Type::i32(),
        vec![
            BasicBlock::new(
                "entry",
                vec![],
                Terminator::CondBr {
                    cond: Value::local("c", Type::i1()),
                    then_dest: "done".into(),
                    else_dest: "dead".into(),
                },
            ),
            BasicBlock::new("done", vec![], Terminator::Ret(Some(x32()))),
            BasicBlock::new("dead", vec![], Terminator::Unreachable),
        ],
    ));
    let translation = run(TranslateOptions::default(), &module).unwrap();
    let f = proc(&translation, "f");
    assert_eq!(f.returns.len(), 1);

    let done = f.blocks.iter().find(|b| b.label == "$bb.done").unwrap();
    assert_eq!(done.stmts, vec![Stmt::assign("$r", Expr::var("$l.x")), Stmt::Return]);
    let dead = f.blocks.iter().find(|b| b.label == "$bb.dead").unwrap();
    assert_eq!(dead.stmts, vec![Stmt::assume(Expr::Bool(false)), Stmt::Return]);
}

#[test]
fn test_select_and_compare() {
    let mut module = Module::new("m");
    module.functions.push(function(
        "main",
        vec![Param::new("x", Type::i32())],
        Type::Void,
        vec![ret_block(
            "entry",
            vec![
                Instruction::assign(
                    "c",
                    InstKind::Compare {
                        predicate: Predicate::Slt,
                        lhs: x32(),
                        rhs: Value::int(32, 0),
                    },
                ),
                Instruction::assign(
                    "m",
                    InstKind::Select {
                        cond: Value::local("c", Type::i1()),
                        on_true: Value::int(32, 0),
                        on_false: x32(),
                    },
                ),
            ],
        )],
    ));
    let translation = run(TranslateOptions::bit_precise(), &module).unwrap();
    let slt = translation.program.function("$slt.bv32").unwrap();
    assert!(slt.is_builtin());

    let main = proc(&translation, "main");
    let expected = Expr::ite(
        Expr::var("$l.c"),
        Expr::BitVector { value: 0, width: 32 },
        Expr::var("$l.x"),
    );
    assert!(main.stmts().any(|s| *s == Stmt::assign("$l.m", expected.clone())));
}

#[test]
fn test_struct_field_address() {
    let pair = Type::structure(vec![Type::i32(), Type::i64()]);
    let mut module = Module::new("m");
    module.functions.push(function(
        "main",
        vec![Param::new("p", Type::Pointer)],
        Type::Void,
        vec![ret_block(
            "entry",
            vec![Instruction::assign(
                "q",
                InstKind::ElementPtr {
                    source: pair,
                    base: Value::local("p", Type::Pointer),
                    indices: vec![Value::int(32, 0), Value::int(32, 1)],
                },
            )],
        )],
    ));
    let translation = run(TranslateOptions::default(), &module).unwrap();
    let main = proc(&translation, "main");
    let expected = Expr::apply("$add.ref", vec![Expr::var("$l.p"), Expr::Int(8)]);
    assert!(main.stmts().any(|s| *s == Stmt::assign("$l.q", expected.clone())));
}

// ============================================================================
// Calls and modifies
// ============================================================================

#[test]
fn test_external_call_result_and_modifies() {
    let mut module = Module::new("m");
    module.globals.push(GlobalVariable {
        name: "g".into(),
        ty: Type::i32(),
        initializer: Some(Constant::int(32, 1)),
        constant: false,
    });
    module.declarations.push(FunctionDecl {
        name: "acquire".into(),
        params: vec![Type::i64()],
        ret: Type::Pointer,
        variadic: false,
    });
    module.functions.push(function(
        "f",
        vec![],
        Type::Void,
        vec![ret_block(
            "entry",
            vec![Instruction::assign(
                "p",
                InstKind::Call {
                    callee: Callee::Direct("acquire".into()),
                    args: vec![Value::int(64, 16)],
                    ret: Type::Pointer,
                },
            )],
        )],
    ));
    let translation = run(TranslateOptions::default(), &module).unwrap();

    let f = proc(&translation, "f");
    let stmts: Vec<&Stmt> = f.stmts().collect();
    assert_eq!(*stmts[0], Stmt::call(vec!["$l.p".into()], "acquire", vec![Expr::Int(16)]));
    assert_eq!(
        *stmts[1],
        Stmt::assume(Expr::apply("$isExternal", vec![Expr::var("$l.p")]))
    );

    let acquire = proc(&translation, "acquire");
    assert!(!acquire.has_body());
    assert_eq!(acquire.modifies, vec!["$M.0".to_string()]);
    assert_eq!(translation.modifies["f"], vec!["$M.0".to_string()]);

    let externs_start = -(1i128 << 56);
    assert!(translation
        .program
        .axioms()
        .any(|a| *a == Expr::eq(Expr::var("acquire"), Expr::Int(externs_start - 8))));
}

#[test]
fn test_unknown_callee_is_fatal() {
    let mut module = Module::new("m");
    module.functions.push(function(
        "main",
        vec![],
        Type::Void,
        vec![ret_block(
            "entry",
            vec![Instruction::effect(InstKind::Call {
                callee: Callee::Direct("nowhere".into()),
                args: vec![],
                ret: Type::Void,
            })],
        )],
    ));
    let err = run(TranslateOptions::default(), &module).unwrap_err();
    assert!(matches!(err, Error::UnknownFunction { ref name } if name == "nowhere"));
    assert_eq!(err.classify(), ErrorKind::Structural);
}

#[test]
fn test_too_few_arguments() {
    let mut module = Module::new("m");
    module.functions.push(function(
        "g",
        vec![Param::new("a", Type::i32())],
        Type::Void,
        vec![ret_block("entry", vec![])],
    ));
    module.functions.push(function(
        "main",
        vec![],
        Type::Void,
        vec![ret_block(
            "entry",
            vec![Instruction::effect(InstKind::Call {
                callee: Callee::Direct("g".into()),
                args: vec![],
                ret: Type::Void,
            })],
        )],
    ));
    let err = run(TranslateOptions::default(), &module).unwrap_err();
    assert!(matches!(err, Error::InvalidOperand { .. }));
}

#[test]
fn test_call_result_must_match_callee_return() {
    let callee = |ret: Type| function("g", vec![], ret, vec![ret_block("entry", vec![])]);
    let caller = |inst: Instruction| function("main", vec![], Type::Void, vec![ret_block("entry", vec![inst])]);
    let call = |ret: Type| InstKind::Call {
        callee: Callee::Direct("g".into()),
        args: vec![],
        ret,
    };

    let mut module = Module::new("m");
    module.functions.push(callee(Type::Void));
    module.functions.push(caller(Instruction::assign("v", call(Type::i32()))));
    let err = run(TranslateOptions::default(), &module).unwrap_err();
    assert!(matches!(err, Error::InvalidOperand { ref context, .. } if context == "main"));
    assert_eq!(err.classify(), ErrorKind::Structural);

    let mut module = Module::new("m");
    module.functions.push(callee(Type::Void));
    module.functions.push(caller(Instruction::assign("v", call(Type::Void))));
    assert!(matches!(
        run(TranslateOptions::default(), &module),
        Err(Error::InvalidOperand { .. })
    ));

    let mut module = Module::new("m");
    module.declarations.push(FunctionDecl {
        name: "g".into(),
        params: vec![],
        ret: Type::i32(),
        variadic: false,
    });
    module.functions.push(caller(Instruction::effect(call(Type::Void))));
    assert!(matches!(
        run(TranslateOptions::default(), &module),
        Err(Error::InvalidOperand { .. })
    ));

    // discarding a result is fine as long as the call site expects one
    let mut module = Module::new("m");
    module.functions.push(function(
        "g",
        vec![],
        Type::i32(),
        vec![BasicBlock::new("entry", vec![], Terminator::Ret(Some(Value::int(32, 0))))],
    ));
    module.functions.push(caller(Instruction::effect(call(Type::i32()))));
    let translation = run(TranslateOptions::default(), &module).unwrap();
    let main = proc(&translation, "main");
    assert!(main
        .stmts()
        .any(|s| *s == Stmt::call(vec!["$l.call.0".into()], "g", vec![])));
}

#[test]
fn test_modifies_follow_calls() {
    let store = Instruction::effect(InstKind::Store {
        value: Value::int(32, 1),
        ptr: Value::local("p", Type::Pointer),
    });
    let call = |callee: &str, args: Vec<Value>| {
        Instruction::effect(InstKind::Call {
            callee: Callee::Direct(callee.into()),
            args,
            ret: Type::Void,
        })
    };
    let mut module = Module::new("m");
    module.functions.push(function(
        "leaf",
        vec![Param::new("p", Type::Pointer)],
        Type::Void,
        vec![ret_block("entry", vec![store])],
    ));
    module.functions.push(function(
        "mid",
        vec![Param::new("p", Type::Pointer)],
        Type::Void,
        vec![ret_block("entry", vec![call("leaf", vec![Value::local("p", Type::Pointer)])])],
    ));
    module.functions.push(function("pure", vec![], Type::Void, vec![ret_block("entry", vec![])]));

    let oracle = AliasClasses::new().add("leaf::p");
    let translation = Translator::new(TranslateOptions::default(), Box::new(oracle))
        .with_sink(Box::new(MemorySink::new()))
        .translate(&module)
        .unwrap();
    assert_eq!(translation.modifies["leaf"], vec!["$M.0".to_string()]);
    assert_eq!(translation.modifies["mid"], vec!["$M.0".to_string()]);
    assert!(translation.modifies["pure"].is_empty());
    assert_eq!(proc(&translation, "mid").modifies, vec!["$M.0".to_string()]);
}

#[test]
fn test_program_serializes() {
    let mut module = Module::new("m");
    module.functions.push(function("main", vec![], Type::Void, vec![ret_block("entry", vec![])]));
    let translation = run(TranslateOptions::default(), &module).unwrap();
    let json = translation.program.to_json().unwrap();
    assert!(json.contains("\"$static_init\""));
    assert!(json.contains("\"entrypoint\""));
}
