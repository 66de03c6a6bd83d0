//! Property-based tests for the translator
//!
//! Randomized checks of the properties every translation must keep:
//! deterministic region assignment, disjoint address ranges, lossless
//! pointer/integer round trips, complete static initialization and
//! memoized helpers.

use proptest::prelude::*;
use ssa2vil::ir::{BasicBlock, Constant, Function, GlobalVariable, InstKind, Instruction, Module, Param, Terminator, Type, Value};
use ssa2vil::translate::address::AddressEngine;
use ssa2vil::translate::{
    AccessSite, AliasClasses, NumericEncoder, RegionModel, Sentinels, TranslateOptions, Translator, UnifiedOracle,
};
use ssa2vil::vil::{Expr, Lhs, Stmt};
use ssa2vil::warnings::MemorySink;

// ============================================================================
// Strategies
// ============================================================================

fn pointer_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[a-z]{1,6}", 1..8).prop_map(|set| set.into_iter().collect())
}

fn encodings() -> impl Strategy<Value = TranslateOptions> {
    (any::<bool>(), any::<bool>()).prop_map(|(ints, pointers)| TranslateOptions {
        bit_precise: ints,
        bit_precise_pointers: pointers,
        ..TranslateOptions::default()
    })
}

fn initializer_values() -> impl Strategy<Value = Vec<i128>> {
    prop::collection::vec(prop_oneof![3 => Just(0i128), 2 => -1000i128..1000], 1..12)
}

fn int_array_global(values: &[i128]) -> GlobalVariable {
    GlobalVariable {
        name: "x".into(),
        ty: Type::array(Type::i32(), values.len() as u64),
        initializer: Some(Constant::Array {
            element: Type::i32(),
            elements: values.iter().map(|v| Constant::int(32, *v)).collect(),
        }),
        constant: false,
    }
}

fn translate(module: &Module) -> ssa2vil::Translation {
    Translator::new(TranslateOptions::default(), Box::new(UnifiedOracle))
        .with_sink(Box::new(MemorySink::new()))
        .translate(module)
        .unwrap()
}

// ============================================================================
// Region assignment
// ============================================================================

proptest! {
    #[test]
    fn prop_region_assignment_is_deterministic(
        names in pointer_names(),
        merges in prop::collection::vec((0usize..8, 0usize..8), 0..6),
    ) {
        let mut classes = AliasClasses::new();
        for name in &names {
            classes = classes.add(name);
        }
        for (a, b) in &merges {
            classes = classes.alias(&names[a % names.len()], &names[b % names.len()]);
        }

        let mut first = RegionModel::new(Box::new(classes.clone()));
        let mut second = RegionModel::new(Box::new(classes));
        for name in &names {
            let site = AccessSite::global(name, 0);
            let id = first.region_of(&site).unwrap();
            prop_assert_eq!(id, second.region_of(&site).unwrap());
            prop_assert_eq!(id, first.region_of(&site).unwrap());
        }
        for (a, b) in &merges {
            let ra = first.region_of(&AccessSite::global(&names[a % names.len()], 0)).unwrap();
            let rb = first.region_of(&AccessSite::global(&names[b % names.len()], 0)).unwrap();
            prop_assert_eq!(ra, rb);
        }
        prop_assert!(first.len() <= names.len());
    }
}

// ============================================================================
// Address space
// ============================================================================

proptest! {
    #[test]
    fn prop_global_addresses_are_disjoint(
        objects in prop::collection::vec((1u64..256, prop_oneof![Just(1u64), Just(2), Just(4), Just(8)]), 1..32),
    ) {
        let mut sentinels = Sentinels::new(64);
        let mut previous = 0i128;
        for (size, align) in objects {
            let address = sentinels.allocate_global(size, align).unwrap();
            prop_assert!(address + size as i128 <= previous);
            prop_assert_eq!(address.rem_euclid(align as i128), 0);
            prop_assert!(address > sentinels.externs_start());
            previous = address;
        }
    }

    #[test]
    fn prop_stack_frames_are_aligned_and_large_enough(
        objects in prop::collection::vec((1u64..256, 1i128..16), 1..16),
    ) {
        let instructions = objects
            .iter()
            .enumerate()
            .map(|(i, (len, count))| {
                Instruction::assign(
                    format!("a{}", i),
                    InstKind::Alloca {
                        ty: Type::array(Type::i8(), *len),
                        count: Value::int(32, *count),
                    },
                )
            })
            .collect();
        let mut module = Module::new("m");
        module.functions.push(Function {
            name: "f".into(),
            params: vec![],
            ret: Type::Void,
            blocks: vec![BasicBlock::new("entry", instructions, Terminator::Ret(None))],
        });
        let translation = translate(&module);
        let f = translation.program.procedure("f").unwrap();
        let sizes: Vec<i128> = f
            .stmts()
            .filter_map(|s| match s {
                Stmt::Call { procedure, args, .. } if procedure == "$alloc" => args[0].as_literal(),
                _ => None,
            })
            .collect();
        prop_assert_eq!(sizes.len(), objects.len());
        for (size, (len, count)) in sizes.iter().zip(&objects) {
            prop_assert_eq!(size % 16, 0);
            prop_assert!(*size >= *len as i128 * count);
            prop_assert!(*size < *len as i128 * count + 16);
        }
    }

    #[test]
    fn prop_extern_addresses_stay_below_globals(sizes in prop::collection::vec(1u64..4096, 1..16)) {
        let mut sentinels = Sentinels::new(64);
        let mut previous = sentinels.externs_start();
        for size in sizes {
            let address = sentinels.allocate_extern(size).unwrap();
            prop_assert!(address + size as i128 <= previous);
            previous = address;
        }
    }
}

// ============================================================================
// Pointer/integer conversions
// ============================================================================

proptest! {
    #[test]
    fn prop_pointer_round_trip(
        name in "[a-z]{1,6}",
        options in encodings(),
        width in prop_oneof![Just(64u32), Just(128)],
    ) {
        let mut enc = NumericEncoder::new(&options, 64);
        let engine = AddressEngine::new();
        let int = enc.int_type(width);
        let p = Expr::var(&name);
        let as_int = engine.pointer_to_integer(&mut enc, p.clone(), &int);
        prop_assert_eq!(engine.integer_to_pointer(&mut enc, as_int, &int), p);
    }

    #[test]
    fn prop_integer_round_trip(
        name in "[a-z]{1,6}",
        options in encodings(),
        width in prop_oneof![Just(8u32), Just(16), Just(32), Just(64)],
    ) {
        let mut enc = NumericEncoder::new(&options, 64);
        let engine = AddressEngine::new();
        let int = enc.int_type(width);
        let i = Expr::var(&name);
        let as_pointer = engine.integer_to_pointer(&mut enc, i.clone(), &int);
        prop_assert_eq!(engine.pointer_to_integer(&mut enc, as_pointer, &int), i);
    }
}

// ============================================================================
// Static initialization
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_static_init_writes_each_non_zero_leaf(values in initializer_values()) {
        let mut module = Module::new("m");
        module.globals.push(int_array_global(&values));
        let translation = translate(&module);

        let writes: Vec<(Expr, Expr)> = translation
            .program
            .procedure("$static_init")
            .unwrap()
            .stmts()
            .filter_map(|s| match s {
                Stmt::Assign { targets, values } => match &targets[0] {
                    Lhs::MapIndex { index, .. } => Some((index.clone(), values[0].clone())),
                    _ => None,
                },
                _ => None,
            })
            .collect();

        let expected: Vec<(Expr, Expr)> = values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0)
            .map(|(i, v)| {
                let addr = if i == 0 {
                    Expr::var("x")
                } else {
                    Expr::apply("$add.ref", vec![Expr::var("x"), Expr::Int(4 * i as i128)])
                };
                (addr, Expr::Int(*v))
            })
            .collect();
        prop_assert_eq!(writes, expected);
    }

    #[test]
    fn prop_translation_is_deterministic(values in initializer_values()) {
        let mut module = Module::new("m");
        module.globals.push(int_array_global(&values));
        let first = translate(&module).program.to_json().unwrap();
        let second = translate(&module).program.to_json().unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_copy_helpers_are_memoized(calls in 1usize..6) {
        let copy = Instruction::effect(InstKind::MemCpy {
            dst: Value::local("d", Type::Pointer),
            src: Value::local("s", Type::Pointer),
            len: Value::local("n", Type::i64()),
        });
        let mut module = Module::new("m");
        module.functions.push(Function {
            name: "f".into(),
            params: vec![
                Param::new("d", Type::Pointer),
                Param::new("s", Type::Pointer),
                Param::new("n", Type::i64()),
            ],
            ret: Type::Void,
            blocks: vec![BasicBlock::new("entry", vec![copy; calls], Terminator::Ret(None))],
        });
        let oracle = AliasClasses::new().add("f::d").add("f::s");
        let translation = Translator::new(TranslateOptions::default(), Box::new(oracle))
            .with_sink(Box::new(MemorySink::new()))
            .translate(&module)
            .unwrap();

        let helpers = translation
            .program
            .procedures()
            .filter(|p| p.name.starts_with("$memcpy"))
            .count();
        prop_assert_eq!(helpers, 1);
        let sites = translation
            .program
            .procedure("f")
            .unwrap()
            .stmts()
            .filter(|s| matches!(s, Stmt::Call { .. }))
            .count();
        prop_assert_eq!(sites, calls);
    }
}
