//! Property-based tests for the ladder's building blocks
//!
//! These tests use proptest to generate random inputs and verify that:
//! 1. Flattening effect sequences is idempotent and keeps effects in order
//! 2. Fresh names never repeat, even when issued from parallel workers
//! 3. Calling-convention assignment is deterministic and lays out records soundly
//! 4. Predicates lower to branches that pick the same target
//! 5. Programs survive a trip through their text form

use cheri_ladder::compiler::convention::{assign, Slot};
use cheri_ladder::compiler::effect::{flatten, Composable};
use cheri_ladder::compiler::ir::ex::{self, Value};
use cheri_ladder::compiler::ir::pr::lower_branch;
use cheri_ladder::compiler::ir::types::{align_up, BinaryOperator, BranchRelation, DataType, Label, Name};
use cheri_ladder::compiler::ir::{bb, physical, sv, Predicate, Register, Source};
use cheri_ladder::compiler::{Language, NameAllocator};
use proptest::prelude::*;
use rayon::prelude::*;
use std::collections::HashSet;

// =============================================================================
// STRATEGY GENERATORS
// =============================================================================

fn data_type() -> impl Strategy<Value = DataType> {
    prop_oneof![Just(DataType::U8), Just(DataType::S32), Just(DataType::Cap)]
}

fn relation() -> impl Strategy<Value = BranchRelation> {
    prop_oneof![
        Just(BranchRelation::Eq),
        Just(BranchRelation::Ne),
        Just(BranchRelation::Lt),
        Just(BranchRelation::Le),
        Just(BranchRelation::Gt),
        Just(BranchRelation::Ge),
    ]
}

fn operator() -> impl Strategy<Value = BinaryOperator> {
    prop_oneof![
        Just(BinaryOperator::Add),
        Just(BinaryOperator::Sub),
        Just(BinaryOperator::Mul),
        Just(BinaryOperator::And),
        Just(BinaryOperator::Or),
        Just(BinaryOperator::Xor),
    ]
}

/// Names that print as bare atoms and are not keywords
fn name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,6}".prop_filter("keywords are not names", |s| {
        !matches!(s.as_str(), "true" | "false" | "nil")
    })
}

/// Leaves are returns of distinct constants so order is observable
fn shallow_sequence() -> impl Strategy<Value = Vec<sv::Effect>> {
    let leaf = (0i64..1000).prop_map(|n| sv::Effect::Return(Source::Constant(n)));
    let child = prop_oneof![
        leaf.clone(),
        prop::collection::vec(leaf, 0..4).prop_map(sv::Effect::Do),
    ];
    prop::collection::vec(child, 0..8)
}

fn constant_predicate() -> impl Strategy<Value = Predicate<physical::Source>> {
    let leaf = prop_oneof![
        any::<bool>().prop_map(Predicate::Constant),
        (-50i64..50, relation(), -50i64..50).prop_map(|(lhs, relation, rhs)| {
            Predicate::Relation(
                physical::Source::Constant(lhs),
                relation,
                physical::Source::Constant(rhs),
            )
        }),
    ];
    leaf.prop_recursive(4, 8, 1, |inner| {
        inner.prop_map(|p| Predicate::Not(Box::new(p)))
    })
}

fn ex_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        (-1000i64..1000).prop_map(Value::constant),
        name().prop_map(|n| Value::location(&n)),
    ];
    leaf.prop_recursive(4, 24, 2, |inner| {
        (inner.clone(), operator(), inner).prop_map(|(lhs, op, rhs)| Value::binary(lhs, op, rhs))
    })
}

// =============================================================================
// HELPERS
// =============================================================================

fn holds(predicate: &Predicate<physical::Source>) -> bool {
    match predicate {
        Predicate::Constant(holds) => *holds,
        Predicate::Relation(physical::Source::Constant(lhs), relation, physical::Source::Constant(rhs)) => {
            relation.holds(*lhs, *rhs)
        }
        Predicate::Relation(..) => panic!("only constant relations are generated"),
        Predicate::Not(negated) => !holds(negated),
    }
}

fn taken(continuation: &bb::Continuation) -> &Label {
    match continuation {
        bb::Continuation::Continue(target) => target,
        bb::Continuation::Branch {
            lhs: physical::Source::Constant(lhs),
            relation,
            rhs: physical::Source::Constant(rhs),
            then,
            otherwise,
        } => {
            if relation.holds(*lhs, *rhs) {
                then
            } else {
                otherwise
            }
        }
        other => panic!("unexpected continuation {:?}", other),
    }
}

fn leaves(effects: &[sv::Effect]) -> Vec<sv::Effect> {
    effects
        .iter()
        .flat_map(|effect| match effect.subeffects() {
            Some(children) => leaves(children),
            None => vec![effect.clone()],
        })
        .collect()
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn flattening_is_idempotent(effects in shallow_sequence()) {
        let once = flatten(effects.clone());
        prop_assert!(once.iter().all(|e| e.subeffects().is_none()));
        prop_assert_eq!(flatten(once.clone()), once.clone());
        prop_assert_eq!(leaves(&effects), once);
    }

    #[test]
    fn flattened_sequence_keeps_single_effects(effect in (0i64..10).prop_map(|n| sv::Effect::Return(Source::Constant(n)))) {
        prop_assert_eq!(effect.clone().flattened(), effect);
    }

    #[test]
    fn fresh_names_are_unique(prefixes in prop::collection::vec(prop_oneof![Just("ex.val"), Just("sv.offset"), Just("cd.then")], 1..200)) {
        let names = NameAllocator::new();
        let issued: Vec<Name> = prefixes.par_iter().map(|prefix| names.fresh(prefix)).collect();
        let distinct: HashSet<&Name> = issued.iter().collect();
        prop_assert_eq!(distinct.len(), prefixes.len());
        prop_assert_eq!(names.issued(), prefixes.len());
    }

    #[test]
    fn assignment_is_deterministic(
        types in prop::collection::vec(data_type(), 0..12),
        register_count in 0usize..8,
    ) {
        let parameters: Vec<Slot> = types
            .iter()
            .enumerate()
            .map(|(i, data_type)| Slot { name: Name::new(format!("p{}", i)), data_type: *data_type })
            .collect();
        let registers = &Register::ARGUMENTS[..register_count];
        let procedure = Label::from("f");

        let first = assign(&procedure, &parameters, registers).unwrap();
        let second = assign(&procedure, &parameters, registers).unwrap();
        prop_assert_eq!(&first, &second);

        let in_registers = parameters.len().min(register_count);
        prop_assert_eq!(first.registers.len(), in_registers);
        for (assigned, register) in first.registers.iter().zip(registers) {
            prop_assert_eq!(assigned.register, *register);
        }

        match &first.record {
            None => prop_assert_eq!(in_registers, parameters.len()),
            Some(record) => {
                prop_assert!(!registers.contains(&record.register));
                prop_assert_eq!(record.fields.len(), parameters.len() - in_registers);
                let mut end = 0;
                for field in &record.fields {
                    let data_type = field.parameter.data_type;
                    prop_assert_eq!(field.offset, align_up(field.offset, data_type.alignment()));
                    prop_assert!(field.offset >= end);
                    end = field.offset + data_type.byte_size();
                }
                prop_assert_eq!(&record.fields.last().unwrap().parameter, &parameters[in_registers]);
            }
        }
    }

    #[test]
    fn predicates_lower_to_equivalent_branches(predicate in constant_predicate()) {
        let expected = if holds(&predicate) { "then" } else { "else" };
        let continuation = lower_branch(predicate, Label::from("then"), Label::from("else"));
        prop_assert_eq!(taken(&continuation).as_str(), expected);
    }

    #[test]
    fn ex_programs_survive_their_text_form(value in ex_value(), target in name()) {
        let program = ex::Program {
            body: ex::Effect::Do(vec![
                ex::Effect::Set(Name::new(target.clone()), value.clone()),
                ex::Effect::Return(value),
            ]),
            procedures: vec![],
        };
        let text = program.encode().unwrap();
        prop_assert_eq!(ex::Program::decode(&text).unwrap(), program);
    }
}
