//! # DF: Definitions
//!
//! Values over sources, plus `let`, which binds definitions for the duration of an effect.
//! Lowering to [`sv`] replaces every `let` by a sequence that first assigns each definition,
//! left to right, and then performs the effect.
//!
//! The definitions of one `let` are independent: a definition cannot refer to a name defined by
//! a sibling. Programs that need an earlier definition nest another `let`.

use super::source::{Predicate, Source};
use super::sv;
use super::types::{BinaryOperator, Label, Name, Parameter, RecordType, ValueType};
use crate::compiler::capability;
use crate::compiler::effect::{lower_sequence, Composable};
use crate::compiler::ladder::{descend_through, Language, Level, Lower, Lowering, Reductor};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A DF program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// The main effect, returning the program's result
    pub body: Effect,
    /// Procedures callable from the body and from each other
    #[serde(default)]
    pub procedures: Vec<Procedure>,
}

/// A procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    /// Globally unique label
    pub name: Label,
    /// Parameters in declaration order
    pub parameters: Vec<Parameter>,
    /// Type of the result
    pub result: ValueType,
    /// The procedure's body
    pub body: Effect,
}

/// A DF value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    /// A constant or the value of a location
    Source(Source),
    /// `lhs op rhs` over integers
    Binary(Source, BinaryOperator, Source),
    /// Capability to a new record
    Record(RecordType),
    /// Capability to a new vector
    Vector {
        /// Element type
        of: ValueType,
        /// Number of elements
        count: i64,
    },
    /// A record field
    Field {
        /// Field name
        field: Name,
        /// Capability to the record
        of: Name,
    },
    /// A vector element
    Element {
        /// Capability to the vector
        of: Name,
        /// Index of the element
        at: Source,
    },
    /// A fresh seal capability
    Seal,
    /// A capability sealed with a seal
    Sealed {
        /// Capability to seal
        source: Name,
        /// Seal capability
        with: Name,
    },
    /// Capability to a procedure
    Code(Label),
    /// Result of calling a procedure
    Evaluate(Label, Vec<Source>),
}

impl Value {
    /// Names the value reads
    pub fn names(&self) -> Vec<&Name> {
        let sources: Vec<&Source> = match self {
            Value::Source(source) => vec![source],
            Value::Binary(lhs, _, rhs) => vec![lhs, rhs],
            Value::Element { at, .. } => vec![at],
            Value::Evaluate(_, arguments) => arguments.iter().collect(),
            _ => vec![],
        };
        let mut names: Vec<&Name> = sources.into_iter().filter_map(Source::location).collect();
        match self {
            Value::Field { of, .. } | Value::Element { of, .. } => names.push(of),
            Value::Sealed { source, with } => names.extend([source, with]),
            _ => {}
        }
        names
    }
}

/// A name bound to a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    /// The name
    pub name: Name,
    /// The value
    pub value: Value,
}

/// A DF effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Effect {
    /// Performs effects in order
    Do(Vec<Effect>),
    /// Binds definitions, then performs an effect
    Let {
        /// Independent definitions, evaluated left to right
        definitions: Vec<Definition>,
        /// Effect performed with the definitions in scope
        #[serde(rename = "in")]
        body: Box<Effect>,
    },
    /// Binds a value to a location
    Set(Name, Value),
    /// Replaces a record field
    SetField {
        /// Field name
        field: Name,
        /// Capability to the record
        of: Name,
        /// New field value
        to: Source,
    },
    /// Replaces a vector element
    SetElement {
        /// Capability to the vector
        of: Name,
        /// Index of the element
        at: Source,
        /// New element value
        to: Source,
    },
    /// Performs one of two effects depending on a predicate
    If(Predicate<Source>, Box<Effect>, Box<Effect>),
    /// Calls a procedure, discarding its result
    Call(Label, Vec<Source>),
    /// Returns a value to the caller
    Return(Source),
}

impl Composable for Effect {
    fn subeffects(&self) -> Option<&[Self]> {
        match self {
            Effect::Do(effects) => Some(effects),
            _ => None,
        }
    }

    fn into_subeffects(self) -> std::result::Result<Vec<Self>, Self> {
        match self {
            Effect::Do(effects) => Ok(effects),
            other => Err(other),
        }
    }

    fn sequence(effects: Vec<Self>) -> Self {
        Effect::Do(effects)
    }
}

/// Rejects a definition that reads a name defined by one of its siblings
fn check_definitions(definitions: &[Definition]) -> Result<()> {
    let defined: BTreeSet<&Name> = definitions.iter().map(|d| &d.name).collect();
    if defined.len() != definitions.len() {
        return Err(Error::validation(
            Level::DF,
            "a let defines the same name more than once",
        ));
    }
    for definition in definitions {
        if let Some(sibling) = definition.value.names().into_iter().find(|n| defined.contains(n)) {
            return Err(Error::validation(
                Level::DF,
                format!(
                    "definition of {} refers to {}, defined by the same let",
                    definition.name, sibling
                ),
            ));
        }
    }
    Ok(())
}

fn validate_effect(effect: &Effect) -> Result<()> {
    match effect {
        Effect::Do(effects) => effects.iter().try_for_each(validate_effect),
        Effect::Let { definitions, body } => {
            check_definitions(definitions)?;
            validate_effect(body)
        }
        Effect::If(_, then, otherwise) => {
            validate_effect(then)?;
            validate_effect(otherwise)
        }
        _ => Ok(()),
    }
}

impl Language for Program {
    const LEVEL: Level = Level::DF;

    fn validate(&self, _lowering: &mut Lowering) -> Result<()> {
        validate_effect(&self.body)?;
        for procedure in &self.procedures {
            validate_effect(&procedure.body)?;
        }
        Ok(())
    }

    fn descend<R: Reductor>(self, lowering: &mut Lowering, reductor: &mut R) -> Result<()> {
        descend_through(self, lowering, reductor)
    }
}

impl Lower for Program {
    type Target = sv::Program;

    fn lower(self, _lowering: &mut Lowering) -> Result<sv::Program> {
        let body = lower_effect(self.body, &mut ())?;
        let procedures = self
            .procedures
            .into_iter()
            .map(|procedure| {
                Ok(sv::Procedure {
                    name: procedure.name,
                    parameters: procedure.parameters,
                    result: procedure.result,
                    body: lower_effect(procedure.body, &mut ())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(sv::Program { body, procedures })
    }
}

fn lower_value(name: &Name, value: Value) -> sv::Value {
    match value {
        Value::Source(source) => sv::Value::Source(source),
        Value::Binary(lhs, op, rhs) => sv::Value::Binary(lhs, op, rhs),
        Value::Record(record_type) => sv::Value::Record {
            record_type,
            scoped: capability::is_scoped(name),
        },
        Value::Vector { of, count } => sv::Value::Vector {
            of,
            count,
            scoped: capability::is_scoped(name),
        },
        Value::Field { field, of } => sv::Value::Field { field, of },
        Value::Element { of, at } => sv::Value::Element { of, at },
        Value::Seal => sv::Value::Seal,
        Value::Sealed { source, with } => sv::Value::Sealed { source, with },
        Value::Code(procedure) => sv::Value::Code(procedure),
        Value::Evaluate(procedure, arguments) => sv::Value::Evaluate(procedure, arguments),
    }
}

fn lower_effect(effect: Effect, context: &mut ()) -> Result<sv::Effect> {
    Ok(match effect {
        Effect::Do(effects) => lower_sequence(effects, context, lower_effect)?,

        Effect::Let { definitions, body } => {
            check_definitions(&definitions)?;
            let mut effects: Vec<sv::Effect> = definitions
                .into_iter()
                .map(|definition| {
                    let value = lower_value(&definition.name, definition.value);
                    sv::Effect::Set(definition.name, value)
                })
                .collect();
            effects.push(lower_effect(*body, context)?);
            sv::Effect::Do(effects).flattened()
        }

        Effect::Set(name, value) => {
            let value = lower_value(&name, value);
            sv::Effect::Set(name, value)
        }

        Effect::SetField { field, of, to } => sv::Effect::SetField { field, of, to },
        Effect::SetElement { of, at, to } => sv::Effect::SetElement { of, at, to },

        Effect::If(predicate, then, otherwise) => sv::Effect::If(
            predicate,
            Box::new(lower_effect(*then, context)?),
            Box::new(lower_effect(*otherwise, context)?),
        ),

        Effect::Call(procedure, arguments) => sv::Effect::Call(procedure, arguments),
        Effect::Return(value) => sv::Effect::Return(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::config::Configuration;
    use crate::compiler::ir::types::BinaryOperator;

    fn lower(program: Program) -> Result<sv::Program> {
        let configuration = Configuration::default();
        let mut lowering = Lowering::new(&configuration);
        program.lower(&mut lowering)
    }

    fn definition(name: &str, value: Value) -> Definition {
        Definition {
            name: Name::from(name),
            value,
        }
    }

    #[test]
    fn test_let_assigns_then_runs_body() {
        let program = Program {
            body: Effect::Let {
                definitions: vec![
                    definition("a", Value::Source(Source::Constant(1))),
                    definition("b", Value::Source(Source::Constant(2))),
                ],
                body: Box::new(Effect::Return(Source::from("b"))),
            },
            procedures: vec![],
        };
        assert_eq!(
            lower(program).unwrap().body,
            sv::Effect::Do(vec![
                sv::Effect::Set(Name::from("a"), sv::Value::Source(Source::Constant(1))),
                sv::Effect::Set(Name::from("b"), sv::Value::Source(Source::Constant(2))),
                sv::Effect::Return(Source::from("b")),
            ])
        );
    }

    #[test]
    fn test_sibling_reference_is_rejected() {
        let program = Program {
            body: Effect::Let {
                definitions: vec![
                    definition("a", Value::Source(Source::Constant(1))),
                    definition(
                        "b",
                        Value::Binary(Source::from("a"), BinaryOperator::Add, Source::Constant(1)),
                    ),
                ],
                body: Box::new(Effect::Return(Source::from("b"))),
            },
            procedures: vec![],
        };
        let configuration = Configuration::default();
        let mut lowering = Lowering::new(&configuration);
        assert!(matches!(
            program.validate(&mut lowering),
            Err(Error::Validation { .. })
        ));
        assert!(matches!(lower(program), Err(Error::Validation { .. })));
    }

    #[test]
    fn test_nested_let_may_refer_to_outer_definition() {
        let program = Program {
            body: Effect::Let {
                definitions: vec![definition("a", Value::Source(Source::Constant(1)))],
                body: Box::new(Effect::Let {
                    definitions: vec![definition(
                        "b",
                        Value::Binary(Source::from("a"), BinaryOperator::Add, Source::Constant(1)),
                    )],
                    body: Box::new(Effect::Return(Source::from("b"))),
                }),
            },
            procedures: vec![],
        };
        let sv::Effect::Do(effects) = lower(program).unwrap().body else {
            panic!("expected a sequence");
        };
        assert_eq!(effects.len(), 3);
    }

    #[test]
    fn test_allocations_are_marked_scoped() {
        let program = Program {
            body: Effect::Set(
                Name::from("v"),
                Value::Vector {
                    of: ValueType::U8,
                    count: 16,
                },
            ),
            procedures: vec![],
        };
        assert_eq!(
            lower(program).unwrap().body,
            sv::Effect::Set(
                Name::from("v"),
                sv::Value::Vector {
                    of: ValueType::U8,
                    count: 16,
                    scoped: true
                }
            )
        );
    }
}
