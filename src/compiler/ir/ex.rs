//! # EX: Expressions
//!
//! The compiler's input level. Values nest arbitrarily, so a program can write
//! `return(binary(field(n, of: evaluate(make, [])), add, source(1)))` without naming any
//! intermediate result.
//!
//! Lowering to [`df`] names every nested value that is not a plain source. Each such value gets
//! a fresh `ex.val` name (`ex.idx` for vector indices) bound by a single-definition `let`
//! wrapped around the effect that uses it, innermost operands first.

use super::df;
use super::source::{Predicate, Source};
use super::types::{BinaryOperator, Label, Name, Parameter, RecordType, ValueType};
use crate::compiler::effect::{lower_sequence, Composable};
use crate::compiler::ladder::{descend_through, Language, Level, Lower, Lowering, Reductor};
use crate::compiler::names::NameAllocator;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::convert::Infallible;

/// An EX program
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

/// An EX value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    /// A constant or the value of a location
    Source(Source),
    /// `lhs op rhs` over integers
    Binary(Box<Value>, BinaryOperator, Box<Value>),
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
        of: Box<Value>,
    },
    /// A vector element
    Element {
        /// Capability to the vector
        of: Box<Value>,
        /// Index of the element
        at: Box<Value>,
    },
    /// A fresh seal capability
    Seal,
    /// A capability sealed with a seal
    Sealed {
        /// Capability to seal
        source: Box<Value>,
        /// Seal capability
        with: Box<Value>,
    },
    /// Capability to a procedure
    Code(Label),
    /// Result of calling a procedure
    Evaluate(Label, Vec<Value>),
}

impl Value {
    /// A constant value
    pub fn constant(value: i64) -> Self {
        Value::Source(Source::Constant(value))
    }

    /// The value of a location
    pub fn location(name: &str) -> Self {
        Value::Source(Source::from(name))
    }

    /// `lhs op rhs`
    pub fn binary(lhs: Value, op: BinaryOperator, rhs: Value) -> Self {
        Value::Binary(Box::new(lhs), op, Box::new(rhs))
    }

    /// Locations read by the value and every value nested in it
    pub fn locations(&self) -> BTreeSet<&Name> {
        let mut locations = BTreeSet::new();
        self.collect_locations(&mut locations);
        locations
    }

    fn collect_locations<'a>(&'a self, locations: &mut BTreeSet<&'a Name>) {
        match self {
            Value::Source(source) => locations.extend(source.location()),
            Value::Binary(lhs, _, rhs) => {
                lhs.collect_locations(locations);
                rhs.collect_locations(locations);
            }
            Value::Field { of, .. } => of.collect_locations(locations),
            Value::Element { of, at } => {
                of.collect_locations(locations);
                at.collect_locations(locations);
            }
            Value::Sealed { source, with } => {
                source.collect_locations(locations);
                with.collect_locations(locations);
            }
            Value::Evaluate(_, arguments) => {
                for argument in arguments {
                    argument.collect_locations(locations);
                }
            }
            Value::Record(_) | Value::Vector { .. } | Value::Seal | Value::Code(_) => {}
        }
    }

    /// Replaces binary operations over two constants by their result, innermost first
    pub fn folded(self) -> Self {
        match self {
            Value::Binary(lhs, op, rhs) => match (lhs.folded(), rhs.folded()) {
                (Value::Source(Source::Constant(lhs)), Value::Source(Source::Constant(rhs))) => {
                    Value::constant(op.evaluate(lhs, rhs))
                }
                (lhs, rhs) => Value::binary(lhs, op, rhs),
            },
            Value::Field { field, of } => Value::Field {
                field,
                of: Box::new(of.folded()),
            },
            Value::Element { of, at } => Value::Element {
                of: Box::new(of.folded()),
                at: Box::new(at.folded()),
            },
            Value::Sealed { source, with } => Value::Sealed {
                source: Box::new(source.folded()),
                with: Box::new(with.folded()),
            },
            Value::Evaluate(procedure, arguments) => {
                Value::Evaluate(procedure, arguments.into_iter().map(Value::folded).collect())
            }
            other => other,
        }
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

/// An EX effect
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
        of: Value,
        /// New field value
        to: Value,
    },
    /// Replaces a vector element
    SetElement {
        /// Capability to the vector
        of: Value,
        /// Index of the element
        at: Value,
        /// New element value
        to: Value,
    },
    /// Performs one of two effects depending on a predicate
    If(Predicate<Value>, Box<Effect>, Box<Effect>),
    /// Calls a procedure, discarding its result
    Call(Label, Vec<Value>),
    /// Returns a value to the caller
    Return(Value),
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

impl Effect {
    fn folded(self) -> Self {
        match self {
            Effect::Do(effects) => Effect::Do(effects.into_iter().map(Effect::folded).collect()),
            Effect::Let { definitions, body } => Effect::Let {
                definitions: definitions
                    .into_iter()
                    .map(|d| Definition {
                        name: d.name,
                        value: d.value.folded(),
                    })
                    .collect(),
                body: Box::new(body.folded()),
            },
            Effect::Set(name, value) => Effect::Set(name, value.folded()),
            Effect::SetField { field, of, to } => Effect::SetField {
                field,
                of: of.folded(),
                to: to.folded(),
            },
            Effect::SetElement { of, at, to } => Effect::SetElement {
                of: of.folded(),
                at: at.folded(),
                to: to.folded(),
            },
            Effect::If(predicate, then, otherwise) => {
                let predicate = match predicate.try_map(&mut |v: Value| Ok::<_, Infallible>(v.folded())) {
                    Ok(predicate) => predicate,
                    Err(never) => match never {},
                };
                Effect::If(
                    predicate,
                    Box::new(then.folded()),
                    Box::new(otherwise.folded()),
                )
            }
            Effect::Call(procedure, arguments) => {
                Effect::Call(procedure, arguments.into_iter().map(Value::folded).collect())
            }
            Effect::Return(value) => Effect::Return(value.folded()),
        }
    }
}

fn validate_effect(effect: &Effect) -> Result<()> {
    match effect {
        Effect::Do(effects) => effects.iter().try_for_each(validate_effect),
        Effect::Let { definitions, body } => {
            let defined: BTreeSet<&Name> = definitions.iter().map(|d| &d.name).collect();
            if defined.len() != definitions.len() {
                return Err(Error::validation(
                    Level::EX,
                    "a let defines the same name more than once",
                ));
            }
            for definition in definitions {
                if let Some(sibling) = definition.value.locations().intersection(&defined).next() {
                    return Err(Error::validation(
                        Level::EX,
                        format!(
                            "definition of {} refers to {}, defined by the same let",
                            definition.name, sibling
                        ),
                    ));
                }
            }
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
    const LEVEL: Level = Level::EX;

    fn validate(&self, _lowering: &mut Lowering) -> Result<()> {
        validate_effect(&self.body)?;
        for procedure in &self.procedures {
            validate_effect(&procedure.body)?;
        }
        Ok(())
    }

    fn optimise(self) -> Self {
        Program {
            body: self.body.folded(),
            procedures: self
                .procedures
                .into_iter()
                .map(|procedure| Procedure {
                    body: procedure.body.folded(),
                    ..procedure
                })
                .collect(),
        }
    }

    fn descend<R: Reductor>(self, lowering: &mut Lowering, reductor: &mut R) -> Result<()> {
        descend_through(self, lowering, reductor)
    }
}

impl Lower for Program {
    type Target = df::Program;

    fn lower(self, lowering: &mut Lowering) -> Result<df::Program> {
        let names = &lowering.names;
        let body = lower_effect(self.body, &mut Context::new(names))?;
        let procedures = self
            .procedures
            .into_iter()
            .map(|procedure| {
                Ok(df::Procedure {
                    name: procedure.name,
                    parameters: procedure.parameters,
                    result: procedure.result,
                    body: lower_effect(procedure.body, &mut Context::new(names))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(procedures = procedures.len(), issued = names.issued(), "named nested values");
        Ok(df::Program { body, procedures })
    }
}

/// Definitions introduced while lowering one effect, in evaluation order
struct Context<'a> {
    names: &'a NameAllocator,
    bindings: Vec<df::Definition>,
}

impl<'a> Context<'a> {
    fn new(names: &'a NameAllocator) -> Self {
        Self {
            names,
            bindings: Vec::new(),
        }
    }

    /// Binds `value` to a fresh name unless it is already a source
    fn source(&mut self, value: Value, prefix: &str) -> Result<Source> {
        match value {
            Value::Source(source) => Ok(source),
            value => self.bind(value, prefix).map(Source::Location),
        }
    }

    /// Binds `value` to a fresh name unless it already names a location
    fn name(&mut self, value: Value) -> Result<Name> {
        match value {
            Value::Source(Source::Location(name)) => Ok(name),
            value => self.bind(value, "ex.val"),
        }
    }

    fn bind(&mut self, value: Value, prefix: &str) -> Result<Name> {
        let value = self.value(value)?;
        let name = self.names.fresh(prefix);
        self.bindings.push(df::Definition {
            name: name.clone(),
            value,
        });
        Ok(name)
    }

    fn value(&mut self, value: Value) -> Result<df::Value> {
        Ok(match value {
            Value::Source(source) => df::Value::Source(source),
            Value::Binary(lhs, op, rhs) => {
                let lhs = self.source(*lhs, "ex.val")?;
                let rhs = self.source(*rhs, "ex.val")?;
                df::Value::Binary(lhs, op, rhs)
            }
            Value::Record(record_type) => df::Value::Record(record_type),
            Value::Vector { of, count } => df::Value::Vector { of, count },
            Value::Field { field, of } => df::Value::Field {
                field,
                of: self.name(*of)?,
            },
            Value::Element { of, at } => {
                let of = self.name(*of)?;
                let at = self.source(*at, "ex.idx")?;
                df::Value::Element { of, at }
            }
            Value::Seal => df::Value::Seal,
            Value::Sealed { source, with } => {
                let source = self.name(*source)?;
                let with = self.name(*with)?;
                df::Value::Sealed { source, with }
            }
            Value::Code(procedure) => df::Value::Code(procedure),
            Value::Evaluate(procedure, arguments) => {
                df::Value::Evaluate(procedure, self.sources(arguments)?)
            }
        })
    }

    fn sources(&mut self, values: Vec<Value>) -> Result<Vec<Source>> {
        values
            .into_iter()
            .map(|value| self.source(value, "ex.val"))
            .collect()
    }

    /// Wraps `effect` in the definitions collected so far, the first one outermost
    fn wrap(&mut self, effect: df::Effect) -> df::Effect {
        self.bindings
            .drain(..)
            .rev()
            .fold(effect, |body, definition| df::Effect::Let {
                definitions: vec![definition],
                body: Box::new(body),
            })
    }
}

fn reject_intermediate_call(target: &Value) -> Result<()> {
    match target {
        Value::Evaluate(procedure, _) => Err(Error::IntermediateCall {
            level: Level::EX,
            procedure: procedure.to_string(),
        }),
        _ => Ok(()),
    }
}

fn lower_effect(effect: Effect, context: &mut Context) -> Result<df::Effect> {
    let lowered = match effect {
        Effect::Do(effects) => return lower_sequence(effects, context, lower_effect),

        Effect::Let { definitions, body } => {
            // Single-definition lets in order; siblings are independent, so nesting is equivalent.
            let mut scoped = Vec::with_capacity(definitions.len());
            for definition in definitions {
                let value = context.value(definition.value)?;
                context.bindings.push(df::Definition {
                    name: definition.name,
                    value,
                });
                scoped.append(&mut context.bindings);
            }
            let body = lower_effect(*body, context)?;
            context.bindings = scoped;
            return Ok(context.wrap(body));
        }

        Effect::Set(name, value) => df::Effect::Set(name, context.value(value)?),

        Effect::SetField { field, of, to } => {
            reject_intermediate_call(&of)?;
            let of = context.name(of)?;
            let to = context.source(to, "ex.val")?;
            df::Effect::SetField { field, of, to }
        }

        Effect::SetElement { of, at, to } => {
            reject_intermediate_call(&of)?;
            let of = context.name(of)?;
            let at = context.source(at, "ex.idx")?;
            let to = context.source(to, "ex.val")?;
            df::Effect::SetElement { of, at, to }
        }

        Effect::If(predicate, then, otherwise) => {
            let predicate = predicate.try_map(&mut |value| context.source(value, "ex.val"))?;
            let bindings = std::mem::take(&mut context.bindings);
            let then = lower_effect(*then, context)?;
            let otherwise = lower_effect(*otherwise, context)?;
            context.bindings = bindings;
            df::Effect::If(predicate, Box::new(then), Box::new(otherwise))
        }

        Effect::Call(procedure, arguments) => df::Effect::Call(procedure, context.sources(arguments)?),
        Effect::Return(value) => df::Effect::Return(context.source(value, "ex.val")?),
    };
    Ok(context.wrap(lowered))
}
