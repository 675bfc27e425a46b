//! # SV: Structured Values
//!
//! Named locations holding typed values: integers and capabilities to records, vectors, seals,
//! code and sealed capabilities. Lowering to [`cc`] tracks the [`ValueType`] of every name,
//! turns record and vector values into buffer allocations and field or element accesses into
//! typed loads and stores at computed byte offsets.

use super::cc;
use super::source::{Predicate, Source};
use super::types::{
    BinaryOperator, CapabilityType, Label, Name, Parameter, RecordType, ValueType,
};
use crate::compiler::capability;
use crate::compiler::effect::{lower_sequence, Composable};
use crate::compiler::ladder::{descend_through, Language, Level, Lower, Lowering, Reductor};
use crate::compiler::names::NameAllocator;
use crate::compiler::scope::Declarations;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An SV program
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

/// An SV value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    /// A constant or the value of a location
    Source(Source),
    /// `lhs op rhs` over integers
    Binary(Source, BinaryOperator, Source),
    /// Capability to a new record
    Record {
        /// Type of the record
        #[serde(rename = "type")]
        record_type: RecordType,
        /// Whether the buffer is released with the current scope
        scoped: bool,
    },
    /// Capability to a new vector
    Vector {
        /// Element type
        of: ValueType,
        /// Number of elements
        count: i64,
        /// Whether the buffer is released with the current scope
        scoped: bool,
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

/// An SV effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Effect {
    /// Performs effects in order
    Do(Vec<Effect>),
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
    /// Opens a scope
    PushScope,
    /// Closes the innermost scope
    PopScope,
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

/// Parameters and result type of a procedure
type Signature = (Vec<Parameter>, ValueType);

impl Program {
    fn signatures(&self) -> Result<HashMap<Label, Signature>> {
        let mut signatures = HashMap::new();
        for procedure in &self.procedures {
            let signature = (procedure.parameters.clone(), procedure.result.clone());
            if signatures.insert(procedure.name.clone(), signature).is_some() {
                return Err(Error::DuplicateLabel {
                    level: Level::SV,
                    label: procedure.name.to_string(),
                });
            }
        }
        Ok(signatures)
    }
}

impl Language for Program {
    const LEVEL: Level = Level::SV;

    fn validate(&self, _lowering: &mut Lowering) -> Result<()> {
        self.signatures().map(|_| ())
    }

    fn descend<R: Reductor>(self, lowering: &mut Lowering, reductor: &mut R) -> Result<()> {
        descend_through(self, lowering, reductor)
    }
}

impl Lower for Program {
    type Target = cc::Program;

    fn lower(self, lowering: &mut Lowering) -> Result<cc::Program> {
        let signatures = self.signatures()?;
        let names = &lowering.names;

        let body = lower_body(&[], ValueType::S32, self.body, &signatures, names)?;
        let procedures = self
            .procedures
            .into_iter()
            .map(|procedure| {
                let body = lower_body(
                    &procedure.parameters,
                    procedure.result.clone(),
                    procedure.body,
                    &signatures,
                    names,
                )?;
                Ok(cc::Procedure {
                    name: procedure.name,
                    parameters: procedure
                        .parameters
                        .iter()
                        .map(|p| cc::Parameter {
                            name: p.name.clone(),
                            data_type: p.value_type.data_type(),
                        })
                        .collect(),
                    result: procedure.result.data_type(),
                    body,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(procedures = procedures.len(), "lowered structured values");
        Ok(cc::Program { body, procedures })
    }
}

/// Per-procedure lowering state
struct Context<'a> {
    names: &'a NameAllocator,
    signatures: &'a HashMap<Label, Signature>,
    declarations: Declarations<ValueType>,
    result: ValueType,
}

fn lower_body(
    parameters: &[Parameter],
    result: ValueType,
    body: Effect,
    signatures: &HashMap<Label, Signature>,
    names: &NameAllocator,
) -> Result<cc::Effect> {
    let mut context = Context {
        names,
        signatures,
        declarations: Declarations::new(Level::SV),
        result,
    };
    for parameter in parameters {
        context
            .declarations
            .declare(&parameter.name, parameter.value_type.clone())?;
    }
    lower_effect(body, &mut context)
}

impl Context<'_> {
    fn type_of(&self, name: &Name) -> Result<ValueType> {
        Ok(self.declarations.lookup(name)?.value_type.clone())
    }

    fn declare(&mut self, name: &Name, value_type: ValueType) -> Result<()> {
        self.declarations.declare(name, value_type).map(|_| ())
    }

    /// Requires `source` to be an integer, returning its type
    fn integral(&self, source: &Source) -> Result<ValueType> {
        match source {
            Source::Constant(_) => Ok(ValueType::S32),
            Source::Location(name) => match self.type_of(name)? {
                ValueType::Cap(capability) => Err(Error::InconsistentTyping {
                    level: Level::SV,
                    location: name.to_string(),
                    declared: ValueType::Cap(capability).to_string(),
                    requested: ValueType::S32.to_string(),
                }),
                integral => Ok(integral),
            },
        }
    }

    /// Requires `source` to be usable as a value of `value_type`
    fn conform(&self, source: &Source, value_type: &ValueType) -> Result<()> {
        match source {
            Source::Constant(value) => {
                if value_type.capability().is_some() && *value != 0 {
                    return Err(Error::lowering(
                        Level::SV,
                        format!("constant {}", value),
                        format!("a {} is expected", value_type),
                    ));
                }
                Ok(())
            }
            Source::Location(name) => self.declarations.require(name, value_type).map(|_| ()),
        }
    }

    /// Dereferenceable capability type of `name`
    fn capability(&self, name: &Name) -> Result<CapabilityType> {
        match self.type_of(name)? {
            ValueType::Cap(capability) if capability.is_sealed() => Err(Error::lowering(
                Level::SV,
                format!("access through {}", name),
                "the capability is sealed",
            )),
            ValueType::Cap(capability) => Ok(capability),
            other => Err(Error::InconsistentTyping {
                level: Level::SV,
                location: name.to_string(),
                declared: other.to_string(),
                requested: "cap".to_string(),
            }),
        }
    }

    fn record(&self, name: &Name) -> Result<RecordType> {
        match self.capability(name)? {
            CapabilityType::Record(record) => Ok(record),
            other => Err(Error::lowering(
                Level::SV,
                format!("field access through {}", name),
                format!("{} is a {} capability, not a record", name, other),
            )),
        }
    }

    fn element_type(&self, name: &Name) -> Result<ValueType> {
        match self.capability(name)? {
            CapabilityType::Vector(element) => Ok(*element),
            other => Err(Error::lowering(
                Level::SV,
                format!("element access through {}", name),
                format!("{} is a {} capability, not a vector", name, other),
            )),
        }
    }

    /// Type and byte offset of `field` in the record `of` points to
    fn field(&self, field: &Name, of: &Name) -> Result<(ValueType, i64)> {
        let record = self.record(of)?;
        match (record.field(field), record.offset_of(field)) {
            (Some(f), Some(offset)) => Ok((f.value_type.clone(), offset)),
            _ => Err(Error::lowering(
                Level::SV,
                format!("field {} of {}", field, of),
                format!("record ({}) has no such field", record),
            )),
        }
    }

    /// Element type and byte offset of element `at` in the vector `of` points to
    fn element(&self, of: &Name, at: Source, effects: &mut Vec<cc::Effect>) -> Result<(ValueType, Source)> {
        let element = self.element_type(of)?;
        self.integral(&at)?;
        let shift = element.data_type().size_shift();
        let offset = match at {
            Source::Constant(index) => Source::Constant(index << shift),
            index if shift == 0 => index,
            index => {
                let offset = self.names.fresh("sv.offset");
                effects.push(cc::Effect::Compute {
                    into: offset.clone(),
                    lhs: index,
                    op: BinaryOperator::Sll,
                    rhs: Source::Constant(shift),
                });
                Source::Location(offset)
            }
        };
        Ok((element, offset))
    }

    fn signature(&self, procedure: &Label, arguments: &[Source]) -> Result<&Signature> {
        let signature = self
            .signatures
            .get(procedure)
            .ok_or_else(|| Error::UndefinedLabel {
                level: Level::SV,
                label: procedure.to_string(),
            })?;
        if signature.0.len() != arguments.len() {
            return Err(Error::lowering(
                Level::SV,
                format!("call to {}", procedure),
                format!(
                    "{} parameters declared but {} arguments given",
                    signature.0.len(),
                    arguments.len()
                ),
            ));
        }
        for (parameter, argument) in signature.0.iter().zip(arguments) {
            self.conform(argument, &parameter.value_type)?;
        }
        Ok(signature)
    }

    fn set(&mut self, into: Name, value: Value) -> Result<cc::Effect> {
        let mut effects = Vec::new();
        match value {
            Value::Source(Source::Constant(constant)) => {
                let value_type = match self.declarations.lookup(&into) {
                    Ok(declaration) if declaration.value_type.capability().is_none() => {
                        declaration.value_type.clone()
                    }
                    _ => ValueType::S32,
                };
                self.declare(&into, value_type.clone())?;
                effects.push(cc::Effect::Set(
                    value_type.data_type(),
                    into,
                    Source::Constant(constant),
                ));
            }

            Value::Source(Source::Location(from)) => {
                let value_type = self.type_of(&from)?;
                self.declare(&into, value_type.clone())?;
                effects.push(cc::Effect::Set(
                    value_type.data_type(),
                    into,
                    Source::Location(from),
                ));
            }

            Value::Binary(lhs, op, rhs) => {
                self.integral(&lhs)?;
                self.integral(&rhs)?;
                self.declare(&into, ValueType::S32)?;
                effects.push(cc::Effect::Compute { into, lhs, op, rhs });
            }

            Value::Record {
                record_type,
                scoped,
            } => {
                self.declare(&into, ValueType::Cap(CapabilityType::Record(record_type.clone())))?;
                effects.push(capability::allocate_record(into, &record_type, scoped));
            }

            Value::Vector { of, count, scoped } => {
                self.declare(&into, ValueType::Cap(CapabilityType::Vector(Box::new(of.clone()))))?;
                effects.push(capability::allocate_vector(into, &of, count, scoped)?);
            }

            Value::Field { field, of } => {
                let (value_type, offset) = self.field(&field, &of)?;
                self.declare(&into, value_type.clone())?;
                effects.push(cc::Effect::Load {
                    data_type: value_type.data_type(),
                    into,
                    from: of,
                    offset: Source::Constant(offset),
                });
            }

            Value::Element { of, at } => {
                let (value_type, offset) = self.element(&of, at, &mut effects)?;
                self.declare(&into, value_type.clone())?;
                effects.push(cc::Effect::Load {
                    data_type: value_type.data_type(),
                    into,
                    from: of,
                    offset,
                });
            }

            Value::Seal => {
                self.declare(&into, ValueType::Cap(CapabilityType::Seal))?;
                effects.push(capability::create_seal(into));
            }

            Value::Sealed { source, with } => {
                let sealed = capability::sealed_type(&self.capability(&source)?, &self.capability(&with)?)?;
                self.declare(&into, ValueType::Cap(sealed))?;
                effects.push(capability::seal(into, source, with));
            }

            Value::Code(procedure) => {
                if !self.signatures.contains_key(&procedure) {
                    return Err(Error::UndefinedLabel {
                        level: Level::SV,
                        label: procedure.to_string(),
                    });
                }
                self.declare(&into, ValueType::Cap(CapabilityType::Code))?;
                effects.push(cc::Effect::CodeCapability { into, procedure });
            }

            Value::Evaluate(procedure, arguments) => {
                let result = self.signature(&procedure, &arguments)?.1.clone();
                self.declare(&into, result)?;
                effects.push(cc::Effect::Call {
                    procedure,
                    arguments,
                    result: Some(into),
                });
            }
        }
        Ok(cc::Effect::Do(effects).flattened())
    }
}

fn lower_effect(effect: Effect, context: &mut Context) -> Result<cc::Effect> {
    Ok(match effect {
        Effect::Do(effects) => lower_sequence(effects, context, lower_effect)?,

        Effect::Set(into, value) => context.set(into, value)?,

        Effect::SetField { field, of, to } => {
            let (value_type, offset) = context.field(&field, &of)?;
            context.conform(&to, &value_type)?;
            cc::Effect::Store {
                data_type: value_type.data_type(),
                into: of,
                offset: Source::Constant(offset),
                from: to,
            }
        }

        Effect::SetElement { of, at, to } => {
            let mut effects = Vec::new();
            let (value_type, offset) = context.element(&of, at, &mut effects)?;
            context.conform(&to, &value_type)?;
            effects.push(cc::Effect::Store {
                data_type: value_type.data_type(),
                into: of,
                offset,
                from: to,
            });
            cc::Effect::Do(effects).flattened()
        }

        Effect::If(predicate, then, otherwise) => {
            for operand in predicate.operands() {
                context.integral(operand)?;
            }
            let then = lower_effect(*then, context)?;
            let otherwise = lower_effect(*otherwise, context)?;
            cc::Effect::If(predicate, Box::new(then), Box::new(otherwise))
        }

        Effect::Call(procedure, arguments) => {
            context.signature(&procedure, &arguments)?;
            cc::Effect::Call {
                procedure,
                arguments,
                result: None,
            }
        }

        Effect::Return(value) => {
            let result = context.result.clone();
            context.conform(&value, &result)?;
            cc::Effect::Return(value)
        }

        Effect::PushScope => {
            context.declarations.push();
            cc::Effect::PushScope
        }

        Effect::PopScope => {
            context.declarations.pop()?;
            cc::Effect::PopScope
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::config::Configuration;
    use crate::compiler::ir::types::{DataType, Field};

    fn lower(program: Program) -> Result<cc::Program> {
        let configuration = Configuration::default();
        let mut lowering = Lowering::new(&configuration);
        program.lower(&mut lowering)
    }

    fn main(effects: Vec<Effect>) -> Program {
        Program {
            body: Effect::Do(effects),
            procedures: vec![],
        }
    }

    fn point() -> RecordType {
        RecordType::new(vec![
            Field::new("x", ValueType::S32),
            Field::new("y", ValueType::S32),
        ])
    }

    #[test]
    fn test_record_field_access() {
        let program = main(vec![
            Effect::Set(
                Name::from("p"),
                Value::Record {
                    record_type: point(),
                    scoped: true,
                },
            ),
            Effect::SetField {
                field: Name::from("y"),
                of: Name::from("p"),
                to: Source::Constant(5),
            },
            Effect::Set(
                Name::from("v"),
                Value::Field {
                    field: Name::from("y"),
                    of: Name::from("p"),
                },
            ),
            Effect::Return(Source::from("v")),
        ]);
        let lowered = lower(program).unwrap();
        assert_eq!(
            lowered.body,
            cc::Effect::Do(vec![
                cc::Effect::Allocate {
                    into: Name::from("p"),
                    bytes: 8,
                    scoped: true
                },
                cc::Effect::Store {
                    data_type: DataType::S32,
                    into: Name::from("p"),
                    offset: Source::Constant(4),
                    from: Source::Constant(5),
                },
                cc::Effect::Load {
                    data_type: DataType::S32,
                    into: Name::from("v"),
                    from: Name::from("p"),
                    offset: Source::Constant(4),
                },
                cc::Effect::Return(Source::from("v")),
            ])
        );
    }

    #[test]
    fn test_dynamic_element_offset_is_shifted() {
        let program = main(vec![
            Effect::Set(
                Name::from("v"),
                Value::Vector {
                    of: ValueType::S32,
                    count: 4,
                    scoped: true,
                },
            ),
            Effect::Set(Name::from("i"), Value::Source(Source::Constant(2))),
            Effect::Set(
                Name::from("e"),
                Value::Element {
                    of: Name::from("v"),
                    at: Source::from("i"),
                },
            ),
            Effect::Return(Source::from("e")),
        ]);
        let lowered = lower(program).unwrap();
        let cc::Effect::Do(effects) = lowered.body else {
            panic!("expected a sequence");
        };
        assert_eq!(
            effects[2],
            cc::Effect::Compute {
                into: Name::from("sv.offset$1"),
                lhs: Source::from("i"),
                op: BinaryOperator::Sll,
                rhs: Source::Constant(2),
            }
        );
    }

    #[test]
    fn test_unknown_field() {
        let program = main(vec![
            Effect::Set(
                Name::from("p"),
                Value::Record {
                    record_type: point(),
                    scoped: true,
                },
            ),
            Effect::Set(
                Name::from("z"),
                Value::Field {
                    field: Name::from("z"),
                    of: Name::from("p"),
                },
            ),
        ]);
        assert!(matches!(lower(program), Err(Error::Lowering { .. })));
    }

    #[test]
    fn test_sealed_capability_cannot_be_accessed() {
        let program = main(vec![
            Effect::Set(
                Name::from("p"),
                Value::Record {
                    record_type: point(),
                    scoped: true,
                },
            ),
            Effect::Set(Name::from("s"), Value::Seal),
            Effect::Set(
                Name::from("q"),
                Value::Sealed {
                    source: Name::from("p"),
                    with: Name::from("s"),
                },
            ),
            Effect::Set(
                Name::from("x"),
                Value::Field {
                    field: Name::from("x"),
                    of: Name::from("q"),
                },
            ),
        ]);
        assert!(matches!(lower(program), Err(Error::Lowering { .. })));
    }

    #[test]
    fn test_type_conflict() {
        let program = main(vec![
            Effect::Set(Name::from("s"), Value::Seal),
            Effect::Set(Name::from("s"), Value::Source(Source::Constant(1))),
        ]);
        assert!(matches!(
            lower(program),
            Err(Error::InconsistentTyping { .. })
        ));
    }

    #[test]
    fn test_evaluate_binds_result() {
        let program = Program {
            body: Effect::Do(vec![
                Effect::Set(
                    Name::from("r"),
                    Value::Evaluate(Label::from("one"), vec![]),
                ),
                Effect::Return(Source::from("r")),
            ]),
            procedures: vec![Procedure {
                name: Label::from("one"),
                parameters: vec![],
                result: ValueType::S32,
                body: Effect::Return(Source::Constant(1)),
            }],
        };
        let lowered = lower(program).unwrap();
        assert_eq!(
            lowered.body,
            cc::Effect::Do(vec![
                cc::Effect::Call {
                    procedure: Label::from("one"),
                    arguments: vec![],
                    result: Some(Name::from("r")),
                },
                cc::Effect::Return(Source::from("r")),
            ])
        );
    }

    #[test]
    fn test_popped_name_is_undeclared() {
        let program = main(vec![
            Effect::PushScope,
            Effect::Set(Name::from("x"), Value::Source(Source::Constant(1))),
            Effect::PopScope,
            Effect::Return(Source::from("x")),
        ]);
        assert!(matches!(
            lower(program),
            Err(Error::UndeclaredLocation { .. })
        ));
    }
}
