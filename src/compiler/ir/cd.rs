//! # CD: Conditionals
//!
//! Structured effects over physical locations. Lowering to [`pr`] cuts every procedure into
//! basic blocks: a conditional ends its block with a branch to fresh `then` and `else` blocks
//! that meet again in an `endif` block, a call ends its block with a continuation to a fresh
//! return block, and a return ends its block. Effects after a return are unreachable and
//! dropped.

use super::cc::MAIN;
use super::physical::{Location, Operation, Source};
use super::pr;
use super::source::Predicate;
use super::types::{BinaryOperator, DataType, Label};
use crate::compiler::effect::Composable;
use crate::compiler::ladder::{descend_through, Language, Level, Lower, Lowering, Reductor};
use crate::compiler::names::NameAllocator;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A CD program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// The main procedure's body
    pub body: Effect,
    /// Other procedures
    #[serde(default)]
    pub procedures: Vec<Procedure>,
}

/// A procedure whose parameters have been assigned by the calling convention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    /// Globally unique label
    pub name: Label,
    /// The procedure's body, including its prologue and epilogues
    pub body: Effect,
}

/// A CD effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Effect {
    /// Performs effects in order
    Do(Vec<Effect>),
    /// Copies a datum
    Set(DataType, Location, Source),
    /// Computes `lhs op rhs`
    Compute {
        /// Destination
        into: Location,
        /// First operand
        lhs: Source,
        /// Operator
        op: BinaryOperator,
        /// Second operand
        rhs: Source,
    },
    /// Loads a datum through a capability
    Load {
        /// Type of the loaded datum
        #[serde(rename = "type")]
        data_type: DataType,
        /// Destination
        into: Location,
        /// Capability to load through
        from: Location,
        /// Byte offset
        offset: Source,
    },
    /// Stores a datum through a capability
    Store {
        /// Type of the stored datum
        #[serde(rename = "type")]
        data_type: DataType,
        /// Capability to store through
        into: Location,
        /// Byte offset
        offset: Source,
        /// Datum to store
        from: Source,
    },
    /// Allocates a heap buffer
    Allocate {
        /// Destination of the capability
        into: Location,
        /// Size in bytes
        bytes: i64,
    },
    /// Derives a capability to a buffer in the current frame
    FrameBuffer {
        /// Destination of the capability
        into: Location,
        /// Frame offset of the buffer
        offset: i64,
        /// Size in bytes
        bytes: i64,
    },
    /// Obtains a fresh seal capability
    CreateSeal {
        /// Destination of the seal
        into: Location,
    },
    /// Seals a capability
    Seal {
        /// Destination
        into: Location,
        /// Capability to seal
        source: Location,
        /// Seal capability
        seal: Location,
    },
    /// Derives a capability to a procedure
    CodeCapability {
        /// Destination
        into: Location,
        /// Procedure
        procedure: Label,
    },
    /// Allocates the call frame
    PushFrame(i64),
    /// Deallocates the call frame
    PopFrame,
    /// Performs one of two effects depending on a predicate
    If(Predicate<Source>, Box<Effect>, Box<Effect>),
    /// Calls a procedure; arguments and result follow the calling convention
    Call(Label),
    /// Returns to the caller
    Return,
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
    /// Whether every execution path through the effect returns
    pub fn returns(&self) -> bool {
        match self {
            Effect::Do(effects) => effects.iter().any(Effect::returns),
            Effect::If(_, then, otherwise) => then.returns() && otherwise.returns(),
            Effect::Return => true,
            _ => false,
        }
    }

    /// The straight-line operation this effect performs, if it is one
    fn into_operation(self) -> std::result::Result<Operation, Self> {
        Ok(match self {
            Effect::Set(data_type, into, from) => Operation::Set(data_type, into, from),
            Effect::Compute { into, lhs, op, rhs } => Operation::Compute { into, lhs, op, rhs },
            Effect::Load {
                data_type,
                into,
                from,
                offset,
            } => Operation::Load {
                data_type,
                into,
                from,
                offset,
            },
            Effect::Store {
                data_type,
                into,
                offset,
                from,
            } => Operation::Store {
                data_type,
                into,
                offset,
                from,
            },
            Effect::Allocate { into, bytes } => Operation::Allocate { into, bytes },
            Effect::FrameBuffer {
                into,
                offset,
                bytes,
            } => Operation::FrameBuffer {
                into,
                offset,
                bytes,
            },
            Effect::CreateSeal { into } => Operation::CreateSeal { into },
            Effect::Seal { into, source, seal } => Operation::Seal { into, source, seal },
            Effect::CodeCapability { into, procedure } => {
                Operation::CodeCapability { into, procedure }
            }
            Effect::PushFrame(size) => Operation::PushFrame(size),
            Effect::PopFrame => Operation::PopFrame,
            other => return Err(other),
        })
    }
}

impl Program {
    fn procedures(&self) -> impl Iterator<Item = (&str, &Effect)> {
        std::iter::once((MAIN, &self.body))
            .chain(self.procedures.iter().map(|p| (p.name.as_str(), &p.body)))
    }
}

impl Language for Program {
    const LEVEL: Level = Level::CD;

    fn validate(&self, _lowering: &mut Lowering) -> Result<()> {
        for (name, body) in self.procedures() {
            if !body.returns() {
                return Err(does_not_return(name));
            }
        }
        Ok(())
    }

    fn descend<R: Reductor>(self, lowering: &mut Lowering, reductor: &mut R) -> Result<()> {
        descend_through(self, lowering, reductor)
    }
}

impl Lower for Program {
    type Target = pr::Program;

    fn lower(self, lowering: &mut Lowering) -> Result<pr::Program> {
        let mut builder = Builder {
            names: &lowering.names,
            blocks: Vec::new(),
            open: None,
        };
        builder.procedure(Label::from(MAIN), self.body)?;
        for procedure in self.procedures {
            builder.procedure(procedure.name, procedure.body)?;
        }
        tracing::debug!(blocks = builder.blocks.len(), "formed basic blocks");
        Ok(pr::Program {
            entry: Label::from(MAIN),
            blocks: builder.blocks,
        })
    }
}

fn does_not_return(procedure: &str) -> Error {
    Error::validation(
        Level::CD,
        format!("an execution path in {} does not return", procedure),
    )
}

/// Accumulates blocks; `open` is the block being filled, if the current point is reachable
struct Builder<'a> {
    names: &'a NameAllocator,
    blocks: Vec<pr::Block>,
    open: Option<(Label, Vec<Operation>)>,
}

impl Builder<'_> {
    fn procedure(&mut self, name: Label, body: Effect) -> Result<()> {
        self.start(name.clone());
        self.effect(body);
        if self.open.is_some() {
            return Err(does_not_return(name.as_str()));
        }
        Ok(())
    }

    fn start(&mut self, label: Label) {
        self.open = Some((label, Vec::new()));
    }

    fn finish(&mut self, continuation: pr::Continuation) {
        if let Some((label, operations)) = self.open.take() {
            self.blocks.push(pr::Block {
                label,
                operations,
                continuation,
            });
        }
    }

    fn effect(&mut self, effect: Effect) {
        if let Effect::Do(effects) = effect {
            for effect in effects {
                self.effect(effect);
            }
            return;
        }
        if self.open.is_none() {
            tracing::debug!("dropping unreachable effect");
            return;
        }

        match effect {
            Effect::If(condition, then, otherwise) => {
                let then_label = self.names.fresh_label("cd.then");
                let else_label = self.names.fresh_label("cd.else");
                let endif_label = self.names.fresh_label("cd.endif");
                self.finish(pr::Continuation::Branch {
                    condition,
                    then: then_label.clone(),
                    otherwise: else_label.clone(),
                });

                self.start(then_label);
                self.effect(*then);
                let then_continues = self.open.is_some();
                self.finish(pr::Continuation::Continue(endif_label.clone()));

                self.start(else_label);
                self.effect(*otherwise);
                let else_continues = self.open.is_some();
                self.finish(pr::Continuation::Continue(endif_label.clone()));

                if then_continues || else_continues {
                    self.start(endif_label);
                }
            }
            Effect::Call(procedure) => {
                let returning_to = self.names.fresh_label("cd.ret");
                self.finish(pr::Continuation::Call {
                    procedure,
                    returning_to: returning_to.clone(),
                });
                self.start(returning_to);
            }
            Effect::Return => self.finish(pr::Continuation::Return),
            other => {
                if let (Ok(operation), Some((_, operations))) =
                    (other.into_operation(), self.open.as_mut())
                {
                    operations.push(operation);
                }
            }
        }
    }
}
