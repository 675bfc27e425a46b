//! # CC: Calling Convention
//!
//! Procedures over abstract locations typed by [`DataType`]. Lowering to [`cd`] applies the
//! calling convention at every call site and procedure entry and gives every abstract location
//! a physical home: a frame slot or, in leaf procedures when optimising, a free argument
//! register. Homes declared inside a scope are released when the scope is popped.
//!
//! ## Frame protocol
//!
//! ```text
//! entry:   pushFrame(size)              size is known once the body is lowered
//!          set(cap, home(cc.ret), ra)   save the return capability
//!          set(_, home(p), aN)          register parameters
//!          load(_, home(q), record, o)  parameters in the parameter record
//! call:    frameBuffer(record, ...)     record buffer in the caller's frame
//!          store(_, record, o, q)       spilled arguments
//!          set(_, aN, p)                register arguments
//!          call(f)
//!          set(_, home(r), a0)          result
//! return:  set(cap, ra, home(cc.ret))
//!          set(_, a0, value)
//!          popFrame
//!          return
//! ```

use super::cd;
use super::physical::{self, Location};
use super::register::Register;
use super::source::{Predicate, Source};
use super::types::{BinaryOperator, DataType, Label, Name};
use crate::compiler::convention::{self, Assignment, Slot};
use crate::compiler::effect::{flatten, lower_sequence, Composable};
use crate::compiler::frame::FrameAllocator;
use crate::compiler::ladder::{descend_through, Language, Level, Lower, Lowering, Reductor};
use crate::compiler::names::NameAllocator;
use crate::compiler::scope::{Declarations, Residency};
use crate::error::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Label of the procedure formed by a program's body
pub const MAIN: &str = "rv.main";

/// A CC program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// The main effect, returning the program's result
    pub body: Effect,
    /// Procedures callable from the body and from each other
    #[serde(default)]
    pub procedures: Vec<Procedure>,
}

/// A parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Name of the parameter within the body
    pub name: Name,
    /// Data type of the parameter
    #[serde(rename = "type")]
    pub data_type: DataType,
}

/// A procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    /// Globally unique label
    pub name: Label,
    /// Parameters in declaration order
    pub parameters: Vec<Parameter>,
    /// Data type of the result
    pub result: DataType,
    /// The procedure's body
    pub body: Effect,
}

/// A CC effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Effect {
    /// Performs effects in order
    Do(Vec<Effect>),
    /// Copies a datum into a location
    Set(DataType, Name, Source),
    /// Computes `lhs op rhs` into a location
    Compute {
        /// Destination
        into: Name,
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
        into: Name,
        /// Capability to load through
        from: Name,
        /// Byte offset
        offset: Source,
    },
    /// Stores a datum through a capability
    Store {
        /// Type of the stored datum
        #[serde(rename = "type")]
        data_type: DataType,
        /// Capability to store through
        into: Name,
        /// Byte offset
        offset: Source,
        /// Datum to store
        from: Source,
    },
    /// Allocates a buffer, scoped to the current scope or on the heap
    Allocate {
        /// Destination of the capability
        into: Name,
        /// Size in bytes
        bytes: i64,
        /// Whether the buffer is released with the current scope
        scoped: bool,
    },
    /// Obtains a fresh seal capability
    CreateSeal {
        /// Destination of the seal
        into: Name,
    },
    /// Seals a capability
    Seal {
        /// Destination of the sealed capability
        into: Name,
        /// Capability to seal
        source: Name,
        /// Seal capability
        seal: Name,
    },
    /// Derives a capability to a procedure
    CodeCapability {
        /// Destination of the capability
        into: Name,
        /// Procedure
        procedure: Label,
    },
    /// Performs one of two effects depending on a predicate
    If(Predicate<Source>, Box<Effect>, Box<Effect>),
    /// Calls a procedure, optionally binding its result
    Call {
        /// Procedure to call
        procedure: Label,
        /// Arguments in parameter order
        arguments: Vec<Source>,
        /// Location receiving the result
        #[serde(default)]
        result: Option<Name>,
    },
    /// Returns a value to the caller
    Return(Source),
    /// Opens a scope
    PushScope,
    /// Closes the innermost scope, releasing its locations
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

impl Effect {
    /// Whether the effect calls no procedure and no runtime routine
    fn is_leaf(&self) -> bool {
        match self {
            Effect::Do(effects) => effects.iter().all(Effect::is_leaf),
            Effect::If(_, then, otherwise) => then.is_leaf() && otherwise.is_leaf(),
            Effect::Call { .. } | Effect::CreateSeal { .. } => false,
            Effect::Allocate { scoped, .. } => *scoped,
            _ => true,
        }
    }

    /// Whether every execution path through the effect returns
    fn returns(&self) -> bool {
        match self {
            Effect::Do(effects) => effects.iter().any(Effect::returns),
            Effect::If(_, then, otherwise) => then.returns() && otherwise.returns(),
            Effect::Return(_) => true,
            _ => false,
        }
    }
}

/// What a caller needs to know about a procedure
#[derive(Debug)]
struct Signature {
    parameters: Vec<Parameter>,
    result: DataType,
    assignment: Assignment,
}

impl Program {
    fn check_labels(&self) -> Result<()> {
        let mut seen = HashSet::new();
        seen.insert(MAIN);
        for procedure in &self.procedures {
            if !seen.insert(procedure.name.as_str()) {
                return Err(Error::DuplicateLabel {
                    level: Level::CC,
                    label: procedure.name.to_string(),
                });
            }
            let mut names = HashSet::new();
            for parameter in &procedure.parameters {
                if !names.insert(&parameter.name) {
                    return Err(Error::validation(
                        Level::CC,
                        format!(
                            "{} declares parameter {} more than once",
                            procedure.name, parameter.name
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    fn signatures(&self, argument_registers: &[Register]) -> Result<HashMap<Label, Signature>> {
        convention::check_argument_registers(argument_registers)?;
        self.procedures
            .iter()
            .map(|procedure| {
                let slots: Vec<Slot> = procedure
                    .parameters
                    .iter()
                    .map(|p| Slot {
                        name: p.name.clone(),
                        data_type: p.data_type,
                    })
                    .collect();
                let assignment = convention::assign(&procedure.name, &slots, argument_registers)?;
                Ok((
                    procedure.name.clone(),
                    Signature {
                        parameters: procedure.parameters.clone(),
                        result: procedure.result,
                        assignment,
                    },
                ))
            })
            .collect()
    }
}

impl Language for Program {
    const LEVEL: Level = Level::CC;

    fn validate(&self, _lowering: &mut Lowering) -> Result<()> {
        self.check_labels()
    }

    fn descend<R: Reductor>(self, lowering: &mut Lowering, reductor: &mut R) -> Result<()> {
        descend_through(self, lowering, reductor)
    }
}

impl Lower for Program {
    type Target = cd::Program;

    fn lower(self, lowering: &mut Lowering) -> Result<cd::Program> {
        self.check_labels()?;
        let signatures = self.signatures(&lowering.configuration.argument_registers)?;
        let optimise = lowering.configuration.optimise;
        let names = &lowering.names;

        let main = lower_procedure(
            Label::from(MAIN),
            DataType::S32,
            self.body,
            &Assignment::default(),
            &signatures,
            names,
            optimise,
        )?;

        let procedures = self
            .procedures
            .into_par_iter()
            .map(|procedure| {
                let signature = &signatures[&procedure.name];
                lower_procedure(
                    procedure.name,
                    procedure.result,
                    procedure.body,
                    &signature.assignment,
                    &signatures,
                    names,
                    optimise,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(procedures = procedures.len(), "homed abstract locations");
        Ok(cd::Program {
            body: main.body,
            procedures,
        })
    }
}

/// Per-procedure lowering state
struct Context<'a> {
    signatures: &'a HashMap<Label, Signature>,
    declarations: Declarations<DataType>,
    frame: FrameAllocator,
    free_registers: Vec<Register>,
    result: DataType,
    return_home: Location,
}

fn lower_procedure(
    name: Label,
    result: DataType,
    body: Effect,
    assignment: &Assignment,
    signatures: &HashMap<Label, Signature>,
    names: &NameAllocator,
    optimise: bool,
) -> Result<cd::Procedure> {
    let leaf = optimise && body.is_leaf();
    let occupied = assignment.occupied_registers();
    let free_registers = if leaf {
        Register::ARGUMENTS
            .iter()
            .copied()
            .filter(|r| !occupied.contains(r))
            .collect()
    } else {
        Vec::new()
    };

    let mut context = Context {
        signatures,
        declarations: Declarations::new(Level::CC),
        frame: FrameAllocator::new(),
        free_registers,
        result,
        return_home: Location::Register(Register::Ra),
    };

    let mut prologue = Vec::new();
    context.return_home = context.home(&names.fresh("cc.ret"), DataType::Cap)?;
    prologue.push(cd::Effect::Set(
        DataType::Cap,
        context.return_home,
        Register::Ra.into(),
    ));

    for parameter in &assignment.registers {
        let data_type = parameter.parameter.data_type;
        if leaf {
            context.declarations.declare_at(
                &parameter.parameter.name,
                data_type,
                Residency::Register(parameter.register),
            )?;
        } else {
            let home = context.home(&parameter.parameter.name, data_type)?;
            prologue.push(cd::Effect::Set(data_type, home, parameter.register.into()));
        }
    }

    if let Some(record) = &assignment.record {
        for field in &record.fields {
            let data_type = field.parameter.data_type;
            let home = context.home(&field.parameter.name, data_type)?;
            prologue.push(cd::Effect::Load {
                data_type,
                into: home,
                from: Location::Register(record.register),
                offset: physical::Source::Constant(field.offset),
            });
        }
    }

    let body = lower_effect(body, &mut context)?;

    let mut effects = vec![cd::Effect::PushFrame(context.frame.size())];
    effects.extend(prologue);
    effects.push(body);
    tracing::debug!(procedure = %name, leaf, frame = context.frame.size(), "lowered procedure");
    Ok(cd::Procedure {
        name,
        body: cd::Effect::Do(flatten(effects)),
    })
}

impl Context<'_> {
    /// The home of `name`, assigning one if `name` is not yet declared
    fn home(&mut self, name: &Name, data_type: DataType) -> Result<Location> {
        if self.declarations.is_declared(name) {
            let declaration = self.declarations.require(name, &data_type)?;
            return residency_location(name, declaration.residency);
        }
        let residency = if self.free_registers.is_empty() {
            Residency::Frame(self.frame.allocate(data_type)?)
        } else {
            Residency::Register(self.free_registers.remove(0))
        };
        self.declarations.declare_at(name, data_type, residency)?;
        residency_location(name, residency)
    }

    /// The home of an already declared location of type `data_type`
    fn declared(&self, name: &Name, data_type: DataType) -> Result<Location> {
        let declaration = self.declarations.require(name, &data_type)?;
        residency_location(name, declaration.residency)
    }

    fn source(&self, source: &Source, data_type: DataType) -> Result<physical::Source> {
        match source {
            Source::Constant(value) => Ok(physical::Source::Constant(*value)),
            Source::Location(name) => Ok(self.declared(name, data_type)?.into()),
        }
    }

    fn integral(&self, source: &Source) -> Result<physical::Source> {
        match source {
            Source::Constant(value) => Ok(physical::Source::Constant(*value)),
            Source::Location(name) => {
                let declaration = self.declarations.lookup(name)?;
                if declaration.value_type == DataType::Cap {
                    return Err(Error::InconsistentTyping {
                        level: Level::CC,
                        location: name.to_string(),
                        declared: DataType::Cap.to_string(),
                        requested: DataType::S32.to_string(),
                    });
                }
                Ok(residency_location(name, declaration.residency)?.into())
            }
        }
    }

    fn push_scope(&mut self) {
        self.declarations.push();
        self.frame.push_scope();
    }

    fn pop_scope(&mut self) -> Result<()> {
        for (_, declaration) in self.declarations.pop()? {
            if let Residency::Register(register) = declaration.residency {
                self.free_registers.push(register);
            }
        }
        self.free_registers.sort();
        self.frame.pop_scope();
        Ok(())
    }

    fn call(
        &mut self,
        procedure: Label,
        arguments: Vec<Source>,
        result: Option<Name>,
    ) -> Result<cd::Effect> {
        let signatures = self.signatures;
        let signature = signatures
            .get(&procedure)
            .ok_or_else(|| Error::UndefinedLabel {
                level: Level::CC,
                label: procedure.to_string(),
            })?;
        if arguments.len() != signature.parameters.len() {
            return Err(Error::lowering(
                Level::CC,
                format!("call to {}", procedure),
                format!(
                    "{} parameters declared but {} arguments given",
                    signature.parameters.len(),
                    arguments.len()
                ),
            ));
        }

        let mut values = HashMap::new();
        for (parameter, argument) in signature.parameters.iter().zip(&arguments) {
            values.insert(
                &parameter.name,
                self.source(argument, parameter.data_type)?,
            );
        }

        let mut effects = Vec::new();
        self.frame.push_scope();
        if let Some(record) = &signature.assignment.record {
            let bytes = record.byte_size();
            let base = Location::Register(record.register);
            effects.push(cd::Effect::FrameBuffer {
                into: base,
                offset: self.frame.allocate_buffer(bytes)?,
                bytes,
            });
            for field in &record.fields {
                effects.push(cd::Effect::Store {
                    data_type: field.parameter.data_type,
                    into: base,
                    offset: physical::Source::Constant(field.offset),
                    from: values[&field.parameter.name],
                });
            }
        }
        for parameter in &signature.assignment.registers {
            effects.push(cd::Effect::Set(
                parameter.parameter.data_type,
                Location::Register(parameter.register),
                values[&parameter.parameter.name],
            ));
        }
        effects.push(cd::Effect::Call(procedure));
        self.frame.pop_scope();

        if let Some(result) = result {
            let home = self.home(&result, signature.result)?;
            effects.push(cd::Effect::Set(
                signature.result,
                home,
                Register::RESULT.into(),
            ));
        }
        Ok(cd::Effect::Do(effects))
    }

    fn ret(&mut self, value: Source) -> Result<cd::Effect> {
        let value = self.source(&value, self.result)?;
        Ok(cd::Effect::Do(vec![
            cd::Effect::Set(
                DataType::Cap,
                Location::Register(Register::Ra),
                self.return_home.into(),
            ),
            cd::Effect::Set(self.result, Location::Register(Register::RESULT), value),
            cd::Effect::PopFrame,
            cd::Effect::Return,
        ]))
    }

    /// Lowers a conditional branch; scopes it opens must be closed unless it returns
    fn branch(&mut self, effect: Effect) -> Result<cd::Effect> {
        let depth = self.declarations.depth();
        let returns = effect.returns();
        let lowered = lower_effect(effect, self)?;
        if returns {
            while self.declarations.depth() > depth {
                self.pop_scope()?;
            }
        }
        if self.declarations.depth() != depth {
            return Err(Error::validation(
                Level::CC,
                "a conditional branch opens or closes scopes without balancing them",
            ));
        }
        Ok(lowered)
    }
}

fn residency_location(name: &Name, residency: Residency) -> Result<Location> {
    match residency {
        Residency::Register(register) => Ok(Location::Register(register)),
        Residency::Frame(offset) => Ok(Location::Frame(offset)),
        Residency::Symbolic => Err(Error::lowering(
            Level::CC,
            name.to_string(),
            "location has no physical home",
        )),
    }
}

fn lower_effect(effect: Effect, context: &mut Context) -> Result<cd::Effect> {
    Ok(match effect {
        Effect::Do(effects) => lower_sequence(effects, context, lower_effect)?,

        Effect::Set(data_type, into, from) => {
            let from = context.source(&from, data_type)?;
            let into = context.home(&into, data_type)?;
            cd::Effect::Set(data_type, into, from)
        }

        Effect::Compute { into, lhs, op, rhs } => {
            let lhs = context.integral(&lhs)?;
            let rhs = context.integral(&rhs)?;
            let into = context.home(&into, DataType::S32)?;
            cd::Effect::Compute { into, lhs, op, rhs }
        }

        Effect::Load {
            data_type,
            into,
            from,
            offset,
        } => {
            let from = context.declared(&from, DataType::Cap)?;
            let offset = context.integral(&offset)?;
            let into = context.home(&into, data_type)?;
            cd::Effect::Load {
                data_type,
                into,
                from,
                offset,
            }
        }

        Effect::Store {
            data_type,
            into,
            offset,
            from,
        } => cd::Effect::Store {
            data_type,
            into: context.declared(&into, DataType::Cap)?,
            offset: context.integral(&offset)?,
            from: context.source(&from, data_type)?,
        },

        Effect::Allocate {
            into,
            bytes,
            scoped,
        } => {
            let into = context.home(&into, DataType::Cap)?;
            if scoped {
                cd::Effect::FrameBuffer {
                    into,
                    offset: context.frame.allocate_buffer(bytes)?,
                    bytes,
                }
            } else {
                cd::Effect::Allocate { into, bytes }
            }
        }

        Effect::CreateSeal { into } => cd::Effect::CreateSeal {
            into: context.home(&into, DataType::Cap)?,
        },

        Effect::Seal { into, source, seal } => {
            let source = context.declared(&source, DataType::Cap)?;
            let seal = context.declared(&seal, DataType::Cap)?;
            cd::Effect::Seal {
                into: context.home(&into, DataType::Cap)?,
                source,
                seal,
            }
        }

        Effect::CodeCapability { into, procedure } => {
            if !context.signatures.contains_key(&procedure) {
                return Err(Error::UndefinedLabel {
                    level: Level::CC,
                    label: procedure.to_string(),
                });
            }
            cd::Effect::CodeCapability {
                into: context.home(&into, DataType::Cap)?,
                procedure,
            }
        }

        Effect::If(predicate, then, otherwise) => {
            let predicate = predicate.try_map(&mut |source| context.integral(&source))?;
            let then = context.branch(*then)?;
            let otherwise = context.branch(*otherwise)?;
            cd::Effect::If(predicate, Box::new(then), Box::new(otherwise))
        }

        Effect::Call {
            procedure,
            arguments,
            result,
        } => context.call(procedure, arguments, result)?,

        Effect::Return(value) => context.ret(value)?,

        Effect::PushScope => {
            context.push_scope();
            cd::Effect::Do(vec![])
        }

        Effect::PopScope => {
            context.pop_scope()?;
            cd::Effect::Do(vec![])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::config::Configuration;

    fn word(name: &str) -> Parameter {
        Parameter {
            name: Name::from(name),
            data_type: DataType::S32,
        }
    }

    fn lower(program: Program, configuration: &Configuration) -> Result<cd::Program> {
        let mut lowering = Lowering::new(configuration);
        program.lower(&mut lowering)
    }

    fn sum_program() -> Program {
        Program {
            body: Effect::Do(vec![
                Effect::Call {
                    procedure: Label::from("f"),
                    arguments: vec![Source::from(3), Source::from(4)],
                    result: Some(Name::from("r")),
                },
                Effect::Return(Source::from("r")),
            ]),
            procedures: vec![Procedure {
                name: Label::from("f"),
                parameters: vec![word("a"), word("b")],
                result: DataType::S32,
                body: Effect::Do(vec![
                    Effect::Compute {
                        into: Name::from("s"),
                        lhs: Source::from("a"),
                        op: BinaryOperator::Add,
                        rhs: Source::from("b"),
                    },
                    Effect::Return(Source::from("s")),
                ]),
            }],
        }
    }

    #[test]
    fn test_spilled_argument_travels_through_record() {
        let configuration =
            Configuration::default().with_argument_registers(vec![Register::A0]);
        let lowered = lower(sum_program(), &configuration).unwrap();

        let Some(caller) = lowered.body.subeffects() else {
            panic!("expected a sequence");
        };
        assert!(caller.contains(&cd::Effect::FrameBuffer {
            into: Location::Register(Register::A1),
            offset: -32,
            bytes: 4,
        }));
        assert!(caller.contains(&cd::Effect::Store {
            data_type: DataType::S32,
            into: Location::Register(Register::A1),
            offset: physical::Source::Constant(0),
            from: physical::Source::Constant(4),
        }));
        assert!(caller.contains(&cd::Effect::Set(
            DataType::S32,
            Location::Register(Register::A0),
            physical::Source::Constant(3),
        )));

        let Some(callee) = lowered.procedures[0].body.subeffects() else {
            panic!("expected a sequence");
        };
        assert!(callee.iter().any(|e| matches!(
            e,
            cd::Effect::Load {
                from: Location::Register(Register::A1),
                offset: physical::Source::Constant(0),
                ..
            }
        )));
    }

    #[test]
    fn test_leaf_procedure_keeps_locations_in_registers() {
        let configuration = Configuration::default();
        let lowered = lower(sum_program(), &configuration).unwrap();
        let callee = &lowered.procedures[0].body;
        let Some(effects) = callee.subeffects() else {
            panic!("expected a sequence");
        };
        assert_eq!(effects[0], cd::Effect::PushFrame(0));
        assert!(effects.contains(&cd::Effect::Compute {
            into: Location::Register(Register::A3),
            lhs: physical::Source::from(Register::A0),
            op: BinaryOperator::Add,
            rhs: physical::Source::from(Register::A1),
        }));
    }

    #[test]
    fn test_without_optimisation_everything_lives_in_the_frame() {
        let configuration = Configuration::default().with_optimise(false);
        let lowered = lower(sum_program(), &configuration).unwrap();
        let Some(effects) = lowered.procedures[0].body.subeffects() else {
            panic!("expected a sequence");
        };
        assert_eq!(effects[0], cd::Effect::PushFrame(32));
        assert_eq!(
            effects[1],
            cd::Effect::Set(DataType::Cap, Location::Frame(-16), Register::Ra.into())
        );
    }

    #[test]
    fn test_popped_location_is_undeclared() {
        let program = Program {
            body: Effect::Do(vec![
                Effect::PushScope,
                Effect::Set(DataType::S32, Name::from("x"), Source::from(1)),
                Effect::PopScope,
                Effect::Return(Source::from("x")),
            ]),
            procedures: vec![],
        };
        let error = lower(program, &Configuration::default()).unwrap_err();
        assert_eq!(
            error,
            Error::UndeclaredLocation {
                level: Level::CC,
                location: "x".into()
            }
        );
    }

    #[test]
    fn test_popped_register_is_reused() {
        let program = Program {
            body: Effect::Do(vec![
                Effect::PushScope,
                Effect::Set(DataType::S32, Name::from("x"), Source::from(1)),
                Effect::PopScope,
                Effect::Set(DataType::S32, Name::from("y"), Source::from(2)),
                Effect::Return(Source::from("y")),
            ]),
            procedures: vec![],
        };
        let lowered = lower(program, &Configuration::default()).unwrap();
        let Some(effects) = lowered.body.subeffects() else {
            panic!("expected a sequence");
        };
        // a0 holds the return capability; x and y share a1
        assert!(effects.contains(&cd::Effect::Set(
            DataType::S32,
            Location::Register(Register::A1),
            physical::Source::Constant(1)
        )));
        assert!(effects.contains(&cd::Effect::Set(
            DataType::S32,
            Location::Register(Register::A1),
            physical::Source::Constant(2)
        )));
    }

    #[test]
    fn test_argument_count_mismatch() {
        let mut program = sum_program();
        program.body = Effect::Call {
            procedure: Label::from("f"),
            arguments: vec![Source::from(1)],
            result: None,
        };
        assert!(matches!(
            lower(program, &Configuration::default()),
            Err(Error::Lowering { .. })
        ));
    }

    #[test]
    fn test_unbalanced_branch() {
        let program = Program {
            body: Effect::Do(vec![
                Effect::If(
                    Predicate::Constant(true),
                    Box::new(Effect::PushScope),
                    Box::new(Effect::Do(vec![])),
                ),
                Effect::Return(Source::from(0)),
            ]),
            procedures: vec![],
        };
        assert!(matches!(
            lower(program, &Configuration::default()),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_duplicate_procedure() {
        let mut program = sum_program();
        program.procedures.push(program.procedures[0].clone());
        assert!(matches!(
            lower(program, &Configuration::default()),
            Err(Error::DuplicateLabel { .. })
        ));
    }
}
