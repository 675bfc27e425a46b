//! # BB: Basic Blocks
//!
//! Labelled blocks of straight-line operations, each ending in a primitive continuation: a
//! relational branch, a jump, a call or a return. Lowering to [`rv`] verifies the control-flow
//! graph, drops unreachable blocks with a warning, linearises the rest so that fall-through
//! successors follow their predecessors, and selects instructions.
//!
//! Instruction selection only uses the scratch registers `t0`–`t3`: `t0` and `t1` carry
//! operands, `t2` carries results bound for the frame and `t3` addresses frame slots beyond
//! the reach of an immediate offset.

use super::instruction::{fits_immediate, Instruction};
use super::physical::{Location, Operation, Source};
use super::register::Register;
use super::rv;
use super::types::{align_up, BranchRelation, DataType, Label};
use crate::compiler::frame::{spill_type, FRAME_ALIGNMENT};
use crate::compiler::ladder::{descend_through, Language, Level, Lower, Lowering, Reductor};
use crate::compiler::verifier::Verifier;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Label of the heap allocation routine
pub const ALLOCATE_ROUTINE: &str = "mm.alloc";

/// Label of the seal allocation routine
pub const SEAL_ROUTINE: &str = "rt.seal";

/// Largest length `csetboundsimm` accepts
const MAX_BOUNDS_IMMEDIATE: i64 = 4095;

/// Bytes taken by the saved frame pointer above every frame
const FRAME_LINK: i64 = 16;

/// A BB program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Label of the block execution starts in
    pub entry: Label,
    /// The blocks
    pub blocks: Vec<Block>,
}

/// A basic block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Unique label
    pub label: Label,
    /// Operations performed in order
    pub operations: Vec<Operation>,
    /// What happens after the operations
    pub continuation: Continuation,
}

/// How control leaves a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Continuation {
    /// Continues in the given block
    Continue(Label),
    /// Continues in `then` if `lhs relation rhs` holds, in `else` otherwise
    Branch {
        /// First operand
        lhs: Source,
        /// Relation between both operands
        relation: BranchRelation,
        /// Second operand
        rhs: Source,
        /// Block taken when the relation holds
        then: Label,
        /// Block taken otherwise
        #[serde(rename = "else")]
        otherwise: Label,
    },
    /// Calls a procedure, continuing in `returningTo` when it returns
    #[serde(rename_all = "camelCase")]
    Call {
        /// Procedure to call
        procedure: Label,
        /// Block to continue in after the call
        returning_to: Label,
    },
    /// Returns to the caller
    Return,
}

impl Continuation {
    /// The successor control reaches without a jump, if it is placed right after the block
    fn fall_through(&self) -> Option<&Label> {
        match self {
            Continuation::Continue(target) => Some(target),
            Continuation::Branch { otherwise, .. } => Some(otherwise),
            Continuation::Call { returning_to, .. } => Some(returning_to),
            Continuation::Return => None,
        }
    }
}

impl Language for Program {
    const LEVEL: Level = Level::BB;

    fn validate(&self, _lowering: &mut Lowering) -> Result<()> {
        Verifier::new().check(self).map(|_| ())
    }

    fn descend<R: Reductor>(self, lowering: &mut Lowering, reductor: &mut R) -> Result<()> {
        descend_through(self, lowering, reductor)
    }
}

impl Lower for Program {
    type Target = rv::Program;

    fn lower(self, lowering: &mut Lowering) -> Result<rv::Program> {
        let verified = Verifier::new().check(&self)?;
        for label in &verified.unreachable {
            lowering.warn(Level::BB, format!("block {} is unreachable", label));
        }
        let unreachable: HashSet<Label> = verified.unreachable.into_iter().collect();
        let blocks: Vec<Block> = self
            .blocks
            .into_iter()
            .filter(|block| !unreachable.contains(&block.label))
            .collect();

        let ordered = linearise(&self.entry, blocks);
        let mut selector = Selector::default();
        for (index, block) in ordered.iter().enumerate() {
            let next = ordered.get(index + 1).map(|block| &block.label);
            selector.block(block, next)?;
        }
        tracing::debug!(
            blocks = ordered.len(),
            instructions = selector.instructions.len(),
            "selected instructions"
        );
        Ok(rv::Program {
            instructions: selector.instructions,
        })
    }
}

/// Orders blocks so that each is followed by its fall-through successor where possible
///
/// Starts from the entry block, then follows fall-through chains; when a chain ends, the first
/// block not yet placed (in program order) starts the next chain.
fn linearise(entry: &Label, blocks: Vec<Block>) -> Vec<Block> {
    let mut index: HashMap<Label, usize> = HashMap::new();
    for (position, block) in blocks.iter().enumerate() {
        index.insert(block.label.clone(), position);
    }

    let mut placed = vec![false; blocks.len()];
    let mut order = Vec::with_capacity(blocks.len());
    let starts = index
        .get(entry)
        .copied()
        .into_iter()
        .chain(0..blocks.len());
    for start in starts {
        let mut current = Some(start);
        while let Some(position) = current.filter(|p| !placed[*p]) {
            placed[position] = true;
            order.push(position);
            current = blocks[position]
                .continuation
                .fall_through()
                .and_then(|label| index.get(label).copied());
        }
    }

    let mut slots: Vec<Option<Block>> = blocks.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|position| slots[position].take())
        .collect()
}

/// Instruction selector for one program
#[derive(Default)]
struct Selector {
    instructions: Vec<Instruction>,
}

impl Selector {
    fn emit(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    fn block(&mut self, block: &Block, next: Option<&Label>) -> Result<()> {
        self.emit(Instruction::Label(block.label.clone()));
        for operation in &block.operations {
            self.operation(operation)?;
        }
        let follows = |label: &Label| next == Some(label);
        match &block.continuation {
            Continuation::Continue(target) => {
                if !follows(target) {
                    self.emit(Instruction::Jump(target.clone()));
                }
            }
            Continuation::Branch {
                lhs,
                relation,
                rhs,
                then,
                otherwise,
            } => {
                let lhs = self.read(DataType::S32, lhs, Register::T0)?;
                let rhs = self.read(DataType::S32, rhs, Register::T1)?;
                if follows(then) {
                    self.emit(Instruction::Branch {
                        relation: relation.negated(),
                        lhs,
                        rhs,
                        target: otherwise.clone(),
                    });
                } else {
                    self.emit(Instruction::Branch {
                        relation: *relation,
                        lhs,
                        rhs,
                        target: then.clone(),
                    });
                    if !follows(otherwise) {
                        self.emit(Instruction::Jump(otherwise.clone()));
                    }
                }
            }
            Continuation::Call {
                procedure,
                returning_to,
            } => {
                self.emit(Instruction::Call(procedure.clone()));
                if !follows(returning_to) {
                    self.emit(Instruction::Jump(returning_to.clone()));
                }
            }
            Continuation::Return => self.emit(Instruction::Return),
        }
        Ok(())
    }

    /// Capability register and immediate offset addressing frame offset `offset`
    fn frame_address(&mut self, offset: i64) -> (Register, i64) {
        if fits_immediate(offset) {
            return (Register::Fp, offset);
        }
        self.emit(Instruction::LoadImmediate {
            destination: Register::T3,
            value: offset,
        });
        self.emit(Instruction::OffsetCapability {
            destination: Register::T3,
            source: Register::Fp,
            offset: Register::T3,
        });
        (Register::T3, 0)
    }

    /// Register holding `source`, materialising it in `scratch` if needed
    fn read(&mut self, data_type: DataType, source: &Source, scratch: Register) -> Result<Register> {
        match source {
            Source::Constant(0) => Ok(Register::Zero),
            Source::Constant(value) => {
                if data_type == DataType::Cap {
                    return Err(Error::lowering(
                        Level::BB,
                        format!("constant {}", value),
                        "the only capability constant is 0, the null capability",
                    ));
                }
                self.emit(Instruction::LoadImmediate {
                    destination: scratch,
                    value: *value,
                });
                Ok(scratch)
            }
            Source::Location(location) => Ok(self.read_location(data_type, location, scratch)),
        }
    }

    fn read_location(&mut self, data_type: DataType, location: &Location, scratch: Register) -> Register {
        match location {
            Location::Register(register) => *register,
            Location::Frame(offset) => {
                let (address, offset) = self.frame_address(*offset);
                self.emit(Instruction::Load {
                    data_type: spill_type(data_type),
                    destination: scratch,
                    address,
                    offset,
                });
                scratch
            }
        }
    }

    /// Register a result bound for `location` should be computed in
    fn target(location: &Location, scratch: Register) -> Register {
        match location {
            Location::Register(register) => *register,
            Location::Frame(_) => scratch,
        }
    }

    /// Moves a result from `register` to `location`
    fn write(&mut self, data_type: DataType, location: &Location, register: Register) {
        match location {
            Location::Register(destination) if *destination == register => {}
            Location::Register(destination) => self.copy(data_type, *destination, register),
            Location::Frame(offset) => {
                let (address, offset) = self.frame_address(*offset);
                self.emit(Instruction::Store {
                    data_type: spill_type(data_type),
                    source: register,
                    address,
                    offset,
                });
            }
        }
    }

    fn copy(&mut self, data_type: DataType, destination: Register, source: Register) {
        self.emit(match data_type {
            DataType::Cap => Instruction::CopyCapability {
                destination,
                source,
            },
            DataType::U8 | DataType::S32 => Instruction::CopyWord {
                destination,
                source,
            },
        });
    }

    /// Capability register `capability` moved by `offset`, for use with a zero or immediate offset
    fn address(&mut self, capability: Register, offset: &Source, scratch: Register) -> Result<(Register, i64)> {
        match offset {
            Source::Constant(offset) if fits_immediate(*offset) => Ok((capability, *offset)),
            offset => {
                let offset = self.read(DataType::S32, offset, scratch)?;
                self.emit(Instruction::OffsetCapability {
                    destination: Register::T0,
                    source: capability,
                    offset,
                });
                Ok((Register::T0, 0))
            }
        }
    }

    fn bound(&mut self, destination: Register, bytes: i64) {
        if bytes <= MAX_BOUNDS_IMMEDIATE {
            self.emit(Instruction::SetBoundsImmediate {
                destination,
                source: destination,
                length: bytes,
            });
        } else {
            self.emit(Instruction::LoadImmediate {
                destination: Register::T1,
                value: bytes,
            });
            self.emit(Instruction::SetBounds {
                destination,
                source: destination,
                length: Register::T1,
            });
        }
    }

    /// Moves `base` by a constant that may exceed the immediate range
    fn offset_capability(&mut self, destination: Register, base: Register, offset: i64) {
        if fits_immediate(offset) {
            self.emit(Instruction::OffsetCapabilityImmediate {
                destination,
                source: base,
                offset,
            });
        } else {
            self.emit(Instruction::LoadImmediate {
                destination: Register::T3,
                value: offset,
            });
            self.emit(Instruction::OffsetCapability {
                destination,
                source: base,
                offset: Register::T3,
            });
        }
    }

    fn operation(&mut self, operation: &Operation) -> Result<()> {
        match operation {
            Operation::Set(data_type, Location::Register(destination), Source::Constant(value))
                if *data_type != DataType::Cap =>
            {
                self.emit(Instruction::LoadImmediate {
                    destination: *destination,
                    value: *value,
                });
            }

            Operation::Set(data_type, into, from) => {
                let source = self.read(*data_type, from, Register::T0)?;
                self.write(*data_type, into, source);
            }

            Operation::Compute { into, lhs, op, rhs } => {
                let lhs = self.read(DataType::S32, lhs, Register::T0)?;
                let destination = Self::target(into, Register::T2);
                match rhs {
                    Source::Constant(immediate) if op.accepts_immediate(*immediate) => {
                        self.emit(Instruction::ComputeImmediate {
                            operation: *op,
                            destination,
                            lhs,
                            immediate: *immediate,
                        });
                    }
                    rhs => {
                        let rhs = self.read(DataType::S32, rhs, Register::T1)?;
                        self.emit(Instruction::Compute {
                            operation: *op,
                            destination,
                            lhs,
                            rhs,
                        });
                    }
                }
                self.write(DataType::S32, into, destination);
            }

            Operation::Load {
                data_type,
                into,
                from,
                offset,
            } => {
                let capability = self.read_location(DataType::Cap, from, Register::T0);
                let (address, offset) = self.address(capability, offset, Register::T1)?;
                let destination = Self::target(into, Register::T2);
                self.emit(Instruction::Load {
                    data_type: *data_type,
                    destination,
                    address,
                    offset,
                });
                self.write(*data_type, into, destination);
            }

            Operation::Store {
                data_type,
                into,
                offset,
                from,
            } => {
                let capability = self.read_location(DataType::Cap, into, Register::T0);
                let (address, offset) = self.address(capability, offset, Register::T2)?;
                let source = self.read(*data_type, from, Register::T1)?;
                self.emit(Instruction::Store {
                    data_type: *data_type,
                    source,
                    address,
                    offset,
                });
            }

            Operation::Allocate { into, bytes } => {
                self.emit(Instruction::LoadImmediate {
                    destination: Register::A0,
                    value: align_up(*bytes, FRAME_ALIGNMENT),
                });
                self.emit(Instruction::Call(Label::from(ALLOCATE_ROUTINE)));
                self.write(DataType::Cap, into, Register::A0);
            }

            Operation::FrameBuffer {
                into,
                offset,
                bytes,
            } => {
                let destination = Self::target(into, Register::T2);
                self.offset_capability(destination, Register::Fp, *offset);
                self.bound(destination, *bytes);
                self.write(DataType::Cap, into, destination);
            }

            Operation::CreateSeal { into } => {
                self.emit(Instruction::Call(Label::from(SEAL_ROUTINE)));
                self.write(DataType::Cap, into, Register::A0);
            }

            Operation::Seal { into, source, seal } => {
                let source = self.read_location(DataType::Cap, source, Register::T0);
                let seal = self.read_location(DataType::Cap, seal, Register::T1);
                let destination = Self::target(into, Register::T2);
                self.emit(Instruction::Seal {
                    destination,
                    source,
                    seal,
                });
                self.write(DataType::Cap, into, destination);
            }

            Operation::CodeCapability { into, procedure } => {
                let destination = Self::target(into, Register::T2);
                self.emit(Instruction::DeriveFromLabel {
                    destination,
                    label: procedure.clone(),
                });
                self.emit(Instruction::SealEntry {
                    destination,
                    source: destination,
                });
                self.write(DataType::Cap, into, destination);
            }

            Operation::PushFrame(size) => {
                self.emit(Instruction::OffsetCapabilityImmediate {
                    destination: Register::T0,
                    source: Register::Sp,
                    offset: -FRAME_LINK,
                });
                self.emit(Instruction::Store {
                    data_type: DataType::Cap,
                    source: Register::Fp,
                    address: Register::T0,
                    offset: 0,
                });
                self.copy(DataType::Cap, Register::Fp, Register::T0);
                self.offset_capability(Register::Sp, Register::Sp, -(FRAME_LINK + size));
            }

            Operation::PopFrame => {
                self.emit(Instruction::OffsetCapabilityImmediate {
                    destination: Register::Sp,
                    source: Register::Fp,
                    offset: FRAME_LINK,
                });
                self.emit(Instruction::Load {
                    data_type: DataType::Cap,
                    destination: Register::Fp,
                    address: Register::Fp,
                    offset: 0,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::config::Configuration;
    use crate::compiler::ir::types::BinaryOperator;

    fn label(s: &str) -> Label {
        Label::from(s)
    }

    fn lower(program: Program) -> (Result<rv::Program>, Vec<crate::compiler::ladder::Warning>) {
        let configuration = Configuration::default();
        let mut lowering = Lowering::new(&configuration);
        let result = program.lower(&mut lowering);
        (result, lowering.into_warnings())
    }

    fn assembly(program: &rv::Program) -> Vec<String> {
        program.instructions.iter().map(Instruction::assembly).collect()
    }

    #[test]
    fn test_fall_through_needs_no_jump() {
        let program = Program {
            entry: label("rv.main"),
            blocks: vec![
                Block {
                    label: label("b"),
                    operations: vec![Operation::Set(
                        DataType::S32,
                        Location::Register(Register::A0),
                        Source::Constant(7),
                    )],
                    continuation: Continuation::Return,
                },
                Block {
                    label: label("rv.main"),
                    operations: vec![],
                    continuation: Continuation::Continue(label("b")),
                },
            ],
        };
        let (result, warnings) = lower(program);
        assert!(warnings.is_empty());
        assert_eq!(
            assembly(&result.unwrap()),
            vec!["rv.main:", "b:", "li a0, 7", "ret.cap"]
        );
    }

    #[test]
    fn test_branch_falls_through_to_else() {
        let program = Program {
            entry: label("rv.main"),
            blocks: vec![
                Block {
                    label: label("rv.main"),
                    operations: vec![],
                    continuation: Continuation::Branch {
                        lhs: Source::Location(Location::Register(Register::A0)),
                        relation: BranchRelation::Lt,
                        rhs: Source::Constant(3),
                        then: label("t"),
                        otherwise: label("e"),
                    },
                },
                Block {
                    label: label("e"),
                    operations: vec![],
                    continuation: Continuation::Return,
                },
                Block {
                    label: label("t"),
                    operations: vec![],
                    continuation: Continuation::Return,
                },
            ],
        };
        let (result, _) = lower(program);
        assert_eq!(
            assembly(&result.unwrap()),
            vec!["rv.main:", "li t1, 3", "blt a0, t1, t", "e:", "ret.cap", "t:", "ret.cap"]
        );
    }

    #[test]
    fn test_unreachable_block_is_dropped_with_warning() {
        let program = Program {
            entry: label("rv.main"),
            blocks: vec![
                Block {
                    label: label("rv.main"),
                    operations: vec![],
                    continuation: Continuation::Return,
                },
                Block {
                    label: label("orphan"),
                    operations: vec![],
                    continuation: Continuation::Return,
                },
            ],
        };
        let (result, warnings) = lower(program);
        assert_eq!(assembly(&result.unwrap()), vec!["rv.main:", "ret.cap"]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].to_string(), "BB: block orphan is unreachable");
    }

    #[test]
    fn test_frame_operations() {
        let program = Program {
            entry: label("rv.main"),
            blocks: vec![Block {
                label: label("rv.main"),
                operations: vec![
                    Operation::PushFrame(32),
                    Operation::Compute {
                        into: Location::Frame(-4),
                        lhs: Source::Location(Location::Frame(-8)),
                        op: BinaryOperator::Add,
                        rhs: Source::Constant(1),
                    },
                    Operation::FrameBuffer {
                        into: Location::Register(Register::A1),
                        offset: -32,
                        bytes: 8,
                    },
                    Operation::PopFrame,
                ],
                continuation: Continuation::Return,
            }],
        };
        let (result, _) = lower(program);
        assert_eq!(
            assembly(&result.unwrap()),
            vec![
                "rv.main:",
                "cincoffsetimm ct0, csp, -16",
                "sc.cap cfp, 0(ct0)",
                "cmove cfp, ct0",
                "cincoffsetimm csp, csp, -48",
                "lw.cap t0, -8(cfp)",
                "addiw t2, t0, 1",
                "sw.cap t2, -4(cfp)",
                "cincoffsetimm ca1, cfp, -32",
                "csetboundsimm ca1, ca1, 8",
                "cincoffsetimm csp, cfp, 16",
                "lc.cap cfp, 0(cfp)",
                "ret.cap",
            ]
        );
    }

    #[test]
    fn test_wide_shift_amounts_use_register_form() {
        let shift = |amount| Operation::Compute {
            into: Location::Register(Register::A0),
            lhs: Source::Location(Location::Register(Register::A1)),
            op: BinaryOperator::Sll,
            rhs: Source::Constant(amount),
        };
        let program = Program {
            entry: label("rv.main"),
            blocks: vec![Block {
                label: label("rv.main"),
                operations: vec![shift(40), shift(4)],
                continuation: Continuation::Return,
            }],
        };
        let (result, _) = lower(program);
        assert_eq!(
            assembly(&result.unwrap()),
            vec![
                "rv.main:",
                "li t1, 40",
                "sllw a0, a1, t1",
                "slliw a0, a1, 4",
                "ret.cap",
            ]
        );
    }

    #[test]
    fn test_capability_constants_are_rejected() {
        let program = Program {
            entry: label("rv.main"),
            blocks: vec![Block {
                label: label("rv.main"),
                operations: vec![Operation::Set(
                    DataType::Cap,
                    Location::Register(Register::A0),
                    Source::Constant(5),
                )],
                continuation: Continuation::Return,
            }],
        };
        let (result, _) = lower(program);
        assert!(matches!(result, Err(Error::Lowering { .. })));
    }

    #[test]
    fn test_missing_entry_is_rejected() {
        let program = Program {
            entry: label("rv.main"),
            blocks: vec![],
        };
        let (result, _) = lower(program);
        assert!(matches!(result, Err(Error::MissingEntryBlock { .. })));
    }
}
