//! # Block Program Verifier
//!
//! Checks the control-flow invariants of a BB program before it is linearised: the entry block
//! exists, labels are unique, and every continuation and code capability names a defined block.
//! Blocks that cannot be reached from the entry are reported, not rejected.

use super::ir::bb::{Block, Continuation, Program};
use super::ir::physical::Operation;
use super::ir::types::Label;
use super::ladder::Level;
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet, VecDeque};

/// Verification result
#[derive(Debug)]
pub struct VerifyResult {
    /// Program satisfies every invariant
    pub valid: bool,
    /// Violated invariants
    pub errors: Vec<VerifyError>,
    /// Blocks not reachable from the entry, in program order
    pub unreachable: Vec<Label>,
}

impl VerifyResult {
    /// The first violation as a compilation error, if any
    pub fn into_result(self) -> Result<Self> {
        match self.errors.first() {
            Some(error) => Err(error.clone().into()),
            None => Ok(self),
        }
    }
}

/// Verification error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// No block carries the entry label
    MissingEntryBlock {
        /// Entry label
        label: Label,
    },

    /// A label is carried by more than one block
    DuplicateLabel {
        /// Duplicated label
        label: Label,
    },

    /// A continuation or code capability names a label no block carries
    UndefinedLabel {
        /// Block referring to the label
        block: Label,
        /// Missing label
        label: Label,
    },
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::MissingEntryBlock { label } => {
                write!(f, "No entry block labelled {}", label)
            }
            VerifyError::DuplicateLabel { label } => {
                write!(f, "Label {} is defined more than once", label)
            }
            VerifyError::UndefinedLabel { block, label } => {
                write!(f, "Block {} refers to undefined label {}", block, label)
            }
        }
    }
}

impl From<VerifyError> for Error {
    fn from(error: VerifyError) -> Self {
        match error {
            VerifyError::MissingEntryBlock { label } => Error::MissingEntryBlock {
                level: Level::BB,
                label: label.to_string(),
            },
            VerifyError::DuplicateLabel { label } => Error::DuplicateLabel {
                level: Level::BB,
                label: label.to_string(),
            },
            VerifyError::UndefinedLabel { label, .. } => Error::UndefinedLabel {
                level: Level::BB,
                label: label.to_string(),
            },
        }
    }
}

/// Labels a block may transfer control to, including procedures it calls
fn successors(block: &Block) -> Vec<&Label> {
    let mut successors = match &block.continuation {
        Continuation::Continue(target) => vec![target],
        Continuation::Branch {
            then, otherwise, ..
        } => vec![then, otherwise],
        Continuation::Call {
            procedure,
            returning_to,
        } => vec![procedure, returning_to],
        Continuation::Return => vec![],
    };
    successors.extend(block.operations.iter().filter_map(|operation| match operation {
        Operation::CodeCapability { procedure, .. } => Some(procedure),
        _ => None,
    }));
    successors
}

/// BB program verifier
#[derive(Debug, Default)]
pub struct Verifier;

impl Verifier {
    /// Creates a verifier; unreachable blocks are reported, not rejected
    pub fn new() -> Self {
        Self
    }

    /// Verify a program
    pub fn verify(&self, program: &Program) -> VerifyResult {
        let mut errors = Vec::new();

        let mut blocks: HashMap<&Label, &Block> = HashMap::new();
        for block in &program.blocks {
            if blocks.insert(&block.label, block).is_some() {
                errors.push(VerifyError::DuplicateLabel {
                    label: block.label.clone(),
                });
            }
        }

        for block in &program.blocks {
            for label in successors(block) {
                if !blocks.contains_key(label) {
                    errors.push(VerifyError::UndefinedLabel {
                        block: block.label.clone(),
                        label: label.clone(),
                    });
                }
            }
        }

        // Reachability from the entry
        let mut reached: HashSet<&Label> = HashSet::new();
        if blocks.contains_key(&program.entry) {
            let mut queue = VecDeque::from([&program.entry]);
            reached.insert(&program.entry);
            while let Some(label) = queue.pop_front() {
                let Some(block) = blocks.get(label) else {
                    continue;
                };
                for successor in successors(block) {
                    if reached.insert(successor) {
                        queue.push_back(successor);
                    }
                }
            }
        } else {
            errors.push(VerifyError::MissingEntryBlock {
                label: program.entry.clone(),
            });
        }

        let unreachable: Vec<Label> = program
            .blocks
            .iter()
            .filter(|block| !reached.contains(&block.label))
            .map(|block| block.label.clone())
            .collect();

        VerifyResult {
            valid: errors.is_empty(),
            errors,
            unreachable,
        }
    }

    /// Verify a program, failing on its first violation
    pub fn check(&self, program: &Program) -> Result<VerifyResult> {
        self.verify(program).into_result()
    }
}
