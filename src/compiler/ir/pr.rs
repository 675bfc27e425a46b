//! # PR: Predicates
//!
//! Basic blocks whose branches are taken on a [`Predicate`]. Lowering to [`bb`] reduces every
//! predicate to a primitive relational branch or an unconditional continuation:
//!
//! 1. `constant(false)` continues to the else label;
//! 2. `constant(true)` continues to the then label;
//! 3. `not(p)` swaps the labels and lowers `p`;
//! 4. `relation(l, r, r')` branches on `l r r'`.

use super::bb;
use super::physical::{Operation, Source};
use super::source::Predicate;
use super::types::Label;
use crate::compiler::ladder::{descend_through, Language, Level, Lower, Lowering, Reductor};
use crate::error::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A PR program
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
    /// Continues in `then` if the condition holds, in `else` otherwise
    Branch {
        /// The condition
        condition: Predicate<Source>,
        /// Block taken when the condition holds
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

/// Folds predicates whose outcome is known without running the program
pub fn fold(predicate: Predicate<Source>) -> Predicate<Source> {
    match predicate {
        Predicate::Relation(Source::Constant(lhs), relation, Source::Constant(rhs)) => {
            Predicate::Constant(relation.holds(lhs, rhs))
        }
        Predicate::Relation(Source::Location(lhs), relation, Source::Location(rhs))
            if lhs == rhs =>
        {
            Predicate::Constant(relation.is_reflexive())
        }
        Predicate::Not(negated) => match fold(*negated) {
            Predicate::Constant(holds) => Predicate::Constant(!holds),
            negated => Predicate::Not(Box::new(negated)),
        },
        predicate => predicate,
    }
}

/// Lowers a branch on `condition` to a primitive continuation
pub fn lower_branch(condition: Predicate<Source>, then: Label, otherwise: Label) -> bb::Continuation {
    match condition {
        Predicate::Constant(false) => bb::Continuation::Continue(otherwise),
        Predicate::Constant(true) => bb::Continuation::Continue(then),
        Predicate::Not(negated) => lower_branch(*negated, otherwise, then),
        Predicate::Relation(lhs, relation, rhs) => bb::Continuation::Branch {
            lhs,
            relation,
            rhs,
            then,
            otherwise,
        },
    }
}

impl Language for Program {
    const LEVEL: Level = Level::PR;

    fn optimise(mut self) -> Self {
        for block in &mut self.blocks {
            if let Continuation::Branch { condition, .. } = &mut block.continuation {
                *condition = fold(condition.clone());
            }
        }
        self
    }

    fn descend<R: Reductor>(self, lowering: &mut Lowering, reductor: &mut R) -> Result<()> {
        descend_through(self, lowering, reductor)
    }
}

impl Lower for Program {
    type Target = bb::Program;

    fn lower(self, _lowering: &mut Lowering) -> Result<bb::Program> {
        let blocks = self
            .blocks
            .into_par_iter()
            .map(|block| bb::Block {
                label: block.label,
                operations: block.operations,
                continuation: match block.continuation {
                    Continuation::Continue(target) => bb::Continuation::Continue(target),
                    Continuation::Branch {
                        condition,
                        then,
                        otherwise,
                    } => lower_branch(condition, then, otherwise),
                    Continuation::Call {
                        procedure,
                        returning_to,
                    } => bb::Continuation::Call {
                        procedure,
                        returning_to,
                    },
                    Continuation::Return => bb::Continuation::Return,
                },
            })
            .collect();
        Ok(bb::Program {
            entry: self.entry,
            blocks,
        })
    }
}
