//! Operands and predicates shared by the levels above the physical ones

use super::types::{BranchRelation, Name};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A constant or an abstract location, written `42` or `x`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    /// Integer constant
    Constant(i64),
    /// Abstract location
    Location(Name),
}

impl Source {
    /// The referenced location, if any
    pub fn location(&self) -> Option<&Name> {
        match self {
            Source::Constant(_) => None,
            Source::Location(name) => Some(name),
        }
    }
}

impl From<i64> for Source {
    fn from(value: i64) -> Self {
        Source::Constant(value)
    }
}

impl From<&str> for Source {
    fn from(name: &str) -> Self {
        Source::Location(Name::from(name))
    }
}

impl From<Name> for Source {
    fn from(name: Name) -> Self {
        Source::Location(name)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Constant(value) => write!(f, "{}", value),
            Source::Location(name) => write!(f, "{}", name),
        }
    }
}

/// A condition over operands of type `S`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Predicate<S> {
    /// Always or never holds
    Constant(bool),
    /// Holds if the relation holds between both operands
    Relation(S, BranchRelation, S),
    /// Holds if the negated predicate does not
    Not(Box<Predicate<S>>),
}

impl<S> Predicate<S> {
    /// Maps every operand through `f`, stopping at the first failure
    pub fn try_map<T, E>(self, f: &mut impl FnMut(S) -> Result<T, E>) -> Result<Predicate<T>, E> {
        Ok(match self {
            Predicate::Constant(holds) => Predicate::Constant(holds),
            Predicate::Relation(lhs, relation, rhs) => Predicate::Relation(f(lhs)?, relation, f(rhs)?),
            Predicate::Not(negated) => Predicate::Not(Box::new(negated.try_map(f)?)),
        })
    }

    /// The operands, in order of appearance
    pub fn operands(&self) -> Vec<&S> {
        match self {
            Predicate::Constant(_) => vec![],
            Predicate::Relation(lhs, _, rhs) => vec![lhs, rhs],
            Predicate::Not(negated) => negated.operands(),
        }
    }
}

impl Predicate<Source> {
    /// Locations read by the predicate
    pub fn locations(&self) -> BTreeSet<&Name> {
        self.operands()
            .into_iter()
            .filter_map(Source::location)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_map_preserves_shape() {
        let predicate = Predicate::Not(Box::new(Predicate::Relation(
            Source::from("x"),
            BranchRelation::Lt,
            Source::from(3),
        )));
        let mapped: Result<Predicate<String>, ()> =
            predicate.clone().try_map(&mut |s| Ok(s.to_string()));
        assert_eq!(
            mapped,
            Ok(Predicate::Not(Box::new(Predicate::Relation(
                "x".to_string(),
                BranchRelation::Lt,
                "3".to_string()
            ))))
        );
        assert_eq!(predicate.locations().len(), 1);
    }

    #[test]
    fn test_source_serialization_is_untagged() {
        assert_eq!(serde_json::to_value(Source::from(4)).unwrap(), serde_json::json!(4));
        assert_eq!(serde_json::to_value(Source::from("y")).unwrap(), serde_json::json!("y"));
    }
}
