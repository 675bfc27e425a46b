//! Declaration tracking over a stack of lexical scopes

use super::ir::register::Register;
use super::ir::types::Name;
use super::ladder::Level;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt::Display;

/// Where a declared location lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    /// Not yet assigned a physical home
    Symbolic,
    /// Held in a register
    Register(Register),
    /// Held in a frame slot at the given offset
    Frame(i64),
}

/// A declared location
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration<T> {
    /// The declared type
    pub value_type: T,
    /// The location's home
    pub residency: Residency,
}

/// Declarations of one lowering pass, organised as a stack of scopes
///
/// The bottom scope is never popped. A name is visible while the scope declaring it is on the
/// stack; popping a scope returns its declarations so that the caller can release their homes.
#[derive(Debug)]
pub struct Declarations<T> {
    level: Level,
    scopes: Vec<HashMap<Name, Declaration<T>>>,
}

impl<T: Clone + PartialEq + Display> Declarations<T> {
    /// Creates a tracker with one scope, for reporting errors at `level`
    pub fn new(level: Level) -> Self {
        Self {
            level,
            scopes: vec![HashMap::new()],
        }
    }

    /// Number of open scopes
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Opens a scope
    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Closes the innermost scope, returning what it declared
    pub fn pop(&mut self) -> Result<Vec<(Name, Declaration<T>)>> {
        if self.scopes.len() <= 1 {
            return Err(Error::validation(
                self.level,
                "popScope without a matching pushScope",
            ));
        }
        let scope = self.scopes.pop().unwrap_or_default();
        let mut released: Vec<(Name, Declaration<T>)> = scope.into_iter().collect();
        released.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(released)
    }

    /// Declares `name` with a symbolic home, or confirms an earlier declaration of the same type
    pub fn declare(&mut self, name: &Name, value_type: T) -> Result<&Declaration<T>> {
        self.declare_at(name, value_type, Residency::Symbolic)
    }

    /// Declares `name` with the given home, or confirms an earlier declaration of the same type
    ///
    /// An earlier declaration keeps its home. Declaring with a different type fails.
    pub fn declare_at(
        &mut self,
        name: &Name,
        value_type: T,
        residency: Residency,
    ) -> Result<&Declaration<T>> {
        let level = self.level;
        let existing = self.scopes.iter().rposition(|s| s.contains_key(name));
        let index = match existing {
            Some(index) => index,
            None => {
                let innermost = self.scopes.len() - 1;
                self.scopes[innermost].insert(
                    name.clone(),
                    Declaration {
                        value_type: value_type.clone(),
                        residency,
                    },
                );
                innermost
            }
        };

        let declaration = &self.scopes[index][name];
        if declaration.value_type != value_type {
            return Err(Error::InconsistentTyping {
                level,
                location: name.to_string(),
                declared: declaration.value_type.to_string(),
                requested: value_type.to_string(),
            });
        }
        Ok(declaration)
    }

    /// Looks up the declaration of `name` in the active scopes
    pub fn lookup(&self, name: &Name) -> Result<&Declaration<T>> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .ok_or_else(|| Error::UndeclaredLocation {
                level: self.level,
                location: name.to_string(),
            })
    }

    /// Whether `name` is declared in an active scope
    pub fn is_declared(&self, name: &Name) -> bool {
        self.scopes.iter().any(|s| s.contains_key(name))
    }

    /// Requires `name` to be declared with `value_type`
    pub fn require(&self, name: &Name, value_type: &T) -> Result<&Declaration<T>> {
        let declaration = self.lookup(name)?;
        if &declaration.value_type != value_type {
            return Err(Error::InconsistentTyping {
                level: self.level,
                location: name.to_string(),
                declared: declaration.value_type.to_string(),
                requested: value_type.to_string(),
            });
        }
        Ok(declaration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::types::DataType;

    fn name(s: &str) -> Name {
        Name::from(s)
    }

    #[test]
    fn test_redeclaration_is_idempotent() {
        let mut declarations = Declarations::new(Level::CC);
        declarations
            .declare_at(&name("x"), DataType::S32, Residency::Frame(-4))
            .unwrap();
        let again = declarations
            .declare_at(&name("x"), DataType::S32, Residency::Frame(-8))
            .unwrap();
        assert_eq!(again.residency, Residency::Frame(-4));
    }

    #[test]
    fn test_conflicting_type_is_rejected() {
        let mut declarations = Declarations::new(Level::CC);
        declarations.declare(&name("x"), DataType::S32).unwrap();
        assert!(matches!(
            declarations.declare(&name("x"), DataType::Cap),
            Err(Error::InconsistentTyping { .. })
        ));
    }

    #[test]
    fn test_pop_releases_inner_declarations() {
        let mut declarations = Declarations::new(Level::SV);
        declarations.declare(&name("outer"), DataType::U8).unwrap();
        declarations.push();
        declarations.declare(&name("inner"), DataType::S32).unwrap();
        assert!(declarations.lookup(&name("outer")).is_ok());

        let released = declarations.pop().unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].0, name("inner"));
        assert!(matches!(
            declarations.lookup(&name("inner")),
            Err(Error::UndeclaredLocation { .. })
        ));
        assert!(declarations.lookup(&name("outer")).is_ok());
    }

    #[test]
    fn test_bottom_scope_cannot_be_popped() {
        let mut declarations: Declarations<DataType> = Declarations::new(Level::CC);
        assert!(declarations.pop().is_err());
    }
}
