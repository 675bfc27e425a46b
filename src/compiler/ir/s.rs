//! # S: Assembly
//!
//! The ground level: assembly text, ready for the CHERI toolchain. The text form of an S
//! program is the assembly itself.

use crate::compiler::config::Configuration;
use crate::compiler::ladder::{visit, Language, Level, Lowering, Reductor};
use crate::compiler::toolchain::Toolchain;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// An S program
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Program {
    /// Assembly text
    pub assembly: String,
}

impl Program {
    /// Assembles and links the program into an ELF executable
    pub fn elf(&self, configuration: &Configuration) -> Result<Vec<u8>> {
        Toolchain::new(configuration).link(&self.assembly)
    }
}

impl Language for Program {
    const LEVEL: Level = Level::S;

    fn decode(text: &str) -> Result<Self> {
        Ok(Self {
            assembly: text.to_string(),
        })
    }

    fn encode(&self) -> Result<String> {
        Ok(self.assembly.clone())
    }

    fn descend<R: Reductor>(self, lowering: &mut Lowering, reductor: &mut R) -> Result<()> {
        visit(self, lowering, reductor).map(|_| ())
    }
}
