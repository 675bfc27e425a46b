//! # cheri-ladder Compiler - Expressions to CHERI-RISC-V
//!
//! This module lowers programs down a ladder of intermediate languages to CHERI-RISC-V assembly
//! and hands the assembly to the CHERI toolchain.
//!
//! ## Architecture
//!
//! ```text
//! EX → DF → SV → CC → CD → PR → BB → RV → S → clang → ELF
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use cheri_ladder::compiler::{Compiler, Configuration, Level};
//!
//! let source = std::fs::read_to_string("sum.ex")?;
//! let compiler = Compiler::new(Configuration::default());
//! let result = compiler.compile(Level::EX, &source)?;
//! std::fs::write("sum.elf", result.elf_bytes)?;
//! ```

pub mod capability;
pub mod config;
pub mod convention;
pub mod debug;
pub mod effect;
pub mod frame;
pub mod ir;
pub mod ladder;
pub mod names;
pub mod scope;
pub mod toolchain;
pub mod verifier;

pub use config::{Configuration, Target};
pub use debug::{dump, Dump};
pub use ladder::{reduce, representations, Language, Level, Lower, Lowering, Reductor, Warning};
pub use names::NameAllocator;
pub use toolchain::Toolchain;
pub use verifier::{Verifier, VerifyError, VerifyResult};

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Compilation result with metadata
#[derive(Debug)]
pub struct CompileResult {
    /// ELF executable bytes
    pub elf_bytes: Vec<u8>,
    /// Assembly handed to the toolchain
    pub assembly: String,
    /// Warnings generated during lowering
    pub warnings: Vec<Warning>,
}

/// Ladder compiler
pub struct Compiler {
    configuration: Configuration,
}

impl Compiler {
    /// Create a new compiler with a configuration
    pub fn new(configuration: Configuration) -> Self {
        Self { configuration }
    }

    /// The compiler's configuration
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Lower program text at `level` to assembly and link it into an executable
    pub fn compile(&self, level: Level, text: &str) -> Result<CompileResult> {
        let (assembly, warnings) = self.assemble(level, text)?;
        let elf_bytes = ir::s::Program {
            assembly: assembly.clone(),
        }
        .elf(&self.configuration)?;
        Ok(CompileResult {
            elf_bytes,
            assembly,
            warnings,
        })
    }

    /// Lower program text at `level` to assembly, without invoking the toolchain
    pub fn assemble(&self, level: Level, text: &str) -> Result<(String, Vec<Warning>)> {
        self.lower_to(level, text, Level::S)
    }

    /// Lower program text at `level` to the text form of `target`
    pub fn lower_to(&self, level: Level, text: &str, target: Level) -> Result<(String, Vec<Warning>)> {
        let (mut collected, warnings) = self.representations(level, text, [target])?;
        let program = collected.remove(&target).ok_or_else(|| {
            Error::lowering(
                level,
                format!("{} program", level),
                format!("the descent ended before reaching {}", target),
            )
        })?;
        Ok((program, warnings))
    }

    /// Lower program text at `level` to the text form of every level in `targets`
    pub fn representations(
        &self,
        level: Level,
        text: &str,
        targets: impl IntoIterator<Item = Level>,
    ) -> Result<(BTreeMap<Level, String>, Vec<Warning>)> {
        representations(level, text, targets, &self.configuration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiler_creation() {
        let compiler = Compiler::new(Configuration::default());
        assert!(compiler.configuration().optimise);
        assert_eq!(compiler.configuration().target, Target::Simulator);
    }

    #[test]
    fn test_lower_to_intermediate_level() {
        let compiler = Compiler::new(Configuration::default());
        let (text, _) = compiler
            .lower_to(Level::DF, "(body: return(5), procedures: [])", Level::SV)
            .unwrap();
        let program = ir::sv::Program::decode(&text).unwrap();
        assert_eq!(
            program.body,
            ir::sv::Effect::Return(ir::source::Source::Constant(5))
        );
    }

    #[test]
    fn test_assemble_defines_main() {
        let compiler = Compiler::new(Configuration::default());
        let (assembly, warnings) = compiler
            .assemble(Level::EX, "(body: return(source(0)), procedures: [])")
            .unwrap();
        assert!(warnings.is_empty());
        assert!(assembly.contains("rv.main:"));
        assert!(assembly.contains("_start:"));
    }
}
