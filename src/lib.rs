//! # cheri-ladder - A Capability Compiler for CHERI-RISC-V
//!
//! An ahead-of-time compiler that lowers programs written in a small language of nested
//! expressions and effects, through a ladder of intermediate languages, down to CHERI-RISC-V
//! assembly. Records, vectors, seals and code are reached through bounded capabilities, and the
//! CHERI toolchain links the result into an executable for the Sail simulator or CheriBSD.
//!
//! ## Features
//!
//! - **Nine-rung ladder** - every intermediate program can be printed, parsed and lowered on its own
//! - **Capability-safe buffers** - records and vectors live behind bounded capabilities
//! - **Sealing** - seal capabilities and sealed code capabilities as closure building blocks
//! - **Configurable calling convention** - any list of argument registers, with overflow records
//!
//! ## Quick Start
//!
//! Lower a program to assembly:
//!
//! ```rust
//! use cheri_ladder::compiler::{Compiler, Configuration, Level};
//!
//! # fn main() -> cheri_ladder::Result<()> {
//! let program = "(body: return(binary(source(20), add, source(22))), procedures: [])";
//!
//! let compiler = Compiler::new(Configuration::default());
//! let (assembly, warnings) = compiler.assemble(Level::EX, program)?;
//!
//! assert!(assembly.contains("rv.main:"));
//! assert!(warnings.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! ### Inspecting Intermediate Programs
//!
//! ```rust
//! use cheri_ladder::compiler::{representations, Configuration, Level};
//!
//! # fn main() -> cheri_ladder::Result<()> {
//! let program = "(body: return(source(7)), procedures: [])";
//! let (texts, _) = representations(
//!     Level::EX,
//!     program,
//!     [Level::CC, Level::BB],
//!     &Configuration::default(),
//! )?;
//!
//! assert!(texts.contains_key(&Level::CC));
//! assert!(texts.contains_key(&Level::BB));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Text → Scanner → Tokens → Parser → serde value → Program(level)
//!      → validate → lower → ... → S (assembly) → clang → ELF
//! ```
//!
//! ### Main Components
//!
//! - [`lexer`] - Tokenizes program text
//! - [`parser`] - Decodes and encodes programs at any level
//! - [`compiler::ladder`] - The level protocol and the descent driver
//! - [`compiler::ir`] - One module per level
//! - [`compiler::Toolchain`] - Bridge to the CHERI SDK
//!
//! ## License
//!
//! Licensed under the [MIT License](https://opensource.org/licenses/MIT).

#![allow(clippy::large_enum_variant)] // Effect trees are built once and consumed

/// Version of the compiler
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;

// Re-export main types
pub use compiler::{CompileResult, Compiler, Configuration, Level, Target, Warning};
pub use error::{Error, ErrorCategory, Result};
pub use lexer::{SispScanner, Token, TokenKind};
pub use parser::{SispParser, SispPrinter};

/// Type alias for the Sisp scanner (lexer).
/// Converts program text into tokens for the parser.
pub type Scanner = SispScanner;

/// Type alias for the Sisp parser.
/// Converts tokens into a value tree that each level deserializes.
pub type Parser = SispParser;
