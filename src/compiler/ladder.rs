//! # The IR ladder
//!
//! Every intermediate language is a rung on a ladder that ends at assembly text. A rung's
//! program type implements [`Language`]; every rung but the ground one also implements [`Lower`]
//! into the rung below it.
//!
//! ```text
//! EX → DF → SV → CC → CD → PR → BB → RV → S
//! ```
//!
//! Descending the ladder runs, per rung, optimisation and validation (when enabled), then hands
//! the program to a [`Reductor`] before lowering it. Reductors see every intermediate program
//! and may stop the descent; they are how tooling and golden tests observe a compilation.
//! Dispatch over rungs is static: [`reduce`] matches on the source [`Level`] once and the rest of
//! the descent is monomorphised.

use super::config::Configuration;
use super::ir::{bb, cc, cd, df, ex, pr, rv, s, sv};
use super::names::NameAllocator;
use crate::error::{Error, Result};
use crate::parser;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Debug};
use std::ops::ControlFlow;
use std::path::Path;

/// A rung of the ladder, ordered from the ground up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    /// Assembly text, the ground level
    S,
    /// CHERI-RISC-V instructions
    RV,
    /// Basic blocks with primitive continuations
    BB,
    /// Basic blocks branching on predicates
    PR,
    /// Structured conditionals over physical locations
    CD,
    /// Abstract locations under the calling convention
    CC,
    /// Typed capabilities to records and vectors
    SV,
    /// Definitions introducing names
    DF,
    /// Nested expressions, the compiler's input level
    EX,
}

impl Level {
    /// Every level, highest first
    pub const ALL: [Level; 9] = [
        Level::EX,
        Level::DF,
        Level::SV,
        Level::CC,
        Level::CD,
        Level::PR,
        Level::BB,
        Level::RV,
        Level::S,
    ];

    /// Position on the ladder; the ground level is 0
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// The level programs at this level lower to
    pub fn lower(self) -> Option<Level> {
        match self {
            Level::S => None,
            Level::RV => Some(Level::S),
            Level::BB => Some(Level::RV),
            Level::PR => Some(Level::BB),
            Level::CD => Some(Level::PR),
            Level::CC => Some(Level::CD),
            Level::SV => Some(Level::CC),
            Level::DF => Some(Level::SV),
            Level::EX => Some(Level::DF),
        }
    }

    /// Two-letter code, e.g. `CC`
    pub fn code(self) -> &'static str {
        match self {
            Level::S => "S",
            Level::RV => "RV",
            Level::BB => "BB",
            Level::PR => "PR",
            Level::CD => "CD",
            Level::CC => "CC",
            Level::SV => "SV",
            Level::DF => "DF",
            Level::EX => "EX",
        }
    }

    /// Descriptive name
    pub fn name(self) -> &'static str {
        match self {
            Level::S => "Assembly",
            Level::RV => "CHERI-RISC-V",
            Level::BB => "Basic Blocks",
            Level::PR => "Predicates",
            Level::CD => "Conditionals",
            Level::CC => "Calling Convention",
            Level::SV => "Structured Values",
            Level::DF => "Definitions",
            Level::EX => "Expressions",
        }
    }

    /// Parses a level code, ignoring case
    pub fn from_code(code: &str) -> Option<Level> {
        Level::ALL
            .iter()
            .copied()
            .find(|level| level.code().eq_ignore_ascii_case(code))
    }

    /// The level selected by a file's extension, e.g. `sum.ex`
    pub fn from_extension(path: &Path) -> Option<Level> {
        path.extension()
            .and_then(|extension| extension.to_str())
            .and_then(Level::from_code)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A non-fatal finding, e.g. an unreachable block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Level at which the finding was made
    pub level: Level,
    /// Description
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.level, self.message)
    }
}

/// State of one descent down the ladder
///
/// Holds the run's configuration, its single name allocator and the warnings found so far.
/// Each pass builds its own context on top of this and discards it when done.
pub struct Lowering<'a> {
    /// Configuration of the run
    pub configuration: &'a Configuration,
    /// The run's name allocator
    pub names: NameAllocator,
    warnings: Vec<Warning>,
}

impl<'a> Lowering<'a> {
    /// Starts a run
    pub fn new(configuration: &'a Configuration) -> Self {
        Self {
            configuration,
            names: NameAllocator::new(),
            warnings: Vec::new(),
        }
    }

    /// Records a warning
    pub fn warn(&mut self, level: Level, message: impl Into<String>) {
        let warning = Warning {
            level,
            message: message.into(),
        };
        tracing::warn!(level = %warning.level, "{}", warning.message);
        self.warnings.push(warning);
    }

    /// Warnings recorded so far
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Ends the run, returning its warnings
    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// A program at some rung of the ladder
pub trait Language: Sized + Clone + Debug + PartialEq + Serialize + DeserializeOwned {
    /// The rung
    const LEVEL: Level;

    /// Checks the invariants of the level, recording warnings for non-fatal findings
    fn validate(&self, _lowering: &mut Lowering) -> Result<()> {
        Ok(())
    }

    /// Applies semantics-preserving simplifications
    fn optimise(self) -> Self {
        self
    }

    /// Decodes a program from its text form
    fn decode(text: &str) -> Result<Self> {
        parser::decode(Self::LEVEL, text)
    }

    /// Encodes the program in its text form
    fn encode(&self) -> Result<String> {
        parser::encode(Self::LEVEL, self)
    }

    /// Processes the program at this rung and descends through the rungs below
    fn descend<R: Reductor>(self, lowering: &mut Lowering, reductor: &mut R) -> Result<()>;
}

/// A program that can be lowered to the next rung
pub trait Lower: Language {
    /// The program type of the rung below
    type Target: Language;

    /// Lowers the program, consuming it
    fn lower(self, lowering: &mut Lowering) -> Result<Self::Target>;
}

/// Observer of every program produced while descending the ladder
pub trait Reductor {
    /// Observes a program; `Break` ends the descent
    fn update<L: Language>(&mut self, program: &L) -> Result<ControlFlow<()>>;
}

/// Optimises, validates and reports `program`; `None` if the reductor ended the descent
pub fn visit<L: Language, R: Reductor>(
    program: L,
    lowering: &mut Lowering,
    reductor: &mut R,
) -> Result<Option<L>> {
    let program = if lowering.configuration.optimise {
        program.optimise()
    } else {
        program
    };
    if lowering.configuration.validate {
        program.validate(lowering)?;
    }
    match reductor.update(&program)? {
        ControlFlow::Continue(()) => Ok(Some(program)),
        ControlFlow::Break(()) => Ok(None),
    }
}

/// Visits `program`, lowers it and continues the descent from the rung below
pub fn descend_through<L: Lower, R: Reductor>(
    program: L,
    lowering: &mut Lowering,
    reductor: &mut R,
) -> Result<()> {
    let Some(program) = visit(program, lowering, reductor)? else {
        return Ok(());
    };
    tracing::debug!(from = %L::LEVEL, to = %<L::Target as Language>::LEVEL, "lowering");
    program.lower(lowering)?.descend(lowering, reductor)
}

/// Decodes `text` as a program at `level` and descends the ladder from there
pub fn reduce<R: Reductor>(
    level: Level,
    text: &str,
    lowering: &mut Lowering,
    reductor: &mut R,
) -> Result<()> {
    match level {
        Level::EX => ex::Program::decode(text)?.descend(lowering, reductor),
        Level::DF => df::Program::decode(text)?.descend(lowering, reductor),
        Level::SV => sv::Program::decode(text)?.descend(lowering, reductor),
        Level::CC => cc::Program::decode(text)?.descend(lowering, reductor),
        Level::CD => cd::Program::decode(text)?.descend(lowering, reductor),
        Level::PR => pr::Program::decode(text)?.descend(lowering, reductor),
        Level::BB => bb::Program::decode(text)?.descend(lowering, reductor),
        Level::RV => rv::Program::decode(text)?.descend(lowering, reductor),
        Level::S => s::Program::decode(text)?.descend(lowering, reductor),
    }
}

/// Collects the text form of the program at each requested level
///
/// The descent stops once the lowest requested level has been collected.
#[derive(Debug, Clone, Default)]
pub struct Representations {
    targets: BTreeSet<Level>,
    collected: BTreeMap<Level, String>,
}

impl Representations {
    /// Collects the given levels
    pub fn new(targets: impl IntoIterator<Item = Level>) -> Self {
        Self {
            targets: targets.into_iter().collect(),
            collected: BTreeMap::new(),
        }
    }

    /// The text collected for `level`, if it was reached
    pub fn get(&self, level: Level) -> Option<&str> {
        self.collected.get(&level).map(String::as_str)
    }

    /// All collected texts, by level
    pub fn into_map(self) -> BTreeMap<Level, String> {
        self.collected
    }
}

impl Reductor for Representations {
    fn update<L: Language>(&mut self, program: &L) -> Result<ControlFlow<()>> {
        if self.targets.contains(&L::LEVEL) {
            self.collected.insert(L::LEVEL, program.encode()?);
        }
        match self.targets.iter().next() {
            Some(lowest) if *lowest < L::LEVEL => Ok(ControlFlow::Continue(())),
            _ => Ok(ControlFlow::Break(())),
        }
    }
}

/// Lowers program text from `source` to each level in `targets`
pub fn representations(
    source: Level,
    text: &str,
    targets: impl IntoIterator<Item = Level>,
    configuration: &Configuration,
) -> Result<(BTreeMap<Level, String>, Vec<Warning>)> {
    let mut collector = Representations::new(targets);
    if let Some(unreachable) = collector.targets.iter().find(|t| **t > source) {
        return Err(Error::lowering(
            source,
            format!("{} program", source),
            format!("{} is above {} on the ladder", unreachable, source),
        ));
    }
    let mut lowering = Lowering::new(configuration);
    reduce(source, text, &mut lowering, &mut collector)?;
    Ok((collector.into_map(), lowering.into_warnings()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_order() {
        assert!(Level::EX > Level::DF);
        assert!(Level::RV > Level::S);
        assert_eq!(Level::EX.ordinal(), 8);
        assert_eq!(Level::S.lower(), None);

        let mut level = Level::EX;
        let mut steps = 0;
        while let Some(lower) = level.lower() {
            assert_eq!(lower.ordinal() + 1, level.ordinal());
            level = lower;
            steps += 1;
        }
        assert_eq!(steps, 8);
    }

    #[test]
    fn test_codes() {
        assert_eq!(Level::from_code("cc"), Some(Level::CC));
        assert_eq!(Level::from_code("XX"), None);
        assert_eq!(Level::from_extension(Path::new("sum.ex")), Some(Level::EX));
        assert_eq!(Level::from_extension(Path::new("Makefile")), None);
    }

    #[test]
    fn test_representations_reject_higher_levels() {
        let configuration = Configuration::default();
        let result = representations(Level::CC, "", [Level::EX], &configuration);
        assert!(matches!(result, Err(Error::Lowering { .. })));
    }

    #[test]
    fn test_warnings_are_recorded() {
        let configuration = Configuration::default();
        let mut lowering = Lowering::new(&configuration);
        lowering.warn(Level::BB, "block b is unreachable");
        assert_eq!(lowering.warnings()[0].to_string(), "BB: block b is unreachable");
    }
}
