//! Debug utilities for inspecting a descent down the ladder

use super::config::Configuration;
use super::ladder::{reduce, Language, Level, Lowering, Reductor, Warning};
use crate::error::Result;
use std::fmt::Write;
use std::ops::ControlFlow;

const HEAVY_RULE: &str = "═══════════════════════════════════════════════════════════";
const LIGHT_RULE: &str = "───────────────────────────────────────────────────────────";

/// Reductor rendering every program it sees under a banner naming its level
#[derive(Debug, Clone, Default)]
pub struct Dump {
    output: String,
    stop: Option<Level>,
    levels: usize,
}

impl Dump {
    /// Dumps every level down to the ground
    pub fn new() -> Self {
        Self::default()
    }

    /// Dumps levels down to and including `stop`
    pub fn until(stop: Level) -> Self {
        Self {
            stop: Some(stop),
            ..Self::default()
        }
    }

    /// Number of levels dumped so far
    pub fn levels(&self) -> usize {
        self.levels
    }

    /// The rendered dump
    pub fn into_string(self) -> String {
        self.output
    }

    fn banner(&mut self, level: Level) -> std::fmt::Result {
        writeln!(self.output, "{}", HEAVY_RULE)?;
        writeln!(self.output, "  {} ({})", level.name(), level.code())?;
        writeln!(self.output, "{}", LIGHT_RULE)
    }
}

impl Reductor for Dump {
    fn update<L: Language>(&mut self, program: &L) -> Result<ControlFlow<()>> {
        let text = program.encode()?;
        self.banner(L::LEVEL).map_err(format_error)?;
        writeln!(self.output, "{}", text.trim_end()).map_err(format_error)?;
        self.levels += 1;
        if self.stop == Some(L::LEVEL) {
            writeln!(self.output, "{}", HEAVY_RULE).map_err(format_error)?;
            return Ok(ControlFlow::Break(()));
        }
        if L::LEVEL == Level::S {
            writeln!(self.output, "{}", HEAVY_RULE).map_err(format_error)?;
        }
        Ok(ControlFlow::Continue(()))
    }
}

fn format_error(error: std::fmt::Error) -> crate::error::Error {
    crate::error::Error::Io(error.to_string())
}

/// Lowers `text` from `level` and renders every intermediate program, with the run's warnings
pub fn dump(
    level: Level,
    text: &str,
    stop: Option<Level>,
    configuration: &Configuration,
) -> Result<(String, Vec<Warning>)> {
    let mut dump = stop.map(Dump::until).unwrap_or_default();
    let mut lowering = Lowering::new(configuration);
    reduce(level, text, &mut lowering, &mut dump)?;
    tracing::debug!(levels = dump.levels(), "dumped descent");
    Ok((dump.into_string(), lowering.into_warnings()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_stops_at_requested_level() {
        let configuration = Configuration::default();
        let (text, warnings) = dump(
            Level::CC,
            "(body: return(7), procedures: [])",
            Some(Level::PR),
            &configuration,
        )
        .unwrap();
        assert!(warnings.is_empty());
        assert!(text.contains("Calling Convention (CC)"));
        assert!(text.contains("Conditionals (CD)"));
        assert!(text.contains("Predicates (PR)"));
        assert!(!text.contains("Basic Blocks (BB)"));
    }

    #[test]
    fn test_dump_counts_levels() {
        let mut dump = Dump::until(Level::S);
        let program = crate::compiler::ir::s::Program {
            assembly: "\tret.cap\n".to_string(),
        };
        assert_eq!(dump.update(&program).unwrap(), ControlFlow::Break(()));
        assert_eq!(dump.levels(), 1);
        assert!(dump.into_string().contains("Assembly (S)"));
    }
}
