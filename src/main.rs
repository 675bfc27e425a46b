//! cheri-ladder command-line compiler
//!
//! Lowers a program file from its level (taken from the extension, e.g. `sum.ex`, or from
//! `--level`) to an ELF executable, or to the text of any lower level with `--stop`.

use anyhow::{bail, Context, Result};
use cheri_ladder::compiler::ir::Register;
use cheri_ladder::compiler::{dump, Compiler, Configuration, Level, Target, Warning};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "cheri-ladder")]
#[command(about = "Compile capability programs to CHERI-RISC-V", long_about = None)]
#[command(version)]
struct Cli {
    /// Program file
    file: PathBuf,
    /// Level of the program, if not given by the file's extension
    #[arg(short, long, value_parser = parse_level)]
    level: Option<Level>,
    /// Stop at this level and write its text instead of an executable
    #[arg(short, long, value_parser = parse_level)]
    stop: Option<Level>,
    /// Output file; defaults to the input path with the output's extension
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Target platform
    #[arg(long, value_enum, default_value_t = Platform::Sim)]
    target: Platform,
    /// Root of the CHERI toolchain
    #[arg(long)]
    toolchain: Option<PathBuf>,
    /// System root used when linking for CheriBSD
    #[arg(long)]
    sysroot: Option<PathBuf>,
    /// Registers carrying parameters, in order
    #[arg(long, value_delimiter = ',')]
    argument_registers: Option<Vec<Register>>,
    /// Skip each level's optimisation step
    #[arg(long)]
    no_optimise: bool,
    /// Skip each level's validation step
    #[arg(long)]
    no_validate: bool,
    /// Print every intermediate program instead of writing output
    #[arg(long)]
    dump: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Platform {
    /// Sail CHERI-RISC-V simulator
    Sim,
    /// CheriBSD
    Full,
}

fn parse_level(code: &str) -> std::result::Result<Level, String> {
    Level::from_code(code).ok_or_else(|| format!("unknown level `{}`", code))
}

impl Cli {
    fn configuration(&self) -> Configuration {
        let target = match self.target {
            Platform::Sim => Target::Simulator,
            Platform::Full => Target::FullSystem,
        };
        let mut configuration = Configuration::for_target(target)
            .with_optimise(!self.no_optimise)
            .with_validate(!self.no_validate);
        if let Some(root) = &self.toolchain {
            configuration = configuration.with_toolchain_root(root);
        }
        if let Some(root) = &self.sysroot {
            configuration = configuration.with_system_root(root);
        }
        if let Some(registers) = &self.argument_registers {
            configuration = configuration.with_argument_registers(registers.clone());
        }
        configuration
    }

    fn level(&self) -> Result<Level> {
        match self.level.or_else(|| Level::from_extension(&self.file)) {
            Some(level) => Ok(level),
            None => bail!(
                "cannot tell the level of {}; name it with --level",
                self.file.display()
            ),
        }
    }

    fn output(&self, extension: &str) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.file.with_extension(extension))
    }
}

fn report(warnings: &[Warning]) {
    for warning in warnings {
        eprintln!("warning: {}", warning);
    }
}

fn write(path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = cli.level()?;
    let configuration = cli.configuration();
    let text = std::fs::read_to_string(&cli.file)
        .with_context(|| format!("reading {}", cli.file.display()))?;

    if cli.dump {
        let (rendered, warnings) = dump(level, &text, cli.stop, &configuration)
            .with_context(|| format!("lowering {}", cli.file.display()))?;
        print!("{}", rendered);
        report(&warnings);
        return Ok(());
    }

    let compiler = Compiler::new(configuration);
    match cli.stop {
        Some(stop) => {
            let (lowered, warnings) = compiler
                .lower_to(level, &text, stop)
                .with_context(|| format!("lowering {} to {}", cli.file.display(), stop))?;
            report(&warnings);
            let extension = match stop {
                Level::S => "S".to_string(),
                other => other.code().to_lowercase(),
            };
            write(&cli.output(&extension), lowered.as_bytes())
        }
        None => {
            let result = compiler
                .compile(level, &text)
                .with_context(|| format!("compiling {}", cli.file.display()))?;
            report(&result.warnings);
            write(&cli.output("elf"), &result.elf_bytes)
        }
    }
}
