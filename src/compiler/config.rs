//! Compilation configuration

use super::ir::register::Register;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Platform the executable is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Target {
    /// Bare-metal image for the Sail CHERI-RISC-V simulator
    #[default]
    Simulator,
    /// Executable for CheriBSD
    FullSystem,
}

/// Compilation options shared by every lowering pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Target platform
    pub target: Target,
    /// Root of the CHERI toolchain checkout (cheribuild output lives under `output/`)
    pub toolchain_root: PathBuf,
    /// System root used when linking, only required for the full system target
    pub system_root: PathBuf,
    /// Registers carrying parameters, in order
    pub argument_registers: Vec<Register>,
    /// Run each level's optimisation step
    pub optimise: bool,
    /// Run each level's validation step
    pub validate: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        let toolchain_root = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_default()
            .join("cheri");
        let system_root = toolchain_root.join("output").join("rootfs-riscv64-purecap");
        Self {
            target: Target::Simulator,
            toolchain_root,
            system_root,
            argument_registers: Register::ARGUMENTS.to_vec(),
            optimise: true,
            validate: true,
        }
    }
}

impl Configuration {
    /// Configuration for a target with default paths
    pub fn for_target(target: Target) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }

    /// Set the toolchain root; the system root follows unless set afterwards
    pub fn with_toolchain_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.toolchain_root = root.into();
        self.system_root = self
            .toolchain_root
            .join("output")
            .join("rootfs-riscv64-purecap");
        self
    }

    /// Set the system root
    pub fn with_system_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.system_root = root.into();
        self
    }

    /// Set the argument registers
    pub fn with_argument_registers(mut self, registers: Vec<Register>) -> Self {
        self.argument_registers = registers;
        self
    }

    /// Enable or disable optimisation
    pub fn with_optimise(mut self, optimise: bool) -> Self {
        self.optimise = optimise;
        self
    }

    /// Enable or disable validation
    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let configuration = Configuration::default();
        assert_eq!(configuration.target, Target::Simulator);
        assert_eq!(configuration.argument_registers.len(), 8);
        assert!(configuration.system_root.ends_with("output/rootfs-riscv64-purecap"));
    }

    #[test]
    fn test_system_root_follows_toolchain() {
        let configuration = Configuration::default().with_toolchain_root("/opt/cheri");
        assert_eq!(
            configuration.system_root,
            PathBuf::from("/opt/cheri/output/rootfs-riscv64-purecap")
        );
    }
}
