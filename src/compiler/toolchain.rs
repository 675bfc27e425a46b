//! # CHERI Toolchain Bridge
//!
//! Assembles and links S programs with the CHERI SDK's `clang` via subprocess. Scratch files
//! live in a uniquely named directory under the system temporary directory and are removed
//! afterwards, whether or not the toolchain succeeded.

use super::config::{Configuration, Target};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Linker script placing the simulator image at the start of RAM
pub const SIMULATOR_LINKER_SCRIPT: &str = r#"OUTPUT_ARCH("riscv")
ENTRY(_start)
SECTIONS {
  . = 0x80000000;
  .text.init : { *(.text.init) }
  . = ALIGN(0x1000);
  .tohost : { *(.tohost) }
  . = ALIGN(0x1000);
  .text : { *(.text) }
  . = ALIGN(0x1000);
  .data : { *(.data) }
  .bss : { *(.bss) }
  _end = .;
}
"#;

/// Bridge to the CHERI SDK
pub struct Toolchain<'a> {
    configuration: &'a Configuration,
}

impl<'a> Toolchain<'a> {
    /// Create a bridge for a configuration
    pub fn new(configuration: &'a Configuration) -> Self {
        Self { configuration }
    }

    /// Path to the SDK's clang
    pub fn clang_path(&self) -> PathBuf {
        self.configuration
            .toolchain_root
            .join("output")
            .join("sdk")
            .join("bin")
            .join("clang")
    }

    /// Clang arguments for the configured target, excluding input and output files
    pub fn arguments(&self, linker_script: Option<&Path>) -> Vec<String> {
        let mut arguments: Vec<String> = vec![
            "-O2".into(),
            "-target".into(),
            "riscv64-unknown-freebsd".into(),
            format!("--sysroot={}", self.configuration.system_root.display()),
            "-fuse-ld=lld".into(),
            "-mno-relax".into(),
            "-march=rv64gcxcheri".into(),
            "-mabi=l64pc128d".into(),
            "-Wall".into(),
            "-Wcheri".into(),
        ];
        if self.configuration.target == Target::Simulator {
            arguments.extend(["-nostartfiles", "-nostdlib", "-static"].map(String::from));
            if let Some(script) = linker_script {
                arguments.push(format!("-Wl,-T{}", script.display()));
            }
        }
        arguments
    }

    /// Assemble and link `assembly` into an ELF executable
    pub fn link(&self, assembly: &str) -> Result<Vec<u8>> {
        let directory = std::env::temp_dir().join(format!("cheri-ladder-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&directory)?;
        let result = self.link_in(&directory, assembly);
        if let Err(error) = std::fs::remove_dir_all(&directory) {
            tracing::warn!(directory = %directory.display(), %error, "could not remove scratch directory");
        }
        result
    }

    fn link_in(&self, directory: &Path, assembly: &str) -> Result<Vec<u8>> {
        let assembly_path = directory.join("program.S");
        let script_path = directory.join("linkage.ld");
        let elf_path = directory.join("program.elf");
        std::fs::write(&assembly_path, assembly)?;
        std::fs::write(&script_path, SIMULATOR_LINKER_SCRIPT)?;

        let clang = self.clang_path();
        let mut arguments = self.arguments(Some(&script_path));
        arguments.push(assembly_path.display().to_string());
        arguments.push("-o".into());
        arguments.push(elf_path.display().to_string());

        tracing::info!(clang = %clang.display(), target = ?self.configuration.target, "linking executable");
        let output = Command::new(&clang)
            .args(&arguments)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| Error::Toolchain {
                status: None,
                message: format!("failed to run {}: {}", clang.display(), e),
            })?;

        if !output.status.success() {
            return Err(Error::Toolchain {
                status: output.status.code(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(std::fs::read(&elf_path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulator_arguments() {
        let configuration = Configuration::for_target(Target::Simulator)
            .with_toolchain_root("/opt/cheri");
        let toolchain = Toolchain::new(&configuration);
        let arguments = toolchain.arguments(Some(Path::new("/tmp/linkage.ld")));
        assert!(arguments.contains(&"-nostdlib".to_string()));
        assert!(arguments.contains(&"-Wl,-T/tmp/linkage.ld".to_string()));
        assert!(arguments
            .contains(&"--sysroot=/opt/cheri/output/rootfs-riscv64-purecap".to_string()));
        assert_eq!(
            toolchain.clang_path(),
            PathBuf::from("/opt/cheri/output/sdk/bin/clang")
        );
    }

    #[test]
    fn test_full_system_links_against_libc() {
        let configuration = Configuration::for_target(Target::FullSystem);
        let arguments = Toolchain::new(&configuration).arguments(Some(Path::new("linkage.ld")));
        assert!(!arguments.contains(&"-nostdlib".to_string()));
        assert!(!arguments.iter().any(|a| a.starts_with("-Wl,-T")));
    }

    #[test]
    fn test_missing_toolchain_is_a_toolchain_error() {
        let configuration = Configuration::default().with_toolchain_root("/nonexistent/cheri");
        let result = Toolchain::new(&configuration).link("\t.text\n");
        assert!(matches!(result, Err(Error::Toolchain { status: None, .. })));
    }
}
