//! # RV: CHERI-RISC-V
//!
//! A flat list of labels and [`Instruction`]s. Lowering to [`s`] renders the instructions as
//! assembly text and wraps them in the target's runtime: an entry point, heap and seal
//! initialisation (`rv.init`), the routines the instruction selector calls (`mm.alloc`,
//! `rt.seal`) and the data they use.
//!
//! On the simulator, the program's result `r` is reported through `tohost` as `(r << 1) | 1`;
//! a trap reports 3. On CheriBSD the program is a `main` function returning `r`.

use super::bb::{ALLOCATE_ROUTINE, SEAL_ROUTINE};
use super::cc::MAIN;
use super::instruction::Instruction;
use super::s;
use super::types::Label;
use crate::compiler::config::Target;
use crate::compiler::ladder::{descend_through, Language, Level, Lower, Lowering, Reductor};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write;

/// Label of the runtime initialisation routine
pub const INIT_ROUTINE: &str = "rv.init";

/// Bytes reserved for the simulator's call stack
pub const STACK_SIZE: usize = 1 << 16;

/// Bytes reserved for the heap
pub const HEAP_SIZE: usize = 1 << 20;

/// Object type the simulator's seal capabilities start at
const FIRST_OBJECT_TYPE: i64 = 16;

/// Labels defined by the runtime, callable from generated code
const RUNTIME_LABELS: [&str; 3] = [INIT_ROUTINE, ALLOCATE_ROUTINE, SEAL_ROUTINE];

/// An RV program
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    /// Instructions in layout order
    pub instructions: Vec<Instruction>,
}

impl Program {
    /// Assembly text of the instructions alone, without runtime
    pub fn body(&self) -> String {
        let mut body = String::new();
        for instruction in &self.instructions {
            match instruction {
                Instruction::Label(_) => body.push_str(&instruction.assembly()),
                other => {
                    body.push('\t');
                    body.push_str(&other.assembly());
                }
            }
            body.push('\n');
        }
        body
    }

    fn labels(&self) -> impl Iterator<Item = &Label> {
        self.instructions.iter().filter_map(|instruction| match instruction {
            Instruction::Label(label) => Some(label),
            _ => None,
        })
    }
}

impl Language for Program {
    const LEVEL: Level = Level::RV;

    fn validate(&self, _lowering: &mut Lowering) -> Result<()> {
        let mut defined = HashSet::new();
        for label in self.labels() {
            if !defined.insert(label.as_str()) {
                return Err(Error::DuplicateLabel {
                    level: Level::RV,
                    label: label.to_string(),
                });
            }
        }
        defined.extend(RUNTIME_LABELS);

        for instruction in &self.instructions {
            let target = match instruction {
                Instruction::Branch { target, .. }
                | Instruction::Jump(target)
                | Instruction::Call(target)
                | Instruction::DeriveFromLabel { label: target, .. } => target,
                _ => continue,
            };
            if !defined.contains(target.as_str()) {
                return Err(Error::UndefinedLabel {
                    level: Level::RV,
                    label: target.to_string(),
                });
            }
        }
        Ok(())
    }

    fn descend<R: Reductor>(self, lowering: &mut Lowering, reductor: &mut R) -> Result<()> {
        descend_through(self, lowering, reductor)
    }
}

impl Lower for Program {
    type Target = s::Program;

    fn lower(self, lowering: &mut Lowering) -> Result<s::Program> {
        let target = lowering.configuration.target;
        let runtime = Runtime { target };
        let mut assembly = String::new();
        runtime.entry(&mut assembly)?;
        assembly.push_str(&self.body());
        runtime.routines(&mut assembly)?;
        runtime.data(&mut assembly)?;
        tracing::debug!(?target, bytes = assembly.len(), "rendered assembly");
        Ok(s::Program { assembly })
    }
}

/// Renders the runtime surrounding a program for one target
struct Runtime {
    target: Target,
}

impl Runtime {
    /// Capability to a data label: PC-relative on the simulator, through the GOT on CheriBSD
    fn data_address(&self, register: &str, label: &str) -> String {
        match self.target {
            Target::Simulator => format!("\tcllc {}, {}\n", register, label),
            Target::FullSystem => format!("\tclgc {}, {}\n", register, label),
        }
    }

    fn entry(&self, out: &mut String) -> Result<()> {
        match self.target {
            Target::Simulator => {
                out.push_str(concat!(
                    "\t.section .text.init, \"ax\", @progbits\n",
                    "\t.globl _start\n",
                    "_start:\n",
                    "\tcllc ct0, _trap_vector\n",
                    "\tcspecialrw c0, mtcc, ct0\n",
                    "\tcllc ct0, rv.begin\n",
                    "\tcspecialrw c0, mepcc, ct0\n",
                    "\tmret\n",
                    "\n",
                    "\t.balign 4\n",
                    "_trap_vector:\n",
                    "\tli gp, 3\n",
                    "\tj _exit\n",
                    "\n",
                    "_exit:\n",
                    "\tcllc ct0, tohost\n",
                    "\tsw.cap gp, 0(ct0)\n",
                    "\tj _exit\n",
                    "\n",
                    "\t.text\n",
                    "rv.begin:\n",
                    "\tcllc csp, mm.stack.end\n",
                ));
                writeln!(out, "\tccall {}", INIT_ROUTINE).map_err(format_error)?;
                writeln!(out, "\tccall {}", MAIN).map_err(format_error)?;
                out.push_str(concat!(
                    "\tslli gp, a0, 1\n",
                    "\tori gp, gp, 1\n",
                    "\tj _exit\n",
                    "\n",
                ));
            }
            Target::FullSystem => {
                out.push_str(concat!(
                    "\t.text\n",
                    "\t.attribute 4, 16\n",
                    "\t.attribute 5, \"rv64i2p0_xcheri0p0\"\n",
                    "\t.globl main\n",
                    "\t.p2align 1\n",
                    "\t.type main, @function\n",
                    "main:\n",
                    "\tcincoffsetimm csp, csp, -16\n",
                    "\tsc.cap cra, 0(csp)\n",
                ));
                writeln!(out, "\tccall {}", INIT_ROUTINE).map_err(format_error)?;
                writeln!(out, "\tccall {}", MAIN).map_err(format_error)?;
                out.push_str(concat!(
                    "\tlc.cap cra, 0(csp)\n",
                    "\tcincoffsetimm csp, csp, 16\n",
                    "\tret.cap\n",
                    "main.end:\n",
                    "\t.size main, main.end-main\n",
                    "\n",
                ));
            }
        }
        Ok(())
    }

    fn routines(&self, out: &mut String) -> Result<()> {
        // rv.init: heap capability bounded to the heap, then the root seal capability
        writeln!(out, "\n{}:", INIT_ROUTINE).map_err(format_error)?;
        out.push_str(&self.data_address("ct0", "mm.heap"));
        out.push_str(&self.data_address("ct1", "mm.heap.end"));
        out.push_str("\tcsub t1, ct1, ct0\n");
        out.push_str("\tcsetbounds ct0, ct0, t1\n");
        out.push_str(&self.data_address("ct1", "mm.heap.cap"));
        out.push_str("\tsc.cap ct0, 0(ct1)\n");
        match self.target {
            Target::Simulator => {
                out.push_str("\tcspecialr ct0, ddc\n");
                writeln!(out, "\tli t1, {}", FIRST_OBJECT_TYPE).map_err(format_error)?;
                out.push_str("\tcsetaddr ct0, ct0, t1\n");
                out.push_str(&self.data_address("ct1", "rt.seal.cap"));
                out.push_str("\tsc.cap ct0, 0(ct1)\n");
                out.push_str("\tret.cap\n");
            }
            Target::FullSystem => {
                out.push_str("\tcincoffsetimm csp, csp, -16\n");
                out.push_str("\tsc.cap cra, 0(csp)\n");
                out.push_str(&self.data_address("ca0", "rt.seal.name"));
                out.push_str(&self.data_address("ca1", "rt.seal.cap"));
                out.push_str(&self.data_address("ca2", "rt.seal.size"));
                out.push_str("\tcmove ca3, cnull\n");
                out.push_str("\tli a4, 0\n");
                out.push_str("\tccall sysctlbyname\n");
                out.push_str("\tlc.cap cra, 0(csp)\n");
                out.push_str("\tcincoffsetimm csp, csp, 16\n");
                out.push_str("\tret.cap\n");
            }
        }

        // mm.alloc: bump allocation; a0 holds the 16-byte aligned size in, the buffer out
        writeln!(out, "\n{}:", ALLOCATE_ROUTINE).map_err(format_error)?;
        out.push_str(&self.data_address("ct4", "mm.heap.cap"));
        out.push_str("\tlc.cap ct5, 0(ct4)\n");
        out.push_str("\tcincoffset ct6, ct5, a0\n");
        out.push_str("\tsc.cap ct6, 0(ct4)\n");
        out.push_str("\tcsetbounds ca0, ct5, a0\n");
        out.push_str("\tret.cap\n");

        // rt.seal: hands out the next object type as a one-element seal
        writeln!(out, "\n{}:", SEAL_ROUTINE).map_err(format_error)?;
        out.push_str(&self.data_address("ct4", "rt.seal.cap"));
        out.push_str("\tlc.cap ca0, 0(ct4)\n");
        out.push_str("\tcincoffsetimm ct5, ca0, 1\n");
        out.push_str("\tsc.cap ct5, 0(ct4)\n");
        out.push_str("\tcsetboundsimm ca0, ca0, 1\n");
        out.push_str("\tret.cap\n");
        Ok(())
    }

    fn data(&self, out: &mut String) -> Result<()> {
        out.push_str(concat!(
            "\n\t.data\n",
            "\t.balign 16\n",
            "mm.heap.cap:\n",
            "\t.dword 0, 0\n",
            "rt.seal.cap:\n",
            "\t.dword 0, 0\n",
        ));
        if self.target == Target::FullSystem {
            out.push_str(concat!(
                "rt.seal.size:\n",
                "\t.dword 16\n",
                "rt.seal.name:\n",
                "\t.asciz \"security.cheri.sealcap\"\n",
            ));
        }
        if self.target == Target::Simulator {
            writeln!(out, "\t.balign 16\nmm.stack:\n\t.fill {}, 1, 0\nmm.stack.end:", STACK_SIZE)
                .map_err(format_error)?;
        }
        writeln!(out, "\t.balign 16\nmm.heap:\n\t.fill {}, 1, 0\nmm.heap.end:", HEAP_SIZE)
            .map_err(format_error)?;
        if self.target == Target::Simulator {
            out.push_str(concat!(
                "\n\t.section .tohost, \"aw\", @progbits\n",
                "\t.balign 64\n",
                "\t.globl tohost\n",
                "tohost:\n",
                "\t.dword 0\n",
                "\t.globl fromhost\n",
                "fromhost:\n",
                "\t.dword 0\n",
            ));
        } else {
            out.push_str("\n\t.section \".note.GNU-stack\", \"\", @progbits\n");
        }
        Ok(())
    }
}

fn format_error(error: std::fmt::Error) -> Error {
    Error::lowering(Level::RV, "assembly", error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::config::Configuration;
    use crate::compiler::ir::register::Register;

    fn program() -> Program {
        Program {
            instructions: vec![
                Instruction::Label(Label::from("rv.main")),
                Instruction::LoadImmediate {
                    destination: Register::A0,
                    value: 42,
                },
                Instruction::Return,
            ],
        }
    }

    fn lower(program: Program, target: Target) -> String {
        let configuration = Configuration::for_target(target);
        let mut lowering = Lowering::new(&configuration);
        program.lower(&mut lowering).unwrap().assembly
    }

    #[test]
    fn test_body_indents_instructions() {
        assert_eq!(program().body(), "rv.main:\n\tli a0, 42\n\tret.cap\n");
    }

    #[test]
    fn test_simulator_scaffold() {
        let assembly = lower(program(), Target::Simulator);
        assert!(assembly.contains("_start:\n"));
        assert!(assembly.contains("\tccall rv.main\n\tslli gp, a0, 1\n\tori gp, gp, 1\n"));
        assert!(assembly.contains("tohost:\n"));
        assert!(assembly.contains("mm.stack.end:"));
        assert!(assembly.contains("rv.main:\n\tli a0, 42\n"));
        assert!(!assembly.contains("clgc"));
    }

    #[test]
    fn test_full_system_scaffold() {
        let assembly = lower(program(), Target::FullSystem);
        assert!(assembly.contains("\t.globl main\n"));
        assert!(assembly.contains("sysctlbyname"));
        assert!(assembly.contains("clgc ct4, mm.heap.cap"));
        assert!(!assembly.contains("tohost"));
    }

    #[test]
    fn test_validation_rejects_undefined_targets() {
        let configuration = Configuration::default();
        let mut lowering = Lowering::new(&configuration);

        let mut jumping = program();
        jumping
            .instructions
            .push(Instruction::Jump(Label::from("nowhere")));
        assert!(matches!(
            jumping.validate(&mut lowering),
            Err(Error::UndefinedLabel { .. })
        ));

        let mut allocating = program();
        allocating
            .instructions
            .insert(1, Instruction::Call(Label::from(ALLOCATE_ROUTINE)));
        assert!(allocating.validate(&mut lowering).is_ok());

        let mut doubled = program();
        doubled
            .instructions
            .push(Instruction::Label(Label::from("rv.main")));
        assert!(matches!(
            doubled.validate(&mut lowering),
            Err(Error::DuplicateLabel { .. })
        ));
    }
}
