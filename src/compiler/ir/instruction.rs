//! CHERI-RISC-V instructions

use super::register::Register;
use super::types::{BinaryOperator, BranchRelation, DataType, Label};
use serde::{Deserialize, Serialize};

/// Whether `value` fits a signed 12-bit immediate
pub fn fits_immediate(value: i64) -> bool {
    (-2048..=2047).contains(&value)
}

/// A CHERI-RISC-V instruction or pseudo-instruction
///
/// Integer operations work on 32-bit words (`addw` and friends). Memory is only accessed
/// through capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Instruction {
    /// Label definition
    Label(Label),

    // Copies
    /// Copy integer register: `mv rd, rs`
    CopyWord {
        /// Destination register
        destination: Register,
        /// Source register
        source: Register,
    },
    /// Copy capability register: `cmove cd, cs`
    CopyCapability {
        /// Destination register
        destination: Register,
        /// Source register
        source: Register,
    },
    /// Load immediate: `li rd, imm`
    LoadImmediate {
        /// Destination register
        destination: Register,
        /// Value
        value: i64,
    },

    // Arithmetic
    /// Register-register operation: `addw rd, rs1, rs2`
    Compute {
        /// Operator
        operation: BinaryOperator,
        /// Destination register
        destination: Register,
        /// First operand
        lhs: Register,
        /// Second operand
        rhs: Register,
    },
    /// Register-immediate operation: `addiw rd, rs1, imm`
    ComputeImmediate {
        /// Operator, one with an immediate form
        operation: BinaryOperator,
        /// Destination register
        destination: Register,
        /// First operand
        lhs: Register,
        /// Immediate second operand
        immediate: i64,
    },

    // Memory
    /// Load through a capability: `lw.cap rd, off(cs)`
    Load {
        /// Loaded datum type
        #[serde(rename = "type")]
        data_type: DataType,
        /// Destination register
        destination: Register,
        /// Capability register to load through
        address: Register,
        /// Byte offset
        offset: i64,
    },
    /// Store through a capability: `sw.cap rs, off(cs)`
    Store {
        /// Stored datum type
        #[serde(rename = "type")]
        data_type: DataType,
        /// Register holding the datum
        source: Register,
        /// Capability register to store through
        address: Register,
        /// Byte offset
        offset: i64,
    },

    // Capabilities
    /// Move a capability's address: `cincoffset cd, cs, rs`
    OffsetCapability {
        /// Destination capability
        destination: Register,
        /// Source capability
        source: Register,
        /// Register holding the byte offset
        offset: Register,
    },
    /// Move a capability's address: `cincoffsetimm cd, cs, imm`
    OffsetCapabilityImmediate {
        /// Destination capability
        destination: Register,
        /// Source capability
        source: Register,
        /// Byte offset
        offset: i64,
    },
    /// Narrow a capability's bounds: `csetbounds cd, cs, rs`
    SetBounds {
        /// Destination capability
        destination: Register,
        /// Source capability
        source: Register,
        /// Register holding the length
        length: Register,
    },
    /// Narrow a capability's bounds: `csetboundsimm cd, cs, imm`
    SetBoundsImmediate {
        /// Destination capability
        destination: Register,
        /// Source capability
        source: Register,
        /// Length
        length: i64,
    },
    /// Length of a capability: `cgetlen rd, cs`
    GetLength {
        /// Destination register
        destination: Register,
        /// Capability
        source: Register,
    },
    /// PCC-relative capability to a label: `cllc cd, label`
    DeriveFromLabel {
        /// Destination capability
        destination: Register,
        /// Label
        label: Label,
    },
    /// Seal a capability: `cseal cd, cs, cs2`
    Seal {
        /// Destination capability
        destination: Register,
        /// Capability to seal
        source: Register,
        /// Seal capability
        seal: Register,
    },
    /// Seal a code capability as a sentry: `csealentry cd, cs`
    SealEntry {
        /// Destination capability
        destination: Register,
        /// Code capability
        source: Register,
    },

    // Control flow
    /// Conditional branch: `blt rs1, rs2, label`
    Branch {
        /// Relation between both operands
        relation: BranchRelation,
        /// First operand
        lhs: Register,
        /// Second operand
        rhs: Register,
        /// Branch target
        target: Label,
    },
    /// Unconditional jump: `j label`
    Jump(Label),
    /// Call: `ccall label`
    Call(Label),
    /// Return through the return capability: `ret.cap`
    Return,
}

impl Instruction {
    /// Assembly text of the instruction
    pub fn assembly(&self) -> String {
        match self {
            Instruction::Label(label) => format!("{}:", label),
            Instruction::CopyWord {
                destination,
                source,
            } => format!("mv {}, {}", destination, source),
            Instruction::CopyCapability {
                destination,
                source,
            } => format!("cmove {}, {}", destination.c(), source.c()),
            Instruction::LoadImmediate { destination, value } => {
                format!("li {}, {}", destination, value)
            }
            Instruction::Compute {
                operation,
                destination,
                lhs,
                rhs,
            } => format!(
                "{} {}, {}, {}",
                word_mnemonic(*operation),
                destination,
                lhs,
                rhs
            ),
            Instruction::ComputeImmediate {
                operation,
                destination,
                lhs,
                immediate,
            } => format!(
                "{} {}, {}, {}",
                immediate_mnemonic(*operation),
                destination,
                lhs,
                immediate
            ),
            Instruction::Load {
                data_type,
                destination,
                address,
                offset,
            } => match data_type {
                DataType::U8 => format!("lbu.cap {}, {}({})", destination, offset, address.c()),
                DataType::S32 => format!("lw.cap {}, {}({})", destination, offset, address.c()),
                DataType::Cap => format!(
                    "lc.cap {}, {}({})",
                    destination.c(),
                    offset,
                    address.c()
                ),
            },
            Instruction::Store {
                data_type,
                source,
                address,
                offset,
            } => match data_type {
                DataType::U8 => format!("sb.cap {}, {}({})", source, offset, address.c()),
                DataType::S32 => format!("sw.cap {}, {}({})", source, offset, address.c()),
                DataType::Cap => {
                    format!("sc.cap {}, {}({})", source.c(), offset, address.c())
                }
            },
            Instruction::OffsetCapability {
                destination,
                source,
                offset,
            } => format!(
                "cincoffset {}, {}, {}",
                destination.c(),
                source.c(),
                offset
            ),
            Instruction::OffsetCapabilityImmediate {
                destination,
                source,
                offset,
            } => format!(
                "cincoffsetimm {}, {}, {}",
                destination.c(),
                source.c(),
                offset
            ),
            Instruction::SetBounds {
                destination,
                source,
                length,
            } => format!(
                "csetbounds {}, {}, {}",
                destination.c(),
                source.c(),
                length
            ),
            Instruction::SetBoundsImmediate {
                destination,
                source,
                length,
            } => format!(
                "csetboundsimm {}, {}, {}",
                destination.c(),
                source.c(),
                length
            ),
            Instruction::GetLength {
                destination,
                source,
            } => format!("cgetlen {}, {}", destination, source.c()),
            Instruction::DeriveFromLabel { destination, label } => {
                format!("cllc {}, {}", destination.c(), label)
            }
            Instruction::Seal {
                destination,
                source,
                seal,
            } => format!("cseal {}, {}, {}", destination.c(), source.c(), seal.c()),
            Instruction::SealEntry {
                destination,
                source,
            } => format!("csealentry {}, {}", destination.c(), source.c()),
            Instruction::Branch {
                relation,
                lhs,
                rhs,
                target,
            } => format!("b{} {}, {}, {}", relation.mnemonic(), lhs, rhs, target),
            Instruction::Jump(target) => format!("j {}", target),
            Instruction::Call(target) => format!("ccall {}", target),
            Instruction::Return => "ret.cap".to_string(),
        }
    }
}

fn word_mnemonic(operation: BinaryOperator) -> &'static str {
    match operation {
        BinaryOperator::Add => "addw",
        BinaryOperator::Sub => "subw",
        BinaryOperator::Mul => "mulw",
        BinaryOperator::And => "and",
        BinaryOperator::Or => "or",
        BinaryOperator::Xor => "xor",
        BinaryOperator::Sll => "sllw",
        BinaryOperator::Srl => "srlw",
        BinaryOperator::Sra => "sraw",
    }
}

fn immediate_mnemonic(operation: BinaryOperator) -> &'static str {
    match operation {
        BinaryOperator::Add => "addiw",
        BinaryOperator::And => "andi",
        BinaryOperator::Or => "ori",
        BinaryOperator::Xor => "xori",
        BinaryOperator::Sll => "slliw",
        BinaryOperator::Srl => "srliw",
        BinaryOperator::Sra => "sraiw",
        // no immediate form; selection never emits these
        BinaryOperator::Sub => "subw",
        BinaryOperator::Mul => "mulw",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_assembly() {
        let load = Instruction::Load {
            data_type: DataType::Cap,
            destination: Register::Fp,
            address: Register::Fp,
            offset: 0,
        };
        assert_eq!(load.assembly(), "lc.cap cfp, 0(cfp)");

        let store = Instruction::Store {
            data_type: DataType::S32,
            source: Register::T1,
            address: Register::A1,
            offset: 4,
        };
        assert_eq!(store.assembly(), "sw.cap t1, 4(ca1)");
    }

    #[test]
    fn test_arithmetic_assembly() {
        let add = Instruction::Compute {
            operation: BinaryOperator::Add,
            destination: Register::A0,
            lhs: Register::A0,
            rhs: Register::A1,
        };
        assert_eq!(add.assembly(), "addw a0, a0, a1");

        let shift = Instruction::ComputeImmediate {
            operation: BinaryOperator::Sll,
            destination: Register::T0,
            lhs: Register::A2,
            immediate: 2,
        };
        assert_eq!(shift.assembly(), "slliw t0, a2, 2");
    }

    #[test]
    fn test_control_assembly() {
        let branch = Instruction::Branch {
            relation: BranchRelation::Le,
            lhs: Register::T0,
            rhs: Register::Zero,
            target: Label::from("cd.then$1"),
        };
        assert_eq!(branch.assembly(), "ble t0, zero, cd.then$1");
        assert_eq!(Instruction::Return.assembly(), "ret.cap");
        assert_eq!(
            Instruction::CopyCapability {
                destination: Register::Ra,
                source: Register::Zero
            }
            .assembly(),
            "cmove cra, cnull"
        );
    }

    #[test]
    fn test_immediate_range() {
        assert!(fits_immediate(-2048));
        assert!(fits_immediate(2047));
        assert!(!fits_immediate(2048));
    }
}
