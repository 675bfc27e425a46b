//! Calling convention: assignment of parameters to argument registers and the parameter record

use super::ir::register::Register;
use super::ir::types::{align_up, DataType, Label, Name};
use crate::error::{Error, Result};

/// A procedure parameter as seen by the calling convention
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Parameter name
    pub name: Name,
    /// Parameter data type
    pub data_type: DataType,
}

/// A parameter passed in a register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterParameter {
    /// The parameter
    pub parameter: Slot,
    /// The register carrying it
    pub register: Register,
}

/// A parameter passed in the parameter record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordField {
    /// The parameter
    pub parameter: Slot,
    /// Byte offset within the record
    pub offset: i64,
}

/// Parameters that did not fit in registers, passed through a capability to a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterRecord {
    /// Register carrying the capability to the record
    pub register: Register,
    /// Fields in layout order, i.e. the spilled parameters in reverse declaration order
    pub fields: Vec<RecordField>,
}

impl ParameterRecord {
    /// Size of the record in bytes, padded to its alignment
    pub fn byte_size(&self) -> i64 {
        let end = self
            .fields
            .iter()
            .map(|f| f.offset + f.parameter.data_type.byte_size())
            .max()
            .unwrap_or(0);
        let alignment = self
            .fields
            .iter()
            .map(|f| f.parameter.data_type.alignment())
            .max()
            .unwrap_or(1);
        align_up(end, alignment)
    }
}

/// How a procedure receives its parameters
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Assignment {
    /// Register-passed parameters, in declaration order
    pub registers: Vec<RegisterParameter>,
    /// The parameter record, if any parameter did not fit in a register
    pub record: Option<ParameterRecord>,
}

impl Assignment {
    /// Registers occupied on entry, including the record register
    pub fn occupied_registers(&self) -> Vec<Register> {
        let mut occupied: Vec<Register> = self.registers.iter().map(|p| p.register).collect();
        occupied.extend(self.record.as_ref().map(|r| r.register));
        occupied
    }
}

/// Checks that every configured register is a distinct platform argument register
///
/// Other registers are clobbered by frame setup and instruction selection, and a register listed
/// twice would carry two parameters.
pub fn check_argument_registers(argument_registers: &[Register]) -> Result<()> {
    for (i, register) in argument_registers.iter().enumerate() {
        if !register.is_argument() {
            return Err(Error::InvalidArgumentRegister {
                register: register.to_string(),
                reason: "only a0 to a7 carry parameters".into(),
            });
        }
        if argument_registers[..i].contains(register) {
            return Err(Error::InvalidArgumentRegister {
                register: register.to_string(),
                reason: "listed more than once".into(),
            });
        }
    }
    Ok(())
}

/// Assigns `parameters` of `procedure` to `argument_registers`
///
/// Parameters take the argument registers in order. Remaining parameters go into a parameter
/// record laid out in reverse declaration order, so that the first spilled parameter sits at the
/// highest address. The record's capability travels in the first platform argument register that
/// is not among `argument_registers`; if there is none, assignment fails.
pub fn assign(
    procedure: &Label,
    parameters: &[Slot],
    argument_registers: &[Register],
) -> Result<Assignment> {
    check_argument_registers(argument_registers)?;
    let in_registers = parameters.len().min(argument_registers.len());
    let registers = parameters[..in_registers]
        .iter()
        .zip(argument_registers)
        .map(|(parameter, register)| RegisterParameter {
            parameter: parameter.clone(),
            register: *register,
        })
        .collect();

    let spilled = &parameters[in_registers..];
    if spilled.is_empty() {
        return Ok(Assignment {
            registers,
            record: None,
        });
    }

    let register = Register::ARGUMENTS
        .iter()
        .copied()
        .find(|r| !argument_registers.contains(r))
        .ok_or_else(|| Error::RecordRegisterUnavailable {
            procedure: procedure.to_string(),
        })?;

    let mut offset = 0;
    let fields = spilled
        .iter()
        .rev()
        .map(|parameter| {
            let field_offset = align_up(offset, parameter.data_type.alignment());
            offset = field_offset + parameter.data_type.byte_size();
            RecordField {
                parameter: parameter.clone(),
                offset: field_offset,
            }
        })
        .collect();

    tracing::debug!(
        procedure = %procedure,
        spilled = spilled.len(),
        bytes = byte_size(spilled),
        record_register = %register,
        "parameters spilled into a parameter record"
    );

    Ok(Assignment {
        registers,
        record: Some(ParameterRecord { register, fields }),
    })
}

/// Total size in bytes of a parameter set, without padding
pub fn byte_size(parameters: &[Slot]) -> i64 {
    parameters.iter().map(|p| p.data_type.byte_size()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(name: &str, data_type: DataType) -> Slot {
        Slot {
            name: Name::from(name),
            data_type,
        }
    }

    fn words(count: usize) -> Vec<Slot> {
        (0..count)
            .map(|i| slot(&format!("p{}", i), DataType::S32))
            .collect()
    }

    #[test]
    fn test_everything_in_registers() {
        let assignment = assign(&Label::from("f"), &words(2), &Register::ARGUMENTS).unwrap();
        assert_eq!(assignment.registers.len(), 2);
        assert_eq!(assignment.registers[1].register, Register::A1);
        assert!(assignment.record.is_none());
    }

    #[test]
    fn test_spilled_parameters_are_reversed() {
        let assignment = assign(&Label::from("f"), &words(4), &[Register::A0]).unwrap();
        let record = assignment.record.unwrap();
        assert_eq!(record.register, Register::A1);
        let names: Vec<&str> = record
            .fields
            .iter()
            .map(|f| f.parameter.name.as_str())
            .collect();
        assert_eq!(names, vec!["p3", "p2", "p1"]);
        let offsets: Vec<i64> = record.fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
        assert_eq!(record.byte_size(), 12);
    }

    #[test]
    fn test_record_register_skips_configured_registers() {
        let configured = [Register::A0, Register::A1, Register::A3];
        let assignment = assign(&Label::from("f"), &words(5), &configured).unwrap();
        assert_eq!(assignment.record.unwrap().register, Register::A2);
    }

    #[test]
    fn test_no_register_left_for_record() {
        let error = assign(&Label::from("g"), &words(9), &Register::ARGUMENTS).unwrap_err();
        assert_eq!(
            error,
            Error::RecordRegisterUnavailable {
                procedure: "g".into()
            }
        );
    }

    #[test]
    fn test_scratch_registers_cannot_carry_parameters() {
        let error = assign(&Label::from("f"), &words(2), &[Register::T0, Register::T1]).unwrap_err();
        assert!(matches!(
            error,
            Error::InvalidArgumentRegister { ref register, .. } if register == "t0"
        ));
        assert!(check_argument_registers(&[Register::A0, Register::Sp]).is_err());
    }

    #[test]
    fn test_repeated_register_is_rejected() {
        let error = assign(&Label::from("f"), &words(2), &[Register::A0, Register::A0]).unwrap_err();
        assert_eq!(
            error,
            Error::InvalidArgumentRegister {
                register: "a0".into(),
                reason: "listed more than once".into()
            }
        );
        assert!(check_argument_registers(&[Register::A2, Register::A0]).is_ok());
    }

    #[test]
    fn test_mixed_record_alignment() {
        let parameters = vec![
            slot("a", DataType::S32),
            slot("b", DataType::Cap),
            slot("c", DataType::U8),
        ];
        let record = assign(&Label::from("f"), &parameters, &[Register::A0])
            .unwrap()
            .record
            .unwrap();
        let offsets: Vec<i64> = record.fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 16]);
        assert_eq!(record.byte_size(), 32);
        assert_eq!(byte_size(&parameters), 21);
    }
}
