//! CHERI-RISC-V register file

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A CHERI-RISC-V register
///
/// Each register holds either an integer (written `a0`) or a capability (written `ca0`); the
/// datum's type selects the assembly spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Register {
    /// Hard-wired zero / null capability
    Zero,
    /// Return address (return capability)
    Ra,
    /// Stack pointer
    Sp,
    /// Global pointer; carries the exit code on the simulator
    Gp,
    /// Thread pointer
    Tp,
    /// Temporary, scratch for instruction selection
    T0,
    /// Temporary, scratch for instruction selection
    T1,
    /// Temporary, scratch for instruction selection
    T2,
    /// Temporary, scratch for instruction selection
    T3,
    /// Temporary
    T4,
    /// Temporary
    T5,
    /// Temporary
    T6,
    /// Frame pointer (`s0`)
    Fp,
    /// Callee-saved register
    S1,
    /// Callee-saved register
    S2,
    /// Callee-saved register
    S3,
    /// Callee-saved register
    S4,
    /// Callee-saved register
    S5,
    /// Callee-saved register
    S6,
    /// Callee-saved register
    S7,
    /// Callee-saved register
    S8,
    /// Callee-saved register
    S9,
    /// Callee-saved register
    S10,
    /// Callee-saved register
    S11,
    /// Argument 1 / result register
    A0,
    /// Argument 2
    A1,
    /// Argument 3
    A2,
    /// Argument 4
    A3,
    /// Argument 5
    A4,
    /// Argument 6
    A5,
    /// Argument 7
    A6,
    /// Argument 8
    A7,
}

impl Register {
    /// The platform's argument registers in calling-convention order
    pub const ARGUMENTS: [Register; 8] = [
        Register::A0,
        Register::A1,
        Register::A2,
        Register::A3,
        Register::A4,
        Register::A5,
        Register::A6,
        Register::A7,
    ];

    /// Register holding a procedure's result
    pub const RESULT: Register = Register::A0;

    /// Check if this register is used for procedure arguments
    pub fn is_argument(self) -> bool {
        Self::ARGUMENTS.contains(&self)
    }

    /// Integer spelling, e.g. `a0`
    pub fn x(self) -> &'static str {
        match self {
            Register::Zero => "zero",
            Register::Ra => "ra",
            Register::Sp => "sp",
            Register::Gp => "gp",
            Register::Tp => "tp",
            Register::T0 => "t0",
            Register::T1 => "t1",
            Register::T2 => "t2",
            Register::T3 => "t3",
            Register::T4 => "t4",
            Register::T5 => "t5",
            Register::T6 => "t6",
            Register::Fp => "fp",
            Register::S1 => "s1",
            Register::S2 => "s2",
            Register::S3 => "s3",
            Register::S4 => "s4",
            Register::S5 => "s5",
            Register::S6 => "s6",
            Register::S7 => "s7",
            Register::S8 => "s8",
            Register::S9 => "s9",
            Register::S10 => "s10",
            Register::S11 => "s11",
            Register::A0 => "a0",
            Register::A1 => "a1",
            Register::A2 => "a2",
            Register::A3 => "a3",
            Register::A4 => "a4",
            Register::A5 => "a5",
            Register::A6 => "a6",
            Register::A7 => "a7",
        }
    }

    /// Capability spelling, e.g. `ca0`; the zero register is `cnull`
    pub fn c(self) -> String {
        match self {
            Register::Zero => "cnull".to_string(),
            other => format!("c{}", other.x()),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.x())
    }
}

impl FromStr for Register {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let register = match s {
            "zero" => Register::Zero,
            "ra" => Register::Ra,
            "sp" => Register::Sp,
            "gp" => Register::Gp,
            "tp" => Register::Tp,
            "t0" => Register::T0,
            "t1" => Register::T1,
            "t2" => Register::T2,
            "t3" => Register::T3,
            "t4" => Register::T4,
            "t5" => Register::T5,
            "t6" => Register::T6,
            "fp" | "s0" => Register::Fp,
            "s1" => Register::S1,
            "s2" => Register::S2,
            "s3" => Register::S3,
            "s4" => Register::S4,
            "s5" => Register::S5,
            "s6" => Register::S6,
            "s7" => Register::S7,
            "s8" => Register::S8,
            "s9" => Register::S9,
            "s10" => Register::S10,
            "s11" => Register::S11,
            "a0" => Register::A0,
            "a1" => Register::A1,
            "a2" => Register::A2,
            "a3" => Register::A3,
            "a4" => Register::A4,
            "a5" => Register::A5,
            "a6" => Register::A6,
            "a7" => Register::A7,
            _ => return Err(format!("unknown register {}", s)),
        };
        Ok(register)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spellings() {
        assert_eq!(Register::A0.x(), "a0");
        assert_eq!(Register::A0.c(), "ca0");
        assert_eq!(Register::Fp.c(), "cfp");
        assert_eq!(Register::Zero.c(), "cnull");
    }

    #[test]
    fn test_parse() {
        assert_eq!("a3".parse::<Register>(), Ok(Register::A3));
        assert_eq!("s0".parse::<Register>(), Ok(Register::Fp));
        assert!("x42".parse::<Register>().is_err());
    }

    #[test]
    fn test_classes() {
        assert!(Register::A7.is_argument());
        assert!(!Register::T0.is_argument());
    }
}
