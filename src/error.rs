//! Error types for the CHERI ladder compiler

use crate::compiler::Level;
use thiserror::Error;

/// Compilation errors
///
/// Every error is fatal for the compilation that raised it: there is no partial output and no
/// retry. Variants are grouped by [`ErrorCategory`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Parse errors
    /// Syntax error encountered while reading program text
    ///
    /// **Triggered by:** Malformed text (unbalanced parentheses, stray characters)
    /// **Example:** `do(set(x, 1)` (missing closing parenthesis)
    #[error("Syntax error in {level} program at line {line}, column {col}: {message}")]
    SyntaxError {
        /// Level the text was read at
        level: Level,
        /// Line number where error occurred
        line: usize,
        /// Column number where error occurred
        col: usize,
        /// Error description
        message: String,
    },

    /// Unexpected end of text during parsing
    #[error("Unexpected end of {level} program at line {line}, column {col}")]
    UnexpectedEof {
        /// Level the text was read at
        level: Level,
        /// Line where the text ended
        line: usize,
        /// Column where the text ended
        col: usize,
    },

    /// Unexpected token encountered during parsing
    #[error("Unexpected token in {level} program at line {line}, column {col}: expected {expected}, got {got}")]
    UnexpectedToken {
        /// Level the text was read at
        level: Level,
        /// Expected token description
        expected: String,
        /// Actual token received
        got: String,
        /// Line of the offending token
        line: usize,
        /// Column of the offending token
        col: usize,
    },

    /// Well-formed text that does not describe a program of the given level
    ///
    /// **Triggered by:** Decoding text at the wrong level or with an unknown construct
    /// **Example:** `do(frobnicate(x))` decoded as a CC program
    ///
    /// The position is that of the construct the decoder names, or the start of the program
    /// when it names none (e.g. a missing field).
    #[error("Cannot decode {level} program at line {line}, column {col}: {message}")]
    Decode {
        /// Level the text was decoded at
        level: Level,
        /// Line of the offending construct
        line: usize,
        /// Column of the offending construct
        col: usize,
        /// Shape mismatch reported by the decoder
        message: String,
    },

    // Validation errors
    /// A program violates an invariant of its own level
    #[error("Invalid {level} program: {message}")]
    Validation {
        /// Level of the offending program
        level: Level,
        /// Violated invariant
        message: String,
    },

    /// A location is declared or used with a type that conflicts with its declaration
    ///
    /// **Triggered by:** `set(x, 1)` followed by `set(x, record(...))` in the same scope chain
    #[error("{level}: {location} is declared as {declared} but used as {requested}")]
    InconsistentTyping {
        /// Level of the offending program
        level: Level,
        /// Location whose type conflicts
        location: String,
        /// Type from the earlier declaration
        declared: String,
        /// Type required by the offending effect
        requested: String,
    },

    /// A location is referenced without being declared in any active scope
    ///
    /// **Triggered by:** Reading a location before assigning it, or after its scope was popped
    #[error("{level}: {location} is not declared in any active scope")]
    UndeclaredLocation {
        /// Level of the offending program
        level: Level,
        /// Undeclared location
        location: String,
    },

    /// A block program has no block labelled with its entry label
    #[error("{level}: no entry block labelled {label}")]
    MissingEntryBlock {
        /// Level of the offending program
        level: Level,
        /// Designated entry label
        label: String,
    },

    /// Two blocks or procedures share a label
    #[error("{level}: label {label} is defined more than once")]
    DuplicateLabel {
        /// Level of the offending program
        level: Level,
        /// Duplicated label
        label: String,
    },

    /// A continuation, call or capability refers to a label that is not defined
    #[error("{level}: label {label} is not defined")]
    UndefinedLabel {
        /// Level of the offending program
        level: Level,
        /// Missing label
        label: String,
    },

    // Lowering errors
    /// A construct cannot be expressed at the next lower level
    #[error("Cannot lower {construct} from {level}: {reason}")]
    Lowering {
        /// Level being lowered
        level: Level,
        /// Construct that cannot be lowered
        construct: String,
        /// Why the construct cannot be lowered
        reason: String,
    },

    /// A procedure call result is used directly as an assignment target
    ///
    /// **Triggered by:** `setField(f, of: evaluate(g, []), to: 1)`
    /// **Prevention:** Bind the call result to a name with `let` first
    #[error("{level}: procedure call results cannot be used directly as assignment targets (call to {procedure})")]
    IntermediateCall {
        /// Level being lowered
        level: Level,
        /// Procedure whose result was used as a target
        procedure: String,
    },

    /// Parameters overflowed into a parameter record but no register is left for its capability
    ///
    /// **Triggered by:** A procedure with more parameters than argument registers when the
    /// configured argument registers already exhaust the platform's argument registers
    #[error("Procedure {procedure} needs a parameter record but no register is available for its capability")]
    RecordRegisterUnavailable {
        /// Procedure whose parameters could not be assigned
        procedure: String,
    },

    /// The configured argument registers cannot carry parameters
    ///
    /// **Triggered by:** `--argument-registers t0,t1` (not argument registers) or
    /// `--argument-registers a0,a0` (a register listed twice)
    #[error("{register} cannot be used as an argument register: {reason}")]
    InvalidArgumentRegister {
        /// Offending register
        register: String,
        /// Why the register was refused
        reason: String,
    },

    // Toolchain errors
    /// External assembler or linker failed
    #[error("Toolchain error (exit status {status:?}): {message}")]
    Toolchain {
        /// Exit status of the child process, if it exited normally
        status: Option<i32>,
        /// Diagnostic output or launch failure
        message: String,
    },

    /// File system failure while preparing or collecting toolchain files
    #[error("I/O error: {0}")]
    Io(String),
}

/// Error category, one per stage of a compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed or mis-shaped program text
    Parse,
    /// Program violates an invariant of its level
    Validation,
    /// Construct cannot be lowered
    Lowering,
    /// External toolchain failure
    Toolchain,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCategory::Parse => "parse error",
            ErrorCategory::Validation => "validation error",
            ErrorCategory::Lowering => "lowering error",
            ErrorCategory::Toolchain => "toolchain error",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Create a lowering error for a construct at a level
    pub fn lowering(level: Level, construct: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Lowering {
            level,
            construct: construct.into(),
            reason: reason.into(),
        }
    }

    /// Create a validation error with a message
    pub fn validation(level: Level, message: impl Into<String>) -> Self {
        Error::Validation {
            level,
            message: message.into(),
        }
    }

    /// Classify the error by compilation stage
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::SyntaxError { .. }
            | Error::UnexpectedEof { .. }
            | Error::UnexpectedToken { .. }
            | Error::Decode { .. } => ErrorCategory::Parse,

            Error::Validation { .. }
            | Error::InconsistentTyping { .. }
            | Error::UndeclaredLocation { .. }
            | Error::MissingEntryBlock { .. }
            | Error::DuplicateLabel { .. }
            | Error::UndefinedLabel { .. } => ErrorCategory::Validation,

            Error::Lowering { .. }
            | Error::IntermediateCall { .. }
            | Error::RecordRegisterUnavailable { .. }
            | Error::InvalidArgumentRegister { .. } => ErrorCategory::Lowering,

            Error::Toolchain { .. } | Error::Io(_) => ErrorCategory::Toolchain,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io(error.to_string())
    }
}

/// Result type for compiler operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::UnexpectedEof {
                level: Level::EX,
                line: 1,
                col: 1
            }
            .category(),
            ErrorCategory::Parse
        );
        assert_eq!(
            Error::validation(Level::BB, "no blocks").category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            Error::IntermediateCall {
                level: Level::EX,
                procedure: "f".into()
            }
            .category(),
            ErrorCategory::Lowering
        );
        assert_eq!(
            Error::Toolchain {
                status: Some(1),
                message: "ld: undefined symbol".into()
            }
            .category(),
            ErrorCategory::Toolchain
        );
    }

    #[test]
    fn test_messages_name_level() {
        let error = Error::UndeclaredLocation {
            level: Level::CC,
            location: "x".into(),
        };
        assert_eq!(error.to_string(), "CC: x is not declared in any active scope");

        let error = Error::SyntaxError {
            level: Level::BB,
            line: 3,
            col: 7,
            message: "unexpected character '@'".into(),
        };
        assert_eq!(
            error.to_string(),
            "Syntax error in BB program at line 3, column 7: unexpected character '@'"
        );
    }
}
