//! Physical locations and straight-line machine operations
//!
//! From the Conditionals level down, every location is a register or a frame slot addressed
//! relative to the frame pointer. No abstract location can be expressed here.

use super::register::Register;
use super::types::{BinaryOperator, DataType, Label};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A register or a frame slot at a byte offset from the frame pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Location {
    /// A register
    Register(Register),
    /// A frame slot, at a negative offset from `fp`
    Frame(i64),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Register(register) => write!(f, "{}", register),
            Location::Frame(offset) => write!(f, "{}(fp)", offset),
        }
    }
}

/// A constant or a physical location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    /// Integer constant
    Constant(i64),
    /// Physical location
    Location(Location),
}

impl From<Register> for Source {
    fn from(register: Register) -> Self {
        Source::Location(Location::Register(register))
    }
}

impl From<Location> for Source {
    fn from(location: Location) -> Self {
        Source::Location(location)
    }
}

impl From<i64> for Source {
    fn from(value: i64) -> Self {
        Source::Constant(value)
    }
}

/// A straight-line operation over physical locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    /// Copies a datum
    Set(DataType, Location, Source),
    /// Computes `lhs op rhs` into a location
    Compute {
        /// Destination
        into: Location,
        /// First operand
        lhs: Source,
        /// Operator
        op: BinaryOperator,
        /// Second operand
        rhs: Source,
    },
    /// Loads a datum through a capability
    Load {
        /// Type of the loaded datum
        #[serde(rename = "type")]
        data_type: DataType,
        /// Destination
        into: Location,
        /// Capability to load through
        from: Location,
        /// Byte offset from the capability's address
        offset: Source,
    },
    /// Stores a datum through a capability
    Store {
        /// Type of the stored datum
        #[serde(rename = "type")]
        data_type: DataType,
        /// Capability to store through
        into: Location,
        /// Byte offset from the capability's address
        offset: Source,
        /// Datum to store
        from: Source,
    },
    /// Allocates a heap buffer and puts a capability to it in `into`
    Allocate {
        /// Destination of the capability
        into: Location,
        /// Buffer size in bytes
        bytes: i64,
    },
    /// Derives a capability to a buffer in the current frame
    FrameBuffer {
        /// Destination of the capability
        into: Location,
        /// Frame offset of the buffer's lowest byte
        offset: i64,
        /// Buffer size in bytes
        bytes: i64,
    },
    /// Obtains a fresh seal capability
    CreateSeal {
        /// Destination of the seal
        into: Location,
    },
    /// Seals a capability
    Seal {
        /// Destination of the sealed capability
        into: Location,
        /// Capability to seal
        source: Location,
        /// Seal capability
        seal: Location,
    },
    /// Derives a sealed entry capability to a procedure
    CodeCapability {
        /// Destination of the capability
        into: Location,
        /// Procedure to derive the capability to
        procedure: Label,
    },
    /// Allocates a call frame of `size` bytes for locals
    PushFrame(i64),
    /// Deallocates the current call frame and restores the caller's
    PopFrame,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shapes() {
        let set = Operation::Set(
            DataType::S32,
            Location::Frame(-4),
            Source::from(Register::A0),
        );
        assert_eq!(
            serde_json::to_value(&set).unwrap(),
            json!({"set": ["s32", {"frame": -4}, {"register": "a0"}]})
        );
        assert_eq!(
            serde_json::to_value(Operation::PopFrame).unwrap(),
            json!("popFrame")
        );
    }
}
