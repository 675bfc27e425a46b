//! Capability allocation and sealing
//!
//! Records and vectors are buffers reached through bounded capabilities. An allocation is
//! *scoped* when its capability cannot outlive the scope introducing it; scoped buffers live in
//! the call frame and are released with their scope, others are taken from the heap.
//!
//! Sealing pairs a capability with a seal: `seal` obtains a fresh seal capability and
//! `sealed(c, with: s)` produces a capability that cannot be dereferenced or invoked until it is
//! unsealed with `s`.

use super::ir::cc;
use super::ir::types::{CapabilityType, Name, RecordType, ValueType};
use super::ladder::Level;
use crate::error::{Error, Result};

/// Decides whether the capability bound to `name` by an allocation stays within its scope
///
/// No escape analysis is performed: every allocation is assumed scoped. A capability that is
/// returned or stored into a longer-lived buffer therefore dangles once its scope is popped.
pub fn is_scoped(name: &Name) -> bool {
    tracing::trace!(%name, "allocation assumed scoped");
    true
}

/// Allocation of a record buffer
pub fn allocate_record(into: Name, record: &RecordType, scoped: bool) -> cc::Effect {
    cc::Effect::Allocate {
        into,
        bytes: record.byte_size(),
        scoped,
    }
}

/// Allocation of a vector buffer of `count` elements
pub fn allocate_vector(into: Name, element: &ValueType, count: i64, scoped: bool) -> Result<cc::Effect> {
    if count < 1 {
        return Err(Error::lowering(
            Level::SV,
            format!("vector of {} elements", count),
            "vectors hold at least one element",
        ));
    }
    let bytes = element.byte_size().checked_mul(count).ok_or_else(|| {
        Error::lowering(
            Level::SV,
            format!("vector of {} {} elements", count, element),
            "the vector's size in bytes overflows",
        )
    })?;
    Ok(cc::Effect::Allocate {
        into,
        bytes,
        scoped,
    })
}

/// Creation of a fresh seal capability
pub fn create_seal(into: Name) -> cc::Effect {
    cc::Effect::CreateSeal { into }
}

/// Type of `source` sealed with a capability of type `seal`
pub fn sealed_type(source: &CapabilityType, seal: &CapabilityType) -> Result<CapabilityType> {
    if *seal != CapabilityType::Seal {
        return Err(Error::lowering(
            Level::SV,
            format!("sealing with a {} capability", seal),
            "only seal capabilities can seal",
        ));
    }
    if source.is_sealed() {
        return Err(Error::lowering(
            Level::SV,
            format!("sealing a {} capability", source),
            "the capability is already sealed",
        ));
    }
    Ok(CapabilityType::Sealed(Box::new(source.clone())))
}

/// Sealing of `source` with `seal`
pub fn seal(into: Name, source: Name, seal: Name) -> cc::Effect {
    cc::Effect::Seal { into, source, seal }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::types::Field;

    #[test]
    fn test_record_allocation_uses_padded_size() {
        let record = RecordType::new(vec![
            Field::new("tag", ValueType::U8),
            Field::new("count", ValueType::S32),
        ]);
        assert_eq!(
            allocate_record(Name::from("r"), &record, true),
            cc::Effect::Allocate {
                into: Name::from("r"),
                bytes: 8,
                scoped: true
            }
        );
    }

    #[test]
    fn test_empty_vector_is_rejected() {
        assert!(allocate_vector(Name::from("v"), &ValueType::S32, 0, true).is_err());
        assert_eq!(
            allocate_vector(Name::from("v"), &ValueType::S32, 3, false).unwrap(),
            cc::Effect::Allocate {
                into: Name::from("v"),
                bytes: 12,
                scoped: false
            }
        );
    }

    #[test]
    fn test_vector_size_overflow_is_rejected() {
        let result = allocate_vector(Name::from("v"), &ValueType::S32, 1 << 62, true);
        assert!(matches!(result, Err(Error::Lowering { level: Level::SV, .. })));
    }

    #[test]
    fn test_sealing_rules() {
        let code = CapabilityType::Code;
        assert_eq!(
            sealed_type(&code, &CapabilityType::Seal).unwrap(),
            CapabilityType::Sealed(Box::new(CapabilityType::Code))
        );
        assert!(sealed_type(&code, &CapabilityType::Code).is_err());
        let sealed = CapabilityType::Sealed(Box::new(code));
        assert!(sealed_type(&sealed, &CapabilityType::Seal).is_err());
    }

    #[test]
    fn test_allocations_are_scoped() {
        assert!(is_scoped(&Name::from("buffer")));
    }
}
