//! Types shared by every ladder level: names, labels, data and value types, record layout

use super::instruction::fits_immediate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbolic name of an abstract location or record field
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Name(String);

impl Name {
    /// Creates a name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name as text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Name {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Label of a procedure or block
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    /// Creates a label
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// The label as text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Label {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<Name> for Label {
    fn from(name: Name) -> Self {
        Self(name.0)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rounds `value` up to a multiple of `alignment`
pub fn align_up(value: i64, alignment: i64) -> i64 {
    (value + alignment - 1) / alignment * alignment
}

/// Physical datum kinds, the only types left from the Calling Convention level down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Unsigned byte
    U8,
    /// Signed 32-bit word
    S32,
    /// 128-bit capability
    Cap,
}

impl DataType {
    /// Size in bytes
    pub fn byte_size(self) -> i64 {
        match self {
            DataType::U8 => 1,
            DataType::S32 => 4,
            DataType::Cap => 16,
        }
    }

    /// Natural alignment in bytes
    pub fn alignment(self) -> i64 {
        self.byte_size()
    }

    /// log2 of the byte size, used to scale element indices
    pub fn size_shift(self) -> i64 {
        match self {
            DataType::U8 => 0,
            DataType::S32 => 2,
            DataType::Cap => 4,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::U8 => f.write_str("u8"),
            DataType::S32 => f.write_str("s32"),
            DataType::Cap => f.write_str("cap"),
        }
    }
}

/// Type of a value above the Calling Convention level
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Unsigned byte
    U8,
    /// Signed 32-bit word
    S32,
    /// Capability of given type
    Cap(CapabilityType),
}

impl ValueType {
    /// The physical datum type
    pub fn data_type(&self) -> DataType {
        match self {
            ValueType::U8 => DataType::U8,
            ValueType::S32 => DataType::S32,
            ValueType::Cap(_) => DataType::Cap,
        }
    }

    /// Size in bytes
    pub fn byte_size(&self) -> i64 {
        self.data_type().byte_size()
    }

    /// The capability type, if this is a capability
    pub fn capability(&self) -> Option<&CapabilityType> {
        match self {
            ValueType::Cap(capability) => Some(capability),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::U8 => f.write_str("u8"),
            ValueType::S32 => f.write_str("s32"),
            ValueType::Cap(capability) => write!(f, "cap({})", capability),
        }
    }
}

/// What a capability grants access to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CapabilityType {
    /// Homogeneous vector of elements
    Vector(Box<ValueType>),
    /// Record with named fields
    Record(RecordType),
    /// Seal capability usable only for sealing
    Seal,
    /// Code capability to a procedure
    Code,
    /// Capability sealed with a seal; opaque until unsealed
    Sealed(Box<CapabilityType>),
}

impl CapabilityType {
    /// Whether the capability is sealed and therefore cannot be dereferenced
    pub fn is_sealed(&self) -> bool {
        matches!(self, CapabilityType::Sealed(_))
    }
}

impl fmt::Display for CapabilityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityType::Vector(element) => write!(f, "vector({})", element),
            CapabilityType::Record(record) => write!(f, "record({})", record),
            CapabilityType::Seal => f.write_str("seal"),
            CapabilityType::Code => f.write_str("code"),
            CapabilityType::Sealed(inner) => write!(f, "sealed({})", inner),
        }
    }
}

/// A field in a record type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// The name of the field
    pub name: Name,
    /// The type of the field
    #[serde(rename = "type")]
    pub value_type: ValueType,
}

impl Field {
    /// Creates a field
    pub fn new(name: impl Into<Name>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}

/// A record type with naturally aligned fields in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordType {
    /// The fields, in layout order
    pub fields: Vec<Field>,
}

impl RecordType {
    /// Creates a record type
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Fields paired with their byte offsets
    pub fn layout(&self) -> Vec<(&Field, i64)> {
        let mut offset = 0;
        self.fields
            .iter()
            .map(|field| {
                let data_type = field.value_type.data_type();
                let field_offset = align_up(offset, data_type.alignment());
                offset = field_offset + data_type.byte_size();
                (field, field_offset)
            })
            .collect()
    }

    /// Alignment of the whole record
    pub fn alignment(&self) -> i64 {
        self.fields
            .iter()
            .map(|f| f.value_type.data_type().alignment())
            .max()
            .unwrap_or(1)
    }

    /// Size in bytes, padded to the record's alignment
    pub fn byte_size(&self) -> i64 {
        let end = self
            .layout()
            .last()
            .map(|(field, offset)| offset + field.value_type.byte_size())
            .unwrap_or(0);
        align_up(end, self.alignment())
    }

    /// The field with given name
    pub fn field(&self, name: &Name) -> Option<&Field> {
        self.fields.iter().find(|f| &f.name == name)
    }

    /// Byte offset of the field with given name
    pub fn offset_of(&self, name: &Name) -> Option<i64> {
        self.layout()
            .into_iter()
            .find(|(field, _)| &field.name == name)
            .map(|(_, offset)| offset)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|field| format!("{}: {}", field.name, field.value_type))
            .collect();
        write!(f, "{}", fields.join(", "))
    }
}

/// A named, typed procedure parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parameter {
    /// The parameter's name within the procedure body
    pub name: Name,
    /// The parameter's type
    #[serde(rename = "type")]
    pub value_type: ValueType,
}

impl Parameter {
    /// Creates a parameter
    pub fn new(name: impl Into<Name>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}

/// Integral binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryOperator {
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Bitwise exclusive or
    Xor,
    /// Left shift
    Sll,
    /// Zero-extending right shift
    Srl,
    /// Sign-extending right shift
    Sra,
}

impl BinaryOperator {
    /// Assembly mnemonic of the register-register form
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinaryOperator::Add => "add",
            BinaryOperator::Sub => "sub",
            BinaryOperator::Mul => "mul",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
            BinaryOperator::Xor => "xor",
            BinaryOperator::Sll => "sll",
            BinaryOperator::Srl => "srl",
            BinaryOperator::Sra => "sra",
        }
    }

    /// Whether `immediate` can be encoded in the operator's register-immediate form
    ///
    /// Shift amounts outside `0..=31` take the register form, which masks them like [`evaluate`].
    ///
    /// [`evaluate`]: BinaryOperator::evaluate
    pub fn accepts_immediate(self, immediate: i64) -> bool {
        match self {
            BinaryOperator::Sub | BinaryOperator::Mul => false,
            BinaryOperator::Sll | BinaryOperator::Srl | BinaryOperator::Sra => {
                (0..=31).contains(&immediate)
            }
            BinaryOperator::Add | BinaryOperator::And | BinaryOperator::Or | BinaryOperator::Xor => {
                fits_immediate(immediate)
            }
        }
    }

    /// Evaluates the operator over two 32-bit words
    pub fn evaluate(self, lhs: i64, rhs: i64) -> i64 {
        let (lhs, rhs) = (lhs as i32, rhs as i32);
        let shift = (rhs & 31) as u32;
        let result = match self {
            BinaryOperator::Add => lhs.wrapping_add(rhs),
            BinaryOperator::Sub => lhs.wrapping_sub(rhs),
            BinaryOperator::Mul => lhs.wrapping_mul(rhs),
            BinaryOperator::And => lhs & rhs,
            BinaryOperator::Or => lhs | rhs,
            BinaryOperator::Xor => lhs ^ rhs,
            BinaryOperator::Sll => lhs.wrapping_shl(shift),
            BinaryOperator::Srl => ((lhs as u32) >> shift) as i32,
            BinaryOperator::Sra => lhs >> shift,
        };
        result as i64
    }
}

/// Relations between two integers used by branches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchRelation {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
}

impl BranchRelation {
    /// Mnemonic suffix of the branch instruction, e.g. `eq` in `beq`
    pub fn mnemonic(self) -> &'static str {
        match self {
            BranchRelation::Eq => "eq",
            BranchRelation::Ne => "ne",
            BranchRelation::Lt => "lt",
            BranchRelation::Le => "le",
            BranchRelation::Gt => "gt",
            BranchRelation::Ge => "ge",
        }
    }

    /// The relation that holds exactly when this one does not
    pub fn negated(self) -> Self {
        match self {
            BranchRelation::Eq => BranchRelation::Ne,
            BranchRelation::Ne => BranchRelation::Eq,
            BranchRelation::Lt => BranchRelation::Ge,
            BranchRelation::Le => BranchRelation::Gt,
            BranchRelation::Gt => BranchRelation::Le,
            BranchRelation::Ge => BranchRelation::Lt,
        }
    }

    /// Whether `x R x` holds
    pub fn is_reflexive(self) -> bool {
        matches!(
            self,
            BranchRelation::Eq | BranchRelation::Le | BranchRelation::Ge
        )
    }

    /// Evaluates the relation over two constants
    pub fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            BranchRelation::Eq => lhs == rhs,
            BranchRelation::Ne => lhs != rhs,
            BranchRelation::Lt => lhs < rhs,
            BranchRelation::Le => lhs <= rhs,
            BranchRelation::Gt => lhs > rhs,
            BranchRelation::Ge => lhs >= rhs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word() -> ValueType {
        ValueType::S32
    }

    #[test]
    fn test_record_layout_aligns_fields() {
        let record = RecordType::new(vec![
            Field::new("flag", ValueType::U8),
            Field::new("count", word()),
            Field::new("next", ValueType::Cap(CapabilityType::Seal)),
        ]);
        let offsets: Vec<i64> = record.layout().iter().map(|(_, o)| *o).collect();
        assert_eq!(offsets, vec![0, 4, 16]);
        assert_eq!(record.byte_size(), 32);
        assert_eq!(record.offset_of(&Name::from("count")), Some(4));
        assert_eq!(record.offset_of(&Name::from("missing")), None);
    }

    #[test]
    fn test_empty_record() {
        assert_eq!(RecordType::default().byte_size(), 0);
    }

    #[test]
    fn test_word_record_size() {
        let record = RecordType::new(vec![Field::new("a", word()), Field::new("b", word())]);
        assert_eq!(record.byte_size(), 8);
    }

    #[test]
    fn test_operators_wrap_at_word_size() {
        assert_eq!(BinaryOperator::Add.evaluate(3, 4), 7);
        assert_eq!(BinaryOperator::Add.evaluate(i32::MAX as i64, 1), i32::MIN as i64);
        assert_eq!(BinaryOperator::Srl.evaluate(-1, 28), 15);
        assert_eq!(BinaryOperator::Sra.evaluate(-16, 2), -4);
        assert_eq!(BinaryOperator::Sll.evaluate(1, 40), 256);
    }

    #[test]
    fn test_immediate_forms() {
        assert!(BinaryOperator::Add.accepts_immediate(-2048));
        assert!(!BinaryOperator::Add.accepts_immediate(2048));
        assert!(!BinaryOperator::Sub.accepts_immediate(1));
        assert!(BinaryOperator::Sll.accepts_immediate(31));
        assert!(!BinaryOperator::Sll.accepts_immediate(40));
        assert!(!BinaryOperator::Sra.accepts_immediate(-1));
    }

    #[test]
    fn test_relations() {
        for relation in [
            BranchRelation::Eq,
            BranchRelation::Ne,
            BranchRelation::Lt,
            BranchRelation::Le,
            BranchRelation::Gt,
            BranchRelation::Ge,
        ] {
            for (x, y) in [(1, 2), (2, 2), (3, 2)] {
                assert_eq!(relation.holds(x, y), !relation.negated().holds(x, y));
            }
            assert_eq!(relation.is_reflexive(), relation.holds(5, 5));
        }
    }
}
