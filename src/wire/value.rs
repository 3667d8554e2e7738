use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::wire::error::WireError;

/// A self-describing tagged value, per the tag+type-id encoding in §6.1.
///
/// Each field of a `Struct` carries its own tag number so the envelope
/// remains decodable even as message variants gain or drop optional fields
/// across versions; unknown tags are simply skipped by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Bool(bool),
    Byte(u8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Struct(BTreeMap<u8, WireValue>),
    Map(BTreeMap<WireValue, WireValue>),
    List(Vec<WireValue>),
    Bytes(Vec<u8>),
    StructBegin,
    StructEnd,
}

impl Eq for WireValue {}

impl PartialOrd for WireValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WireValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (WireValue::Bool(a), WireValue::Bool(b)) => a.cmp(b),
            (WireValue::Byte(a), WireValue::Byte(b)) => a.cmp(b),
            (WireValue::Short(a), WireValue::Short(b)) => a.cmp(b),
            (WireValue::Int(a), WireValue::Int(b)) => a.cmp(b),
            (WireValue::Long(a), WireValue::Long(b)) => a.cmp(b),
            (WireValue::Float(a), WireValue::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (WireValue::Double(a), WireValue::Double(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (WireValue::String(a), WireValue::String(b)) => a.cmp(b),
            (WireValue::Struct(a), WireValue::Struct(b)) => a.cmp(b),
            (WireValue::Map(a), WireValue::Map(b)) => a.cmp(b),
            (WireValue::List(a), WireValue::List(b)) => a.cmp(b),
            (WireValue::Bytes(a), WireValue::Bytes(b)) => a.cmp(b),
            (WireValue::StructBegin, WireValue::StructBegin) => Ordering::Equal,
            (WireValue::StructEnd, WireValue::StructEnd) => Ordering::Equal,
            _ => Ordering::Less,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Int1 = 0,
    Int2 = 1,
    Int4 = 2,
    Int8 = 3,
    Float = 4,
    Double = 5,
    String1 = 6,
    String4 = 7,
    Map = 8,
    List = 9,
    StructBegin = 10,
    StructEnd = 11,
    Zero = 12,
    Bytes = 13,
}

impl From<WireType> for u8 {
    fn from(t: WireType) -> Self {
        t as u8
    }
}

impl TryFrom<u8> for WireType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(WireType::Int1),
            1 => Ok(WireType::Int2),
            2 => Ok(WireType::Int4),
            3 => Ok(WireType::Int8),
            4 => Ok(WireType::Float),
            5 => Ok(WireType::Double),
            6 => Ok(WireType::String1),
            7 => Ok(WireType::String4),
            8 => Ok(WireType::Map),
            9 => Ok(WireType::List),
            10 => Ok(WireType::StructBegin),
            11 => Ok(WireType::StructEnd),
            12 => Ok(WireType::Zero),
            13 => Ok(WireType::Bytes),
            other => Err(WireError::UnknownTypeId(other)),
        }
    }
}

impl TryFrom<WireValue> for i32 {
    type Error = WireError;

    fn try_from(value: WireValue) -> Result<Self, Self::Error> {
        match value {
            WireValue::Int(v) => Ok(v),
            WireValue::Short(v) => Ok(v as i32),
            WireValue::Byte(v) => Ok(v as i32),
            _ => Err(WireError::TypeMismatch { expected: "Int", actual: "other" }),
        }
    }
}

impl TryFrom<WireValue> for i64 {
    type Error = WireError;

    fn try_from(value: WireValue) -> Result<Self, Self::Error> {
        match value {
            WireValue::Long(v) => Ok(v),
            WireValue::Int(v) => Ok(v as i64),
            WireValue::Short(v) => Ok(v as i64),
            WireValue::Byte(v) => Ok(v as i64),
            _ => Err(WireError::TypeMismatch { expected: "Long", actual: "other" }),
        }
    }
}

impl TryFrom<WireValue> for String {
    type Error = WireError;

    fn try_from(value: WireValue) -> Result<Self, Self::Error> {
        match value {
            WireValue::String(v) => Ok(v),
            _ => Err(WireError::TypeMismatch { expected: "String", actual: "other" }),
        }
    }
}

impl TryFrom<WireValue> for bool {
    type Error = WireError;

    fn try_from(value: WireValue) -> Result<Self, Self::Error> {
        match value {
            WireValue::Bool(v) => Ok(v),
            WireValue::Byte(v) => Ok(v != 0),
            WireValue::Short(v) => Ok(v != 0),
            WireValue::Int(v) => Ok(v != 0),
            WireValue::Long(v) => Ok(v != 0),
            _ => Err(WireError::TypeMismatch { expected: "Bool", actual: "other" }),
        }
    }
}

impl TryFrom<WireValue> for Vec<u8> {
    type Error = WireError;

    fn try_from(value: WireValue) -> Result<Self, Self::Error> {
        match value {
            WireValue::Bytes(v) => Ok(v),
            _ => Err(WireError::TypeMismatch { expected: "Bytes", actual: "other" }),
        }
    }
}

impl TryFrom<WireValue> for BTreeMap<u8, WireValue> {
    type Error = WireError;

    fn try_from(value: WireValue) -> Result<Self, Self::Error> {
        match value {
            WireValue::Struct(v) => Ok(v),
            _ => Err(WireError::TypeMismatch { expected: "Struct", actual: "other" }),
        }
    }
}
