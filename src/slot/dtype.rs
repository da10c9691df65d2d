use crate::core::errors::{RmsError, Result};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Element types a slot can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Float64,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Bool,
}

impl DType {
    pub fn name(&self) -> &'static str {
        match self {
            DType::Float64 => "float64",
            DType::Int64 => "int64",
            DType::UInt8 => "uint8",
            DType::UInt16 => "uint16",
            DType::UInt32 => "uint32",
            DType::UInt64 => "uint64",
            DType::Bool => "bool",
        }
    }

    /// Size in bytes of one element in the equivalent C layout
    pub fn size_of(&self) -> usize {
        match self {
            DType::Float64 | DType::Int64 | DType::UInt64 => 8,
            DType::UInt32 => 4,
            DType::UInt16 => 2,
            DType::UInt8 | DType::Bool => 1,
        }
    }

    /// Encode a numeric default into this type's cell representation.
    /// Out-of-range values saturate.
    pub fn bits_from_f64(&self, value: f64) -> u64 {
        match self {
            DType::Float64 => value.to_bits(),
            DType::Int64 => (value as i64) as u64,
            DType::UInt8 => (value as u8) as u64,
            DType::UInt16 => (value as u16) as u64,
            DType::UInt32 => (value as u32) as u64,
            DType::UInt64 => value as u64,
            DType::Bool => (value != 0.0) as u64,
        }
    }

    pub fn bits_to_json(&self, bits: u64) -> Value {
        match self {
            DType::Float64 => serde_json::Number::from_f64(f64::from_bits(bits))
                .map(Value::Number)
                .unwrap_or(Value::Null),
            DType::Int64 => Value::from(bits as i64),
            DType::UInt8 | DType::UInt16 | DType::UInt32 | DType::UInt64 => Value::from(bits),
            DType::Bool => Value::Bool(bits != 0),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = RmsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "float" | "float64" => Ok(DType::Float64),
            "int" | "int64" => Ok(DType::Int64),
            "uint8" => Ok(DType::UInt8),
            "uint16" => Ok(DType::UInt16),
            "uint32" => Ok(DType::UInt32),
            "uint64" => Ok(DType::UInt64),
            "bool" | "byte" => Ok(DType::Bool),
            other => Err(RmsError::unsupported_type(other)),
        }
    }
}

/// A Rust type that maps onto one [`DType`]
pub trait Element: Copy + Send + Sync + 'static {
    const DTYPE: DType;

    fn to_bits(self) -> u64;
    fn from_bits(bits: u64) -> Self;
}

impl Element for f64 {
    const DTYPE: DType = DType::Float64;

    fn to_bits(self) -> u64 {
        f64::to_bits(self)
    }

    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }
}

impl Element for i64 {
    const DTYPE: DType = DType::Int64;

    fn to_bits(self) -> u64 {
        self as u64
    }

    fn from_bits(bits: u64) -> Self {
        bits as i64
    }
}

macro_rules! unsigned_element {
    ($ty:ty, $dtype:expr) => {
        impl Element for $ty {
            const DTYPE: DType = $dtype;

            fn to_bits(self) -> u64 {
                self as u64
            }

            fn from_bits(bits: u64) -> Self {
                bits as $ty
            }
        }
    };
}

unsigned_element!(u8, DType::UInt8);
unsigned_element!(u16, DType::UInt16);
unsigned_element!(u32, DType::UInt32);
unsigned_element!(u64, DType::UInt64);

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn to_bits(self) -> u64 {
        self as u64
    }

    fn from_bits(bits: u64) -> Self {
        bits != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("float".parse::<DType>().unwrap(), DType::Float64);
        assert_eq!("int".parse::<DType>().unwrap(), DType::Int64);
        assert_eq!("byte".parse::<DType>().unwrap(), DType::Bool);
        assert_eq!("uint16".parse::<DType>().unwrap(), DType::UInt16);
    }

    #[test]
    fn test_parse_unsupported() {
        match "complex128".parse::<DType>() {
            Err(RmsError::UnsupportedType { dtype }) => assert_eq!(dtype, "complex128"),
            other => panic!("expected UnsupportedType, got {:?}", other),
        }
    }

    #[test]
    fn test_default_casts() {
        assert_eq!(DType::UInt8.bits_from_f64(300.0), 255);
        assert_eq!(i64::from_bits(DType::Int64.bits_from_f64(-2.7)), -2);
        assert_eq!(DType::Bool.bits_from_f64(0.5), 1);
        assert_eq!(f64::from_bits(DType::Float64.bits_from_f64(1.5)), 1.5);
    }

    #[test]
    fn test_json_rendering() {
        assert_eq!(DType::Int64.bits_to_json((-3i64).to_bits()), serde_json::json!(-3));
        assert_eq!(DType::Bool.bits_to_json(0), serde_json::json!(false));
        assert_eq!(DType::Float64.bits_to_json(f64::NAN.to_bits()), Value::Null);
    }
}
