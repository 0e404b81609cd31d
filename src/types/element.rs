//! Element types for tensor values

use std::fmt;
use std::str::FromStr;

/// Element type of a tensor value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// 16-bit IEEE float
    F16,
    /// 32-bit IEEE float
    F32,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 8-bit unsigned integer
    U8,
    /// Boolean
    Bool,
}

impl ElementType {
    /// Whether this is a floating-point type
    pub fn is_float(&self) -> bool {
        matches!(self, ElementType::F16 | ElementType::F32)
    }

    /// Whether this is an integer type
    pub fn is_integer(&self) -> bool {
        matches!(self, ElementType::I32 | ElementType::I64 | ElementType::U8)
    }

    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::F16 => "f16",
            ElementType::F32 => "f32",
            ElementType::I32 => "i32",
            ElementType::I64 => "i64",
            ElementType::U8 => "u8",
            ElementType::Bool => "bool",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "f16" => Ok(ElementType::F16),
            "f32" => Ok(ElementType::F32),
            "i32" => Ok(ElementType::I32),
            "i64" => Ok(ElementType::I64),
            "u8" => Ok(ElementType::U8),
            "bool" => Ok(ElementType::Bool),
            _ => Err(()),
        }
    }
}
