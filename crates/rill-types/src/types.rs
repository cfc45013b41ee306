//! Semantic types of the Rill language.
//!
//! [`Type`] is the analyzer's view of a value. The backend maps each type
//! onto one of four machine representations; see `rill_codegen::types`.

use serde::{Deserialize, Serialize};
use std::fmt;

// ══════════════════════════════════════════════════════════════════════════════
// Type
// ══════════════════════════════════════════════════════════════════════════════

/// A semantic type.
///
/// Booleans have no dedicated variant: comparisons and logical operators
/// produce [`Type::U8`] holding 0 or 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    // ── Integers ──
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,

    // ── Floats ──
    F32,
    F64,

    // ── Time ──
    /// Nanoseconds since the epoch.
    TimeStamp,
    /// Duration in nanoseconds.
    TimeSpan,

    /// Host-managed string, referenced by handle.
    Str,

    // ── Composites ──
    /// Host-managed sequence, referenced by handle.
    Series(Box<Type>),
    /// Reactive channel carrying values of the element type.
    Chan(Box<Type>),
}

impl Type {
    /// The boolean type.
    pub const BOOL: Type = Type::U8;

    pub fn series(elem: Type) -> Type {
        Type::Series(Box::new(elem))
    }

    pub fn chan(elem: Type) -> Type {
        Type::Chan(Box::new(elem))
    }

    /// Signed and unsigned integers, time stamps and time spans.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Type::I8
                | Type::I16
                | Type::I32
                | Type::I64
                | Type::U8
                | Type::U16
                | Type::U32
                | Type::U64
                | Type::TimeStamp
                | Type::TimeSpan
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, Type::U8 | Type::U16 | Type::U32 | Type::U64)
    }

    /// Whether values of this type need a 64-bit machine representation.
    pub fn is_64bit(&self) -> bool {
        matches!(
            self,
            Type::I64 | Type::U64 | Type::F64 | Type::TimeStamp | Type::TimeSpan
        )
    }

    pub fn is_series(&self) -> bool {
        matches!(self, Type::Series(_))
    }

    /// Values referenced through an i32 host handle.
    pub fn is_handle(&self) -> bool {
        matches!(self, Type::Str | Type::Series(_))
    }

    /// The element type of a series or channel, or the type itself.
    pub fn element(&self) -> &Type {
        match self {
            Type::Series(elem) | Type::Chan(elem) => elem,
            other => other,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::I8 => write!(f, "i8"),
            Type::I16 => write!(f, "i16"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::U8 => write!(f, "u8"),
            Type::U16 => write!(f, "u16"),
            Type::U32 => write!(f, "u32"),
            Type::U64 => write!(f, "u64"),
            Type::F32 => write!(f, "f32"),
            Type::F64 => write!(f, "f64"),
            Type::TimeStamp => write!(f, "timestamp"),
            Type::TimeSpan => write!(f, "timespan"),
            Type::Str => write!(f, "str"),
            Type::Series(elem) => write!(f, "series {elem}"),
            Type::Chan(elem) => write!(f, "chan {elem}"),
        }
    }
}
