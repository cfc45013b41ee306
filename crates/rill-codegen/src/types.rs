//! Machine representations and memory layout constants.
//!
//! Every semantic [`Type`] lowers to one of four WASM value types:
//!
//! | Semantic type                                  | Machine |
//! |------------------------------------------------|---------|
//! | i8, i16, i32, u8, u16, u32 (and booleans)      | i32     |
//! | i64, u64, timestamp, timespan                  | i64     |
//! | f32                                            | f32     |
//! | f64                                            | f64     |
//! | str, series, chan (host handles / keys)        | i32     |
//!
//! Linear memory, when present, holds the output regions of multi-output
//! functions followed by interned string data:
//!
//! ```text
//! output_memory_base:  [dirty bitmap: u64][out0][out1]...   function A
//!                      [dirty bitmap: u64][out0]...         function B
//! data_base:           "interned" "strings" ...
//! ```

use rill_types::Type;
use wasm_encoder::ValType;

/// WASM page size (64 KiB).
pub const PAGE_SIZE: u32 = 65_536;

/// Default start of the first output region.
pub const OUTPUT_MEMORY_BASE: u32 = 0x1000;

/// Width of the dirty bitmap preceding each output region.
pub const DIRTY_BITMAP_SIZE: u32 = 8;

/// One bit per output in a 64-bit dirty bitmap.
pub const MAX_OUTPUTS: usize = 64;

/// Host module every import is resolved against.
pub const IMPORT_MODULE: &str = "env";

/// Export name of the linear memory.
pub const MEMORY_EXPORT: &str = "memory";

// ══════════════════════════════════════════════════════════════════════════════
// MachineType
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineType {
    I32,
    I64,
    F32,
    F64,
}

impl MachineType {
    pub fn of(ty: &Type) -> MachineType {
        match ty {
            Type::F32 => MachineType::F32,
            Type::F64 => MachineType::F64,
            Type::I64 | Type::U64 | Type::TimeStamp | Type::TimeSpan => MachineType::I64,
            _ => MachineType::I32,
        }
    }

    pub fn val_type(self) -> ValType {
        match self {
            MachineType::I32 => ValType::I32,
            MachineType::I64 => ValType::I64,
            MachineType::F32 => ValType::F32,
            MachineType::F64 => ValType::F64,
        }
    }

    /// Size in bytes when stored in linear memory.
    pub fn width(self) -> u32 {
        match self {
            MachineType::I32 | MachineType::F32 => 4,
            MachineType::I64 | MachineType::F64 => 8,
        }
    }
}

/// Shorthand for `MachineType::of(ty).val_type()`.
pub fn val_type(ty: &Type) -> ValType {
    MachineType::of(ty).val_type()
}

/// Suffix used in host import names: `f64`, `str`, `series_i32`, ...
pub fn import_suffix(ty: &Type) -> String {
    match ty {
        Type::Series(elem) => format!("series_{}", import_suffix(elem)),
        Type::Chan(elem) => import_suffix(elem),
        other => other.to_string(),
    }
}
