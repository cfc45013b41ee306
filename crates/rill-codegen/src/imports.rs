//! Host import catalog.
//!
//! Everything the compiled code cannot do by itself (channel I/O, persistent
//! state, host-managed strings and series, clocks, exponentiation) is a
//! function imported from the host. [`HostFn`] names one such function;
//! [`ImportTable`] assigns function indices in first-use order.
//!
//! Because local function indices follow the imports, the table is filled
//! during a discovery pass over every body and then sealed. A sealed table
//! answers lookups for known functions and rejects anything new.

use std::collections::HashMap;

use rill_types::ast::BinOp;
use rill_types::Type;
use tracing::trace;
use wasm_encoder::ValType;

use crate::error::{CodegenError, CodegenResult};
use crate::module::{FuncType, ModuleBuilder};
use crate::types::{import_suffix, val_type};

/// Operand shapes for element-wise series arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesOperands {
    /// `series op scalar`
    SeriesScalar,
    /// `scalar op series`
    ScalarSeries,
    /// `series op series`
    SeriesSeries,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostFn {
    ChannelRead(Type),
    ChannelWrite(Type),
    StateLoad(Type),
    StateStore(Type),
    SeriesCreateEmpty(Type),
    SeriesSetElement(Type),
    SeriesIndex(Type),
    SeriesLen,
    SeriesSlice,
    SeriesArith(BinOp, SeriesOperands, Type),
    SeriesCompare(BinOp, SeriesOperands, Type),
    SeriesNegate(Type),
    SeriesNot,
    StringFromLiteral,
    StringConcat,
    StringEqual,
    StringLen,
    Now,
    MathPow(Type),
}

fn op_name(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "div",
        BinOp::Rem => "mod",
        BinOp::Eq => "eq",
        BinOp::Ne => "ne",
        BinOp::Lt => "lt",
        BinOp::Le => "le",
        BinOp::Gt => "gt",
        BinOp::Ge => "ge",
    }
}

impl HostFn {
    /// Import name under the host module.
    pub fn name(&self) -> String {
        match self {
            HostFn::ChannelRead(t) => format!("channel_read_{}", import_suffix(t)),
            HostFn::ChannelWrite(t) => format!("channel_write_{}", import_suffix(t)),
            HostFn::StateLoad(t) => format!("state_load_{}", import_suffix(t)),
            HostFn::StateStore(t) => format!("state_store_{}", import_suffix(t)),
            HostFn::SeriesCreateEmpty(t) => format!("series_create_empty_{}", import_suffix(t)),
            HostFn::SeriesSetElement(t) => format!("series_set_element_{}", import_suffix(t)),
            HostFn::SeriesIndex(t) => format!("series_index_{}", import_suffix(t)),
            HostFn::SeriesLen => "series_len".to_string(),
            HostFn::SeriesSlice => "series_slice".to_string(),
            HostFn::SeriesArith(op, operands, t) => {
                let op = op_name(*op);
                let t = import_suffix(t);
                match operands {
                    SeriesOperands::SeriesScalar => format!("series_element_{op}_{t}"),
                    SeriesOperands::ScalarSeries => format!("series_element_r{op}_{t}"),
                    SeriesOperands::SeriesSeries => format!("series_series_{op}_{t}"),
                }
            }
            HostFn::SeriesCompare(op, operands, t) => {
                let op = op_name(*op);
                let t = import_suffix(t);
                match operands {
                    SeriesOperands::SeriesSeries => format!("series_compare_{op}_{t}"),
                    _ => format!("series_compare_{op}_scalar_{t}"),
                }
            }
            HostFn::SeriesNegate(t) => format!("series_negate_{}", import_suffix(t)),
            HostFn::SeriesNot => "series_not_u8".to_string(),
            HostFn::StringFromLiteral => "string_from_literal".to_string(),
            HostFn::StringConcat => "string_concat".to_string(),
            HostFn::StringEqual => "string_equal".to_string(),
            HostFn::StringLen => "string_len".to_string(),
            HostFn::Now => "now".to_string(),
            HostFn::MathPow(t) => format!("math_pow_{}", import_suffix(t)),
        }
    }

    /// WASM signature of the import.
    pub fn signature(&self) -> FuncType {
        use ValType::{I32, I64};

        let (params, results) = match self {
            HostFn::ChannelRead(t) => (vec![I32], vec![val_type(t)]),
            HostFn::ChannelWrite(t) => (vec![I32, val_type(t)], vec![]),
            HostFn::StateLoad(t) => (vec![I32, I32, val_type(t)], vec![val_type(t)]),
            HostFn::StateStore(t) => (vec![I32, I32, val_type(t)], vec![]),
            HostFn::SeriesCreateEmpty(_) => (vec![I32], vec![I32]),
            HostFn::SeriesSetElement(t) => (vec![I32, I32, val_type(t)], vec![I32]),
            HostFn::SeriesIndex(t) => (vec![I32, I32], vec![val_type(t)]),
            HostFn::SeriesLen => (vec![I32], vec![I64]),
            HostFn::SeriesSlice => (vec![I32, I32, I32], vec![I32]),
            HostFn::SeriesArith(_, operands, t) | HostFn::SeriesCompare(_, operands, t) => {
                match operands {
                    SeriesOperands::SeriesScalar => (vec![I32, val_type(t)], vec![I32]),
                    SeriesOperands::ScalarSeries => (vec![val_type(t), I32], vec![I32]),
                    SeriesOperands::SeriesSeries => (vec![I32, I32], vec![I32]),
                }
            }
            HostFn::SeriesNegate(_) | HostFn::SeriesNot => (vec![I32], vec![I32]),
            HostFn::StringFromLiteral => (vec![I32, I32], vec![I32]),
            HostFn::StringConcat => (vec![I32, I32], vec![I32]),
            HostFn::StringEqual => (vec![I32, I32], vec![I32]),
            HostFn::StringLen => (vec![I32], vec![I32]),
            HostFn::Now => (vec![], vec![I64]),
            HostFn::MathPow(t) => (vec![val_type(t), val_type(t)], vec![val_type(t)]),
        };
        FuncType::new(params, results)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// ImportTable
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct ImportTable {
    module: String,
    entries: Vec<HostFn>,
    index: HashMap<HostFn, u32>,
    sealed: bool,
}

impl ImportTable {
    pub fn new(module: &str) -> Self {
        Self {
            module: module.to_string(),
            entries: Vec::new(),
            index: HashMap::new(),
            sealed: false,
        }
    }

    /// Function index of `f`, registering it on first use while unsealed.
    pub fn resolve(&mut self, f: HostFn) -> CodegenResult<u32> {
        if let Some(&idx) = self.index.get(&f) {
            return Ok(idx);
        }
        if self.sealed {
            return Err(CodegenError::Internal(format!(
                "host import `{}` was not discovered before sealing",
                f.name()
            )));
        }
        let idx = self.entries.len() as u32;
        trace!(import = %f.name(), index = idx, "registered host import");
        self.index.insert(f.clone(), idx);
        self.entries.push(f);
        Ok(idx)
    }

    /// Stop accepting new imports.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn len(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostFn> {
        self.entries.iter()
    }

    /// Declare every registered import on `module`, in index order.
    pub fn declare(&self, module: &mut ModuleBuilder) -> CodegenResult<()> {
        for (expected, f) in self.entries.iter().enumerate() {
            let idx = module.add_import(&self.module, &f.name(), f.signature())?;
            if idx != expected as u32 {
                return Err(CodegenError::Internal(format!(
                    "import `{}` landed at index {idx}, expected {expected}",
                    f.name()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_the_host_convention() {
        assert_eq!(HostFn::ChannelRead(Type::F64).name(), "channel_read_f64");
        assert_eq!(HostFn::StateLoad(Type::Str).name(), "state_load_str");
        assert_eq!(
            HostFn::StateStore(Type::series(Type::I32)).name(),
            "state_store_series_i32"
        );
        assert_eq!(
            HostFn::SeriesArith(BinOp::Rem, SeriesOperands::SeriesScalar, Type::U8).name(),
            "series_element_mod_u8"
        );
        assert_eq!(
            HostFn::SeriesArith(BinOp::Sub, SeriesOperands::ScalarSeries, Type::F32).name(),
            "series_element_rsub_f32"
        );
        assert_eq!(
            HostFn::SeriesCompare(BinOp::Gt, SeriesOperands::SeriesScalar, Type::I64).name(),
            "series_compare_gt_scalar_i64"
        );
        assert_eq!(HostFn::MathPow(Type::TimeSpan).name(), "math_pow_timespan");
    }

    #[test]
    fn signatures_use_machine_types() {
        let sig = HostFn::StateLoad(Type::U16).signature();
        assert_eq!(sig.params, vec![ValType::I32, ValType::I32, ValType::I32]);
        assert_eq!(sig.results, vec![ValType::I32]);

        let sig = HostFn::ChannelWrite(Type::TimeStamp).signature();
        assert_eq!(sig.params, vec![ValType::I32, ValType::I64]);
        assert!(sig.results.is_empty());

        let sig = HostFn::SeriesLen.signature();
        assert_eq!(sig.results, vec![ValType::I64]);
    }

    #[test]
    fn indices_follow_first_use() {
        let mut table = ImportTable::new("env");
        assert_eq!(table.resolve(HostFn::Now).unwrap(), 0);
        assert_eq!(table.resolve(HostFn::ChannelRead(Type::I32)).unwrap(), 1);
        assert_eq!(table.resolve(HostFn::Now).unwrap(), 0);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn sealed_table_rejects_new_imports() {
        let mut table = ImportTable::new("env");
        table.resolve(HostFn::StringLen).unwrap();
        table.seal();
        assert_eq!(table.resolve(HostFn::StringLen).unwrap(), 0);
        let err = table.resolve(HostFn::Now).unwrap_err();
        assert!(matches!(err, CodegenError::Internal(_)));
    }

    #[test]
    fn declare_preserves_order() {
        let mut table = ImportTable::new("env");
        table.resolve(HostFn::SeriesLen).unwrap();
        table.resolve(HostFn::ChannelRead(Type::F32)).unwrap();
        let mut module = ModuleBuilder::new();
        table.declare(&mut module).unwrap();
        assert_eq!(module.import_count(), 2);
    }
}
