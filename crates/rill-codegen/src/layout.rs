//! Module-wide planning done before any body is compiled.
//!
//! Calls may target functions declared later in the source, and output
//! regions must not overlap string data, so the signature of every function
//! and the placement of every output region is fixed up front.

use std::collections::HashMap;

use rill_types::ast::{Item, Outputs, Param, Program, Trigger};
use rill_types::{ScopeError, Type};

use crate::error::{CodegenError, CodegenResult};
use crate::module::FuncType;
use crate::types::{val_type, MachineType, DIRTY_BITMAP_SIZE, MAX_OUTPUTS};

// ══════════════════════════════════════════════════════════════════════════════
// Output regions
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSlot {
    pub name: String,
    pub ty: Type,
    /// Bit in the dirty bitmap, equal to the declaration index.
    pub bit: u32,
    /// Byte offset from the start of the region.
    pub offset: u32,
}

/// `[dirty bitmap: u64][outputs packed at machine width]`
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLayout {
    pub base: u32,
    pub slots: Vec<OutputSlot>,
}

impl OutputLayout {
    pub fn new(base: u32, outputs: &[Param]) -> CodegenResult<Self> {
        if outputs.len() > MAX_OUTPUTS {
            return Err(CodegenError::LimitExceeded(format!(
                "{} outputs declared, at most {MAX_OUTPUTS} allowed",
                outputs.len()
            )));
        }
        let mut offset = DIRTY_BITMAP_SIZE;
        let slots = outputs
            .iter()
            .enumerate()
            .map(|(bit, p)| {
                let slot = OutputSlot {
                    name: p.name.name.clone(),
                    ty: p.ty.clone(),
                    bit: bit as u32,
                    offset,
                };
                offset += MachineType::of(&p.ty).width();
                slot
            })
            .collect();
        Ok(Self { base, slots })
    }

    pub fn slot(&self, name: &str) -> Option<&OutputSlot> {
        self.slots.iter().find(|s| s.name == name)
    }

    /// Absolute address of an output value.
    pub fn address(&self, slot: &OutputSlot) -> u32 {
        self.base + slot.offset
    }

    /// Absolute address of the dirty bitmap.
    pub fn bitmap_address(&self) -> u32 {
        self.base
    }

    /// One past the last byte of the region.
    pub fn end(&self) -> u32 {
        self.slots
            .last()
            .map_or(self.base + DIRTY_BITMAP_SIZE, |s| {
                self.base + s.offset + MachineType::of(&s.ty).width()
            })
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Function table
// ══════════════════════════════════════════════════════════════════════════════

/// How a function hands results back.
#[derive(Debug, Clone, PartialEq)]
pub enum Returns {
    Void,
    Value(Type),
    Outputs(OutputLayout),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Function,
    Task,
}

#[derive(Debug, Clone)]
pub struct FunctionEntry {
    pub name: String,
    pub kind: UnitKind,
    /// Position among local functions; the WASM index adds the import count.
    pub ordinal: u32,
    pub config: Vec<Param>,
    pub params: Vec<Param>,
    pub returns: Returns,
    pub trigger: Option<Trigger>,
}

impl FunctionEntry {
    /// Config values and parameters, in binding order.
    pub fn all_params(&self) -> impl Iterator<Item = &Param> {
        self.config.iter().chain(self.params.iter())
    }

    pub fn signature(&self) -> FuncType {
        let params = self.all_params().map(|p| val_type(&p.ty)).collect();
        let results = match &self.returns {
            Returns::Value(ty) => vec![val_type(ty)],
            Returns::Void | Returns::Outputs(_) => vec![],
        };
        FuncType::new(params, results)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    entries: Vec<FunctionEntry>,
    by_name: HashMap<String, usize>,
}

impl FunctionTable {
    pub fn get(&self, name: &str) -> Option<&FunctionEntry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, entry: FunctionEntry) -> CodegenResult<()> {
        if self.by_name.contains_key(&entry.name) {
            return Err(ScopeError::AlreadyDeclared(entry.name).into());
        }
        self.by_name.insert(entry.name.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// ModuleLayout
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct ModuleLayout {
    pub functions: FunctionTable,
    /// First byte available to data segments.
    pub data_base: u32,
    /// Whether any function writes to an output region.
    pub has_outputs: bool,
}

impl ModuleLayout {
    pub fn plan(program: &Program, output_base: u32) -> CodegenResult<Self> {
        let mut functions = FunctionTable::default();
        let mut cursor = output_base;
        let mut has_outputs = false;

        for (ordinal, item) in program.items.iter().enumerate() {
            let ordinal = ordinal as u32;
            let entry = match item {
                Item::Function(decl) => {
                    let returns = match &decl.outputs {
                        Outputs::None => Returns::Void,
                        Outputs::Single(ty) => Returns::Value(ty.clone()),
                        Outputs::Named(outputs) => {
                            let layout = OutputLayout::new(cursor, outputs)
                                .map_err(|e| e.in_function(&decl.name.name))?;
                            cursor = align8(layout.end());
                            has_outputs = true;
                            Returns::Outputs(layout)
                        }
                    };
                    FunctionEntry {
                        name: decl.name.name.clone(),
                        kind: UnitKind::Function,
                        ordinal,
                        config: decl.config.clone(),
                        params: decl.params.clone(),
                        returns,
                        trigger: None,
                    }
                }
                Item::Task(decl) => FunctionEntry {
                    name: decl.name.name.clone(),
                    kind: UnitKind::Task,
                    ordinal,
                    config: Vec::new(),
                    params: Vec::new(),
                    returns: Returns::Void,
                    trigger: Some(decl.trigger.clone()),
                },
            };
            functions.push(entry)?;
        }

        Ok(Self {
            functions,
            data_base: if has_outputs { cursor } else { 0 },
            has_outputs,
        })
    }
}

fn align8(n: u32) -> u32 {
    (n + 7) & !7
}
