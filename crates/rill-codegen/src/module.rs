//! Binary module encoder.
//!
//! [`ModuleBuilder`] collects types, imports, functions, exports, memory and
//! data, then serializes them in the canonical section order. Sections with
//! no entries are omitted, so an empty builder encodes to the bare 8-byte
//! header.

use wasm_encoder::{
    CodeSection, ConstExpr, DataSection, EntityType, ExportKind, ExportSection, Function,
    FunctionSection, ImportSection, Instruction, MemorySection, MemoryType, Module, TypeSection,
    ValType,
};

use crate::error::{CodegenError, CodegenResult};
use crate::types::PAGE_SIZE;

/// A function signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncType {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

impl FuncType {
    pub fn new(params: Vec<ValType>, results: Vec<ValType>) -> Self {
        Self { params, results }
    }
}

#[derive(Debug, Clone)]
struct Import {
    module: String,
    name: String,
    type_index: u32,
}

#[derive(Debug, Clone)]
struct FunctionDef {
    type_index: u32,
    locals: Vec<ValType>,
    body: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Export {
    name: String,
    kind: ExportKind,
    index: u32,
}

#[derive(Debug, Clone)]
struct DataSegment {
    offset: u32,
    bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleBuilder {
    types: Vec<FuncType>,
    imports: Vec<Import>,
    functions: Vec<FunctionDef>,
    exports: Vec<Export>,
    memory_pages: Option<u64>,
    data: Vec<DataSegment>,
    data_base: u32,
    next_data_offset: u32,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start data segments at `base` instead of 0.
    pub fn with_data_base(base: u32) -> Self {
        Self {
            data_base: base,
            next_data_offset: base,
            ..Self::default()
        }
    }

    /// Index of `ty` in the type section, adding it if it is new.
    pub fn add_type(&mut self, ty: FuncType) -> u32 {
        if let Some(idx) = self.types.iter().position(|t| *t == ty) {
            return idx as u32;
        }
        self.types.push(ty);
        (self.types.len() - 1) as u32
    }

    /// Declare a function import and return its function index.
    ///
    /// Imports occupy the low function indices, so they cannot be added once
    /// a local function exists.
    pub fn add_import(&mut self, module: &str, name: &str, ty: FuncType) -> CodegenResult<u32> {
        if !self.functions.is_empty() {
            return Err(CodegenError::Internal(format!(
                "import `{module}.{name}` declared after local functions"
            )));
        }
        let type_index = self.add_type(ty);
        self.imports.push(Import {
            module: module.to_string(),
            name: name.to_string(),
            type_index,
        });
        Ok((self.imports.len() - 1) as u32)
    }

    /// Add a local function and return its function index.
    ///
    /// `locals` lists the non-parameter locals in slot order; `body` is the
    /// encoded instruction stream without the terminating `end`.
    pub fn add_function(&mut self, ty: FuncType, locals: Vec<ValType>, body: Vec<u8>) -> u32 {
        let type_index = self.add_type(ty);
        self.functions.push(FunctionDef {
            type_index,
            locals,
            body,
        });
        self.import_count() + (self.functions.len() - 1) as u32
    }

    pub fn add_export(&mut self, name: &str, kind: ExportKind, index: u32) {
        self.exports.push(Export {
            name: name.to_string(),
            kind,
            index,
        });
    }

    /// Declare the linear memory with at least `pages` pages.
    pub fn ensure_memory(&mut self, pages: u64) {
        let pages = pages.max(1);
        self.memory_pages = Some(self.memory_pages.map_or(pages, |p| p.max(pages)));
    }

    /// Place `bytes` in a new data segment and return its offset.
    pub fn add_data(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.next_data_offset;
        self.next_data_offset += bytes.len() as u32;
        self.data.push(DataSegment {
            offset,
            bytes: bytes.to_vec(),
        });
        offset
    }

    pub fn import_count(&self) -> u32 {
        self.imports.len() as u32
    }

    pub fn type_count(&self) -> u32 {
        self.types.len() as u32
    }

    /// One past the last byte used by data segments.
    pub fn data_end(&self) -> u32 {
        self.next_data_offset.max(self.data_base)
    }

    /// Serialize the module.
    pub fn encode(&self) -> Vec<u8> {
        let mut module = Module::new();

        if !self.types.is_empty() {
            let mut types = TypeSection::new();
            for ty in &self.types {
                types
                    .ty()
                    .function(ty.params.iter().copied(), ty.results.iter().copied());
            }
            module.section(&types);
        }

        if !self.imports.is_empty() {
            let mut imports = ImportSection::new();
            for import in &self.imports {
                imports.import(
                    &import.module,
                    &import.name,
                    EntityType::Function(import.type_index),
                );
            }
            module.section(&imports);
        }

        if !self.functions.is_empty() {
            let mut functions = FunctionSection::new();
            for func in &self.functions {
                functions.function(func.type_index);
            }
            module.section(&functions);
        }

        let memory_pages = self.memory_pages.or_else(|| {
            // Data needs somewhere to live.
            (!self.data.is_empty()).then(|| pages_for(self.data_end()))
        });
        if let Some(pages) = memory_pages {
            let mut memory = MemorySection::new();
            memory.memory(MemoryType {
                minimum: pages.max(pages_for(self.data_end())),
                maximum: None,
                memory64: false,
                shared: false,
                page_size_log2: None,
            });
            module.section(&memory);
        }

        if !self.exports.is_empty() {
            let mut exports = ExportSection::new();
            for export in &self.exports {
                exports.export(&export.name, export.kind, export.index);
            }
            module.section(&exports);
        }

        if !self.functions.is_empty() {
            let mut code = CodeSection::new();
            for func in &self.functions {
                let mut f = Function::new(local_runs(&func.locals));
                f.raw(func.body.iter().copied());
                f.instruction(&Instruction::End);
                code.function(&f);
            }
            module.section(&code);
        }

        if !self.data.is_empty() {
            let mut data = DataSection::new();
            for segment in &self.data {
                data.active(
                    0,
                    &ConstExpr::i32_const(segment.offset as i32),
                    segment.bytes.iter().copied(),
                );
            }
            module.section(&data);
        }

        module.finish()
    }
}

/// Pages needed to hold `bytes` bytes (at least one).
pub fn pages_for(bytes: u32) -> u64 {
    (bytes as u64).div_ceil(PAGE_SIZE as u64).max(1)
}

/// Group consecutive locals of one type into `(count, type)` runs.
fn local_runs(locals: &[ValType]) -> Vec<(u32, ValType)> {
    let mut runs: Vec<(u32, ValType)> = Vec::new();
    for &ty in locals {
        match runs.last_mut() {
            Some((count, last)) if *last == ty => *count += 1,
            _ => runs.push((1, ty)),
        }
    }
    runs
}
