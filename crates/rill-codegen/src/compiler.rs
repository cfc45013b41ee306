//! Main WASM module assembler.
//!
//! Orchestrates the code generation pipeline:
//! 1. Plan function indices and output regions ([`ModuleLayout`])
//! 2. Discovery pass: compile every body once to learn the host imports
//! 3. Seal the import table and compile every body for real
//! 4. Assemble all sections into a module, export functions and memory
//! 5. Validate with `wasmparser` and describe the module in [`ModuleMetadata`]

use rill_types::ast::{Item, Param, Program};
use rill_types::{Analysis, ScopeId, ScopeKind, ScopeTree, Symbol, SymbolKind, Type, TypeMap};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use wasm_encoder::{ExportKind, ValType};

use crate::error::{CodegenError, CodegenResult};
use crate::imports::{HostFn, ImportTable};
use crate::layout::{FunctionEntry, FunctionTable, ModuleLayout, OutputLayout, OutputSlot, Returns};
use crate::metadata::ModuleMetadata;
use crate::module::{pages_for, ModuleBuilder};
use crate::stmt;
use crate::types::{val_type, IMPORT_MODULE, MEMORY_EXPORT, OUTPUT_MEMORY_BASE};
use crate::writer::Writer;

// ══════════════════════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════════════════════

/// Knobs for a compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Module name every host import is requested from.
    pub import_module: String,
    /// Address of the first output region.
    pub output_memory_base: u32,
    /// Run `wasmparser` over the finished module.
    pub validate: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            import_module: IMPORT_MODULE.to_string(),
            output_memory_base: OUTPUT_MEMORY_BASE,
            validate: true,
        }
    }
}

/// A finished module plus its description.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub wasm: Vec<u8>,
    pub metadata: ModuleMetadata,
    /// Hex SHA-256 of `wasm`.
    pub digest: String,
}

/// Compile an analyzed [`Program`] into a `.wasm` binary with default options.
pub fn compile(program: &Program, analysis: &Analysis) -> CodegenResult<CompileOutput> {
    compile_with_options(program, analysis, &CompileOptions::default())
}

/// Compile an analyzed [`Program`] into a `.wasm` binary.
///
/// Fails on the first error; no partial module is returned.
#[instrument(skip_all, fields(items = program.items.len()))]
pub fn compile_with_options(
    program: &Program,
    analysis: &Analysis,
    options: &CompileOptions,
) -> CodegenResult<CompileOutput> {
    let layout = ModuleLayout::plan(program, options.output_memory_base)?;
    let compiler = Compiler {
        program,
        analysis,
        options,
        layout,
    };
    compiler.compile()
}

// ══════════════════════════════════════════════════════════════════════════════
// Compiler
// ══════════════════════════════════════════════════════════════════════════════

struct CompiledBody {
    locals: Vec<ValType>,
    code: Vec<u8>,
}

struct Compiler<'a> {
    program: &'a Program,
    analysis: &'a Analysis,
    options: &'a CompileOptions,
    layout: ModuleLayout,
}

impl Compiler<'_> {
    fn compile(&self) -> CodegenResult<CompileOutput> {
        let mut imports = ImportTable::new(&self.options.import_module);

        // Discovery: bodies compiled against a throwaway module.
        let mut scratch = ModuleBuilder::with_data_base(self.layout.data_base);
        self.compile_bodies(&mut imports, &mut scratch)?;
        imports.seal();
        debug!(imports = imports.len(), "sealed host import table");

        let mut module = ModuleBuilder::with_data_base(self.layout.data_base);
        imports.declare(&mut module)?;
        let bodies = self.compile_bodies(&mut imports, &mut module)?;

        for (entry, body) in self.layout.functions.iter().zip(bodies) {
            let bytes = body.code.len();
            let index = module.add_function(entry.signature(), body.locals, body.code);
            module.add_export(&entry.name, ExportKind::Func, index);
            debug!(name = %entry.name, index, bytes, "compiled function");
        }

        if self.layout.has_outputs || module.data_end() > self.layout.data_base {
            module.ensure_memory(pages_for(module.data_end()));
            module.add_export(MEMORY_EXPORT, ExportKind::Memory, 0);
        }

        let wasm = module.encode();

        if self.options.validate {
            wasmparser::validate(&wasm)
                .map_err(|e| CodegenError::ValidationFailed(format!("{e}")))?;
        }

        let metadata = ModuleMetadata::describe(&self.layout.functions, imports.len());
        let digest = hex_digest(&wasm);
        debug!(bytes = wasm.len(), %digest, "assembled module");
        Ok(CompileOutput {
            wasm,
            metadata,
            digest,
        })
    }

    fn compile_bodies(
        &self,
        imports: &mut ImportTable,
        module: &mut ModuleBuilder,
    ) -> CodegenResult<Vec<CompiledBody>> {
        let mut scopes = self.analysis.scope.clone();
        let mut bodies = Vec::with_capacity(self.program.items.len());
        for item in &self.program.items {
            let name = &item.name().name;
            let entry = self
                .layout
                .functions
                .get(name)
                .ok_or_else(|| CodegenError::Internal(format!("`{name}` missing from layout")))?;
            let body = self
                .compile_unit(item, entry, &mut scopes, imports, module)
                .map_err(|e| e.in_function(name))?;
            bodies.push(body);
        }
        Ok(bodies)
    }

    fn compile_unit(
        &self,
        item: &Item,
        entry: &FunctionEntry,
        scopes: &mut ScopeTree,
        imports: &mut ImportTable,
        module: &mut ModuleBuilder,
    ) -> CodegenResult<CompiledBody> {
        let mut ctx = FuncContext::new(
            scopes,
            &self.analysis.types,
            &self.layout.functions,
            imports,
            module,
        )
        .with_owner(entry.ordinal)
        .with_returns(entry.returns.clone());

        for param in &entry.config {
            ctx.declare_param(param, SymbolKind::Config)?;
        }
        for param in &entry.params {
            ctx.declare_param(param, SymbolKind::Parameter)?;
        }

        let mut w = Writer::new();
        if let Returns::Outputs(layout) = &entry.returns {
            for slot in &layout.slots {
                ctx.declare_output(slot)?;
            }
            stmt::emit_output_reset(layout, &mut w);
        }

        let body = match item {
            Item::Function(decl) => &decl.body,
            Item::Task(decl) => &decl.body,
        };
        let diverged = stmt::compile_stmts(&body.stmts, &mut ctx, &mut w)?;
        if !diverged {
            stmt::emit_fallthrough_return(&entry.returns, &mut w);
        }

        Ok(CompiledBody {
            locals: ctx.finish(),
            code: w.into_bytes(),
        })
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

// ══════════════════════════════════════════════════════════════════════════════
// FuncContext: per-function codegen state
// ══════════════════════════════════════════════════════════════════════════════

/// Branch targets of an enclosing loop, as writer depths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTarget {
    /// Depth just inside the outer block; `br` here leaves the loop.
    pub break_depth: u32,
    /// Depth just inside the body block; `br` here skips to the step.
    pub continue_depth: u32,
}

/// State maintained while generating code for a single function body.
pub struct FuncContext<'a> {
    pub scopes: &'a mut ScopeTree,
    /// Innermost open scope.
    pub scope: ScopeId,
    function_scope: ScopeId,
    pub types: &'a TypeMap,
    pub functions: &'a FunctionTable,
    imports: &'a mut ImportTable,
    module: &'a mut ModuleBuilder,
    /// Host key under which this function's persistent state is stored.
    pub owner_id: u32,
    pub returns: Returns,
    param_count: u32,
    /// Types of the non-parameter locals, indexed by `slot - param_count`.
    locals: Vec<ValType>,
    loops: Vec<LoopTarget>,
}

impl<'a> FuncContext<'a> {
    /// Open a fresh function scope under the root of `scopes`.
    pub fn new(
        scopes: &'a mut ScopeTree,
        types: &'a TypeMap,
        functions: &'a FunctionTable,
        imports: &'a mut ImportTable,
        module: &'a mut ModuleBuilder,
    ) -> Self {
        let function_scope = scopes.push_child(scopes.root(), ScopeKind::Function);
        Self {
            scopes,
            scope: function_scope,
            function_scope,
            types,
            functions,
            imports,
            module,
            owner_id: 0,
            returns: Returns::Void,
            param_count: 0,
            locals: Vec::new(),
            loops: Vec::new(),
        }
    }

    pub fn with_owner(mut self, owner_id: u32) -> Self {
        self.owner_id = owner_id;
        self
    }

    pub fn with_returns(mut self, returns: Returns) -> Self {
        self.returns = returns;
        self
    }

    // ── Symbols and locals ───────────────────────────────────────────────

    /// Bind a parameter. Parameters take the lowest slots.
    pub fn declare_param(&mut self, param: &Param, kind: SymbolKind) -> CodegenResult<u32> {
        if !self.locals.is_empty() {
            return Err(CodegenError::Internal(format!(
                "parameter `{}` declared after locals",
                param.name.name
            )));
        }
        let slot = self
            .scopes
            .declare(self.function_scope, &param.name.name, kind, param.ty.clone())?
            .id;
        self.param_count += 1;
        Ok(slot)
    }

    /// Bind a slot-bearing symbol in the innermost scope.
    pub fn declare_local(&mut self, name: &str, kind: SymbolKind, ty: Type) -> CodegenResult<u32> {
        let vt = val_type(&ty);
        let slot = self.scopes.declare(self.scope, name, kind, ty)?.id;
        self.track_local(slot, vt)?;
        Ok(slot)
    }

    /// Allocate an anonymous local.
    pub fn alloc_temp(&mut self, ty: &Type) -> CodegenResult<u32> {
        let slot = self
            .scopes
            .reserve_slot(self.scope)
            .ok_or_else(|| CodegenError::Internal("temporary outside a function".into()))?;
        self.track_local(slot, val_type(ty))?;
        Ok(slot)
    }

    fn track_local(&mut self, slot: u32, vt: ValType) -> CodegenResult<()> {
        if slot != self.param_count + self.locals.len() as u32 {
            return Err(CodegenError::Internal(format!(
                "local slot {slot} allocated out of order"
            )));
        }
        self.locals.push(vt);
        Ok(())
    }

    pub fn declare_output(&mut self, slot: &OutputSlot) -> CodegenResult<()> {
        let id = self
            .scopes
            .declare(self.function_scope, &slot.name, SymbolKind::Output, slot.ty.clone())?
            .id;
        if id != slot.bit {
            return Err(CodegenError::Internal(format!(
                "output `{}` numbered {id}, expected {}",
                slot.name, slot.bit
            )));
        }
        Ok(())
    }

    /// Resolve a name from the innermost scope outward.
    pub fn lookup(&self, name: &str) -> CodegenResult<Symbol> {
        self.scopes
            .resolve(self.scope, name)
            .cloned()
            .ok_or_else(|| CodegenError::UnresolvedSymbol(name.to_string()))
    }

    /// The output region of this function and the slot named `name`.
    pub fn output(&self, name: &str) -> CodegenResult<(&OutputLayout, &OutputSlot)> {
        match &self.returns {
            Returns::Outputs(layout) => layout
                .slot(name)
                .map(|slot| (layout, slot))
                .ok_or_else(|| CodegenError::UnresolvedSymbol(name.to_string())),
            _ => Err(CodegenError::UnresolvedSymbol(name.to_string())),
        }
    }

    /// Open a child block scope; returns the scope to restore.
    pub fn enter_scope(&mut self) -> ScopeId {
        let saved = self.scope;
        self.scope = self.scopes.push_child(saved, ScopeKind::Block);
        saved
    }

    pub fn exit_scope(&mut self, saved: ScopeId) {
        self.scope = saved;
    }

    // ── Loops ────────────────────────────────────────────────────────────

    pub fn push_loop(&mut self, target: LoopTarget) {
        self.loops.push(target);
    }

    pub fn pop_loop(&mut self) {
        self.loops.pop();
    }

    pub fn current_loop(&self) -> Option<LoopTarget> {
        self.loops.last().copied()
    }

    // ── Module-level resources ───────────────────────────────────────────

    /// Function index of a host import.
    pub fn import(&mut self, f: HostFn) -> CodegenResult<u32> {
        self.imports.resolve(f)
    }

    /// Function index of a local function.
    pub fn function_index(&self, entry: &FunctionEntry) -> u32 {
        self.imports.len() + entry.ordinal
    }

    /// Place string bytes in a data segment; returns (offset, length).
    pub fn intern(&mut self, s: &str) -> (u32, u32) {
        let offset = self.module.add_data(s.as_bytes());
        tracing::trace!(offset, len = s.len(), "interned string literal");
        (offset, s.len() as u32)
    }

    pub fn finish(self) -> Vec<ValType> {
        self.locals
    }
}
