//! Shared types for the Rill compiler.
//!
//! This crate defines the AST node types, source spans, the semantic
//! [`Type`], the scope tree produced by the analyzer and the per-node
//! [`TypeMap`] consumed by code generation.

mod span;
pub mod ast;
pub mod build;
pub mod symbol;
pub mod type_map;
pub mod types;

pub use build::AstBuilder;
pub use span::Span;
pub use symbol::{ScopeError, ScopeId, ScopeKind, ScopeTree, Symbol, SymbolKind};
pub use type_map::TypeMap;
pub use types::Type;

/// Everything the analyzer hands to the backend.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    /// Root scope with module-level symbols (channels, globals).
    pub scope: ScopeTree,
    /// Inferred types keyed by expression node.
    pub types: TypeMap,
}
