//! Lexically scoped symbols.
//!
//! [`ScopeTree`] stores every scope in one arena and links them by
//! [`ScopeId`]. Each scope keeps its parent and its children in creation
//! order, so a tree can be walked upward for name resolution and downward
//! for inspection without any shared ownership.
//!
//! Slot-bearing symbols (variables, parameters, config values and stateful
//! variables) draw their ID from one counter owned by the nearest enclosing
//! function scope; the ID doubles as the WASM local index. Outputs are
//! numbered by a separate per-function counter. Channels, functions and tasks
//! carry an explicit ID chosen by whoever declares them.

use std::collections::HashMap;

use thiserror::Error;

use crate::Type;

// ══════════════════════════════════════════════════════════════════════════════
// Symbols
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Variable,
    Parameter,
    Config,
    StatefulVariable,
    Output,
    Channel,
    Function,
    Task,
}

impl SymbolKind {
    /// Whether the symbol occupies a local slot of its function.
    pub fn has_slot(self) -> bool {
        matches!(
            self,
            SymbolKind::Variable
                | SymbolKind::Parameter
                | SymbolKind::Config
                | SymbolKind::StatefulVariable
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: Type,
    /// Local slot, output index or channel key depending on `kind`.
    pub id: u32,
}

// ══════════════════════════════════════════════════════════════════════════════
// Scopes
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Module level.
    Root,
    /// Function or task body; owns the slot counters.
    Function,
    /// Nested block inside a function.
    Block,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScopeError {
    #[error("`{0}` is already declared in this scope")]
    AlreadyDeclared(String),
    #[error("`{0}` needs an enclosing function to receive a slot")]
    NoEnclosingFunction(String),
}

#[derive(Debug, Clone)]
struct Scope {
    kind: ScopeKind,
    parent: Option<ScopeId>,
    children: Vec<ScopeId>,
    symbols: Vec<Symbol>,
    by_name: HashMap<String, usize>,
    next_slot: u32,
    next_output: u32,
}

impl Scope {
    fn new(kind: ScopeKind, parent: Option<ScopeId>) -> Self {
        Self {
            kind,
            parent,
            children: Vec::new(),
            symbols: Vec::new(),
            by_name: HashMap::new(),
            next_slot: 0,
            next_output: 0,
        }
    }
}

/// Arena of scopes rooted at a single module-level scope.
#[derive(Debug, Clone)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new(ScopeKind::Root, None)],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Open a new scope under `parent`.
    pub fn push_child(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(kind, Some(parent)));
        self.scope_mut(parent).children.push(id);
        id
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.scope(id).parent
    }

    pub fn children(&self, id: ScopeId) -> &[ScopeId] {
        &self.scope(id).children
    }

    pub fn kind(&self, id: ScopeId) -> ScopeKind {
        self.scope(id).kind
    }

    /// Symbols declared directly in `id`, in declaration order.
    pub fn symbols(&self, id: ScopeId) -> &[Symbol] {
        &self.scope(id).symbols
    }

    /// The nearest function scope at or above `id`.
    pub fn enclosing_function(&self, mut id: ScopeId) -> Option<ScopeId> {
        loop {
            let scope = self.scope(id);
            if scope.kind == ScopeKind::Function {
                return Some(id);
            }
            id = scope.parent?;
        }
    }

    /// Declare a symbol whose ID is assigned by the enclosing function.
    ///
    /// Slot-bearing kinds take the next local slot; outputs take the next
    /// output index. Any other kind gets ID 0; use [`declare_with_id`] for
    /// those.
    ///
    /// [`declare_with_id`]: ScopeTree::declare_with_id
    pub fn declare(
        &mut self,
        scope: ScopeId,
        name: &str,
        kind: SymbolKind,
        ty: Type,
    ) -> Result<&Symbol, ScopeError> {
        if self.scope(scope).by_name.contains_key(name) {
            return Err(ScopeError::AlreadyDeclared(name.to_string()));
        }
        let id = if kind.has_slot() {
            self.reserve_slot(scope)
                .ok_or_else(|| ScopeError::NoEnclosingFunction(name.to_string()))?
        } else if kind == SymbolKind::Output {
            let func = self
                .enclosing_function(scope)
                .ok_or_else(|| ScopeError::NoEnclosingFunction(name.to_string()))?;
            let counter = &mut self.scope_mut(func).next_output;
            let id = *counter;
            *counter += 1;
            id
        } else {
            0
        };
        self.insert(
            scope,
            Symbol {
                name: name.to_string(),
                kind,
                ty,
                id,
            },
        )
    }

    /// Declare a symbol with a caller-chosen ID.
    pub fn declare_with_id(&mut self, scope: ScopeId, symbol: Symbol) -> Result<&Symbol, ScopeError> {
        if self.scope(scope).by_name.contains_key(&symbol.name) {
            return Err(ScopeError::AlreadyDeclared(symbol.name));
        }
        self.insert(scope, symbol)
    }

    /// Take the next local slot of the function enclosing `scope` without
    /// binding a name to it.
    pub fn reserve_slot(&mut self, scope: ScopeId) -> Option<u32> {
        let func = self.enclosing_function(scope)?;
        let counter = &mut self.scope_mut(func).next_slot;
        let slot = *counter;
        *counter += 1;
        Some(slot)
    }

    /// Number of local slots handed out by a function scope so far.
    pub fn slot_count(&self, function: ScopeId) -> u32 {
        self.scope(function).next_slot
    }

    /// Resolve `name` starting at `scope` and walking up to the root.
    pub fn resolve(&self, scope: ScopeId, name: &str) -> Option<&Symbol> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.scope(id);
            if let Some(&idx) = s.by_name.get(name) {
                return Some(&s.symbols[idx]);
            }
            current = s.parent;
        }
        None
    }

    fn insert(&mut self, scope: ScopeId, symbol: Symbol) -> Result<&Symbol, ScopeError> {
        let s = self.scope_mut(scope);
        let idx = s.symbols.len();
        s.by_name.insert(symbol.name.clone(), idx);
        s.symbols.push(symbol);
        Ok(&s.symbols[idx])
    }

    fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }
}
