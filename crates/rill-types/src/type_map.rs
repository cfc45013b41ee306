use std::collections::HashMap;

use crate::ast::NodeId;
use crate::Type;

/// Types the analyzer inferred for individual expression nodes.
///
/// Code generation only consults it where the tree alone is ambiguous:
/// untyped literals, empty series literals and range-loop bounds.
#[derive(Debug, Clone, Default)]
pub struct TypeMap {
    entries: HashMap<NodeId, Type>,
}

impl TypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: NodeId, ty: Type) -> Option<Type> {
        self.entries.insert(id, ty)
    }

    pub fn get(&self, id: NodeId) -> Option<&Type> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
