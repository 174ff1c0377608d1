// scope.rs - The chain of policy files visible to an object.
//
// Traversal discovers policy files top-down. Each discovery produces a new
// chain that shares its tail with the parent's chain; nothing is mutated
// after construction, so sibling subtrees can be resolved on different
// threads without coordination.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::section::ConfigFile;

/// A policy file as seen by traversal: parsed, or rejected with a reason.
#[derive(Debug, Clone)]
pub enum Scope {
    Loaded(Arc<ConfigFile>),
    Broken { source: PathBuf, reason: String },
}

impl Scope {
    pub fn source(&self) -> &Path {
        match self {
            Scope::Loaded(file) => &file.source,
            Scope::Broken { source, .. } => source,
        }
    }
}

#[derive(Debug)]
struct Node {
    scope: Scope,
    depth: usize,
    parent: Option<Arc<Node>>,
}

/// Immutable, cheaply clonable list of scopes from the root downwards.
#[derive(Debug, Clone, Default)]
pub struct RuleChain {
    head: Option<Arc<Node>>,
}

impl RuleChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new chain with `scope` appended as the deepest entry.
    #[must_use]
    pub fn push(&self, scope: Scope) -> RuleChain {
        let depth = self.len();
        RuleChain {
            head: Some(Arc::new(Node {
                scope,
                depth: depth + 1,
                parent: self.head.clone(),
            })),
        }
    }

    pub fn len(&self) -> usize {
        self.head.as_ref().map(|node| node.depth).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Scopes ordered from the shallowest to the deepest.
    pub fn scopes(&self) -> Vec<&Scope> {
        let mut scopes = Vec::with_capacity(self.len());
        let mut cursor = self.head.as_deref();
        while let Some(node) = cursor {
            scopes.push(&node.scope);
            cursor = node.parent.as_deref();
        }
        scopes.reverse();
        scopes
    }
}
