//! Lexical scopes.
//!
//! Each module owns a scope tree rooted in its module scope; the graph owns a
//! single global scope shared by every module. Name lookup walks parents and
//! falls through to the global scope, which creates a sentinel variable for
//! any name it has never seen.

use rustc_hash::FxHashMap;

use super::variable::{Variable, VariableId, VariableKind, VariableTable};

/// Index into a module's scope tree.
pub type ScopeId = usize;

/// What introduced a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Function,
    Block,
}

/// One lexical scope.
#[derive(Debug)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    names: FxHashMap<String, VariableId>,
}

/// A module's scope tree. Scope 0 is always the module scope.
#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    /// Create a tree containing only the module scope.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                parent: None,
                kind: ScopeKind::Module,
                names: FxHashMap::default(),
            }],
        }
    }

    /// The module scope.
    #[must_use]
    pub fn module_scope(&self) -> ScopeId {
        0
    }

    /// Push a child scope.
    pub fn push(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        let id = self.scopes.len();
        self.scopes.push(Scope {
            parent: Some(parent),
            kind,
            names: FxHashMap::default(),
        });
        id
    }

    /// Declare a name in a scope, overwriting any previous binding of the
    /// same name in that scope.
    pub fn declare(&mut self, scope: ScopeId, name: impl Into<String>, variable: VariableId) {
        self.scopes[scope].names.insert(name.into(), variable);
    }

    /// Look a name up through the scope chain.
    #[must_use]
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<VariableId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(&var) = self.scopes[id].names.get(name) {
                return Some(var);
            }
            current = self.scopes[id].parent;
        }
        None
    }

    /// Names declared directly in a scope.
    pub fn names(&self, scope: ScopeId) -> impl Iterator<Item = (&String, &VariableId)> {
        self.scopes[scope].names.iter()
    }
}

/// Names pre-created in every global scope.
///
/// `module` and `exports` catch CommonJS-flavored references; the interop
/// helpers are referenced by generated code.
const SENTINEL_GLOBALS: [&str; 4] = ["module", "exports", "_interopDefault", "_missingExportShim"];

/// The graph-wide scope of last resort.
#[derive(Debug)]
pub struct GlobalScope {
    names: FxHashMap<String, VariableId>,
}

impl GlobalScope {
    /// Create the global scope with its sentinel variables pre-created.
    #[must_use]
    pub fn new(table: &mut VariableTable) -> Self {
        let mut names = FxHashMap::default();
        for name in SENTINEL_GLOBALS {
            let id = table.add(Variable::new(name, VariableKind::Global));
            names.insert(name.to_string(), id);
        }
        Self { names }
    }

    /// Find a global by name, creating it on first lookup. Idempotent.
    pub fn find_variable(&mut self, table: &mut VariableTable, name: &str) -> VariableId {
        if let Some(&id) = self.names.get(name) {
            return id;
        }
        let id = table.add(Variable::new(name, VariableKind::Global));
        self.names.insert(name.to_string(), id);
        id
    }

    /// Look up a global without creating it.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<VariableId> {
        self.names.get(name).copied()
    }
}
