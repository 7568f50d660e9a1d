//! AST node variants, lexical scopes, variable bindings, and the per-node
//! effect analysis the tree-shaker drives.
//!
//! Nodes are tagged sum types (`StmtKind`, `ExprKind`); behavior that differs
//! per node kind lives in `match` arms over the tag rather than in an
//! inheritance hierarchy.

pub mod effects;
pub mod node;
pub mod scope;
pub mod tracker;
pub mod variable;

pub use effects::{expr_has_effects, stmt_has_effects, EffectsContext};
pub use node::{
    ArrowBody, ArrowBodyKind, AssignOp, BinaryOp, Class, ClassMethod, ExportSpecifier, Expr,
    ExprKind, Function, ImportSpecifier, ObjectProp, Program, Stmt, StmtKind, UnaryOp, UpdateOp,
    VarDeclarator, VarKind,
};
pub use scope::{GlobalScope, Scope, ScopeId, ScopeKind, ScopeTree};
pub use tracker::EntityPathTracker;
pub use variable::{NamespaceIndex, Variable, VariableId, VariableKind, VariableTable};

use serde::{Deserialize, Serialize};

/// A byte span in the source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset of the start.
    pub start: u32,
    /// Byte offset of the end (exclusive).
    pub end: u32,
}

impl Span {
    /// Create a new span.
    #[inline]
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Create an empty span at a position.
    #[inline]
    #[must_use]
    pub const fn empty(pos: u32) -> Self {
        Self { start: pos, end: pos }
    }

    /// Merge two spans into one that covers both.
    #[inline]
    #[must_use]
    pub const fn merge(self, other: Span) -> Span {
        Span {
            start: if self.start < other.start { self.start } else { other.start },
            end: if self.end > other.end { self.end } else { other.end },
        }
    }
}

/// Convert byte offsets to line/column positions.
#[derive(Debug)]
pub struct LineIndex {
    /// Byte offsets of the start of each line.
    line_starts: Vec<u32>,
}

impl LineIndex {
    /// Build a line index from source code.
    #[must_use]
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, c) in source.char_indices() {
            if c == '\n' {
                line_starts.push(u32::try_from(i + 1).unwrap_or(u32::MAX));
            }
        }
        Self { line_starts }
    }

    /// Convert a byte offset to line and column, both 1-indexed.
    #[must_use]
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        let line = self
            .line_starts
            .binary_search(&offset)
            .unwrap_or_else(|i| i.saturating_sub(1));
        let col = offset - self.line_starts[line];
        (u32::try_from(line).unwrap_or(u32::MAX) + 1, col + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge() {
        assert_eq!(Span::new(5, 10).merge(Span::new(8, 15)), Span::new(5, 15));
    }

    #[test]
    fn test_line_index_one_based() {
        let index = LineIndex::new("line1\nline2\nline3");
        assert_eq!(index.line_col(0), (1, 1));
        assert_eq!(index.line_col(6), (2, 1));
        assert_eq!(index.line_col(14), (3, 3));
    }
}
