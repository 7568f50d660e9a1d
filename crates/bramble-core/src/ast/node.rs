//! AST node types for the ES-module subset the graph analyzes.
//!
//! Everything is a statement or an expression. Nodes serialize with serde so
//! parsed programs can round-trip through the warm-start cache.

use serde::{Deserialize, Serialize};

use super::Span;

/// The root AST for a parsed module.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    /// Top-level statements in source order.
    pub body: Vec<Stmt>,
}

impl Program {
    /// Create a new program.
    #[must_use]
    pub fn new(body: Vec<Stmt>) -> Self {
        Self { body }
    }
}

// =============================================================================
// Statements
// =============================================================================

/// A statement node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    /// Create a new statement.
    #[must_use]
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Statement kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// `import ... from "source"` (including bare `import "source"`).
    Import {
        specifiers: Vec<ImportSpecifier>,
        source: String,
    },
    /// `export const x = 1`, `export { a as b }`, `export { a } from "m"`.
    ExportNamed {
        /// Inner declaration for `export <decl>` forms.
        decl: Option<Box<Stmt>>,
        /// `{ local as exported }` specifiers.
        specifiers: Vec<ExportSpecifier>,
        /// Present for re-export forms.
        source: Option<String>,
    },
    /// `export default <expr>`.
    ExportDefault { expr: Box<Expr> },
    /// `export * from "source"`.
    ExportAll { source: String },
    /// `var`/`let`/`const` declaration.
    Var {
        kind: VarKind,
        decls: Vec<VarDeclarator>,
    },
    /// `function name() {}`.
    Function { name: String, function: Box<Function> },
    /// `class Name {}`.
    Class { name: String, class: Box<Class> },
    /// Expression statement.
    Expr(Box<Expr>),
    /// `return <expr>?`.
    Return(Option<Box<Expr>>),
    /// `if (test) consequent else alternate`.
    If {
        test: Box<Expr>,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    /// `{ ... }`.
    Block(Vec<Stmt>),
    /// `while (test) body`.
    While { test: Box<Expr>, body: Box<Stmt> },
    /// `for (init; test; update) body`.
    For {
        init: Option<Box<Stmt>>,
        test: Option<Box<Expr>>,
        update: Option<Box<Expr>>,
        body: Box<Stmt>,
    },
    /// `throw <expr>`.
    Throw(Box<Expr>),
    /// `;`.
    Empty,
}

/// `var` / `let` / `const`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

/// A single declarator in a variable declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDeclarator {
    pub name: String,
    pub init: Option<Expr>,
}

/// An import binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImportSpecifier {
    /// `import local from "m"`.
    Default { local: String },
    /// `import * as local from "m"`.
    Namespace { local: String },
    /// `import { imported as local } from "m"`.
    Named { imported: String, local: String },
}

impl ImportSpecifier {
    /// The local binding name this specifier introduces.
    #[must_use]
    pub fn local(&self) -> &str {
        match self {
            Self::Default { local } | Self::Namespace { local } | Self::Named { local, .. } => local,
        }
    }

    /// The name imported from the source module (`default`, `*`, or a named export).
    #[must_use]
    pub fn imported(&self) -> &str {
        match self {
            Self::Default { .. } => "default",
            Self::Namespace { .. } => "*",
            Self::Named { imported, .. } => imported,
        }
    }
}

/// A `{ local as exported }` export specifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSpecifier {
    pub local: String,
    pub exported: String,
}

// =============================================================================
// Expressions
// =============================================================================

/// An expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    /// Create a new expression.
    #[must_use]
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Expression kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// `null`.
    Null,
    /// `true` / `false`.
    Bool(bool),
    /// Number literal.
    Number(f64),
    /// String literal.
    Str(String),
    /// Template literal without substitutions.
    TemplateNoSub(String),
    /// Template literal with substitutions.
    Template {
        quasis: Vec<String>,
        exprs: Vec<Expr>,
    },
    /// Identifier reference.
    Ident(String),
    /// `this`.
    This,
    /// `[a, b, c]`.
    Array(Vec<Expr>),
    /// `{a: 1, b}`.
    Object(Vec<ObjectProp>),
    /// `function () {}` (optionally named).
    Function {
        name: Option<String>,
        function: Box<Function>,
    },
    /// `() => {}`.
    Arrow(Box<ArrowBody>),
    /// `class {}` expression.
    Class(Box<Class>),
    /// `!x`, `-x`, `typeof x`, ...
    Unary { op: UnaryOp, arg: Box<Expr> },
    /// `a + b`, `a && b`, ...
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `a = b`, `a += b`, ...
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `++a`, `a--`.
    Update {
        op: UpdateOp,
        prefix: bool,
        arg: Box<Expr>,
    },
    /// `a ? b : c`.
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    /// `a, b, c`.
    Sequence(Vec<Expr>),
    /// `a.b` / `a[b]`.
    Member {
        object: Box<Expr>,
        property: Box<Expr>,
        computed: bool,
    },
    /// `f(a, b)`.
    Call { callee: Box<Expr>, args: Vec<Expr> },
    /// `new Foo(a)`.
    New { callee: Box<Expr>, args: Vec<Expr> },
    /// `...arr`.
    Spread(Box<Expr>),
    /// `await x`.
    Await(Box<Expr>),
    /// Dynamic `import(specifier)`.
    ImportCall(Box<Expr>),
    /// `import.meta`.
    ImportMeta,
}

/// An object literal property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectProp {
    /// `key: value` (computed keys keep the key expression).
    KeyValue {
        key: Box<Expr>,
        value: Box<Expr>,
        computed: bool,
    },
    /// `{ name }`.
    Shorthand(String),
    /// `{ ...rest }`.
    Spread(Box<Expr>),
}

/// A function body with parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub is_async: bool,
    pub is_generator: bool,
}

/// An arrow function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrowBody {
    pub params: Vec<String>,
    pub body: ArrowBodyKind,
    pub is_async: bool,
}

/// Arrow body: single expression or block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrowBodyKind {
    Expr(Box<Expr>),
    Block(Vec<Stmt>),
}

/// A class definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub super_class: Option<Box<Expr>>,
    pub methods: Vec<ClassMethod>,
}

/// A method in a class body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMethod {
    pub name: String,
    pub function: Function,
    pub is_static: bool,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
    BitNot,
    TypeOf,
    Void,
    Delete,
}

/// Binary and logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,
    StrictEq,
    StrictNotEq,
    And,
    Or,
    Nullish,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    In,
    InstanceOf,
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// `++` / `--`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOp {
    Inc,
    Dec,
}

impl Stmt {
    /// Names this top-level statement declares in module scope.
    #[must_use]
    pub fn declared_names(&self) -> Vec<String> {
        match &self.kind {
            StmtKind::Import { specifiers, .. } => {
                specifiers.iter().map(|s| s.local().to_string()).collect()
            }
            StmtKind::Var { decls, .. } => decls.iter().map(|d| d.name.clone()).collect(),
            StmtKind::Function { name, .. } | StmtKind::Class { name, .. } => vec![name.clone()],
            StmtKind::ExportNamed { decl: Some(decl), .. } => decl.declared_names(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_specifier_names() {
        let spec = ImportSpecifier::Named {
            imported: "foo".to_string(),
            local: "bar".to_string(),
        };
        assert_eq!(spec.local(), "bar");
        assert_eq!(spec.imported(), "foo");

        let ns = ImportSpecifier::Namespace { local: "ns".to_string() };
        assert_eq!(ns.imported(), "*");
    }

    #[test]
    fn test_declared_names_export_decl() {
        let inner = Stmt::new(
            StmtKind::Var {
                kind: VarKind::Const,
                decls: vec![VarDeclarator {
                    name: "x".to_string(),
                    init: None,
                }],
            },
            Span::default(),
        );
        let stmt = Stmt::new(
            StmtKind::ExportNamed {
                decl: Some(Box::new(inner)),
                specifiers: Vec::new(),
                source: None,
            },
            Span::default(),
        );
        assert_eq!(stmt.declared_names(), vec!["x".to_string()]);
    }
}
