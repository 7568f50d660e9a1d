//! Side-effect analysis over AST nodes.
//!
//! A statement with observable side effects must survive tree-shaking even if
//! nothing references its bindings. The analysis is conservative: anything not
//! provably inert counts as an effect.

use super::node::{ArrowBodyKind, Class, Expr, ExprKind, ObjectProp, Stmt, StmtKind, UnaryOp};

/// Policy knobs the effect analysis consults.
#[derive(Debug, Clone, Copy)]
pub struct EffectsContext {
    /// Whether a bare property read (`x.y`) may trigger a getter.
    pub property_read_side_effects: bool,
}

impl Default for EffectsContext {
    fn default() -> Self {
        Self {
            property_read_side_effects: true,
        }
    }
}

/// Whether executing this statement has observable effects.
#[must_use]
pub fn stmt_has_effects(stmt: &Stmt, ctx: EffectsContext) -> bool {
    match &stmt.kind {
        // Imports are handled at module granularity; the declaration itself
        // is inert.
        StmtKind::Import { .. } | StmtKind::ExportAll { .. } | StmtKind::Empty => false,
        StmtKind::ExportNamed { decl, .. } => {
            decl.as_deref().is_some_and(|d| stmt_has_effects(d, ctx))
        }
        StmtKind::ExportDefault { expr } => expr_has_effects(expr, ctx),
        StmtKind::Var { decls, .. } => decls
            .iter()
            .any(|d| d.init.as_ref().is_some_and(|init| expr_has_effects(init, ctx))),
        StmtKind::Function { .. } => false,
        StmtKind::Class { class, .. } => class_has_effects(class, ctx),
        StmtKind::Expr(expr) => expr_has_effects(expr, ctx),
        // Only legal inside function bodies, where inclusion is wholesale.
        StmtKind::Return(_) => true,
        StmtKind::If {
            test,
            consequent,
            alternate,
        } => {
            expr_has_effects(test, ctx)
                || stmt_has_effects(consequent, ctx)
                || alternate.as_deref().is_some_and(|a| stmt_has_effects(a, ctx))
        }
        StmtKind::Block(body) => body.iter().any(|s| stmt_has_effects(s, ctx)),
        StmtKind::While { test, body } => {
            expr_has_effects(test, ctx) || stmt_has_effects(body, ctx)
        }
        StmtKind::For {
            init,
            test,
            update,
            body,
        } => {
            init.as_deref().is_some_and(|s| stmt_has_effects(s, ctx))
                || test.as_deref().is_some_and(|e| expr_has_effects(e, ctx))
                || update.as_deref().is_some_and(|e| expr_has_effects(e, ctx))
                || stmt_has_effects(body, ctx)
        }
        StmtKind::Throw(_) => true,
    }
}

/// Whether evaluating this expression has observable effects.
#[must_use]
pub fn expr_has_effects(expr: &Expr, ctx: EffectsContext) -> bool {
    match &expr.kind {
        ExprKind::Null
        | ExprKind::Bool(_)
        | ExprKind::Number(_)
        | ExprKind::Str(_)
        | ExprKind::TemplateNoSub(_)
        | ExprKind::Ident(_)
        | ExprKind::This
        | ExprKind::ImportMeta => false,
        // Creating a closure is inert; its body only runs when called.
        ExprKind::Function { .. } | ExprKind::Arrow(_) => false,
        ExprKind::Class(class) => class_has_effects(class, ctx),
        ExprKind::Template { exprs, .. } | ExprKind::Sequence(exprs) | ExprKind::Array(exprs) => {
            exprs.iter().any(|e| expr_has_effects(e, ctx))
        }
        ExprKind::Object(props) => props.iter().any(|p| match p {
            ObjectProp::KeyValue { key, value, computed } => {
                (*computed && expr_has_effects(key, ctx)) || expr_has_effects(value, ctx)
            }
            ObjectProp::Shorthand(_) => false,
            ObjectProp::Spread(inner) => expr_has_effects(inner, ctx),
        }),
        ExprKind::Unary { op, arg } => {
            matches!(op, UnaryOp::Delete) || expr_has_effects(arg, ctx)
        }
        ExprKind::Binary { left, right, .. } => {
            expr_has_effects(left, ctx) || expr_has_effects(right, ctx)
        }
        // Writes are always observable.
        ExprKind::Assign { .. } | ExprKind::Update { .. } => true,
        ExprKind::Conditional {
            test,
            consequent,
            alternate,
        } => {
            expr_has_effects(test, ctx)
                || expr_has_effects(consequent, ctx)
                || expr_has_effects(alternate, ctx)
        }
        ExprKind::Member {
            object, property, computed,
        } => {
            ctx.property_read_side_effects
                || expr_has_effects(object, ctx)
                || (*computed && expr_has_effects(property, ctx))
        }
        // Calls may do anything; dynamic import triggers a load.
        ExprKind::Call { .. } | ExprKind::New { .. } | ExprKind::ImportCall(_) => true,
        ExprKind::Spread(inner) | ExprKind::Await(inner) => expr_has_effects(inner, ctx),
    }
}

fn class_has_effects(class: &Class, ctx: EffectsContext) -> bool {
    class
        .super_class
        .as_deref()
        .is_some_and(|e| expr_has_effects(e, ctx))
}

/// Collect every dynamic `import(...)` expression under a statement, in
/// source order.
pub fn collect_dynamic_imports<'a>(stmt: &'a Stmt, out: &mut Vec<&'a Expr>) {
    walk_stmt_exprs(stmt, &mut |expr| {
        if let ExprKind::ImportCall(arg) = &expr.kind {
            out.push(arg);
        }
    });
}

/// Depth-first walk over every expression under a statement, nested function
/// bodies included.
pub fn walk_stmt_exprs<'a>(stmt: &'a Stmt, f: &mut impl FnMut(&'a Expr)) {
    match &stmt.kind {
        StmtKind::Import { .. } | StmtKind::ExportAll { .. } | StmtKind::Empty => {}
        StmtKind::ExportNamed { decl, .. } => {
            if let Some(decl) = decl {
                walk_stmt_exprs(decl, f);
            }
        }
        StmtKind::ExportDefault { expr } => walk_expr(expr, f),
        StmtKind::Var { decls, .. } => {
            for decl in decls {
                if let Some(init) = &decl.init {
                    walk_expr(init, f);
                }
            }
        }
        StmtKind::Function { function, .. } => {
            for s in &function.body {
                walk_stmt_exprs(s, f);
            }
        }
        StmtKind::Class { class, .. } => walk_class(class, f),
        StmtKind::Expr(expr) | StmtKind::Throw(expr) => walk_expr(expr, f),
        StmtKind::Return(arg) => {
            if let Some(arg) = arg {
                walk_expr(arg, f);
            }
        }
        StmtKind::If {
            test,
            consequent,
            alternate,
        } => {
            walk_expr(test, f);
            walk_stmt_exprs(consequent, f);
            if let Some(alt) = alternate {
                walk_stmt_exprs(alt, f);
            }
        }
        StmtKind::Block(body) => {
            for s in body {
                walk_stmt_exprs(s, f);
            }
        }
        StmtKind::While { test, body } => {
            walk_expr(test, f);
            walk_stmt_exprs(body, f);
        }
        StmtKind::For {
            init,
            test,
            update,
            body,
        } => {
            if let Some(init) = init {
                walk_stmt_exprs(init, f);
            }
            if let Some(test) = test {
                walk_expr(test, f);
            }
            if let Some(update) = update {
                walk_expr(update, f);
            }
            walk_stmt_exprs(body, f);
        }
    }
}

/// Depth-first walk over an expression and all of its children.
pub fn walk_expr<'a>(expr: &'a Expr, f: &mut impl FnMut(&'a Expr)) {
    f(expr);
    match &expr.kind {
        ExprKind::Null
        | ExprKind::Bool(_)
        | ExprKind::Number(_)
        | ExprKind::Str(_)
        | ExprKind::TemplateNoSub(_)
        | ExprKind::Ident(_)
        | ExprKind::This
        | ExprKind::ImportMeta => {}
        ExprKind::Template { exprs, .. } | ExprKind::Sequence(exprs) | ExprKind::Array(exprs) => {
            for e in exprs {
                walk_expr(e, f);
            }
        }
        ExprKind::Object(props) => {
            for prop in props {
                match prop {
                    ObjectProp::KeyValue { key, value, computed } => {
                        if *computed {
                            walk_expr(key, f);
                        }
                        walk_expr(value, f);
                    }
                    ObjectProp::Shorthand(_) => {}
                    ObjectProp::Spread(inner) => walk_expr(inner, f),
                }
            }
        }
        ExprKind::Function { function, .. } => {
            for s in &function.body {
                walk_stmt_exprs(s, f);
            }
        }
        ExprKind::Arrow(arrow) => match &arrow.body {
            ArrowBodyKind::Expr(e) => walk_expr(e, f),
            ArrowBodyKind::Block(body) => {
                for s in body {
                    walk_stmt_exprs(s, f);
                }
            }
        },
        ExprKind::Class(class) => walk_class(class, f),
        ExprKind::Unary { arg, .. }
        | ExprKind::Update { arg, .. }
        | ExprKind::Spread(arg)
        | ExprKind::Await(arg)
        | ExprKind::ImportCall(arg) => walk_expr(arg, f),
        ExprKind::Binary { left, right, .. } => {
            walk_expr(left, f);
            walk_expr(right, f);
        }
        ExprKind::Assign { target, value, .. } => {
            walk_expr(target, f);
            walk_expr(value, f);
        }
        ExprKind::Conditional {
            test,
            consequent,
            alternate,
        } => {
            walk_expr(test, f);
            walk_expr(consequent, f);
            walk_expr(alternate, f);
        }
        ExprKind::Member {
            object, property, computed,
        } => {
            walk_expr(object, f);
            if *computed {
                walk_expr(property, f);
            }
        }
        ExprKind::Call { callee, args } | ExprKind::New { callee, args } => {
            walk_expr(callee, f);
            for arg in args {
                walk_expr(arg, f);
            }
        }
    }
}

fn walk_class<'a>(class: &'a Class, f: &mut impl FnMut(&'a Expr)) {
    if let Some(sup) = &class.super_class {
        walk_expr(sup, f);
    }
    for method in &class.methods {
        for s in &method.function.body {
            walk_stmt_exprs(s, f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    fn expr(kind: ExprKind) -> Expr {
        Expr::new(kind, Span::default())
    }

    fn stmt(kind: StmtKind) -> Stmt {
        Stmt::new(kind, Span::default())
    }

    #[test]
    fn test_literals_inert() {
        let ctx = EffectsContext::default();
        assert!(!expr_has_effects(&expr(ExprKind::Number(1.0)), ctx));
        assert!(!expr_has_effects(&expr(ExprKind::Ident("x".into())), ctx));
    }

    #[test]
    fn test_calls_effectful() {
        let ctx = EffectsContext::default();
        let call = expr(ExprKind::Call {
            callee: Box::new(expr(ExprKind::Ident("f".into()))),
            args: Vec::new(),
        });
        assert!(expr_has_effects(&call, ctx));
    }

    #[test]
    fn test_member_respects_policy() {
        let member = expr(ExprKind::Member {
            object: Box::new(expr(ExprKind::Ident("x".into()))),
            property: Box::new(expr(ExprKind::Ident("y".into()))),
            computed: false,
        });
        assert!(expr_has_effects(&member, EffectsContext { property_read_side_effects: true }));
        assert!(!expr_has_effects(&member, EffectsContext { property_read_side_effects: false }));
    }

    #[test]
    fn test_const_decl_with_pure_init_inert() {
        let ctx = EffectsContext::default();
        let decl = stmt(StmtKind::Var {
            kind: crate::ast::VarKind::Const,
            decls: vec![crate::ast::VarDeclarator {
                name: "x".into(),
                init: Some(expr(ExprKind::Number(1.0))),
            }],
        });
        assert!(!stmt_has_effects(&decl, ctx));
    }

    #[test]
    fn test_collect_dynamic_imports() {
        let import_call = expr(ExprKind::ImportCall(Box::new(expr(ExprKind::Str(
            "./lazy".into(),
        )))));
        let s = stmt(StmtKind::Var {
            kind: crate::ast::VarKind::Const,
            decls: vec![crate::ast::VarDeclarator {
                name: "p".into(),
                init: Some(import_call),
            }],
        });
        let mut found = Vec::new();
        collect_dynamic_imports(&s, &mut found);
        assert_eq!(found.len(), 1);
        assert!(matches!(&found[0].kind, ExprKind::Str(s) if s == "./lazy"));
    }
}
