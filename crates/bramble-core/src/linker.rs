//! Cross-module binding linker.
//!
//! Two ordered passes over the loaded modules:
//!
//! 1. `link_dependencies` — declare every module's top-level bindings, then
//!    resolve every import to a concrete variable in the exporting module,
//!    walking re-export chains. Missing exports either synthesize the
//!    `_missingExportShim` sentinel or abort the build.
//! 2. `bind_references` — resolve every identifier reference to its declaring
//!    variable through the scope chain; unknown names land in the global
//!    scope.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::node::{ArrowBodyKind, Class, Expr, ExprKind, ObjectProp, Stmt, StmtKind};
use crate::ast::{
    GlobalScope, NamespaceIndex, Variable, VariableId, VariableKind, VariableTable,
};
use crate::error::{BuildError, BuildResult};
use crate::module::{ExternalModule, Module, ModuleIdx, ModuleRef};
use crate::options::InputOptions;

/// Mutable graph state the linker operates on.
pub(crate) struct Linker<'a> {
    pub modules: &'a mut Vec<Module>,
    pub externals: &'a mut Vec<ExternalModule>,
    pub module_by_id: &'a FxHashMap<String, ModuleRef>,
    pub variables: &'a mut VariableTable,
    pub namespaces: &'a mut NamespaceIndex,
    pub globals: &'a mut GlobalScope,
    pub options: &'a InputOptions,
}

/// Where an export chain ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExportTarget {
    Variable(VariableId),
    Missing,
}

impl<'a> Linker<'a> {
    /// Run both passes, then materialize each module's export bindings.
    pub fn link(&mut self) -> BuildResult<()> {
        self.declare_locals();
        self.link_dependencies()?;
        self.materialize_exports()?;
        self.bind_references();
        Ok(())
    }

    /// Declare module-scope variables for every top-level declaration that is
    /// not an import binding.
    fn declare_locals(&mut self) {
        for idx in 0..self.modules.len() {
            for stmt_index in 0..self.modules[idx].ast.body.len() {
                let names = {
                    let stmt = &self.modules[idx].ast.body[stmt_index];
                    declared_names_for_linking(stmt)
                };
                for name in names {
                    let mut variable = Variable::new(&name, VariableKind::Local);
                    variable.module = Some(idx);
                    variable.decl_stmt = Some(stmt_index);
                    let vid = self.variables.add(variable);
                    let scope = self.modules[idx].scope.module_scope();
                    self.modules[idx].scope.declare(scope, name, vid);
                    self.modules[idx].stmt_info[stmt_index].declared.push(vid);
                }
            }
        }
    }

    /// Resolve every import declaration to a concrete variable.
    fn link_dependencies(&mut self) -> BuildResult<()> {
        for idx in 0..self.modules.len() {
            let mut imports: Vec<(String, String, String)> = self.modules[idx]
                .imports
                .iter()
                .map(|(local, desc)| (local.clone(), desc.source.clone(), desc.imported.clone()))
                .collect();
            imports.sort();

            for (local, source, imported) in imports {
                let Some(resolved) = self.modules[idx].resolved_ids.get(&source).cloned() else {
                    continue;
                };

                let vid = if resolved.external {
                    let external_idx = self.external_idx_for(&resolved.id);
                    self.external_variable(external_idx, &imported)
                } else {
                    let Some(&ModuleRef::Internal(target)) = self.module_by_id.get(&resolved.id)
                    else {
                        continue;
                    };
                    if imported == "*" {
                        self.namespaces.for_module(self.variables, target)
                    } else {
                        let mut visited = FxHashSet::default();
                        match self.resolve_export(target, &imported, &mut visited) {
                            ExportTarget::Variable(vid) => vid,
                            ExportTarget::Missing => {
                                if self.options.shim_missing_exports {
                                    self.globals
                                        .find_variable(self.variables, "_missingExportShim")
                                } else {
                                    let importer = self.modules[idx].id.clone();
                                    return Err(BuildError::missing_export(
                                        &imported, &importer, &source,
                                    ));
                                }
                            }
                        }
                    }
                };

                // Import bindings shadow nothing at module scope; the local
                // name simply aliases the exporting module's variable.
                let scope = self.modules[idx].scope.module_scope();
                self.modules[idx].scope.declare(scope, local, vid);
            }

            // Re-exports participate in export tracing from other modules;
            // validate the ones that point at concrete names now so missing
            // exports fail the build deterministically.
            let mut reexports: Vec<(String, String, String)> = self.modules[idx]
                .reexports
                .iter()
                .map(|(name, re)| (name.clone(), re.source.clone(), re.imported.clone()))
                .collect();
            reexports.sort();
            for (_name, source, imported) in reexports {
                let Some(resolved) = self.modules[idx].resolved_ids.get(&source).cloned() else {
                    continue;
                };
                if resolved.external {
                    let external_idx = self.external_idx_for(&resolved.id);
                    self.external_variable(external_idx, &imported);
                    continue;
                }
                let Some(&ModuleRef::Internal(target)) = self.module_by_id.get(&resolved.id)
                else {
                    continue;
                };
                let mut visited = FxHashSet::default();
                if self.resolve_export(target, &imported, &mut visited) == ExportTarget::Missing
                    && !self.options.shim_missing_exports
                {
                    let importer = self.modules[idx].id.clone();
                    return Err(BuildError::missing_export(&imported, &importer, &source));
                }
            }
        }
        Ok(())
    }

    /// Follow an exported name to the variable that backs it.
    pub(crate) fn resolve_export(
        &mut self,
        module: ModuleIdx,
        name: &str,
        visited: &mut FxHashSet<(ModuleIdx, String)>,
    ) -> ExportTarget {
        if !visited.insert((module, name.to_string())) {
            return ExportTarget::Missing;
        }

        if let Some(export) = self.modules[module].exports.get(name).cloned() {
            // The local backing an export may itself be an import binding.
            if let Some(import) = self.modules[module].imports.get(&export.local_name).cloned() {
                return self.resolve_import_target(module, &import.source, &import.imported, visited);
            }
            let scope = self.modules[module].scope.module_scope();
            return match self.modules[module].scope.lookup(scope, &export.local_name) {
                Some(vid) => ExportTarget::Variable(vid),
                None => ExportTarget::Missing,
            };
        }

        if let Some(reexport) = self.modules[module].reexports.get(name).cloned() {
            return self.resolve_import_target(module, &reexport.source, &reexport.imported, visited);
        }

        let origin = self.modules[module].exports_all.get(name).cloned();
        if let Some(origin) = origin {
            if origin != self.modules[module].id {
                if let Some(&ModuleRef::Internal(target)) = self.module_by_id.get(&origin) {
                    return self.resolve_export(target, name, visited);
                }
            }
        }

        ExportTarget::Missing
    }

    fn resolve_import_target(
        &mut self,
        module: ModuleIdx,
        source: &str,
        imported: &str,
        visited: &mut FxHashSet<(ModuleIdx, String)>,
    ) -> ExportTarget {
        let Some(resolved) = self.modules[module].resolved_ids.get(source).cloned() else {
            return ExportTarget::Missing;
        };
        if resolved.external {
            let external_idx = self.external_idx_for(&resolved.id);
            return ExportTarget::Variable(self.external_variable(external_idx, imported));
        }
        let Some(&ModuleRef::Internal(target)) = self.module_by_id.get(&resolved.id) else {
            return ExportTarget::Missing;
        };
        if imported == "*" {
            return ExportTarget::Variable(self.namespaces.for_module(self.variables, target));
        }
        self.resolve_export(target, imported, visited)
    }

    fn external_idx_for(&self, id: &str) -> usize {
        match self.module_by_id.get(id) {
            Some(&ModuleRef::External(idx)) => idx,
            _ => unreachable!("external id {id} registered during fetch"),
        }
    }

    /// Get or create the variable standing for one imported name of an
    /// external module.
    fn external_variable(&mut self, external: usize, imported: &str) -> VariableId {
        if let Some(&vid) = self.externals[external].variables.get(imported) {
            return vid;
        }
        if imported == "*" {
            self.externals[external].exports_namespace = true;
        }
        let mut variable = Variable::new(
            imported,
            VariableKind::External {
                external,
                imported: imported.to_string(),
            },
        );
        variable.module = None;
        let vid = self.variables.add(variable);
        self.externals[external]
            .variables
            .insert(imported.to_string(), vid);
        vid
    }

    /// Resolve every exported name of every module to its backing variable.
    ///
    /// Later passes (public-export marking, namespace expansion, chunk
    /// export population) read this table instead of re-walking re-export
    /// chains.
    fn materialize_exports(&mut self) -> BuildResult<()> {
        for idx in 0..self.modules.len() {
            let mut names: Vec<String> = self.modules[idx]
                .exports
                .keys()
                .chain(self.modules[idx].reexports.keys())
                .chain(self.modules[idx].exports_all.keys())
                .cloned()
                .collect();
            names.sort_unstable();
            names.dedup();

            for name in names {
                let mut visited = FxHashSet::default();
                let vid = match self.resolve_export(idx, &name, &mut visited) {
                    ExportTarget::Variable(vid) => vid,
                    ExportTarget::Missing => {
                        if self.options.shim_missing_exports {
                            self.globals.find_variable(self.variables, "_missingExportShim")
                        } else {
                            let id = self.modules[idx].id.clone();
                            return Err(BuildError::new(
                                crate::error::codes::MISSING_EXPORT,
                                format!("'{name}' is exported by {id} but has no binding"),
                            )
                            .with_id(id));
                        }
                    }
                };
                self.modules[idx].export_variables.insert(name, vid);
            }
        }
        Ok(())
    }

    /// Resolve identifier references in every statement to variables.
    fn bind_references(&mut self) {
        for idx in 0..self.modules.len() {
            for stmt_index in 0..self.modules[idx].ast.body.len() {
                let names = {
                    let stmt = &self.modules[idx].ast.body[stmt_index];
                    let mut collector = ReferenceCollector::new();
                    collector.collect_stmt(stmt);
                    collector.into_names()
                };

                let mut referenced = Vec::with_capacity(names.len());
                for name in names {
                    let scope = self.modules[idx].scope.module_scope();
                    let vid = match self.modules[idx].scope.lookup(scope, &name) {
                        Some(vid) => vid,
                        None => self.globals.find_variable(self.variables, &name),
                    };
                    // Binding-time usage feeds the unused-external-import
                    // warning, independent of inclusion.
                    self.variables.get_mut(vid).used = true;
                    referenced.push(vid);
                }
                self.modules[idx].stmt_info[stmt_index].referenced = referenced;
            }
        }
    }
}

/// Top-level names a statement introduces into module scope, import bindings
/// excluded (those alias other modules' variables).
fn declared_names_for_linking(stmt: &Stmt) -> Vec<String> {
    match &stmt.kind {
        StmtKind::Import { .. } => Vec::new(),
        StmtKind::ExportDefault { expr } => match &expr.kind {
            ExprKind::Ident(_) => Vec::new(),
            ExprKind::Function { name: Some(name), .. } => vec![name.clone()],
            _ => vec!["*default*".to_string()],
        },
        _ => stmt.declared_names(),
    }
}

/// Scope-aware reference collector.
///
/// Walks one top-level statement; names resolved inside nested function or
/// block scopes stay local, everything else is reported as a module-scope or
/// global reference.
struct ReferenceCollector {
    locals: Vec<FxHashSet<String>>,
    found: Vec<String>,
    seen: FxHashSet<String>,
}

impl ReferenceCollector {
    fn new() -> Self {
        Self {
            locals: Vec::new(),
            found: Vec::new(),
            seen: FxHashSet::default(),
        }
    }

    fn into_names(self) -> Vec<String> {
        self.found
    }

    fn reference(&mut self, name: &str) {
        if self.locals.iter().any(|scope| scope.contains(name)) {
            return;
        }
        if self.seen.insert(name.to_string()) {
            self.found.push(name.to_string());
        }
    }

    fn enter_scope(&mut self, names: FxHashSet<String>) {
        self.locals.push(names);
    }

    fn exit_scope(&mut self) {
        self.locals.pop();
    }

    fn collect_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Import { .. } | StmtKind::ExportAll { .. } | StmtKind::Empty => {}
            // Bare export specifiers resolve through the export table, not
            // through references.
            StmtKind::ExportNamed { decl, .. } => {
                if let Some(decl) = decl {
                    self.collect_stmt(decl);
                }
            }
            StmtKind::ExportDefault { expr } => self.collect_expr(expr),
            StmtKind::Var { decls, .. } => {
                for decl in decls {
                    if let Some(init) = &decl.init {
                        self.collect_expr(init);
                    }
                }
            }
            StmtKind::Function { function, .. } => {
                self.enter_function(&function.params, &function.body);
            }
            StmtKind::Class { class, .. } => self.collect_class(class),
            StmtKind::Expr(expr) | StmtKind::Throw(expr) => self.collect_expr(expr),
            StmtKind::Return(arg) => {
                if let Some(arg) = arg {
                    self.collect_expr(arg);
                }
            }
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                self.collect_expr(test);
                self.collect_stmt(consequent);
                if let Some(alt) = alternate {
                    self.collect_stmt(alt);
                }
            }
            StmtKind::Block(body) => {
                self.enter_scope(hoisted_names(body));
                for stmt in body {
                    self.collect_stmt(stmt);
                }
                self.exit_scope();
            }
            StmtKind::While { test, body } => {
                self.collect_expr(test);
                self.collect_stmt(body);
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                let mut names = FxHashSet::default();
                if let Some(init) = init {
                    for name in init.declared_names() {
                        names.insert(name);
                    }
                }
                self.enter_scope(names);
                if let Some(init) = init {
                    self.collect_stmt(init);
                }
                if let Some(test) = test {
                    self.collect_expr(test);
                }
                if let Some(update) = update {
                    self.collect_expr(update);
                }
                self.collect_stmt(body);
                self.exit_scope();
            }
        }
    }

    fn collect_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Ident(name) => self.reference(name),
            ExprKind::Null
            | ExprKind::Bool(_)
            | ExprKind::Number(_)
            | ExprKind::Str(_)
            | ExprKind::TemplateNoSub(_)
            | ExprKind::This
            | ExprKind::ImportMeta => {}
            ExprKind::Template { exprs, .. }
            | ExprKind::Sequence(exprs)
            | ExprKind::Array(exprs) => {
                for e in exprs {
                    self.collect_expr(e);
                }
            }
            ExprKind::Object(props) => {
                for prop in props {
                    match prop {
                        ObjectProp::KeyValue { key, value, computed } => {
                            if *computed {
                                self.collect_expr(key);
                            }
                            self.collect_expr(value);
                        }
                        ObjectProp::Shorthand(name) => self.reference(name),
                        ObjectProp::Spread(inner) => self.collect_expr(inner),
                    }
                }
            }
            ExprKind::Function { name, function } => {
                let mut params = function.params.clone();
                // A named function expression can call itself.
                if let Some(name) = name {
                    params.push(name.clone());
                }
                self.enter_function(&params, &function.body);
            }
            ExprKind::Arrow(arrow) => match &arrow.body {
                ArrowBodyKind::Expr(body) => {
                    let names = arrow.params.iter().cloned().collect();
                    self.enter_scope(names);
                    self.collect_expr(body);
                    self.exit_scope();
                }
                ArrowBodyKind::Block(body) => self.enter_function(&arrow.params, body),
            },
            ExprKind::Class(class) => self.collect_class(class),
            ExprKind::Unary { arg, .. }
            | ExprKind::Update { arg, .. }
            | ExprKind::Spread(arg)
            | ExprKind::Await(arg)
            | ExprKind::ImportCall(arg) => self.collect_expr(arg),
            ExprKind::Binary { left, right, .. } => {
                self.collect_expr(left);
                self.collect_expr(right);
            }
            ExprKind::Assign { target, value, .. } => {
                self.collect_expr(target);
                self.collect_expr(value);
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.collect_expr(test);
                self.collect_expr(consequent);
                self.collect_expr(alternate);
            }
            ExprKind::Member {
                object, property, computed,
            } => {
                self.collect_expr(object);
                if *computed {
                    self.collect_expr(property);
                }
            }
            ExprKind::Call { callee, args } | ExprKind::New { callee, args } => {
                self.collect_expr(callee);
                for arg in args {
                    self.collect_expr(arg);
                }
            }
        }
    }

    fn collect_class(&mut self, class: &Class) {
        if let Some(sup) = &class.super_class {
            self.collect_expr(sup);
        }
        for method in &class.methods {
            self.enter_function(&method.function.params, &method.function.body);
        }
    }

    fn enter_function(&mut self, params: &[String], body: &[Stmt]) {
        let mut names: FxHashSet<String> = params.iter().cloned().collect();
        for name in hoisted_names(body) {
            names.insert(name);
        }
        self.enter_scope(names);
        for stmt in body {
            self.collect_stmt(stmt);
        }
        self.exit_scope();
    }
}

/// Names declared directly by a statement list (one level, no descent into
/// nested functions).
fn hoisted_names(body: &[Stmt]) -> FxHashSet<String> {
    let mut names = FxHashSet::default();
    for stmt in body {
        for name in stmt.declared_names() {
            names.insert(name);
        }
    }
    names
}
