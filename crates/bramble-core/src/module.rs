//! Module and external-module records.
//!
//! Modules live in the graph's arena (`Graph.modules`) and are addressed by
//! index; `module_by_id` maps ids to either arena. A module is mutated by the
//! loader while fetching, then by the linker, analyzer, and tree-shaker in
//! turn.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use bramble_util::{EntryHash, ENTRY_HASH_LEN};

use crate::ast::effects::collect_dynamic_imports;
use crate::ast::{ExprKind, Program, ScopeTree, StmtKind, VariableId};
use crate::plugin::EmittedAsset;

/// Index into `Graph.modules`.
pub type ModuleIdx = usize;

/// Index into `Graph.externals`.
pub type ExternalIdx = usize;

/// Either arena, by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleRef {
    Internal(ModuleIdx),
    External(ExternalIdx),
}

/// Resolution of one import specifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedId {
    /// Resolved module id.
    pub id: String,
    /// Whether the id is external to the build.
    pub external: bool,
}

impl ResolvedId {
    /// An internal resolution.
    #[must_use]
    pub fn internal(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: false,
        }
    }

    /// An external resolution.
    #[must_use]
    pub fn external(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: true,
        }
    }
}

/// An import binding: local name -> (source specifier, imported name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDescription {
    pub source: String,
    /// `default`, `*`, or a named export.
    pub imported: String,
}

/// An export backed by a local binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDescription {
    pub local_name: String,
    /// Top-level statement producing the export.
    pub stmt: usize,
}

/// A re-export (`export { a } from "m"`), which never creates a local binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReexportDescription {
    pub source: String,
    pub imported: String,
}

/// How a dynamic import resolved.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DynamicResolution {
    /// Not resolved yet (or no plugin handled a non-literal expression).
    #[default]
    Unresolved,
    /// A plugin replaced a non-literal expression with this code.
    Replacement(String),
    /// Resolved to an internal module.
    Internal(ModuleIdx),
    /// Resolved to an external module.
    External(ExternalIdx),
}

/// One `import(...)` expression of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicImport {
    /// Top-level statement the expression appears under.
    pub stmt: usize,
    /// String-literal argument, if the argument was a literal.
    pub specifier: Option<String>,
    pub resolution: DynamicResolution,
}

/// Per-top-level-statement analysis state, parallel to `ast.body`.
#[derive(Debug, Clone, Default)]
pub struct StmtInfo {
    /// Whether the statement survives tree-shaking.
    pub included: bool,
    /// Variables the statement declares (filled by the linker).
    pub declared: Vec<VariableId>,
    /// Module-scope and global variables the statement references (filled by
    /// `bind_references`).
    pub referenced: Vec<VariableId>,
    /// Cached side-effect verdict for the current policy.
    pub has_effects: Option<bool>,
}

/// A loaded source file.
#[derive(Debug)]
pub struct Module {
    pub idx: ModuleIdx,
    /// Resolved absolute id, unique within one build.
    pub id: String,
    /// Transformed source.
    pub source: String,
    /// Source as returned by `load`, for cache comparison.
    pub original_code: String,
    pub original_sourcemap: Option<String>,
    pub ast: Program,
    /// Parallel to `ast.body`.
    pub stmt_info: Vec<StmtInfo>,
    /// Literal static import specifiers, in source order, deduplicated.
    pub sources: Vec<String>,
    /// specifier -> resolution; one entry per element of `sources` once the
    /// module's dependencies are fetched.
    pub resolved_ids: FxHashMap<String, ResolvedId>,
    /// local binding name -> import description.
    pub imports: FxHashMap<String, ImportDescription>,
    /// exported name -> local binding.
    pub exports: FxHashMap<String, ExportDescription>,
    /// exported name -> re-export description.
    pub reexports: FxHashMap<String, ReexportDescription>,
    /// `export * from` specifiers, in source order.
    pub export_all_sources: Vec<String>,
    /// Flattened exported name -> originating module id (built after link).
    pub exports_all: FxHashMap<String, String>,
    /// Internal static dependencies, in source order.
    pub dependencies: Vec<ModuleIdx>,
    /// Exported name -> backing variable, materialized after linking. Covers
    /// own exports, re-exports, and names reached through `export *`.
    pub export_variables: FxHashMap<String, VariableId>,
    pub dynamic_imports: Vec<DynamicImport>,
    pub is_entry: bool,
    pub chunk_alias: Option<String>,
    pub entry_points_hash: EntryHash,
    /// Chunk index once partitioned.
    pub chunk: Option<usize>,
    /// Position in `ordered_modules`.
    pub exec_index: usize,
    /// Resolved `this` context.
    pub context: String,
    pub scope: ScopeTree,
    /// Extra files the transform depends on (invalidate together).
    pub transform_dependencies: Vec<String>,
    /// Assets emitted while transforming this module.
    pub transform_assets: Vec<EmittedAsset>,
    /// Whether a transform hook used its plugin cache.
    pub custom_transform_cache: bool,
}

impl Module {
    /// Create an empty module shell; the loader fills it in.
    #[must_use]
    pub fn new(idx: ModuleIdx, id: impl Into<String>) -> Self {
        Self {
            idx,
            id: id.into(),
            source: String::new(),
            original_code: String::new(),
            original_sourcemap: None,
            ast: Program::default(),
            stmt_info: Vec::new(),
            sources: Vec::new(),
            resolved_ids: FxHashMap::default(),
            imports: FxHashMap::default(),
            exports: FxHashMap::default(),
            reexports: FxHashMap::default(),
            export_all_sources: Vec::new(),
            exports_all: FxHashMap::default(),
            dependencies: Vec::new(),
            export_variables: FxHashMap::default(),
            dynamic_imports: Vec::new(),
            is_entry: false,
            chunk_alias: None,
            entry_points_hash: [0u8; ENTRY_HASH_LEN],
            chunk: None,
            exec_index: usize::MAX,
            context: String::new(),
            scope: ScopeTree::new(),
            transform_dependencies: Vec::new(),
            transform_assets: Vec::new(),
            custom_transform_cache: false,
        }
    }

    /// Walk the AST and register imports, exports, re-exports, and dynamic
    /// import expressions. Called once, right after parsing.
    pub fn analyse(&mut self) {
        self.stmt_info = vec![StmtInfo::default(); self.ast.body.len()];
        let mut seen_sources: FxHashSet<String> = FxHashSet::default();

        let body = std::mem::take(&mut self.ast.body);
        for (index, stmt) in body.iter().enumerate() {
            match &stmt.kind {
                StmtKind::Import { specifiers, source } => {
                    if seen_sources.insert(source.clone()) {
                        self.sources.push(source.clone());
                    }
                    for spec in specifiers {
                        self.imports.insert(
                            spec.local().to_string(),
                            ImportDescription {
                                source: source.clone(),
                                imported: spec.imported().to_string(),
                            },
                        );
                    }
                }
                StmtKind::ExportNamed {
                    decl,
                    specifiers,
                    source,
                } => {
                    if let Some(decl) = decl {
                        for name in decl.declared_names() {
                            self.exports.insert(
                                name.clone(),
                                ExportDescription {
                                    local_name: name,
                                    stmt: index,
                                },
                            );
                        }
                    } else if let Some(source) = source {
                        if seen_sources.insert(source.clone()) {
                            self.sources.push(source.clone());
                        }
                        for spec in specifiers {
                            self.reexports.insert(
                                spec.exported.clone(),
                                ReexportDescription {
                                    source: source.clone(),
                                    imported: spec.local.clone(),
                                },
                            );
                        }
                    } else {
                        for spec in specifiers {
                            self.exports.insert(
                                spec.exported.clone(),
                                ExportDescription {
                                    local_name: spec.local.clone(),
                                    stmt: index,
                                },
                            );
                        }
                    }
                }
                StmtKind::ExportDefault { expr } => {
                    let local_name = match &expr.kind {
                        ExprKind::Ident(name) => name.clone(),
                        ExprKind::Function { name: Some(name), .. } => name.clone(),
                        _ => "*default*".to_string(),
                    };
                    self.exports.insert(
                        "default".to_string(),
                        ExportDescription {
                            local_name,
                            stmt: index,
                        },
                    );
                }
                StmtKind::ExportAll { source } => {
                    if seen_sources.insert(source.clone()) {
                        self.sources.push(source.clone());
                    }
                    self.export_all_sources.push(source.clone());
                }
                _ => {}
            }

            let mut found = Vec::new();
            collect_dynamic_imports(stmt, &mut found);
            for arg in found {
                let specifier = match &arg.kind {
                    ExprKind::Str(value) | ExprKind::TemplateNoSub(value) => Some(value.clone()),
                    _ => None,
                };
                self.dynamic_imports.push(DynamicImport {
                    stmt: index,
                    specifier,
                    resolution: DynamicResolution::Unresolved,
                });
            }
        }
        self.ast.body = body;
    }

    /// Whether any statement of the module survived tree-shaking.
    #[must_use]
    pub fn is_included(&self) -> bool {
        self.stmt_info.iter().any(|info| info.included)
    }
}

/// Stands in for an id the host declared external. Never has an AST.
#[derive(Debug)]
pub struct ExternalModule {
    pub idx: ExternalIdx,
    pub id: String,
    /// Set when a namespace of the external is observable (dynamic import or
    /// `import * as ns`).
    pub exports_namespace: bool,
    /// imported name -> variable, for unused-import warnings.
    pub variables: FxHashMap<String, VariableId>,
    /// Modules importing this external, in first-seen order.
    pub importers: Vec<String>,
}

impl ExternalModule {
    /// Create a new external module record.
    #[must_use]
    pub fn new(idx: ExternalIdx, id: impl Into<String>) -> Self {
        Self {
            idx,
            id: id.into(),
            exports_namespace: false,
            variables: FxHashMap::default(),
            importers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse_module, ParserOptions};

    fn analysed(source: &str) -> Module {
        let mut module = Module::new(0, "/test.js");
        module.ast = parse_module(source, &ParserOptions::default()).unwrap();
        module.analyse();
        module
    }

    #[test]
    fn test_analyse_imports() {
        let module = analysed("import a, { b as c } from \"./x\";\nimport \"./x\";\nimport * as ns from \"./y\";");
        assert_eq!(module.sources, vec!["./x".to_string(), "./y".to_string()]);
        assert_eq!(module.imports["a"].imported, "default");
        assert_eq!(module.imports["c"].imported, "b");
        assert_eq!(module.imports["ns"].imported, "*");
    }

    #[test]
    fn test_analyse_exports() {
        let module = analysed(
            "export const x = 1;\nconst y = 2;\nexport { y as z };\nexport default function main() {}\nexport * from \"./all\";\nexport { w } from \"./re\";",
        );
        assert_eq!(module.exports["x"].local_name, "x");
        assert_eq!(module.exports["z"].local_name, "y");
        assert_eq!(module.exports["default"].local_name, "main");
        assert_eq!(module.export_all_sources, vec!["./all".to_string()]);
        assert_eq!(module.reexports["w"].source, "./re");
        assert!(module.sources.contains(&"./all".to_string()));
        assert!(module.sources.contains(&"./re".to_string()));
    }

    #[test]
    fn test_analyse_default_expr_gets_synthetic_name() {
        let module = analysed("export default 1 + 2;");
        assert_eq!(module.exports["default"].local_name, "*default*");
    }

    #[test]
    fn test_analyse_dynamic_imports() {
        let module = analysed("const p = import(\"./lazy\");\nfunction f() { return import(target); }");
        assert_eq!(module.dynamic_imports.len(), 2);
        assert_eq!(module.dynamic_imports[0].specifier.as_deref(), Some("./lazy"));
        assert_eq!(module.dynamic_imports[0].stmt, 0);
        assert!(module.dynamic_imports[1].specifier.is_none());
    }

    #[test]
    fn test_sources_exclude_dynamic() {
        let module = analysed("import \"./static\";\nconst p = import(\"./lazy\");");
        assert_eq!(module.sources, vec!["./static".to_string()]);
    }
}
