//! Asynchronous module fetch pipeline.
//!
//! `fetch_module` resolves, loads, transforms, parses, and registers one
//! module, then recurses into its dependencies. Registration into
//! `module_by_id` happens synchronously before the first await, so a cyclic
//! import finds the in-flight module and short-circuits.
//!
//! Concurrency is confined to hook I/O: per module, all static and dynamic
//! specifier resolutions run concurrently, then results are applied in source
//! order and internal dependencies are fetched depth-first. `modules` ends up
//! in DFS pre-order of static imports from the first entry, independent of
//! hook timing.

use futures::future::{join_all, BoxFuture};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use bramble_util::{is_relative_specifier, relative_id};

use crate::ast::LineIndex;
use crate::cache::ModuleRecord;
use crate::error::{codes, BuildError, BuildResult};
use crate::module::{
    DynamicResolution, ExternalIdx, ExternalModule, Module, ModuleIdx, ModuleRef, ResolvedId,
};
use crate::options::InputOptions;
use crate::parse::parse_module;
use crate::plugin::{PluginDriver, Resolution};
use crate::warning::Warning;

/// How one static specifier resolved.
enum StaticResolution {
    Internal(String),
    External(String),
    ExternalWithWarning(String, Warning),
}

/// How one dynamic import resolved, before arena registration.
enum DynamicOutcome {
    Unresolved,
    Replacement(String),
    Internal(String),
    External(String, Option<Warning>),
}

/// Borrowed view of the graph state the fetch phase mutates.
pub(crate) struct ModuleLoader<'a> {
    pub plugins: &'a PluginDriver,
    pub options: &'a InputOptions,
    pub modules: &'a mut Vec<Module>,
    pub externals: &'a mut Vec<ExternalModule>,
    pub module_by_id: &'a mut FxHashMap<String, ModuleRef>,
    pub watch_files: &'a mut FxHashSet<String>,
    pub warnings: &'a mut Vec<Warning>,
    pub cached: FxHashMap<&'a str, &'a ModuleRecord>,
}

impl<'a> ModuleLoader<'a> {
    /// Resolve and fetch every entry point, in configured order.
    pub async fn add_entry_modules(&mut self) -> BuildResult<Vec<ModuleIdx>> {
        let entries = self.options.input.clone();
        let mut entry_indices = Vec::with_capacity(entries.len());
        let mut ids_seen: FxHashMap<String, String> = FxHashMap::default();

        for entry in &entries {
            let id = self.resolve_entry(&entry.target).await?;

            let label = entry.alias.clone().unwrap_or_else(|| entry.target.clone());
            if ids_seen.contains_key(&id) {
                return Err(BuildError::duplicate_entry_points(&label, &id));
            }
            ids_seen.insert(id.clone(), label);

            let idx = self.fetch_module(id, None).await?;
            let module = &mut self.modules[idx];
            module.is_entry = true;
            module.chunk_alias = entry.alias.clone().or_else(|| file_stem(&module.id));
            entry_indices.push(idx);
        }

        Ok(entry_indices)
    }

    async fn resolve_entry(&mut self, target: &str) -> BuildResult<String> {
        if self.options.external.is_external(target, None, false) {
            return Err(BuildError::unresolved_entry(format!(
                "Entry module cannot be external ({target})"
            )));
        }
        match self.plugins.resolve_id(target, None).await? {
            Resolution::Resolved(id) => {
                if self.options.external.is_external(&id, None, true) {
                    return Err(BuildError::unresolved_entry(format!(
                        "Entry module cannot be external ({target})"
                    )));
                }
                Ok(id)
            }
            Resolution::ExplicitExternal => Err(BuildError::unresolved_entry(format!(
                "Entry module cannot be external ({target})"
            ))),
            Resolution::Unhandled => {
                if std::path::Path::new(target).exists() || self.cached.contains_key(target) {
                    Ok(target.to_string())
                } else {
                    Err(BuildError::unresolved_entry(format!(
                        "Could not resolve entry ({target})"
                    )))
                }
            }
        }
    }

    /// Fetch one module by resolved id, registering it before any hook runs.
    pub fn fetch_module(
        &mut self,
        id: String,
        importer: Option<String>,
    ) -> BoxFuture<'_, BuildResult<ModuleIdx>> {
        Box::pin(async move {
            if let Some(ModuleRef::Internal(idx)) = self.module_by_id.get(&id) {
                return Ok(*idx);
            }

            let idx = self.modules.len();
            self.modules.push(Module::new(idx, &id));
            self.module_by_id.insert(id.clone(), ModuleRef::Internal(idx));
            self.watch_files.insert(id.clone());
            trace!(module = %id, "fetching");

            let loaded = self.plugins.load(&id).await.map_err(|err| {
                load_failure(&id, importer.as_deref(), &err.to_string())
            })?;

            let original = match loaded {
                Some((source, _plugin)) => source,
                None => self.load_from_disk(&id, importer.as_deref()).await?,
            };

            let reused = self.reuse_cached(idx, &id, &original.code);
            if !reused {
                let asset_mark = self.plugins.context().asset_count();
                let (transformed, used_cache) = self
                    .plugins
                    .transform(original.code.clone(), &id)
                    .await
                    .map_err(|err| err.with_id(&id))?;

                let module = &mut self.modules[idx];
                module.original_code = original.code;
                module.original_sourcemap = original.map;
                module.custom_transform_cache = used_cache;
                module.transform_assets = self.plugins.context().assets_since(asset_mark);

                let ast = match transformed.ast.or(original.ast) {
                    Some(ast) => ast,
                    None => parse_module(&transformed.code, &self.options.parser).map_err(|err| {
                        let (line, column) =
                            LineIndex::new(&transformed.code).line_col(err.span.start);
                        BuildError::parse(format!(
                            "Could not parse {id} ({line}:{column}): {}",
                            err.message
                        ))
                        .with_id(&id)
                    })?,
                };
                module.source = transformed.code;
                module.ast = ast;
            }

            let module = &mut self.modules[idx];
            module.context = self.options.context_for(&id);
            module.analyse();
            for dep in module.transform_dependencies.clone() {
                self.watch_files.insert(dep);
            }

            self.fetch_all_dependencies(idx).await?;
            self.flatten_export_all(idx);
            Ok(idx)
        })
    }

    /// Reuse a cached module when the loaded source is unchanged and the
    /// transform did not depend on plugin-cache state. Returns whether the
    /// cache hit.
    fn reuse_cached(&mut self, idx: ModuleIdx, id: &str, original_code: &str) -> bool {
        let Some(record) = self.cached.get(id).copied() else {
            return false;
        };
        if record.original_code != original_code || record.custom_transform_cache {
            return false;
        }

        debug!(module = %id, "cache hit, skipping transform");
        let module = &mut self.modules[idx];
        module.original_code = record.original_code.clone();
        module.original_sourcemap = record.original_sourcemap.clone();
        module.source = record.code.clone();
        module.ast = record.ast.clone();
        module.resolved_ids = record.resolved_ids.clone();
        module.transform_dependencies = record.transform_dependencies.clone();
        module.transform_assets = record.transform_assets.clone();
        for asset in &record.transform_assets {
            self.plugins.context().emit_existing_asset(asset);
        }
        true
    }

    async fn load_from_disk(
        &self,
        id: &str,
        importer: Option<&str>,
    ) -> BuildResult<crate::plugin::SourceDescription> {
        let bytes = tokio::fs::read(id)
            .await
            .map_err(|err| load_failure(id, importer, &err.to_string()))?;
        let code = String::from_utf8(bytes).map_err(|_| {
            BuildError::bad_loader(format!("{id} is not valid UTF-8")).with_id(id)
        })?;
        Ok(crate::plugin::SourceDescription::code(code))
    }

    /// Resolve all static and dynamic dependencies of a module. The two
    /// resolution fan-outs run concurrently; both must settle before this
    /// returns, and application order is source order either way.
    async fn fetch_all_dependencies(&mut self, idx: ModuleIdx) -> BuildResult<()> {
        let module_id = self.modules[idx].id.clone();
        let sources = self.modules[idx].sources.clone();
        let prepopulated = self.modules[idx].resolved_ids.clone();
        let dynamic_specs: Vec<Option<String>> = self.modules[idx]
            .dynamic_imports
            .iter()
            .map(|d| d.specifier.clone())
            .collect();

        let (static_results, dynamic_results) = {
            let plugins = self.plugins;
            let options = self.options;
            let static_futs = sources.iter().map(|source| {
                resolve_static(plugins, options, &module_id, source, prepopulated.get(source))
            });
            let dynamic_futs = dynamic_specs.iter().map(|spec| {
                resolve_dynamic(plugins, options, &module_id, spec.as_deref())
            });
            futures::join!(join_all(static_futs), join_all(dynamic_futs))
        };

        for (source, result) in sources.iter().zip(static_results) {
            match result? {
                StaticResolution::Internal(id) => {
                    self.modules[idx]
                        .resolved_ids
                        .insert(source.clone(), ResolvedId::internal(&id));
                    let dep = self.fetch_module(id, Some(module_id.clone())).await?;
                    if !self.modules[idx].dependencies.contains(&dep) {
                        self.modules[idx].dependencies.push(dep);
                    }
                }
                StaticResolution::External(id) => {
                    self.modules[idx]
                        .resolved_ids
                        .insert(source.clone(), ResolvedId::external(&id));
                    self.ensure_external(&id, &module_id);
                }
                StaticResolution::ExternalWithWarning(id, warning) => {
                    self.warnings.push(warning);
                    self.modules[idx]
                        .resolved_ids
                        .insert(source.clone(), ResolvedId::external(&id));
                    self.ensure_external(&id, &module_id);
                }
            }
        }

        for (position, result) in dynamic_results.into_iter().enumerate() {
            match result? {
                DynamicOutcome::Unresolved => {}
                DynamicOutcome::Replacement(code) => {
                    self.modules[idx].dynamic_imports[position].resolution =
                        DynamicResolution::Replacement(code);
                }
                DynamicOutcome::External(id, warning) => {
                    if let Some(warning) = warning {
                        self.warnings.push(warning);
                    }
                    let external_idx = self.ensure_external(&id, &module_id);
                    self.externals[external_idx].exports_namespace = true;
                    // Register the external under the resolved id so later
                    // lookups find the external module, not the importer.
                    self.module_by_id
                        .insert(id.clone(), ModuleRef::External(external_idx));
                    self.modules[idx].dynamic_imports[position].resolution =
                        DynamicResolution::External(external_idx);
                }
                DynamicOutcome::Internal(id) => {
                    let target = self.fetch_module(id, Some(module_id.clone())).await?;
                    self.modules[idx].dynamic_imports[position].resolution =
                        DynamicResolution::Internal(target);
                }
            }
        }

        Ok(())
    }

    /// Create or reuse the external module for an id, recording the importer.
    fn ensure_external(&mut self, id: &str, importer: &str) -> ExternalIdx {
        if let Some(ModuleRef::External(idx)) = self.module_by_id.get(id) {
            let idx = *idx;
            let external = &mut self.externals[idx];
            if !external.importers.iter().any(|i| i == importer) {
                external.importers.push(importer.to_string());
            }
            return idx;
        }
        let idx = self.externals.len();
        let mut external = ExternalModule::new(idx, id);
        external.importers.push(importer.to_string());
        self.externals.push(external);
        self.module_by_id
            .insert(id.to_string(), ModuleRef::External(idx));
        idx
    }

    /// Merge `export *` sources into `exports_all` once this module's
    /// dependencies are all fetched. First-seen binding wins on conflicts.
    fn flatten_export_all(&mut self, idx: ModuleIdx) {
        let module_id = self.modules[idx].id.clone();

        let mut exports_all: FxHashMap<String, String> = FxHashMap::default();
        for name in self.modules[idx].exports.keys() {
            exports_all.insert(name.clone(), module_id.clone());
        }
        for (name, reexport) in &self.modules[idx].reexports {
            let origin = self.modules[idx]
                .resolved_ids
                .get(&reexport.source)
                .map_or_else(|| reexport.source.clone(), |r| r.id.clone());
            exports_all.insert(name.clone(), origin);
        }

        let all_sources = self.modules[idx].export_all_sources.clone();
        for source in &all_sources {
            let Some(resolved) = self.modules[idx].resolved_ids.get(source).cloned() else {
                continue;
            };
            if resolved.external {
                continue;
            }
            let Some(ModuleRef::Internal(dep_idx)) = self.module_by_id.get(&resolved.id) else {
                continue;
            };
            let mut dep_exports: Vec<(String, String)> = self.modules[*dep_idx]
                .exports_all
                .iter()
                .map(|(name, origin)| (name.clone(), origin.clone()))
                .collect();
            dep_exports.sort();
            for (name, origin) in dep_exports {
                // `export *` never re-exports default.
                if name == "default" {
                    continue;
                }
                if let Some(existing) = exports_all.get(&name) {
                    if existing != &origin {
                        self.warnings.push(
                            Warning::new(
                                codes::NAMESPACE_CONFLICT,
                                format!(
                                    "Conflicting namespaces: {module_id} re-exports '{name}' from both {existing} and {origin} (will be ignored)"
                                ),
                            )
                            .with_id(&module_id),
                        );
                    }
                    continue;
                }
                exports_all.insert(name, origin);
            }
        }

        self.modules[idx].exports_all = exports_all;
    }
}

fn load_failure(id: &str, importer: Option<&str>, cause: &str) -> BuildError {
    let message = match importer {
        Some(importer) => format!("Could not load {id} (imported by {importer}): {cause}"),
        None => format!("Could not load {id}: {cause}"),
    };
    BuildError::bad_loader(message).with_id(id)
}

/// Resolve a static specifier: pre-populated resolution, then the external
/// predicate, then the plugin chain, then lexical path resolution.
async fn resolve_static(
    plugins: &PluginDriver,
    options: &InputOptions,
    importer: &str,
    source: &str,
    prepopulated: Option<&ResolvedId>,
) -> BuildResult<StaticResolution> {
    if let Some(resolved) = prepopulated {
        return Ok(if resolved.external {
            StaticResolution::External(resolved.id.clone())
        } else {
            StaticResolution::Internal(resolved.id.clone())
        });
    }

    if options.external.is_external(source, Some(importer), false) {
        return Ok(StaticResolution::External(external_id_for(source, importer)));
    }

    match plugins.resolve_id(source, Some(importer)).await? {
        Resolution::Resolved(id) => {
            if options.external.is_external(&id, Some(importer), true) {
                Ok(StaticResolution::External(id))
            } else {
                Ok(StaticResolution::Internal(id))
            }
        }
        Resolution::ExplicitExternal => {
            Ok(StaticResolution::External(external_id_for(source, importer)))
        }
        Resolution::Unhandled => {
            if is_relative_specifier(source) || source.starts_with('/') {
                let candidate = external_id_for(source, importer);
                if std::path::Path::new(&candidate).exists() {
                    Ok(StaticResolution::Internal(candidate))
                } else {
                    Err(BuildError::unresolved_import(source, importer))
                }
            } else {
                let warning = Warning::new(
                    codes::UNRESOLVED_IMPORT,
                    format!(
                        "'{source}' is imported by {importer}, but could not be resolved; treating it as an external dependency"
                    ),
                )
                .with_id(importer);
                Ok(StaticResolution::ExternalWithWarning(
                    source.to_string(),
                    warning,
                ))
            }
        }
    }
}

/// Resolve one dynamic import. Literal specifiers fall back to the static
/// resolution rules when no plugin claims them; non-literal expressions are
/// recorded as-is unless a plugin supplies a replacement.
async fn resolve_dynamic(
    plugins: &PluginDriver,
    options: &InputOptions,
    importer: &str,
    specifier: Option<&str>,
) -> BuildResult<DynamicOutcome> {
    let hook_result = plugins.resolve_dynamic_import(specifier, importer).await?;

    match (specifier, hook_result) {
        (None, Some(replacement)) => Ok(DynamicOutcome::Replacement(replacement)),
        (None, None) => Ok(DynamicOutcome::Unresolved),
        (Some(_), Some(id)) => {
            if options.external.is_external(&id, Some(importer), true) {
                Ok(DynamicOutcome::External(id, None))
            } else {
                Ok(DynamicOutcome::Internal(id))
            }
        }
        (Some(source), None) => {
            match resolve_static(plugins, options, importer, source, None).await? {
                StaticResolution::Internal(id) => Ok(DynamicOutcome::Internal(id)),
                StaticResolution::External(id) => Ok(DynamicOutcome::External(id, None)),
                StaticResolution::ExternalWithWarning(id, warning) => {
                    Ok(DynamicOutcome::External(id, Some(warning)))
                }
            }
        }
    }
}

/// The id an external ends up with: the normalized path for relative
/// specifiers, the specifier itself otherwise.
fn external_id_for(source: &str, importer: &str) -> String {
    if is_relative_specifier(source) {
        relative_id(source, importer)
    } else {
        source.to_string()
    }
}

fn file_stem(id: &str) -> Option<String> {
    std::path::Path::new(id)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(ToString::to_string)
}
